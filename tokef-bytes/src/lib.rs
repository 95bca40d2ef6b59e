//! Byte buffers for the tokef kernels: an alignment-preserving growable
//! vector and the zero-initialized bitmap allocator consumed by the
//! `_to_new` operation variants.

pub mod bitmap;
pub mod buffer;

pub use buffer::AlignedByteVec;
