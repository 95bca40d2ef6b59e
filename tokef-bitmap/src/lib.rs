//! Offset-aware operations over packed validity bitmaps.
//!
//! A bitmap is a packed bit-vector in a contiguous byte buffer, LSB-first
//! within each byte: bit `i` is `(buf[i / 8] >> (i % 8)) & 1`. Operations
//! take `(buffer, bit_offset, length)` views, so a bitmap can be sliced at
//! any bit position without copying, and every kernel handles arbitrary
//! offset skew between its inputs and its output.
//!
//! The crate is layered leaves-first:
//!
//! - [`bit_util`]: single-bit access, byte sizing and little-endian word
//!   loads/stores over unaligned addresses;
//! - [`cursor`]: sequential bit readers and writers with a one-byte cache;
//! - [`align`]: decomposition of a span into leading bits, aligned words
//!   and trailing bits;
//! - [`ops`]: the kernels, [`ops::count_set_bits`], [`ops::copy_bitmap`],
//!   [`ops::invert_bitmap`], [`ops::bitmap_equals`] and the AND/OR/XOR
//!   combinators, each with a byte-wise aligned fast path and a general
//!   word-parallel shift-merge path;
//! - [`fill`] and [`convert`]: in-place range fill and conversion between
//!   bitmaps and byte-per-value booleans.
//!
//! Kernels never allocate except the `_to_new` variants, which obtain a
//! zero-initialized output from [`tokef_bytes::bitmap::allocate_bitmap`].

pub mod align;
pub mod bit_util;
pub mod convert;
pub mod cursor;
pub mod fill;
pub mod ops;
