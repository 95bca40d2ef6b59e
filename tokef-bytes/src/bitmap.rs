//! Allocation of zero-initialized bitmap buffers.

use tokef_common::{Result, error::Error, verify_arg};

use crate::buffer::AlignedByteVec;

/// Allocates a zero-initialized bitmap able to hold `bit_len` bits.
///
/// The buffer holds `bit_len.div_ceil(8)` bytes; every bit, including the
/// trailing bits of the last byte, starts at zero. Allocation failure is
/// reported as an error rather than an abort.
pub fn allocate_bitmap(bit_len: usize) -> Result<AlignedByteVec> {
    verify_arg!(bit_len, bit_len.checked_add(7).is_some());
    let num_bytes = bit_len.div_ceil(8);
    AlignedByteVec::try_zeroed(num_bytes).ok_or_else(|| Error::allocation_failed(bit_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_bitmap() {
        for bit_len in [0usize, 1, 7, 8, 9, 63, 64, 65, 4096] {
            let bitmap = allocate_bitmap(bit_len).unwrap();
            assert_eq!(bitmap.len(), bit_len.div_ceil(8));
            assert!(bitmap.iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_allocate_bitmap_overflow() {
        assert!(allocate_bitmap(usize::MAX).is_err());
    }
}
