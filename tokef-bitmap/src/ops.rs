//! Operation kernels over packed bitmap spans.
//!
//! Every kernel accepts `(buffer, bit_offset, length)` views and chooses
//! between a byte-wise fast path, available when the relevant offsets agree
//! modulo 8, and a general path that presents logically-shifted views of the
//! inputs by merging adjacent 64-bit words:
//!
//! ```text
//! |<---- next ---->|<--- current --->|
//! +----------+-----+-----------+-----+
//! |   ---    |  A  |     B     | --- |
//! +----------+-----+-----------+-----+
//!               |        |      shift
//!               v        v
//!            +-----+-----------+
//!            |  A  |     B     |
//!            +-----+-----------+
//! ```
//!
//! `(current >> k) | (next << (64 - k))`, with `k == 0` taken as `current`
//! verbatim since a 64-bit shift is not defined. The same pattern in reverse
//! splits one output word across two destination words under the mask
//! `(1 << k) - 1`, leaving destination bits outside the span untouched.
//!
//! The `_to_new` variants allocate their output through
//! [`tokef_bytes::bitmap::allocate_bitmap`] and return canonical buffers:
//! every bit outside the written range, including the trailing bits of the
//! last byte, is zero.

use tokef_bytes::{bitmap::allocate_bitmap, buffer::AlignedByteVec};
use tokef_common::{Result, verify_arg};

use crate::{
    align::word_align,
    bit_util::{bytes_for_bits, get_bit, read_word, set_bit_to, write_word},
    cursor::{BitmapReader, BitmapWriter},
    fill::clear_bits,
};

/// Merges two adjacent little-endian words into the word seen at bit offset
/// `shift` (0..8) from the start of `current`.
#[inline]
fn shift_word(current: u64, next: u64, shift: usize) -> u64 {
    if shift == 0 {
        current
    } else {
        (current >> shift) | (next << (64 - shift))
    }
}

/// Returns the number of set bits in `[bit_offset, bit_offset + length)`.
///
/// The span is decomposed around 8-byte address alignment so the middle runs
/// on whole-word population counts; only the leading and trailing remainders
/// are counted bit by bit.
///
/// # Examples
///
/// ```
/// use tokef_bitmap::ops::count_set_bits;
///
/// let buf = [0xFF, 0x0F];
/// assert_eq!(count_set_bits(&buf, 0, 12), 12);
/// assert_eq!(count_set_bits(&buf, 4, 8), 8);
/// assert_eq!(count_set_bits(&buf, 4, 4), 4);
/// ```
///
/// # Panics
///
/// Panics if the span does not lie within `data`.
pub fn count_set_bits(data: &[u8], bit_offset: usize, length: usize) -> usize {
    let p = word_align::<8>(data, bit_offset, length);
    let mut count = 0;

    for i in bit_offset..bit_offset + p.leading_bits {
        if get_bit(data, i) {
            count += 1;
        }
    }

    if p.aligned_words > 0 {
        // Alignment is guaranteed by the decomposition, so the cast cannot
        // fail and every load is an aligned word.
        let words: &[u64] =
            bytemuck::cast_slice(&data[p.aligned_start..p.aligned_start + p.aligned_words * 8]);
        count += words.iter().map(|w| w.count_ones() as usize).sum::<usize>();
    }

    for i in p.trailing_bit_offset..bit_offset + length {
        if get_bit(data, i) {
            count += 1;
        }
    }

    count
}

/// Returns the number of unset bits in `[bit_offset, bit_offset + length)`.
pub fn count_unset_bits(data: &[u8], bit_offset: usize, length: usize) -> usize {
    length - count_set_bits(data, bit_offset, length)
}

/// Unified transfer engine behind [`copy_bitmap`] and [`invert_bitmap`].
///
/// With both offsets byte-aligned the transfer is a byte copy (or byte-wise
/// NOT); otherwise the word pipeline re-aligns `n_words - 1` whole words and
/// a reader/writer pair finishes the remainder. `restore_trailing` controls
/// what happens to destination bits at positions `>= length` within the last
/// byte of the aligned path: restored from a pre-transfer snapshot, or left
/// as the bulk operation produced them.
fn transfer_bitmap(
    src: &[u8],
    src_offset: usize,
    length: usize,
    dst: &mut [u8],
    dst_offset: usize,
    invert: bool,
    restore_trailing: bool,
) {
    if length == 0 {
        return;
    }
    let num_bytes = bytes_for_bits(length);
    let src_byte = src_offset / 8;
    let sb = src_offset % 8;
    let dst_byte = dst_offset / 8;
    let db = dst_offset % 8;

    if sb != 0 || db != 0 {
        let mut s = src_byte;
        let mut d = dst_byte;
        let mut length = length;

        let n_words = length / 64;
        if n_words > 1 {
            let dst_mask = (1u64 << db) - 1;
            let mut src_current = read_word(&src[s..]);
            let mut dst_current = read_word(&dst[d..]);

            for _ in 0..n_words - 1 {
                s += 8;
                let src_next = read_word(&src[s..]);
                let mut word = shift_word(src_current, src_next, sb);
                src_current = src_next;
                if invert {
                    word = !word;
                }

                if db != 0 {
                    // The rotation parks the word's top `db` bits in the low
                    // positions, where the next destination word takes them.
                    let word = word.rotate_left(db as u32);
                    let mut dst_next = read_word(&dst[d + 8..]);
                    dst_current = (dst_current & dst_mask) | (word & !dst_mask);
                    dst_next = (dst_next & !dst_mask) | (word & dst_mask);
                    write_word(&mut dst[d..], dst_current);
                    write_word(&mut dst[d + 8..], dst_next);
                    dst_current = dst_next;
                } else {
                    write_word(&mut dst[d..], word);
                }
                d += 8;
            }

            length -= (n_words - 1) * 64;
        }

        let mut reader = BitmapReader::new(&src[s..], sb, length);
        let mut writer = BitmapWriter::new(&mut dst[d..], db, length);
        for _ in 0..length {
            if invert ^ reader.is_set() {
                writer.set();
            } else {
                writer.clear();
            }
            reader.next();
            writer.next();
        }
        writer.finish();
    } else {
        let trailing_bits = num_bytes * 8 - length;
        let trail = if trailing_bits != 0 && restore_trailing {
            dst[dst_byte + num_bytes - 1]
        } else {
            0
        };

        let src_bytes = &src[src_byte..src_byte + num_bytes];
        let dst_bytes = &mut dst[dst_byte..dst_byte + num_bytes];
        if invert {
            for (d, s) in dst_bytes.iter_mut().zip(src_bytes) {
                *d = !s;
            }
        } else {
            dst_bytes.copy_from_slice(src_bytes);
        }

        if restore_trailing {
            for i in 0..trailing_bits {
                set_bit_to(
                    dst_bytes,
                    length + i,
                    get_bit(&[trail], 8 - trailing_bits + i),
                );
            }
        }
    }
}

fn transfer_bitmap_to_new(
    src: &[u8],
    src_offset: usize,
    length: usize,
    invert: bool,
) -> Result<AlignedByteVec> {
    let mut buffer = allocate_bitmap(length)?;
    transfer_bitmap(src, src_offset, length, &mut buffer, 0, invert, false);

    // The bulk paths may copy extra bits into the last byte; zero them so
    // the fresh buffer is canonical.
    clear_bits(&mut buffer, length, bytes_for_bits(length) * 8 - length);
    Ok(buffer)
}

/// Copies bits `[src_offset, src_offset + length)` of `src` onto bits
/// `[dst_offset, dst_offset + length)` of `dst`.
///
/// Destination bits outside the target range are preserved, with one
/// exception: when both offsets are byte-aligned and `restore_trailing` is
/// false, bits at positions `>= length` within the last written byte are
/// left with whatever the bulk copy produced and must not be relied upon.
///
/// # Panics
///
/// Panics if either span does not lie within its buffer.
pub fn copy_bitmap(
    src: &[u8],
    src_offset: usize,
    length: usize,
    dst: &mut [u8],
    dst_offset: usize,
    restore_trailing: bool,
) {
    transfer_bitmap(src, src_offset, length, dst, dst_offset, false, restore_trailing);
}

/// Copies bits `[src_offset, src_offset + length)` of `src` into a freshly
/// allocated bitmap of `length` bits with canonical zero trailing bits.
pub fn copy_bitmap_to_new(src: &[u8], src_offset: usize, length: usize) -> Result<AlignedByteVec> {
    transfer_bitmap_to_new(src, src_offset, length, false)
}

/// Writes the complement of bits `[src_offset, src_offset + length)` of
/// `src` onto bits `[dst_offset, dst_offset + length)` of `dst`.
///
/// Destination bits outside the target range are always preserved.
///
/// # Panics
///
/// Panics if either span does not lie within its buffer.
pub fn invert_bitmap(src: &[u8], src_offset: usize, length: usize, dst: &mut [u8], dst_offset: usize) {
    transfer_bitmap(src, src_offset, length, dst, dst_offset, true, true);
}

/// Complements bits `[src_offset, src_offset + length)` of `src` into a
/// freshly allocated bitmap of `length` bits with canonical zero trailing
/// bits.
pub fn invert_bitmap_to_new(
    src: &[u8],
    src_offset: usize,
    length: usize,
) -> Result<AlignedByteVec> {
    transfer_bitmap_to_new(src, src_offset, length, true)
}

/// Returns `true` iff bits `[left_offset, left_offset + length)` of `left`
/// equal bits `[right_offset, right_offset + length)` of `right`.
///
/// Byte-aligned operands compare byte-wise; otherwise whole words are
/// re-formed through the shift-merge pipeline and compared. The first
/// difference short-circuits.
///
/// # Panics
///
/// Panics if either span does not lie within its buffer.
pub fn bitmap_equals(
    left: &[u8],
    left_offset: usize,
    right: &[u8],
    right_offset: usize,
    length: usize,
) -> bool {
    if left_offset % 8 == 0 && right_offset % 8 == 0 {
        let l = left_offset / 8;
        let r = right_offset / 8;
        let num_bytes = length / 8;
        if left[l..l + num_bytes] != right[r..r + num_bytes] {
            return false;
        }
        for i in num_bytes * 8..length {
            if get_bit(left, left_offset + i) != get_bit(right, right_offset + i) {
                return false;
            }
        }
        return true;
    }

    let mut l = left_offset / 8;
    let mut r = right_offset / 8;
    let lb = left_offset % 8;
    let rb = right_offset % 8;
    let mut length = length;

    let n_words = length / 64;
    if n_words > 1 {
        let mut left_current = read_word(&left[l..]);
        let mut right_current = read_word(&right[r..]);

        for _ in 0..n_words - 1 {
            l += 8;
            let left_next = read_word(&left[l..]);
            let left_word = shift_word(left_current, left_next, lb);
            left_current = left_next;

            r += 8;
            let right_next = read_word(&right[r..]);
            let right_word = shift_word(right_current, right_next, rb);
            right_current = right_next;

            if left_word != right_word {
                return false;
            }
        }

        length -= (n_words - 1) * 64;
    }

    for i in 0..length {
        if get_bit(&left[l..], lb + i) != get_bit(&right[r..], rb + i) {
            return false;
        }
    }
    true
}

/// A bitwise combinator at every width the kernels operate at.
///
/// The word and byte forms drive the parallel paths; the boolean form drives
/// the bit-valued residual loop. For AND/OR/XOR these coincide, but keeping
/// all three makes each path's value domain explicit.
trait BitwiseOp {
    fn byte(a: u8, b: u8) -> u8;
    fn word(a: u64, b: u64) -> u64;
    fn bit(a: bool, b: bool) -> bool;
}

struct And;

impl BitwiseOp for And {
    #[inline]
    fn byte(a: u8, b: u8) -> u8 {
        a & b
    }

    #[inline]
    fn word(a: u64, b: u64) -> u64 {
        a & b
    }

    #[inline]
    fn bit(a: bool, b: bool) -> bool {
        a && b
    }
}

struct Or;

impl BitwiseOp for Or {
    #[inline]
    fn byte(a: u8, b: u8) -> u8 {
        a | b
    }

    #[inline]
    fn word(a: u64, b: u64) -> u64 {
        a | b
    }

    #[inline]
    fn bit(a: bool, b: bool) -> bool {
        a || b
    }
}

struct Xor;

impl BitwiseOp for Xor {
    #[inline]
    fn byte(a: u8, b: u8) -> u8 {
        a ^ b
    }

    #[inline]
    fn word(a: u64, b: u64) -> u64 {
        a ^ b
    }

    #[inline]
    fn bit(a: bool, b: bool) -> bool {
        a ^ b
    }
}

/// Fast path: all three offsets congruent mod 8, so per-byte bit positions
/// line up and the combinator applies byte-wise. Bits of the first and last
/// touched bytes that lie outside the target range receive combinator output
/// and are do-not-care for the caller.
fn aligned_bitmap_op<O: BitwiseOp>(
    left: &[u8],
    left_offset: usize,
    right: &[u8],
    right_offset: usize,
    length: usize,
    out: &mut [u8],
    out_offset: usize,
) {
    debug_assert_eq!(left_offset % 8, right_offset % 8);
    debug_assert_eq!(left_offset % 8, out_offset % 8);

    let nbytes = bytes_for_bits(length + left_offset % 8);
    let left = &left[left_offset / 8..];
    let right = &right[right_offset / 8..];
    let out = &mut out[out_offset / 8..];
    for ((o, &l), &r) in out[..nbytes].iter_mut().zip(&left[..nbytes]).zip(&right[..nbytes]) {
        *o = O::byte(l, r);
    }
}

/// General path: both operand views are re-formed word by word through the
/// shift-merge pipeline, combined, and stored with the offset-splitting
/// pattern when the output offset is unaligned. The residual runs through
/// two readers and a writer, so boundary bytes of the output merge with
/// their preserved out-of-span bits.
fn unaligned_bitmap_op<O: BitwiseOp>(
    left: &[u8],
    left_offset: usize,
    right: &[u8],
    right_offset: usize,
    length: usize,
    out: &mut [u8],
    out_offset: usize,
) {
    let mut l = left_offset / 8;
    let mut r = right_offset / 8;
    let mut o = out_offset / 8;
    let lb = left_offset % 8;
    let rb = right_offset % 8;
    let ob = out_offset % 8;
    let mut length = length;

    let min_offset = lb.min(rb).min(ob);
    let min_nbytes = bytes_for_bits(length + min_offset);
    let nwords = min_nbytes / 8;

    if nwords > 1 {
        let out_mask = (1u64 << ob) - 1;
        length -= (nwords - 1) * 64;

        let mut left_word0 = read_word(&left[l..]);
        let mut right_word0 = read_word(&right[r..]);
        let mut out_word0 = read_word(&out[o..]);

        for _ in 0..nwords - 1 {
            l += 8;
            let left_word1 = read_word(&left[l..]);
            let left_word = shift_word(left_word0, left_word1, lb);
            left_word0 = left_word1;

            r += 8;
            let right_word1 = read_word(&right[r..]);
            let right_word = shift_word(right_word0, right_word1, rb);
            right_word0 = right_word1;

            let out_word = O::word(left_word, right_word);
            if ob != 0 {
                let out_word = out_word.rotate_left(ob as u32);
                let mut out_word1 = read_word(&out[o + 8..]);
                out_word0 = (out_word0 & out_mask) | (out_word & !out_mask);
                out_word1 = (out_word1 & !out_mask) | (out_word & out_mask);
                write_word(&mut out[o..], out_word0);
                write_word(&mut out[o + 8..], out_word1);
                out_word0 = out_word1;
            } else {
                write_word(&mut out[o..], out_word);
            }
            o += 8;
        }
    }

    if length > 0 {
        let mut left_reader = BitmapReader::new(&left[l..], lb, length);
        let mut right_reader = BitmapReader::new(&right[r..], rb, length);
        let mut writer = BitmapWriter::new(&mut out[o..], ob, length);
        for _ in 0..length {
            if O::bit(left_reader.is_set(), right_reader.is_set()) {
                writer.set();
            } else {
                writer.clear();
            }
            left_reader.next();
            right_reader.next();
            writer.next();
        }
        writer.finish();
    }
}

fn bitmap_op<O: BitwiseOp>(
    left: &[u8],
    left_offset: usize,
    right: &[u8],
    right_offset: usize,
    length: usize,
    out: &mut [u8],
    out_offset: usize,
) {
    if length == 0 {
        return;
    }
    if out_offset % 8 == left_offset % 8 && out_offset % 8 == right_offset % 8 {
        aligned_bitmap_op::<O>(left, left_offset, right, right_offset, length, out, out_offset);
    } else {
        unaligned_bitmap_op::<O>(left, left_offset, right, right_offset, length, out, out_offset);
    }
}

fn bitmap_op_to_new<O: BitwiseOp>(
    left: &[u8],
    left_offset: usize,
    right: &[u8],
    right_offset: usize,
    length: usize,
    out_offset: usize,
) -> Result<AlignedByteVec> {
    verify_arg!(length, length.checked_add(out_offset).is_some());
    let phys_bits = length + out_offset;
    let mut buffer = allocate_bitmap(phys_bits)?;
    bitmap_op::<O>(left, left_offset, right, right_offset, length, &mut buffer, out_offset);

    // The aligned fast path writes combinator output into boundary-byte bits
    // outside the target range; re-zero them so the fresh buffer is
    // canonical: prefix [0, out_offset) and tail [phys_bits, ..) all zero.
    clear_bits(&mut buffer, 0, out_offset);
    clear_bits(&mut buffer, phys_bits, bytes_for_bits(phys_bits) * 8 - phys_bits);
    Ok(buffer)
}

/// Bitwise AND of two bitmap spans of `length` bits, written to bits
/// `[out_offset, out_offset + length)` of `out`.
///
/// When all three offsets are congruent mod 8, the kernel runs byte-wise and
/// bits of the boundary output bytes outside the target range are
/// do-not-care. Otherwise destination bits outside the target range are
/// preserved exactly.
///
/// # Panics
///
/// Panics if any span does not lie within its buffer.
pub fn bitmap_and(
    left: &[u8],
    left_offset: usize,
    right: &[u8],
    right_offset: usize,
    length: usize,
    out: &mut [u8],
    out_offset: usize,
) {
    bitmap_op::<And>(left, left_offset, right, right_offset, length, out, out_offset);
}

/// Bitwise AND into a freshly allocated bitmap of `length + out_offset`
/// bits; bits outside `[out_offset, out_offset + length)` are zero.
pub fn bitmap_and_to_new(
    left: &[u8],
    left_offset: usize,
    right: &[u8],
    right_offset: usize,
    length: usize,
    out_offset: usize,
) -> Result<AlignedByteVec> {
    bitmap_op_to_new::<And>(left, left_offset, right, right_offset, length, out_offset)
}

/// Bitwise OR of two bitmap spans of `length` bits, written to bits
/// `[out_offset, out_offset + length)` of `out`.
///
/// Offset and boundary-byte semantics are those of [`bitmap_and`].
pub fn bitmap_or(
    left: &[u8],
    left_offset: usize,
    right: &[u8],
    right_offset: usize,
    length: usize,
    out: &mut [u8],
    out_offset: usize,
) {
    bitmap_op::<Or>(left, left_offset, right, right_offset, length, out, out_offset);
}

/// Bitwise OR into a freshly allocated bitmap of `length + out_offset`
/// bits; bits outside `[out_offset, out_offset + length)` are zero.
pub fn bitmap_or_to_new(
    left: &[u8],
    left_offset: usize,
    right: &[u8],
    right_offset: usize,
    length: usize,
    out_offset: usize,
) -> Result<AlignedByteVec> {
    bitmap_op_to_new::<Or>(left, left_offset, right, right_offset, length, out_offset)
}

/// Bitwise XOR of two bitmap spans of `length` bits, written to bits
/// `[out_offset, out_offset + length)` of `out`.
///
/// Offset and boundary-byte semantics are those of [`bitmap_and`].
pub fn bitmap_xor(
    left: &[u8],
    left_offset: usize,
    right: &[u8],
    right_offset: usize,
    length: usize,
    out: &mut [u8],
    out_offset: usize,
) {
    bitmap_op::<Xor>(left, left_offset, right, right_offset, length, out, out_offset);
}

/// Bitwise XOR into a freshly allocated bitmap of `length + out_offset`
/// bits; bits outside `[out_offset, out_offset + length)` are zero.
pub fn bitmap_xor_to_new(
    left: &[u8],
    left_offset: usize,
    right: &[u8],
    right_offset: usize,
    length: usize,
    out_offset: usize,
) -> Result<AlignedByteVec> {
    bitmap_op_to_new::<Xor>(left, left_offset, right, right_offset, length, out_offset)
}

#[cfg(test)]
mod benchmarks {
    //! Benchmark tests, excluded from normal runs.
    //!
    //! Run with `cargo test --release benchmark -- --ignored --nocapture`.

    use std::time::Instant;

    use super::*;

    fn pseudo_random_bytes(len: usize) -> Vec<u8> {
        let mut data = vec![0u8; len];
        let mut state = 0x12345678u32;
        for byte in data.iter_mut() {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            *byte = (state >> 16) as u8;
        }
        data
    }

    #[test]
    #[ignore]
    fn benchmark_count_set_bits() {
        const BITS: usize = 8_000_000;
        let data = pseudo_random_bytes(BITS / 8 + 16);

        for &offset in &[0usize, 1, 3, 7] {
            for _ in 0..10 {
                std::hint::black_box(count_set_bits(&data, offset, BITS));
            }

            let iterations = 200;
            let start = Instant::now();
            let mut checksum = 0usize;
            for _ in 0..iterations {
                checksum += std::hint::black_box(count_set_bits(&data, offset, BITS));
            }
            let avg = start.elapsed() / iterations;
            let throughput = BITS as f64 / avg.as_secs_f64() / 1_000_000_000.0;
            println!(
                "count_set_bits: offset {offset}: {BITS} bits, {throughput:.3} Gbit/sec (checksum: {checksum})"
            );
        }
    }

    #[test]
    #[ignore]
    fn benchmark_bitmap_and() {
        const BITS: usize = 8_000_000;
        let left = pseudo_random_bytes(BITS / 8 + 16);
        let right = pseudo_random_bytes(BITS / 8 + 16);
        let mut out = vec![0u8; BITS / 8 + 16];

        for &(lo, ro, oo) in &[(0usize, 0usize, 0usize), (1, 2, 3), (7, 0, 5)] {
            for _ in 0..10 {
                bitmap_and(&left, lo, &right, ro, BITS, &mut out, oo);
                std::hint::black_box(&out);
            }

            let iterations = 100;
            let start = Instant::now();
            for _ in 0..iterations {
                bitmap_and(&left, lo, &right, ro, BITS, &mut out, oo);
                std::hint::black_box(&out);
            }
            let avg = start.elapsed() / iterations;
            let throughput = BITS as f64 / avg.as_secs_f64() / 1_000_000_000.0;
            let checksum: u64 = out.iter().map(|&b| b as u64).sum();
            println!(
                "bitmap_and: offsets ({lo}, {ro}, {oo}): {BITS} bits, {throughput:.3} Gbit/sec (checksum: {checksum})"
            );
        }
    }
}
