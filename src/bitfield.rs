//! Bit-level value extraction for channels the record layout could not
//! place on a clean field.
//!
//! The extractor only ever looks at the `byte_count`-wide window covering
//! the channel's bits. Windows that reach past the record end (malformed
//! geometry) are clipped and zero-extended instead of failing, matching the
//! layout builder's silent-degradation policy.

use crate::blocks::ChannelBlock;

/// Extract one channel's raw value from every fixed-size record in `data`.
///
/// Returns one `u64` bit pattern per whole record; signed channels are
/// sign-extended to the full 64 bits, so the pattern reinterprets directly
/// as `i64`. Float channels yield their IEEE bit patterns.
pub fn extract_bit_field(data: &[u8], record_size: usize, ch: &ChannelBlock) -> Vec<u64> {
    if record_size == 0 {
        return Vec::new();
    }
    let start_bit = ch.start_bit() as usize;
    let byte_offset = start_bit / 8;
    let bit_offset = (start_bit % 8) as u32;
    let bit_count = (ch.bit_count as u32).min(64);
    let byte_count = (bit_offset + bit_count).div_ceil(8) as usize;
    let big_endian = ch.data_type.is_big_endian();
    let signed = ch.data_type.is_signed();

    let mask: u128 = if bit_count == 0 {
        0
    } else {
        (1u128 << bit_count) - 1
    };

    let record_count = data.len() / record_size;
    let mut values = Vec::with_capacity(record_count);
    for r in 0..record_count {
        let record = &data[r * record_size..(r + 1) * record_size];

        // Fold the window into one accumulator; a 64-bit value at a
        // misaligned offset can span 9 bytes, hence u128.
        let mut acc: u128 = 0;
        for i in 0..byte_count {
            let byte = record.get(byte_offset + i).copied().unwrap_or(0) as u128;
            if big_endian {
                acc = (acc << 8) | byte;
            } else {
                acc |= byte << (8 * i);
            }
        }

        let mut value = ((acc >> bit_offset) & mask) as u64;
        if signed && bit_count > 0 && bit_count < 64 && (value >> (bit_count - 1)) & 1 == 1 {
            value |= u64::MAX << bit_count;
        }
        values.push(value);
    }
    values
}

/// Inverse of [`extract_bit_field`] for one record: OR `value`'s low
/// `bit_count` bits into the record at the given bit position. Bits
/// falling past the record end are silently dropped.
pub(crate) fn pack_bit_field(
    record: &mut [u8],
    start_bit: usize,
    bit_count: u32,
    value: u64,
    big_endian: bool,
) {
    let byte_offset = start_bit / 8;
    let bit_offset = (start_bit % 8) as u32;
    let bit_count = bit_count.min(64);
    let byte_count = (bit_offset + bit_count).div_ceil(8) as usize;
    let mask: u128 = if bit_count == 0 {
        0
    } else {
        (1u128 << bit_count) - 1
    };
    let shifted = ((value as u128) & mask) << bit_offset;
    for i in 0..byte_count {
        let shift = if big_endian {
            8 * (byte_count - 1 - i)
        } else {
            8 * i
        };
        if let Some(byte) = record.get_mut(byte_offset + i) {
            *byte |= (shifted >> shift) as u8;
        }
    }
}
