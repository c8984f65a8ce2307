//! Record layout derivation.
//!
//! A channel group's record is a fixed-size row of packed channel values.
//! [`build_record_layout`] turns the group's channel list into an ordered
//! list of named byte fields that exactly spans the record (gap fillers
//! included) plus a parent map telling the decoder which field carries each
//! channel and at which bit shift.
//!
//! Channels whose bit geometry cannot be placed on a clean field (overlap
//! past the record end, sub-fields wider than their parent) are left out of
//! the parent map on purpose; the decoder falls back to the bit-level
//! extractor for those. Malformed geometry never fails the build.

use std::collections::HashMap;

use crate::blocks::ChannelBlock;

/// One named byte range within a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutField {
    pub name: String,
    /// Byte offset from the start of the record.
    pub offset: usize,
    pub bytes: usize,
    /// Anonymous filler covering bytes no channel claims.
    pub is_gap: bool,
}

/// Where a channel's bits live: a field index plus the right-shift that
/// isolates the channel's value within that field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent {
    pub field: usize,
    pub bit_shift: u32,
}

/// Derived layout for one channel group. Never persisted; rebuilt lazily
/// and cached by the owning group.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLayout {
    pub fields: Vec<LayoutField>,
    /// Channel index (within the group's channel list) to parent field.
    pub parents: HashMap<usize, Parent>,
    pub record_size: usize,
}

impl RecordLayout {
    pub fn parent(&self, channel: usize) -> Option<&Parent> {
        self.parents.get(&channel)
    }

    pub fn field_name(&self, channel: usize) -> Option<&str> {
        self.parent(channel)
            .map(|p| self.fields[p.field].name.as_str())
    }
}

// Standard numeric field widths in bytes.
const FIELD_WIDTHS: [usize; 4] = [1, 2, 4, 8];

fn numeric_width(bits: u32) -> Option<usize> {
    FIELD_WIDTHS.iter().copied().find(|w| w * 8 >= bits as usize)
}

fn unique_name(base: &str, taken: &mut HashMap<String, usize>) -> String {
    let base = if base.is_empty() { "unnamed" } else { base };
    match taken.get_mut(base) {
        None => {
            taken.insert(base.to_string(), 0);
            base.to_string()
        }
        Some(count) => {
            *count += 1;
            let name = format!("{base}_{count}");
            taken.insert(name.clone(), 0);
            name
        }
    }
}

/// Derive the record layout for `channels` within a `record_size`-byte
/// record.
///
/// Channels carrying an array dependency are skipped entirely; the decode
/// pipeline assembles those from their component channels instead.
pub fn build_record_layout(channels: &[ChannelBlock], record_size: usize) -> RecordLayout {
    // Sort by start bit; on ties the wider channel comes first so it
    // becomes the parent field and the narrower ones resolve as shifted
    // views into it.
    let mut order: Vec<usize> = (0..channels.len())
        .filter(|&i| channels[i].dependency_addr == 0)
        .collect();
    order.sort_by_key(|&i| (channels[i].start_bit(), u16::MAX - channels[i].bit_count));

    let mut fields: Vec<LayoutField> = Vec::new();
    let mut parents: HashMap<usize, Parent> = HashMap::new();
    let mut taken: HashMap<String, usize> = HashMap::new();
    let record_bits = record_size as u32 * 8;

    let mut next_free_bit: u32 = 0;
    let mut gap_count = 0usize;
    // (field index, field start byte) of the still-open parent field
    let mut current_parent: Option<(usize, u32)> = None;

    for &idx in &order {
        let ch = &channels[idx];
        let start_bit = ch.start_bit();
        let bit_count = ch.bit_count as u32;
        let bit_offset = start_bit % 8;
        let field_start_byte = (start_bit / 8) as usize;

        if start_bit >= next_free_bit {
            // New field; fill any byte gap before it first.
            let consumed = next_free_bit.div_ceil(8) as usize;
            if field_start_byte > consumed {
                fields.push(LayoutField {
                    name: unique_name(&format!("gap_{gap_count}"), &mut taken),
                    offset: consumed,
                    bytes: field_start_byte - consumed,
                    is_gap: true,
                });
                gap_count += 1;
            }

            let (width, field_end_bit) = if ch.data_type.is_bytes_like() {
                let width = ((bit_offset + bit_count).div_ceil(8)) as usize;
                // Strings advance to the exact bit end, no rounding
                (Some(width), start_bit + bit_count)
            } else {
                match numeric_width(bit_offset + bit_count) {
                    Some(w) => (Some(w), (field_start_byte as u32 + w as u32) * 8),
                    None => (None, 0),
                }
            };

            let fits = match width {
                Some(w) => field_start_byte + w <= record_size,
                None => false,
            };
            if !fits {
                // Malformed geometry: drop the field and leave the channel
                // to the bit-level extractor.
                next_free_bit = field_start_byte as u32 * 8;
                current_parent = None;
                continue;
            }
            let width = match width {
                Some(w) => w,
                None => continue,
            };

            let name = unique_name(ch.display_name(), &mut taken);
            fields.push(LayoutField {
                name,
                offset: field_start_byte,
                bytes: width,
                is_gap: false,
            });
            let field_index = fields.len() - 1;
            parents.insert(
                idx,
                Parent {
                    field: field_index,
                    bit_shift: bit_offset,
                },
            );
            current_parent = Some((field_index, field_start_byte as u32));
            next_free_bit = field_end_bit;
        } else {
            // Starts inside the open parent field
            match current_parent {
                Some((field_index, parent_start_byte))
                    if next_free_bit - start_bit >= bit_count =>
                {
                    parents.insert(
                        idx,
                        Parent {
                            field: field_index,
                            bit_shift: start_bit - parent_start_byte * 8,
                        },
                    );
                }
                // Does not fit the parent: bit-level extractor fallback
                _ => {}
            }
        }

        if next_free_bit > record_bits {
            break;
        }
    }

    // Pad out to the declared record size.
    let consumed = (next_free_bit.div_ceil(8) as usize).min(record_size);
    if consumed < record_size {
        fields.push(LayoutField {
            name: unique_name(&format!("gap_{gap_count}"), &mut taken),
            offset: consumed,
            bytes: record_size - consumed,
            is_gap: true,
        });
    }

    RecordLayout {
        fields,
        parents,
        record_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::common::DataType;

    fn channel(name: &str, start_offset: u16, bit_count: u16, data_type: DataType) -> ChannelBlock {
        ChannelBlock {
            short_name: name.to_string(),
            start_offset,
            bit_count,
            data_type,
            ..ChannelBlock::default()
        }
    }

    #[test]
    fn aligned_fields_span_record() {
        let channels = vec![
            channel("t", 0, 64, DataType::DoubleLE),
            channel("a", 64, 16, DataType::UnsignedIntegerLE),
            channel("b", 80, 8, DataType::UnsignedIntegerLE),
        ];
        let layout = build_record_layout(&channels, 11);
        assert_eq!(layout.fields.len(), 3);
        assert_eq!(layout.fields[0].bytes, 8);
        assert_eq!(layout.fields[1].bytes, 2);
        assert_eq!(layout.fields[2].bytes, 1);
        let total: usize = layout.fields.iter().map(|f| f.bytes).sum();
        assert_eq!(total, 11);
        assert_eq!(layout.parents.len(), 3);
    }

    #[test]
    fn packed_bits_share_one_parent_field() {
        // 12-bit value at bit 0 and 4-bit value at bit 12 share a u16 field
        let channels = vec![
            channel("low", 0, 12, DataType::UnsignedIntegerLE),
            channel("high", 12, 4, DataType::UnsignedIntegerLE),
        ];
        let layout = build_record_layout(&channels, 4);
        assert_eq!(layout.field_name(0), Some("low"));
        assert_eq!(layout.field_name(1), Some("low"));
        assert_eq!(layout.parent(0).unwrap().bit_shift, 0);
        assert_eq!(layout.parent(1).unwrap().bit_shift, 12);
        // 2-byte parent field plus 2 bytes of trailing gap
        let total: usize = layout.fields.iter().map(|f| f.bytes).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn same_start_wider_channel_becomes_parent() {
        let channels = vec![
            channel("narrow", 0, 4, DataType::UnsignedIntegerLE),
            channel("wide", 0, 8, DataType::UnsignedIntegerLE),
        ];
        let layout = build_record_layout(&channels, 1);
        assert_eq!(layout.field_name(0), Some("wide"));
        assert_eq!(layout.field_name(1), Some("wide"));
        assert_eq!(layout.parent(0).unwrap().bit_shift, 0);
    }

    #[test]
    fn gap_fields_fill_unclaimed_bytes() {
        let channels = vec![
            channel("a", 0, 8, DataType::UnsignedIntegerLE),
            channel("b", 32, 8, DataType::UnsignedIntegerLE),
        ];
        let layout = build_record_layout(&channels, 8);
        let gaps: Vec<&LayoutField> = layout.fields.iter().filter(|f| f.is_gap).collect();
        assert_eq!(gaps.len(), 2);
        assert_eq!((gaps[0].offset, gaps[0].bytes), (1, 3));
        assert_eq!((gaps[1].offset, gaps[1].bytes), (5, 3));
    }

    #[test]
    fn overflowing_channel_is_dropped_not_failed() {
        let channels = vec![
            channel("fits", 0, 8, DataType::UnsignedIntegerLE),
            channel("overflow", 8, 32, DataType::UnsignedIntegerLE),
        ];
        let layout = build_record_layout(&channels, 2);
        assert!(layout.parent(0).is_some());
        assert!(layout.parent(1).is_none());
        let total: usize = layout.fields.iter().map(|f| f.bytes).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn subfield_wider_than_parent_is_dropped() {
        let channels = vec![
            channel("parent", 0, 8, DataType::UnsignedIntegerLE),
            channel("wide_sub", 4, 32, DataType::UnsignedIntegerLE),
        ];
        let layout = build_record_layout(&channels, 8);
        assert!(layout.parent(0).is_some());
        assert!(layout.parent(1).is_none());
    }

    #[test]
    fn string_field_keeps_exact_width() {
        let channels = vec![
            channel("label", 0, 24, DataType::StringAscii),
            channel("next", 24, 8, DataType::UnsignedIntegerLE),
        ];
        let layout = build_record_layout(&channels, 4);
        assert_eq!(layout.fields[0].bytes, 3);
        assert_eq!(layout.fields[1].offset, 3);
    }

    #[test]
    fn duplicate_names_are_disambiguated() {
        let channels = vec![
            channel("sig", 0, 8, DataType::UnsignedIntegerLE),
            channel("sig", 8, 8, DataType::UnsignedIntegerLE),
        ];
        let layout = build_record_layout(&channels, 2);
        assert_eq!(layout.field_name(0), Some("sig"));
        assert_eq!(layout.field_name(1), Some("sig_1"));
    }

    #[test]
    fn dependency_channels_are_excluded() {
        let mut dep = channel("array", 0, 8, DataType::UnsignedIntegerLE);
        dep.dependency_addr = 1000;
        let channels = vec![dep, channel("plain", 8, 8, DataType::UnsignedIntegerLE)];
        let layout = build_record_layout(&channels, 2);
        assert!(layout.parent(0).is_none());
        assert!(layout.parent(1).is_some());
    }

    #[test]
    fn deterministic_for_same_input() {
        let channels = vec![
            channel("a", 0, 12, DataType::UnsignedIntegerLE),
            channel("b", 12, 4, DataType::UnsignedIntegerLE),
            channel("c", 16, 32, DataType::FloatLE),
        ];
        let first = build_record_layout(&channels, 6);
        let second = build_record_layout(&channels, 6);
        assert_eq!(first, second);
    }
}
