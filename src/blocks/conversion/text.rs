use crate::Result;
use crate::blocks::common::{BlockParse, addr_to_usize};
use crate::blocks::conversion::base::ConversionBlock;
use crate::blocks::text_block::TextBlock;

impl ConversionBlock {
    /// Resolve the TX blocks referenced by value-range-to-text entries.
    ///
    /// Unresolvable addresses leave the entry's `text` empty; lookups on
    /// such entries simply fail to match.
    pub fn resolve_texts(&mut self, file_data: &[u8]) -> Result<()> {
        for entry in &mut self.range_texts {
            if entry.text.is_some() || entry.text_addr == 0 {
                continue;
            }
            let offset = addr_to_usize(entry.text_addr);
            if offset + 4 <= file_data.len() {
                let block = TextBlock::from_bytes(&file_data[offset..])?;
                entry.text = Some(block.text);
            }
        }
        Ok(())
    }

    /// Look up the display text for a raw value in a value-to-text or
    /// value-range-to-text table.
    pub fn text_for(&self, raw: f64) -> Option<&str> {
        if let Some((_, text)) = self.value_texts.iter().find(|(key, _)| *key == raw) {
            return Some(text);
        }
        self.range_texts
            .iter()
            .find(|entry| raw >= entry.lower && raw <= entry.upper)
            .and_then(|entry| entry.text.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use crate::blocks::conversion::base::{ConversionBlock, RangeText};
    use crate::blocks::conversion::types::ConversionType;

    #[test]
    fn value_to_text_lookup() {
        let mut cc = ConversionBlock::identity("");
        cc.conversion_type = ConversionType::ValueToText;
        cc.value_texts = vec![(0.0, String::from("off")), (1.0, String::from("on"))];
        assert_eq!(cc.text_for(1.0), Some("on"));
        assert_eq!(cc.text_for(2.0), None);
    }

    #[test]
    fn range_to_text_lookup() {
        let mut cc = ConversionBlock::identity("");
        cc.conversion_type = ConversionType::ValueRangeToText;
        cc.range_texts = vec![
            RangeText {
                lower: 0.0,
                upper: 9.0,
                text_addr: 0,
                text: Some(String::from("low")),
            },
            RangeText {
                lower: 10.0,
                upper: 19.0,
                text_addr: 0,
                text: Some(String::from("high")),
            },
        ];
        assert_eq!(cc.text_for(5.0), Some("low"));
        assert_eq!(cc.text_for(10.0), Some("high"));
        assert_eq!(cc.text_for(25.0), None);
    }
}
