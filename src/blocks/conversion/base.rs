use super::formula::eval_formula;
use super::linear::{
    apply_exponential, apply_linear, apply_logarithmic, apply_polynomial, apply_rational,
};
use super::table_lookup::lookup_table;
use super::types::ConversionType;
use crate::blocks::common::{
    BlockHeader, BlockParse, read_f64, read_str, read_u16, read_u32, validate_buffer_size,
    write_str,
};
use crate::types::Samples;
use crate::{Error, Result};

/// Fixed part of a CCBLOCK before the type-specific payload.
pub const CC_BLOCK_SIZE_MIN: usize = 46;

/// A value-range-to-text entry. The text lives in a separate TX block in the
/// file; `text` is filled in by [`ConversionBlock::resolve_texts`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangeText {
    pub lower: f64,
    pub upper: f64,
    pub text_addr: u32,
    pub text: Option<String>,
}

/// CCBLOCK: maps raw channel values to physical values.
///
/// The payload after the fixed 46-byte part depends on `conversion_type`:
/// parametric types carry `f64` coefficients, tables carry interleaved
/// key/value pairs, text formulas carry the formula string itself and
/// value-to-text tables carry inline 32-byte texts or TX references.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConversionBlock {
    pub header: BlockHeader,
    pub range_valid: u16,
    pub min_phys: f64,
    pub max_phys: f64,
    pub unit: String,
    pub conversion_type: ConversionType,
    /// Coefficients for parametric types, interleaved `[key, value, ...]`
    /// pairs for tables, empty otherwise.
    pub params: Vec<f64>,
    /// ASAM-MCD2 text formula for `ConversionType::Formula`.
    pub formula: Option<String>,
    /// `(raw value, text)` entries for `ConversionType::ValueToText`.
    pub value_texts: Vec<(f64, String)>,
    /// Range entries for `ConversionType::ValueRangeToText`.
    pub range_texts: Vec<RangeText>,
}

impl BlockParse<'_> for ConversionBlock {
    const ID: &'static str = "CC";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, CC_BLOCK_SIZE_MIN)?;

        let conversion_type = ConversionType::from_u16(read_u16(bytes, 42));
        let param_count = read_u16(bytes, 44) as usize;

        let mut params = Vec::new();
        let mut formula = None;
        let mut value_texts = Vec::new();
        let mut range_texts = Vec::new();
        let base = CC_BLOCK_SIZE_MIN;

        match conversion_type {
            ConversionType::Linear
            | ConversionType::Polynomial
            | ConversionType::Exponential
            | ConversionType::Logarithmic
            | ConversionType::Rational => {
                validate_buffer_size(bytes, base + 8 * param_count)?;
                params = (0..param_count)
                    .map(|i| read_f64(bytes, base + 8 * i))
                    .collect();
            }
            ConversionType::TabularInterp | ConversionType::Tabular => {
                // param_count is the number of key/value pairs
                validate_buffer_size(bytes, base + 16 * param_count)?;
                params = (0..2 * param_count)
                    .map(|i| read_f64(bytes, base + 8 * i))
                    .collect();
            }
            ConversionType::Formula => {
                let end = (header.size as usize).min(bytes.len());
                if end > base {
                    let field = &bytes[base..end];
                    let len = field.iter().position(|&b| b == 0).unwrap_or(field.len());
                    formula = Some(field[..len].iter().map(|&b| b as char).collect());
                }
            }
            ConversionType::ValueToText => {
                // 8-byte raw value followed by a 32-character inline text
                validate_buffer_size(bytes, base + 40 * param_count)?;
                for i in 0..param_count {
                    let at = base + 40 * i;
                    value_texts.push((read_f64(bytes, at), read_str(bytes, at + 8, 32)));
                }
            }
            ConversionType::ValueRangeToText => {
                // (lower, upper, TX address) triples
                validate_buffer_size(bytes, base + 20 * param_count)?;
                for i in 0..param_count {
                    let at = base + 20 * i;
                    range_texts.push(RangeText {
                        lower: read_f64(bytes, at),
                        upper: read_f64(bytes, at + 8),
                        text_addr: read_u32(bytes, at + 16),
                        text: None,
                    });
                }
            }
            ConversionType::Identity
            | ConversionType::Date
            | ConversionType::Time
            | ConversionType::Unknown(_) => {}
        }

        Ok(Self {
            header,
            range_valid: read_u16(bytes, 4),
            min_phys: read_f64(bytes, 6),
            max_phys: read_f64(bytes, 14),
            unit: read_str(bytes, 22, 20),
            conversion_type,
            params,
            formula,
            value_texts,
            range_texts,
        })
    }
}

impl ConversionBlock {
    /// Creates an identity (1:1) conversion carrying only a unit.
    pub fn identity(unit: &str) -> Self {
        ConversionBlock {
            header: BlockHeader::new("CC", CC_BLOCK_SIZE_MIN as u16),
            range_valid: 0,
            min_phys: 0.0,
            max_phys: 0.0,
            unit: unit.to_string(),
            conversion_type: ConversionType::Identity,
            params: Vec::new(),
            formula: None,
            value_texts: Vec::new(),
            range_texts: Vec::new(),
        }
    }

    /// Creates a linear conversion: `physical = offset + factor * raw`.
    pub fn linear(offset: f64, factor: f64) -> Self {
        ConversionBlock {
            header: BlockHeader::new("CC", (CC_BLOCK_SIZE_MIN + 16) as u16),
            conversion_type: ConversionType::Linear,
            params: vec![offset, factor],
            ..Self::identity("")
        }
    }

    /// True for conversions that leave raw values unchanged.
    pub fn is_identity(&self) -> bool {
        match self.conversion_type {
            ConversionType::Identity => true,
            ConversionType::Linear => {
                self.params.len() >= 2 && self.params[0] == 0.0 && self.params[1] == 1.0
            }
            _ => false,
        }
    }

    /// See [`ConversionType::is_value_to_text`].
    pub fn is_value_to_text(&self) -> bool {
        self.conversion_type.is_value_to_text()
    }

    fn payload_size(&self) -> usize {
        match self.conversion_type {
            ConversionType::Linear
            | ConversionType::Polynomial
            | ConversionType::Exponential
            | ConversionType::Logarithmic
            | ConversionType::Rational
            | ConversionType::TabularInterp
            | ConversionType::Tabular => 8 * self.params.len(),
            ConversionType::Formula => {
                self.formula.as_ref().map(|f| f.len() + 1).unwrap_or(1)
            }
            ConversionType::ValueToText => 40 * self.value_texts.len(),
            ConversionType::ValueRangeToText => 20 * self.range_texts.len(),
            _ => 0,
        }
    }

    fn param_count(&self) -> usize {
        match self.conversion_type {
            ConversionType::TabularInterp | ConversionType::Tabular => self.params.len() / 2,
            ConversionType::ValueToText => self.value_texts.len(),
            ConversionType::ValueRangeToText => self.range_texts.len(),
            ConversionType::Formula => 0,
            _ => self.params.len(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let size = CC_BLOCK_SIZE_MIN + self.payload_size();
        if size > u16::MAX as usize {
            return Err(Error::BlockSerializationError(format!(
                "conversion block size {size} exceeds the 16-bit block size field"
            )));
        }

        let mut buffer = BlockHeader::new("CC", size as u16).to_bytes();
        buffer.extend_from_slice(&self.range_valid.to_le_bytes());
        buffer.extend_from_slice(&self.min_phys.to_le_bytes());
        buffer.extend_from_slice(&self.max_phys.to_le_bytes());
        write_str(&mut buffer, &self.unit, 20);
        buffer.extend_from_slice(&self.conversion_type.to_u16().to_le_bytes());
        buffer.extend_from_slice(&(self.param_count() as u16).to_le_bytes());

        match self.conversion_type {
            ConversionType::Formula => {
                if let Some(f) = &self.formula {
                    buffer.extend(f.chars().map(|c| if (c as u32) < 256 { c as u8 } else { b'?' }));
                }
                buffer.push(0);
            }
            ConversionType::ValueToText => {
                for (value, text) in &self.value_texts {
                    buffer.extend_from_slice(&value.to_le_bytes());
                    write_str(&mut buffer, text, 32);
                }
            }
            ConversionType::ValueRangeToText => {
                for entry in &self.range_texts {
                    buffer.extend_from_slice(&entry.lower.to_le_bytes());
                    buffer.extend_from_slice(&entry.upper.to_le_bytes());
                    buffer.extend_from_slice(&entry.text_addr.to_le_bytes());
                }
            }
            _ => {
                for p in &self.params {
                    buffer.extend_from_slice(&p.to_le_bytes());
                }
            }
        }

        if buffer.len() != size {
            return Err(Error::BlockSerializationError(format!(
                "conversion block expected size {size} but wrote {}",
                buffer.len()
            )));
        }
        Ok(buffer)
    }

    /// Convert one raw value to its physical value.
    ///
    /// Malformed parameter sets (too few coefficients, zero denominators)
    /// degrade to returning the raw value unchanged rather than failing the
    /// whole decode.
    pub fn convert(&self, raw: f64) -> f64 {
        let phys = match self.conversion_type {
            ConversionType::Linear => apply_linear(&self.params, raw),
            ConversionType::TabularInterp => lookup_table(&self.params, raw, true),
            ConversionType::Tabular => lookup_table(&self.params, raw, false),
            ConversionType::Polynomial => apply_polynomial(&self.params, raw),
            ConversionType::Exponential => apply_exponential(&self.params, raw),
            ConversionType::Logarithmic => apply_logarithmic(&self.params, raw),
            ConversionType::Rational => apply_rational(&self.params, raw),
            ConversionType::Formula => self
                .formula
                .as_deref()
                .and_then(|f| eval_formula(f, raw).ok()),
            _ => None,
        };
        phys.unwrap_or(raw)
    }

    /// Convert a whole sample column to physical values.
    ///
    /// Numeric columns come back as floats; strings, byte arrays and
    /// composite columns pass through untouched.
    pub fn convert_samples(&self, samples: &Samples) -> Samples {
        match samples {
            Samples::UnsignedInteger(v) => {
                Samples::Float(v.iter().map(|&x| self.convert(x as f64)).collect())
            }
            Samples::SignedInteger(v) => {
                Samples::Float(v.iter().map(|&x| self.convert(x as f64)).collect())
            }
            Samples::Float(v) => Samples::Float(v.iter().map(|&x| self.convert(x)).collect()),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_roundtrip_and_convert() {
        let cc = ConversionBlock::linear(-40.0, 0.1);
        let parsed = ConversionBlock::from_bytes(&cc.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.conversion_type, ConversionType::Linear);
        assert_eq!(parsed.params, vec![-40.0, 0.1]);
        assert!((parsed.convert(500.0) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn identity_passes_values_through() {
        let cc = ConversionBlock::identity("rpm");
        assert!(cc.is_identity());
        assert_eq!(cc.unit, "rpm");
        assert_eq!(cc.convert(42.5), 42.5);
    }

    #[test]
    fn trivial_linear_is_identity() {
        assert!(ConversionBlock::linear(0.0, 1.0).is_identity());
        assert!(!ConversionBlock::linear(1.0, 1.0).is_identity());
    }

    #[test]
    fn formula_roundtrip() {
        let mut cc = ConversionBlock::identity("");
        cc.conversion_type = ConversionType::Formula;
        cc.formula = Some(String::from("2*X + 1"));
        let parsed = ConversionBlock::from_bytes(&cc.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.formula.as_deref(), Some("2*X + 1"));
        assert!((parsed.convert(3.0) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn value_to_text_roundtrip() {
        let mut cc = ConversionBlock::identity("");
        cc.conversion_type = ConversionType::ValueToText;
        cc.value_texts = vec![(0.0, String::from("off")), (1.0, String::from("on"))];
        let parsed = ConversionBlock::from_bytes(&cc.to_bytes().unwrap()).unwrap();
        assert!(parsed.is_value_to_text());
        assert_eq!(parsed.value_texts, cc.value_texts);
        // Lookup tables never alter the numeric sample column
        assert_eq!(parsed.convert(1.0), 1.0);
    }

    #[test]
    fn tabular_interpolation() {
        let mut cc = ConversionBlock::identity("");
        cc.conversion_type = ConversionType::TabularInterp;
        cc.params = vec![0.0, 0.0, 10.0, 100.0];
        let parsed = ConversionBlock::from_bytes(&cc.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.params.len(), 4);
        assert!((parsed.convert(5.0) - 50.0).abs() < 1e-12);
    }
}
