/// Represents the conversion type (formula identification) from a CCBLOCK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConversionType {
    /// 0: parametric linear
    Linear,
    /// 1: tabular with interpolation
    TabularInterp,
    /// 2: tabular without interpolation
    Tabular,
    /// 6: polynomial function
    Polynomial,
    /// 7: exponential function
    Exponential,
    /// 8: logarithmic function
    Logarithmic,
    /// 9: rational conversion formula
    Rational,
    /// 10: ASAM-MCD2 text formula
    Formula,
    /// 11: value to text table (COMPU_VTAB)
    ValueToText,
    /// 12: value range to text table (COMPU_VTAB_RANGE)
    ValueRangeToText,
    /// 132: date (7 byte)
    Date,
    /// 133: time (6 byte)
    Time,
    /// 65535: 1:1 conversion
    Identity,
    /// Any other unrecognized conversion type.
    Unknown(u16),
}

impl ConversionType {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => ConversionType::Linear,
            1 => ConversionType::TabularInterp,
            2 => ConversionType::Tabular,
            6 => ConversionType::Polynomial,
            7 => ConversionType::Exponential,
            8 => ConversionType::Logarithmic,
            9 => ConversionType::Rational,
            10 => ConversionType::Formula,
            11 => ConversionType::ValueToText,
            12 => ConversionType::ValueRangeToText,
            132 => ConversionType::Date,
            133 => ConversionType::Time,
            65535 => ConversionType::Identity,
            other => ConversionType::Unknown(other),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            ConversionType::Linear => 0,
            ConversionType::TabularInterp => 1,
            ConversionType::Tabular => 2,
            ConversionType::Polynomial => 6,
            ConversionType::Exponential => 7,
            ConversionType::Logarithmic => 8,
            ConversionType::Rational => 9,
            ConversionType::Formula => 10,
            ConversionType::ValueToText => 11,
            ConversionType::ValueRangeToText => 12,
            ConversionType::Date => 132,
            ConversionType::Time => 133,
            ConversionType::Identity => 65535,
            ConversionType::Unknown(v) => v,
        }
    }

    /// Value-to-text tables are lookups, not arithmetic; the decode
    /// pipeline keeps raw values for these.
    pub fn is_value_to_text(self) -> bool {
        matches!(
            self,
            ConversionType::ValueToText | ConversionType::ValueRangeToText
        )
    }
}
