/// Represents the conversion type (cc_type) from a conversion block.
///
/// Codes 0..=10 are the MDF 4.1 wire values. The polynomial, exponential
/// and logarithmic forms are MDF3 carry-overs kept for in-memory use; they
/// never appear in an MDF4 file written by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConversionType {
    /// 0: 1:1 conversion (engineering = raw)
    Identity,
    /// 1: Linear conversion `eng = p0 + p1 * raw`
    Linear,
    /// 2: Rational conversion
    Rational,
    /// 3: Algebraic conversion (MCD-2 MC text formula)
    Algebraic,
    /// 4: Value to value tabular look-up with interpolation
    ValueToValueInterp,
    /// 5: Value to value tabular look-up without interpolation
    ValueToValue,
    /// 6: Value range to value tabular look-up
    RangeToValue,
    /// 7: Value to text/scale conversion tabular look-up
    ValueToText,
    /// 8: Value range to text/scale conversion tabular look-up
    RangeToText,
    /// 9: Text to value tabular look-up
    TextToValue,
    /// 10: Text to text tabular look-up (translation)
    TextToTranslation,
    /// 30: MDF3 polynomial (6 parameters)
    Polynomial,
    /// 31: MDF3 exponential (7 parameters)
    Exponential,
    /// 32: MDF3 logarithmic (7 parameters)
    Logarithmic,
    /// Any other unrecognized conversion type.
    Unknown(u8),
}

impl ConversionType {
    /// Converts a raw u8 value to the corresponding ConversionType.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ConversionType::Identity,
            1 => ConversionType::Linear,
            2 => ConversionType::Rational,
            3 => ConversionType::Algebraic,
            4 => ConversionType::ValueToValueInterp,
            5 => ConversionType::ValueToValue,
            6 => ConversionType::RangeToValue,
            7 => ConversionType::ValueToText,
            8 => ConversionType::RangeToText,
            9 => ConversionType::TextToValue,
            10 => ConversionType::TextToTranslation,
            30 => ConversionType::Polynomial,
            31 => ConversionType::Exponential,
            32 => ConversionType::Logarithmic,
            other => ConversionType::Unknown(other),
        }
    }

    /// Convert the `ConversionType` to its numeric representation.
    pub fn to_u8(self) -> u8 {
        match self {
            ConversionType::Identity => 0,
            ConversionType::Linear => 1,
            ConversionType::Rational => 2,
            ConversionType::Algebraic => 3,
            ConversionType::ValueToValueInterp => 4,
            ConversionType::ValueToValue => 5,
            ConversionType::RangeToValue => 6,
            ConversionType::ValueToText => 7,
            ConversionType::RangeToText => 8,
            ConversionType::TextToValue => 9,
            ConversionType::TextToTranslation => 10,
            ConversionType::Polynomial => 30,
            ConversionType::Exponential => 31,
            ConversionType::Logarithmic => 32,
            ConversionType::Unknown(v) => v,
        }
    }

    /// True for the conversion types that may produce text output.
    pub fn produces_text(self) -> bool {
        matches!(
            self,
            ConversionType::ValueToText
                | ConversionType::RangeToText
                | ConversionType::TextToTranslation
        )
    }
}
