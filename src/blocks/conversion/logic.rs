use super::{linear, table_lookup, text};
use crate::Result;
use crate::blocks::conversion::base::ConversionBlock;
use crate::blocks::conversion::types::ConversionType;
use crate::types::DecodedValue;

impl ConversionBlock {
    /// Applies the conversion to a decoded channel value.
    ///
    /// Numeric conversions yield `DecodedValue::Float`; the text-table
    /// conversions yield `DecodedValue::String` (or recurse into a nested
    /// conversion). A failed numeric conversion (vanishing divisor,
    /// non-positive logarithm argument, non-finite result) yields
    /// `DecodedValue::Unknown`, which observers surface as an invalid
    /// sample rather than an error.
    ///
    /// # Parameters
    /// * `value`: The already-decoded channel value.
    /// * `file_data`: File bytes for resolving text references; may be
    ///   empty when the block's dependencies were pre-resolved.
    pub fn apply_decoded(&self, value: DecodedValue, file_data: &[u8]) -> Result<DecodedValue> {
        match self.conversion_type {
            ConversionType::Identity => Ok(value),
            ConversionType::Linear => linear::apply_linear(self, value),
            ConversionType::Rational => linear::apply_rational(self, value),
            ConversionType::Algebraic => linear::apply_algebraic(self, value),
            ConversionType::ValueToValueInterp => {
                table_lookup::apply_table_lookup(self, value, true)
            }
            ConversionType::ValueToValue => table_lookup::apply_table_lookup(self, value, false),
            ConversionType::RangeToValue => table_lookup::apply_range_lookup(self, value),
            ConversionType::ValueToText => text::apply_value_to_text(self, value, file_data),
            ConversionType::RangeToText => text::apply_range_to_text(self, value, file_data),
            ConversionType::TextToValue => text::apply_text_to_value(self, value, file_data),
            ConversionType::TextToTranslation => {
                text::apply_text_to_translation(self, value, file_data)
            }
            ConversionType::Polynomial => linear::apply_polynomial(self, value),
            ConversionType::Exponential => linear::apply_exponential(self, value),
            ConversionType::Logarithmic => linear::apply_logarithmic(self, value),
            ConversionType::Unknown(_) => Ok(value),
        }
    }

    /// The unit attached to this conversion overrides the channel's unit.
    /// Returns the resolved unit address, if any.
    pub fn unit_address(&self) -> Option<u64> {
        self.unit_addr
    }
}
