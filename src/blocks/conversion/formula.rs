use crate::Result;
use crate::blocks::common::read_string_block;
use crate::blocks::conversion::base::ConversionBlock;
use crate::blocks::conversion::types::ConversionType;

impl ConversionBlock {
    /// Resolve and store the algebraic formula text for this block.
    ///
    /// Algebraic conversions store their MCD-2 MC formula in a TX block
    /// referenced by the first entry of the reference list. For every other
    /// conversion type this is a no-op.
    pub fn resolve_formula(&mut self, file_data: &[u8]) -> Result<()> {
        if self.conversion_type != ConversionType::Algebraic
            || self.formula.is_some()
            || self.refs.is_empty()
        {
            return Ok(());
        }

        if let Some(formula) = read_string_block(file_data, self.refs[0])? {
            self.formula = Some(formula);
        }

        Ok(())
    }
}
