use crate::{
    Result,
    blocks::{BusType, SourceType, read_source_block, read_string_block},
};
use alloc::string::String;

/// Ergonomic view of an SI block: resolved name, path, comment and the
/// typed source/bus kinds.
#[derive(Debug)]
pub struct SourceInfo {
    /// The source name (si_tx_name).
    pub name: Option<String>,
    /// The source path (si_tx_path).
    pub path: Option<String>,
    /// Any extended comment/XML (si_md_comment).
    pub comment: Option<String>,
    /// Kind of source (ECU, bus, tool, ...).
    pub source_type: SourceType,
    /// Kind of bus (CAN, LIN, Ethernet, ...).
    pub bus_type: BusType,
}

impl SourceInfo {
    /// Parse a source information block from the file bytes.
    ///
    /// # Arguments
    /// * `file_data` - The complete MDF file bytes
    /// * `address` - File offset of the SI block (0 if not present)
    ///
    /// # Returns
    /// `Ok(Some(SourceInfo))` if a block was found, `Ok(None)` if the
    /// address was zero, or an error when parsing fails.
    pub fn from_file_data(file_data: &[u8], address: u64) -> Result<Option<Self>> {
        if address == 0 {
            return Ok(None);
        }
        let sb = read_source_block(file_data, address)?;
        let name = read_string_block(file_data, sb.name_addr)?;
        let path = read_string_block(file_data, sb.path_addr)?;
        let comment = read_string_block(file_data, sb.comment_addr)?;
        Ok(Some(SourceInfo {
            name,
            path,
            comment,
            source_type: sb.source_type,
            bus_type: sb.bus_type,
        }))
    }
}
