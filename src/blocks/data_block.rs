use crate::{
    Result,
    blocks::common::{BlockHeader, BlockParse, validate_buffer_size},
};

/// Data block (##DT) - a raw concatenation of records.
///
/// Only a reference to the data portion is stored to avoid copying record
/// bytes during parsing.
#[derive(Debug, Clone)]
pub struct DataBlock<'a> {
    pub header: BlockHeader,
    pub data: &'a [u8],
}

impl<'a> BlockParse<'a> for DataBlock<'a> {
    const ID: &'static str = "##DT";

    /// Parse a DT block from the given byte slice.
    ///
    /// The slice must contain at least the number of bytes declared by the
    /// block length in the header.
    fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;

        let data_len = (header.length as usize).saturating_sub(24);
        validate_buffer_size(bytes, 24 + data_len)?;
        let data = &bytes[24..24 + data_len];
        Ok(Self { header, data })
    }
}

impl<'a> DataBlock<'a> {
    /// Parse a DT block from an unfinalized MDF file.
    ///
    /// In unfinalized files the block length in the header may still be 24
    /// (header only) while the actual data continues to the end of the
    /// file. All remaining bytes after the header are taken as data.
    pub fn from_bytes_unfinalized(bytes: &'a [u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let data = &bytes[24..];
        Ok(Self { header, data })
    }

    /// Iterate over raw records of fixed size. Trailing bytes that do not
    /// fill a whole record are ignored.
    pub fn records(&self, record_size: usize) -> impl Iterator<Item = &'a [u8]> {
        self.data.chunks_exact(record_size)
    }
}
