use super::DG_BLOCK_SIZE;
use crate::{
    Error, Result,
    blocks::common::{BlockHeader, BlockParse, read_u64, validate_block_id, validate_buffer_size},
};
use alloc::format;
use alloc::vec::Vec;

/// Data group block (##DG) - one recording stream.
///
/// A data group owns a list of channel groups whose records share one data
/// payload. The payload link resolves to a DT, a DL of DT/DZ fragments, or
/// an HL compression spine.
#[derive(Debug, Clone)]
pub struct DataGroupBlock {
    pub header: BlockHeader,
    /// Link to the next data group (0 = end of list).
    pub next_dg_addr: u64,
    /// Link to the first channel group.
    pub first_cg_addr: u64,
    /// Link to the data payload (DT, DL or HL block).
    pub data_block_addr: u64,
    /// Link to a TX/MD comment block.
    pub comment_addr: u64,
    /// Width of the record id prefix: 0, 1, 2, 4 or 8 bytes.
    pub record_id_len: u8,
}

impl BlockParse<'_> for DataGroupBlock {
    const ID: &'static str = "##DG";

    /// Parse a `DataGroupBlock` from a 64 byte slice.
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, DG_BLOCK_SIZE)?;

        Ok(Self {
            header,
            next_dg_addr: read_u64(bytes, 24),
            first_cg_addr: read_u64(bytes, 32),
            data_block_addr: read_u64(bytes, 40),
            comment_addr: read_u64(bytes, 48),
            record_id_len: bytes[56],
            // bytes 57..64 are reserved
        })
    }
}

impl DataGroupBlock {
    /// Creates a data group with the given record id width.
    pub fn with_record_id_len(record_id_len: u8) -> Result<Self> {
        match record_id_len {
            0 | 1 | 2 | 4 | 8 => Ok(DataGroupBlock {
                record_id_len,
                ..Default::default()
            }),
            other => Err(Error::BlockSerializationError(format!(
                "invalid record id length {other}, must be 0, 1, 2, 4 or 8"
            ))),
        }
    }

    /// Serializes the DataGroupBlock to its 64-byte on-disk form.
    ///
    /// # Structure:
    /// - BlockHeader (24 bytes) with id "##DG"
    /// - next_dg_addr, first_cg_addr, data_block_addr, comment_addr
    ///   (4 x 8 bytes)
    /// - record_id_len (1 byte) + 7 reserved bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        validate_block_id(&self.header, "##DG")?;

        let mut buffer = Vec::with_capacity(DG_BLOCK_SIZE);

        buffer.extend_from_slice(&self.header.to_bytes()?);

        buffer.extend_from_slice(&self.next_dg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_cg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.data_block_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());

        buffer.push(self.record_id_len);
        buffer.extend_from_slice(&[0u8; 7]);

        debug_assert_eq!(buffer.len(), DG_BLOCK_SIZE);
        Ok(buffer)
    }
}

impl Default for DataGroupBlock {
    fn default() -> Self {
        DataGroupBlock {
            header: BlockHeader::new("##DG", DG_BLOCK_SIZE as u64, 4),
            next_dg_addr: 0,
            first_cg_addr: 0,
            data_block_addr: 0,
            comment_addr: 0,
            record_id_len: 0,
        }
    }
}
