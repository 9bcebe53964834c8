use super::HL_BLOCK_SIZE;
use crate::{
    Error, Result,
    blocks::common::{
        BlockHeader, BlockParse, read_u8, read_u16, read_u64, validate_block_id,
        validate_buffer_size,
    },
};
use alloc::format;
use alloc::vec::Vec;

/// Header list block (##HL) - the spine of a compressed data stream.
///
/// A data group whose payload is compressed links to an HL block instead of
/// a DT/DL. The HL names the compression algorithm used by all DZ blocks
/// underneath and points at the first DL of the fragment chain.
#[derive(Debug, Clone)]
pub struct HeaderListBlock {
    pub header: BlockHeader,
    /// Link to the first data list block.
    pub first_dl_addr: u64,
    /// Bit 0: equal-length fragments.
    pub flags: u16,
    /// Compression algorithm of the child DZ blocks (0 = DEFLATE, the only
    /// supported value).
    pub zip_type: u8,
}

impl BlockParse<'_> for HeaderListBlock {
    const ID: &'static str = "##HL";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, HL_BLOCK_SIZE)?;

        let first_dl_addr = read_u64(bytes, 24);
        let flags = read_u16(bytes, 32);
        let zip_type = read_u8(bytes, 34);
        // bytes 35..40 are reserved

        if zip_type > 1 {
            return Err(Error::UnsupportedFeature(format!(
                "HL compression algorithm {zip_type}; only DEFLATE is supported"
            )));
        }

        Ok(Self {
            header,
            first_dl_addr,
            flags,
            zip_type,
        })
    }
}

impl HeaderListBlock {
    /// Creates an HL block announcing plain DEFLATE compression.
    pub fn deflate() -> Self {
        Self {
            header: BlockHeader::new("##HL", HL_BLOCK_SIZE as u64, 1),
            first_dl_addr: 0,
            flags: 0,
            zip_type: 0,
        }
    }

    /// Serializes the HeaderListBlock to its 40-byte on-disk form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        validate_block_id(&self.header, "##HL")?;

        let mut buffer = Vec::with_capacity(HL_BLOCK_SIZE);

        buffer.extend_from_slice(&self.header.to_bytes()?);
        buffer.extend_from_slice(&self.first_dl_addr.to_le_bytes());
        buffer.extend_from_slice(&self.flags.to_le_bytes());
        buffer.push(self.zip_type);
        buffer.extend_from_slice(&[0u8; 5]);

        debug_assert_eq!(buffer.len(), HL_BLOCK_SIZE);
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut hl = HeaderListBlock::deflate();
        hl.first_dl_addr = 0x4000;

        let bytes = hl.to_bytes().unwrap();
        assert_eq!(bytes.len(), HL_BLOCK_SIZE);

        let parsed = HeaderListBlock::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.first_dl_addr, 0x4000);
        assert_eq!(parsed.zip_type, 0);
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let mut hl = HeaderListBlock::deflate();
        hl.zip_type = 9;
        let bytes = hl.to_bytes().unwrap();
        assert!(HeaderListBlock::from_bytes(&bytes).is_err());
    }
}
