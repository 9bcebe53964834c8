use crate::{
    Result,
    blocks::common::{BlockHeader, BlockParse, validate_buffer_size},
};

/// Signal data block (##SD) - the contiguous store for VLSD-in-place.
///
/// Holds the concatenated sequence of variable-length values, each prefixed
/// by a little-endian u32 length: `[len][bytes][len][bytes]...` The 64-bit
/// index stored in the owning channel's fixed record is the byte offset of
/// a `[len]` prefix within this stream.
pub struct SignalDataBlock<'a> {
    pub header: BlockHeader,
    /// The VLSD stream: `[u32 length][value bytes]` repeated back-to-back.
    pub data: &'a [u8],
}

impl<'a> BlockParse<'a> for SignalDataBlock<'a> {
    const ID: &'static str = "##SD";

    fn from_bytes(bytes: &'a [u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let expected_bytes = header.length as usize;
        validate_buffer_size(bytes, expected_bytes)?;

        let data = &bytes[24..expected_bytes];

        Ok(SignalDataBlock { header, data })
    }
}

impl<'a> SignalDataBlock<'a> {
    /// Iterate over `(stream_offset, payload)` pairs in this block.
    ///
    /// `base_offset` is the stream offset of the first payload, non-zero
    /// when this block is a later fragment of a DL chain.
    pub fn payloads(&self, base_offset: u64) -> SignalDataIter<'a> {
        SignalDataIter {
            data: self.data,
            pos: 0,
            base_offset,
        }
    }
}

/// Iterator over the length-prefixed payloads of an SD stream.
pub struct SignalDataIter<'a> {
    data: &'a [u8],
    pos: usize,
    base_offset: u64,
}

impl<'a> Iterator for SignalDataIter<'a> {
    type Item = (u64, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos + 4 > self.data.len() {
            return None;
        }
        let len =
            u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().unwrap()) as usize;
        let start = self.pos + 4;
        let end = start.checked_add(len)?;
        if end > self.data.len() {
            return None;
        }
        let offset = self.base_offset + self.pos as u64;
        self.pos = end;
        Some((offset, &self.data[start..end]))
    }
}
