// src/blocks/header_block.rs
use super::HD_BLOCK_SIZE;
use crate::{
    Result,
    blocks::common::{BlockHeader, BlockParse, read_u64, validate_block_id, validate_buffer_size},
};
use alloc::vec::Vec;

/// Header block (##HD) - the root of the measurement graph.
///
/// Always follows the identification block at file offset 64. Points at the
/// first data group, attachment, file history and event chains and carries
/// the absolute measurement start time.
#[derive(Debug, Clone)]
pub struct HeaderBlock {
    pub header: BlockHeader,
    /// Link to the first data group block.
    pub first_dg_addr: u64,
    /// Link to the first file history block.
    pub file_history_addr: u64,
    /// Link to the channel hierarchy tree (unused by this crate).
    pub channel_tree_addr: u64,
    /// Link to the first attachment block.
    pub first_attachment_addr: u64,
    /// Link to the first event block.
    pub first_event_addr: u64,
    /// Link to an MD metadata block (author, project, subject, ...).
    pub comment_addr: u64,
    /// Absolute measurement start time in nanoseconds since the Unix epoch.
    pub start_time_ns: u64,
    /// Timezone offset in minutes (valid when bit 1 of `time_flags` is set).
    pub tz_offset_min: i16,
    /// Daylight saving time offset in minutes.
    pub dst_offset_min: i16,
    /// Bit 0: local time, bit 1: offsets valid.
    pub time_flags: u8,
    /// Time quality class (0 = local PC clock).
    pub time_quality: u8,
    /// Bit 0: start angle valid, bit 1: start distance valid.
    pub flags: u8,
    pub reserved1: u8,
    /// Start angle in radians (raw bit pattern of an f64).
    pub start_angle: u64,
    /// Start distance in meters (raw bit pattern of an f64).
    pub start_distance: u64,
}

impl BlockParse<'_> for HeaderBlock {
    const ID: &'static str = "##HD";

    /// Creates a HeaderBlock from a 104-byte slice.
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, HD_BLOCK_SIZE)?;

        Ok(Self {
            header,
            first_dg_addr: read_u64(bytes, 24),
            file_history_addr: read_u64(bytes, 32),
            channel_tree_addr: read_u64(bytes, 40),
            first_attachment_addr: read_u64(bytes, 48),
            first_event_addr: read_u64(bytes, 56),
            comment_addr: read_u64(bytes, 64),
            start_time_ns: read_u64(bytes, 72),
            tz_offset_min: i16::from_le_bytes(bytes[80..82].try_into().unwrap()),
            dst_offset_min: i16::from_le_bytes(bytes[82..84].try_into().unwrap()),
            time_flags: bytes[84],
            time_quality: bytes[85],
            flags: bytes[86],
            reserved1: bytes[87],
            start_angle: read_u64(bytes, 88),
            start_distance: read_u64(bytes, 96),
        })
    }
}

impl HeaderBlock {
    /// Serializes the HeaderBlock to bytes according to MDF 4.1.
    ///
    /// # Structure (104 bytes total):
    /// - BlockHeader (24 bytes) with id "##HD"
    /// - Link section (48 bytes): six 8-byte links (DG, FH, CH tree, AT,
    ///   EV, MD comment)
    /// - Time section (16 bytes): start time, timezone and DST offsets,
    ///   time flags and quality
    /// - Angle/distance section (16 bytes)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        validate_block_id(&self.header, "##HD")?;

        let mut buffer = Vec::with_capacity(HD_BLOCK_SIZE);

        buffer.extend_from_slice(&self.header.to_bytes()?);

        buffer.extend_from_slice(&self.first_dg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.file_history_addr.to_le_bytes());
        buffer.extend_from_slice(&self.channel_tree_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_attachment_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_event_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());

        buffer.extend_from_slice(&self.start_time_ns.to_le_bytes());
        buffer.extend_from_slice(&self.tz_offset_min.to_le_bytes());
        buffer.extend_from_slice(&self.dst_offset_min.to_le_bytes());
        buffer.push(self.time_flags);
        buffer.push(self.time_quality);
        buffer.push(self.flags);
        buffer.push(self.reserved1);

        buffer.extend_from_slice(&self.start_angle.to_le_bytes());
        buffer.extend_from_slice(&self.start_distance.to_le_bytes());

        debug_assert_eq!(buffer.len(), HD_BLOCK_SIZE);
        Ok(buffer)
    }
}

impl Default for HeaderBlock {
    fn default() -> Self {
        HeaderBlock {
            header: BlockHeader::new("##HD", HD_BLOCK_SIZE as u64, 6),
            first_dg_addr: 0,
            file_history_addr: 0,
            channel_tree_addr: 0,
            first_attachment_addr: 0,
            first_event_addr: 0,
            comment_addr: 0,
            start_time_ns: 0,
            tz_offset_min: 0,
            dst_offset_min: 0,
            time_flags: 0,
            time_quality: 0,
            flags: 0,
            reserved1: 0,
            start_angle: 0,
            start_distance: 0,
        }
    }
}
