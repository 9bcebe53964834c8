use super::CG_BLOCK_SIZE;
use crate::{
    Result,
    blocks::{
        cg_flags,
        channel_block::ChannelBlock,
        common::{
            BlockHeader, BlockParse, read_u16, read_u32, read_u64, validate_block_id,
            validate_buffer_size,
        },
    },
};
use alloc::vec::Vec;

/// Channel group block (##CG) - one record layout within a data group.
///
/// Carries the record id used to tag records in the shared data stream,
/// the cycle (sample) count, and the declared data/invalidation byte
/// widths of one record.
#[derive(Debug, Clone)]
pub struct ChannelGroupBlock {
    pub header: BlockHeader,
    /// Link to the next channel group (0 = end of list).
    pub next_cg_addr: u64,
    /// Link to the first channel of this group.
    pub first_ch_addr: u64,
    /// Link to a TX block with the acquisition name.
    pub acq_name_addr: u64,
    /// Link to an SI block describing the acquisition source.
    pub acq_source_addr: u64,
    /// Link to the first sample reduction block.
    pub first_sample_reduction_addr: u64,
    /// Link to a TX/MD comment block.
    pub comment_addr: u64,
    /// Record id, unique within the owning data group.
    pub record_id: u64,
    /// Number of cycles (samples) stored for this group.
    pub cycle_count: u64,
    /// Flags, see [`cg_flags`].
    pub flags: u16,
    /// Path separator code point for channel names (default `.`).
    pub path_separator: u16,
    /// Data bytes of one record (excluding record id and invalidation
    /// bytes).
    pub data_bytes: u32,
    /// Invalidation bytes appended to each record.
    pub invalidation_bytes: u32,
}

impl BlockParse<'_> for ChannelGroupBlock {
    const ID: &'static str = "##CG";

    /// Creates a ChannelGroupBlock from a 104-byte slice.
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, CG_BLOCK_SIZE)?;

        Ok(Self {
            header,
            next_cg_addr: read_u64(bytes, 24),
            first_ch_addr: read_u64(bytes, 32),
            acq_name_addr: read_u64(bytes, 40),
            acq_source_addr: read_u64(bytes, 48),
            first_sample_reduction_addr: read_u64(bytes, 56),
            comment_addr: read_u64(bytes, 64),
            record_id: read_u64(bytes, 72),
            cycle_count: read_u64(bytes, 80),
            flags: read_u16(bytes, 88),
            path_separator: read_u16(bytes, 90),
            // bytes 92..96 are reserved
            data_bytes: read_u32(bytes, 96),
            invalidation_bytes: read_u32(bytes, 100),
        })
    }
}

impl ChannelGroupBlock {
    /// Serializes the ChannelGroupBlock to its 104-byte on-disk form.
    ///
    /// # Structure:
    /// - BlockHeader (24 bytes) with id "##CG"
    /// - Link section (48 bytes): next CG, first CN, acquisition name,
    ///   acquisition source, first SR, comment
    /// - Data section (32 bytes): record id, cycle count, flags, path
    ///   separator, reserved, data bytes, invalidation bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        validate_block_id(&self.header, "##CG")?;

        let mut buffer = Vec::with_capacity(CG_BLOCK_SIZE);

        buffer.extend_from_slice(&self.header.to_bytes()?);

        buffer.extend_from_slice(&self.next_cg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_ch_addr.to_le_bytes());
        buffer.extend_from_slice(&self.acq_name_addr.to_le_bytes());
        buffer.extend_from_slice(&self.acq_source_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_sample_reduction_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());

        buffer.extend_from_slice(&self.record_id.to_le_bytes());
        buffer.extend_from_slice(&self.cycle_count.to_le_bytes());
        buffer.extend_from_slice(&self.flags.to_le_bytes());
        buffer.extend_from_slice(&self.path_separator.to_le_bytes());
        buffer.extend_from_slice(&[0u8; 4]);
        buffer.extend_from_slice(&self.data_bytes.to_le_bytes());
        buffer.extend_from_slice(&self.invalidation_bytes.to_le_bytes());

        debug_assert_eq!(buffer.len(), CG_BLOCK_SIZE);
        Ok(buffer)
    }

    /// True when this group holds length-prefixed VLSD side records instead
    /// of fixed records.
    pub fn is_vlsd(&self) -> bool {
        self.flags & cg_flags::VLSD != 0
    }

    /// Total bytes of one fixed record excluding the record id prefix.
    pub fn record_size(&self) -> usize {
        self.data_bytes as usize + self.invalidation_bytes as usize
    }

    /// Read all channels linked to this channel group, flattening
    /// composition chains into the returned list.
    ///
    /// # Arguments
    /// * `file_data` - Full MDF file bytes used to follow the channel chain.
    ///
    /// # Returns
    /// A vector of fully parsed [`ChannelBlock`]s or an error if any channel
    /// cannot be decoded.
    pub fn read_channels(&self, file_data: &[u8]) -> Result<Vec<ChannelBlock>> {
        let mut channels = Vec::new();
        Self::read_channel_chain(file_data, self.first_ch_addr, &mut channels, 0)?;
        Ok(channels)
    }

    fn read_channel_chain(
        file_data: &[u8],
        first_addr: u64,
        channels: &mut Vec<ChannelBlock>,
        depth: usize,
    ) -> Result<()> {
        // Composition chains are CN lists themselves; one level is the norm
        // for bus logging, but nested structures do occur.
        const MAX_COMPOSITION_DEPTH: usize = 8;
        if depth > MAX_COMPOSITION_DEPTH {
            return Ok(());
        }

        let mut current_addr = first_addr;
        while current_addr != 0 {
            let offset = current_addr as usize;
            validate_buffer_size(file_data, offset + super::CN_BLOCK_SIZE)?;
            let mut channel = ChannelBlock::from_bytes(&file_data[offset..])?;
            channel.resolve_name(file_data)?;
            channel.resolve_conversion(file_data)?;
            current_addr = channel.next_ch_addr;
            let component_addr = channel.component_addr;
            channels.push(channel);
            if component_addr != 0 {
                // A component link either points at a sub-channel chain or
                // at a CA array block; only CN chains are walked here.
                let comp_offset = component_addr as usize;
                validate_buffer_size(file_data, comp_offset + 24)?;
                if &file_data[comp_offset..comp_offset + 4] == b"##CN" {
                    Self::read_channel_chain(file_data, component_addr, channels, depth + 1)?;
                }
            }
        }
        Ok(())
    }
}

impl Default for ChannelGroupBlock {
    fn default() -> Self {
        ChannelGroupBlock {
            header: BlockHeader::new("##CG", CG_BLOCK_SIZE as u64, 6),
            next_cg_addr: 0,
            first_ch_addr: 0,
            acq_name_addr: 0,
            acq_source_addr: 0,
            first_sample_reduction_addr: 0,
            comment_addr: 0,
            record_id: 0,
            cycle_count: 0,
            flags: 0,
            path_separator: 0,
            data_bytes: 0,
            invalidation_bytes: 0,
        }
    }
}
