use super::CN_BLOCK_SIZE;
use crate::{
    Result,
    blocks::{
        cn_flags,
        common::{
            BlockHeader, BlockParse, ChannelType, DataType, SyncType, read_f64, read_u16,
            read_u32, read_u64, validate_block_id, validate_buffer_size,
        },
        conversion::ConversionBlock,
        text_block::TextBlock,
    },
    types::DecodedValue,
};
use alloc::string::String;
use alloc::vec::Vec;

/// Channel block (##CN) - one signal inside a channel group's record.
///
/// Describes the bit layout of the signal within the record, its data type,
/// validity flags, optional conversion and source, and (for composition
/// channels) a link to sub-channels overlaying the parent's byte range.
#[derive(Debug, Clone)]
pub struct ChannelBlock {
    pub header: BlockHeader,
    /// Link to the next channel in the chain (0 = end).
    pub next_ch_addr: u64,
    /// Link to a composition: a sub-channel chain or a CA array block.
    pub component_addr: u64,
    /// Link to a TX block with the channel name.
    pub name_addr: u64,
    /// Link to an SI source block.
    pub source_addr: u64,
    /// Link to a CC conversion block.
    pub conversion_addr: u64,
    /// Signal data link: SD/DL/DZ chain for VLSD channels.
    pub data_addr: u64,
    /// Link to a TX/MD block with the unit.
    pub unit_addr: u64,
    /// Link to a TX/MD comment block.
    pub comment_addr: u64,
    /// Channel kind.
    pub channel_type: ChannelType,
    /// Synchronization kind (time/angle/distance/index) for masters.
    pub sync_type: SyncType,
    /// Data type of the raw value.
    pub data_type: DataType,
    /// Bit offset within the first byte (0..7).
    pub bit_offset: u8,
    /// Byte offset of the value within the record data bytes.
    pub byte_offset: u32,
    /// Number of bits of the raw value.
    pub bit_count: u32,
    /// Flags, see [`cn_flags`].
    pub flags: u32,
    /// Position of the invalidation bit within the invalidation bytes.
    pub pos_invalidation_bit: u32,
    /// Decimal digits of precision (valid with `PRECISION_VALID`).
    pub precision: u8,
    pub reserved1: u8,
    /// Number of attachment references (not stored by this crate).
    pub attachment_count: u16,
    /// Minimum raw value (valid with `RANGE_VALID`).
    pub min_raw_value: f64,
    /// Maximum raw value (valid with `RANGE_VALID`).
    pub max_raw_value: f64,
    /// Lower limit (valid with `LIMIT_VALID`).
    pub lower_limit: f64,
    /// Upper limit (valid with `LIMIT_VALID`).
    pub upper_limit: f64,
    /// Lower extended limit (valid with `EXTENDED_LIMIT_VALID`).
    pub lower_ext_limit: f64,
    /// Upper extended limit (valid with `EXTENDED_LIMIT_VALID`).
    pub upper_ext_limit: f64,

    /// Resolved channel name (from `name_addr`).
    pub name: Option<String>,
    /// Resolved conversion block (from `conversion_addr`).
    pub conversion: Option<ConversionBlock>,
}

impl BlockParse<'_> for ChannelBlock {
    const ID: &'static str = "##CN";

    /// Creates a ChannelBlock from a 160-byte slice. Does not resolve the
    /// name or conversion links.
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, CN_BLOCK_SIZE)?;

        Ok(Self {
            header,
            next_ch_addr: read_u64(bytes, 24),
            component_addr: read_u64(bytes, 32),
            name_addr: read_u64(bytes, 40),
            source_addr: read_u64(bytes, 48),
            conversion_addr: read_u64(bytes, 56),
            data_addr: read_u64(bytes, 64),
            unit_addr: read_u64(bytes, 72),
            comment_addr: read_u64(bytes, 80),
            channel_type: ChannelType::from_u8(bytes[88]),
            sync_type: SyncType::from_u8(bytes[89]),
            data_type: DataType::from_u8(bytes[90]),
            bit_offset: bytes[91],
            byte_offset: read_u32(bytes, 92),
            bit_count: read_u32(bytes, 96),
            flags: read_u32(bytes, 100),
            pos_invalidation_bit: read_u32(bytes, 104),
            precision: bytes[108],
            reserved1: bytes[109],
            attachment_count: read_u16(bytes, 110),
            min_raw_value: read_f64(bytes, 112),
            max_raw_value: read_f64(bytes, 120),
            lower_limit: read_f64(bytes, 128),
            upper_limit: read_f64(bytes, 136),
            lower_ext_limit: read_f64(bytes, 144),
            upper_ext_limit: read_f64(bytes, 152),
            name: None,
            conversion: None,
        })
    }
}

impl ChannelBlock {
    /// Serializes the ChannelBlock to its 160-byte on-disk form.
    ///
    /// # Structure:
    /// - BlockHeader (24 bytes) with id "##CN"
    /// - Link section (64 bytes): next CN, component, name, source,
    ///   conversion, signal data, unit, comment
    /// - Format section (24 bytes): channel/sync/data type, bit layout,
    ///   flags, invalidation bit, precision, attachment count
    /// - Range section (48 bytes): raw range, limits, extended limits
    ///
    /// The resolved `name` and `conversion` fields are not serialized here;
    /// they live in their own blocks reached through the link section.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        validate_block_id(&self.header, "##CN")?;

        let mut buffer = Vec::with_capacity(CN_BLOCK_SIZE);

        buffer.extend_from_slice(&self.header.to_bytes()?);

        buffer.extend_from_slice(&self.next_ch_addr.to_le_bytes());
        buffer.extend_from_slice(&self.component_addr.to_le_bytes());
        buffer.extend_from_slice(&self.name_addr.to_le_bytes());
        buffer.extend_from_slice(&self.source_addr.to_le_bytes());
        buffer.extend_from_slice(&self.conversion_addr.to_le_bytes());
        buffer.extend_from_slice(&self.data_addr.to_le_bytes());
        buffer.extend_from_slice(&self.unit_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());

        buffer.push(self.channel_type.to_u8());
        buffer.push(self.sync_type.to_u8());
        buffer.push(self.data_type.to_u8());
        buffer.push(self.bit_offset);
        buffer.extend_from_slice(&self.byte_offset.to_le_bytes());
        buffer.extend_from_slice(&self.bit_count.to_le_bytes());
        buffer.extend_from_slice(&self.flags.to_le_bytes());
        buffer.extend_from_slice(&self.pos_invalidation_bit.to_le_bytes());
        buffer.push(self.precision);
        buffer.push(self.reserved1);
        buffer.extend_from_slice(&self.attachment_count.to_le_bytes());

        buffer.extend_from_slice(&self.min_raw_value.to_le_bytes());
        buffer.extend_from_slice(&self.max_raw_value.to_le_bytes());
        buffer.extend_from_slice(&self.lower_limit.to_le_bytes());
        buffer.extend_from_slice(&self.upper_limit.to_le_bytes());
        buffer.extend_from_slice(&self.lower_ext_limit.to_le_bytes());
        buffer.extend_from_slice(&self.upper_ext_limit.to_le_bytes());

        debug_assert_eq!(buffer.len(), CN_BLOCK_SIZE);
        Ok(buffer)
    }

    /// True when this channel stores a VLSD index instead of inline data.
    pub fn is_variable_length(&self) -> bool {
        self.channel_type == ChannelType::VariableLength
    }

    /// True when the bus-event flag is set.
    pub fn is_bus_event(&self) -> bool {
        self.flags & cn_flags::BUS_EVENT != 0
    }

    /// Number of record bytes this channel's raw value spans.
    pub fn byte_span(&self) -> usize {
        if self.data_type.is_byte_aligned() {
            (self.bit_count as usize) / 8
        } else {
            (self.bit_offset as usize + self.bit_count as usize).div_ceil(8)
        }
    }

    /// Load the channel name from the file using the stored `name_addr`.
    pub fn resolve_name(&mut self, file_data: &[u8]) -> Result<()> {
        if self.name.is_none() && self.name_addr != 0 {
            let offset = self.name_addr as usize;
            if offset + 24 <= file_data.len() {
                let text_block = TextBlock::from_bytes(&file_data[offset..])?;
                self.name = Some(text_block.text);
            }
        }
        Ok(())
    }

    /// Resolve and store the conversion block pointed to by
    /// `conversion_addr`.
    pub fn resolve_conversion(&mut self, file_data: &[u8]) -> Result<()> {
        if self.conversion.is_none() && self.conversion_addr != 0 {
            let offset = self.conversion_addr as usize;
            validate_buffer_size(file_data, offset + 24)?;

            let mut conv_block = ConversionBlock::from_bytes(&file_data[offset..])?;
            let _ = conv_block.resolve_formula(file_data);
            self.conversion = Some(conv_block);
        }
        Ok(())
    }

    /// Apply the stored conversion to a decoded value.
    ///
    /// If no conversion block is attached the input value is returned
    /// unchanged.
    pub fn apply_conversion_value(
        &self,
        raw: DecodedValue,
        file_data: &[u8],
    ) -> Result<DecodedValue> {
        match &self.conversion {
            Some(conv) => conv.apply_decoded(raw, file_data),
            None => Ok(raw),
        }
    }
}

impl Default for ChannelBlock {
    fn default() -> Self {
        ChannelBlock {
            header: BlockHeader::new("##CN", CN_BLOCK_SIZE as u64, 8),
            next_ch_addr: 0,
            component_addr: 0,
            name_addr: 0,
            source_addr: 0,
            conversion_addr: 0,
            data_addr: 0,
            unit_addr: 0,
            comment_addr: 0,
            channel_type: ChannelType::FixedLength,
            sync_type: SyncType::None,
            data_type: DataType::UnsignedIntegerLE,
            bit_offset: 0,
            byte_offset: 0,
            bit_count: 0,
            flags: 0,
            pos_invalidation_bit: 0,
            precision: 0,
            reserved1: 0,
            attachment_count: 0,
            min_raw_value: 0.0,
            max_raw_value: 0.0,
            lower_limit: 0.0,
            upper_limit: 0.0,
            lower_ext_limit: 0.0,
            upper_ext_limit: 0.0,
            name: None,
            conversion: None,
        }
    }
}
