use super::SI_BLOCK_SIZE;
use crate::{
    Result,
    blocks::common::{BlockHeader, BlockParse, read_u64, validate_block_id, validate_buffer_size},
};
use alloc::vec::Vec;

/// Kind of source that acquired a signal (`si_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SourceType {
    #[default]
    Other,
    Ecu,
    Bus,
    Io,
    Tool,
    User,
    Unknown(u8),
}

impl SourceType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => SourceType::Other,
            1 => SourceType::Ecu,
            2 => SourceType::Bus,
            3 => SourceType::Io,
            4 => SourceType::Tool,
            5 => SourceType::User,
            other => SourceType::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            SourceType::Other => 0,
            SourceType::Ecu => 1,
            SourceType::Bus => 2,
            SourceType::Io => 3,
            SourceType::Tool => 4,
            SourceType::User => 5,
            SourceType::Unknown(v) => v,
        }
    }
}

/// Bus kind of a source (`si_bus_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BusType {
    #[default]
    None,
    Other,
    Can,
    Lin,
    Most,
    FlexRay,
    KLine,
    Ethernet,
    Usb,
    Unknown(u8),
}

impl BusType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => BusType::None,
            1 => BusType::Other,
            2 => BusType::Can,
            3 => BusType::Lin,
            4 => BusType::Most,
            5 => BusType::FlexRay,
            6 => BusType::KLine,
            7 => BusType::Ethernet,
            8 => BusType::Usb,
            other => BusType::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            BusType::None => 0,
            BusType::Other => 1,
            BusType::Can => 2,
            BusType::Lin => 3,
            BusType::Most => 4,
            BusType::FlexRay => 5,
            BusType::KLine => 6,
            BusType::Ethernet => 7,
            BusType::Usb => 8,
            BusType::Unknown(v) => v,
        }
    }
}

/// Source information block (##SI).
///
/// Describes where a channel or channel group was acquired: the source
/// kind, the bus kind, and name/path/comment text links.
#[derive(Debug, Clone)]
pub struct SourceBlock {
    pub header: BlockHeader,
    /// Link to a TX block with the human-readable source name.
    pub name_addr: u64,
    /// Link to a TX block with a tool-specific path/namespace.
    pub path_addr: u64,
    /// Link to a TX/MD block with an extended comment.
    pub comment_addr: u64,
    pub source_type: SourceType,
    pub bus_type: BusType,
    /// Bit 0: simulated source.
    pub flags: u8,
}

impl BlockParse<'_> for SourceBlock {
    const ID: &'static str = "##SI";

    /// Parse an SI block from its raw bytes (starting at the "##SI" header).
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, SI_BLOCK_SIZE)?;

        Ok(SourceBlock {
            header,
            name_addr: read_u64(bytes, 24),
            path_addr: read_u64(bytes, 32),
            comment_addr: read_u64(bytes, 40),
            source_type: SourceType::from_u8(bytes[48]),
            bus_type: BusType::from_u8(bytes[49]),
            flags: bytes[50],
            // bytes 51..56 are reserved
        })
    }
}

impl SourceBlock {
    /// Serializes the SourceBlock to its 56-byte on-disk form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        validate_block_id(&self.header, "##SI")?;

        let mut buffer = Vec::with_capacity(SI_BLOCK_SIZE);

        buffer.extend_from_slice(&self.header.to_bytes()?);

        buffer.extend_from_slice(&self.name_addr.to_le_bytes());
        buffer.extend_from_slice(&self.path_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());

        buffer.push(self.source_type.to_u8());
        buffer.push(self.bus_type.to_u8());
        buffer.push(self.flags);
        buffer.extend_from_slice(&[0u8; 5]);

        debug_assert_eq!(buffer.len(), SI_BLOCK_SIZE);
        Ok(buffer)
    }

    /// A source describing a CAN bus.
    pub fn can_bus() -> Self {
        SourceBlock {
            source_type: SourceType::Bus,
            bus_type: BusType::Can,
            ..Default::default()
        }
    }

    /// A source describing an ECU on a CAN bus.
    pub fn can_ecu() -> Self {
        SourceBlock {
            source_type: SourceType::Ecu,
            bus_type: BusType::Can,
            ..Default::default()
        }
    }

    /// A source describing a LIN bus.
    pub fn lin_bus() -> Self {
        SourceBlock {
            source_type: SourceType::Bus,
            bus_type: BusType::Lin,
            ..Default::default()
        }
    }

    /// A source describing an Ethernet network.
    pub fn ethernet_bus() -> Self {
        SourceBlock {
            source_type: SourceType::Bus,
            bus_type: BusType::Ethernet,
            ..Default::default()
        }
    }
}

impl Default for SourceBlock {
    fn default() -> Self {
        SourceBlock {
            header: BlockHeader::new("##SI", SI_BLOCK_SIZE as u64, 3),
            name_addr: 0,
            path_addr: 0,
            comment_addr: 0,
            source_type: SourceType::Other,
            bus_type: BusType::None,
            flags: 0,
        }
    }
}

/// Read an SI block from the file bytes at `address`.
pub(crate) fn read_source_block(file_data: &[u8], address: u64) -> Result<SourceBlock> {
    let start = address as usize;
    validate_buffer_size(file_data, start + SI_BLOCK_SIZE)?;
    SourceBlock::from_bytes(&file_data[start..])
}
