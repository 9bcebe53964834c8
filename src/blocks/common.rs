// blocks/common.rs
//! Common types, traits, and helper functions for MDF block parsing.
//!
//! This module provides:
//! - [`BlockHeader`]: The 24-byte header present in all MDF4 blocks
//! - [`BlockParse`]: Trait for parsing blocks from bytes
//! - [`DataType`], [`ChannelType`], [`SyncType`]: field enums shared by
//!   the channel block and the decoder
//! - Byte parsing helpers and the CN/CG flag constants

use crate::{
    Error, Result,
    blocks::{metadata_block::MetadataBlock, text_block::TextBlock},
};
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

// ============================================================================
// Byte Parsing Helpers
// ============================================================================

/// Read a u64 from a byte slice at the given offset (little-endian).
///
/// # Panics
/// Panics if `offset + 8 > bytes.len()`.
#[inline]
pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

/// Read a u32 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

/// Read a u16 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(bytes[offset..offset + 2].try_into().unwrap())
}

/// Read an f64 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_f64(bytes: &[u8], offset: usize) -> f64 {
    f64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

/// Read a u8 from a byte slice at the given offset.
#[inline]
pub fn read_u8(bytes: &[u8], offset: usize) -> u8 {
    bytes[offset]
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a buffer has at least `expected` bytes.
///
/// Returns `Err(TooShortBuffer)` if the buffer is too small.
#[inline]
pub fn validate_buffer_size(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() < expected {
        return Err(Error::TooShortBuffer {
            actual: bytes.len(),
            expected,
            file: file!(),
            line: line!(),
        });
    }
    Ok(())
}

/// Validate that a block header has the expected ID.
#[inline]
pub fn validate_block_id(header: &BlockHeader, expected_id: &str) -> Result<()> {
    if header.id != expected_id {
        return Err(Error::BlockSerializationError(format!(
            "Block must have ID '{}', found '{}'",
            expected_id, header.id
        )));
    }
    Ok(())
}

/// Assert that a buffer size is 8-byte aligned (debug builds only).
#[inline]
pub fn debug_assert_aligned(size: usize) {
    debug_assert_eq!(size % 8, 0, "Block size {} is not 8-byte aligned", size);
}

/// Calculate padding needed to reach 8-byte alignment.
#[inline]
pub const fn padding_to_align_8(size: usize) -> usize {
    (8 - (size % 8)) % 8
}

/// Safely convert a u64 offset/address to usize for indexing.
///
/// On 64-bit systems, this is always safe. On 32-bit systems, returns an
/// error if the value exceeds `usize::MAX`.
#[inline]
pub fn u64_to_usize(value: u64, context: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| {
        Error::BlockSerializationError(format!(
            "{} value {} exceeds maximum addressable size on this platform",
            context, value
        ))
    })
}

// ============================================================================
// Flag constants
// ============================================================================

/// Bit flags of the channel block (`cn_flags`).
pub mod cn_flags {
    /// All values of this channel are invalid.
    pub const ALL_VALUES_INVALID: u32 = 0x0001;
    /// The invalidation bit position is valid.
    pub const INVALIDATION_VALID: u32 = 0x0002;
    /// The precision field is valid.
    pub const PRECISION_VALID: u32 = 0x0004;
    /// The raw value range is valid.
    pub const RANGE_VALID: u32 = 0x0008;
    /// The limit range is valid.
    pub const LIMIT_VALID: u32 = 0x0010;
    /// The extended limit range is valid.
    pub const EXTENDED_LIMIT_VALID: u32 = 0x0020;
    /// The channel carries discrete values.
    pub const DISCRETE: u32 = 0x0040;
    /// Calibration channel.
    pub const CALIBRATION: u32 = 0x0080;
    /// Calculated channel.
    pub const CALCULATED: u32 = 0x0100;
    /// Virtual channel (no record bytes).
    pub const VIRTUAL: u32 = 0x0200;
    /// The channel is part of a bus event.
    pub const BUS_EVENT: u32 = 0x0400;
    /// Values are strictly monotonous.
    pub const STRICTLY_MONOTONOUS: u32 = 0x0800;
    /// Use this channel as the default X axis.
    pub const DEFAULT_X: u32 = 0x1000;
}

/// Bit flags of the channel group block (`cg_flags`).
pub mod cg_flags {
    /// The group stores variable-length signal data records.
    pub const VLSD: u16 = 0x0001;
    /// The group's records describe a bus event.
    pub const BUS_EVENT: u16 = 0x0002;
    /// The group's records describe a plain bus event (no additional
    /// application channels).
    pub const PLAIN_BUS_EVENT: u16 = 0x0004;
    /// The master channel lives in a remote group.
    pub const REMOTE_MASTER: u16 = 0x0008;
}

/// Standard unfinalized-flag bits of the identification block.
pub mod unfin_flags {
    /// Cycle counters of CG/CA blocks not updated.
    pub const CG_CYCLE_COUNT: u16 = 0x0001;
    /// Cycle counters of SR blocks not updated.
    pub const SR_CYCLE_COUNT: u16 = 0x0002;
    /// Length of the last DT block not updated.
    pub const DT_LENGTH: u16 = 0x0004;
    /// Length of the last RD block not updated.
    pub const RD_LENGTH: u16 = 0x0008;
    /// Last DL block of a chained list not updated.
    pub const DL_LENGTH: u16 = 0x0010;
    /// Cycle counters of VLSD CG blocks not updated.
    pub const VLSD_CG_CYCLE_COUNT: u16 = 0x0020;
    /// VLSD offsets of the last VLSD CG block not updated.
    pub const VLSD_OFFSET: u16 = 0x0040;
}

// ============================================================================
// Block header
// ============================================================================

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockHeader {
    /// 4-byte block type identifier (e.g., "##HD", "##DG").
    pub id: String,
    /// Reserved field, always 0.
    pub reserved: u32,
    /// Total length of the block in bytes, including this header.
    pub length: u64,
    /// Number of link fields in this block.
    pub link_count: u64,
}

impl BlockHeader {
    /// Construct a header for the given id, length and link count.
    pub fn new(id: &str, length: u64, link_count: u64) -> Self {
        BlockHeader {
            id: String::from(id),
            reserved: 0,
            length,
            link_count,
        }
    }

    /// Serializes the BlockHeader to bytes according to MDF 4.1.
    ///
    /// The BlockHeader is always 24 bytes and consists of:
    /// - id: 4 bytes (ASCII characters)
    /// - reserved: 4 bytes (always 0)
    /// - length: 8 bytes (total length of the block including this header)
    /// - link_count: 8 bytes (number of links in this block)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(24);

        let id_bytes = self.id.as_bytes();
        let mut id_field = [0u8; 4];
        let id_len = core::cmp::min(id_bytes.len(), 4);
        id_field[..id_len].copy_from_slice(&id_bytes[..id_len]);
        buffer.extend_from_slice(&id_field);

        buffer.extend_from_slice(&self.reserved.to_le_bytes());
        buffer.extend_from_slice(&self.length.to_le_bytes());
        buffer.extend_from_slice(&self.link_count.to_le_bytes());

        debug_assert_eq!(buffer.len(), 24);
        Ok(buffer)
    }

    /// Parse a block header from the first 24 bytes of `bytes`.
    ///
    /// # Returns
    /// A [`BlockHeader`] on success or [`Error::TooShortBuffer`] when the
    /// slice is smaller than 24 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        validate_buffer_size(bytes, 24)?;

        let id = match core::str::from_utf8(&bytes[0..4]) {
            Ok(s) => String::from(s),
            Err(_) => String::from_utf8_lossy(&bytes[0..4]).into_owned(),
        };

        Ok(Self {
            id,
            reserved: read_u32(bytes, 4),
            length: read_u64(bytes, 8),
            link_count: read_u64(bytes, 16),
        })
    }
}

impl Default for BlockHeader {
    /// Returns a BlockHeader with id 'UNSET' and length 0 as a placeholder.
    /// This is not a valid MDF block header and must be replaced before
    /// writing.
    fn default() -> Self {
        BlockHeader {
            id: String::from("UNSET"),
            reserved: 0,
            length: 0,
            link_count: 0,
        }
    }
}

pub trait BlockParse<'a>: Sized {
    const ID: &'static str;

    fn parse_header(bytes: &[u8]) -> Result<BlockHeader> {
        let header = BlockHeader::from_bytes(bytes)?;
        if header.id != Self::ID {
            return Err(Error::BlockIDError {
                actual: header.id.clone(),
                expected: Self::ID.to_string(),
            });
        }
        Ok(header)
    }

    fn from_bytes(bytes: &'a [u8]) -> Result<Self>;
}

// ============================================================================
// Field enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    UnsignedIntegerLE,
    UnsignedIntegerBE,
    SignedIntegerLE,
    SignedIntegerBE,
    FloatLE,
    FloatBE,
    StringLatin1,
    StringUtf8,
    StringUtf16LE,
    StringUtf16BE,
    ByteArray,
    MimeSample,
    MimeStream,
    CanOpenDate,
    CanOpenTime,
    ComplexLE,
    ComplexBE,
    Unknown(u8),
}

impl DataType {
    /// Converts the DataType enum value to its MDF 4.1 numeric code.
    pub fn to_u8(&self) -> u8 {
        match self {
            DataType::UnsignedIntegerLE => 0,
            DataType::UnsignedIntegerBE => 1,
            DataType::SignedIntegerLE => 2,
            DataType::SignedIntegerBE => 3,
            DataType::FloatLE => 4,
            DataType::FloatBE => 5,
            DataType::StringLatin1 => 6,
            DataType::StringUtf8 => 7,
            DataType::StringUtf16LE => 8,
            DataType::StringUtf16BE => 9,
            DataType::ByteArray => 10,
            DataType::MimeSample => 11,
            DataType::MimeStream => 12,
            DataType::CanOpenDate => 13,
            DataType::CanOpenTime => 14,
            DataType::ComplexLE => 15,
            DataType::ComplexBE => 16,
            DataType::Unknown(v) => *v,
        }
    }

    /// Convert a numeric representation to the corresponding `DataType`.
    /// Values outside the known range yield `DataType::Unknown`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => DataType::UnsignedIntegerLE,
            1 => DataType::UnsignedIntegerBE,
            2 => DataType::SignedIntegerLE,
            3 => DataType::SignedIntegerBE,
            4 => DataType::FloatLE,
            5 => DataType::FloatBE,
            6 => DataType::StringLatin1,
            7 => DataType::StringUtf8,
            8 => DataType::StringUtf16LE,
            9 => DataType::StringUtf16BE,
            10 => DataType::ByteArray,
            11 => DataType::MimeSample,
            12 => DataType::MimeStream,
            13 => DataType::CanOpenDate,
            14 => DataType::CanOpenTime,
            15 => DataType::ComplexLE,
            16 => DataType::ComplexBE,
            other => DataType::Unknown(other),
        }
    }

    /// Returns a typical bit width for this data type.
    /// Used when creating channels without an explicit bit count.
    pub fn default_bits(&self) -> u32 {
        match self {
            DataType::UnsignedIntegerLE
            | DataType::UnsignedIntegerBE
            | DataType::SignedIntegerLE
            | DataType::SignedIntegerBE => 32,
            DataType::FloatLE | DataType::FloatBE => 32,
            DataType::StringLatin1
            | DataType::StringUtf8
            | DataType::StringUtf16LE
            | DataType::StringUtf16BE
            | DataType::ByteArray
            | DataType::MimeSample
            | DataType::MimeStream => 8,
            DataType::CanOpenDate => 56,
            DataType::CanOpenTime => 48,
            DataType::ComplexLE | DataType::ComplexBE => 64,
            DataType::Unknown(_) => 8,
        }
    }

    /// True for the string and byte-array family that is always stored in
    /// whole bytes.
    pub fn is_byte_aligned(&self) -> bool {
        matches!(
            self,
            DataType::StringLatin1
                | DataType::StringUtf8
                | DataType::StringUtf16LE
                | DataType::StringUtf16BE
                | DataType::ByteArray
                | DataType::MimeSample
                | DataType::MimeStream
        )
    }
}

impl core::fmt::Display for DataType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DataType::UnsignedIntegerLE => write!(f, "uint (LE)"),
            DataType::UnsignedIntegerBE => write!(f, "uint (BE)"),
            DataType::SignedIntegerLE => write!(f, "int (LE)"),
            DataType::SignedIntegerBE => write!(f, "int (BE)"),
            DataType::FloatLE => write!(f, "float (LE)"),
            DataType::FloatBE => write!(f, "float (BE)"),
            DataType::StringLatin1 => write!(f, "string (Latin-1)"),
            DataType::StringUtf8 => write!(f, "string (UTF-8)"),
            DataType::StringUtf16LE => write!(f, "string (UTF-16 LE)"),
            DataType::StringUtf16BE => write!(f, "string (UTF-16 BE)"),
            DataType::ByteArray => write!(f, "byte array"),
            DataType::MimeSample => write!(f, "MIME sample"),
            DataType::MimeStream => write!(f, "MIME stream"),
            DataType::CanOpenDate => write!(f, "CANopen date"),
            DataType::CanOpenTime => write!(f, "CANopen time"),
            DataType::ComplexLE => write!(f, "complex (LE)"),
            DataType::ComplexBE => write!(f, "complex (BE)"),
            DataType::Unknown(v) => write!(f, "unknown ({v})"),
        }
    }
}

/// Channel kind (`cn_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChannelType {
    /// Fixed-length value inside the record.
    #[default]
    FixedLength,
    /// Variable-length value: the record stores an index into a side table.
    VariableLength,
    /// Master channel (the X axis of the group).
    Master,
    /// Virtual master: values are the record index itself.
    VirtualMaster,
    /// Synchronization channel.
    Sync,
    /// Maximum-length storage: the record reserves the worst case size.
    MaxLength,
    /// Virtual data channel (no record bytes).
    VirtualData,
    Unknown(u8),
}

impl ChannelType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelType::FixedLength,
            1 => ChannelType::VariableLength,
            2 => ChannelType::Master,
            3 => ChannelType::VirtualMaster,
            4 => ChannelType::Sync,
            5 => ChannelType::MaxLength,
            6 => ChannelType::VirtualData,
            other => ChannelType::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            ChannelType::FixedLength => 0,
            ChannelType::VariableLength => 1,
            ChannelType::Master => 2,
            ChannelType::VirtualMaster => 3,
            ChannelType::Sync => 4,
            ChannelType::MaxLength => 5,
            ChannelType::VirtualData => 6,
            ChannelType::Unknown(v) => v,
        }
    }

    /// True for the master channel kinds.
    pub fn is_master(self) -> bool {
        matches!(self, ChannelType::Master | ChannelType::VirtualMaster)
    }
}

/// Synchronization kind of a channel (`cn_sync_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SyncType {
    #[default]
    None,
    Time,
    Angle,
    Distance,
    Index,
    Unknown(u8),
}

impl SyncType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => SyncType::None,
            1 => SyncType::Time,
            2 => SyncType::Angle,
            3 => SyncType::Distance,
            4 => SyncType::Index,
            other => SyncType::Unknown(other),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            SyncType::None => 0,
            SyncType::Time => 1,
            SyncType::Angle => 2,
            SyncType::Distance => 3,
            SyncType::Index => 4,
            SyncType::Unknown(v) => v,
        }
    }
}

/// Read a text or metadata block at `address` and return its contents.
///
/// # Arguments
/// * `file_data` - The full MDF file bytes.
/// * `address` - Offset of the target block; use `0` for no block.
///
/// # Returns
/// The block's string contents if present or `Ok(None)` if `address` is zero
/// or the block type is not text or metadata.
pub fn read_string_block(file_data: &[u8], address: u64) -> Result<Option<String>> {
    if address == 0 {
        return Ok(None);
    }

    let offset = u64_to_usize(address, "block address")?;
    validate_buffer_size(file_data, offset + 24)?;
    let header = BlockHeader::from_bytes(&file_data[offset..offset + 24])?;

    match header.id.as_str() {
        "##TX" => Ok(Some(TextBlock::from_bytes(&file_data[offset..])?.text)),
        "##MD" => Ok(Some(MetadataBlock::from_bytes(&file_data[offset..])?.xml)),
        _ => Ok(None),
    }
}
