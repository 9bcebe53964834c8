//! Shared types used across the library.
//!
//! This module contains types that are available with just the `alloc` feature,
//! making them usable in both std and no_std environments.

use alloc::string::String;
use alloc::vec::Vec;

/// An enum representing the decoded value of a channel sample.
///
/// This type represents all possible values that can be stored in an MDF channel.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    /// Unsigned integer (up to 64 bits)
    UnsignedInteger(u64),
    /// Signed integer (up to 64 bits)
    SignedInteger(i64),
    /// Floating point value (32 or 64 bit)
    Float(f64),
    /// Text string (UTF-8 or converted from Latin-1)
    String(String),
    /// Raw byte array
    ByteArray(Vec<u8>),
    /// MIME sample data
    MimeSample(Vec<u8>),
    /// MIME stream data
    MimeStream(Vec<u8>),
    /// CANopen date or time, normalized to nanoseconds since the Unix epoch
    Timestamp(u64),
    /// Unknown or unsupported data type
    Unknown,
}

impl DecodedValue {
    /// Returns true if this is an integer value (signed or unsigned).
    #[inline]
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DecodedValue::UnsignedInteger(_) | DecodedValue::SignedInteger(_)
        )
    }

    /// Returns true if this is a floating point value.
    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, DecodedValue::Float(_))
    }

    /// Returns true if this is a string value.
    #[inline]
    pub fn is_string(&self) -> bool {
        matches!(self, DecodedValue::String(_))
    }

    /// Returns true if this is a byte array value.
    #[inline]
    pub fn is_bytes(&self) -> bool {
        matches!(
            self,
            DecodedValue::ByteArray(_) | DecodedValue::MimeSample(_) | DecodedValue::MimeStream(_)
        )
    }

    /// Attempts to convert to f64, useful for numeric operations.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DecodedValue::UnsignedInteger(v) => Some(*v as f64),
            DecodedValue::SignedInteger(v) => Some(*v as f64),
            DecodedValue::Float(v) => Some(*v),
            DecodedValue::Timestamp(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Attempts to view the value as a byte slice.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            DecodedValue::ByteArray(b)
            | DecodedValue::MimeSample(b)
            | DecodedValue::MimeStream(b) => Some(b),
            _ => None,
        }
    }
}

/// One queued sample on its way to disk.
///
/// Produced by the user thread (directly or through the bus message value
/// objects) and consumed by the streaming writer's flush thread.
#[derive(Debug, Clone)]
pub struct SampleRecord {
    /// Record id of the owning channel group within its data group.
    pub record_id: u64,
    /// Absolute timestamp in nanoseconds since the Unix epoch. Rewritten to
    /// a relative time when the measurement is started.
    pub timestamp_ns: u64,
    /// The fixed-length record bytes (data bytes + invalidation bytes).
    /// The master time channel occupies bytes 0..8 as little-endian f64
    /// seconds.
    pub record_buffer: Vec<u8>,
    /// Variable-length payload for VLSD channels. When present, the last
    /// 8 bytes of `record_buffer` are the index slot that the flush thread
    /// patches with the payload's stream offset.
    pub vlsd_buffer: Option<Vec<u8>>,
}

impl SampleRecord {
    /// Approximate queue memory footprint of this sample, used for the
    /// soft queue limit.
    pub fn byte_size(&self) -> usize {
        self.record_buffer.len()
            + self.vlsd_buffer.as_ref().map(|b| b.len() + 4).unwrap_or(0)
            + core::mem::size_of::<Self>()
    }
}

/// Writer life-cycle state (see the streaming writer).
///
/// ```text
/// Create ──init──► Finalize?(existing file) ──init_measurement──► Init
/// Init ──start_measurement──► StartMeas ──stop_measurement──► StopMeas
///                                   └──── finalize_measurement ────► Finalize
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WriteState {
    /// Fresh writer, file not yet laid out.
    Create = 0,
    /// Structure on disk, sample queue trimming to the pre-trigger window.
    Init = 1,
    /// Measurement running, flush thread draining to disk.
    StartMeas = 2,
    /// Measurement stopped, queue draining up to the stop time.
    StopMeas = 3,
    /// File finalized (or an existing file opened for append).
    Finalize = 4,
}

impl WriteState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => WriteState::Init,
            2 => WriteState::StartMeas,
            3 => WriteState::StopMeas,
            4 => WriteState::Finalize,
            _ => WriteState::Create,
        }
    }
}

/// How variable-length signal payloads are stored on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageType {
    /// Everything inside the fixed record; no variable payloads.
    FixedLength,
    /// Payloads in a side table (VLSD sibling channel group, or an SD block
    /// owned by the channel); the fixed record stores a 64-bit index.
    #[default]
    Vlsd,
    /// The fixed record reserves the maximum payload size (max-length
    /// storage); the actual length lives in a paired length channel.
    Mlsd,
}
