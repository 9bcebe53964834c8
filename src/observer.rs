//! Sample observer subsystem.
//!
//! Observers subscribe to record ids of a data group and receive every
//! matching record synchronously while the reader streams the group's
//! payload. A typed [`ChannelObserver`] decodes one channel per record
//! into pre-sized value/validity vectors; custom observers implement
//! [`SampleObserver`] directly.

use crate::blocks::{ChannelBlock, ChannelType, cg_flags};
use crate::parsing::decoder::{
    DecodedValue, decode_channel_value_with_validity, decode_vlsd_payload,
};
use crate::parsing::{RawChannel, RawChannelGroup, RawDataGroup, VlsdStore};
use alloc::string::String;
use alloc::vec::Vec;

/// What an observer wants the reader to do after a record was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverStatus {
    /// Keep streaming records.
    Continue,
    /// The observer has enough data; abort the rest of the pass without
    /// error.
    Stop,
}

/// Receives records from [`read_data`](crate::reader::MdfReader::read_data).
///
/// Dispatch happens on the reader's thread. The store holds every
/// variable-length payload seen so far; since side payloads are written
/// before the fixed records that index them, lookups during `on_record`
/// always find their target.
pub trait SampleObserver {
    /// Whether this observer wants records tagged with `record_id`.
    fn accepts(&self, record_id: u64) -> bool;

    /// Deliver one record. `record` includes the record id prefix.
    fn on_record(
        &mut self,
        sample_index: u64,
        record_id: u64,
        record: &[u8],
        store: &VlsdStore,
    ) -> ObserverStatus;
}

/// Conversion from a decoded value into a concrete Rust type, used by the
/// typed accessors of [`ChannelObserver`].
pub trait FromDecodedValue: Sized {
    fn from_decoded(value: &DecodedValue) -> Option<Self>;
}

impl FromDecodedValue for f64 {
    fn from_decoded(value: &DecodedValue) -> Option<Self> {
        value.as_f64()
    }
}

impl FromDecodedValue for u64 {
    fn from_decoded(value: &DecodedValue) -> Option<Self> {
        match value {
            DecodedValue::UnsignedInteger(v) => Some(*v),
            DecodedValue::SignedInteger(v) => u64::try_from(*v).ok(),
            DecodedValue::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

impl FromDecodedValue for i64 {
    fn from_decoded(value: &DecodedValue) -> Option<Self> {
        match value {
            DecodedValue::SignedInteger(v) => Some(*v),
            DecodedValue::UnsignedInteger(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl FromDecodedValue for String {
    fn from_decoded(value: &DecodedValue) -> Option<Self> {
        match value {
            DecodedValue::String(s) => Some(s.clone()),
            _ => None,
        }
    }
}

impl FromDecodedValue for Vec<u8> {
    fn from_decoded(value: &DecodedValue) -> Option<Self> {
        value.as_bytes().map(|b| b.to_vec())
    }
}

/// Decodes one channel of one channel group into per-sample value and
/// validity vectors.
///
/// The observer clones the descriptors it needs, so it stays valid after
/// the reader moves on. Conversion dependencies are resolved up front,
/// making [`engineering_value`](Self::engineering_value) self-contained.
pub struct ChannelObserver {
    channel: ChannelBlock,
    channel_name: Option<String>,
    record_id: u64,
    record_id_len: usize,
    cg_data_bytes: u32,
    /// Record id of the VLSD sibling group, when the data group has one
    /// directly after this group.
    vlsd_side_record_id: Option<u64>,
    values: Vec<DecodedValue>,
    valid: Vec<bool>,
}

impl ChannelObserver {
    /// Create an observer for `channel` within `group`.
    ///
    /// `file_data` is used to resolve the channel's conversion chain so
    /// engineering values can be produced later without the file at hand.
    pub fn new(
        file_data: &[u8],
        data_group: &RawDataGroup,
        group: &RawChannelGroup,
        channel: &RawChannel,
    ) -> Self {
        let mut block = channel.block.clone();
        if let Some(conv) = block.conversion.as_mut() {
            let _ = conv.resolve_all_dependencies_with_address(file_data, 0);
        }

        // The ASAM bus-logging convention gives a VLSD sibling the next
        // record id.
        let vlsd_side_record_id = data_group
            .channel_groups
            .iter()
            .find(|cg| {
                cg.block.record_id == group.block.record_id + 1
                    && cg.block.flags & cg_flags::VLSD != 0
            })
            .map(|cg| cg.block.record_id);

        let expected = group.block.cycle_count as usize;
        ChannelObserver {
            channel_name: block.name.clone(),
            channel: block,
            record_id: group.block.record_id,
            record_id_len: data_group.block.record_id_len as usize,
            cg_data_bytes: group.block.data_bytes,
            vlsd_side_record_id,
            values: Vec::with_capacity(expected),
            valid: Vec::with_capacity(expected),
        }
    }

    /// Name of the observed channel, if it has one.
    pub fn channel_name(&self) -> Option<&str> {
        self.channel_name.as_deref()
    }

    /// Number of samples decoded so far.
    pub fn sample_count(&self) -> usize {
        self.values.len()
    }

    /// The raw decoded value at `index` and its validity flag.
    pub fn value(&self, index: usize) -> Option<(&DecodedValue, bool)> {
        Some((self.values.get(index)?, *self.valid.get(index)?))
    }

    /// True when the sample at `index` is valid.
    pub fn is_valid(&self, index: usize) -> bool {
        self.valid.get(index).copied().unwrap_or(false)
    }

    /// Typed raw value accessor.
    pub fn channel_value<T: FromDecodedValue>(&self, index: usize) -> (Option<T>, bool) {
        match self.value(index) {
            Some((value, valid)) => (T::from_decoded(value), valid),
            None => (None, false),
        }
    }

    /// The converted (engineering) value at `index`.
    ///
    /// Returns `None` for invalid samples and for conversions that failed
    /// (non-finite result).
    pub fn engineering_value(&self, index: usize) -> Option<DecodedValue> {
        let (value, valid) = self.value(index)?;
        if !valid {
            return None;
        }
        let converted = match &self.channel.conversion {
            Some(conv) => conv.apply_decoded(value.clone(), &[]).ok()?,
            None => value.clone(),
        };
        match converted {
            DecodedValue::Float(f) if !f.is_finite() => None,
            DecodedValue::Unknown => None,
            other => Some(other),
        }
    }

    /// Typed engineering value accessor.
    pub fn engineering_value_as<T: FromDecodedValue>(&self, index: usize) -> Option<T> {
        T::from_decoded(&self.engineering_value(index)?)
    }

    fn record_value(&mut self, value: DecodedValue, valid: bool) {
        self.values.push(value);
        self.valid.push(valid);
    }
}

impl SampleObserver for ChannelObserver {
    fn accepts(&self, record_id: u64) -> bool {
        record_id == self.record_id
    }

    fn on_record(
        &mut self,
        sample_index: u64,
        _record_id: u64,
        record: &[u8],
        store: &VlsdStore,
    ) -> ObserverStatus {
        // Virtual masters have no record bytes; the value is the index.
        if matches!(
            self.channel.channel_type,
            ChannelType::VirtualMaster | ChannelType::VirtualData
        ) {
            self.record_value(DecodedValue::UnsignedInteger(sample_index), true);
            return ObserverStatus::Continue;
        }

        let Some(decoded) = decode_channel_value_with_validity(
            record,
            self.record_id_len,
            self.cg_data_bytes,
            &self.channel,
        ) else {
            self.record_value(DecodedValue::Unknown, false);
            return ObserverStatus::Continue;
        };

        if self.channel.is_variable_length() {
            // The raw value is the index into the side table.
            let offset = match &decoded.value {
                DecodedValue::UnsignedInteger(v) => *v,
                _ => {
                    self.record_value(DecodedValue::Unknown, false);
                    return ObserverStatus::Continue;
                }
            };
            let payload = if self.channel.data_addr != 0 {
                store.channel_payload(self.channel.data_addr, offset)
            } else if let Some(side_id) = self.vlsd_side_record_id {
                store.group_payload(side_id, offset)
            } else {
                None
            };
            match payload {
                Some(bytes) => {
                    let value = decode_vlsd_payload(bytes, &self.channel);
                    self.record_value(value, decoded.is_valid);
                }
                None => self.record_value(DecodedValue::Unknown, false),
            }
        } else {
            self.record_value(decoded.value, decoded.is_valid);
        }

        ObserverStatus::Continue
    }
}

/// An observer adapter that stops the pass after a fixed number of
/// samples, wrapping any inner observer.
pub struct StopAfter<O> {
    inner: O,
    limit: usize,
    seen: usize,
}

impl<O: SampleObserver> StopAfter<O> {
    /// Stop the read pass once `limit` records were delivered to `inner`.
    pub fn new(inner: O, limit: usize) -> Self {
        Self {
            inner,
            limit,
            seen: 0,
        }
    }

    /// Take back the wrapped observer.
    pub fn into_inner(self) -> O {
        self.inner
    }

    /// Access the wrapped observer.
    pub fn inner(&self) -> &O {
        &self.inner
    }
}

impl<O: SampleObserver> SampleObserver for StopAfter<O> {
    fn accepts(&self, record_id: u64) -> bool {
        self.inner.accepts(record_id)
    }

    fn on_record(
        &mut self,
        sample_index: u64,
        record_id: u64,
        record: &[u8],
        store: &VlsdStore,
    ) -> ObserverStatus {
        let status = self.inner.on_record(sample_index, record_id, record, store);
        self.seen += 1;
        if self.seen >= self.limit {
            ObserverStatus::Stop
        } else {
            status
        }
    }
}
