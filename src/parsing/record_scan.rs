//! Record stream walking shared by the reader and the high-level channel
//! API.
//!
//! A data group's payload is a concatenation of records, each optionally
//! prefixed by a record id that names the owning channel group. Plain
//! groups store fixed-size records; VLSD side groups store
//! `[len:u32][bytes]` payload records. Walking keeps a [`VlsdStore`] of the
//! side payloads seen so far, keyed the way variable-length channels index
//! them.

use super::RawDataGroup;
use crate::{Error, Result};
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

/// Side-table payload store for variable-length channels.
///
/// Payloads stored in a VLSD sibling channel group are keyed by
/// `(record id, stream offset)`; payloads from a channel-owned SD chain
/// are keyed by `(channel data address, stream offset)`. The stream offset
/// is the byte offset of the `[len]` prefix within the virtual
/// concatenation of all payload records of that store.
#[derive(Debug, Default)]
pub struct VlsdStore {
    by_group: BTreeMap<u64, BTreeMap<u64, Vec<u8>>>,
    by_channel: BTreeMap<u64, BTreeMap<u64, Vec<u8>>>,
}

impl VlsdStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a payload written by a VLSD sibling channel group.
    pub fn group_payload(&self, record_id: u64, offset: u64) -> Option<&[u8]> {
        self.by_group
            .get(&record_id)
            .and_then(|m| m.get(&offset))
            .map(|v| v.as_slice())
    }

    /// Look up a payload from a channel's SD stream.
    pub fn channel_payload(&self, data_addr: u64, offset: u64) -> Option<&[u8]> {
        self.by_channel
            .get(&data_addr)
            .and_then(|m| m.get(&offset))
            .map(|v| v.as_slice())
    }

    pub(crate) fn insert_group_payload(&mut self, record_id: u64, offset: u64, payload: Vec<u8>) {
        self.by_group
            .entry(record_id)
            .or_default()
            .insert(offset, payload);
    }

    pub(crate) fn insert_channel_payload(&mut self, data_addr: u64, offset: u64, payload: Vec<u8>) {
        self.by_channel
            .entry(data_addr)
            .or_default()
            .insert(offset, payload);
    }

    /// Load every SD/DL/DZ payload chain owned by a channel of the group
    /// into the store, so variable-length indexes can be resolved during
    /// the record pass.
    pub(crate) fn preload_channel_streams(
        &mut self,
        data_group: &RawDataGroup,
        file_data: &[u8],
    ) -> Result<()> {
        for cg in &data_group.channel_groups {
            for ch in &cg.raw_channels {
                if ch.block.is_variable_length() && ch.block.data_addr != 0 {
                    for (offset, payload) in ch.signal_data_payloads(file_data)? {
                        self.insert_channel_payload(ch.block.data_addr, offset, payload);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Read one record id of the given width.
fn read_record_id(data: &[u8], pos: usize, width: usize) -> Option<u64> {
    if pos + width > data.len() {
        return None;
    }
    Some(match width {
        1 => data[pos] as u64,
        2 => u16::from_le_bytes(data[pos..pos + 2].try_into().unwrap()) as u64,
        4 => u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap()) as u64,
        8 => u64::from_le_bytes(data[pos..pos + 8].try_into().unwrap()),
        _ => return None,
    })
}

/// Walk the records of a data group's payload in stream order.
///
/// `on_record` receives `(record_id, sample_index, record_bytes, store)`
/// for every fixed record; `record_bytes` includes the record id prefix.
/// The sample index counts per channel group. Returning `false` stops the
/// walk early without error.
///
/// VLSD side records are absorbed into the store and not dispatched.
pub(crate) fn scan_records<F>(
    data_group: &RawDataGroup,
    payload: &[u8],
    on_record: F,
) -> Result<()>
where
    F: FnMut(u64, u64, &[u8], &VlsdStore) -> bool,
{
    scan_records_preloaded(data_group, payload, VlsdStore::new(), on_record)
}

/// Walk records with the SD streams of all variable-length channels
/// preloaded into the store first.
pub(crate) fn scan_records_with_signal_data<F>(
    data_group: &RawDataGroup,
    file_data: &[u8],
    payload: &[u8],
    on_record: F,
) -> Result<()>
where
    F: FnMut(u64, u64, &[u8], &VlsdStore) -> bool,
{
    let mut store = VlsdStore::new();
    store.preload_channel_streams(data_group, file_data)?;
    scan_records_preloaded(data_group, payload, store, on_record)
}

fn scan_records_preloaded<F>(
    data_group: &RawDataGroup,
    payload: &[u8],
    mut store: VlsdStore,
    mut on_record: F,
) -> Result<()>
where
    F: FnMut(u64, u64, &[u8], &VlsdStore) -> bool,
{
    let record_id_len = data_group.block.record_id_len as usize;

    // Record sizes and VLSD flags per record id
    let mut layouts: BTreeMap<u64, (usize, bool)> = BTreeMap::new();
    for cg in &data_group.channel_groups {
        layouts.insert(cg.block.record_id, (cg.block.record_size(), cg.is_vlsd()));
    }

    // Per-group sample counters and VLSD stream offsets
    let mut sample_index: BTreeMap<u64, u64> = BTreeMap::new();
    let mut vlsd_offsets: BTreeMap<u64, u64> = BTreeMap::new();

    let mut pos = 0usize;
    while pos < payload.len() {
        let record_id = if record_id_len == 0 {
            // A single channel group owns the whole stream
            data_group
                .channel_groups
                .first()
                .map(|cg| cg.block.record_id)
                .unwrap_or(0)
        } else {
            match read_record_id(payload, pos, record_id_len) {
                Some(id) => id,
                None => break,
            }
        };

        let Some(&(record_size, is_vlsd)) = layouts.get(&record_id) else {
            // Unknown record id: the stream cannot be resynchronized
            // reliably, report the structural error.
            return Err(Error::BlockSerializationError(alloc::format!(
                "record id {record_id} at stream offset {pos} matches no channel group"
            )));
        };

        if is_vlsd {
            let len_pos = pos + record_id_len;
            if len_pos + 4 > payload.len() {
                break;
            }
            let len =
                u32::from_le_bytes(payload[len_pos..len_pos + 4].try_into().unwrap()) as usize;
            let data_start = len_pos + 4;
            if data_start + len > payload.len() {
                return Err(Error::TooShortBuffer {
                    actual: payload.len(),
                    expected: data_start + len,
                    file: file!(),
                    line: line!(),
                });
            }
            let offset_entry = vlsd_offsets.entry(record_id).or_insert(0);
            store.insert_group_payload(
                record_id,
                *offset_entry,
                payload[data_start..data_start + len].to_vec(),
            );
            *offset_entry += 4 + len as u64;
            pos = data_start + len;
        } else {
            let total = record_id_len + record_size;
            if total == record_id_len || pos + total > payload.len() {
                break;
            }
            let index_entry = sample_index.entry(record_id).or_insert(0);
            let keep_going = on_record(record_id, *index_entry, &payload[pos..pos + total], &store);
            *index_entry += 1;
            pos += total;
            if !keep_going {
                return Ok(());
            }
        }
    }

    Ok(())
}
