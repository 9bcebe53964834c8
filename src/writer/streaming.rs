//! Streaming measurement writer: sample queue, background flush thread,
//! pre-trigger trimming, and the uncompressed/compressed flush paths.
//!
//! # Threading model
//!
//! One producer, one consumer. The user thread enqueues samples through
//! [`StreamingWriter::save_sample`] / [`save_record`](StreamingWriter::save_record);
//! a dedicated flush thread drains the queue to disk. A mutex guards queue
//! membership only; the writer state lives in an atomic so the producer
//! never contends on the queue to check it.
//!
//! # State machine
//!
//! ```text
//! Create ──init──► Finalize?(existing file) ──init_measurement──► Init
//! Init ──start_measurement──► StartMeas ──stop_measurement──► StopMeas
//!                                   └──── finalize_measurement ────► Finalize
//! ```
//!
//! In `Init` the flush thread only trims the queue to the pre-trigger
//! window. `start_measurement` rewrites all queued timestamps relative to
//! the start time; from then on the thread drains to disk. The file is
//! opened only while flushing, so concurrent readers can watch the file
//! grow between passes.

use super::{FileWriter, MdfWriter};
use crate::blocks::{
    BlockHeader, ChannelBlock, ChannelType, DataListBlock, HeaderListBlock, IdentificationBlock,
    unfin_flags,
};
use crate::types::{DecodedValue, SampleRecord, WriteState};
use crate::writer::data::encode_record;
use crate::{Error, Result};

use std::collections::{BTreeMap, VecDeque};
use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::string::String;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use std::vec::Vec;

/// Tuning knobs for a [`StreamingWriter`].
#[derive(Debug, Clone)]
pub struct StreamingWriterConfig {
    /// Rolling window of samples kept before `start_measurement`, in
    /// nanoseconds.
    pub pre_trigger_ns: u64,
    /// Compress record data into DEFLATE-framed DZ chunks.
    pub compress: bool,
    /// Uncompressed chunk size for the compressed path.
    pub chunk_bytes: usize,
    /// Soft queue limit; beyond it the oldest samples are dropped with a
    /// warning instead of blocking the producer.
    pub max_queue_bytes: usize,
}

impl Default for StreamingWriterConfig {
    fn default() -> Self {
        Self {
            pre_trigger_ns: 0,
            compress: false,
            chunk_bytes: 4_000_000,
            max_queue_bytes: 256 * 1024 * 1024,
        }
    }
}

/// State shared between the producer side and the flush thread.
struct Shared {
    queue: Mutex<VecDeque<SampleRecord>>,
    wakeup: Condvar,
    state: AtomicU8,
    start_time_ns: AtomicU64,
    stop_time_ns: AtomicU64,
    pre_trigger_ns: AtomicU64,
    stop_thread: AtomicBool,
    queue_bytes: AtomicUsize,
}

impl Shared {
    fn state(&self) -> WriteState {
        WriteState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WriteState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Producer-side encoding info for one channel group.
struct GroupEncoder {
    record_id: u64,
    record_size: usize,
    channels: Vec<ChannelBlock>,
}

/// Flush-side layout of one channel group.
struct GroupFlush {
    record_id: u64,
    cg_pos: u64,
    cycle_count: u64,
    /// Running offset of the group's VLSD payload stream.
    vlsd_stream_offset: u64,
    /// Present when the group routes variable payloads to a sibling VLSD
    /// group (which has record id + 1).
    has_vlsd_sibling: bool,
    /// Present when the group's variable-length channel stores to an SD
    /// block owned by the channel.
    sd: Option<SdStream>,
}

/// An in-memory SD stream flushed as one block at finalize.
struct SdStream {
    cn_pos: u64,
    buffer: Vec<u8>,
}

/// Everything the flush thread needs; moved into the thread at
/// `init_measurement`.
struct FlushContext {
    path: PathBuf,
    shared: Arc<Shared>,
    record_id_len: usize,
    dg_pos: u64,
    /// DT header position (uncompressed mode).
    dt_pos: u64,
    data_bytes_written: u64,
    compress: bool,
    chunk_bytes: usize,
    groups: Vec<GroupFlush>,
    /// Compressed path: the chunk being accumulated.
    chunk: Vec<u8>,
    /// Compressed path: written fragments as (file position, uncompressed
    /// stream offset).
    fragments: Vec<(u64, u64)>,
    stream_offset: u64,
}

/// Streaming MDF4 writer with a background flush thread.
///
/// Built on top of [`MdfWriter`]: the structural blocks are laid out first
/// (directly or through the bus-logging configurators), then
/// [`init_measurement`](Self::init_measurement) serializes the graph,
/// reserves the data position, and hands the data region to the flush
/// thread.
pub struct StreamingWriter {
    path: PathBuf,
    config: StreamingWriterConfig,
    writer: Option<MdfWriter<FileWriter>>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    encoders: BTreeMap<String, GroupEncoder>,
    record_sizes: BTreeMap<u64, usize>,
    first_measurement: bool,
}

impl StreamingWriter {
    /// Create a streaming writer for `path` with default configuration.
    ///
    /// An existing file is parsed so a new measurement can be appended; a
    /// missing file is created fresh with identification, header and a
    /// file history entry.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_config(path, StreamingWriterConfig::default())
    }

    /// Create a streaming writer with explicit configuration.
    pub fn with_config<P: AsRef<Path>>(path: P, config: StreamingWriterConfig) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let exists = path_buf.exists();

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            wakeup: Condvar::new(),
            state: AtomicU8::new(WriteState::Create as u8),
            start_time_ns: AtomicU64::new(0),
            stop_time_ns: AtomicU64::new(0),
            pre_trigger_ns: AtomicU64::new(config.pre_trigger_ns),
            stop_thread: AtomicBool::new(false),
            queue_bytes: AtomicUsize::new(0),
        });

        let (writer, first_measurement) = if exists {
            shared.set_state(WriteState::Finalize);
            (Self::open_for_append(&path_buf)?, false)
        } else {
            let path_str = path_buf
                .to_str()
                .ok_or_else(|| Error::BlockLinkError(String::from("non-UTF8 output path")))?;
            let mut writer = MdfWriter::new(path_str)?;
            writer.init_mdf_file()?;
            (writer, true)
        };

        Ok(Self {
            path: path_buf,
            config,
            writer: Some(writer),
            shared,
            worker: None,
            encoders: BTreeMap::new(),
            record_sizes: BTreeMap::new(),
            first_measurement,
        })
    }

    /// Parse an existing file and position a writer at its end so a new
    /// measurement data group can be appended.
    fn open_for_append(path: &Path) -> Result<MdfWriter<FileWriter>> {
        use crate::parsing::MdfFile;

        let bytes = std::fs::read(path)?;
        let parsed = MdfFile::parse(&bytes)?;

        let mut writer = MdfWriter::from_writer(FileWriter::open_append(path)?);
        writer.register_block_position("id_block", 0);
        writer.register_block_position("hd_block", 64);

        // Register the existing DG chain so a new group links correctly.
        let mut last_dg_id = None;
        let mut addr = parsed.header.first_dg_addr;
        let mut index = 0usize;
        while addr != 0 {
            let dg_id = alloc::format!("dg_{index}");
            writer.register_block_position(&dg_id, addr);
            let next = parsed
                .data_groups
                .get(index)
                .map(|dg| dg.block.next_dg_addr)
                .unwrap_or(0);
            last_dg_id = Some(dg_id);
            addr = next;
            index += 1;
        }
        writer.set_last_dg(last_dg_id);
        Ok(writer)
    }

    /// Set the pre-trigger window. May be changed any time before
    /// `start_measurement`.
    pub fn set_pre_trigger_ns(&self, pre_trigger_ns: u64) {
        self.shared
            .pre_trigger_ns
            .store(pre_trigger_ns, Ordering::Release);
    }

    /// Current writer state.
    pub fn state(&self) -> WriteState {
        self.shared.state()
    }

    /// Access the structural writer during the build phase.
    ///
    /// Fails once a measurement is running: only sample counts and data
    /// links may change then, and those belong to the flush thread.
    pub fn writer_mut(&mut self) -> Result<&mut MdfWriter<FileWriter>> {
        match self.shared.state() {
            WriteState::Create | WriteState::Finalize => {
                self.writer.as_mut().ok_or(Error::WriterStateError {
                    state: WriteState::Finalize,
                    operation: "access the structural writer",
                })
            }
            state => Err(Error::WriterStateError {
                state,
                operation: "mutate the block graph during a measurement",
            }),
        }
    }

    /// Serialize the block graph, reserve the data position, and start the
    /// flush thread. The writer moves to the `Init` state and starts
    /// accepting samples (trimmed to the pre-trigger window).
    pub fn init_measurement(&mut self) -> Result<()> {
        match self.shared.state() {
            WriteState::Create | WriteState::Finalize => {}
            state => {
                return Err(Error::WriterStateError {
                    state,
                    operation: "init_measurement",
                });
            }
        }

        let mut writer = self.writer.take().ok_or(Error::WriterStateError {
            state: WriteState::Finalize,
            operation: "init_measurement without a structural writer",
        })?;

        let dg_id = writer.last_dg_id().ok_or_else(|| {
            Error::BlockLinkError(String::from(
                "no data group created before init_measurement",
            ))
        })?;
        let record_id_len = writer.dg_record_id_len(&dg_id) as usize;
        let dg_pos = writer
            .get_block_position(&dg_id)
            .ok_or_else(|| Error::BlockLinkError(String::from("data group position unknown")))?;

        // Fix up declared record sizes and build the producer and flush
        // side layouts.
        let cg_ids = writer.channel_groups_of_dg(&dg_id);
        let mut groups = Vec::new();
        self.encoders.clear();
        self.record_sizes.clear();

        for cg_id in &cg_ids {
            let block = writer
                .channel_group_block(cg_id)
                .cloned()
                .ok_or_else(|| Error::BlockLinkError(String::from("channel group not tracked")))?;
            let is_vlsd = block.is_vlsd();

            let mut data_bytes = block.data_bytes;
            if !is_vlsd && data_bytes == 0 {
                data_bytes = writer.computed_record_bytes(cg_id) as u32;
                writer.update_cg_data_bytes(cg_id, data_bytes)?;
            }
            let record_size = data_bytes as usize + block.invalidation_bytes as usize;

            let cg_pos = writer.get_block_position(cg_id).ok_or_else(|| {
                Error::BlockLinkError(String::from("channel group position unknown"))
            })?;

            let channels = writer.channels_of(cg_id).unwrap_or(&[]).to_vec();

            // SD storage applies when a variable-length channel has no
            // VLSD sibling group to write into.
            let has_vlsd_sibling = cg_ids.iter().any(|other| {
                writer
                    .channel_group_block(other)
                    .map(|b| b.record_id == block.record_id + 1 && b.is_vlsd())
                    .unwrap_or(false)
            });
            let sd = if !has_vlsd_sibling && !is_vlsd {
                channels
                    .iter()
                    .position(|ch| ch.channel_type == ChannelType::VariableLength)
                    .and_then(|idx| writer.channel_position(cg_id, idx))
                    .map(|cn_pos| SdStream {
                        cn_pos,
                        buffer: Vec::new(),
                    })
            } else {
                None
            };

            if !is_vlsd {
                self.encoders.insert(
                    cg_id.clone(),
                    GroupEncoder {
                        record_id: block.record_id,
                        record_size,
                        channels,
                    },
                );
                self.record_sizes.insert(block.record_id, record_size);
            }

            groups.push(GroupFlush {
                record_id: block.record_id,
                cg_pos,
                cycle_count: 0,
                vlsd_stream_offset: 0,
                has_vlsd_sibling,
                sd,
            });
        }

        // Uncompressed mode appends records to a growing DT; compressed
        // mode defers all data blocks to the flush thread.
        let dt_pos = if self.config.compress {
            0
        } else {
            writer.set_data_position(&dg_id)?.0
        };

        writer.finalize()?;
        drop(writer);

        // Mark the file unfinalized while the measurement runs; the flag
        // bits tell a recovery tool what would need repairing.
        let unfin = IdentificationBlock::unfinalized(
            unfin_flags::CG_CYCLE_COUNT
                | unfin_flags::DT_LENGTH
                | unfin_flags::DL_LENGTH
                | unfin_flags::VLSD_CG_CYCLE_COUNT,
        );
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.write_all(&unfin.to_bytes()?)?;
        file.sync_data()?;
        drop(file);

        self.shared.start_time_ns.store(0, Ordering::Release);
        self.shared.stop_time_ns.store(0, Ordering::Release);
        self.shared.stop_thread.store(false, Ordering::Release);
        self.shared.set_state(WriteState::Init);

        let ctx = FlushContext {
            path: self.path.clone(),
            shared: Arc::clone(&self.shared),
            record_id_len,
            dg_pos,
            dt_pos,
            data_bytes_written: 0,
            compress: self.config.compress,
            chunk_bytes: self.config.chunk_bytes,
            groups,
            chunk: Vec::new(),
            fragments: Vec::new(),
            stream_offset: 0,
        };
        self.worker = Some(
            std::thread::Builder::new()
                .name(String::from("mdf-flush"))
                .spawn(move || flush_worker(ctx))
                .map_err(std::io::Error::from)?,
        );

        Ok(())
    }

    /// Encode channel values into a record and enqueue it.
    ///
    /// Timestamps are absolute nanoseconds since the epoch; while the
    /// writer is in `Init` they stay absolute in the queue and are
    /// rewritten relative to the start time by `start_measurement`.
    pub fn save_sample(
        &self,
        cg_id: &str,
        timestamp_ns: u64,
        values: &[DecodedValue],
    ) -> Result<()> {
        let group = self.encoders.get(cg_id).ok_or(Error::WriterStateError {
            state: self.shared.state(),
            operation: "save_sample for an unknown channel group",
        })?;
        let record = encode_record(&group.channels, group.record_size, values)?;
        self.save_record(group.record_id, timestamp_ns, record, None)
    }

    /// Enqueue a prebuilt record buffer (and optional variable-length
    /// payload) for the channel group with the given record id.
    ///
    /// The master time channel occupies bytes 0..8 of the record as f64
    /// seconds and is filled in here. When a payload is present, the last
    /// 8 bytes of the record are the index slot the flush thread patches
    /// with the payload's stream offset.
    pub fn save_record(
        &self,
        record_id: u64,
        timestamp_ns: u64,
        mut record_buffer: Vec<u8>,
        vlsd_buffer: Option<Vec<u8>>,
    ) -> Result<()> {
        let state = self.shared.state();
        if !matches!(
            state,
            WriteState::Init | WriteState::StartMeas | WriteState::StopMeas
        ) {
            return Err(Error::WriterStateError {
                state,
                operation: "save a sample outside a measurement",
            });
        }

        if let Some(&expected) = self.record_sizes.get(&record_id)
            && record_buffer.len() != expected
        {
            return Err(Error::BlockSerializationError(alloc::format!(
                "record buffer size {} does not match the group's {expected}",
                record_buffer.len()
            )));
        }

        // Fill the master time slot: absolute seconds before the start
        // trigger, relative seconds afterwards.
        let seconds = if state == WriteState::Init {
            timestamp_ns as f64 / 1e9
        } else {
            let start = self.shared.start_time_ns.load(Ordering::Acquire);
            (timestamp_ns as i128 - start as i128) as f64 / 1e9
        };
        if record_buffer.len() >= 8 {
            record_buffer[0..8].copy_from_slice(&seconds.to_le_bytes());
        }

        let sample = SampleRecord {
            record_id,
            timestamp_ns,
            record_buffer,
            vlsd_buffer,
        };
        let size = sample.byte_size();

        let mut queue = self.shared.queue.lock().expect("sample queue poisoned");
        // Soft limit: drop the oldest samples rather than blocking the
        // producer.
        let max = self.config.max_queue_bytes;
        while self.shared.queue_bytes.load(Ordering::Relaxed) + size > max {
            match queue.pop_front() {
                Some(dropped) => {
                    self.shared
                        .queue_bytes
                        .fetch_sub(dropped.byte_size(), Ordering::Relaxed);
                    log::warn!(
                        "sample queue over {} bytes, dropping sample at t={} ns",
                        max,
                        dropped.timestamp_ns
                    );
                }
                None => break,
            }
        }
        queue.push_back(sample);
        self.shared.queue_bytes.fetch_add(size, Ordering::Relaxed);
        drop(queue);
        self.shared.wakeup.notify_one();
        Ok(())
    }

    /// Start the measurement: queued samples older than
    /// `start_time_ns - pre_trigger` are dropped by the flush thread, the
    /// remaining timestamps are rewritten relative to the start time, and
    /// draining to disk begins.
    pub fn start_measurement(&mut self, start_time_ns: u64) -> Result<()> {
        let state = self.shared.state();
        if state != WriteState::Init {
            return Err(Error::WriterStateError {
                state,
                operation: "start_measurement",
            });
        }

        self.shared
            .start_time_ns
            .store(start_time_ns, Ordering::Release);
        self.shared.stop_time_ns.store(0, Ordering::Release);

        // The queue holds absolute times; rewrite the master time channel
        // of every queued sample as a delta from the start time.
        {
            let mut queue = self.shared.queue.lock().expect("sample queue poisoned");
            for sample in queue.iter_mut() {
                let rel = (sample.timestamp_ns as i128 - start_time_ns as i128) as f64 / 1e9;
                if sample.record_buffer.len() >= 8 {
                    sample.record_buffer[0..8].copy_from_slice(&rel.to_le_bytes());
                }
            }
        }

        self.shared.set_state(WriteState::StartMeas);
        self.shared.wakeup.notify_one();

        // A better start time than file creation, but only for the first
        // measurement in the file.
        if self.first_measurement {
            const HD_START_TIME_POS: u64 = 64 + 72;
            let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
            file.seek(SeekFrom::Start(HD_START_TIME_POS))?;
            file.write_all(&start_time_ns.to_le_bytes())?;
        }

        Ok(())
    }

    /// Stop the measurement: the flush thread keeps draining but discards
    /// samples newer than `stop_time_ns`.
    pub fn stop_measurement(&mut self, stop_time_ns: u64) -> Result<()> {
        let state = self.shared.state();
        if state != WriteState::StartMeas {
            return Err(Error::WriterStateError {
                state,
                operation: "stop_measurement",
            });
        }
        self.shared
            .stop_time_ns
            .store(stop_time_ns, Ordering::Release);
        self.shared.set_state(WriteState::StopMeas);
        self.shared.wakeup.notify_one();
        Ok(())
    }

    /// Drain the remaining queue, flush side tables and the compression
    /// spine, patch every length and cycle count, clear the unfinalized
    /// flags, and join the flush thread.
    pub fn finalize_measurement(&mut self) -> Result<()> {
        let state = self.shared.state();
        if matches!(state, WriteState::Create | WriteState::Finalize) {
            return Err(Error::WriterStateError {
                state,
                operation: "finalize_measurement",
            });
        }

        self.shared.stop_thread.store(true, Ordering::Release);
        self.shared.wakeup.notify_one();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| Error::BlockLinkError(String::from("flush thread panicked")))?;
        }

        // The flush thread has written all remaining structure; clear the
        // unfinalized marker.
        let finalized = IdentificationBlock::default();
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        file.write_all(&finalized.to_bytes()?)?;
        file.sync_all()?;
        drop(file);

        self.shared.set_state(WriteState::Finalize);

        // Re-arm the structural writer so another measurement can be
        // appended.
        self.writer = Some(Self::open_for_append(&self.path)?);
        self.first_measurement = false;
        Ok(())
    }
}

impl Drop for StreamingWriter {
    fn drop(&mut self) {
        // The flush thread must never outlive the writer.
        self.shared.stop_thread.store(true, Ordering::Release);
        self.shared.wakeup.notify_one();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

// ============================================================================
// Flush thread
// ============================================================================

fn flush_worker(mut ctx: FlushContext) {
    let shared = Arc::clone(&ctx.shared);
    loop {
        // Wake on queued work while draining, on the stop request, or on
        // the 10 s heartbeat that keeps trimming even when idle.
        {
            let queue = shared.queue.lock().expect("sample queue poisoned");
            let _unused = shared
                .wakeup
                .wait_timeout_while(queue, Duration::from_secs(10), |queue| {
                    if shared.stop_thread.load(Ordering::Acquire) {
                        return false;
                    }
                    match shared.state() {
                        WriteState::StartMeas | WriteState::StopMeas => queue.is_empty(),
                        _ => true,
                    }
                })
                .expect("sample queue poisoned");
        }

        let stopping = shared.stop_thread.load(Ordering::Acquire);

        match shared.state() {
            WriteState::Init => trim_queue(&shared),
            WriteState::StartMeas | WriteState::StopMeas => {
                if let Err(err) = ctx.drain_queue() {
                    log::error!("flush pass failed: {err}");
                }
            }
            _ => {
                let mut queue = shared.queue.lock().expect("sample queue poisoned");
                queue.clear();
                shared.queue_bytes.store(0, Ordering::Relaxed);
            }
        }

        if stopping {
            break;
        }
    }

    // Final drain and structural finish.
    if matches!(shared.state(), WriteState::StartMeas | WriteState::StopMeas) {
        if let Err(err) = ctx.drain_queue() {
            log::error!("final flush pass failed: {err}");
        }
        if let Err(err) = ctx.finish() {
            log::error!("finalizing data blocks failed: {err}");
        }
    }
}

/// Drop queued samples that have aged out of the pre-trigger window.
fn trim_queue(shared: &Shared) {
    let pre_trigger = shared.pre_trigger_ns.load(Ordering::Acquire);
    let mut queue = shared.queue.lock().expect("sample queue poisoned");
    while queue.len() > 2 {
        let newest = queue.back().map(|s| s.timestamp_ns).unwrap_or(0);
        let oldest = queue.front().map(|s| s.timestamp_ns).unwrap_or(0);
        if newest.saturating_sub(oldest) > pre_trigger {
            if let Some(dropped) = queue.pop_front() {
                shared
                    .queue_bytes
                    .fetch_sub(dropped.byte_size(), Ordering::Relaxed);
            }
        } else {
            break;
        }
    }
}

impl FlushContext {
    fn group_index(&self, record_id: u64) -> Option<usize> {
        self.groups.iter().position(|g| g.record_id == record_id)
    }

    fn encode_record_id(&self, record_id: u64, out: &mut Vec<u8>) {
        let bytes = record_id.to_le_bytes();
        out.extend_from_slice(&bytes[..self.record_id_len]);
    }

    /// Drain every eligible sample from the queue to disk (or into the
    /// compression chunk). Samples before the pre-trigger window or after
    /// the stop time are discarded.
    fn drain_queue(&mut self) -> Result<()> {
        let start = self.shared.start_time_ns.load(Ordering::Acquire);
        let pre_trigger = self.shared.pre_trigger_ns.load(Ordering::Acquire);
        let stop = self.shared.stop_time_ns.load(Ordering::Acquire);
        let cutoff_low = start.saturating_sub(pre_trigger);

        // Nothing queued? Skip opening the file.
        {
            let queue = self.shared.queue.lock().expect("sample queue poisoned");
            if queue.is_empty() {
                return Ok(());
            }
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let mut appended = Vec::new();

        loop {
            // The lock is held per pop only, so the producer never stalls
            // behind file I/O.
            let sample = {
                let mut queue = self.shared.queue.lock().expect("sample queue poisoned");
                queue.pop_front()
            };
            let Some(mut sample) = sample else { break };
            self.shared
                .queue_bytes
                .fetch_sub(sample.byte_size(), Ordering::Relaxed);

            // The pre-trigger window is half-open: a sample exactly
            // `pre_trigger` before the start is outside it, while with no
            // pre-trigger a sample exactly at the start time is kept.
            let too_old = if pre_trigger > 0 {
                sample.timestamp_ns <= cutoff_low
            } else {
                sample.timestamp_ns < cutoff_low
            };
            if too_old {
                continue;
            }
            if stop > 0 && sample.timestamp_ns > stop {
                continue;
            }

            let Some(group_idx) = self.group_index(sample.record_id) else {
                log::warn!("sample for unknown record id {}", sample.record_id);
                continue;
            };

            // The variable-length payload goes first so the patched index
            // always points at already-persisted data.
            if let Some(vlsd) = sample.vlsd_buffer.take() {
                let index = self.append_vlsd_payload(group_idx, &vlsd, &mut appended)?;
                let len = sample.record_buffer.len();
                if len >= 8 {
                    sample.record_buffer[len - 8..].copy_from_slice(&index.to_le_bytes());
                }
            }

            self.encode_record_id(sample.record_id, &mut appended);
            appended.extend_from_slice(&sample.record_buffer);
            self.groups[group_idx].cycle_count += 1;

            if self.compress && self.chunk.len() + appended.len() >= self.chunk_bytes {
                self.chunk.append(&mut appended);
                self.write_chunk(&mut file, false)?;
            }
        }

        if self.compress {
            self.chunk.append(&mut appended);
        } else if !appended.is_empty() {
            file.seek(SeekFrom::Start(self.dt_pos + 24 + self.data_bytes_written))?;
            file.write_all(&appended)?;
            self.data_bytes_written += appended.len() as u64;

            // Keep the DT length current so a crash leaves a readable
            // (if unfinalized) file.
            file.seek(SeekFrom::Start(self.dt_pos + 8))?;
            file.write_all(&(24 + self.data_bytes_written).to_le_bytes())?;
        }

        self.patch_cycle_counts(&mut file)?;
        file.sync_data()?;
        Ok(())
    }

    /// Append one variable-length payload, either as a sibling-group VLSD
    /// record or into the channel's SD stream, and return the index to
    /// patch into the fixed record.
    fn append_vlsd_payload(
        &mut self,
        group_idx: usize,
        payload: &[u8],
        appended: &mut Vec<u8>,
    ) -> Result<u64> {
        if self.groups[group_idx].has_vlsd_sibling {
            let sibling_id = self.groups[group_idx].record_id + 1;
            let Some(sibling_idx) = self.group_index(sibling_id) else {
                return Err(Error::BlockLinkError(alloc::format!(
                    "VLSD sibling group with record id {sibling_id} missing"
                )));
            };
            self.encode_record_id(sibling_id, appended);
            appended.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            appended.extend_from_slice(payload);

            let sibling = &mut self.groups[sibling_idx];
            let index = sibling.vlsd_stream_offset;
            sibling.vlsd_stream_offset += 4 + payload.len() as u64;
            sibling.cycle_count += 1;
            Ok(index)
        } else if let Some(sd) = self.groups[group_idx].sd.as_mut() {
            let index = sd.buffer.len() as u64;
            sd.buffer
                .extend_from_slice(&(payload.len() as u32).to_le_bytes());
            sd.buffer.extend_from_slice(payload);
            Ok(index)
        } else {
            Err(Error::BlockLinkError(String::from(
                "variable payload for a group without VLSD storage",
            )))
        }
    }

    /// Compress and append the accumulated chunk as a DZ block (or, at
    /// finalize, a plain DT when compressing a tiny remainder would waste
    /// space).
    #[cfg(feature = "compression")]
    fn write_chunk(&mut self, file: &mut std::fs::File, finalizing: bool) -> Result<()> {
        if self.chunk.is_empty() {
            return Ok(());
        }

        let pos = align_to_8(file.seek(SeekFrom::End(0))?);
        file.seek(SeekFrom::Start(pos))?;

        let block_bytes = if !finalizing || self.chunk.len() > 100 {
            crate::blocks::compress_to_dz_bytes(b"DT", &self.chunk)?
        } else {
            plain_dt_bytes(&self.chunk)?
        };

        file.write_all(&block_bytes)?;
        self.fragments.push((pos, self.stream_offset));
        self.stream_offset += self.chunk.len() as u64;
        self.chunk.clear();
        Ok(())
    }

    #[cfg(not(feature = "compression"))]
    fn write_chunk(&mut self, _file: &mut std::fs::File, _finalizing: bool) -> Result<()> {
        Err(Error::UnsupportedFeature(String::from(
            "compressed streaming needs the `compression` feature",
        )))
    }

    fn patch_cycle_counts(&self, file: &mut std::fs::File) -> Result<()> {
        const CG_CYCLE_COUNT: u64 = 80;
        for group in &self.groups {
            file.seek(SeekFrom::Start(group.cg_pos + CG_CYCLE_COUNT))?;
            file.write_all(&group.cycle_count.to_le_bytes())?;
        }
        Ok(())
    }

    /// Final structural pass: flush the partial chunk, write the DL/HL
    /// spine (compressed mode), write SD streams and patch their channel
    /// links, and refresh counts.
    fn finish(&mut self) -> Result<()> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;

        if self.compress {
            self.write_chunk(&mut file, true)?;

            if !self.fragments.is_empty() {
                let addrs: Vec<u64> = self.fragments.iter().map(|(pos, _)| *pos).collect();
                let offsets: Vec<u64> = self.fragments.iter().map(|(_, off)| *off).collect();
                let dl = DataListBlock::new_with_offsets(addrs, offsets)?;
                let dl_bytes = dl.to_bytes()?;
                let dl_pos = align_to_8(file.seek(SeekFrom::End(0))?);
                file.seek(SeekFrom::Start(dl_pos))?;
                file.write_all(&dl_bytes)?;

                let mut hl = HeaderListBlock::deflate();
                hl.first_dl_addr = dl_pos;
                let hl_bytes = hl.to_bytes()?;
                let hl_pos = align_to_8(file.seek(SeekFrom::End(0))?);
                file.seek(SeekFrom::Start(hl_pos))?;
                file.write_all(&hl_bytes)?;

                const DG_DATA_LINK: u64 = 40;
                file.seek(SeekFrom::Start(self.dg_pos + DG_DATA_LINK))?;
                file.write_all(&hl_pos.to_le_bytes())?;
            }
        }

        // SD side streams become SD blocks; each owning channel's data
        // link is patched to its block.
        for group in &mut self.groups {
            let Some(sd) = group.sd.as_mut() else {
                continue;
            };
            if sd.buffer.is_empty() {
                continue;
            }
            let header = BlockHeader::new("##SD", 24 + sd.buffer.len() as u64, 0);
            let sd_pos = align_to_8(file.seek(SeekFrom::End(0))?);
            file.seek(SeekFrom::Start(sd_pos))?;
            file.write_all(&header.to_bytes()?)?;
            file.write_all(&sd.buffer)?;

            const CN_DATA_LINK: u64 = 64;
            file.seek(SeekFrom::Start(sd.cn_pos + CN_DATA_LINK))?;
            file.write_all(&sd_pos.to_le_bytes())?;
            sd.buffer.clear();
        }

        self.patch_cycle_counts(&mut file)?;
        file.sync_all()?;
        Ok(())
    }
}

fn align_to_8(pos: u64) -> u64 {
    (pos + 7) & !7
}

/// A plain DT block wrapping `data`, used for tiny trailing chunks where
/// DEFLATE framing would cost more than it saves.
#[cfg(feature = "compression")]
fn plain_dt_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let header = BlockHeader::new("##DT", 24 + data.len() as u64, 0);
    let mut bytes = header.to_bytes()?;
    bytes.extend_from_slice(data);
    Ok(bytes)
}
