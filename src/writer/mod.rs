//! MDF4 file writer module.
//!
//! [`MdfWriter`] is a builder-style API for creating MDF4 files: it appends
//! blocks as they are created, tracks every block's file position under a
//! string id, and patches links once targets are known. The block graph
//! layout follows the format's bottom-up discipline: leaf text blocks are
//! written before the blocks that reference them, and links of not yet
//! written targets stay zero until patched.
//!
//! # Architecture
//!
//! ```text
//! MDF File
//! └── Data Groups (DG)
//!     └── Channel Groups (CG)    - one record layout each
//!         └── Channels (CN)      - bit-precise fields of the record
//!             └── Compositions   - sub-channels inside a parent's bytes
//! ```
//!
//! # Writing workflow
//!
//! 1. Create a new [`MdfWriter`]
//! 2. Initialize the file with [`init_mdf_file()`](MdfWriter::init_mdf_file)
//! 3. Add groups and channels (`add_data_group`,
//!    `add_channel_group_with_dg`, `add_channel`, ...)
//! 4. Either write records synchronously (`start_data_block_for_cg` /
//!    `write_record` / `finish_data_block`) or hand the writer to a
//!    [`StreamingWriter`](crate::writer::StreamingWriter) for queued,
//!    background-flushed capture
//! 5. Finish with [`finalize()`](MdfWriter::finalize)
//!
//! # Channel linking
//!
//! Channels within a group form a linked list. Pass `None` as the previous
//! channel for the first one and chain the rest explicitly; compositions
//! chain off their parent channel instead.

use crate::blocks::{ChannelBlock, ChannelGroupBlock};
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;

mod data;
mod init;
mod io;
#[cfg(feature = "std")]
mod streaming;

use data::ChannelEncoder;
pub use data::encode_record;
pub use io::{MdfWrite, VecWriter};
#[cfg(feature = "std")]
pub use io::FileWriter;
#[cfg(feature = "std")]
pub use streaming::{StreamingWriter, StreamingWriterConfig};

pub use crate::types::WriteState;

/// Helper structure tracking an open data block during synchronous record
/// writing.
struct OpenDataBlock {
    dg_id: String,
    start_pos: u64,
    record_size: usize,
    record_count: u64,
    /// Total number of records written across all DT blocks for this group
    total_record_count: u64,
    channels: Vec<ChannelBlock>,
    dt_positions: Vec<u64>,
    dt_sizes: Vec<u64>,
    /// Scratch buffer reused for record encoding
    record_buf: Vec<u8>,
    /// Precomputed per-channel encoders
    encoders: Vec<ChannelEncoder>,
}

/// Writer for creating MDF4 files.
///
/// `MdfWriter` produces valid MDF4 block graphs with 8-byte alignment,
/// zero padding, and link patching. It is generic over the output backend:
/// [`FileWriter`] for files (std) and [`VecWriter`] for in-memory buffers.
///
/// # Thread safety
///
/// `MdfWriter` is not thread-safe; all structural operations happen on one
/// thread. Concurrent capture goes through
/// [`StreamingWriter`](crate::writer::StreamingWriter), which owns the
/// writer during the build phase and a background flush thread afterwards.
pub struct MdfWriter<W> {
    writer: W,
    offset: u64,
    block_positions: BTreeMap<String, u64>,
    open_dts: BTreeMap<String, OpenDataBlock>,
    dt_counter: usize,
    last_dg: Option<String>,
    cg_to_dg: BTreeMap<String, String>,
    cg_order: Vec<String>,
    cg_offsets: BTreeMap<String, usize>,
    cg_channels: BTreeMap<String, Vec<ChannelBlock>>,
    cg_blocks: BTreeMap<String, ChannelGroupBlock>,
    channel_map: BTreeMap<String, (String, usize)>,
    dg_record_id_len: BTreeMap<String, u8>,
}

impl<W: MdfWrite> MdfWriter<W> {
    /// Wrap an output backend in a fresh writer.
    pub fn from_writer(writer: W) -> Self {
        let offset = writer.position();
        MdfWriter {
            writer,
            offset,
            block_positions: BTreeMap::new(),
            open_dts: BTreeMap::new(),
            dt_counter: 0,
            last_dg: None,
            cg_to_dg: BTreeMap::new(),
            cg_order: Vec::new(),
            cg_offsets: BTreeMap::new(),
            cg_channels: BTreeMap::new(),
            cg_blocks: BTreeMap::new(),
            channel_map: BTreeMap::new(),
            dg_record_id_len: BTreeMap::new(),
        }
    }

    /// Consume the writer and return the underlying backend.
    pub fn into_inner(self) -> W {
        self.writer
    }

    /// The channel blocks added to a channel group so far (record-layout
    /// channels only, compositions excluded).
    pub fn channels_of(&self, cg_id: &str) -> Option<&[ChannelBlock]> {
        self.cg_channels.get(cg_id).map(|v| v.as_slice())
    }

    /// The configured channel group block as it was written.
    pub fn channel_group_block(&self, cg_id: &str) -> Option<&ChannelGroupBlock> {
        self.cg_blocks.get(cg_id)
    }

    /// Channel group ids belonging to a data group, in creation order.
    pub fn channel_groups_of_dg(&self, dg_id: &str) -> Vec<String> {
        self.cg_order
            .iter()
            .filter(|cg| self.cg_to_dg.get(*cg).map(String::as_str) == Some(dg_id))
            .cloned()
            .collect()
    }

    /// The most recently created data group, the target of a measurement.
    pub fn last_dg_id(&self) -> Option<String> {
        self.last_dg.clone()
    }

    /// Record id width of a data group created through this writer.
    pub fn dg_record_id_len(&self, dg_id: &str) -> u8 {
        self.dg_record_id_len.get(dg_id).copied().unwrap_or(0)
    }

    /// Find a channel's block id and file position by its index within a
    /// channel group.
    pub(crate) fn channel_position(&self, cg_id: &str, index: usize) -> Option<u64> {
        self.channel_map
            .iter()
            .find(|(_, (cg, idx))| cg.as_str() == cg_id && *idx == index)
            .and_then(|(cn_id, _)| self.block_positions.get(cn_id).copied())
    }

    /// Record the position of a block that exists on disk already
    /// (append mode).
    pub(crate) fn register_block_position(&mut self, block_id: &str, pos: u64) {
        self.block_positions.insert(String::from(block_id), pos);
    }

    pub(crate) fn set_last_dg(&mut self, dg_id: Option<String>) {
        self.last_dg = dg_id;
    }
}
