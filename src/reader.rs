//! Staged MDF4 file reader.
//!
//! [`MdfReader`] opens a file, validates the identification block, and then
//! loads progressively more of the block graph on demand:
//!
//! 1. [`read_header`](MdfReader::read_header) - the HD block only
//! 2. [`read_measurement_info`](MdfReader::read_measurement_info) - file
//!    history, attachments, events and the data group chain
//! 3. [`read_everything_but_data`](MdfReader::read_everything_but_data) -
//!    the complete graph short of record data
//! 4. [`read_data`](MdfReader::read_data) - stream a data group's records
//!    through sample observers

use crate::blocks::{
    AttachmentBlock, BlockParse, DataGroupBlock, EventBlock, FileHistoryBlock, HeaderBlock,
    IdentificationBlock, read_string_block,
};
use crate::observer::{ObserverStatus, SampleObserver};
use crate::parsing::{MdfFile, RawChannel, RawDataGroup, scan_records_with_signal_data};
use crate::{Error, Result};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::string::String;
use std::vec::Vec;

/// Quick check whether `path` looks like an MDF file (finalized or not).
pub fn is_mdf_file<P: AsRef<Path>>(path: P) -> bool {
    let Ok(mut file) = File::open(path) else {
        return false;
    };
    let mut magic = [0u8; 8];
    if file.read_exact(&mut magic).is_err() {
        return false;
    }
    &magic == b"MDF     " || &magic == b"UnFinMF "
}

/// Summary produced by [`MdfReader::read_measurement_info`].
#[derive(Debug, Default)]
pub struct MeasurementInfo {
    /// File history entries, oldest first.
    pub file_histories: Vec<FileHistoryBlock>,
    /// Events attached to the header.
    pub events: Vec<EventBlock>,
    /// Addresses of the attachment chain.
    pub attachment_addrs: Vec<u64>,
    /// The data group blocks, without their channel trees.
    pub data_groups: Vec<DataGroupBlock>,
}

/// Reader over one MDF4 file.
///
/// The whole file is buffered in memory for the reader's lifetime; each
/// `read_*` stage only parses blocks, so repeated calls are cheap. The
/// on-disk handle is released as soon as the constructor returns.
pub struct MdfReader {
    path: String,
    file_data: Vec<u8>,
    identification: IdentificationBlock,
    header: Option<HeaderBlock>,
    graph: Option<MdfFile>,
}

impl MdfReader {
    /// Open and buffer the file, validating the identification block.
    ///
    /// Rejects files whose magic is neither `MDF     ` nor `UnFinMF `.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().into_owned();
        let mut file = File::open(path.as_ref())?;
        let size = file.metadata()?.len() as usize;
        let mut file_data = Vec::with_capacity(size);
        file.read_to_end(&mut file_data)?;
        drop(file);

        if file_data.len() < 64 {
            return Err(Error::TooShortBuffer {
                actual: file_data.len(),
                expected: 64,
                file: file!(),
                line: line!(),
            });
        }
        let identification = IdentificationBlock::from_bytes(&file_data[0..64])?;
        if identification.is_unfinalized() {
            log::debug!(
                "{path_str}: unfinalized file (flags {:#06x}), lengths and counts may lag",
                identification.standard_unfinalized_flags
            );
        }

        Ok(Self {
            path: path_str,
            file_data,
            identification,
            header: None,
            graph: None,
        })
    }

    /// The path this reader was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The identification block parsed at open time.
    pub fn identification(&self) -> &IdentificationBlock {
        &self.identification
    }

    /// True when the file magic marks it unfinalized.
    pub fn is_unfinalized(&self) -> bool {
        self.identification.is_unfinalized()
    }

    /// The raw file bytes backing this reader.
    pub fn file_data(&self) -> &[u8] {
        &self.file_data
    }

    /// Parse the header block only.
    pub fn read_header(&mut self) -> Result<&HeaderBlock> {
        if self.header.is_none() {
            if self.file_data.len() < 64 + 104 {
                return Err(Error::TooShortBuffer {
                    actual: self.file_data.len(),
                    expected: 64 + 104,
                    file: file!(),
                    line: line!(),
                });
            }
            self.header = Some(HeaderBlock::from_bytes(&self.file_data[64..])?);
        }
        Ok(self.header.as_ref().unwrap())
    }

    /// Walk the file history, attachment, event and data group chains,
    /// loading every block but no channel trees and no data payloads.
    pub fn read_measurement_info(&mut self) -> Result<MeasurementInfo> {
        let header = self.read_header()?.clone();
        let data = &self.file_data;

        let mut info = MeasurementInfo::default();

        let mut addr = header.file_history_addr;
        while addr != 0 && (addr as usize) < data.len() {
            let fh = FileHistoryBlock::from_bytes(&data[addr as usize..])?;
            addr = fh.next_fh_addr;
            info.file_histories.push(fh);
        }

        let mut addr = header.first_event_addr;
        while addr != 0 && (addr as usize) < data.len() {
            let ev = EventBlock::from_bytes(&data[addr as usize..])?;
            addr = ev.next_ev_addr;
            info.events.push(ev);
        }

        let mut addr = header.first_attachment_addr;
        while addr != 0 && (addr as usize) < data.len() {
            let at = AttachmentBlock::from_bytes(&data[addr as usize..])?;
            info.attachment_addrs.push(addr);
            addr = at.next_at_addr;
        }

        let mut addr = header.first_dg_addr;
        while addr != 0 && (addr as usize) < data.len() {
            let dg = DataGroupBlock::from_bytes(&data[addr as usize..])?;
            addr = dg.next_dg_addr;
            info.data_groups.push(dg);
        }

        Ok(info)
    }

    /// Load the complete block graph: channel groups, channels (with
    /// compositions flattened), conversions, sources and metadata. After
    /// this the graph is fully navigable offline.
    pub fn read_everything_but_data(&mut self) -> Result<&MdfFile> {
        if self.graph.is_none() {
            self.graph = Some(MdfFile::parse(&self.file_data)?);
        }
        Ok(self.graph.as_ref().unwrap())
    }

    /// The parsed data groups. Empty before
    /// [`read_everything_but_data`](Self::read_everything_but_data).
    pub fn data_groups(&self) -> &[RawDataGroup] {
        self.graph.as_ref().map(|g| &g.data_groups[..]).unwrap_or(&[])
    }

    /// Stream a data group's records through the given observers.
    ///
    /// Resolves the group's payload (DT, DL of DT/DZ fragments, or an
    /// HL→DL→DZ chain), preloads channel SD streams, then walks the
    /// records in stream order. Each fixed record is dispatched to every
    /// observer that accepts its record id; VLSD side records feed the
    /// payload store instead. An observer returning
    /// [`ObserverStatus::Stop`] aborts the rest of the pass cleanly.
    ///
    /// Returns the number of records dispatched.
    pub fn read_data(
        &mut self,
        dg_index: usize,
        observers: &mut [&mut dyn SampleObserver],
    ) -> Result<u64> {
        self.read_everything_but_data()?;
        let graph = self.graph.as_ref().unwrap();
        let data_group = graph.data_groups.get(dg_index).ok_or_else(|| {
            Error::BlockLinkError(alloc::format!("no data group with index {dg_index}"))
        })?;

        let payload = data_group.payload_bytes(&self.file_data)?;

        let mut dispatched = 0u64;
        scan_records_with_signal_data(
            data_group,
            &self.file_data,
            &payload,
            |record_id, sample_index, record, store| {
                let mut keep_going = true;
                for observer in observers.iter_mut() {
                    if observer.accepts(record_id) {
                        dispatched += 1;
                        if observer.on_record(sample_index, record_id, record, store)
                            == ObserverStatus::Stop
                        {
                            keep_going = false;
                        }
                    }
                }
                keep_going
            },
        )?;

        Ok(dispatched)
    }

    /// Scan the SD/DL/DZ chain attached to a variable-length channel and
    /// invoke `callback` with every `(stream_offset, payload)` pair.
    ///
    /// `offsets_of_interest` restricts the callback to the given stream
    /// offsets; pass `None` to receive everything.
    pub fn read_signal_data<F>(
        &self,
        channel: &RawChannel,
        offsets_of_interest: Option<&[u64]>,
        mut callback: F,
    ) -> Result<()>
    where
        F: FnMut(u64, &[u8]),
    {
        for (offset, payload) in channel.signal_data_payloads(&self.file_data)? {
            let wanted = offsets_of_interest
                .map(|set| set.contains(&offset))
                .unwrap_or(true);
            if wanted {
                callback(offset, &payload);
            }
        }
        Ok(())
    }

    /// Write an embedded attachment's bytes to `out_path`.
    ///
    /// Compressed attachments are inflated first (requires the
    /// `compression` feature). External attachments cannot be exported;
    /// their referenced filename is reported in the error.
    pub fn export_attachment<P: AsRef<Path>>(&self, at_addr: u64, out_path: P) -> Result<()> {
        let offset = at_addr as usize;
        if offset + 24 > self.file_data.len() {
            return Err(Error::TooShortBuffer {
                actual: self.file_data.len(),
                expected: offset + 24,
                file: file!(),
                line: line!(),
            });
        }
        let at = AttachmentBlock::from_bytes(&self.file_data[offset..])?;

        if !at.flags.is_embedded() {
            let filename = read_string_block(&self.file_data, at.filename_addr)?
                .unwrap_or_else(|| String::from("<unnamed>"));
            return Err(Error::UnsupportedFeature(alloc::format!(
                "attachment is an external reference to {filename}"
            )));
        }

        let bytes = if at.flags.is_compressed() {
            #[cfg(feature = "compression")]
            {
                at.decompress()?.unwrap_or_default()
            }
            #[cfg(not(feature = "compression"))]
            {
                return Err(Error::UnsupportedFeature(String::from(
                    "compressed attachments need the `compression` feature",
                )));
            }
        } else {
            at.embedded_data.to_vec()
        };

        std::fs::write(out_path, bytes)?;
        Ok(())
    }
}
