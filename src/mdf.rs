use crate::{Result, channel_group::ChannelGroup, parsing::MdfFile};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::vec::Vec;

/// High level representation of an MDF file.
///
/// The struct buffers the whole file internally and lazily exposes
/// [`ChannelGroup`] wrappers for inspection and decoding.
#[derive(Debug)]
pub struct MDF {
    raw: MdfFile,
    file_data: Vec<u8>,
}

impl MDF {
    /// Parse an MDF4 file from disk.
    ///
    /// # Arguments
    /// * `path` - Path to the `.mf4` file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len() as usize;
        let mut file_data = Vec::with_capacity(size);
        file.read_to_end(&mut file_data)?;
        Self::from_bytes(file_data)
    }

    /// Parse an MDF4 file from an in-memory buffer.
    pub fn from_bytes(file_data: Vec<u8>) -> Result<Self> {
        let raw = MdfFile::parse(&file_data)?;
        Ok(MDF { raw, file_data })
    }

    /// Access the raw parsed MDF file structure.
    ///
    /// Useful for debugging or advanced use cases.
    pub fn raw(&self) -> &MdfFile {
        &self.raw
    }

    /// The raw file bytes backing this instance.
    pub fn file_data(&self) -> &[u8] {
        &self.file_data
    }

    /// Absolute measurement start time in nanoseconds since the epoch.
    pub fn start_time_ns(&self) -> u64 {
        self.raw.header.start_time_ns
    }

    /// Retrieve channel groups contained in the file.
    ///
    /// Each [`ChannelGroup`] is created lazily and does not decode any
    /// samples. VLSD side groups are included; use
    /// [`ChannelGroup::is_vlsd`] to filter them out.
    pub fn channel_groups(&self) -> Vec<ChannelGroup<'_>> {
        let mut groups = Vec::new();

        for raw_data_group in &self.raw.data_groups {
            for raw_channel_group in &raw_data_group.channel_groups {
                groups.push(ChannelGroup::new(
                    raw_data_group,
                    raw_channel_group,
                    &self.file_data,
                ));
            }
        }

        groups
    }
}
