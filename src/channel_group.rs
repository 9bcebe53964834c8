use crate::{
    Result,
    blocks::{BlockParse, SampleReductionBlock, read_string_block},
    channel::Channel,
    parsing::{RawChannelGroup, RawDataGroup, SourceInfo},
};
use std::string::String;
use std::vec::Vec;

/// High level wrapper for a channel group.
///
/// References the raw channel group and provides ergonomic access to its
/// metadata and channels without decoding any samples.
pub struct ChannelGroup<'a> {
    raw_data_group: &'a RawDataGroup,
    raw_channel_group: &'a RawChannelGroup,
    file_data: &'a [u8],
}

impl<'a> ChannelGroup<'a> {
    /// Create a new [`ChannelGroup`] referencing the underlying raw blocks.
    pub fn new(
        raw_data_group: &'a RawDataGroup,
        raw_channel_group: &'a RawChannelGroup,
        file_data: &'a [u8],
    ) -> Self {
        ChannelGroup {
            raw_data_group,
            raw_channel_group,
            file_data,
        }
    }

    /// Retrieve the human readable group name.
    pub fn name(&self) -> Result<Option<String>> {
        read_string_block(self.file_data, self.raw_channel_group.block.acq_name_addr)
    }

    /// Retrieve the group comment if present.
    pub fn comment(&self) -> Result<Option<String>> {
        read_string_block(self.file_data, self.raw_channel_group.block.comment_addr)
    }

    /// Get the acquisition source information if available.
    pub fn source(&self) -> Result<Option<SourceInfo>> {
        SourceInfo::from_file_data(self.file_data, self.raw_channel_group.block.acq_source_addr)
    }

    /// Number of samples (cycles) recorded for this group.
    pub fn sample_count(&self) -> u64 {
        self.raw_channel_group.block.cycle_count
    }

    /// Record id of this group within its data group.
    pub fn record_id(&self) -> u64 {
        self.raw_channel_group.block.record_id
    }

    /// True when this group is a VLSD side group rather than a plain
    /// record layout.
    pub fn is_vlsd(&self) -> bool {
        self.raw_channel_group.is_vlsd()
    }

    /// Build all [`Channel`] objects for this group.
    ///
    /// No channel data is decoded; the returned channels reference the raw
    /// blocks.
    pub fn channels(&self) -> Vec<Channel<'a>> {
        let mut channels = Vec::new();
        for raw_channel in &self.raw_channel_group.raw_channels {
            channels.push(Channel::new(
                self.raw_data_group,
                self.raw_channel_group,
                raw_channel,
                self.file_data,
            ));
        }

        channels
    }

    /// Find a channel by name.
    pub fn channel(&self, name: &str) -> Option<Channel<'a>> {
        self.raw_channel_group.find_channel(name).map(|raw| {
            Channel::new(
                self.raw_data_group,
                self.raw_channel_group,
                raw,
                self.file_data,
            )
        })
    }

    /// Walk the sample reduction chain attached to this group.
    ///
    /// Each entry describes a down-sampled view (mean/min/max records per
    /// interval) of the group's data.
    pub fn sample_reductions(&self) -> Result<Vec<SampleReductionBlock>> {
        let mut out = Vec::new();
        let mut addr = self.raw_channel_group.block.first_sample_reduction_addr;
        while addr != 0 && (addr as usize) < self.file_data.len() {
            let sr = SampleReductionBlock::from_bytes(&self.file_data[addr as usize..])?;
            addr = sr.next_sr_addr;
            out.push(sr);
        }
        Ok(out)
    }

    /// Get the raw data group (for internal use).
    pub fn raw_data_group(&self) -> &'a RawDataGroup {
        self.raw_data_group
    }

    /// Get the raw channel group (for internal use).
    pub fn raw_channel_group(&self) -> &'a RawChannelGroup {
        self.raw_channel_group
    }
}
