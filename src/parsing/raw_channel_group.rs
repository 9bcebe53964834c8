use super::RawChannel;
use crate::blocks::ChannelGroupBlock;
use alloc::vec::Vec;

/// A parsed channel group with its (flattened) channel list.
#[derive(Debug)]
pub struct RawChannelGroup {
    pub block: ChannelGroupBlock,
    pub raw_channels: Vec<RawChannel>,
}

impl RawChannelGroup {
    /// True when this group stores VLSD side records.
    pub fn is_vlsd(&self) -> bool {
        self.block.is_vlsd()
    }

    /// Find a channel by its resolved name.
    pub fn find_channel(&self, name: &str) -> Option<&RawChannel> {
        self.raw_channels
            .iter()
            .find(|ch| ch.block.name.as_deref() == Some(name))
    }

    /// The master (time) channel of this group, if any.
    pub fn master_channel(&self) -> Option<&RawChannel> {
        self.raw_channels.iter().find(|ch| ch.is_master())
    }
}
