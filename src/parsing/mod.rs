pub mod decoder;

mod mdf_file;
mod raw_channel;
mod raw_channel_group;
mod raw_data_group;
mod record_scan;
mod source_info;

pub use mdf_file::MdfFile;
pub use raw_channel::RawChannel;
pub use raw_channel_group::RawChannelGroup;
pub use raw_data_group::RawDataGroup;
pub use record_scan::VlsdStore;
pub use source_info::SourceInfo;

pub(crate) use record_scan::{scan_records, scan_records_with_signal_data};
