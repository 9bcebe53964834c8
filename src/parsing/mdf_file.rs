use super::{RawChannel, RawChannelGroup, RawDataGroup};
use crate::{
    Error, Result,
    blocks::{
        BlockParse, ChannelGroupBlock, DataGroupBlock, EventBlock, FileHistoryBlock, HeaderBlock,
        IdentificationBlock,
    },
};
use alloc::vec::Vec;

/// A fully parsed MDF file: identification, header, and the complete block
/// graph short of the record data itself.
///
/// The struct owns no file bytes; every parsed block is an owned copy, so
/// the graph stays navigable after the source buffer is dropped.
#[derive(Debug)]
pub struct MdfFile {
    pub identification: IdentificationBlock,
    pub header: HeaderBlock,
    pub data_groups: Vec<RawDataGroup>,
    /// File history chain from the header.
    pub file_histories: Vec<FileHistoryBlock>,
    /// Event chain from the header.
    pub events: Vec<EventBlock>,
    /// Addresses of the attachment chain; AT payloads are sliced lazily.
    pub attachment_addrs: Vec<u64>,
    /// Whether this is an unfinalized MDF file (file id "UnFinMF ").
    pub is_unfinalized: bool,
}

impl MdfFile {
    /// Parse an MDF file from its complete byte buffer.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 64 + 104 {
            return Err(Error::TooShortBuffer {
                actual: data.len(),
                expected: 64 + 104,
                file: file!(),
                line: line!(),
            });
        }

        // Identification block at offset 0, header block right after
        let identification = IdentificationBlock::from_bytes(&data[0..64])?;
        let header = HeaderBlock::from_bytes(&data[64..64 + 104])?;

        let is_unfinalized = identification.is_unfinalized();

        let data_groups = Self::parse_data_groups(data, header.first_dg_addr, is_unfinalized)?;
        let file_histories = Self::parse_file_histories(data, header.file_history_addr)?;
        let events = Self::parse_events(data, header.first_event_addr)?;
        let attachment_addrs = Self::collect_attachment_addrs(data, header.first_attachment_addr)?;

        Ok(Self {
            identification,
            header,
            data_groups,
            file_histories,
            events,
            attachment_addrs,
            is_unfinalized,
        })
    }

    fn parse_data_groups(
        data: &[u8],
        first_dg_addr: u64,
        is_unfinalized: bool,
    ) -> Result<Vec<RawDataGroup>> {
        let mut data_groups = Vec::new();
        let mut dg_addr = first_dg_addr;
        while dg_addr != 0 {
            let dg_offset = dg_addr as usize;
            if dg_offset >= data.len() {
                return Err(Error::TooShortBuffer {
                    actual: data.len(),
                    expected: dg_offset + 1,
                    file: file!(),
                    line: line!(),
                });
            }

            let data_group_block = DataGroupBlock::from_bytes(&data[dg_offset..])?;
            let next_dg_addr = data_group_block.next_dg_addr;

            let mut cg_addr = data_group_block.first_cg_addr;
            let mut raw_channel_groups = Vec::new();
            while cg_addr != 0 {
                let offset = cg_addr as usize;
                if offset >= data.len() {
                    return Err(Error::TooShortBuffer {
                        actual: data.len(),
                        expected: offset + 1,
                        file: file!(),
                        line: line!(),
                    });
                }

                let channel_group_block = ChannelGroupBlock::from_bytes(&data[offset..])?;
                cg_addr = channel_group_block.next_cg_addr;
                let channels = channel_group_block.read_channels(data)?;

                let raw_channels: Vec<RawChannel> = channels
                    .into_iter()
                    .map(|channel_block| RawChannel {
                        block: channel_block,
                    })
                    .collect();

                raw_channel_groups.push(RawChannelGroup {
                    block: channel_group_block,
                    raw_channels,
                });
            }
            data_groups.push(RawDataGroup {
                block: data_group_block,
                channel_groups: raw_channel_groups,
                is_unfinalized,
            });

            dg_addr = next_dg_addr;
        }
        Ok(data_groups)
    }

    fn parse_file_histories(data: &[u8], first_fh_addr: u64) -> Result<Vec<FileHistoryBlock>> {
        let mut out = Vec::new();
        let mut addr = first_fh_addr;
        while addr != 0 {
            let offset = addr as usize;
            if offset >= data.len() {
                break;
            }
            let fh = FileHistoryBlock::from_bytes(&data[offset..])?;
            addr = fh.next_fh_addr;
            out.push(fh);
        }
        Ok(out)
    }

    fn parse_events(data: &[u8], first_ev_addr: u64) -> Result<Vec<EventBlock>> {
        let mut out = Vec::new();
        let mut addr = first_ev_addr;
        while addr != 0 {
            let offset = addr as usize;
            if offset >= data.len() {
                break;
            }
            let ev = EventBlock::from_bytes(&data[offset..])?;
            addr = ev.next_ev_addr;
            out.push(ev);
        }
        Ok(out)
    }

    fn collect_attachment_addrs(data: &[u8], first_at_addr: u64) -> Result<Vec<u64>> {
        use crate::blocks::AttachmentBlock;

        let mut out = Vec::new();
        let mut addr = first_at_addr;
        while addr != 0 {
            let offset = addr as usize;
            if offset >= data.len() {
                break;
            }
            let at = AttachmentBlock::from_bytes(&data[offset..])?;
            out.push(addr);
            addr = at.next_at_addr;
        }
        Ok(out)
    }
}
