use super::raw_data_group::resolve_data_chain;
use crate::{Result, blocks::ChannelBlock};
use alloc::vec::Vec;

/// A channel with lazy access to its side-table payloads.
#[derive(Debug)]
pub struct RawChannel {
    pub block: ChannelBlock,
}

impl RawChannel {
    /// Collect the `(stream_offset, payload)` pairs of this channel's
    /// SD/DL/DZ signal data chain.
    ///
    /// The stream offset is the byte position of each payload's length
    /// prefix within the reassembled stream, which is exactly the index a
    /// fixed record stores for this channel. Returns an empty vector when
    /// the channel owns no signal data.
    pub fn signal_data_payloads(&self, file_data: &[u8]) -> Result<Vec<(u64, Vec<u8>)>> {
        let mut out = Vec::new();
        if self.block.data_addr == 0 {
            return Ok(out);
        }

        let fragments = resolve_data_chain(file_data, self.block.data_addr, false)?;

        // Offsets are counted over the concatenation of all fragments.
        let mut stream_base = 0u64;
        let mut carry: Vec<u8> = Vec::new();
        for fragment in &fragments {
            // A payload may straddle a fragment boundary; join such runs.
            carry.extend_from_slice(fragment);
            let mut pos = 0usize;
            while pos + 4 <= carry.len() {
                let len =
                    u32::from_le_bytes(carry[pos..pos + 4].try_into().unwrap()) as usize;
                let start = pos + 4;
                let Some(end) = start.checked_add(len) else {
                    break;
                };
                if end > carry.len() {
                    break;
                }
                out.push((stream_base + pos as u64, carry[start..end].to_vec()));
                pos = end;
            }
            stream_base += pos as u64;
            carry.drain(..pos);
        }

        Ok(out)
    }

    /// True when this channel is the group's master (typically time).
    pub fn is_master(&self) -> bool {
        self.block.channel_type.is_master()
    }
}
