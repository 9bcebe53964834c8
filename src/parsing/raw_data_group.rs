use super::RawChannelGroup;
use crate::{
    Error, Result,
    blocks::{BlockHeader, BlockParse, DataGroupBlock, DataListBlock, HeaderListBlock},
};
use alloc::borrow::Cow;
use alloc::string::ToString;
use alloc::vec::Vec;

/// A parsed data group together with its channel groups.
#[derive(Debug)]
pub struct RawDataGroup {
    pub block: DataGroupBlock,
    pub channel_groups: Vec<RawChannelGroup>,
    /// Whether this data group came from an unfinalized MDF file.
    pub is_unfinalized: bool,
}

impl RawDataGroup {
    /// Collect the uncompressed payload fragments referenced by this data
    /// group, in stream order.
    ///
    /// Follows a single DT, a DL chain of DT/DZ fragments, or an HL spine
    /// over a DZ chain. DZ fragments are inflated (requires the
    /// `compression` feature).
    pub fn data_fragments<'a>(&self, file_data: &'a [u8]) -> Result<Vec<Cow<'a, [u8]>>> {
        resolve_data_chain(file_data, self.block.data_block_addr, self.is_unfinalized)
    }

    /// The reassembled payload of this data group as one contiguous byte
    /// run. A single borrowed fragment is passed through without copying.
    pub fn payload_bytes<'a>(&self, file_data: &'a [u8]) -> Result<Cow<'a, [u8]>> {
        let mut fragments = self.data_fragments(file_data)?;
        if fragments.len() == 1 {
            return Ok(fragments.remove(0));
        }
        let total: usize = fragments.iter().map(|f| f.len()).sum();
        let mut joined = Vec::with_capacity(total);
        for fragment in fragments {
            joined.extend_from_slice(&fragment);
        }
        Ok(Cow::Owned(joined))
    }

    /// Find the channel group owning the given record id.
    pub fn find_channel_group(&self, record_id: u64) -> Option<&RawChannelGroup> {
        self.channel_groups
            .iter()
            .find(|cg| cg.block.record_id == record_id)
    }
}

/// Walk a data chain starting at `start_addr` and return the uncompressed
/// fragments in stream order. Shared by data-group payloads and channel
/// signal-data chains.
pub(crate) fn resolve_data_chain<'a>(
    file_data: &'a [u8],
    start_addr: u64,
    unfinalized: bool,
) -> Result<Vec<Cow<'a, [u8]>>> {
    let mut fragments: Vec<Cow<'a, [u8]>> = Vec::new();
    let mut current_addr = start_addr;
    // Guards against cyclic DL chains in corrupt files.
    let mut visited = 0usize;
    const MAX_CHAIN: usize = 1 << 20;

    while current_addr != 0 {
        visited += 1;
        if visited > MAX_CHAIN {
            return Err(Error::BlockLinkError(
                "data block chain does not terminate".to_string(),
            ));
        }

        let offset = current_addr as usize;
        if offset + 24 > file_data.len() {
            return Err(Error::TooShortBuffer {
                actual: file_data.len(),
                expected: offset + 24,
                file: file!(),
                line: line!(),
            });
        }
        let header = BlockHeader::from_bytes(&file_data[offset..offset + 24])?;

        match header.id.as_str() {
            "##DT" | "##SD" => {
                // In unfinalized files the trailing data block's length may
                // still be the bare header; data then runs to end of file.
                let data = if unfinalized && header.length == 24 {
                    &file_data[offset + 24..]
                } else {
                    let end = offset + header.length as usize;
                    if end > file_data.len() {
                        return Err(Error::TooShortBuffer {
                            actual: file_data.len(),
                            expected: end,
                            file: file!(),
                            line: line!(),
                        });
                    }
                    &file_data[offset + 24..end]
                };
                fragments.push(Cow::Borrowed(data));
                current_addr = 0;
            }
            "##DL" => {
                let dl = DataListBlock::from_bytes(&file_data[offset..])?;
                for &fragment_addr in &dl.data_block_addrs {
                    if fragment_addr == 0 {
                        continue;
                    }
                    let frag_off = fragment_addr as usize;
                    if frag_off + 24 > file_data.len() {
                        return Err(Error::TooShortBuffer {
                            actual: file_data.len(),
                            expected: frag_off + 24,
                            file: file!(),
                            line: line!(),
                        });
                    }
                    let frag_header = BlockHeader::from_bytes(&file_data[frag_off..frag_off + 24])?;
                    match frag_header.id.as_str() {
                        "##DT" | "##SD" => {
                            fragments.push(Cow::Borrowed(block_payload(&file_data[frag_off..])?));
                        }
                        "##DZ" => {
                            fragments.push(Cow::Owned(inflate_dz(&file_data[frag_off..])?));
                        }
                        other => {
                            return Err(Error::BlockIDError {
                                actual: other.to_string(),
                                expected: "##DT / ##SD / ##DZ".to_string(),
                            });
                        }
                    }
                }
                current_addr = dl.next_dl_addr;
            }
            "##HL" => {
                let hl = HeaderListBlock::from_bytes(&file_data[offset..])?;
                current_addr = hl.first_dl_addr;
            }
            "##DZ" => {
                fragments.push(Cow::Owned(inflate_dz(&file_data[offset..])?));
                current_addr = 0;
            }
            unexpected_id => {
                return Err(Error::BlockIDError {
                    actual: unexpected_id.to_string(),
                    expected: "##DT / ##SD / ##DL / ##HL / ##DZ".to_string(),
                });
            }
        }
    }

    Ok(fragments)
}

#[cfg(feature = "compression")]
fn inflate_dz(bytes: &[u8]) -> Result<Vec<u8>> {
    use crate::blocks::DzBlock;
    DzBlock::from_bytes(bytes)?.decompress()
}

#[cfg(not(feature = "compression"))]
fn inflate_dz(_bytes: &[u8]) -> Result<Vec<u8>> {
    Err(Error::UnsupportedFeature(
        "compressed data blocks need the `compression` feature".to_string(),
    ))
}

/// Payload of a DT or SD block without caring which of the two tags it
/// carries.
fn block_payload(bytes: &[u8]) -> Result<&[u8]> {
    let header = BlockHeader::from_bytes(bytes)?;
    let end = header.length as usize;
    if bytes.len() < end {
        return Err(Error::TooShortBuffer {
            actual: bytes.len(),
            expected: end,
            file: file!(),
            line: line!(),
        });
    }
    Ok(&bytes[24..end])
}
