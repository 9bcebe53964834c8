//! Sample Reduction Block (##SR) - down-sampled statistics.
//!
//! An SR block describes a reduced view of its owning channel group: for
//! each reduction interval it stores one triple of records (mean, minimum,
//! maximum) in a data block of its own. The interval length is expressed
//! in the chosen synchronization dimension (time, angle, distance, index).

use crate::{
    Result,
    blocks::common::{
        BlockHeader, BlockParse, SyncType, read_f64, read_u8, read_u64, validate_block_id,
        validate_buffer_size,
    },
};
use alloc::vec::Vec;

/// SR block size: 24-byte header + 2 links + 24 data bytes.
const SR_BLOCK_SIZE: usize = 64;

/// Sample reduction block (##SR).
///
/// The referenced data block stores, per reduction interval, three
/// consecutive records of the owning channel group's layout: mean, minimum
/// and maximum. Invalidation bytes are ORed over the interval.
#[derive(Debug, Clone)]
pub struct SampleReductionBlock {
    pub header: BlockHeader,
    /// Link to the next sample reduction block (0 = end of list).
    pub next_sr_addr: u64,
    /// Link to the reduction data (DT/DL/DZ, records as described above).
    pub data_addr: u64,
    /// Number of reduction intervals stored.
    pub cycle_count: u64,
    /// Length of one interval in the `sync_type` dimension.
    pub interval: f64,
    /// Dimension the interval is expressed in.
    pub sync_type: SyncType,
    /// Bit 0: invalidation bytes are present in the reduction records.
    pub flags: u8,
}

impl BlockParse<'_> for SampleReductionBlock {
    const ID: &'static str = "##SR";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, SR_BLOCK_SIZE)?;

        Ok(Self {
            header,
            next_sr_addr: read_u64(bytes, 24),
            data_addr: read_u64(bytes, 32),
            cycle_count: read_u64(bytes, 40),
            interval: read_f64(bytes, 48),
            sync_type: SyncType::from_u8(read_u8(bytes, 56)),
            flags: read_u8(bytes, 57),
            // bytes 58..64 are reserved
        })
    }
}

impl SampleReductionBlock {
    /// Creates a reduction descriptor over `interval` units of `sync_type`.
    pub fn new(interval: f64, sync_type: SyncType) -> Self {
        Self {
            header: BlockHeader::new("##SR", SR_BLOCK_SIZE as u64, 2),
            next_sr_addr: 0,
            data_addr: 0,
            cycle_count: 0,
            interval,
            sync_type,
            flags: 0,
        }
    }

    /// Serializes the SampleReductionBlock to its 64-byte on-disk form.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        validate_block_id(&self.header, "##SR")?;

        let mut buffer = Vec::with_capacity(SR_BLOCK_SIZE);

        buffer.extend_from_slice(&self.header.to_bytes()?);
        buffer.extend_from_slice(&self.next_sr_addr.to_le_bytes());
        buffer.extend_from_slice(&self.data_addr.to_le_bytes());
        buffer.extend_from_slice(&self.cycle_count.to_le_bytes());
        buffer.extend_from_slice(&self.interval.to_le_bytes());
        buffer.push(self.sync_type.to_u8());
        buffer.push(self.flags);
        buffer.extend_from_slice(&[0u8; 6]);

        debug_assert_eq!(buffer.len(), SR_BLOCK_SIZE);
        Ok(buffer)
    }

    /// Record bytes of one reduction interval: three records (mean, min,
    /// max) of the owning group's size.
    pub fn interval_bytes(&self, group_record_size: usize) -> usize {
        group_record_size * 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let mut sr = SampleReductionBlock::new(0.5, SyncType::Time);
        sr.next_sr_addr = 0x8000;
        sr.data_addr = 0x9000;
        sr.cycle_count = 42;
        sr.flags = 1;

        let bytes = sr.to_bytes().unwrap();
        assert_eq!(bytes.len(), 64);

        let parsed = SampleReductionBlock::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.next_sr_addr, 0x8000);
        assert_eq!(parsed.data_addr, 0x9000);
        assert_eq!(parsed.cycle_count, 42);
        assert_eq!(parsed.interval, 0.5);
        assert_eq!(parsed.sync_type, SyncType::Time);
        assert_eq!(parsed.flags, 1);
    }

    #[test]
    fn interval_record_bytes() {
        let sr = SampleReductionBlock::new(1.0, SyncType::Index);
        assert_eq!(sr.interval_bytes(22), 66);
    }
}
