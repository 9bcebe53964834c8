// Handling of DT blocks and record writing
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use super::{MdfWrite, MdfWriter, OpenDataBlock};
use crate::{
    Error, Result,
    blocks::{BlockHeader, ChannelBlock, DataListBlock, DataType},
    types::DecodedValue,
};

/// Precomputed encoder for one channel's slot in a record buffer.
pub(super) enum ChannelEncoder {
    UInt { offset: usize, bytes: usize },
    Int { offset: usize, bytes: usize },
    F32 { offset: usize },
    F64 { offset: usize },
    Bytes { offset: usize, bytes: usize },
    Skip,
}

impl ChannelEncoder {
    /// Build encoders for a channel list. `base_offset` is added to every
    /// channel's byte offset (the record id width for inline writing, zero
    /// for queued records whose id is prefixed at flush time).
    pub(super) fn from_channels(channels: &[ChannelBlock], base_offset: usize) -> Vec<Self> {
        channels
            .iter()
            .map(|ch| {
                let offset = base_offset + ch.byte_offset as usize;
                let bytes = ch.bit_count.div_ceil(8) as usize;
                match ch.data_type {
                    DataType::UnsignedIntegerLE => ChannelEncoder::UInt { offset, bytes },
                    DataType::SignedIntegerLE => ChannelEncoder::Int { offset, bytes },
                    DataType::FloatLE => {
                        if ch.bit_count == 32 {
                            ChannelEncoder::F32 { offset }
                        } else {
                            ChannelEncoder::F64 { offset }
                        }
                    }
                    DataType::ByteArray
                    | DataType::MimeSample
                    | DataType::MimeStream
                    | DataType::StringLatin1
                    | DataType::StringUtf8
                    | DataType::StringUtf16LE
                    | DataType::StringUtf16BE => ChannelEncoder::Bytes { offset, bytes },
                    _ => ChannelEncoder::Skip,
                }
            })
            .collect()
    }

    fn encode(&self, buf: &mut [u8], value: &DecodedValue) {
        match (self, value) {
            (ChannelEncoder::UInt { offset, bytes }, DecodedValue::UnsignedInteger(v)) => {
                let b = v.to_le_bytes();
                buf[*offset..*offset + *bytes].copy_from_slice(&b[..*bytes]);
            }
            (ChannelEncoder::Int { offset, bytes }, DecodedValue::SignedInteger(v)) => {
                let b = (*v).to_le_bytes();
                buf[*offset..*offset + *bytes].copy_from_slice(&b[..*bytes]);
            }
            (ChannelEncoder::F32 { offset }, DecodedValue::Float(v)) => {
                buf[*offset..*offset + 4].copy_from_slice(&(*v as f32).to_le_bytes());
            }
            (ChannelEncoder::F64 { offset }, DecodedValue::Float(v)) => {
                buf[*offset..*offset + 8].copy_from_slice(&v.to_le_bytes());
            }
            (ChannelEncoder::Bytes { offset, bytes }, DecodedValue::ByteArray(data))
            | (ChannelEncoder::Bytes { offset, bytes }, DecodedValue::MimeSample(data))
            | (ChannelEncoder::Bytes { offset, bytes }, DecodedValue::MimeStream(data)) => {
                buf[*offset..*offset + *bytes].fill(0);
                let n = data.len().min(*bytes);
                buf[*offset..*offset + n].copy_from_slice(&data[..n]);
            }
            (ChannelEncoder::Bytes { offset, bytes }, DecodedValue::String(text)) => {
                buf[*offset..*offset + *bytes].fill(0);
                let data = text.as_bytes();
                let n = data.len().min(*bytes);
                buf[*offset..*offset + n].copy_from_slice(&data[..n]);
            }
            _ => {}
        }
    }
}

/// A DT block is capped at 4 MB; larger record streams split into a DL of
/// equal-size fragments.
const MAX_DT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

fn encode_values(encoders: &[ChannelEncoder], buf: &mut [u8], values: &[DecodedValue]) {
    for (enc, val) in encoders.iter().zip(values.iter()) {
        enc.encode(buf, val);
    }
}

/// Encode one record buffer of `record_size` bytes from channel values.
///
/// The buffer layout follows the channels' byte offsets with no record id
/// prefix; invalidation bytes (if the group declares any) stay zero.
pub fn encode_record(
    channels: &[ChannelBlock],
    record_size: usize,
    values: &[DecodedValue],
) -> Result<Vec<u8>> {
    if values.len() != channels.len() {
        return Err(Error::BlockSerializationError(format!(
            "value count {} does not match channel count {}",
            values.len(),
            channels.len()
        )));
    }
    let encoders = ChannelEncoder::from_channels(channels, 0);
    let mut buf = vec![0u8; record_size];
    encode_values(&encoders, &mut buf, values);
    Ok(buf)
}

impl<W: MdfWrite> MdfWriter<W> {
    /// Compute the record data bytes of a channel group from its channels:
    /// the highest byte reached by any channel's span.
    pub fn computed_record_bytes(&self, cg_id: &str) -> usize {
        self.cg_channels
            .get(cg_id)
            .map(|channels| {
                channels
                    .iter()
                    .map(|ch| ch.byte_offset as usize + ch.byte_span())
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    /// Patch a channel group's declared data byte count on disk and in the
    /// cached block.
    pub fn update_cg_data_bytes(&mut self, cg_id: &str, data_bytes: u32) -> Result<()> {
        const CG_DATA_BYTES: u64 = 96;
        self.update_block_u32(cg_id, CG_DATA_BYTES, data_bytes)?;
        if let Some(block) = self.cg_blocks.get_mut(cg_id) {
            block.data_bytes = data_bytes;
        }
        Ok(())
    }

    /// Patch a channel group's cycle count on disk.
    pub fn update_cg_cycle_count(&mut self, cg_id: &str, cycles: u64) -> Result<()> {
        const CG_CYCLE_COUNT: u64 = 80;
        self.update_block_u64(cg_id, CG_CYCLE_COUNT, cycles)
    }

    /// Append an empty DT header at the end of the file, link it as the
    /// data group's payload, and return `(dt_position, data_position)`.
    ///
    /// The data position is where the first record byte will land; the
    /// streaming writer appends records there and patches the DT length as
    /// it goes.
    pub fn set_data_position(&mut self, dg_id: &str) -> Result<(u64, u64)> {
        let header = BlockHeader::new("##DT", 24, 0);
        let header_bytes = header.to_bytes()?;
        let dt_id = format!("dt_{}", self.dt_counter);
        self.dt_counter += 1;
        let dt_pos = self.write_block_with_id(&header_bytes, &dt_id)?;

        const DG_DATA_LINK: u64 = 40;
        self.update_block_link(dg_id, DG_DATA_LINK, &dt_id)?;
        Ok((dt_pos, dt_pos + 24))
    }

    /// Start writing a DT block for the given channel group (synchronous
    /// record path).
    pub fn start_data_block(
        &mut self,
        dg_id: &str,
        cg_id: &str,
        record_id_len: u8,
        channels: &[ChannelBlock],
    ) -> Result<()> {
        if self.open_dts.contains_key(cg_id) {
            return Err(Error::BlockSerializationError(
                "data block already open for this channel group".into(),
            ));
        }

        let mut record_bytes = 0usize;
        for ch in channels {
            record_bytes = record_bytes.max(ch.byte_offset as usize + ch.byte_span());
        }
        let invalidation_bytes = self
            .cg_blocks
            .get(cg_id)
            .map(|b| b.invalidation_bytes as usize)
            .unwrap_or(0);
        let record_size = record_bytes + invalidation_bytes + record_id_len as usize;

        let header = BlockHeader::new("##DT", 24, 0);
        let header_bytes = header.to_bytes()?;
        let dt_id = format!("dt_{}", self.dt_counter);
        self.dt_counter += 1;
        let dt_pos = self.write_block_with_id(&header_bytes, &dt_id)?;

        const DG_DATA_LINK: u64 = 40;
        const DG_RECORD_ID_LEN: u64 = 56;
        self.update_block_link(dg_id, DG_DATA_LINK, &dt_id)?;
        self.update_block_u8(dg_id, DG_RECORD_ID_LEN, record_id_len)?;
        self.update_cg_data_bytes(cg_id, record_bytes as u32)?;

        let encoders = ChannelEncoder::from_channels(channels, record_id_len as usize);

        self.open_dts.insert(
            cg_id.into(),
            OpenDataBlock {
                dg_id: dg_id.into(),
                start_pos: dt_pos,
                record_size,
                record_count: 0,
                total_record_count: 0,
                channels: channels.to_vec(),
                dt_positions: vec![dt_pos],
                dt_sizes: Vec::new(),
                record_buf: vec![0u8; record_size],
                encoders,
            },
        );
        Ok(())
    }

    /// Convenience wrapper to start a data block for a channel group
    /// without naming its data group explicitly.
    pub fn start_data_block_for_cg(&mut self, cg_id: &str, record_id_len: u8) -> Result<()> {
        let dg = self
            .cg_to_dg
            .get(cg_id)
            .ok_or_else(|| Error::BlockSerializationError("unknown channel group".into()))?
            .clone();
        let channels = self
            .cg_channels
            .get(cg_id)
            .ok_or_else(|| Error::BlockSerializationError("no channels for channel group".into()))?
            .clone();
        self.start_data_block(&dg, cg_id, record_id_len, &channels)
    }

    /// Append one record to the currently open DT block for the given
    /// channel group, splitting into a new DT when the 4 MB cap would be
    /// exceeded.
    pub fn write_record(&mut self, cg_id: &str, values: &[DecodedValue]) -> Result<()> {
        let needs_new_block = {
            let dt = self.open_dts.get(cg_id).ok_or_else(|| {
                Error::BlockSerializationError("no open DT block for this channel group".into())
            })?;
            if values.len() != dt.channels.len() {
                return Err(Error::BlockSerializationError("value count mismatch".into()));
            }
            24 + dt.record_size * (dt.record_count as usize + 1) > MAX_DT_BLOCK_SIZE
        };

        if needs_new_block {
            self.roll_data_block(cg_id)?;
        }

        let dt = self.open_dts.get_mut(cg_id).unwrap();
        dt.record_buf.fill(0);
        encode_values(&dt.encoders, &mut dt.record_buf, values);

        let buf = core::mem::take(&mut dt.record_buf);
        let record_bytes = buf.len() as u64;
        self.writer.write_all(&buf)?;
        self.offset += record_bytes;
        let dt = self.open_dts.get_mut(cg_id).unwrap();
        dt.record_buf = buf;
        dt.record_count += 1;

        Ok(())
    }

    /// Append multiple records sequentially for the specified channel
    /// group, buffering the encoded bytes to reduce write calls.
    pub fn write_records<'a, I>(&mut self, cg_id: &str, records: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a [DecodedValue]>,
    {
        for record in records {
            self.write_record(cg_id, record)?;
        }
        Ok(())
    }

    /// Close the current DT of a group and open a fresh one, patching the
    /// finished block's length.
    fn roll_data_block(&mut self, cg_id: &str) -> Result<()> {
        let (start_pos, record_count, record_size) = {
            let dt = self.open_dts.get(cg_id).unwrap();
            (dt.start_pos, dt.record_count, dt.record_size)
        };
        let size = 24 + record_size * record_count as usize;
        self.update_link(start_pos + 8, size as u64)?;
        {
            let dt = self.open_dts.get_mut(cg_id).unwrap();
            dt.total_record_count += record_count;
            dt.dt_sizes.push(size as u64);
        }
        let header = BlockHeader::new("##DT", 24, 0);
        let header_bytes = header.to_bytes()?;
        let new_dt_id = format!("dt_{}", self.dt_counter);
        self.dt_counter += 1;
        let new_dt_pos = self.write_block_with_id(&header_bytes, &new_dt_id)?;

        let dt = self.open_dts.get_mut(cg_id).unwrap();
        dt.start_pos = new_dt_pos;
        dt.record_count = 0;
        dt.dt_positions.push(new_dt_pos);
        Ok(())
    }

    /// Finalize the currently open DT block for a channel group: patch its
    /// size, the group's cycle count, and (for split streams) write the DL
    /// listing all fragments.
    pub fn finish_data_block(&mut self, cg_id: &str) -> Result<()> {
        let mut dt = self.open_dts.remove(cg_id).ok_or_else(|| {
            Error::BlockSerializationError("no open DT block for this channel group".into())
        })?;
        let size = 24 + dt.record_size as u64 * dt.record_count;
        self.update_link(dt.start_pos + 8, size)?;
        dt.dt_sizes.push(size);
        dt.total_record_count += dt.record_count;
        self.update_cg_cycle_count(cg_id, dt.total_record_count)?;

        if dt.dt_positions.len() > 1 {
            let dl_count = self
                .block_positions
                .keys()
                .filter(|k| k.starts_with("dl_"))
                .count();
            let dl_id = format!("dl_{}", dl_count);
            let common_len = *dt.dt_sizes.first().unwrap_or(&size);
            let dl_block = DataListBlock::new_equal_length(dt.dt_positions.clone(), common_len);
            let dl_bytes = dl_block.to_bytes()?;
            let _pos = self.write_block_with_id(&dl_bytes, &dl_id)?;
            const DG_DATA_LINK: u64 = 40;
            self.update_block_link(&dt.dg_id, DG_DATA_LINK, &dl_id)?;
        }
        Ok(())
    }
}
