use crate::{
    Result,
    blocks::read_string_block,
    parsing::{
        RawChannel, RawChannelGroup, RawDataGroup, SourceInfo,
        decoder::{
            DecodedValue, check_value_validity, decode_channel_value_with_validity,
            decode_vlsd_payload,
        },
        scan_records,
    },
};
use std::string::String;
use std::vec::Vec;

/// High level handle for a single channel within a group.
///
/// Holds references to the raw blocks and allows convenient access to
/// metadata and decoded values.
pub struct Channel<'a> {
    raw_data_group: &'a RawDataGroup,
    raw_channel_group: &'a RawChannelGroup,
    raw_channel: &'a RawChannel,
    file_data: &'a [u8],
}

impl<'a> Channel<'a> {
    /// Construct a new [`Channel`] from raw block references.
    pub fn new(
        raw_data_group: &'a RawDataGroup,
        raw_channel_group: &'a RawChannelGroup,
        raw_channel: &'a RawChannel,
        file_data: &'a [u8],
    ) -> Self {
        Channel {
            raw_data_group,
            raw_channel_group,
            raw_channel,
            file_data,
        }
    }

    /// Retrieve the channel name if present.
    pub fn name(&self) -> Result<Option<String>> {
        if let Some(resolved) = &self.raw_channel.block.name {
            return Ok(Some(resolved.clone()));
        }
        read_string_block(self.file_data, self.raw_channel.block.name_addr)
    }

    /// Retrieve the physical unit description.
    ///
    /// A unit attached to the channel's conversion overrides the channel's
    /// own unit, as the format prescribes.
    pub fn unit(&self) -> Result<Option<String>> {
        if let Some(conv) = &self.raw_channel.block.conversion
            && let Some(addr) = conv.unit_addr
            && let Some(unit) = read_string_block(self.file_data, addr)?
        {
            return Ok(Some(unit));
        }
        read_string_block(self.file_data, self.raw_channel.block.unit_addr)
    }

    /// Retrieve the channel comment if present.
    pub fn comment(&self) -> Result<Option<String>> {
        read_string_block(self.file_data, self.raw_channel.block.comment_addr)
    }

    /// Get the acquisition source for this channel if available.
    pub fn source(&self) -> Result<Option<SourceInfo>> {
        SourceInfo::from_file_data(self.file_data, self.raw_channel.block.source_addr)
    }

    /// True when this channel is the group's master (typically time).
    pub fn is_master(&self) -> bool {
        self.raw_channel.is_master()
    }

    /// Access the raw channel block for layout inspection.
    pub fn block(&self) -> &crate::blocks::ChannelBlock {
        &self.raw_channel.block
    }

    /// Decode and convert all samples of this channel.
    ///
    /// Walks the owning data group's record stream, decodes this channel
    /// from every matching record, resolves variable-length payloads, and
    /// applies the conversion. Invalid samples (invalidation bit set,
    /// decoding failure, or a conversion producing a non-finite value) are
    /// returned as `None`.
    pub fn values(&self) -> Result<Vec<Option<DecodedValue>>> {
        let record_id_len = self.raw_data_group.block.record_id_len as usize;
        let cg_data_bytes = self.raw_channel_group.block.data_bytes;
        let record_id = self.raw_channel_group.block.record_id;
        let block = &self.raw_channel.block;

        // Record id of a VLSD sibling, when present (bus logging layout).
        let side_record_id = self
            .raw_data_group
            .channel_groups
            .iter()
            .find(|cg| cg.block.record_id == record_id + 1 && cg.is_vlsd())
            .map(|cg| cg.block.record_id);

        // SD side data, if the channel owns a stream.
        let sd_payloads = if block.is_variable_length() && block.data_addr != 0 {
            Some(self.raw_channel.signal_data_payloads(self.file_data)?)
        } else {
            None
        };

        let payload = self.raw_data_group.payload_bytes(self.file_data)?;
        let mut out = Vec::new();

        scan_records(
            self.raw_data_group,
            &payload,
            |rid, _sample_index, record, store| {
                if rid != record_id {
                    return true;
                }

                let decoded =
                    decode_channel_value_with_validity(record, record_id_len, cg_data_bytes, block);
                let Some(decoded) = decoded else {
                    out.push(None);
                    return true;
                };

                if block.is_variable_length() {
                    let DecodedValue::UnsignedInteger(offset) = decoded.value else {
                        out.push(None);
                        return true;
                    };
                    let payload_bytes: Option<Vec<u8>> = if let Some(sd) = &sd_payloads {
                        sd.iter()
                            .find(|(o, _)| *o == offset)
                            .map(|(_, p)| p.clone())
                    } else if let Some(side_id) = side_record_id {
                        store.group_payload(side_id, offset).map(|p| p.to_vec())
                    } else {
                        None
                    };
                    match payload_bytes {
                        Some(bytes) if decoded.is_valid => {
                            out.push(Some(decode_vlsd_payload(&bytes, block)));
                        }
                        _ => out.push(None),
                    }
                    return true;
                }

                if !decoded.is_valid {
                    out.push(None);
                    return true;
                }

                match block.apply_conversion_value(decoded.value, self.file_data) {
                    Ok(DecodedValue::Float(f)) if !f.is_finite() => out.push(None),
                    Ok(DecodedValue::Unknown) => out.push(None),
                    Ok(converted) => out.push(Some(converted)),
                    Err(_) => out.push(None),
                }
                true
            },
        )?;

        Ok(out)
    }

    /// Decode all samples without applying the conversion.
    ///
    /// Raw values are returned even when the conversion chain is broken;
    /// the validity flag is reported alongside each value.
    pub fn raw_values(&self) -> Result<Vec<(DecodedValue, bool)>> {
        let record_id_len = self.raw_data_group.block.record_id_len as usize;
        let cg_data_bytes = self.raw_channel_group.block.data_bytes;
        let record_id = self.raw_channel_group.block.record_id;
        let block = &self.raw_channel.block;

        let payload = self.raw_data_group.payload_bytes(self.file_data)?;
        let mut out = Vec::new();

        scan_records(
            self.raw_data_group,
            &payload,
            |rid, _sample_index, record, _store| {
                if rid != record_id {
                    return true;
                }
                match decode_channel_value_with_validity(
                    record,
                    record_id_len,
                    cg_data_bytes,
                    block,
                ) {
                    Some(decoded) => out.push((decoded.value, decoded.is_valid)),
                    None => out.push((
                        DecodedValue::Unknown,
                        check_value_validity(record, record_id_len, cg_data_bytes, block),
                    )),
                }
                true
            },
        )?;

        Ok(out)
    }
}
