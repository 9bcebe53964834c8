//! Ethernet bus logging: the mandated channel layout and the frame value
//! object.
//!
//! Frame layout (record-relative offsets; bytes 0..8 are the `t` master):
//!
//! ```text
//! ETH_Frame  Bus@8.0-3 Dir@8.7 Source@9(48bit) Destination@15(48bit)
//!            EthType@21 ReceivedDataByteCount@23 DataLength@25
//!            [optional CRC@27 PadByteCount@31]
//!            DataBytes last (VLSD index or inline for MLSD)
//! ```
//!
//! The error groups reuse the same head with their own fields. The
//! variable payload slot always sits at the end of the record: the flush
//! thread patches the VLSD index into the record's trailing 8 bytes.

use super::{BusGroup, BusLogOptions, attach_dir_conversion, create_bit_channel, create_time_channel};
use crate::Result;
use crate::blocks::{ChannelType, DataType, SourceBlock, cg_flags, cn_flags};
use crate::types::StorageType;
use crate::writer::{MdfWrite, MdfWriter};
use alloc::string::String;
use alloc::vec::Vec;

const CHANNEL_MASK: u8 = 0x0F;
const DIR_MASK: u8 = 0x80;

/// Ethernet frame and error record types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EthFrameKind {
    Frame,
    ChecksumError,
    LengthError,
    ReceiveError,
}

/// The configured Ethernet bus-logging layout.
#[derive(Debug, Clone)]
pub struct EthBusConfig {
    pub dg_id: String,
    pub storage: StorageType,
    pub max_length: usize,
    pub mandatory_members_only: bool,
    pub frame: BusGroup,
    pub checksum_error: BusGroup,
    pub length_error: BusGroup,
    pub receive_error: BusGroup,
}

impl EthBusConfig {
    /// The group handle for a frame kind.
    pub fn group(&self, kind: EthFrameKind) -> &BusGroup {
        match kind {
            EthFrameKind::Frame => &self.frame,
            EthFrameKind::ChecksumError => &self.checksum_error,
            EthFrameKind::LengthError => &self.length_error,
            EthFrameKind::ReceiveError => &self.receive_error,
        }
    }
}

/// Record data bytes (excluding the 8 time bytes) per frame kind.
pub(crate) fn record_data_bytes(
    kind: EthFrameKind,
    storage: StorageType,
    max_length: usize,
    mandatory: bool,
) -> usize {
    let payload_room = match storage {
        StorageType::Mlsd => max_length,
        StorageType::Vlsd | StorageType::FixedLength => 8,
    };
    match kind {
        // Head (19) + optional CRC/pad + trailing payload slot
        EthFrameKind::Frame => {
            let base = if mandatory { 19 } else { 19 + 6 };
            base + payload_room
        }
        // Head without counts (17) + both CRCs + optional received count
        // and trailing payload slot
        EthFrameKind::ChecksumError => {
            if mandatory {
                25
            } else {
                25 + 2 + payload_room
            }
        }
        // Head without counts (17) + optional counts/CRC and trailing
        // payload slot
        EthFrameKind::LengthError | EthFrameKind::ReceiveError => {
            if mandatory {
                17
            } else {
                17 + 8 + payload_room
            }
        }
    }
}

/// Materialize the ASAM Ethernet bus-logging layout on the writer.
///
/// One data group (1-byte record ids) containing `ETH_Frame`,
/// `ETH_ChecksumError`, `ETH_LengthError` and `ETH_ReceiveError` groups;
/// VLSD storage adds a sibling payload group after each primary group.
pub fn configure_ethernet<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    options: &BusLogOptions,
) -> Result<EthBusConfig> {
    let dg_id = writer.add_data_group(1)?;
    let vlsd = options.storage == StorageType::Vlsd;

    let kinds = [
        (EthFrameKind::Frame, "ETH_Frame"),
        (EthFrameKind::ChecksumError, "ETH_ChecksumError"),
        (EthFrameKind::LengthError, "ETH_LengthError"),
        (EthFrameKind::ReceiveError, "ETH_ReceiveError"),
    ];

    let mut groups: Vec<BusGroup> = Vec::new();
    let mut prev_cg: Option<String> = None;
    let mut next_record_id = 1u64;

    for (kind, name) in kinds {
        let record_id = next_record_id;
        next_record_id += 1;

        let cg_id = writer.add_channel_group_with_dg(&dg_id, prev_cg.as_deref(), |cg| {
            cg.record_id = record_id;
            cg.flags = cg_flags::PLAIN_BUS_EVENT | cg_flags::BUS_EVENT;
            cg.path_separator = u16::from(b'.');
        })?;
        writer.set_channel_group_name(&cg_id, name)?;
        writer.set_channel_group_source(
            &cg_id,
            &SourceBlock::ethernet_bus(),
            Some(&options.bus_name),
        )?;
        create_time_channel(writer, &cg_id)?;
        create_eth_channel(writer, &cg_id, name, kind, options)?;
        prev_cg = Some(cg_id.clone());

        if vlsd {
            let vlsd_cg =
                writer.add_vlsd_channel_group(&dg_id, prev_cg.as_deref(), next_record_id)?;
            next_record_id += 1;
            prev_cg = Some(vlsd_cg);
        }

        groups.push(BusGroup { cg_id, record_id });
    }

    let mut it = groups.into_iter();
    Ok(EthBusConfig {
        dg_id,
        storage: options.storage,
        max_length: options.max_length,
        mandatory_members_only: options.mandatory_members_only,
        frame: it.next().unwrap(),
        checksum_error: it.next().unwrap(),
        length_error: it.next().unwrap(),
        receive_error: it.next().unwrap(),
    })
}

fn add_field<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    parent: &str,
    prev: Option<&str>,
    name: &str,
    data_type: DataType,
    byte_offset: u32,
    bit_count: u32,
) -> Result<String> {
    writer.add_channel_composition(parent, prev, |ch| {
        ch.name = Some(String::from(name));
        ch.data_type = data_type;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = byte_offset;
        ch.bit_count = bit_count;
    })
}

/// Add the variable payload channel at `byte_offset` following the
/// configured storage discipline.
fn add_payload_field<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    parent: &str,
    prev: &str,
    name: &str,
    byte_offset: u32,
    options: &BusLogOptions,
) -> Result<String> {
    let storage = options.storage;
    let max_length = options.max_length;
    writer.add_channel_composition(parent, Some(prev), |ch| {
        ch.name = Some(String::from(name));
        ch.data_type = DataType::ByteArray;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = byte_offset;
        match storage {
            StorageType::Vlsd => {
                ch.channel_type = ChannelType::VariableLength;
                ch.bit_count = 64;
            }
            StorageType::Mlsd => {
                ch.channel_type = ChannelType::MaxLength;
                ch.bit_count = (max_length * 8) as u32;
            }
            StorageType::FixedLength => {
                ch.bit_count = 64;
            }
        }
    })
}

fn create_eth_channel<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    cg_id: &str,
    group_name: &str,
    kind: EthFrameKind,
    options: &BusLogOptions,
) -> Result<()> {
    let mandatory = options.mandatory_members_only;
    let data_bytes = record_data_bytes(kind, options.storage, options.max_length, mandatory);

    let parent = writer.add_channel(cg_id, None, |ch| {
        ch.name = Some(String::from(group_name));
        ch.data_type = DataType::ByteArray;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = 8;
        ch.bit_count = (data_bytes * 8) as u32;
    })?;

    let uint = DataType::UnsignedIntegerLE;

    let bus = writer.add_channel_composition(&parent, None, |ch| {
        ch.name = Some(alloc::format!("{group_name}.BusChannel"));
        ch.data_type = uint;
        ch.flags = cn_flags::BUS_EVENT | cn_flags::RANGE_VALID;
        ch.min_raw_value = 0.0;
        ch.max_raw_value = 15.0;
        ch.byte_offset = 8;
        ch.bit_offset = 0;
        ch.bit_count = 4;
    })?;
    let dir = create_bit_channel(writer, &parent, Some(&bus), &alloc::format!("{group_name}.Dir"), 8, 7)?;
    attach_dir_conversion(writer, &dir)?;

    let source = add_field(writer, &parent, Some(&dir), &alloc::format!("{group_name}.Source"), DataType::ByteArray, 9, 48)?;
    let dest = add_field(writer, &parent, Some(&source), &alloc::format!("{group_name}.Destination"), DataType::ByteArray, 15, 48)?;
    let eth_type = add_field(writer, &parent, Some(&dest), &alloc::format!("{group_name}.EthType"), uint, 21, 16)?;
    let mut prev = eth_type;

    match kind {
        EthFrameKind::Frame => {
            prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.ReceivedDataByteCount"), uint, 23, 16)?;
            prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.DataLength"), uint, 25, 16)?;
            let mut payload_at = 27u32;
            if !mandatory {
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.CRC"), uint, 27, 32)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.PadByteCount"), uint, 31, 16)?;
                payload_at = 33;
            }
            let _ = add_payload_field(writer, &parent, &prev, &alloc::format!("{group_name}.DataBytes"), payload_at, options)?;
        }
        EthFrameKind::ChecksumError => {
            prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.DataLength"), uint, 23, 16)?;
            prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.CRC"), uint, 25, 32)?;
            prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.ExpectedCRC"), uint, 29, 32)?;
            if !mandatory {
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.ReceivedDataByteCount"), uint, 33, 16)?;
                let _ = add_payload_field(writer, &parent, &prev, &alloc::format!("{group_name}.DataBytes"), 35, options)?;
            }
        }
        EthFrameKind::LengthError | EthFrameKind::ReceiveError => {
            prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.DataLength"), uint, 23, 16)?;
            if !mandatory {
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.ReceivedDataByteCount"), uint, 25, 16)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.CRC"), uint, 27, 32)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.PadByteCount"), uint, 31, 16)?;
                let _ = add_payload_field(writer, &parent, &prev, &alloc::format!("{group_name}.DataBytes"), 33, options)?;
            }
        }
    }

    Ok(())
}


// ============================================================================
// Ethernet message value object
// ============================================================================

/// One captured Ethernet frame, convertible to the record layouts above.
#[derive(Debug, Clone, Default)]
pub struct EthMessage {
    /// Dir bit 7, bus channel bits 0-3.
    bus_channel: u8,
    source: [u8; 6],
    destination: [u8; 6],
    eth_type: u16,
    received_data_byte_count: u16,
    data_length: u16,
    crc: u32,
    expected_crc: u32,
    padding_byte_count: u16,
    data_bytes: Vec<u8>,
}

impl EthMessage {
    pub fn new() -> Self {
        Self {
            eth_type: 0x0800,
            ..Self::default()
        }
    }

    pub fn set_bus_channel(&mut self, channel: u8) {
        self.bus_channel = (self.bus_channel & !CHANNEL_MASK) | (channel & CHANNEL_MASK);
    }

    pub fn bus_channel(&self) -> u8 {
        self.bus_channel & CHANNEL_MASK
    }

    pub fn set_dir(&mut self, transmit: bool) {
        if transmit {
            self.bus_channel |= DIR_MASK;
        } else {
            self.bus_channel &= !DIR_MASK;
        }
    }

    pub fn dir(&self) -> bool {
        self.bus_channel & DIR_MASK != 0
    }

    pub fn set_source(&mut self, mac: [u8; 6]) {
        self.source = mac;
    }

    pub fn source(&self) -> [u8; 6] {
        self.source
    }

    pub fn set_destination(&mut self, mac: [u8; 6]) {
        self.destination = mac;
    }

    pub fn destination(&self) -> [u8; 6] {
        self.destination
    }

    pub fn set_eth_type(&mut self, eth_type: u16) {
        self.eth_type = eth_type;
    }

    pub fn set_crc(&mut self, crc: u32) {
        self.crc = crc;
    }

    pub fn set_expected_crc(&mut self, crc: u32) {
        self.expected_crc = crc;
    }

    pub fn set_padding_byte_count(&mut self, count: u16) {
        self.padding_byte_count = count;
    }

    /// Payload; the received byte count and data length follow it.
    pub fn set_data_bytes(&mut self, data: &[u8]) {
        self.data_bytes = data.to_vec();
        self.received_data_byte_count = data.len() as u16;
        self.data_length = data.len() as u16;
    }

    pub fn data_bytes(&self) -> &[u8] {
        &self.data_bytes
    }

    fn write_head(&self, record: &mut [u8]) {
        record[8] = self.bus_channel;
        record[9..15].copy_from_slice(&self.source);
        record[15..21].copy_from_slice(&self.destination);
        record[21..23].copy_from_slice(&self.eth_type.to_le_bytes());
    }

    /// Write the payload either inline (MLSD/fixed) or as an 8-byte index
    /// slot with the payload returned separately (VLSD).
    fn write_payload(
        &self,
        record: &mut [u8],
        at: usize,
        storage: StorageType,
        max_length: usize,
    ) -> Option<Vec<u8>> {
        match storage {
            StorageType::Vlsd => Some(self.data_bytes.clone()),
            StorageType::Mlsd | StorageType::FixedLength => {
                let room = if storage == StorageType::Mlsd {
                    max_length
                } else {
                    8
                };
                let n = self.data_bytes.len().min(room);
                record[at..at + n].copy_from_slice(&self.data_bytes[..n]);
                None
            }
        }
    }

    /// Serialize into the record layout of the given frame kind.
    pub fn to_record(
        &self,
        kind: EthFrameKind,
        storage: StorageType,
        max_length: usize,
        mandatory: bool,
    ) -> (Vec<u8>, Option<Vec<u8>>) {
        let size = 8 + record_data_bytes(kind, storage, max_length, mandatory);
        let mut record = alloc::vec![0u8; size];
        self.write_head(&mut record);

        let vlsd = match kind {
            EthFrameKind::Frame => {
                record[23..25].copy_from_slice(&self.received_data_byte_count.to_le_bytes());
                record[25..27].copy_from_slice(&self.data_length.to_le_bytes());
                let payload_at = if mandatory {
                    27
                } else {
                    record[27..31].copy_from_slice(&self.crc.to_le_bytes());
                    record[31..33].copy_from_slice(&self.padding_byte_count.to_le_bytes());
                    33
                };
                self.write_payload(&mut record, payload_at, storage, max_length)
            }
            EthFrameKind::ChecksumError => {
                record[23..25].copy_from_slice(&self.data_length.to_le_bytes());
                record[25..29].copy_from_slice(&self.crc.to_le_bytes());
                record[29..33].copy_from_slice(&self.expected_crc.to_le_bytes());
                if !mandatory {
                    record[33..35]
                        .copy_from_slice(&self.received_data_byte_count.to_le_bytes());
                    self.write_payload(&mut record, 35, storage, max_length)
                } else {
                    None
                }
            }
            EthFrameKind::LengthError | EthFrameKind::ReceiveError => {
                record[23..25].copy_from_slice(&self.data_length.to_le_bytes());
                if !mandatory {
                    record[25..27]
                        .copy_from_slice(&self.received_data_byte_count.to_le_bytes());
                    record[27..31].copy_from_slice(&self.crc.to_le_bytes());
                    record[31..33].copy_from_slice(&self.padding_byte_count.to_le_bytes());
                    self.write_payload(&mut record, 33, storage, max_length)
                } else {
                    None
                }
            }
        };

        (record, vlsd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_layout_mandatory_vlsd() {
        let mut msg = EthMessage::new();
        msg.set_source([1, 2, 3, 4, 5, 6]);
        msg.set_destination([2, 3, 4, 5, 6, 7]);
        msg.set_bus_channel(2);
        msg.set_data_bytes(&[9, 8, 7]);

        let (record, vlsd) = msg.to_record(EthFrameKind::Frame, StorageType::Vlsd, 8, true);
        assert_eq!(record.len(), 8 + 27);
        assert_eq!(record[8] & CHANNEL_MASK, 2);
        assert_eq!(&record[9..15], &[1, 2, 3, 4, 5, 6]);
        assert_eq!(&record[15..21], &[2, 3, 4, 5, 6, 7]);
        assert_eq!(u16::from_le_bytes([record[23], record[24]]), 3);
        assert_eq!(u16::from_le_bytes([record[25], record[26]]), 3);
        assert_eq!(vlsd.unwrap(), vec![9, 8, 7]);
    }

    #[test]
    fn frame_layout_full_carries_crc() {
        let mut msg = EthMessage::new();
        msg.set_crc(0xDEAD_BEEF);
        msg.set_padding_byte_count(4);

        let (record, _) = msg.to_record(EthFrameKind::Frame, StorageType::Vlsd, 8, false);
        assert_eq!(record.len(), 8 + 33);
        assert_eq!(
            u32::from_le_bytes(record[27..31].try_into().unwrap()),
            0xDEAD_BEEF
        );
        assert_eq!(u16::from_le_bytes([record[31], record[32]]), 4);
    }

    #[test]
    fn checksum_error_layout() {
        let mut msg = EthMessage::new();
        msg.set_crc(0x1111_2222);
        msg.set_expected_crc(0x3333_4444);

        let (record, vlsd) =
            msg.to_record(EthFrameKind::ChecksumError, StorageType::Vlsd, 8, true);
        assert!(vlsd.is_none());
        assert_eq!(record.len(), 8 + 25);
        assert_eq!(
            u32::from_le_bytes(record[25..29].try_into().unwrap()),
            0x1111_2222
        );
        assert_eq!(
            u32::from_le_bytes(record[29..33].try_into().unwrap()),
            0x3333_4444
        );
    }
}
