//! LIN bus logging: the mandated channel layout and the frame value
//! object.
//!
//! LIN payloads are at most 8 bytes, so the standard fixes max-length
//! storage for the `LIN_Frame` data bytes: the record always reserves the
//! full 8 bytes, padded with 0xFF. The configured storage discipline is
//! therefore ignored for LIN.
//!
//! Frame layout (record-relative offsets; bytes 0..8 are the `t` master):
//!
//! ```text
//! LIN_Frame  Bus@8.0-5 ChecksumModel@8.6-7 ID@9.0-5 Dir@9.7
//!            ReceivedDataByteCount@10.0-3 DataLength@10.4-7 DataBytes@11
//!            optional: Checksum@19 SOF@20 Baudrate@28 ResponseBaudrate@32
//!                      BreakLength@36 BreakDelimiterLength@40
//! ```

use super::{BusGroup, BusLogOptions, attach_dir_conversion, create_bit_channel, create_time_channel};
use crate::Result;
use crate::blocks::{DataType, SourceBlock, cg_flags, cn_flags};
use crate::writer::{MdfWrite, MdfWriter};
use alloc::string::String;
use alloc::vec::Vec;

const CHECKSUM_MODEL_MASK: u8 = 0xC0;
const CHANNEL_MASK: u8 = 0x3F;
const LIN_ID_MASK: u8 = 0x3F;
const DIR_MASK: u8 = 0x80;
const RECEIVED_MASK: u8 = 0x0F;
const LENGTH_MASK: u8 = 0xF0;

/// The LIN frame and event types of the bus-logging standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinFrameKind {
    Frame,
    WakeUp,
    ChecksumError,
    TransmissionError,
    SyncError,
    ReceiveError,
    Spike,
    LongDominant,
}

/// LIN checksum model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinChecksumModel {
    #[default]
    Unknown,
    Classic,
    Enhanced,
}

/// The configured LIN bus-logging layout.
#[derive(Debug, Clone)]
pub struct LinBusConfig {
    pub dg_id: String,
    pub mandatory_members_only: bool,
    pub frame: BusGroup,
    pub wake_up: BusGroup,
    pub checksum_error: BusGroup,
    pub transmission_error: BusGroup,
    pub sync_error: BusGroup,
    pub receive_error: BusGroup,
    pub spike: BusGroup,
    pub long_dominant: BusGroup,
}

impl LinBusConfig {
    /// The group handle for a frame kind.
    pub fn group(&self, kind: LinFrameKind) -> &BusGroup {
        match kind {
            LinFrameKind::Frame => &self.frame,
            LinFrameKind::WakeUp => &self.wake_up,
            LinFrameKind::ChecksumError => &self.checksum_error,
            LinFrameKind::TransmissionError => &self.transmission_error,
            LinFrameKind::SyncError => &self.sync_error,
            LinFrameKind::ReceiveError => &self.receive_error,
            LinFrameKind::Spike => &self.spike,
            LinFrameKind::LongDominant => &self.long_dominant,
        }
    }
}

/// Record data bytes (excluding the 8 time bytes) per frame kind.
pub(crate) fn record_data_bytes(kind: LinFrameKind, mandatory: bool) -> usize {
    match kind {
        LinFrameKind::Frame | LinFrameKind::ChecksumError => {
            if mandatory {
                11
            } else {
                36
            }
        }
        LinFrameKind::WakeUp | LinFrameKind::Spike => {
            if mandatory {
                1
            } else {
                13
            }
        }
        LinFrameKind::TransmissionError => {
            if mandatory {
                2
            } else {
                23
            }
        }
        LinFrameKind::SyncError => {
            if mandatory {
                5
            } else {
                21
            }
        }
        LinFrameKind::ReceiveError => {
            if mandatory {
                2
            } else {
                36
            }
        }
        LinFrameKind::LongDominant => {
            if mandatory {
                1
            } else {
                17
            }
        }
    }
}

/// Materialize the ASAM LIN bus-logging layout on the writer: one data
/// group (1-byte record ids) with the eight frame/event channel groups.
pub fn configure_lin<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    options: &BusLogOptions,
) -> Result<LinBusConfig> {
    let dg_id = writer.add_data_group(1)?;
    let mandatory = options.mandatory_members_only;

    let kinds = [
        (LinFrameKind::Frame, "LIN_Frame"),
        (LinFrameKind::WakeUp, "LIN_WakeUp"),
        (LinFrameKind::ChecksumError, "LIN_ChecksumError"),
        (LinFrameKind::TransmissionError, "LIN_TransmissionError"),
        (LinFrameKind::SyncError, "LIN_SyncError"),
        (LinFrameKind::ReceiveError, "LIN_ReceiveError"),
        (LinFrameKind::Spike, "LIN_Spike"),
        (LinFrameKind::LongDominant, "LIN_LongDom"),
    ];

    let mut groups: Vec<BusGroup> = Vec::new();
    let mut prev_cg: Option<String> = None;

    for (index, (kind, name)) in kinds.iter().enumerate() {
        let record_id = index as u64 + 1;
        let cg_id = writer.add_channel_group_with_dg(&dg_id, prev_cg.as_deref(), |cg| {
            cg.record_id = record_id;
            cg.flags = cg_flags::PLAIN_BUS_EVENT | cg_flags::BUS_EVENT;
            cg.path_separator = u16::from(b'.');
        })?;
        writer.set_channel_group_name(&cg_id, name)?;
        writer.set_channel_group_source(&cg_id, &SourceBlock::lin_bus(), Some(&options.bus_name))?;
        create_time_channel(writer, &cg_id)?;
        create_lin_channel(writer, &cg_id, name, *kind, mandatory)?;

        prev_cg = Some(cg_id.clone());
        groups.push(BusGroup { cg_id, record_id });
    }

    let mut it = groups.into_iter();
    Ok(LinBusConfig {
        dg_id,
        mandatory_members_only: mandatory,
        frame: it.next().unwrap(),
        wake_up: it.next().unwrap(),
        checksum_error: it.next().unwrap(),
        transmission_error: it.next().unwrap(),
        sync_error: it.next().unwrap(),
        receive_error: it.next().unwrap(),
        spike: it.next().unwrap(),
        long_dominant: it.next().unwrap(),
    })
}

/// Add one numeric composition channel.
fn add_field<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    parent: &str,
    prev: Option<&str>,
    name: &str,
    data_type: DataType,
    byte_offset: u32,
    bit_offset: u8,
    bit_count: u32,
) -> Result<String> {
    writer.add_channel_composition(parent, prev, |ch| {
        ch.name = Some(String::from(name));
        ch.data_type = data_type;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = byte_offset;
        ch.bit_offset = bit_offset;
        ch.bit_count = bit_count;
    })
}

fn create_lin_channel<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    cg_id: &str,
    group_name: &str,
    kind: LinFrameKind,
    mandatory: bool,
) -> Result<()> {
    let data_bytes = record_data_bytes(kind, mandatory);
    let parent = writer.add_channel(cg_id, None, |ch| {
        ch.name = Some(String::from(group_name));
        ch.data_type = DataType::ByteArray;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = 8;
        ch.bit_count = (data_bytes * 8) as u32;
    })?;

    let uint = DataType::UnsignedIntegerLE;
    let float = DataType::FloatLE;

    let bus = add_field(writer, &parent, None, &alloc::format!("{group_name}.BusChannel"), uint, 8, 0, 6)?;
    let mut prev = bus;

    match kind {
        LinFrameKind::Frame | LinFrameKind::ChecksumError => {
            prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.ChecksumModel"), uint, 8, 6, 2)?;
            prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.ID"), uint, 9, 0, 6)?;
            let dir = create_bit_channel(writer, &parent, Some(&prev), &alloc::format!("{group_name}.Dir"), 9, 7)?;
            attach_dir_conversion(writer, &dir)?;
            prev = dir;
            prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.ReceivedDataByteCount"), uint, 10, 0, 4)?;
            prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.DataLength"), uint, 10, 4, 4)?;
            prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.DataBytes"), DataType::ByteArray, 11, 0, 8 * 8)?;
            if !mandatory {
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.Checksum"), uint, 19, 0, 8)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.SOF"), uint, 20, 0, 64)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.Baudrate"), float, 28, 0, 32)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.ResponseBaudrate"), float, 32, 0, 32)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.BreakLength"), uint, 36, 0, 32)?;
                let _ = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.BreakDelimiterLength"), uint, 40, 0, 32)?;
            }
        }
        LinFrameKind::WakeUp | LinFrameKind::Spike => {
            if !mandatory {
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.Baudrate"), float, 9, 0, 32)?;
                let _ = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.SOF"), uint, 13, 0, 64)?;
            }
        }
        LinFrameKind::TransmissionError => {
            prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.ID"), uint, 9, 0, 6)?;
            if !mandatory {
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.Baudrate"), float, 11, 0, 32)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.SOF"), uint, 15, 0, 64)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.BreakLength"), uint, 23, 0, 32)?;
                let _ = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.BreakDelimiterLength"), uint, 27, 0, 32)?;
            }
        }
        LinFrameKind::SyncError => {
            prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.Baudrate"), float, 9, 0, 32)?;
            if !mandatory {
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.SOF"), uint, 13, 0, 64)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.BreakLength"), uint, 21, 0, 32)?;
                let _ = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.BreakDelimiterLength"), uint, 25, 0, 32)?;
            }
        }
        LinFrameKind::ReceiveError => {
            prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.ID"), uint, 9, 0, 6)?;
            if !mandatory {
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.ReceivedDataByteCount"), uint, 10, 0, 4)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.DataLength"), uint, 10, 4, 4)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.Checksum"), uint, 11, 0, 8)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.DataBytes"), DataType::ByteArray, 12, 0, 8 * 8)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.SOF"), uint, 20, 0, 64)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.Baudrate"), float, 28, 0, 32)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.ResponseBaudrate"), float, 32, 0, 32)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.BreakLength"), uint, 36, 0, 32)?;
                let _ = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.BreakDelimiterLength"), uint, 40, 0, 32)?;
            }
        }
        LinFrameKind::LongDominant => {
            if !mandatory {
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.Baudrate"), float, 9, 0, 32)?;
                prev = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.SOF"), uint, 13, 0, 64)?;
                let _ = add_field(writer, &parent, Some(&prev), &alloc::format!("{group_name}.Length"), uint, 21, 0, 32)?;
            }
        }
    }

    Ok(())
}

// ============================================================================
// LIN message value object
// ============================================================================

/// One captured LIN frame or event, convertible to the record layouts
/// above.
#[derive(Debug, Clone)]
pub struct LinMessage {
    /// Checksum model bits 6-7, bus channel bits 0-5.
    bus_channel: u8,
    /// Dir bit 7, LIN id bits 0-5.
    lin_id: u8,
    /// Data length bits 4-7, received byte count bits 0-3.
    data_length: u8,
    checksum: u8,
    sof_ns: u64,
    baudrate: f32,
    response_baudrate: f32,
    break_length_ns: u32,
    break_delimiter_ns: u32,
    long_dominant_ns: u32,
    data_bytes: Vec<u8>,
}

impl Default for LinMessage {
    fn default() -> Self {
        Self {
            bus_channel: CHECKSUM_MODEL_MASK, // checksum model unknown
            lin_id: 0,
            data_length: 0,
            checksum: 0,
            sof_ns: 0,
            baudrate: 0.0,
            response_baudrate: 0.0,
            break_length_ns: 0,
            break_delimiter_ns: 0,
            long_dominant_ns: 0,
            data_bytes: Vec::new(),
        }
    }
}

impl LinMessage {
    pub fn new(lin_id: u8) -> Self {
        let mut msg = Self::default();
        msg.set_lin_id(lin_id);
        msg
    }

    pub fn set_bus_channel(&mut self, channel: u8) {
        self.bus_channel = (self.bus_channel & !CHANNEL_MASK) | (channel & CHANNEL_MASK);
    }

    pub fn bus_channel(&self) -> u8 {
        self.bus_channel & CHANNEL_MASK
    }

    pub fn set_lin_id(&mut self, id: u8) {
        self.lin_id = (self.lin_id & !LIN_ID_MASK) | (id & LIN_ID_MASK);
    }

    pub fn lin_id(&self) -> u8 {
        self.lin_id & LIN_ID_MASK
    }

    pub fn set_dir(&mut self, transmit: bool) {
        if transmit {
            self.lin_id |= DIR_MASK;
        } else {
            self.lin_id &= !DIR_MASK;
        }
    }

    pub fn dir(&self) -> bool {
        self.lin_id & DIR_MASK != 0
    }

    pub fn set_checksum_model(&mut self, model: LinChecksumModel) {
        let bits = match model {
            LinChecksumModel::Classic => 0u8,
            LinChecksumModel::Enhanced => 1,
            LinChecksumModel::Unknown => 3,
        };
        self.bus_channel = (self.bus_channel & !CHECKSUM_MODEL_MASK) | (bits << 6);
    }

    pub fn checksum_model(&self) -> LinChecksumModel {
        match (self.bus_channel & CHECKSUM_MODEL_MASK) >> 6 {
            0 => LinChecksumModel::Classic,
            1 => LinChecksumModel::Enhanced,
            _ => LinChecksumModel::Unknown,
        }
    }

    pub fn set_checksum(&mut self, checksum: u8) {
        self.checksum = checksum;
    }

    /// Payload; at most 8 bytes are stored.
    pub fn set_data_bytes(&mut self, data: &[u8]) {
        let len = data.len().min(8);
        self.data_bytes = data[..len].to_vec();
        self.data_length = (self.data_length & !LENGTH_MASK) | ((len as u8) << 4);
        self.data_length = (self.data_length & !RECEIVED_MASK) | (len as u8 & RECEIVED_MASK);
    }

    pub fn data_bytes(&self) -> &[u8] {
        &self.data_bytes
    }

    /// Start-of-frame timestamp in nanoseconds.
    pub fn set_sof_ns(&mut self, sof_ns: u64) {
        self.sof_ns = sof_ns;
    }

    pub fn set_baudrate(&mut self, baudrate: f32) {
        self.baudrate = baudrate;
    }

    pub fn set_response_baudrate(&mut self, baudrate: f32) {
        self.response_baudrate = baudrate;
    }

    pub fn set_break_length_ns(&mut self, length_ns: u32) {
        self.break_length_ns = length_ns;
    }

    pub fn set_break_delimiter_ns(&mut self, length_ns: u32) {
        self.break_delimiter_ns = length_ns;
    }

    pub fn set_long_dominant_ns(&mut self, length_ns: u32) {
        self.long_dominant_ns = length_ns;
    }

    /// Serialize into the record layout of the given frame kind. LIN data
    /// bytes are always inline (max-length 8, padded with 0xFF), so no
    /// side payload is produced.
    pub fn to_record(&self, kind: LinFrameKind, mandatory: bool) -> Vec<u8> {
        let size = 8 + record_data_bytes(kind, mandatory);
        let mut record = alloc::vec![0u8; size];
        record[8] = self.bus_channel;

        match kind {
            LinFrameKind::Frame | LinFrameKind::ChecksumError => {
                record[9] = self.lin_id;
                record[10] = self.data_length;
                for index in 0..8 {
                    record[11 + index] =
                        self.data_bytes.get(index).copied().unwrap_or(0xFF);
                }
                if !mandatory {
                    record[19] = self.checksum;
                    record[20..28].copy_from_slice(&self.sof_ns.to_le_bytes());
                    record[28..32].copy_from_slice(&self.baudrate.to_le_bytes());
                    record[32..36].copy_from_slice(&self.response_baudrate.to_le_bytes());
                    record[36..40].copy_from_slice(&self.break_length_ns.to_le_bytes());
                    record[40..44].copy_from_slice(&self.break_delimiter_ns.to_le_bytes());
                }
            }
            LinFrameKind::WakeUp | LinFrameKind::Spike => {
                if !mandatory {
                    record[9..13].copy_from_slice(&self.baudrate.to_le_bytes());
                    record[13..21].copy_from_slice(&self.sof_ns.to_le_bytes());
                }
            }
            LinFrameKind::TransmissionError => {
                record[9] = self.lin_id;
                if !mandatory {
                    record[11..15].copy_from_slice(&self.baudrate.to_le_bytes());
                    record[15..23].copy_from_slice(&self.sof_ns.to_le_bytes());
                    record[23..27].copy_from_slice(&self.break_length_ns.to_le_bytes());
                    record[27..31].copy_from_slice(&self.break_delimiter_ns.to_le_bytes());
                }
            }
            LinFrameKind::SyncError => {
                record[9..13].copy_from_slice(&self.baudrate.to_le_bytes());
                if !mandatory {
                    record[13..21].copy_from_slice(&self.sof_ns.to_le_bytes());
                    record[21..25].copy_from_slice(&self.break_length_ns.to_le_bytes());
                    record[25..29].copy_from_slice(&self.break_delimiter_ns.to_le_bytes());
                }
            }
            LinFrameKind::ReceiveError => {
                record[9] = self.lin_id;
                if !mandatory {
                    record[10] = self.data_length;
                    record[11] = self.checksum;
                    for index in 0..8 {
                        record[12 + index] =
                            self.data_bytes.get(index).copied().unwrap_or(0xFF);
                    }
                    record[20..28].copy_from_slice(&self.sof_ns.to_le_bytes());
                    record[28..32].copy_from_slice(&self.baudrate.to_le_bytes());
                    record[32..36].copy_from_slice(&self.response_baudrate.to_le_bytes());
                    record[36..40].copy_from_slice(&self.break_length_ns.to_le_bytes());
                    record[40..44].copy_from_slice(&self.break_delimiter_ns.to_le_bytes());
                }
            }
            LinFrameKind::LongDominant => {
                if !mandatory {
                    record[9..13].copy_from_slice(&self.baudrate.to_le_bytes());
                    record[13..21].copy_from_slice(&self.sof_ns.to_le_bytes());
                    record[21..25].copy_from_slice(&self.long_dominant_ns.to_le_bytes());
                }
            }
        }

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_record_layout() {
        let mut msg = LinMessage::new(0x2A);
        msg.set_bus_channel(3);
        msg.set_dir(true);
        msg.set_checksum_model(LinChecksumModel::Enhanced);
        msg.set_data_bytes(&[1, 2, 3]);

        let record = msg.to_record(LinFrameKind::Frame, true);
        assert_eq!(record.len(), 19);
        assert_eq!(record[8] & CHANNEL_MASK, 3);
        assert_eq!((record[8] & CHECKSUM_MODEL_MASK) >> 6, 1);
        assert_eq!(record[9] & LIN_ID_MASK, 0x2A);
        assert_ne!(record[9] & DIR_MASK, 0);
        assert_eq!(record[10] >> 4, 3);
        assert_eq!(&record[11..14], &[1, 2, 3]);
        assert_eq!(record[14], 0xFF); // padding
    }

    #[test]
    fn full_frame_carries_timing() {
        let mut msg = LinMessage::new(1);
        msg.set_sof_ns(123_456_789);
        msg.set_baudrate(19_200.0);

        let record = msg.to_record(LinFrameKind::Frame, false);
        assert_eq!(record.len(), 44);
        assert_eq!(
            u64::from_le_bytes(record[20..28].try_into().unwrap()),
            123_456_789
        );
        assert_eq!(
            f32::from_le_bytes(record[28..32].try_into().unwrap()),
            19_200.0
        );
    }

    #[test]
    fn record_sizes_match_configurator() {
        for kind in [
            LinFrameKind::Frame,
            LinFrameKind::WakeUp,
            LinFrameKind::ChecksumError,
            LinFrameKind::TransmissionError,
            LinFrameKind::SyncError,
            LinFrameKind::ReceiveError,
            LinFrameKind::Spike,
            LinFrameKind::LongDominant,
        ] {
            for mandatory in [false, true] {
                let msg = LinMessage::default();
                let record = msg.to_record(kind, mandatory);
                assert_eq!(record.len(), 8 + record_data_bytes(kind, mandatory));
            }
        }
    }
}
