//! CAN bus logging: the mandated channel layout and the frame value
//! object.
//!
//! Record layouts (offsets relative to the record start; bytes 0..8 are
//! the `t` master time channel):
//!
//! ```text
//! CAN_DataFrame      ID@8(29bit) IDE@11.7 DLC@12.0-3 Bus@12.4-7
//!                    flags@13 (Dir/SRR/EDL/BRS/ESI/WakeUp/SingleWire)
//!                    DataBytes@14 (VLSD index, or inline for MLSD/fixed)
//! CAN_RemoteFrame    same head, no data bytes
//! CAN_ErrorFrame     head + BitPosition@14 ErrorType@15 DataBytes@16
//! CAN_OverloadFrame  Bus high nibble and Dir bit 0 packed into byte 8
//! ```

use super::{
    BusGroup, BusLogOptions, attach_dir_conversion, create_bit_channel, create_time_channel,
    dlc_conversion_pairs,
};
use crate::blocks::{ChannelType, DataType, SourceBlock, cg_flags, cn_flags};
use crate::types::StorageType;
use crate::writer::{MdfWrite, MdfWriter};
use crate::Result;
use alloc::string::String;
use alloc::vec::Vec;

/// CAN-FD data length codes.
const DATA_LENGTH_CODE: [usize; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

const EXTENDED_BIT: u32 = 0x8000_0000;
const STANDARD_ID_MASK: u32 = 0x7FF;

const DIR_BIT: u8 = 0x01;
const SRR_BIT: u8 = 0x02;
const EDL_BIT: u8 = 0x04;
const BRS_BIT: u8 = 0x08;
const ESI_BIT: u8 = 0x10;
const WAKE_UP_BIT: u8 = 0x20;
const SINGLE_WIRE_BIT: u8 = 0x40;
const RTR_BIT: u8 = 0x80;

/// Byte length for a DLC code.
pub(crate) fn dlc_to_length(dlc: u8) -> usize {
    DATA_LENGTH_CODE
        .get((dlc & 0x0F) as usize)
        .copied()
        .unwrap_or(0)
}

/// The frame types a CAN capture distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanFrameKind {
    DataFrame,
    RemoteFrame,
    ErrorFrame,
    OverloadFrame,
}

/// CAN error classification stored in the error frame's ErrorType field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CanErrorType {
    #[default]
    Unknown = 0,
    Bit = 1,
    Form = 2,
    BitStuffing = 3,
    Crc = 4,
    Ack = 5,
}

/// The configured CAN bus-logging layout: one data group, four primary
/// channel groups, and (for VLSD storage) the sibling payload groups.
#[derive(Debug, Clone)]
pub struct CanBusConfig {
    pub dg_id: String,
    pub storage: StorageType,
    pub max_length: usize,
    pub data_frame: BusGroup,
    pub remote_frame: BusGroup,
    pub error_frame: BusGroup,
    pub overload_frame: BusGroup,
}

/// Materialize the ASAM CAN bus-logging layout on the writer.
///
/// Creates one data group (1-byte record ids) containing `CAN_DataFrame`,
/// `CAN_RemoteFrame`, `CAN_ErrorFrame` and `CAN_OverloadFrame` groups.
/// With VLSD storage the data and error frames get sibling VLSD groups
/// with the next record id, exactly as the standard's "dirty trick"
/// prescribes.
pub fn configure_can<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    options: &BusLogOptions,
) -> Result<CanBusConfig> {
    let dg_id = writer.add_data_group(1)?;
    let vlsd = options.storage == StorageType::Vlsd;

    let mut next_record_id = 1u64;
    let mut prev_cg: Option<String> = None;

    // CAN_DataFrame (+ VLSD sibling)
    let data_cg = make_bus_group(
        writer,
        &dg_id,
        &mut prev_cg,
        options,
        "CAN_DataFrame",
        next_record_id,
    )?;
    let data_record_id = next_record_id;
    next_record_id += 1;
    create_time_channel(writer, &data_cg)?;
    create_data_frame_channel(writer, &data_cg, "CAN_DataFrame", options)?;
    if vlsd {
        let vlsd_cg = writer.add_vlsd_channel_group(&dg_id, prev_cg.as_deref(), next_record_id)?;
        prev_cg = Some(vlsd_cg);
        next_record_id += 1;
    }

    // CAN_RemoteFrame
    let remote_cg = make_bus_group(
        writer,
        &dg_id,
        &mut prev_cg,
        options,
        "CAN_RemoteFrame",
        next_record_id,
    )?;
    let remote_record_id = next_record_id;
    next_record_id += 1;
    create_time_channel(writer, &remote_cg)?;
    create_remote_frame_channel(writer, &remote_cg, "CAN_RemoteFrame", options)?;

    // CAN_ErrorFrame (+ VLSD sibling)
    let error_cg = make_bus_group(
        writer,
        &dg_id,
        &mut prev_cg,
        options,
        "CAN_ErrorFrame",
        next_record_id,
    )?;
    let error_record_id = next_record_id;
    next_record_id += 1;
    create_time_channel(writer, &error_cg)?;
    create_error_frame_channel(writer, &error_cg, "CAN_ErrorFrame", options)?;
    if vlsd {
        let vlsd_cg = writer.add_vlsd_channel_group(&dg_id, prev_cg.as_deref(), next_record_id)?;
        prev_cg = Some(vlsd_cg);
        next_record_id += 1;
    }

    // CAN_OverloadFrame
    let overload_cg = make_bus_group(
        writer,
        &dg_id,
        &mut prev_cg,
        options,
        "CAN_OverloadFrame",
        next_record_id,
    )?;
    let overload_record_id = next_record_id;
    create_time_channel(writer, &overload_cg)?;
    create_overload_frame_channel(writer, &overload_cg, "CAN_OverloadFrame")?;

    Ok(CanBusConfig {
        dg_id,
        storage: options.storage,
        max_length: options.max_length,
        data_frame: BusGroup {
            cg_id: data_cg,
            record_id: data_record_id,
        },
        remote_frame: BusGroup {
            cg_id: remote_cg,
            record_id: remote_record_id,
        },
        error_frame: BusGroup {
            cg_id: error_cg,
            record_id: error_record_id,
        },
        overload_frame: BusGroup {
            cg_id: overload_cg,
            record_id: overload_record_id,
        },
    })
}

/// Create one bus-event channel group with name, source and the `.` path
/// separator, chained after the previous group.
fn make_bus_group<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    dg_id: &str,
    prev_cg: &mut Option<String>,
    options: &BusLogOptions,
    name: &str,
    record_id: u64,
) -> Result<String> {
    let cg_id = writer.add_channel_group_with_dg(dg_id, prev_cg.as_deref(), |cg| {
        cg.record_id = record_id;
        cg.flags = cg_flags::PLAIN_BUS_EVENT | cg_flags::BUS_EVENT;
        cg.path_separator = u16::from(b'.');
    })?;
    writer.set_channel_group_name(&cg_id, name)?;
    writer.set_channel_group_source(&cg_id, &SourceBlock::can_bus(), Some(&options.bus_name))?;
    *prev_cg = Some(cg_id.clone());
    Ok(cg_id)
}

/// The shared head of the data/remote/error frame compositions:
/// BusChannel, ID, IDE, DLC, DataLength (with the DLC table conversion)
/// and Dir (with the Rx/Tx conversion). Returns the last composition id.
fn create_frame_head<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    parent: &str,
    group_name: &str,
) -> Result<String> {
    let bus = writer.add_channel_composition(parent, None, |ch| {
        ch.name = Some(alloc::format!("{group_name}.BusChannel"));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.flags = cn_flags::BUS_EVENT | cn_flags::RANGE_VALID;
        ch.min_raw_value = 0.0;
        ch.max_raw_value = 15.0;
        ch.byte_offset = 12;
        ch.bit_offset = 4;
        ch.bit_count = 4;
    })?;

    let id = writer.add_channel_composition(parent, Some(&bus), |ch| {
        ch.name = Some(alloc::format!("{group_name}.ID"));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = 8;
        ch.bit_offset = 0;
        ch.bit_count = 29;
    })?;

    let ide = create_bit_channel(writer, parent, Some(&id), &alloc::format!("{group_name}.IDE"), 11, 7)?;

    let dlc = writer.add_channel_composition(parent, Some(&ide), |ch| {
        ch.name = Some(alloc::format!("{group_name}.DLC"));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = 12;
        ch.bit_offset = 0;
        ch.bit_count = 4;
    })?;

    let data_length = writer.add_channel_composition(parent, Some(&dlc), |ch| {
        ch.name = Some(alloc::format!("{group_name}.DataLength"));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = 12;
        ch.bit_offset = 0;
        ch.bit_count = 4;
    })?;
    writer.add_value_to_value_conversion(&data_length, &dlc_conversion_pairs())?;

    let dir = create_bit_channel(
        writer,
        parent,
        Some(&data_length),
        &alloc::format!("{group_name}.Dir"),
        13,
        0,
    )?;
    attach_dir_conversion(writer, &dir)?;
    Ok(dir)
}

fn create_data_frame_channel<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    cg_id: &str,
    group_name: &str,
    options: &BusLogOptions,
) -> Result<String> {
    let data_bytes = match options.storage {
        StorageType::Mlsd => 6 + options.max_length,
        // Index into the side table, or the classic inline 8 bytes
        StorageType::Vlsd | StorageType::FixedLength => 6 + 8,
    };

    let parent = writer.add_channel(cg_id, None, |ch| {
        ch.name = Some(String::from(group_name));
        ch.data_type = DataType::ByteArray;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = 8;
        ch.bit_count = (data_bytes * 8) as u32;
    })?;

    let head_last = create_frame_head(writer, &parent, group_name)?;

    let storage = options.storage;
    let max_length = options.max_length;
    let data = writer.add_channel_composition(&parent, Some(&head_last), |ch| {
        ch.name = Some(alloc::format!("{group_name}.DataBytes"));
        ch.data_type = DataType::ByteArray;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = 14;
        match storage {
            StorageType::Vlsd => {
                ch.channel_type = ChannelType::VariableLength;
                ch.bit_count = 64; // Index into the VLSD sibling group
            }
            StorageType::Mlsd => {
                ch.channel_type = ChannelType::MaxLength;
                ch.bit_count = (max_length * 8) as u32;
            }
            StorageType::FixedLength => {
                ch.bit_count = 64;
            }
        }
    })?;

    if !options.mandatory_members_only {
        let mut prev = data;
        for (name, bit) in [
            ("SRR", 1u8),
            ("EDL", 2),
            ("BRS", 3),
            ("ESI", 4),
            ("WakeUp", 5),
            ("SingleWire", 6),
        ] {
            prev = create_bit_channel(
                writer,
                &parent,
                Some(&prev),
                &alloc::format!("{group_name}.{name}"),
                13,
                bit,
            )?;
        }
    }
    Ok(parent)
}

fn create_remote_frame_channel<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    cg_id: &str,
    group_name: &str,
    options: &BusLogOptions,
) -> Result<String> {
    let parent = writer.add_channel(cg_id, None, |ch| {
        ch.name = Some(String::from(group_name));
        ch.data_type = DataType::ByteArray;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = 8;
        ch.bit_count = 6 * 8;
    })?;

    let head_last = create_frame_head(writer, &parent, group_name)?;

    if !options.mandatory_members_only {
        let mut prev = head_last;
        for (name, bit) in [("SRR", 1u8), ("WakeUp", 5), ("SingleWire", 6)] {
            prev = create_bit_channel(
                writer,
                &parent,
                Some(&prev),
                &alloc::format!("{group_name}.{name}"),
                13,
                bit,
            )?;
        }
    }
    Ok(parent)
}

fn create_error_frame_channel<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    cg_id: &str,
    group_name: &str,
    options: &BusLogOptions,
) -> Result<String> {
    let data_bytes = match options.storage {
        StorageType::Mlsd => 8 + options.max_length,
        StorageType::Vlsd | StorageType::FixedLength => 8 + 8,
    };

    let parent = writer.add_channel(cg_id, None, |ch| {
        ch.name = Some(String::from(group_name));
        ch.data_type = DataType::ByteArray;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = 8;
        ch.bit_count = (data_bytes * 8) as u32;
    })?;

    let head_last = create_frame_head(writer, &parent, group_name)?;

    let bit_position = writer.add_channel_composition(&parent, Some(&head_last), |ch| {
        ch.name = Some(alloc::format!("{group_name}.BitPosition"));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = 14;
        ch.bit_count = 8;
    })?;

    let error_type = writer.add_channel_composition(&parent, Some(&bit_position), |ch| {
        ch.name = Some(alloc::format!("{group_name}.ErrorType"));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = 15;
        ch.bit_count = 8;
    })?;

    let storage = options.storage;
    let max_length = options.max_length;
    let data = writer.add_channel_composition(&parent, Some(&error_type), |ch| {
        ch.name = Some(alloc::format!("{group_name}.DataBytes"));
        ch.data_type = DataType::ByteArray;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = 16;
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
    })?;

    if !options.mandatory_members_only {
        let mut prev = data;
        for (name, bit) in [
            ("SRR", 1u8),
            ("EDL", 2),
            ("BRS", 3),
            ("ESI", 4),
            ("WakeUp", 5),
            ("SingleWire", 6),
            ("RTR", 7),
        ] {
            prev = create_bit_channel(
                writer,
                &parent,
                Some(&prev),
                &alloc::format!("{group_name}.{name}"),
                13,
                bit,
            )?;
        }
    }
    Ok(parent)
}

fn create_overload_frame_channel<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    cg_id: &str,
    group_name: &str,
) -> Result<String> {
    let parent = writer.add_channel(cg_id, None, |ch| {
        ch.name = Some(String::from(group_name));
        ch.data_type = DataType::ByteArray;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = 8;
        ch.bit_count = 8;
    })?;

    let bus = writer.add_channel_composition(&parent, None, |ch| {
        ch.name = Some(alloc::format!("{group_name}.BusChannel"));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = 8;
        ch.bit_offset = 4;
        ch.bit_count = 4;
    })?;
    let dir = create_bit_channel(writer, &parent, Some(&bus), &alloc::format!("{group_name}.Dir"), 8, 0)?;
    attach_dir_conversion(writer, &dir)?;
    Ok(parent)
}

// ============================================================================
// CAN message value object
// ============================================================================

/// One captured CAN frame, convertible to the record layout above.
///
/// The message id carries the extended flag in bit 31; the bus channel is
/// packed into the DLC byte's high nibble, matching the on-record layout.
#[derive(Debug, Clone, Default)]
pub struct CanMessage {
    message_id: u32,
    dlc_and_channel: u8,
    flags: u8,
    data_bytes: Vec<u8>,
    bit_position: u8,
    error_type: u8,
}

impl CanMessage {
    pub fn new(message_id: u32) -> Self {
        let mut msg = CanMessage::default();
        msg.set_message_id(message_id);
        msg
    }

    /// Set the message id. Ids above the 11-bit range implicitly become
    /// extended.
    pub fn set_message_id(&mut self, msg_id: u32) {
        self.message_id = msg_id;
        if msg_id > STANDARD_ID_MASK {
            self.message_id |= EXTENDED_BIT;
        }
    }

    /// The message id including the extended flag in bit 31.
    pub fn message_id(&self) -> u32 {
        self.message_id
    }

    pub fn set_extended_id(&mut self, extended: bool) {
        if extended {
            self.message_id |= EXTENDED_BIT;
        } else {
            self.message_id &= !EXTENDED_BIT;
        }
    }

    pub fn extended_id(&self) -> bool {
        self.message_id & EXTENDED_BIT != 0
    }

    /// Set the DLC code; the payload buffer is resized to the matching
    /// byte length.
    pub fn set_dlc(&mut self, dlc: u8) {
        self.dlc_and_channel = (self.dlc_and_channel & 0xF0) | (dlc & 0x0F);
        let size = dlc_to_length(dlc);
        self.data_bytes.resize(size, 0xFF);
    }

    pub fn dlc(&self) -> u8 {
        self.dlc_and_channel & 0x0F
    }

    /// Set the payload length in bytes; rounds up to the next legal DLC
    /// size.
    pub fn set_data_length(&mut self, data_length: usize) {
        let clamped = if data_length > 64 { 8 } else { data_length };
        let dlc = DATA_LENGTH_CODE
            .iter()
            .position(|&size| clamped <= size)
            .unwrap_or(8) as u8;
        self.set_dlc(dlc);
    }

    pub fn data_length(&self) -> usize {
        dlc_to_length(self.dlc())
    }

    /// Set the payload. The stored buffer is padded with 0xFF up to the
    /// DLC size the payload length rounds to.
    pub fn set_data_bytes(&mut self, data: &[u8]) {
        self.set_data_length(data.len());
        for (index, slot) in self.data_bytes.iter_mut().enumerate() {
            *slot = data.get(index).copied().unwrap_or(0xFF);
        }
    }

    pub fn data_bytes(&self) -> &[u8] {
        &self.data_bytes
    }

    pub fn set_bus_channel(&mut self, channel: u8) {
        self.dlc_and_channel = (self.dlc_and_channel & 0x0F) | (channel << 4);
    }

    pub fn bus_channel(&self) -> u8 {
        (self.dlc_and_channel & 0xF0) >> 4
    }

    fn set_flag(&mut self, mask: u8, value: bool) {
        if value {
            self.flags |= mask;
        } else {
            self.flags &= !mask;
        }
    }

    pub fn set_dir(&mut self, transmit: bool) {
        self.set_flag(DIR_BIT, transmit);
    }

    pub fn dir(&self) -> bool {
        self.flags & DIR_BIT != 0
    }

    pub fn set_srr(&mut self, srr: bool) {
        self.set_flag(SRR_BIT, srr);
    }

    /// Extended (CAN FD) data length flag.
    pub fn set_edl(&mut self, edl: bool) {
        self.set_flag(EDL_BIT, edl);
    }

    /// Bit rate switch (CAN FD).
    pub fn set_brs(&mut self, brs: bool) {
        self.set_flag(BRS_BIT, brs);
    }

    /// Error state indicator (CAN FD).
    pub fn set_esi(&mut self, esi: bool) {
        self.set_flag(ESI_BIT, esi);
    }

    pub fn set_rtr(&mut self, rtr: bool) {
        self.set_flag(RTR_BIT, rtr);
    }

    pub fn set_wake_up(&mut self, wake_up: bool) {
        self.set_flag(WAKE_UP_BIT, wake_up);
    }

    pub fn set_single_wire(&mut self, single_wire: bool) {
        self.set_flag(SINGLE_WIRE_BIT, single_wire);
    }

    /// Error bit position (error frames).
    pub fn set_bit_position(&mut self, position: u8) {
        self.bit_position = position;
    }

    /// Error classification (error frames).
    pub fn set_error_type(&mut self, error_type: CanErrorType) {
        self.error_type = error_type as u8;
    }

    /// Fill the message from any `embedded_can` frame.
    #[cfg(feature = "can")]
    pub fn from_frame<F: embedded_can::Frame>(frame: &F) -> Self {
        let mut msg = CanMessage::default();
        match frame.id() {
            embedded_can::Id::Standard(id) => {
                msg.set_message_id(id.as_raw() as u32);
                msg.set_extended_id(false);
            }
            embedded_can::Id::Extended(id) => {
                msg.set_message_id(id.as_raw());
                msg.set_extended_id(true);
            }
        }
        msg.set_rtr(frame.is_remote_frame());
        msg.set_data_bytes(frame.data());
        msg
    }

    /// Serialize into the record layout of the given frame kind.
    ///
    /// Returns the fixed record buffer (bytes 0..8 left for the time
    /// master) plus the variable payload when the storage discipline uses
    /// a side table. For VLSD the trailing 8 bytes are the index slot the
    /// flush thread patches.
    pub fn to_record(
        &self,
        kind: CanFrameKind,
        storage: StorageType,
        max_length: usize,
    ) -> (Vec<u8>, Option<Vec<u8>>) {
        match kind {
            CanFrameKind::DataFrame => self.data_frame_record(storage, max_length),
            CanFrameKind::RemoteFrame => {
                let mut record = alloc::vec![0u8; 8 + 6];
                self.write_head(&mut record);
                (record, None)
            }
            CanFrameKind::ErrorFrame => self.error_frame_record(storage, max_length),
            CanFrameKind::OverloadFrame => {
                let mut record = alloc::vec![0u8; 8 + 1];
                record[8] = (self.bus_channel() << 4) | (self.flags & DIR_BIT);
                (record, None)
            }
        }
    }

    /// ID, DLC/bus and flag bytes shared by data, remote and error frames.
    fn write_head(&self, record: &mut [u8]) {
        record[8..12].copy_from_slice(&self.message_id.to_le_bytes());
        record[12] = self.dlc_and_channel;
        record[13] = self.flags;
    }

    fn data_frame_record(
        &self,
        storage: StorageType,
        max_length: usize,
    ) -> (Vec<u8>, Option<Vec<u8>>) {
        match storage {
            StorageType::Vlsd => {
                let mut record = alloc::vec![0u8; 8 + 6 + 8];
                self.write_head(&mut record);
                // Bytes 14..22 are the index slot, patched at flush time.
                (record, Some(self.data_bytes.clone()))
            }
            StorageType::Mlsd | StorageType::FixedLength => {
                let payload_room = if storage == StorageType::Mlsd {
                    max_length
                } else {
                    8
                };
                let mut record = alloc::vec![0u8; 8 + 6 + payload_room];
                self.write_head(&mut record);
                let n = self.data_bytes.len().min(payload_room);
                record[14..14 + n].copy_from_slice(&self.data_bytes[..n]);
                (record, None)
            }
        }
    }

    fn error_frame_record(
        &self,
        storage: StorageType,
        max_length: usize,
    ) -> (Vec<u8>, Option<Vec<u8>>) {
        match storage {
            StorageType::Vlsd => {
                let mut record = alloc::vec![0u8; 8 + 8 + 8];
                self.write_head(&mut record);
                record[14] = self.bit_position;
                record[15] = self.error_type;
                (record, Some(self.data_bytes.clone()))
            }
            StorageType::Mlsd | StorageType::FixedLength => {
                let payload_room = if storage == StorageType::Mlsd {
                    max_length
                } else {
                    8
                };
                let mut record = alloc::vec![0u8; 8 + 8 + payload_room];
                self.write_head(&mut record);
                record[14] = self.bit_position;
                record[15] = self.error_type;
                let n = self.data_bytes.len().min(payload_room);
                record[16..16 + n].copy_from_slice(&self.data_bytes[..n]);
                (record, None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dlc_length_table() {
        assert_eq!(dlc_to_length(8), 8);
        assert_eq!(dlc_to_length(9), 12);
        assert_eq!(dlc_to_length(15), 64);
    }

    #[test]
    fn message_id_extended_detection() {
        let mut msg = CanMessage::default();
        msg.set_message_id(0x123);
        assert!(!msg.extended_id());
        msg.set_message_id(0x18FE_F100);
        assert!(msg.extended_id());
    }

    #[test]
    fn payload_pads_to_dlc_size() {
        let mut msg = CanMessage::default();
        msg.set_data_bytes(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        // 9 bytes round up to DLC 9 == 12 bytes, padded with 0xFF
        assert_eq!(msg.dlc(), 9);
        assert_eq!(msg.data_length(), 12);
        assert_eq!(&msg.data_bytes()[..9], &[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(&msg.data_bytes()[9..], &[0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn bus_channel_packs_into_dlc_byte() {
        let mut msg = CanMessage::default();
        msg.set_bus_channel(11);
        msg.set_dlc(6);
        assert_eq!(msg.bus_channel(), 11);
        assert_eq!(msg.dlc(), 6);

        let (record, vlsd) = msg.to_record(CanFrameKind::DataFrame, StorageType::Vlsd, 8);
        assert_eq!(record.len(), 22);
        assert_eq!(record[12], (11 << 4) | 6);
        assert_eq!(vlsd.unwrap().len(), 6);
    }

    #[test]
    fn data_frame_layout_mlsd() {
        let mut msg = CanMessage::new(0x123);
        msg.set_data_bytes(&[0xAA, 0xBB, 0xCC, 0xDD]);
        msg.set_dir(true);

        let (record, vlsd) = msg.to_record(CanFrameKind::DataFrame, StorageType::Mlsd, 8);
        assert!(vlsd.is_none());
        assert_eq!(record.len(), 8 + 6 + 8);
        assert_eq!(&record[8..12], &0x123u32.to_le_bytes());
        assert_eq!(record[12] & 0x0F, 4);
        assert_eq!(record[13] & 0x01, 1); // Dir = Tx
        assert_eq!(&record[14..18], &[0xAA, 0xBB, 0xCC, 0xDD]);
    }

    #[test]
    fn overload_frame_packs_nibble() {
        let mut msg = CanMessage::default();
        msg.set_bus_channel(3);
        msg.set_dir(true);
        let (record, _) = msg.to_record(CanFrameKind::OverloadFrame, StorageType::Vlsd, 8);
        assert_eq!(record.len(), 9);
        assert_eq!(record[8], (3 << 4) | 1);
    }
}
