//! Bus-logging channel configurators and message value objects.
//!
//! The ASAM bus-logging standard mandates a rigid channel layout for
//! recorded bus traffic: one channel group per frame type, a `t` master
//! time channel, and one parent byte-array channel per group whose
//! composition describes every protocol field bit-precisely. The
//! configurators in this module materialize that layout on an
//! [`MdfWriter`]; the message value objects serialize captured frames into
//! record buffers matching it exactly.

mod can;
mod ethernet;
mod lin;

pub use can::{CanBusConfig, CanErrorType, CanFrameKind, CanMessage, configure_can};
pub use ethernet::{EthBusConfig, EthFrameKind, EthMessage, configure_ethernet};
pub use lin::{LinBusConfig, LinChecksumModel, LinFrameKind, LinMessage, configure_lin};

use crate::blocks::{ChannelType, DataType, SyncType, cn_flags};
use crate::types::StorageType;
use crate::writer::{MdfWrite, MdfWriter};
use crate::Result;
use alloc::string::String;

/// Options shared by all bus configurators.
#[derive(Debug, Clone)]
pub struct BusLogOptions {
    /// Storage discipline for variable-size payload fields.
    pub storage: StorageType,
    /// Reserved payload size for max-length storage (and the CAN classic
    /// inline layout).
    pub max_length: usize,
    /// Emit only the mandatory members of each frame layout.
    pub mandatory_members_only: bool,
    /// Source name recorded for every channel group (e.g. "CAN1").
    pub bus_name: String,
}

impl Default for BusLogOptions {
    fn default() -> Self {
        Self {
            storage: StorageType::Vlsd,
            max_length: 8,
            mandatory_members_only: false,
            bus_name: String::new(),
        }
    }
}

/// One configured channel group and the record id its samples carry.
#[derive(Debug, Clone)]
pub struct BusGroup {
    pub cg_id: String,
    pub record_id: u64,
}

/// Create the mandated `t` master time channel: float64 seconds at record
/// bytes 0..8.
pub(crate) fn create_time_channel<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    cg_id: &str,
) -> Result<String> {
    let time_ch = writer.add_channel(cg_id, None, |ch| {
        ch.name = Some(String::from("t"));
        ch.channel_type = ChannelType::Master;
        ch.sync_type = SyncType::Time;
        ch.data_type = DataType::FloatLE;
        ch.byte_offset = 0;
        ch.bit_count = 64;
    })?;
    writer.set_channel_unit(&time_ch, "s")?;
    Ok(time_ch)
}

/// Create a one-bit composition channel at the given byte/bit position.
pub(crate) fn create_bit_channel<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    parent_cn: &str,
    prev: Option<&str>,
    name: &str,
    byte_offset: u32,
    bit_offset: u8,
) -> Result<String> {
    writer.add_channel_composition(parent_cn, prev, |ch| {
        ch.name = Some(String::from(name));
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.flags = cn_flags::BUS_EVENT;
        ch.byte_offset = byte_offset;
        ch.bit_offset = bit_offset;
        ch.bit_count = 1;
    })
}

/// Attach the standard `0 → "Rx", 1 → "Tx"` direction conversion to a
/// channel.
pub(crate) fn attach_dir_conversion<W: MdfWrite>(
    writer: &mut MdfWriter<W>,
    cn_id: &str,
) -> Result<()> {
    writer
        .add_value_to_text_conversion(&[(0, "Rx"), (1, "Tx")], "", Some(cn_id))
        .map(|_| ())
}

/// The CAN-FD DLC code to byte-length table (also used by classic CAN,
/// where only codes 0..8 occur).
pub(crate) fn dlc_conversion_pairs() -> [(f64, f64); 16] {
    let mut pairs = [(0.0, 0.0); 16];
    for (code, entry) in pairs.iter_mut().enumerate() {
        *entry = (code as f64, can::dlc_to_length(code as u8) as f64);
    }
    pairs
}

#[cfg(feature = "std")]
impl crate::writer::StreamingWriter {
    /// Enqueue a CAN message for the configured frame group.
    pub fn save_can_message(
        &self,
        config: &CanBusConfig,
        kind: CanFrameKind,
        timestamp_ns: u64,
        msg: &CanMessage,
    ) -> Result<()> {
        let group = match kind {
            CanFrameKind::DataFrame => &config.data_frame,
            CanFrameKind::RemoteFrame => &config.remote_frame,
            CanFrameKind::ErrorFrame => &config.error_frame,
            CanFrameKind::OverloadFrame => &config.overload_frame,
        };
        let (record, vlsd) = msg.to_record(kind, config.storage, config.max_length);
        self.save_record(group.record_id, timestamp_ns, record, vlsd)
    }

    /// Enqueue a LIN message for the configured frame group.
    pub fn save_lin_message(
        &self,
        config: &LinBusConfig,
        kind: LinFrameKind,
        timestamp_ns: u64,
        msg: &LinMessage,
    ) -> Result<()> {
        let record = msg.to_record(kind, config.mandatory_members_only);
        self.save_record(config.group(kind).record_id, timestamp_ns, record, None)
    }

    /// Enqueue an Ethernet message for the configured frame group.
    pub fn save_eth_message(
        &self,
        config: &EthBusConfig,
        kind: EthFrameKind,
        timestamp_ns: u64,
        msg: &EthMessage,
    ) -> Result<()> {
        let (record, vlsd) = msg.to_record(
            kind,
            config.storage,
            config.max_length,
            config.mandatory_members_only,
        );
        self.save_record(config.group(kind).record_id, timestamp_ns, record, vlsd)
    }
}
