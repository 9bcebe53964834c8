//! Bus-logging round trips through the streaming writer and the reader.

use mdfkit::buslog::{
    BusLogOptions, CanFrameKind, CanMessage, EthFrameKind, EthMessage, LinFrameKind, LinMessage,
    configure_can, configure_ethernet, configure_lin,
};
use mdfkit::observer::ChannelObserver;
use mdfkit::writer::StreamingWriter;
use mdfkit::{DecodedValue, MDF, MdfReader, StorageType};

const T0: u64 = 1_700_000_000_000_000_000;

fn can_message(i: u64) -> CanMessage {
    let mut msg = CanMessage::new(123);
    msg.set_extended_id(true);
    msg.set_bus_channel(11);
    let len = (i + 1).min(8) as usize;
    msg.set_data_bytes(&vec![(i + 1) as u8; len]);
    msg
}

fn write_can_capture(path: &std::path::Path, options: &BusLogOptions, samples: u64) {
    let mut writer = StreamingWriter::new(path).unwrap();
    let can = configure_can(writer.writer_mut().unwrap(), options).unwrap();

    writer.init_measurement().unwrap();
    writer.start_measurement(T0).unwrap();

    let mut t = T0;
    for i in 0..samples {
        let msg = can_message(i);
        writer
            .save_can_message(&can, CanFrameKind::DataFrame, t, &msg)
            .unwrap();
        writer
            .save_can_message(&can, CanFrameKind::RemoteFrame, t, &msg)
            .unwrap();
        writer
            .save_can_message(&can, CanFrameKind::ErrorFrame, t, &msg)
            .unwrap();
        writer
            .save_can_message(&can, CanFrameKind::OverloadFrame, t, &msg)
            .unwrap();
        t += 1_000_000;
    }
    writer.stop_measurement(t).unwrap();
    writer.finalize_measurement().unwrap();
}

#[test]
fn can_mlsd_capture_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("can_mlsd.mf4");
    let options = BusLogOptions {
        storage: StorageType::Mlsd,
        max_length: 8,
        bus_name: "CAN11".into(),
        ..Default::default()
    };
    write_can_capture(&path, &options, 10);

    let mdf = MDF::from_file(&path).unwrap();
    assert_eq!(mdf.start_time_ns(), T0);
    let groups = mdf.channel_groups();
    assert_eq!(groups.len(), 4);

    let names: Vec<_> = groups
        .iter()
        .map(|g| g.name().unwrap().unwrap_or_default())
        .collect();
    assert_eq!(
        names,
        vec![
            "CAN_DataFrame",
            "CAN_RemoteFrame",
            "CAN_ErrorFrame",
            "CAN_OverloadFrame"
        ]
    );
    for group in &groups {
        assert_eq!(group.sample_count(), 10);
    }

    let data_frame = &groups[0];
    let source = data_frame.source().unwrap().expect("bus source");
    assert_eq!(source.name.as_deref(), Some("CAN11"));
    assert_eq!(source.bus_type, mdfkit::blocks::BusType::Can);

    // Sample 5 carries six 6s; MLSD reserves the full 8 bytes.
    let data_bytes = data_frame
        .channel("CAN_DataFrame.DataBytes")
        .expect("DataBytes composition");
    let values = data_bytes.values().unwrap();
    assert_eq!(values.len(), 10);
    let Some(DecodedValue::ByteArray(payload)) = &values[5] else {
        panic!("expected byte array, got {:?}", values[5]);
    };
    assert_eq!(&payload[..6], &[6u8; 6]);

    // The DataLength channel maps the DLC code through the CAN-FD table.
    let dlc = data_frame
        .channel("CAN_DataFrame.DataLength")
        .expect("DataLength composition");
    assert_eq!(dlc.values().unwrap()[5], Some(DecodedValue::Float(6.0)));

    // The 29-bit id keeps its raw value; bit 31 (extended) is outside it.
    let id = data_frame.channel("CAN_DataFrame.ID").expect("ID");
    assert_eq!(
        id.values().unwrap()[5],
        Some(DecodedValue::UnsignedInteger(123))
    );

    // Direction decodes through the Rx/Tx text table.
    let dir = data_frame.channel("CAN_DataFrame.Dir").expect("Dir");
    assert_eq!(dir.values().unwrap()[0], Some(DecodedValue::String("Rx".into())));
}

#[test]
fn can_vlsd_capture_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("can_vlsd.mf4");
    let options = BusLogOptions {
        storage: StorageType::Vlsd,
        max_length: 20,
        bus_name: "CAN".into(),
        ..Default::default()
    };
    write_can_capture(&path, &options, 1000);

    let mdf = MDF::from_file(&path).unwrap();
    let groups = mdf.channel_groups();
    // Four primaries plus the VLSD siblings of the data and error frames
    assert_eq!(groups.len(), 6);
    assert_eq!(groups.iter().filter(|g| g.is_vlsd()).count(), 2);
    for group in groups.iter().filter(|g| !g.is_vlsd()) {
        assert_eq!(group.sample_count(), 1000);
    }

    let data_frame = groups
        .iter()
        .find(|g| g.name().unwrap().as_deref() == Some("CAN_DataFrame"))
        .unwrap();
    let data_bytes = data_frame.channel("CAN_DataFrame.DataBytes").unwrap();
    let values = data_bytes.values().unwrap();
    assert_eq!(values.len(), 1000);
    // Sample 4 carried five 5s as its variable payload
    assert_eq!(values[4], Some(DecodedValue::ByteArray(vec![5u8; 5])));
    // Payloads longer than 8 never occur on classic CAN frames here
    assert_eq!(values[999], Some(DecodedValue::ByteArray(vec![232u8; 8])));
}

#[test]
fn can_vlsd_observer_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("can_observer.mf4");
    let options = BusLogOptions {
        storage: StorageType::Vlsd,
        bus_name: "CAN".into(),
        ..Default::default()
    };
    write_can_capture(&path, &options, 50);

    let mut reader = MdfReader::open(&path).unwrap();
    reader.read_everything_but_data().unwrap();

    let (mut data_obs, mut time_obs) = {
        let dg = &reader.data_groups()[0];
        let cg = dg
            .channel_groups
            .iter()
            .find(|cg| !cg.is_vlsd() && cg.find_channel("CAN_DataFrame").is_some())
            .unwrap();
        let data_ch = cg.find_channel("CAN_DataFrame.DataBytes").unwrap();
        let time_ch = cg.find_channel("t").unwrap();
        (
            ChannelObserver::new(reader.file_data(), dg, cg, data_ch),
            ChannelObserver::new(reader.file_data(), dg, cg, time_ch),
        )
    };

    reader
        .read_data(0, &mut [&mut data_obs, &mut time_obs])
        .unwrap();

    assert_eq!(data_obs.sample_count(), 50);
    assert!(data_obs.is_valid(4));
    let (payload, valid) = data_obs.value(4).unwrap();
    assert!(valid);
    assert_eq!(payload, &DecodedValue::ByteArray(vec![5u8; 5]));

    // The master time channel is relative seconds from the start trigger.
    let t0: f64 = time_obs.engineering_value_as(0).unwrap();
    let t9: f64 = time_obs.engineering_value_as(9).unwrap();
    assert!((t0 - 0.0).abs() < 1e-9);
    assert!((t9 - 0.009).abs() < 1e-9);
}

#[test]
fn ethernet_mandatory_vlsd_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eth.mf4");
    let options = BusLogOptions {
        storage: StorageType::Vlsd,
        mandatory_members_only: true,
        bus_name: "ETH".into(),
        ..Default::default()
    };

    let mut writer = StreamingWriter::new(&path).unwrap();
    let eth = configure_ethernet(writer.writer_mut().unwrap(), &options).unwrap();

    writer.init_measurement().unwrap();
    writer.start_measurement(T0).unwrap();

    let mut t = T0;
    for i in 0..500u64 {
        let mut msg = EthMessage::new();
        msg.set_source([1, 2, 3, 4, 5, 6]);
        msg.set_destination([2, 3, 4, 5, 6, 7]);
        msg.set_bus_channel(1);
        let len = (i % 8 + 1) as usize;
        msg.set_data_bytes(&vec![(i & 0xFF) as u8; len]);
        writer
            .save_eth_message(&eth, EthFrameKind::Frame, t, &msg)
            .unwrap();
        t += 1_000_000;
    }
    writer.stop_measurement(t).unwrap();
    writer.finalize_measurement().unwrap();

    let mdf = MDF::from_file(&path).unwrap();
    let groups = mdf.channel_groups();
    // Four primaries, each with a VLSD sibling
    assert_eq!(groups.len(), 8);

    let frame = groups
        .iter()
        .find(|g| g.name().unwrap().as_deref() == Some("ETH_Frame"))
        .unwrap();
    assert_eq!(frame.sample_count(), 500);

    // Mandatory-only layout omits the CRC and padding members.
    assert!(frame.channel("ETH_Frame.CRC").is_none());
    assert!(frame.channel("ETH_Frame.PadByteCount").is_none());

    let dest = frame.channel("ETH_Frame.Destination").unwrap();
    let dest_values = dest.values().unwrap();
    assert_eq!(dest_values.len(), 500);
    assert!(dest_values.iter().all(|v| v.is_some()));
    assert_eq!(
        dest_values[17],
        Some(DecodedValue::ByteArray(vec![2, 3, 4, 5, 6, 7]))
    );

    let payload = frame.channel("ETH_Frame.DataBytes").unwrap();
    let payload_values = payload.values().unwrap();
    assert_eq!(payload_values[9], Some(DecodedValue::ByteArray(vec![9u8; 2])));
}

#[test]
fn lin_frames_are_inline_max_length() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lin.mf4");
    let options = BusLogOptions {
        bus_name: "LIN".into(),
        ..Default::default()
    };

    let mut writer = StreamingWriter::new(&path).unwrap();
    let lin = configure_lin(writer.writer_mut().unwrap(), &options).unwrap();

    writer.init_measurement().unwrap();
    writer.start_measurement(T0).unwrap();

    let mut t = T0;
    for i in 0..20u8 {
        let mut msg = LinMessage::new(0x2A);
        msg.set_bus_channel(1);
        msg.set_dir(i % 2 == 1);
        msg.set_data_bytes(&[1, 2, 3]);
        writer
            .save_lin_message(&lin, LinFrameKind::Frame, t, &msg)
            .unwrap();
        t += 1_000_000;
    }
    // One wake-up event in the same capture
    let wake = LinMessage::default();
    writer
        .save_lin_message(&lin, LinFrameKind::WakeUp, t, &wake)
        .unwrap();
    writer.stop_measurement(t + 1).unwrap();
    writer.finalize_measurement().unwrap();

    let mdf = MDF::from_file(&path).unwrap();
    let groups = mdf.channel_groups();
    assert_eq!(groups.len(), 8);

    let frame = groups
        .iter()
        .find(|g| g.name().unwrap().as_deref() == Some("LIN_Frame"))
        .unwrap();
    assert_eq!(frame.sample_count(), 20);

    let wake_group = groups
        .iter()
        .find(|g| g.name().unwrap().as_deref() == Some("LIN_WakeUp"))
        .unwrap();
    assert_eq!(wake_group.sample_count(), 1);

    // LIN payloads live inline, 0xFF padded to the fixed 8 bytes.
    let payload = frame.channel("LIN_Frame.DataBytes").unwrap();
    assert_eq!(
        payload.values().unwrap()[0],
        Some(DecodedValue::ByteArray(vec![
            1, 2, 3, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF
        ]))
    );

    let id = frame.channel("LIN_Frame.ID").unwrap();
    assert_eq!(
        id.values().unwrap()[3],
        Some(DecodedValue::UnsignedInteger(42))
    );

    let dir_ch = frame.channel("LIN_Frame.Dir").unwrap();
    let dirs = dir_ch.values().unwrap();
    assert_eq!(dirs[0], Some(DecodedValue::String("Rx".into())));
    assert_eq!(dirs[1], Some(DecodedValue::String("Tx".into())));
}
