//! End-to-end writer/reader tests over the public object model.

use mdfkit::blocks::{BlockParse, ConversionBlock, DataType, cn_flags};
use mdfkit::writer::{MdfWriter, VecWriter};
use mdfkit::{DecodedValue, MDF, MdfReader, is_mdf_file};

fn build_simple_file() -> Vec<u8> {
    let mut writer = MdfWriter::from_writer(VecWriter::new());
    writer.init_mdf_file().unwrap();

    let cg = writer.add_channel_group(None, |_| {}).unwrap();
    writer.set_channel_group_name(&cg, "Engine").unwrap();
    writer.set_channel_group_comment(&cg, "bench run").unwrap();

    let time_ch = writer
        .add_channel(&cg, None, |ch| {
            ch.name = Some("Time".into());
            ch.data_type = DataType::FloatLE;
            ch.bit_count = 64;
        })
        .unwrap();
    writer.set_time_channel(&time_ch).unwrap();
    writer.set_channel_unit(&time_ch, "s").unwrap();

    let temp_ch = writer
        .add_channel(&cg, Some(&time_ch), |ch| {
            ch.name = Some("Temperature".into());
            ch.data_type = DataType::UnsignedIntegerLE;
            ch.bit_count = 16;
        })
        .unwrap();
    writer.set_channel_unit(&temp_ch, "°C").unwrap();
    // Raw counts to Celsius: physical = -40 + 0.1 * raw
    writer.add_linear_conversion(&temp_ch, -40.0, 0.1).unwrap();

    writer
        .add_channel(&cg, Some(&temp_ch), |ch| {
            ch.name = Some("Label".into());
            ch.data_type = DataType::StringUtf8;
            ch.bit_count = 8 * 8;
        })
        .unwrap();

    writer.start_data_block_for_cg(&cg, 0).unwrap();
    for i in 0..4u64 {
        writer
            .write_record(
                &cg,
                &[
                    DecodedValue::Float(i as f64 * 0.01),
                    DecodedValue::UnsignedInteger(400 + i * 10),
                    DecodedValue::ByteArray(b"run\0\0\0\0\0".to_vec()),
                ],
            )
            .unwrap();
    }
    writer.finish_data_block(&cg).unwrap();
    writer.finalize().unwrap();
    writer.into_inner().into_inner()
}

#[test]
fn write_then_read_values_and_metadata() {
    let bytes = build_simple_file();
    let mdf = MDF::from_bytes(bytes).unwrap();

    let groups = mdf.channel_groups();
    assert_eq!(groups.len(), 1);
    let group = &groups[0];
    assert_eq!(group.name().unwrap().as_deref(), Some("Engine"));
    assert_eq!(group.comment().unwrap().as_deref(), Some("bench run"));
    assert_eq!(group.sample_count(), 4);

    let time = group.channel("Time").expect("time channel");
    assert!(time.is_master());
    assert_eq!(time.unit().unwrap().as_deref(), Some("s"));
    let times = time.values().unwrap();
    assert_eq!(times.len(), 4);
    assert_eq!(times[2], Some(DecodedValue::Float(0.02)));

    // The conversion turns raw 420 into -40 + 0.1*420 = 2.0
    let temp = group.channel("Temperature").expect("temperature channel");
    let temps = temp.values().unwrap();
    assert_eq!(temps[2], Some(DecodedValue::Float(2.0)));

    // Raw values bypass the conversion
    let raw = temp.raw_values().unwrap();
    assert_eq!(raw[2].0, DecodedValue::UnsignedInteger(420));
    assert!(raw[2].1);

    let label = group.channel("Label").expect("label channel");
    let labels = label.values().unwrap();
    assert_eq!(labels[0], Some(DecodedValue::String("run".into())));
}

#[test]
fn all_invalid_flag_suppresses_values() {
    let mut writer = MdfWriter::from_writer(VecWriter::new());
    writer.init_mdf_file().unwrap();
    let cg = writer.add_channel_group(None, |_| {}).unwrap();
    writer
        .add_channel(&cg, None, |ch| {
            ch.name = Some("Broken".into());
            ch.data_type = DataType::UnsignedIntegerLE;
            ch.bit_count = 8;
            ch.flags = cn_flags::ALL_VALUES_INVALID;
        })
        .unwrap();

    writer.start_data_block_for_cg(&cg, 0).unwrap();
    writer
        .write_record(&cg, &[DecodedValue::UnsignedInteger(42)])
        .unwrap();
    writer.finish_data_block(&cg).unwrap();
    writer.finalize().unwrap();

    let mdf = MDF::from_bytes(writer.into_inner().into_inner()).unwrap();
    let groups = mdf.channel_groups();
    let values = groups[0].channels()[0].values().unwrap();
    assert_eq!(values, vec![None]);
}

#[test]
fn failed_conversion_yields_invalid_sample() {
    let mut writer = MdfWriter::from_writer(VecWriter::new());
    writer.init_mdf_file().unwrap();
    let cg = writer.add_channel_group(None, |_| {}).unwrap();
    let cn = writer
        .add_channel(&cg, None, |ch| {
            ch.name = Some("Ratio".into());
            ch.data_type = DataType::UnsignedIntegerLE;
            ch.bit_count = 8;
        })
        .unwrap();
    // eng = x / (x - 1): divisor vanishes at raw == 1
    let conv = ConversionBlock::rational(0.0, 1.0, 0.0, 0.0, 1.0, -1.0);
    writer.set_channel_conversion(&cn, &conv).unwrap();

    writer.start_data_block_for_cg(&cg, 0).unwrap();
    for raw in [3u64, 1, 2] {
        writer
            .write_record(&cg, &[DecodedValue::UnsignedInteger(raw)])
            .unwrap();
    }
    writer.finish_data_block(&cg).unwrap();
    writer.finalize().unwrap();

    let mdf = MDF::from_bytes(writer.into_inner().into_inner()).unwrap();
    let groups = mdf.channel_groups();
    let values = groups[0].channels()[0].values().unwrap();
    assert_eq!(values[0], Some(DecodedValue::Float(1.5)));
    assert_eq!(values[1], None); // divisor vanished
    assert_eq!(values[2], Some(DecodedValue::Float(2.0)));
}

#[test]
fn reader_stages_and_file_history() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("staged.mf4");

    let mut writer = MdfWriter::new(path.to_str().unwrap()).unwrap();
    writer.init_mdf_file().unwrap();
    writer
        .add_file_history(1_700_000_000_000_000_000, "unit-test", "mdfkit", "0.2", "ci")
        .unwrap();
    writer
        .set_header_metadata("bench capture", "jane", "gearbox", "rig 4")
        .unwrap();
    writer
        .add_attachment("notes.txt", "text/plain", b"calibration notes")
        .unwrap();
    let cg = writer.add_channel_group(None, |_| {}).unwrap();
    writer
        .add_channel(&cg, None, |ch| {
            ch.name = Some("Counter".into());
            ch.data_type = DataType::UnsignedIntegerLE;
            ch.bit_count = 32;
        })
        .unwrap();
    writer.start_data_block_for_cg(&cg, 0).unwrap();
    writer
        .write_record(&cg, &[DecodedValue::UnsignedInteger(1)])
        .unwrap();
    writer.finish_data_block(&cg).unwrap();
    writer.finalize().unwrap();
    drop(writer);

    assert!(is_mdf_file(&path));

    let mut reader = MdfReader::open(&path).unwrap();
    assert!(!reader.is_unfinalized());

    let header = reader.read_header().unwrap();
    assert_ne!(header.file_history_addr, 0);
    assert_ne!(header.first_attachment_addr, 0);

    let info = reader.read_measurement_info().unwrap();
    assert_eq!(info.file_histories.len(), 1);
    assert_eq!(info.data_groups.len(), 1);
    assert_eq!(info.attachment_addrs.len(), 1);

    let graph = reader.read_everything_but_data().unwrap();
    assert_eq!(graph.data_groups.len(), 1);
    assert_eq!(graph.data_groups[0].channel_groups.len(), 1);

    // Header metadata reads back as a flat property dictionary.
    let comment_addr = graph.header.comment_addr;
    assert_ne!(comment_addr, 0);
    let md = mdfkit::blocks::MetadataBlock::from_bytes(
        &reader.file_data()[comment_addr as usize..],
    )
    .unwrap();
    assert_eq!(md.comment_text(), "bench capture");
    let props = md.properties();
    assert_eq!(props[0].0, "author");
    assert_eq!(
        props[0].1,
        mdfkit::blocks::MetadataValue::Text("jane".into())
    );

    // Export the embedded attachment and compare the payload.
    let at_addr = info.attachment_addrs[0];
    let out_path = dir.path().join("exported.txt");
    reader.export_attachment(at_addr, &out_path).unwrap();
    assert_eq!(std::fs::read(&out_path).unwrap(), b"calibration notes");
}

#[test]
fn rejects_non_mdf_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not_mdf.bin");
    std::fs::write(&path, b"definitely not a measurement").unwrap();

    assert!(!is_mdf_file(&path));
    assert!(MdfReader::open(&path).is_err());
}
