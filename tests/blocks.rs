//! Block-level round trips and structural invariants.

use mdfkit::blocks::{
    BlockHeader, BlockParse, ChannelBlock, ChannelGroupBlock, ChannelType, ConversionBlock,
    DataGroupBlock, DataListBlock, DataType, HeaderBlock, IdentificationBlock, SourceBlock,
    SyncType, TextBlock,
};
use mdfkit::writer::{MdfWriter, VecWriter};
use mdfkit::{DecodedValue, MDF};

#[test]
fn identification_roundtrip() {
    let id = IdentificationBlock::default();
    let bytes = id.to_bytes().unwrap();
    assert_eq!(bytes.len(), 64);
    assert_eq!(&bytes[0..8], b"MDF     ");

    let parsed = IdentificationBlock::from_bytes(&bytes).unwrap();
    assert_eq!(parsed.version_number, 410);
    assert!(!parsed.is_unfinalized());
}

#[test]
fn identification_unfinalized_flags() {
    let id = IdentificationBlock::unfinalized(0x25);
    let bytes = id.to_bytes().unwrap();
    assert_eq!(&bytes[0..8], b"UnFinMF ");

    let parsed = IdentificationBlock::from_bytes(&bytes).unwrap();
    assert!(parsed.is_unfinalized());
    assert_eq!(parsed.standard_unfinalized_flags, 0x25);
}

#[test]
fn identification_rejects_foreign_magic() {
    let mut bytes = IdentificationBlock::default().to_bytes().unwrap();
    bytes[0..8].copy_from_slice(b"RIFFdata");
    assert!(IdentificationBlock::from_bytes(&bytes).is_err());
}

#[test]
fn identification_rejects_old_versions() {
    let mut id = IdentificationBlock::default();
    id.version_identifier = "3.30    ".into();
    let bytes = id.to_bytes().unwrap();
    assert!(IdentificationBlock::from_bytes(&bytes).is_err());
}

#[test]
fn header_roundtrip() {
    let mut hd = HeaderBlock::default();
    hd.first_dg_addr = 0x1000;
    hd.start_time_ns = 1_700_000_000_000_000_000;
    hd.tz_offset_min = 60;

    let bytes = hd.to_bytes().unwrap();
    assert_eq!(bytes.len(), 104);

    let parsed = HeaderBlock::from_bytes(&bytes).unwrap();
    assert_eq!(parsed.first_dg_addr, 0x1000);
    assert_eq!(parsed.start_time_ns, 1_700_000_000_000_000_000);
    assert_eq!(parsed.tz_offset_min, 60);
}

#[test]
fn data_group_record_id_widths() {
    for width in [0u8, 1, 2, 4, 8] {
        let dg = DataGroupBlock::with_record_id_len(width).unwrap();
        let parsed = DataGroupBlock::from_bytes(&dg.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed.record_id_len, width);
    }
    assert!(DataGroupBlock::with_record_id_len(3).is_err());
}

#[test]
fn channel_group_roundtrip() {
    let mut cg = ChannelGroupBlock::default();
    cg.record_id = 7;
    cg.cycle_count = 1234;
    cg.flags = mdfkit::blocks::cg_flags::BUS_EVENT;
    cg.path_separator = u16::from(b'.');
    cg.data_bytes = 22;
    cg.invalidation_bytes = 1;

    let parsed = ChannelGroupBlock::from_bytes(&cg.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed.record_id, 7);
    assert_eq!(parsed.cycle_count, 1234);
    assert_eq!(parsed.record_size(), 23);
    assert!(!parsed.is_vlsd());
}

#[test]
fn channel_roundtrip_preserves_bit_layout() {
    let mut cn = ChannelBlock::default();
    cn.channel_type = ChannelType::Master;
    cn.sync_type = SyncType::Time;
    cn.data_type = DataType::FloatLE;
    cn.byte_offset = 8;
    cn.bit_offset = 3;
    cn.bit_count = 29;
    cn.flags = mdfkit::blocks::cn_flags::BUS_EVENT;
    cn.pos_invalidation_bit = 5;

    let parsed = ChannelBlock::from_bytes(&cn.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed.channel_type, ChannelType::Master);
    assert_eq!(parsed.sync_type, SyncType::Time);
    assert_eq!(parsed.byte_offset, 8);
    assert_eq!(parsed.bit_offset, 3);
    assert_eq!(parsed.bit_count, 29);
    assert_eq!(parsed.pos_invalidation_bit, 5);
}

#[test]
fn conversion_roundtrip() {
    let conv = ConversionBlock::linear(-40.0, 0.1).with_physical_range(-40.0, 215.0);
    let parsed = ConversionBlock::from_bytes(&conv.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed.values, vec![-40.0, 0.1]);
    assert_eq!(parsed.phys_range_min, Some(-40.0));
    assert_eq!(parsed.phys_range_max, Some(215.0));

    let dlc = ConversionBlock::value_to_value(&[(0.0, 0.0), (9.0, 12.0), (15.0, 64.0)]);
    let parsed = ConversionBlock::from_bytes(&dlc.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed.values.len(), 6);
    let out = parsed
        .apply_decoded(DecodedValue::UnsignedInteger(15), &[])
        .unwrap();
    assert_eq!(out, DecodedValue::Float(64.0));
}

#[test]
fn text_block_alignment() {
    for text in ["", "x", "exactly", "a much longer text block content"] {
        let tx = TextBlock::new(text);
        let bytes = tx.to_bytes().unwrap();
        assert_eq!(bytes.len() % 8, 0);
        let parsed = TextBlock::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.text, text);
    }
}

#[test]
fn source_block_roundtrip() {
    let source = SourceBlock::can_bus();
    let parsed = SourceBlock::from_bytes(&source.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed.source_type, mdfkit::blocks::SourceType::Bus);
    assert_eq!(parsed.bus_type, mdfkit::blocks::BusType::Can);
}

#[test]
fn data_list_offsets_roundtrip() {
    let dl = DataListBlock::new_with_offsets(vec![0x100, 0x200, 0x300], vec![0, 4096, 9000])
        .unwrap();
    let bytes = dl.to_bytes().unwrap();
    let parsed = DataListBlock::from_bytes(&bytes).unwrap();
    assert_eq!(parsed.data_block_addrs, vec![0x100, 0x200, 0x300]);
    assert_eq!(parsed.block_offsets, Some(vec![0, 4096, 9000]));
    assert_eq!(parsed.equal_length, None);

    let dl = DataListBlock::new_equal_length(vec![0x100, 0x200], 4096);
    let parsed = DataListBlock::from_bytes(&dl.to_bytes().unwrap()).unwrap();
    assert_eq!(parsed.equal_length, Some(4096));
}

/// Walk every block of an in-memory file and check the layout invariants:
/// blocks are 8-byte aligned, carry a known tag, and never overlap.
#[test]
fn written_blocks_are_aligned_and_disjoint() {
    let mut writer = MdfWriter::from_writer(VecWriter::new());
    writer.init_mdf_file().unwrap();

    let cg = writer.add_channel_group(None, |_| {}).unwrap();
    let time_ch = writer
        .add_channel(&cg, None, |ch| {
            ch.name = Some("Time".into());
            ch.data_type = DataType::FloatLE;
            ch.bit_count = 64;
        })
        .unwrap();
    writer.set_time_channel(&time_ch).unwrap();
    writer
        .add_channel(&cg, Some(&time_ch), |ch| {
            ch.name = Some("Speed".into());
            ch.data_type = DataType::UnsignedIntegerLE;
            ch.bit_count = 16;
        })
        .unwrap();

    writer.start_data_block_for_cg(&cg, 0).unwrap();
    for i in 0..5u64 {
        writer
            .write_record(
                &cg,
                &[
                    DecodedValue::Float(i as f64 * 0.1),
                    DecodedValue::UnsignedInteger(i * 100),
                ],
            )
            .unwrap();
    }
    writer.finish_data_block(&cg).unwrap();
    writer.finalize().unwrap();

    let bytes = writer.into_inner().into_inner();

    // Identification is at 0, the header at 64; every block after that
    // declares its span and they must tile without overlap.
    let mut covered = vec![false; bytes.len()];
    covered[0..64].iter_mut().for_each(|b| *b = true);

    let mut pos = 64usize;
    while pos + 24 <= bytes.len() {
        let header = BlockHeader::from_bytes(&bytes[pos..]).unwrap();
        assert!(header.id.starts_with("##"), "bad tag at {pos}: {}", header.id);
        assert_eq!(pos % 8, 0, "block at {pos} is not aligned");
        let len = header.length as usize;
        assert!(len >= 24, "block at {pos} shorter than its header");
        assert!(pos + len <= bytes.len(), "block at {pos} overruns the file");
        for flag in &mut covered[pos..pos + len] {
            assert!(!*flag, "blocks overlap at {pos}");
            *flag = true;
        }
        // Next block starts at the aligned end of this one
        pos += len;
        pos += (8 - (pos % 8)) % 8;
    }

    // And the file still reads back as a coherent measurement.
    let mdf = MDF::from_bytes(bytes).unwrap();
    let groups = mdf.channel_groups();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].sample_count(), 5);
}
