//! Compressed streaming: DEFLATE-framed DZ chunks behind an HL/DL spine.
#![cfg(feature = "compression")]

use mdfkit::blocks::{BlockHeader, DataListBlock, BlockParse, HeaderListBlock};
use mdfkit::buslog::{BusLogOptions, CanFrameKind, CanMessage, configure_can};
use mdfkit::writer::{StreamingWriter, StreamingWriterConfig};
use mdfkit::{DecodedValue, MDF, StorageType};

const T0: u64 = 1_700_000_000_000_000_000;

#[test]
fn compressed_can_capture_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("compressed.mf4");

    // A small chunk size exercises the multi-chunk path without writing
    // megabytes; production uses the 4 MB default.
    let config = StreamingWriterConfig {
        compress: true,
        chunk_bytes: 16 * 1024,
        ..Default::default()
    };
    let mut writer = StreamingWriter::with_config(&path, config).unwrap();
    let options = BusLogOptions {
        storage: StorageType::Vlsd,
        bus_name: "CAN".into(),
        ..Default::default()
    };
    let can = configure_can(writer.writer_mut().unwrap(), &options).unwrap();

    writer.init_measurement().unwrap();
    writer.start_measurement(T0).unwrap();

    let samples = 5000u64;
    for i in 0..samples {
        let mut msg = CanMessage::new(123);
        msg.set_bus_channel(2);
        let len = (i % 8 + 1) as usize;
        msg.set_data_bytes(&vec![(i & 0x7F) as u8; len]);
        writer
            .save_can_message(&can, CanFrameKind::DataFrame, T0 + i * 100_000, &msg)
            .unwrap();
    }
    writer.stop_measurement(T0 + samples * 100_000).unwrap();
    writer.finalize_measurement().unwrap();

    // The data group's payload link must resolve to an HL spine over a DL
    // of DZ fragments.
    let bytes = std::fs::read(&path).unwrap();
    let mdf = MDF::from_bytes(bytes.clone()).unwrap();
    let dg = &mdf.raw().data_groups[0];
    let hl_addr = dg.block.data_block_addr as usize;
    assert_eq!(&bytes[hl_addr..hl_addr + 4], b"##HL");

    let hl = HeaderListBlock::from_bytes(&bytes[hl_addr..]).unwrap();
    assert_eq!(hl.zip_type, 0); // DEFLATE
    let dl = DataListBlock::from_bytes(&bytes[hl.first_dl_addr as usize..]).unwrap();
    assert!(
        dl.data_block_addrs.len() > 1,
        "expected several fragments, got {}",
        dl.data_block_addrs.len()
    );
    let mut dz_count = 0;
    for &addr in &dl.data_block_addrs {
        let header = BlockHeader::from_bytes(&bytes[addr as usize..]).unwrap();
        assert!(header.id == "##DZ" || header.id == "##DT");
        if header.id == "##DZ" {
            dz_count += 1;
        }
    }
    assert!(dz_count >= 1);
    // The offset table grows monotonically.
    let offsets = dl.block_offsets.as_ref().unwrap();
    assert!(offsets.windows(2).all(|w| w[0] < w[1]));

    // Round trip: every payload comes back byte-equal.
    let groups = mdf.channel_groups();
    let data_frame = groups
        .iter()
        .find(|g| g.name().unwrap().as_deref() == Some("CAN_DataFrame"))
        .unwrap();
    assert_eq!(data_frame.sample_count(), samples);

    let payloads = data_frame
        .channel("CAN_DataFrame.DataBytes")
        .unwrap()
        .values()
        .unwrap();
    assert_eq!(payloads.len(), samples as usize);
    for i in [0u64, 1, 7, 100, 4321, samples - 1] {
        let len = (i % 8 + 1) as usize;
        let expected = vec![(i & 0x7F) as u8; len];
        assert_eq!(
            payloads[i as usize],
            Some(DecodedValue::ByteArray(expected)),
            "payload {i} mismatched"
        );
    }
}
