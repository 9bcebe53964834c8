//! Streaming writer state machine, pre-trigger trimming, and observer
//! early stop.

use mdfkit::blocks::DataType;
use mdfkit::observer::{ChannelObserver, ObserverStatus, SampleObserver, StopAfter};
use mdfkit::parsing::VlsdStore;
use mdfkit::writer::{StreamingWriter, StreamingWriterConfig};
use mdfkit::{DecodedValue, Error, MDF, MdfReader, WriteState};

const T0: u64 = 1_700_000_000_000_000_000;

/// Lay out one measurement group: `t` master plus a 32-bit counter.
fn configure_counter_group(writer: &mut StreamingWriter) -> String {
    let w = writer.writer_mut().unwrap();
    let dg = w.add_data_group(1).unwrap();
    let cg = w
        .add_channel_group_with_dg(&dg, None, |cg| {
            cg.record_id = 1;
        })
        .unwrap();
    let time_ch = w
        .add_channel(&cg, None, |ch| {
            ch.name = Some("t".into());
            ch.data_type = DataType::FloatLE;
            ch.bit_count = 64;
        })
        .unwrap();
    w.set_time_channel(&time_ch).unwrap();
    w.set_channel_unit(&time_ch, "s").unwrap();
    w.add_channel(&cg, Some(&time_ch), |ch| {
        ch.name = Some("Counter".into());
        ch.data_type = DataType::UnsignedIntegerLE;
        ch.bit_count = 32;
    })
    .unwrap();
    cg
}

#[test]
fn state_machine_rejects_out_of_order_calls() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("states.mf4");

    let mut writer = StreamingWriter::new(&path).unwrap();
    let cg = configure_counter_group(&mut writer);
    assert_eq!(writer.state(), WriteState::Create);

    // Samples before init_measurement are refused.
    let err = writer
        .save_sample(&cg, T0, &[DecodedValue::Float(0.0), DecodedValue::UnsignedInteger(0)])
        .unwrap_err();
    assert!(matches!(err, Error::WriterStateError { .. }));

    // start before init is refused too.
    assert!(matches!(
        writer.start_measurement(T0),
        Err(Error::WriterStateError { .. })
    ));

    writer.init_measurement().unwrap();
    assert_eq!(writer.state(), WriteState::Init);

    // stop before start is refused.
    assert!(matches!(
        writer.stop_measurement(T0),
        Err(Error::WriterStateError { .. })
    ));

    writer.start_measurement(T0).unwrap();
    assert_eq!(writer.state(), WriteState::StartMeas);

    // The block graph is locked while the measurement runs.
    assert!(matches!(
        writer.writer_mut(),
        Err(Error::WriterStateError { .. })
    ));

    writer.stop_measurement(T0 + 1_000_000).unwrap();
    writer.finalize_measurement().unwrap();
    assert_eq!(writer.state(), WriteState::Finalize);
}

#[test]
fn pre_trigger_trim_keeps_the_trailing_window() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pretrigger.mf4");

    let config = StreamingWriterConfig {
        pre_trigger_ns: 100_000_000, // 0.1 s
        ..Default::default()
    };
    let mut writer = StreamingWriter::with_config(&path, config).unwrap();
    let cg = configure_counter_group(&mut writer);

    writer.init_measurement().unwrap();

    // 1000 samples at 1 ms intervals, the last one exactly at the start
    // trigger.
    for i in 0..1000u64 {
        let ts = T0 - (999 - i) * 1_000_000;
        writer
            .save_sample(
                &cg,
                ts,
                &[DecodedValue::Float(0.0), DecodedValue::UnsignedInteger(i)],
            )
            .unwrap();
    }

    writer.start_measurement(T0).unwrap();
    writer.stop_measurement(T0 + 1).unwrap();
    writer.finalize_measurement().unwrap();

    let mdf = MDF::from_file(&path).unwrap();
    let groups = mdf.channel_groups();
    assert_eq!(groups.len(), 1);
    // Exactly the 100 ms preceding the trigger survives.
    assert_eq!(groups[0].sample_count(), 100);

    let time = groups[0].channel("t").unwrap();
    let times = time.values().unwrap();
    assert_eq!(times.len(), 100);
    let first = times[0].as_ref().unwrap().as_f64().unwrap();
    let last = times[99].as_ref().unwrap().as_f64().unwrap();
    assert!((first + 0.099).abs() < 1e-9, "first = {first}");
    assert!(last.abs() < 1e-12, "last = {last}");

    // The counters are the last 100 enqueued, in order.
    let counter = groups[0].channel("Counter").unwrap();
    let counters = counter.values().unwrap();
    assert_eq!(counters[0], Some(DecodedValue::UnsignedInteger(900)));
    assert_eq!(counters[99], Some(DecodedValue::UnsignedInteger(999)));
}

#[test]
fn stop_time_discards_newer_samples() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stop.mf4");

    let mut writer = StreamingWriter::new(&path).unwrap();
    let cg = configure_counter_group(&mut writer);
    writer.init_measurement().unwrap();
    writer.start_measurement(T0).unwrap();

    for i in 0..6u64 {
        writer
            .save_sample(
                &cg,
                T0 + i * 1_000_000,
                &[DecodedValue::Float(0.0), DecodedValue::UnsignedInteger(i)],
            )
            .unwrap();
    }
    writer.stop_measurement(T0 + 5_000_000).unwrap();

    // Late arrivals are still accepted into the queue, but their
    // timestamps lie beyond the stop time and the flush thread discards
    // them.
    for i in 6..15u64 {
        writer
            .save_sample(
                &cg,
                T0 + i * 1_000_000,
                &[DecodedValue::Float(0.0), DecodedValue::UnsignedInteger(i)],
            )
            .unwrap();
    }
    writer.finalize_measurement().unwrap();

    let mdf = MDF::from_file(&path).unwrap();
    let groups = mdf.channel_groups();
    assert_eq!(groups[0].sample_count(), 6); // samples 0..=5
    let counter = groups[0].channel("Counter").unwrap();
    let counters = counter.values().unwrap();
    assert_eq!(counters.last().unwrap(), &Some(DecodedValue::UnsignedInteger(5)));
}

#[test]
fn observer_early_stop_aborts_the_pass() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("earlystop.mf4");

    let mut writer = StreamingWriter::new(&path).unwrap();
    let cg = configure_counter_group(&mut writer);
    writer.init_measurement().unwrap();
    writer.start_measurement(T0).unwrap();
    for i in 0..1000u64 {
        writer
            .save_sample(
                &cg,
                T0 + i * 1_000_000,
                &[DecodedValue::Float(0.0), DecodedValue::UnsignedInteger(i)],
            )
            .unwrap();
    }
    writer.stop_measurement(T0 + 1_000_000_000).unwrap();
    writer.finalize_measurement().unwrap();

    let mut reader = MdfReader::open(&path).unwrap();
    reader.read_everything_but_data().unwrap();

    let mut observer = {
        let dg = &reader.data_groups()[0];
        let cg = &dg.channel_groups[0];
        let ch = cg.find_channel("Counter").unwrap();
        StopAfter::new(ChannelObserver::new(reader.file_data(), dg, cg, ch), 10)
    };

    let dispatched = reader.read_data(0, &mut [&mut observer]).unwrap();
    assert_eq!(dispatched, 10);
    assert_eq!(observer.inner().sample_count(), 10);
    let (value, valid) = observer.inner().value(9).unwrap();
    assert!(valid);
    assert_eq!(value, &DecodedValue::UnsignedInteger(9));
}

/// A custom observer counting records of every group it accepts.
struct CountingObserver {
    record_id: u64,
    seen: u64,
}

impl SampleObserver for CountingObserver {
    fn accepts(&self, record_id: u64) -> bool {
        record_id == self.record_id
    }

    fn on_record(
        &mut self,
        _sample_index: u64,
        _record_id: u64,
        _record: &[u8],
        _store: &VlsdStore,
    ) -> ObserverStatus {
        self.seen += 1;
        ObserverStatus::Continue
    }
}

#[test]
fn custom_observers_receive_every_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counting.mf4");

    let mut writer = StreamingWriter::new(&path).unwrap();
    let cg = configure_counter_group(&mut writer);
    writer.init_measurement().unwrap();
    writer.start_measurement(T0).unwrap();
    for i in 0..25u64 {
        writer
            .save_sample(
                &cg,
                T0 + i * 1_000_000,
                &[DecodedValue::Float(0.0), DecodedValue::UnsignedInteger(i)],
            )
            .unwrap();
    }
    writer.stop_measurement(T0 + 1_000_000_000).unwrap();
    writer.finalize_measurement().unwrap();

    let mut reader = MdfReader::open(&path).unwrap();
    let mut observer = CountingObserver {
        record_id: 1,
        seen: 0,
    };
    reader.read_data(0, &mut [&mut observer]).unwrap();
    assert_eq!(observer.seen, 25);
}

#[test]
fn finalized_files_lose_the_unfinalized_marker() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("finalized.mf4");

    let mut writer = StreamingWriter::new(&path).unwrap();
    let cg = configure_counter_group(&mut writer);
    writer.init_measurement().unwrap();

    // While measuring, the on-disk magic marks the file unfinalized.
    let reader = MdfReader::open(&path).unwrap();
    assert!(reader.is_unfinalized());
    drop(reader);

    writer.start_measurement(T0).unwrap();
    writer
        .save_sample(
            &cg,
            T0,
            &[DecodedValue::Float(0.0), DecodedValue::UnsignedInteger(7)],
        )
        .unwrap();
    writer.stop_measurement(T0 + 1).unwrap();
    writer.finalize_measurement().unwrap();

    let reader = MdfReader::open(&path).unwrap();
    assert!(!reader.is_unfinalized());
}
