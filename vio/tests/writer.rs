mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{ScriptedEngine, descriptor, frame};
use vio::{
    CodecId, ContainerFormat, Error, Frame, PixelFormat, Pts, Rational, StreamDescriptor,
    StreamOptions, StreamWriter, WriterOptions,
};

#[test]
fn writes_frames_in_order_and_finishes() {
    let engine = ScriptedEngine::output();
    let mut writer =
        StreamWriter::open_with(engine.clone(), "out.mkv", descriptor(), WriterOptions::default()).unwrap();
    assert!(writer.is_open());
    assert_eq!(writer.container(), ContainerFormat::Matroska);

    for i in 0..20 {
        writer.write_frame(frame(i)).unwrap();
    }
    writer.close().unwrap();

    assert_eq!(engine.written_pts(), (0..20).collect::<Vec<_>>());
    let log = engine.output.lock();
    assert!(log.finished);
    assert_eq!(
        log.frames.iter().map(|f| f.sequence).collect::<Vec<_>>(),
        (0..20).collect::<Vec<_>>()
    );
    assert_eq!(log.configs[0].gop, 12);
    assert_eq!(log.configs[0].descriptor.container, ContainerFormat::Matroska);
}

#[test]
fn unknown_extension_falls_back_to_mp4() {
    let engine = ScriptedEngine::output();
    let writer =
        StreamWriter::open_with(engine, "capture.bin", descriptor(), WriterOptions::default()).unwrap();
    assert_eq!(writer.container(), ContainerFormat::Mp4);
}

#[test]
fn close_without_frames_still_finishes() {
    let engine = ScriptedEngine::output();
    let mut writer =
        StreamWriter::open_with(engine.clone(), "out.mp4", descriptor(), WriterOptions::default()).unwrap();
    writer.close().unwrap();
    assert!(engine.output.lock().finished);
}

#[test]
fn timestamps_must_increase() {
    let engine = ScriptedEngine::output();
    let mut writer =
        StreamWriter::open_with(engine.clone(), "out.mp4", descriptor(), WriterOptions::default()).unwrap();

    writer.write_frame(frame(0)).unwrap();
    writer.write_frame(frame(1)).unwrap();
    assert!(matches!(writer.write_frame(frame(1)), Err(Error::Encode(_))));
    assert!(matches!(writer.write_frame(frame(0)), Err(Error::Encode(_))));

    // Rejections leave the writer usable
    assert!(writer.is_open());
    writer.write_frame(frame(2)).unwrap();
    writer.close().unwrap();
    assert_eq!(engine.written_pts(), vec![0, 1, 2]);
}

#[test]
fn timestamps_that_round_onto_the_same_tick_are_rejected() {
    let engine = ScriptedEngine::output();
    let mut writer =
        StreamWriter::open_with(engine.clone(), "out.mp4", descriptor(), WriterOptions::default()).unwrap();
    let millis = |pts| {
        Frame::blank(common::WIDTH, common::HEIGHT, descriptor().pixel_format, Pts(pts), Rational::new(1, 1000))
    };

    // 100ms is a later time, but lands on tick 0 of the 1/4 stream time base
    writer.write_frame(millis(0)).unwrap();
    let err = writer.write_frame(millis(100)).unwrap_err();
    assert!(
        matches!(err, Error::Encode(ref msg) if msg.contains("rounds to tick 0") && msg.contains("1/4")),
        "{err:?}"
    );

    writer.write_frame(millis(250)).unwrap();
    writer.close().unwrap();
    assert_eq!(engine.written_pts(), vec![0, 250]);
}

#[test]
fn mismatched_frames_are_rejected() {
    let engine = ScriptedEngine::output();
    let mut writer =
        StreamWriter::open_with(engine, "out.mp4", descriptor(), WriterOptions::default()).unwrap();
    let tb = common::time_base();

    let small = Frame::blank(32, 24, PixelFormat::Yuv420p, Pts(0), tb);
    assert!(matches!(writer.write_frame(small), Err(Error::Encode(_))));

    let rgb = Frame::blank(common::WIDTH, common::HEIGHT, PixelFormat::Rgb24, Pts(0), tb);
    assert!(matches!(writer.write_frame(rgb), Err(Error::Encode(_))));

    let mut short = frame(0);
    short.data.truncate(10);
    assert!(matches!(writer.write_frame(short), Err(Error::Encode(_))));

    writer.write_frame(frame(0)).unwrap();
    assert_eq!(writer.frames_written(), 1);
}

#[test]
fn frames_past_max_duration_are_rejected() {
    let engine = ScriptedEngine::output();
    let options = WriterOptions::default().with_max_duration(Duration::from_secs(1));
    let mut writer = StreamWriter::open_with(engine.clone(), "out.mp4", descriptor(), options).unwrap();

    // 4 fps: frames 0..4 cover the first second
    for i in 0..4 {
        writer.write_frame(frame(i)).unwrap();
    }
    assert!(matches!(writer.write_frame(frame(4)), Err(Error::Encode(_))));
    writer.close().unwrap();
    assert_eq!(engine.written_pts().len(), 4);
}

#[test]
fn odd_dimensions_are_rejected_at_open() {
    let engine = ScriptedEngine::output();
    let odd = StreamDescriptor::new(CodecId::H264, 641, 480, Rational::new(25, 1));
    let err = StreamWriter::open_with(engine.clone(), "out.mp4", odd, WriterOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Resource(_)));
    assert_eq!(engine.output_opens.load(Ordering::SeqCst), 0);
}

#[test]
fn open_failure_is_a_resource_error() {
    let engine = ScriptedEngine::output();
    engine.refuse_output(Error::protocol("muxer rejected stream"));
    let err = StreamWriter::open_with(engine, "out.mp4", descriptor(), WriterOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Resource(_)), "{err:?}");
}

#[test]
fn encoder_fault_is_sticky() {
    let engine = ScriptedEngine::output();
    engine.fail_write(2, Error::encode("encoder exploded"));
    let mut writer =
        StreamWriter::open_with(engine.clone(), "out.mp4", descriptor(), WriterOptions::default()).unwrap();

    let mut failure = None;
    for i in 0..200 {
        match writer.write_frame(frame(i)) {
            Ok(()) => std::thread::sleep(Duration::from_millis(2)),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    let failure = failure.expect("the fault reaches the caller");
    assert_eq!(failure, Error::encode("encoder exploded"));
    assert!(!writer.is_open());
    assert_eq!(writer.write_frame(frame(1_000)), Err(failure));

    // Already reported, so close succeeds
    writer.close().unwrap();
    assert!(!engine.output.lock().finished);
}

#[test]
fn close_reports_unseen_failures() {
    let engine = ScriptedEngine::output();
    engine.fail_write(0, Error::encode("encoder exploded"));
    let mut writer =
        StreamWriter::open_with(engine, "out.mp4", descriptor(), WriterOptions::default()).unwrap();
    writer.write_frame(frame(0)).unwrap();
    assert_eq!(writer.close(), Err(Error::encode("encoder exploded")));
    assert_eq!(writer.close(), Ok(()));
}

#[test]
fn full_queue_applies_backpressure() {
    let engine = ScriptedEngine::output();
    engine.slow_writes(Duration::from_millis(200));
    let options = WriterOptions::default()
        .with_stream_options(StreamOptions::default().with_buffer_capacity(1));
    let mut writer = StreamWriter::open_with(engine.clone(), "out.mp4", descriptor(), options).unwrap();

    // One frame in the encoder, one queued, the third has to wait
    writer.write_frame(frame(0)).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    writer.write_frame(frame(1)).unwrap();
    assert_eq!(
        writer.write_frame_timeout(frame(2), Duration::from_millis(10)),
        Err(Error::Timeout)
    );

    // A timed out frame was not accepted, so the same timestamp is still valid
    writer.write_frame(frame(2)).unwrap();
    writer.close().unwrap();
    assert_eq!(engine.written_pts(), vec![0, 1, 2]);
}

#[test]
fn close_is_idempotent_and_final() {
    let engine = ScriptedEngine::output();
    let mut writer =
        StreamWriter::open_with(engine, "out.mp4", descriptor(), WriterOptions::default()).unwrap();
    writer.write_frame(frame(0)).unwrap();
    writer.close().unwrap();
    writer.close().unwrap();
    assert!(!writer.is_open());
    assert_eq!(writer.write_frame(frame(1)), Err(Error::Closed));
}

#[test]
fn dropping_the_writer_finishes_the_output() {
    let engine = ScriptedEngine::output();
    {
        let mut writer =
            StreamWriter::open_with(engine.clone(), "out.mp4", descriptor(), WriterOptions::default())
                .unwrap();
        writer.write_frame(frame(0)).unwrap();
    }
    assert!(engine.output.lock().finished);
    assert_eq!(engine.written_pts(), vec![0]);
}
