mod common;

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use common::{ScriptedEngine, Session, Step, descriptor, frame, frames};
use vio::{Error, ReaderOptions, StreamOptions, StreamReader, StreamWriter, WriterOptions};

const CAMERA: &str = "rtsp://camera.local/live";

fn fast_retries(attempts: u32) -> StreamOptions {
    StreamOptions::default()
        .with_reconnect_max_attempts(attempts)
        .with_reconnect_backoff([Duration::from_millis(1)])
}

fn reader_options(stream: StreamOptions) -> ReaderOptions {
    ReaderOptions::default().with_stream_options(stream)
}

#[test]
fn reader_resumes_after_connection_drop() {
    let mut first = frames(0..5);
    first.push(Step::Drop);
    let mut second = frames(0..3);
    second.push(Step::End);

    let engine = ScriptedEngine::new(vec![Session::Open(first), Session::Open(second)]);
    let mut reader =
        StreamReader::open_with(engine.clone(), CAMERA, reader_options(fast_retries(3))).unwrap();

    let mut out = Vec::new();
    while let Some(frame) = reader.read_frame().unwrap() {
        out.push(frame);
    }

    assert_eq!(out.iter().map(|f| f.pts.0).collect::<Vec<_>>(), (0..8).collect::<Vec<_>>());
    assert_eq!(out.iter().map(|f| f.sequence).collect::<Vec<_>>(), (0..8).collect::<Vec<_>>());
    assert_eq!(engine.input_opens.load(Ordering::SeqCst), 2);
}

#[test]
fn reader_gives_up_after_max_attempts() {
    let mut first = frames(0..5);
    first.push(Step::Drop);

    let engine = ScriptedEngine::new(vec![Session::Open(first)]);
    let mut reader =
        StreamReader::open_with(engine.clone(), CAMERA, reader_options(fast_retries(2))).unwrap();

    let mut delivered = 0;
    let err = loop {
        match reader.read_frame() {
            Ok(Some(_)) => delivered += 1,
            Ok(None) => panic!("stream ended without an error"),
            Err(e) => break e,
        }
    };
    assert_eq!(delivered, 5);
    assert!(matches!(err, Error::Resource(ref msg) if msg.contains("2 reconnect attempts")), "{err:?}");
    assert_eq!(engine.input_opens.load(Ordering::SeqCst), 3);
    assert!(!reader.is_open());
}

#[test]
fn initial_connection_is_retried() {
    let engine = ScriptedEngine::new(vec![
        Session::Refuse(Error::transport("connection refused")),
        Session::Open(frames(0..3)),
    ]);
    let mut reader =
        StreamReader::open_with(engine.clone(), CAMERA, reader_options(fast_retries(3))).unwrap();

    let mut count = 0;
    while reader.read_frame().unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 3);
    assert_eq!(engine.input_opens.load(Ordering::SeqCst), 2);
}

#[test]
fn protocol_errors_are_not_retried() {
    let engine = ScriptedEngine::new(vec![
        Session::Refuse(Error::protocol("401 Unauthorized")),
        Session::Open(frames(0..3)),
    ]);
    let err = StreamReader::open_with(engine.clone(), CAMERA, reader_options(fast_retries(3))).unwrap_err();
    assert!(matches!(err, Error::Resource(ref msg) if msg.contains("401")), "{err:?}");
    assert_eq!(engine.input_opens.load(Ordering::SeqCst), 1);
}

#[test]
fn close_interrupts_backoff() {
    let engine = ScriptedEngine::new(vec![Session::Open(vec![Step::Drop])]);
    let stream = StreamOptions::default()
        .with_reconnect_max_attempts(5)
        .with_reconnect_backoff([Duration::from_secs(10)]);
    let mut reader = StreamReader::open_with(engine, CAMERA, reader_options(stream)).unwrap();

    // Let the worker hit the drop and start waiting
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(
        reader.read_frame_timeout(Duration::from_millis(10)),
        Err(Error::Timeout)
    );

    let start = Instant::now();
    reader.close();
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn writer_reconnects_and_resends_the_failed_frame() {
    let engine = ScriptedEngine::output();
    engine.fail_write(2, Error::transport("broken pipe"));
    let options = WriterOptions::default().with_stream_options(fast_retries(3));
    let mut writer =
        StreamWriter::open_with(engine.clone(), "rtsp://server.local/publish", descriptor(), options).unwrap();

    for i in 0..6 {
        writer.write_frame(frame(i)).unwrap();
    }
    writer.close().unwrap();

    assert_eq!(engine.output_opens.load(Ordering::SeqCst), 2);
    assert_eq!(engine.written_pts(), (0..6).collect::<Vec<_>>());

    let log = engine.output.lock();
    assert!(log.finished);
    assert_eq!(log.configs[0].rtsp_transport.as_deref(), Some("tcp"));
    assert_eq!(log.configs[0].descriptor.container, vio::ContainerFormat::Rtsp);
}

#[test]
fn writer_keeps_resending_across_reconnects() {
    let engine = ScriptedEngine::output();
    // The first resend fails too
    engine.fail_write(2, Error::transport("broken pipe"));
    engine.fail_write(3, Error::transport("connection reset by peer"));
    let options = WriterOptions::default().with_stream_options(fast_retries(3));
    let mut writer =
        StreamWriter::open_with(engine.clone(), "rtsp://server.local/publish", descriptor(), options).unwrap();

    for i in 0..6 {
        writer.write_frame(frame(i)).unwrap();
    }
    writer.close().unwrap();

    assert_eq!(engine.output_opens.load(Ordering::SeqCst), 3);
    assert_eq!(engine.written_pts(), (0..6).collect::<Vec<_>>());
    assert!(engine.output.lock().finished);
}

#[test]
fn writer_resends_share_the_attempt_budget() {
    let engine = ScriptedEngine::output();
    for index in 2..=5 {
        engine.fail_write(index, Error::transport("broken pipe"));
    }
    let options = WriterOptions::default().with_stream_options(fast_retries(2));
    let mut writer =
        StreamWriter::open_with(engine.clone(), "rtsp://server.local/publish", descriptor(), options).unwrap();

    let result = (0..6)
        .try_for_each(|i| writer.write_frame(frame(i)))
        .and_then(|()| writer.close());
    let err = result.unwrap_err();
    assert!(matches!(err, Error::Resource(ref msg) if msg.contains("2 reconnect attempts")), "{err:?}");
    assert_eq!(engine.output_opens.load(Ordering::SeqCst), 3);
    assert_eq!(engine.written_pts(), vec![0, 1]);
}

#[test]
fn flapping_source_runs_out_of_attempts() {
    let mut first = frames(0..2);
    first.push(Step::Drop);
    let mut sessions = vec![Session::Open(first)];
    // Each reconnect is accepted and dropped before a frame arrives
    sessions.extend((0..30).map(|_| Session::Open(vec![Step::Drop])));

    let engine = ScriptedEngine::new(sessions);
    let mut reader =
        StreamReader::open_with(engine.clone(), CAMERA, reader_options(fast_retries(2))).unwrap();

    let mut delivered = 0;
    let err = loop {
        match reader.read_frame() {
            Ok(Some(_)) => delivered += 1,
            Ok(None) => panic!("stream ended without an error"),
            Err(e) => break e,
        }
    };
    assert_eq!(delivered, 2);
    assert!(matches!(err, Error::Resource(_)), "{err:?}");
    assert_eq!(engine.input_opens.load(Ordering::SeqCst), 3);
}

#[test]
fn delivered_frames_restore_the_attempt_budget() {
    // Every session delivers a frame before dropping, so one attempt is
    // always enough
    let mut sessions = Vec::new();
    for pts in 0..6 {
        sessions.push(Session::Open(vec![Step::Frame(pts), Step::Drop]));
    }
    sessions.push(Session::Open(vec![Step::Frame(6), Step::End]));

    let engine = ScriptedEngine::new(sessions);
    let mut reader =
        StreamReader::open_with(engine.clone(), CAMERA, reader_options(fast_retries(1))).unwrap();

    let mut count = 0;
    while reader.read_frame().unwrap().is_some() {
        count += 1;
    }
    assert_eq!(count, 7);
    assert_eq!(engine.input_opens.load(Ordering::SeqCst), 7);
}
