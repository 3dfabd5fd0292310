/*!
    Encoding frames into a file or network sink.
*/

use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use vio_encode::DEFAULT_GOP;
use vio_types::{ContainerFormat, Error, Frame, Rational, Result, StreamDescriptor};

use crate::buffer::FrameBuffer;
use crate::config::WriterOptions;
use crate::engine::{Engine, OutputConfig, OutputSession, VideoMetadata};
use crate::ffmpeg::FfmpegEngine;
use crate::location::{Location, Transport};
use crate::reconnect::ReconnectionManager;
use crate::state::PipelineState;
use crate::worker::{CancelToken, Worker};

/**
    Encodes frames and writes them to a file or network sink.

    Frames are validated on the caller's thread, then encoded and muxed on a
    dedicated worker thread. `write_frame` only blocks while the queue in
    front of the encoder is full.

    ```no_run
    use vio::{CodecId, Frame, PixelFormat, Pts, Rational, StreamDescriptor, StreamWriter, WriterOptions};

    let descriptor = StreamDescriptor::new(CodecId::H264, 640, 480, Rational::new(25, 1))
        .with_pixel_format(PixelFormat::Rgb24);
    let mut writer = StreamWriter::open("out.mp4", descriptor, WriterOptions::default())?;
    for i in 0..100 {
        let frame = Frame::blank(640, 480, PixelFormat::Rgb24, Pts(i), Rational::new(1, 25));
        writer.write_frame(frame)?;
    }
    writer.close()?;
    # Ok::<(), vio::Error>(())
    ```
*/
pub struct StreamWriter {
    location: Location,
    descriptor: StreamDescriptor,
    max_duration: Option<Duration>,
    buffer: Arc<FrameBuffer<Frame>>,
    cancel: CancelToken,
    worker: Option<Worker>,
    finished: Receiver<Result<()>>,
    state: PipelineState,
    close_grace: Duration,
    last_pts: Option<i64>,
    frames_written: u64,
}

impl StreamWriter {
    /**
        Open a file path or network URL for writing with FFmpeg.

        The descriptor names the codec, size, frame rate and the pixel format
        of the frames that will be written. The container comes from the
        options, or else from the destination. Fails with `Resource` if no
        matching encoder or muxer can be set up.
    */
    pub fn open(uri: &str, descriptor: StreamDescriptor, options: WriterOptions) -> Result<Self> {
        Self::open_with(Arc::new(FfmpegEngine), uri, descriptor, options)
    }

    /**
        Open a sink with a custom engine.
    */
    pub fn open_with(
        engine: Arc<dyn Engine>,
        uri: &str,
        mut descriptor: StreamDescriptor,
        options: WriterOptions,
    ) -> Result<Self> {
        options.stream.validate()?;
        let location = Location::parse(uri, &options.stream)?;
        validate_descriptor(&descriptor)?;

        descriptor.container = options
            .container
            .unwrap_or_else(|| location.default_container());

        let mut state = PipelineState::default();
        state.begin_open()?;

        let config = output_config(&location, &descriptor, &options);
        let buffer = Arc::new(FrameBuffer::new(options.stream.buffer_capacity));
        let cancel = CancelToken::new();
        let close_grace = options.stream.close_grace();

        let job = WriteJob {
            engine,
            uri: location.uri(),
            config,
            manager: location
                .endpoint()
                .map(|endpoint| ReconnectionManager::new(endpoint.reconnect().clone())),
            buffer: Arc::clone(&buffer),
            cancel: cancel.clone(),
        };

        let (opened_tx, opened_rx) = mpsc::channel();
        let (finished_tx, finished) = mpsc::channel();
        let mut worker = Worker::spawn("vio-writer", move || job.run(opened_tx, finished_tx))?;

        match opened_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                worker.join(close_grace);
                warn!(uri = %location, error = %e, "cannot open stream writer");
                return Err(e);
            }
            Err(_) => {
                worker.join(close_grace);
                return Err(Error::resource("writer worker exited while opening"));
            }
        }
        state.opened()?;

        info!(
            uri = %location,
            container = %descriptor.container,
            codec = %descriptor.codec,
            width = descriptor.width,
            height = descriptor.height,
            fps = descriptor.fps(),
            "stream writer opened"
        );

        Ok(Self {
            location,
            descriptor,
            max_duration: options.max_duration,
            buffer,
            cancel,
            worker: Some(worker),
            finished,
            state,
            close_grace,
            last_pts: None,
            frames_written: 0,
        })
    }

    /**
        Queue a frame for encoding.

        The frame must match the descriptor's size and pixel format and its
        timestamp must be later than the previous frame's; otherwise it is
        rejected with `Encode` and the writer stays usable.

        Ordering is checked after rescaling into the descriptor's time base,
        since that is what the encoder sees. Two frames that are distinct in
        a finer time base but round to the same stream tick are rejected;
        give the descriptor a finer time base to keep them both.
    */
    pub fn write_frame(&mut self, frame: Frame) -> Result<()> {
        self.write(frame, None)
    }

    /**
        Like [`write_frame`](Self::write_frame), but gives up with `Timeout`
        if the queue stays full for `timeout`.
    */
    pub fn write_frame_timeout(&mut self, frame: Frame, timeout: Duration) -> Result<()> {
        self.write(frame, Some(timeout))
    }

    fn write(&mut self, mut frame: Frame, timeout: Option<Duration>) -> Result<()> {
        self.state.ensure_streaming()?;
        let pts = self.validate(&frame)?;
        frame.sequence = self.frames_written;

        match self.buffer.push(frame, timeout) {
            Ok(()) => {
                self.last_pts = Some(pts);
                self.frames_written += 1;
                Ok(())
            }
            Err(Error::Timeout) => Err(Error::Timeout),
            Err(e) => {
                error!(uri = %self.location, error = %e, "stream writer failed");
                let _ = self.state.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Returns the frame's timestamp in the descriptor's time base.
    fn validate(&self, frame: &Frame) -> Result<i64> {
        let d = &self.descriptor;
        if frame.width != d.width || frame.height != d.height {
            return Err(Error::encode(format!(
                "frame is {}x{}, stream is {}x{}",
                frame.width, frame.height, d.width, d.height
            )));
        }
        if frame.format != d.pixel_format {
            return Err(Error::encode(format!(
                "frame is {}, stream expects {}",
                frame.format, d.pixel_format
            )));
        }
        if !frame.is_complete() {
            return Err(Error::encode(format!(
                "frame holds {} bytes, {} needed",
                frame.data.len(),
                frame.expected_size()
            )));
        }
        if !frame.time_base.is_valid() {
            return Err(Error::encode(format!("invalid time base {}", frame.time_base)));
        }

        let pts = Rational::rescale(frame.pts.0, frame.time_base, d.time_base);
        if let Some(last) = self.last_pts {
            if pts <= last && is_after_tick(frame, last, d.time_base) {
                return Err(Error::encode(format!(
                    "timestamp {} in time base {} rounds to tick {pts} of the stream time base {}, \
                     which the previous frame already holds",
                    frame.pts.0, frame.time_base, d.time_base
                )));
            }
            if pts <= last {
                return Err(Error::encode(format!(
                    "timestamp {pts} is not after previous {last} (time base {})",
                    d.time_base
                )));
            }
        }
        if let Some(max) = self.max_duration {
            if frame.presentation_time() >= max {
                return Err(Error::encode(format!(
                    "frame at {:?} is past the maximum duration {max:?}",
                    frame.presentation_time()
                )));
            }
        }
        Ok(pts)
    }

    /**
        Encode what is queued, finalize the container and release the sink.

        Returns the first error the worker hit that was not already returned
        by `write_frame`, and `Timeout` if the worker did not finish within
        the grace period. Calling it again does nothing.
    */
    pub fn close(&mut self) -> Result<()> {
        let Some(mut worker) = self.worker.take() else {
            return Ok(());
        };
        let reported = self.state.error().cloned();
        let _ = self.state.begin_drain();

        self.buffer.finish();
        let joined = worker.join(self.close_grace);
        self.state.close();

        if !joined {
            self.cancel.cancel();
            self.buffer.cancel();
            warn!(uri = %self.location, "writer worker detached, output may be incomplete");
            return Err(Error::Timeout);
        }

        let result = self
            .finished
            .try_recv()
            .unwrap_or_else(|_| Err(Error::resource("writer worker exited unexpectedly")));

        match result {
            Ok(()) => {
                info!(uri = %self.location, frames = self.frames_written, "stream writer closed");
                Ok(())
            }
            Err(e) if reported.as_ref() == Some(&e) => Ok(()),
            Err(e) => {
                error!(uri = %self.location, error = %e, "stream writer failed to finish");
                Err(e)
            }
        }
    }

    /**
        Check that a written file can be read back and holds a video stream.
    */
    pub fn check(path: impl AsRef<Path>) -> Result<VideoMetadata> {
        let path = path.as_ref();
        let uri = path
            .to_str()
            .ok_or_else(|| Error::resource(format!("{} is not valid UTF-8", path.display())))?;
        crate::probe(uri)
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    pub fn container(&self) -> ContainerFormat {
        self.descriptor.container
    }

    /**
        Frames accepted so far.
    */
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn is_open(&self) -> bool {
        self.state.is_streaming()
    }

    pub fn location(&self) -> &Location {
        &self.location
    }
}

impl Drop for StreamWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(uri = %self.location, error = %e, "error closing stream writer on drop");
        }
    }
}

impl std::fmt::Debug for StreamWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamWriter")
            .field("location", &self.location)
            .field("descriptor", &self.descriptor)
            .field("state", &self.state)
            .field("frames_written", &self.frames_written)
            .finish_non_exhaustive()
    }
}

/// True if the frame's exact time lies past `tick` of `time_base`.
fn is_after_tick(frame: &Frame, tick: i64, time_base: Rational) -> bool {
    let exact = frame.pts.0 as i128 * frame.time_base.num as i128 * time_base.den as i128;
    let bound = tick as i128 * time_base.num as i128 * frame.time_base.den as i128;
    exact > bound
}

fn validate_descriptor(descriptor: &StreamDescriptor) -> Result<()> {
    let (width, height) = (descriptor.width, descriptor.height);
    if width == 0 || height == 0 {
        return Err(Error::resource(format!("invalid frame size {width}x{height}")));
    }
    if width % 2 != 0 || height % 2 != 0 {
        return Err(Error::resource(format!(
            "frame size {width}x{height} must be even"
        )));
    }
    if !descriptor.frame_rate.is_valid() {
        return Err(Error::resource(format!(
            "invalid frame rate {}",
            descriptor.frame_rate
        )));
    }
    if !descriptor.time_base.is_valid() {
        return Err(Error::resource(format!(
            "invalid time base {}",
            descriptor.time_base
        )));
    }
    if !descriptor.codec.can_encode() {
        return Err(Error::resource(format!(
            "encoding {} is not supported",
            descriptor.codec
        )));
    }
    Ok(())
}

fn output_config(
    location: &Location,
    descriptor: &StreamDescriptor,
    options: &WriterOptions,
) -> OutputConfig {
    let endpoint = location.endpoint();
    let rtsp_transport = match endpoint.map(|e| e.transport()) {
        Some(Transport::Rtsp) => Some(
            options
                .rtsp_transport
                .clone()
                .unwrap_or_else(|| "tcp".to_string()),
        ),
        _ => None,
    };

    OutputConfig {
        descriptor: descriptor.clone(),
        gop: options.gop.unwrap_or(DEFAULT_GOP),
        preset: options.preset,
        encoder_name: options.encoder_name.clone(),
        write_timeout: endpoint.and_then(|e| e.read_timeout()),
        connect_timeout: endpoint.and_then(|e| e.connect_timeout()),
        rtsp_transport,
    }
}

/// Everything the writer worker owns.
struct WriteJob {
    engine: Arc<dyn Engine>,
    uri: String,
    config: OutputConfig,
    manager: Option<ReconnectionManager>,
    buffer: Arc<FrameBuffer<Frame>>,
    cancel: CancelToken,
}

impl WriteJob {
    fn run(mut self, opened: Sender<Result<()>>, finished: Sender<Result<()>>) {
        let session = match self.open() {
            Ok(session) => session,
            Err(e) => {
                let _ = opened.send(Err(e));
                return;
            }
        };
        if opened.send(Ok(())).is_err() {
            return;
        }

        let result = self.stream(session);
        match &result {
            Ok(()) => debug!(uri = %self.uri, "writer worker finished"),
            Err(Error::Closed) => debug!(uri = %self.uri, "writer worker cancelled"),
            Err(e) => self.buffer.fail(e.clone()),
        }
        let _ = finished.send(result);
    }

    fn open(&mut self) -> Result<Box<dyn OutputSession>> {
        let engine = &self.engine;
        let uri = &self.uri;
        let config = &self.config;
        let connect = || engine.open_output(uri, config);

        let result = match self.manager.as_mut() {
            Some(manager) => manager.open(uri, &self.cancel, connect),
            None => connect(),
        };
        result.map_err(|e| match e {
            Error::Resource(_) | Error::Closed => e,
            other => Error::resource(other.to_string()),
        })
    }

    fn stream(&mut self, mut session: Box<dyn OutputSession>) -> Result<()> {
        // Ends with `Ok(None)` once the caller closed and the queue is drained
        while let Some(frame) = self.buffer.pop(None)? {
            let mut failure = match session.write_frame(&frame) {
                Ok(()) => {
                    if let Some(manager) = self.manager.as_mut() {
                        manager.session_healthy();
                    }
                    continue;
                }
                Err(e) if e.is_transport() => e,
                Err(e) => return Err(e),
            };
            let Some(manager) = self.manager.as_mut() else {
                return Err(Error::resource(failure.to_string()));
            };

            // The frame is resent on every new session until one takes it or
            // the attempt budget runs out
            loop {
                warn!(uri = %self.uri, sequence = frame.sequence, error = %failure, "transport failure, reconnecting");
                drop(session);

                let engine = &self.engine;
                let uri = &self.uri;
                let config = &self.config;
                session = manager.recover(uri, &self.cancel, &failure, || engine.open_output(uri, config))?;
                match session.write_frame(&frame) {
                    Ok(()) => {
                        manager.session_healthy();
                        break;
                    }
                    Err(e) if e.is_transport() => failure = e,
                    Err(e) => return Err(e),
                }
            }
        }

        session.finish()
    }
}
