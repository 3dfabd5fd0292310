/*!
    Reading decoded frames from a file or network source.
*/

use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use vio_types::{Error, Frame, PixelFormat, Result, StreamDescriptor};

use crate::buffer::FrameBuffer;
use crate::config::ReaderOptions;
use crate::engine::{Engine, InputConfig, InputSession, VideoMetadata};
use crate::ffmpeg::FfmpegEngine;
use crate::location::{Location, Transport};
use crate::reconnect::ReconnectionManager;
use crate::state::PipelineState;
use crate::timestamp::{ErrorWindow, REORDER_DEPTH, ReorderBuffer, TimestampRebaser};
use crate::worker::{CancelToken, Worker};

/**
    Reads decoded video frames from a file or network source.

    Demuxing and decoding run on a dedicated worker thread that stays a few
    frames ahead of the caller. Frames are delivered in presentation order
    with non-decreasing timestamps and increasing sequence numbers, also
    across reconnects of network sources.

    ```no_run
    use vio::{ReaderOptions, StreamReader};

    let mut reader = StreamReader::open("clip.mp4", ReaderOptions::default())?;
    while let Some(frame) = reader.read_frame()? {
        println!("frame {} at {:?}", frame.sequence, frame.presentation_time());
    }
    reader.close();
    # Ok::<(), vio::Error>(())
    ```
*/
pub struct StreamReader {
    location: Location,
    metadata: VideoMetadata,
    output_format: PixelFormat,
    output_size: (u32, u32),
    buffer: Arc<FrameBuffer<Frame>>,
    cancel: CancelToken,
    worker: Option<Worker>,
    state: PipelineState,
    close_grace: Duration,
}

impl StreamReader {
    /**
        Open a file path or network URL with FFmpeg.

        Fails with `Resource` if the source cannot be opened or holds no
        decodable video stream.
    */
    pub fn open(uri: &str, options: ReaderOptions) -> Result<Self> {
        Self::open_with(Arc::new(FfmpegEngine), uri, options)
    }

    /**
        Open a source with a custom engine.
    */
    pub fn open_with(engine: Arc<dyn Engine>, uri: &str, options: ReaderOptions) -> Result<Self> {
        options.stream.validate()?;
        let location = Location::parse(uri, &options.stream)?;

        let mut state = PipelineState::default();
        state.begin_open()?;

        let config = input_config(&location, &options);
        let buffer = Arc::new(FrameBuffer::new(options.stream.buffer_capacity));
        let cancel = CancelToken::new();
        let close_grace = options.stream.close_grace();

        let job = ReadJob {
            engine,
            uri: location.uri(),
            config,
            manager: location
                .endpoint()
                .map(|endpoint| ReconnectionManager::new(endpoint.reconnect().clone())),
            errors: ErrorWindow::new(
                options.stream.decode_error_tolerance,
                options.stream.decode_error_window(),
            ),
            buffer: Arc::clone(&buffer),
            cancel: cancel.clone(),
        };

        let (opened_tx, opened_rx) = mpsc::channel();
        let mut worker = Worker::spawn("vio-reader", move || job.run(opened_tx))?;

        let metadata = match opened_rx.recv() {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(e)) => {
                worker.join(close_grace);
                warn!(uri = %location, error = %e, "cannot open stream reader");
                return Err(e);
            }
            Err(_) => {
                worker.join(close_grace);
                return Err(Error::resource("reader worker exited while opening"));
            }
        };
        state.opened()?;

        let descriptor = &metadata.descriptor;
        let output_size = options
            .output_size
            .unwrap_or((descriptor.width, descriptor.height));

        info!(
            uri = %location,
            codec = %descriptor.codec,
            width = descriptor.width,
            height = descriptor.height,
            fps = descriptor.fps(),
            "stream reader opened"
        );

        Ok(Self {
            location,
            metadata,
            output_format: options.output_format,
            output_size,
            buffer,
            cancel,
            worker: Some(worker),
            state,
            close_grace,
        })
    }

    /**
        Next frame in presentation order, or `None` at end of stream.

        Blocks until a frame is decoded. Errors other than `Timeout` end the
        stream and are returned again by every later call.
    */
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        self.read(None)
    }

    /**
        Like [`read_frame`](Self::read_frame), but gives up with `Timeout`
        after `timeout`. The reader stays usable.
    */
    pub fn read_frame_timeout(&mut self, timeout: Duration) -> Result<Option<Frame>> {
        self.read(Some(timeout))
    }

    fn read(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>> {
        self.state.ensure_streaming()?;

        match self.buffer.pop(timeout) {
            Ok(frame) => Ok(frame),
            Err(Error::Timeout) => Err(Error::Timeout),
            Err(e) => {
                error!(uri = %self.location, error = %e, "stream reader failed");
                let _ = self.state.fail(e.clone());
                Err(e)
            }
        }
    }

    /**
        Stop the worker and release the source. Calling it again does nothing.
    */
    pub fn close(&mut self) {
        let Some(mut worker) = self.worker.take() else {
            return;
        };

        self.cancel.cancel();
        self.buffer.cancel();
        if !worker.join(self.close_grace) {
            warn!(uri = %self.location, "reader worker detached");
        }
        self.state.close();
        debug!(uri = %self.location, "stream reader closed");
    }

    /**
        The source stream as stored.
    */
    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.metadata.descriptor
    }

    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    pub fn frame_count(&self) -> Option<u64> {
        self.metadata.frame_count
    }

    pub fn duration(&self) -> Option<Duration> {
        self.metadata.duration
    }

    /**
        Width and height of delivered frames.
    */
    pub fn frame_size(&self) -> (u32, u32) {
        self.output_size
    }

    /**
        Size in bytes of one delivered frame.
    */
    pub fn frame_size_in_bytes(&self) -> usize {
        self.output_format
            .frame_size(self.output_size.0, self.output_size.1)
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.output_format
    }

    pub fn fps(&self) -> f64 {
        self.metadata.descriptor.fps()
    }

    pub fn is_open(&self) -> bool {
        self.state.is_streaming()
    }

    /**
        Frames decoded but not yet read.
    */
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn location(&self) -> &Location {
        &self.location
    }
}

impl Drop for StreamReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for StreamReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamReader")
            .field("location", &self.location)
            .field("state", &self.state)
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

fn input_config(location: &Location, options: &ReaderOptions) -> InputConfig {
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

    InputConfig {
        output_format: options.output_format,
        output_size: options.output_size,
        read_timeout: endpoint.and_then(|e| e.read_timeout()),
        connect_timeout: endpoint.and_then(|e| e.connect_timeout()),
        rtsp_transport,
        decode_support: options.decode_support,
    }
}

/// Everything the reader worker owns.
struct ReadJob {
    engine: Arc<dyn Engine>,
    uri: String,
    config: InputConfig,
    manager: Option<ReconnectionManager>,
    errors: ErrorWindow,
    buffer: Arc<FrameBuffer<Frame>>,
    cancel: CancelToken,
}

impl ReadJob {
    fn run(mut self, opened: Sender<Result<VideoMetadata>>) {
        let session = match self.open() {
            Ok(session) => session,
            Err(e) => {
                let _ = opened.send(Err(e));
                return;
            }
        };
        if opened.send(Ok(session.metadata().clone())).is_err() {
            return;
        }

        match self.stream(session) {
            Ok(()) => {
                debug!(uri = %self.uri, "end of stream");
                self.buffer.finish();
            }
            Err(Error::Closed) => trace!(uri = %self.uri, "reader worker cancelled"),
            Err(e) => self.buffer.fail(e),
        }
    }

    fn open(&mut self) -> Result<Box<dyn InputSession>> {
        let engine = &self.engine;
        let uri = &self.uri;
        let config = &self.config;
        let connect = || engine.open_input(uri, config);

        let result = match self.manager.as_mut() {
            Some(manager) => manager.open(uri, &self.cancel, connect),
            None => connect(),
        };
        result.map_err(opening_error)
    }

    fn stream(&mut self, mut session: Box<dyn InputSession>) -> Result<()> {
        let mut rebaser = TimestampRebaser::new(session.metadata().descriptor.frame_rate);
        let mut reorder = ReorderBuffer::new(REORDER_DEPTH);

        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Closed);
            }

            match session.read_frames() {
                // An empty chunk means the decoder wants more input, which
                // says nothing about the stream's health
                Ok(Some(frames)) if frames.is_empty() => {}
                Ok(Some(frames)) => {
                    self.errors.record_success();
                    if let Some(manager) = self.manager.as_mut() {
                        manager.session_healthy();
                    }
                    for frame in frames {
                        if let Some(ready) = reorder.push(frame) {
                            self.deliver(rebaser.apply(ready))?;
                        }
                    }
                }
                Ok(None) => {
                    self.flush(&mut reorder, &mut rebaser)?;
                    return Ok(());
                }
                Err(Error::Decode(msg)) => {
                    warn!(uri = %self.uri, error = %msg, "skipping undecodable packet");
                    if self.errors.record_failure(Instant::now()) {
                        self.flush(&mut reorder, &mut rebaser)?;
                        return Err(Error::decode(format!(
                            "{} consecutive decode failures: {msg}",
                            self.errors.failures()
                        )));
                    }
                }
                Err(Error::Timeout) => trace!(uri = %self.uri, "read would block, retrying"),
                Err(e) if e.is_transport() => {
                    self.flush(&mut reorder, &mut rebaser)?;
                    let Some(manager) = self.manager.as_mut() else {
                        return Err(Error::resource(e.to_string()));
                    };
                    warn!(uri = %self.uri, error = %e, "transport failure, reconnecting");
                    drop(session);

                    let engine = &self.engine;
                    let uri = &self.uri;
                    let config = &self.config;
                    session = manager.recover(uri, &self.cancel, &e, || engine.open_input(uri, config))?;

                    rebaser.begin_session();
                    self.errors.record_success();
                }
                Err(e) => {
                    self.flush(&mut reorder, &mut rebaser)?;
                    return Err(e);
                }
            }
        }
    }

    /// Deliver the frames held back for reordering.
    fn flush(&self, reorder: &mut ReorderBuffer, rebaser: &mut TimestampRebaser) -> Result<()> {
        for frame in reorder.drain() {
            self.deliver(rebaser.apply(frame))?;
        }
        Ok(())
    }

    fn deliver(&self, frame: Frame) -> Result<()> {
        trace!(sequence = frame.sequence, pts = frame.pts.0, "frame decoded");
        self.buffer.push(frame, None)
    }
}

/// Everything that prevents a pipeline from opening is a resource problem.
fn opening_error(e: Error) -> Error {
    match e {
        Error::Resource(_) | Error::Closed => e,
        other => Error::resource(other.to_string()),
    }
}
