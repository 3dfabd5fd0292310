//! Scripted engine for pipeline tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use vio::{
    CodecId, Engine, Error, Frame, InputConfig, InputSession, OutputConfig, OutputSession,
    Pts, Rational, Result, StreamDescriptor, VideoMetadata,
};

pub const WIDTH: u32 = 64;
pub const HEIGHT: u32 = 48;
pub const FPS: i32 = 4;

pub fn time_base() -> Rational {
    Rational::new(1, FPS)
}

/// One `read_frames` call of a scripted input session.
#[derive(Clone, Debug)]
pub enum Step {
    /// Decode one frame with this timestamp.
    Frame(i64),
    /// A packet that fails to decode.
    Corrupt,
    /// The connection drops.
    Drop,
    /// Block for a while, then produce nothing.
    Stall(Duration),
    /// End of input.
    End,
}

/// What the next `open_input` call does.
#[derive(Clone, Debug)]
pub enum Session {
    Open(Vec<Step>),
    Refuse(Error),
}

pub fn frames(pts: impl IntoIterator<Item = i64>) -> Vec<Step> {
    pts.into_iter().map(Step::Frame).collect()
}

pub fn descriptor() -> StreamDescriptor {
    StreamDescriptor::new(CodecId::H264, WIDTH, HEIGHT, Rational::new(FPS, 1))
}

pub fn frame(pts: i64) -> Frame {
    let descriptor = descriptor();
    Frame::blank(WIDTH, HEIGHT, descriptor.pixel_format, Pts(pts), time_base())
}

#[derive(Debug, Default)]
pub struct OutputLog {
    pub frames: Vec<Frame>,
    pub finished: bool,
    pub configs: Vec<OutputConfig>,
}

/**
    Engine whose sessions follow a script.

    Input opens consume `sessions` in order; once they run out every open is
    refused with a transport error. Output writes are recorded in `output`,
    and `write_failures` injects an error at a given overall write index.
*/
#[derive(Default)]
pub struct ScriptedEngine {
    sessions: Mutex<VecDeque<Session>>,
    pub input_opens: AtomicUsize,
    pub reads: Arc<AtomicUsize>,
    pub output_opens: AtomicUsize,
    pub output: Arc<Mutex<OutputLog>>,
    output_refusals: Mutex<VecDeque<Error>>,
    write_failures: Arc<Mutex<Vec<(usize, Error)>>>,
    writes: Arc<AtomicUsize>,
    write_delay: Mutex<Option<Duration>>,
}

impl ScriptedEngine {
    pub fn new(sessions: Vec<Session>) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(sessions.into()),
            ..Self::default()
        })
    }

    pub fn with_input(steps: Vec<Step>) -> Arc<Self> {
        Self::new(vec![Session::Open(steps)])
    }

    pub fn output() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn fail_write(&self, index: usize, error: Error) {
        self.write_failures.lock().push((index, error));
    }

    pub fn refuse_output(&self, error: Error) {
        self.output_refusals.lock().push_back(error);
    }

    pub fn slow_writes(&self, delay: Duration) {
        *self.write_delay.lock() = Some(delay);
    }

    pub fn written_pts(&self) -> Vec<i64> {
        self.output.lock().frames.iter().map(|f| f.pts.0).collect()
    }
}

impl Engine for ScriptedEngine {
    fn open_input(&self, uri: &str, config: &InputConfig) -> Result<Box<dyn InputSession>> {
        self.input_opens.fetch_add(1, Ordering::SeqCst);
        let session = self
            .sessions
            .lock()
            .pop_front()
            .unwrap_or_else(|| Session::Refuse(Error::transport("connection refused")));

        match session {
            Session::Open(steps) => Ok(Box::new(ScriptedInput {
                metadata: metadata(uri),
                config: config.clone(),
                steps: steps.into(),
                reads: Arc::clone(&self.reads),
            })),
            Session::Refuse(e) => Err(e),
        }
    }

    fn open_output(&self, _uri: &str, config: &OutputConfig) -> Result<Box<dyn OutputSession>> {
        self.output_opens.fetch_add(1, Ordering::SeqCst);
        if let Some(e) = self.output_refusals.lock().pop_front() {
            return Err(e);
        }
        self.output.lock().configs.push(config.clone());
        Ok(Box::new(ScriptedOutput {
            log: Arc::clone(&self.output),
            failures: Arc::clone(&self.write_failures),
            writes: Arc::clone(&self.writes),
            delay: *self.write_delay.lock(),
        }))
    }

    fn probe(&self, uri: &str, _config: &InputConfig) -> Result<VideoMetadata> {
        Ok(metadata(uri))
    }
}

fn metadata(_uri: &str) -> VideoMetadata {
    VideoMetadata {
        descriptor: descriptor().with_time_base(time_base()),
        stream_index: 0,
        frame_count: None,
        duration: None,
        codec_name: "h264".to_string(),
    }
}

struct ScriptedInput {
    metadata: VideoMetadata,
    config: InputConfig,
    steps: VecDeque<Step>,
    reads: Arc<AtomicUsize>,
}

impl InputSession for ScriptedInput {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn read_frames(&mut self) -> Result<Option<Vec<Frame>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let (width, height) = self.config.output_size.unwrap_or((WIDTH, HEIGHT));
        match self.steps.pop_front() {
            Some(Step::Frame(pts)) => Ok(Some(vec![Frame::blank(
                width,
                height,
                self.config.output_format,
                Pts(pts),
                time_base(),
            )])),
            Some(Step::Corrupt) => Err(Error::decode("invalid NAL unit")),
            Some(Step::Drop) => Err(Error::transport("connection reset by peer")),
            Some(Step::Stall(duration)) => {
                thread::sleep(duration);
                Ok(Some(Vec::new()))
            }
            Some(Step::End) | None => Ok(None),
        }
    }
}

struct ScriptedOutput {
    log: Arc<Mutex<OutputLog>>,
    failures: Arc<Mutex<Vec<(usize, Error)>>>,
    writes: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl OutputSession for ScriptedOutput {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        let index = self.writes.fetch_add(1, Ordering::SeqCst);
        let failure = {
            let mut failures = self.failures.lock();
            failures
                .iter()
                .position(|(i, _)| *i == index)
                .map(|at| failures.remove(at).1)
        };
        if let Some(e) = failure {
            return Err(e);
        }
        self.log.lock().frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.log.lock().finished = true;
        Ok(())
    }
}
