/*!
    The seam between pipelines and the native media engine.

    Readers and writers never touch FFmpeg directly. They ask an [`Engine`] for
    sessions and drive them from their worker thread. [`FfmpegEngine`] is the
    production engine; tests plug in scripted ones.

    [`FfmpegEngine`]: crate::FfmpegEngine
*/

use std::time::Duration;

use vio_decode::DecodeSupport;
use vio_encode::EncoderPreset;
use vio_types::{Frame, PixelFormat, Result, StreamDescriptor};

/**
    What probing a source found out.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoMetadata {
    /// The source stream as stored: codec, size, rate, native pixel format.
    pub descriptor: StreamDescriptor,
    pub stream_index: usize,
    /// Recorded frame count, or `duration * fps` rounded.
    pub frame_count: Option<u64>,
    pub duration: Option<Duration>,
    /// Native decoder name, for example `"h264"`.
    pub codec_name: String,
}

/**
    How an input session should decode.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputConfig {
    pub output_format: PixelFormat,
    pub output_size: Option<(u32, u32)>,
    pub read_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub rtsp_transport: Option<String>,
    pub decode_support: DecodeSupport,
}

/**
    How an output session should encode and mux.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputConfig {
    /// Stream to produce. Its pixel format is the one of incoming frames.
    pub descriptor: StreamDescriptor,
    pub gop: u32,
    pub preset: Option<EncoderPreset>,
    pub encoder_name: Option<String>,
    pub write_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub rtsp_transport: Option<String>,
}

/**
    An open source: demuxer and decoder of one video stream.
*/
pub trait InputSession {
    fn metadata(&self) -> &VideoMetadata;

    /**
        Read and decode the next chunk of input.

        Returns the frames it produced, possibly none, or `None` once the
        input is exhausted and the decoder flushed. A packet that fails to
        decode is reported as `Decode` and the session stays usable.
    */
    fn read_frames(&mut self) -> Result<Option<Vec<Frame>>>;
}

/**
    An open sink: encoder and muxer of one video stream.
*/
pub trait OutputSession {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /**
        Flush the encoder and finalize the container.
    */
    fn finish(&mut self) -> Result<()>;
}

/**
    Factory of sessions.

    Sessions are created, used and dropped on the pipeline's worker thread.
    Transport failures must be reported as `Transport` so network pipelines
    can recover from them.
*/
pub trait Engine: Send + Sync {
    fn open_input(&self, uri: &str, config: &InputConfig) -> Result<Box<dyn InputSession>>;

    fn open_output(&self, uri: &str, config: &OutputConfig) -> Result<Box<dyn OutputSession>>;

    fn probe(&self, uri: &str, config: &InputConfig) -> Result<VideoMetadata>;
}
