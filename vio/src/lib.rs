/*!
    Read and write video streams from files and network transports.

    `vio` hides demuxing, decoding, encoding and muxing behind two types:

    - [`StreamReader`] opens a file or an RTSP/RTP/SRTP/UDP/TCP URL and hands
      out decoded [`Frame`]s in presentation order.
    - [`StreamWriter`] takes frames, encodes them and writes a container file
      or feeds a network sink.

    Each open reader or writer owns one worker thread that makes every call
    into FFmpeg. The caller only ever waits on a small bounded queue, with an
    optional timeout. Network pipelines survive transport failures: the worker
    reconnects with backoff and timestamps continue where they left off.

    # Example

    ```no_run
    use vio::{ReaderOptions, StreamReader, StreamWriter, WriterOptions};

    let mut reader = StreamReader::open("rtsp://camera.local/live", ReaderOptions::default())?;
    let descriptor = reader.descriptor().clone().with_pixel_format(vio::PixelFormat::Rgb24);
    let mut writer = StreamWriter::open("recording.mkv", descriptor, WriterOptions::default())?;

    while let Some(frame) = reader.read_frame()? {
        writer.write_frame(frame)?;
    }
    writer.close()?;
    # Ok::<(), vio::Error>(())
    ```

    # Errors

    Every operation returns [`Error`]. Failures to open are `Resource`.
    `Timeout` is the only error after which the same call may simply be
    repeated; any other error from a reader ends its stream and is reported
    again by every later call.

    # Logging

    The crate logs through `tracing` and never installs a subscriber.
*/

mod buffer;
mod config;
mod engine;
mod ffmpeg;
mod location;
mod reader;
mod reconnect;
mod state;
mod timestamp;
mod worker;
mod writer;

pub use vio_decode::DecodeSupport;
pub use vio_encode::EncoderPreset;
pub use vio_types::{
    CodecId, ContainerFormat, Error, Frame, PixelFormat, PlaneLayout, Pts, Rational, Result,
    StreamDescriptor,
};

pub use buffer::FrameBuffer;
pub use config::{
    DEFAULT_BUFFER_CAPACITY, DEFAULT_CLOSE_GRACE_MS, DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_DECODE_ERROR_TOLERANCE, DEFAULT_DECODE_ERROR_WINDOW_MS, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_RECONNECT_BACKOFF_MS, DEFAULT_RECONNECT_MAX_ATTEMPTS, ReaderOptions, StreamOptions,
    WriterOptions,
};
pub use engine::{Engine, InputConfig, InputSession, OutputConfig, OutputSession, VideoMetadata};
pub use ffmpeg::FfmpegEngine;
pub use location::{Location, NetworkEndpoint, ReconnectPolicy, Transport};
pub use reader::StreamReader;
pub use reconnect::ReconnectionManager;
pub use state::PipelineState;
pub use worker::CancelToken;
pub use writer::StreamWriter;

/**
    Inspect a file or URL without opening a pipeline.
*/
pub fn probe(uri_or_path: &str) -> Result<VideoMetadata> {
    let options = StreamOptions::default();
    let location = Location::parse(uri_or_path, &options)?;
    let endpoint = location.endpoint();
    let config = InputConfig {
        output_format: PixelFormat::Rgb24,
        output_size: None,
        read_timeout: endpoint.and_then(|e| e.read_timeout()),
        connect_timeout: endpoint.and_then(|e| e.connect_timeout()),
        rtsp_transport: endpoint
            .filter(|e| e.transport() == Transport::Rtsp)
            .map(|_| "tcp".to_string()),
        decode_support: DecodeSupport::Software,
    };
    FfmpegEngine.probe(&location.uri(), &config)
}
