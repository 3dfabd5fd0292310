/*!
    Pipeline configuration.

    [`StreamOptions`] holds the knobs shared by readers and writers and can be
    loaded from JSON. [`ReaderOptions`] and [`WriterOptions`] wrap it and add
    what only one side needs.
*/

use std::time::Duration;

use serde::{Deserialize, Serialize};

use vio_decode::DecodeSupport;
use vio_encode::EncoderPreset;
use vio_types::{ContainerFormat, Error, PixelFormat, Result};

pub const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_RECONNECT_BACKOFF_MS: [u64; 4] = [250, 500, 1000, 2000];
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_BUFFER_CAPACITY: usize = 8;
pub const DEFAULT_DECODE_ERROR_TOLERANCE: u32 = 5;
pub const DEFAULT_DECODE_ERROR_WINDOW_MS: u64 = 10_000;
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 5_000;

/**
    Options shared by every pipeline.

    Timeouts of zero disable the corresponding limit.

    ```
    let options = vio::StreamOptions::from_json(r#"{ "buffer_capacity": 16 }"#).unwrap();
    assert_eq!(options.buffer_capacity, 16);
    assert_eq!(options.reconnect_max_attempts, 3);
    ```
*/
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StreamOptions {
    /// Re-open attempts after a network failure before giving up.
    pub reconnect_max_attempts: u32,
    /// Wait before each re-open attempt. The last entry repeats.
    pub reconnect_backoff_ms: Vec<u64>,
    /// Bound on a single blocking network read or write.
    pub read_timeout_ms: u64,
    /// Bound on establishing a network session.
    pub connect_timeout_ms: u64,
    /// Frames held between the worker and the caller.
    pub buffer_capacity: usize,
    /// Consecutive decode failures that end a stream.
    pub decode_error_tolerance: u32,
    /// Failures older than this no longer count towards the tolerance.
    pub decode_error_window_ms: u64,
    /// How long `close` waits for the worker before detaching it.
    pub close_grace_ms: u64,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            reconnect_max_attempts: DEFAULT_RECONNECT_MAX_ATTEMPTS,
            reconnect_backoff_ms: DEFAULT_RECONNECT_BACKOFF_MS.to_vec(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            decode_error_tolerance: DEFAULT_DECODE_ERROR_TOLERANCE,
            decode_error_window_ms: DEFAULT_DECODE_ERROR_WINDOW_MS,
            close_grace_ms: DEFAULT_CLOSE_GRACE_MS,
        }
    }
}

impl StreamOptions {
    /**
        Parse options from JSON. Missing keys take their defaults; unknown
        keys are rejected.
    */
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| Error::resource(format!("invalid stream options: {e}")))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(Error::resource("buffer_capacity must be at least 1"));
        }
        if self.decode_error_tolerance == 0 {
            return Err(Error::resource("decode_error_tolerance must be at least 1"));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.read_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Vec<Duration> {
        self.reconnect_backoff_ms
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect()
    }

    pub fn decode_error_window(&self) -> Duration {
        Duration::from_millis(self.decode_error_window_ms)
    }

    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    pub fn with_reconnect_max_attempts(mut self, attempts: u32) -> Self {
        self.reconnect_max_attempts = attempts;
        self
    }

    pub fn with_reconnect_backoff(mut self, backoff: impl IntoIterator<Item = Duration>) -> Self {
        self.reconnect_backoff_ms = backoff
            .into_iter()
            .map(|d| d.as_millis() as u64)
            .collect();
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_decode_error_tolerance(mut self, tolerance: u32) -> Self {
        self.decode_error_tolerance = tolerance;
        self
    }

    pub fn with_decode_error_window(mut self, window: Duration) -> Self {
        self.decode_error_window_ms = window.as_millis() as u64;
        self
    }

    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace_ms = grace.as_millis() as u64;
        self
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/**
    Options for [`StreamReader`](crate::StreamReader).
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReaderOptions {
    pub stream: StreamOptions,
    /// Pixel format of delivered frames.
    pub output_format: PixelFormat,
    /// Size of delivered frames, or the source size if `None`.
    pub output_size: Option<(u32, u32)>,
    /// RTSP lower transport. RTSP sources use `"tcp"` unless told otherwise.
    pub rtsp_transport: Option<String>,
    /// Software unless hardware decoding is asked for.
    pub decode_support: DecodeSupport,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            stream: StreamOptions::default(),
            output_format: PixelFormat::Rgb24,
            output_size: None,
            rtsp_transport: None,
            decode_support: DecodeSupport::Software,
        }
    }
}

impl ReaderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream_options(mut self, stream: StreamOptions) -> Self {
        self.stream = stream;
        self
    }

    /**
        Set the pixel format frames are delivered in.
    */
    pub fn with_output_format(mut self, format: PixelFormat) -> Self {
        self.output_format = format;
        self
    }

    /**
        Scale delivered frames to the given size.
    */
    pub fn with_output_size(mut self, width: u32, height: u32) -> Self {
        self.output_size = Some((width, height));
        self
    }

    pub fn with_rtsp_transport(mut self, transport: impl Into<String>) -> Self {
        self.rtsp_transport = Some(transport.into());
        self
    }

    /**
        Decode on a hardware device when one is available. Sources fall back
        to software decoding otherwise.
    */
    pub fn with_decode_support(mut self, decode_support: DecodeSupport) -> Self {
        self.decode_support = decode_support;
        self
    }
}

/**
    Options for [`StreamWriter`](crate::StreamWriter).
*/
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriterOptions {
    pub stream: StreamOptions,
    /// Container to write. Deduced from the destination when `None`: the file
    /// extension (falling back to MP4), or the transport for network sinks.
    pub container: Option<ContainerFormat>,
    /// Keyframe interval in frames (None = 12).
    pub gop: Option<u32>,
    pub preset: Option<EncoderPreset>,
    /// Force a specific encoder implementation, for example `"libx264"`.
    pub encoder_name: Option<String>,
    /// Frames presented at or after this point are rejected.
    pub max_duration: Option<Duration>,
    pub rtsp_transport: Option<String>,
}

impl WriterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream_options(mut self, stream: StreamOptions) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_container(mut self, container: ContainerFormat) -> Self {
        self.container = Some(container);
        self
    }

    /**
        Set the keyframe interval in frames.
    */
    pub fn with_gop(mut self, frames: u32) -> Self {
        self.gop = Some(frames);
        self
    }

    pub fn with_preset(mut self, preset: EncoderPreset) -> Self {
        self.preset = Some(preset);
        self
    }

    pub fn with_encoder_name(mut self, name: impl Into<String>) -> Self {
        self.encoder_name = Some(name.into());
        self
    }

    /**
        Limit the length of the written stream.
    */
    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    pub fn with_rtsp_transport(mut self, transport: impl Into<String>) -> Self {
        self.rtsp_transport = Some(transport.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let options = StreamOptions::default();
        assert_eq!(options.reconnect_max_attempts, 3);
        assert_eq!(options.reconnect_backoff_ms, vec![250, 500, 1000, 2000]);
        assert_eq!(options.read_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(options.buffer_capacity, 8);
        assert_eq!(options.decode_error_tolerance, 5);
        assert_eq!(options.decode_error_window(), Duration::from_secs(10));
        assert_eq!(options.close_grace(), Duration::from_secs(5));

        let reader = ReaderOptions::default();
        assert_eq!(reader.output_format, PixelFormat::Rgb24);
        assert!(reader.output_size.is_none());
    }

    #[test]
    fn json_fills_in_defaults() {
        let options =
            StreamOptions::from_json(r#"{"reconnect_backoff_ms": [10, 20], "read_timeout_ms": 0}"#)
                .unwrap();
        assert_eq!(
            options.reconnect_backoff(),
            vec![Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert_eq!(options.read_timeout(), None);
        assert_eq!(options.buffer_capacity, DEFAULT_BUFFER_CAPACITY);
    }

    #[test]
    fn json_rejects_unknown_keys() {
        let err = StreamOptions::from_json(r#"{"buffer_size": 4}"#).unwrap_err();
        assert!(matches!(err, Error::Resource(ref msg) if msg.contains("buffer_size")), "{err}");
    }

    #[test]
    fn json_rejects_zero_capacity() {
        assert!(StreamOptions::from_json(r#"{"buffer_capacity": 0}"#).is_err());
    }

    #[test]
    fn builders() {
        let options = StreamOptions::default()
            .with_reconnect_backoff([Duration::from_millis(5)])
            .with_buffer_capacity(2)
            .with_close_grace(Duration::from_millis(100));
        assert_eq!(options.reconnect_backoff_ms, vec![5]);
        assert_eq!(options.buffer_capacity, 2);
        assert_eq!(options.close_grace_ms, 100);

        let writer = WriterOptions::new()
            .with_gop(30)
            .with_max_duration(Duration::from_secs(10))
            .with_container(ContainerFormat::Matroska);
        assert_eq!(writer.gop, Some(30));
        assert_eq!(writer.container, Some(ContainerFormat::Matroska));
    }
}
