/*!
    Encoder configuration types.
*/

use vio_transform::ScalingAlgorithm;
use vio_types::{CodecId, PixelFormat, Rational};

/// Bitrate used when none is configured, in bits per second.
pub const DEFAULT_BITRATE: u64 = 400_000;

/// Keyframe interval used when none is configured, in frames.
pub const DEFAULT_GOP: u32 = 12;

/**
    x264/x265 speed preset, passed through unchanged.

    Encoders without a `preset` option (openh264, native encoders) ignore it.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EncoderPreset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    #[default]
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl EncoderPreset {
    /// Fastest first.
    pub const ALL: [EncoderPreset; 9] = [
        Self::Ultrafast,
        Self::Superfast,
        Self::Veryfast,
        Self::Faster,
        Self::Fast,
        Self::Medium,
        Self::Slow,
        Self::Slower,
        Self::Veryslow,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|preset| preset.name() == name)
    }
}

impl std::fmt::Display for EncoderPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/**
    Everything [`VideoEncoder::new`](crate::VideoEncoder::new) needs to open
    an encoder.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoEncoderConfig {
    pub codec: CodecId,
    pub width: u32,
    pub height: u32,
    /// Nominal frames per second.
    pub frame_rate: Rational,
    /// Time base of packets produced by the encoder.
    pub time_base: Rational,
    /// Pixel format of frames handed to [`encode`](crate::VideoEncoder::encode).
    pub input_format: PixelFormat,
    /// Target bitrate in bits per second.
    pub bitrate: u64,
    /// Keyframe interval in frames.
    pub gop: u32,
    /// Maximum consecutive B-frames (None = encoder default).
    pub max_b_frames: Option<u32>,
    /// Encoder speed preset (None = encoder default).
    pub preset: Option<EncoderPreset>,
    /// Force a specific encoder implementation, for example `"libx264"`.
    pub encoder_name: Option<String>,
    /// Put codec headers in extradata instead of every keyframe, as MP4 and
    /// Matroska require.
    pub global_header: bool,
    pub algorithm: ScalingAlgorithm,
}

impl VideoEncoderConfig {
    /**
        Defaults: one tick per frame, YUV 4:2:0 input, [`DEFAULT_BITRATE`],
        [`DEFAULT_GOP`], encoder-chosen preset and B-frames.
    */
    pub fn new(codec: CodecId, width: u32, height: u32, frame_rate: Rational) -> Self {
        let time_base = if frame_rate.is_valid() {
            frame_rate.invert()
        } else {
            Rational::new(1, 90_000)
        };
        Self {
            codec,
            width,
            height,
            frame_rate,
            time_base,
            input_format: PixelFormat::Yuv420p,
            bitrate: DEFAULT_BITRATE,
            gop: DEFAULT_GOP,
            max_b_frames: None,
            preset: None,
            encoder_name: None,
            global_header: false,
            algorithm: ScalingAlgorithm::default(),
        }
    }

    pub fn h264(width: u32, height: u32, frame_rate: Rational) -> Self {
        Self::new(CodecId::H264, width, height, frame_rate)
    }

    pub fn h265(width: u32, height: u32, frame_rate: Rational) -> Self {
        Self::new(CodecId::H265, width, height, frame_rate)
    }

    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        self.time_base = time_base;
        self
    }

    /**
        Set the pixel format of incoming frames.
    */
    pub fn with_input_format(mut self, format: PixelFormat) -> Self {
        self.input_format = format;
        self
    }

    /// Bits per second.
    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn with_gop(mut self, frames: u32) -> Self {
        self.gop = frames;
        self
    }

    pub fn with_max_b_frames(mut self, frames: u32) -> Self {
        self.max_b_frames = Some(frames);
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

    pub fn with_global_header(mut self, global_header: bool) -> Self {
        self.global_header = global_header;
        self
    }

    pub fn with_algorithm(mut self, algorithm: ScalingAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }
}
