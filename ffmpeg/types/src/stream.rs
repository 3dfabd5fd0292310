/*!
    Stream descriptions.
*/

use std::time::Duration;

use crate::{CodecId, ContainerFormat, PixelFormat, Rational};

/**
    What a reader found in a source, or what a writer should produce.

    For readers, `width`, `height` and `pixel_format` describe the frames
    delivered to the caller (after conversion), while `codec` and `container`
    describe the compressed source.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub container: ContainerFormat,
    pub codec: CodecId,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    /// Bits per second, if known.
    pub bitrate: Option<u64>,
    pub pixel_format: PixelFormat,
    pub time_base: Rational,
}

impl StreamDescriptor {
    /**
        A descriptor for `codec` at `width`x`height` and `frame_rate` frames
        per second, in an MP4 container with YUV 4:2:0 frames and a time base
        of one tick per frame.
    */
    pub fn new(codec: CodecId, width: u32, height: u32, frame_rate: Rational) -> Self {
        let time_base = if frame_rate.is_valid() {
            frame_rate.invert()
        } else {
            Rational::new(1, 90_000)
        };
        Self {
            container: ContainerFormat::Mp4,
            codec,
            width,
            height,
            frame_rate,
            bitrate: None,
            pixel_format: PixelFormat::Yuv420p,
            time_base,
        }
    }

    pub fn with_container(mut self, container: ContainerFormat) -> Self {
        self.container = container;
        self
    }

    pub fn with_bitrate(mut self, bitrate: u64) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    pub fn with_time_base(mut self, time_base: Rational) -> Self {
        self.time_base = time_base;
        self
    }

    /**
        Frames per second as a float, or 0.0 if unknown.
    */
    pub fn fps(&self) -> f64 {
        self.frame_rate.to_f64()
    }

    /**
        Nominal distance between two frames in `time_base` ticks.

        Falls back to one tick when the frame rate is unknown.
    */
    pub fn frame_interval(&self) -> i64 {
        if !self.frame_rate.is_valid() || !self.time_base.is_valid() {
            return 1;
        }
        Rational::rescale(1, self.frame_rate.invert(), self.time_base).max(1)
    }

    /**
        Size in bytes of one delivered frame.
    */
    pub fn frame_size(&self) -> usize {
        self.pixel_format.frame_size(self.width, self.height)
    }
}

/**
    Encoded stream parameters handed from an encoder to a muxer.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoStreamInfo {
    pub codec: CodecId,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Rational,
    pub time_base: Rational,
    pub bitrate: Option<u64>,
    pub extradata: Option<Vec<u8>>,
    pub profile: Option<i32>,
    pub level: Option<i32>,
    pub duration: Option<Duration>,
    /// FFmpeg name of the pixel format the encoder emits, for example
    /// `"yuv420p"`. Muxers assume YUV 4:2:0 when it is missing.
    pub pixel_format_name: Option<String>,
}
