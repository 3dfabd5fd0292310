/*!
    Video decoder implementation.
*/

use ffmpeg_next::{
    codec::{self, decoder::Video as VideoDecoderFFmpeg},
    format::Pixel,
    util::frame::video::Video as VideoFrameFFmpeg,
};
use tracing::warn;

use vio_source::CodecConfig;
use vio_source::convert::is_again;
use vio_transform::{FormatConverter, NativeLayout, ScalingAlgorithm, pixel_to_ffmpeg};
use vio_types::{Error, Frame, Packet, PixelFormat, Pts, Rational, Result};

use crate::hardware::{self, DecodeSupport};

/**
    What the decoder should hand back.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoDecoderConfig {
    /// Pixel format of delivered frames.
    pub output_format: PixelFormat,
    /// Size of delivered frames, or the coded size if `None`.
    pub output_size: Option<(u32, u32)>,
    /// Nominal frame rate, used to fill in missing timestamps.
    pub frame_rate: Rational,
    pub algorithm: ScalingAlgorithm,
    pub decode_support: DecodeSupport,
}

impl VideoDecoderConfig {
    pub fn new(output_format: PixelFormat) -> Self {
        Self {
            output_format,
            output_size: None,
            frame_rate: Rational::new(0, 1),
            algorithm: ScalingAlgorithm::default(),
            decode_support: DecodeSupport::default(),
        }
    }

    pub fn with_output_size(mut self, width: u32, height: u32) -> Self {
        self.output_size = Some((width, height));
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: Rational) -> Self {
        self.frame_rate = frame_rate;
        self
    }

    pub fn with_algorithm(mut self, algorithm: ScalingAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_decode_support(mut self, decode_support: DecodeSupport) -> Self {
        self.decode_support = decode_support;
        self
    }
}

/**
    Video decoder.

    Decodes packets of one stream into frames in the configured output
    format. Frames come out in decoder order, which for streams with B-frames
    may differ from presentation order at reconnect or flush boundaries;
    callers that need strictly ordered timestamps reorder downstream.
*/
pub struct VideoDecoder {
    decoder: VideoDecoderFFmpeg,
    time_base: Rational,
    output: NativeLayout,
    algorithm: ScalingAlgorithm,
    converter: Option<FormatConverter>,
    /// Hardware device type in use, if any.
    device: Option<&'static str>,
    frame_interval: i64,
    next_pts: i64,
}

impl VideoDecoder {
    /**
        Open a decoder for the stream described by `codec_config`.

        When the stream announces its native pixel format, the conversion to
        the output format is negotiated here and an impossible conversion is
        reported as `Resource`. Otherwise it is negotiated on the first frame.

        With [`DecodeSupport::Hardware`] the decoder runs on the first device
        the codec supports, or in software if there is none.
    */
    pub fn new(
        codec_config: &CodecConfig,
        time_base: Rational,
        config: VideoDecoderConfig,
    ) -> Result<Self> {
        vio_source::init()?;

        let mut ctx = codec::context::Context::from_parameters(codec_config.parameters().clone())
            .map_err(|e| Error::resource(format!("cannot open decoder: {e}")))?;
        let device = match config.decode_support {
            DecodeSupport::Hardware => hardware::attach_device(&mut ctx),
            DecodeSupport::Software => None,
        };
        let decoder = ctx
            .decoder()
            .video()
            .map_err(|e| Error::resource(format!("cannot open decoder: {e}")))?;

        let (width, height) = config
            .output_size
            .unwrap_or((decoder.width(), decoder.height()));
        if width == 0 || height == 0 {
            return Err(Error::resource("decoder output has zero dimensions"));
        }
        let output = NativeLayout::new(pixel_to_ffmpeg(config.output_format)?, width, height);

        // Hardware surfaces only reveal their software format once downloaded
        let converter = if device.is_none() && decoder.format() != Pixel::None {
            let input = NativeLayout::new(decoder.format(), decoder.width(), decoder.height());
            Some(FormatConverter::new(input, output, config.algorithm)?)
        } else {
            None
        };

        let frame_interval = if config.frame_rate.is_valid() && time_base.is_valid() {
            Rational::rescale(1, config.frame_rate.invert(), time_base).max(1)
        } else {
            1
        };

        Ok(Self {
            decoder,
            time_base,
            output,
            algorithm: config.algorithm,
            converter,
            device,
            frame_interval,
            next_pts: 0,
        })
    }

    /**
        Get the time base of decoded frame timestamps.
    */
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /**
        How frames are actually being decoded.
    */
    pub fn decode_support(&self) -> DecodeSupport {
        match self.device {
            Some(_) => DecodeSupport::Hardware,
            None => DecodeSupport::Software,
        }
    }

    /**
        Hardware device type in use, for example `"vaapi"`.
    */
    pub fn hardware_device(&self) -> Option<&str> {
        self.device
    }

    /**
        Decode a packet, returning decoded frames.

        May return zero, one, or multiple frames depending on codec buffering.
        A packet the codec rejects is reported as `Decode`.
    */
    pub fn decode(&mut self, packet: &Packet) -> Result<Vec<Frame>> {
        let mut ffmpeg_pkt = if packet.data.is_empty() {
            ffmpeg_next::Packet::empty()
        } else {
            ffmpeg_next::Packet::copy(&packet.data)
        };
        ffmpeg_pkt.set_pts(packet.pts.map(|p| p.0));
        ffmpeg_pkt.set_dts(packet.dts.map(|p| p.0));
        ffmpeg_pkt.set_duration(packet.duration);
        if packet.is_keyframe {
            ffmpeg_pkt.set_flags(ffmpeg_next::packet::Flags::KEY);
        }

        // EAGAIN means the decoder is full: drain frames, then retry once
        match self.decoder.send_packet(&ffmpeg_pkt) {
            Ok(()) => {}
            Err(e) if is_again(&e) => {
                let mut frames = self.receive_frames()?;
                match self.decoder.send_packet(&ffmpeg_pkt) {
                    Ok(()) => frames.extend(self.receive_frames()?),
                    Err(e) if is_again(&e) => {}
                    Err(e) => return Err(Error::decode(e.to_string())),
                }
                return Ok(frames);
            }
            Err(e) => return Err(Error::decode(e.to_string())),
        }

        self.receive_frames()
    }

    /**
        Flush the decoder to get any remaining buffered frames.

        Call this at end of stream.
    */
    pub fn flush(&mut self) -> Result<Vec<Frame>> {
        let mut frames = self.receive_frames()?;

        match self.decoder.send_eof() {
            Ok(()) | Err(ffmpeg_next::Error::Eof) => {}
            Err(e) if is_again(&e) => {
                frames.extend(self.receive_frames()?);
                let _ = self.decoder.send_eof();
            }
            Err(e) => return Err(Error::decode(e.to_string())),
        }

        frames.extend(self.receive_frames()?);
        Ok(frames)
    }

    /**
        Discard buffered frames, for example after the input was re-opened.
    */
    pub fn reset(&mut self) {
        self.decoder.flush();
    }

    fn receive_frames(&mut self) -> Result<Vec<Frame>> {
        let mut frames = Vec::new();
        let mut decoded = VideoFrameFFmpeg::empty();

        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => frames.push(self.convert_frame(&decoded)?),
                Err(ffmpeg_next::Error::Eof) => break,
                Err(e) if is_again(&e) => break,
                Err(e) => {
                    // Frames already decoded are still good
                    if frames.is_empty() {
                        return Err(Error::decode(e.to_string()));
                    }
                    warn!(error = %e, kept = frames.len(), "decoder failed after partial output");
                    break;
                }
            }
        }

        Ok(frames)
    }

    fn convert_frame(&mut self, decoded: &VideoFrameFFmpeg) -> Result<Frame> {
        let pts = match decoded.timestamp().or(decoded.pts()) {
            Some(pts) => pts,
            None => self.next_pts,
        };
        self.next_pts = pts + self.frame_interval;

        let downloaded;
        let source = if hardware::is_hardware_frame(decoded) {
            downloaded = hardware::download(decoded)?;
            &downloaded
        } else {
            decoded
        };

        let layout = NativeLayout::of(source);
        let converter = match &mut self.converter {
            Some(converter) if converter.input() == layout => converter,
            slot => slot.insert(FormatConverter::new(layout, self.output, self.algorithm)?),
        };

        converter.to_frame(source, Pts(pts), self.time_base)
    }
}

impl std::fmt::Debug for VideoDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoDecoder")
            .field("time_base", &self.time_base)
            .field("output", &self.output)
            .field("converter", &self.converter)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}
