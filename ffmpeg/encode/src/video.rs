/*!
    Video encoder implementation.
*/

use ffmpeg_next::{
    Dictionary,
    codec::{self, Codec, encoder::Video as VideoEncoderFFmpeg},
    format::Pixel,
};
use tracing::debug;

use vio_source::convert::{codec_id_to_ffmpeg, is_again, pts_from_ffmpeg, rational_to_ffmpeg};
use vio_transform::{FormatConverter, NativeLayout, pixel_to_ffmpeg};
use vio_types::{Error, Frame, Packet, PixelFormat, Rational, Result, VideoStreamInfo};

use crate::config::VideoEncoderConfig;

/**
    Video encoder.

    Encodes packed frames into compressed packets. Frame timestamps are
    rescaled into the encoder time base and must strictly increase there.
*/
pub struct VideoEncoder {
    encoder: VideoEncoderFFmpeg,
    encoder_name: String,
    config: VideoEncoderConfig,
    converter: FormatConverter,
    last_pts: Option<i64>,
}

impl VideoEncoder {
    /**
        Create a new video encoder with the given configuration.

        Fails with `Resource` for codecs that cannot be encoded, odd frame
        dimensions, or when no encoder implementation can be opened.
    */
    pub fn new(config: VideoEncoderConfig) -> Result<Self> {
        if !config.codec.can_encode() {
            return Err(Error::resource(format!(
                "codec {} is not supported for encoding",
                config.codec
            )));
        }
        if config.width == 0 || config.height == 0 {
            return Err(Error::resource("frame dimensions must be non-zero"));
        }
        if config.width % 2 != 0 || config.height % 2 != 0 {
            return Err(Error::resource(format!(
                "frame dimensions {}x{} must be even",
                config.width, config.height
            )));
        }
        if !config.time_base.is_valid() {
            return Err(Error::resource(format!("invalid time base {}", config.time_base)));
        }

        vio_source::init()?;

        let mut last_error = None;
        for codec in candidates(&config)? {
            match open_encoder(codec, &config) {
                Ok((encoder, native_format)) => {
                    let input = NativeLayout::new(
                        pixel_to_ffmpeg(config.input_format)?,
                        config.width,
                        config.height,
                    );
                    let output = NativeLayout::new(native_format, config.width, config.height);
                    let converter = FormatConverter::new(input, output, config.algorithm)?;

                    debug!(
                        encoder = codec.name(),
                        width = config.width,
                        height = config.height,
                        bitrate = config.bitrate,
                        gop = config.gop,
                        "encoder opened"
                    );

                    return Ok(Self {
                        encoder,
                        encoder_name: codec.name().to_string(),
                        config,
                        converter,
                        last_pts: None,
                    });
                }
                Err(e) => {
                    debug!(encoder = codec.name(), error = %e, "encoder did not open");
                    last_error = Some(e);
                }
            }
        }

        Err(Error::resource(match last_error {
            Some(e) => format!("no {} encoder could be opened: {e}", config.codec),
            None => format!("no {} encoder available", config.codec),
        }))
    }

    /**
        Name of the encoder implementation in use, for example `"libx264"`.
    */
    pub fn encoder_name(&self) -> &str {
        &self.encoder_name
    }

    /**
        Get the time base for encoded packets.
    */
    pub fn time_base(&self) -> Rational {
        self.config.time_base
    }

    /**
        Get stream info for the muxer.
    */
    pub fn stream_info(&self) -> VideoStreamInfo {
        // SAFETY: the codec context is owned by the opened encoder and the
        // extradata buffer lives as long as it does.
        let extradata = unsafe {
            let ptr = self.encoder.as_ptr();
            if (*ptr).extradata_size > 0 && !(*ptr).extradata.is_null() {
                let slice =
                    std::slice::from_raw_parts((*ptr).extradata, (*ptr).extradata_size as usize);
                Some(slice.to_vec())
            } else {
                None
            }
        };

        VideoStreamInfo {
            codec: self.config.codec,
            width: self.config.width,
            height: self.config.height,
            frame_rate: self.config.frame_rate,
            time_base: self.config.time_base,
            bitrate: Some(self.config.bitrate),
            extradata,
            profile: None,
            level: None,
            duration: None,
            pixel_format_name: self
                .converter
                .output()
                .format
                .descriptor()
                .map(|d| d.name().to_string()),
        }
    }

    /**
        Encode a video frame, returning encoded packets.

        May return zero, one, or multiple packets depending on encoder
        buffering. Frames with the wrong geometry or a timestamp that does not
        advance are rejected with `Encode` and leave the encoder untouched.
    */
    pub fn encode(&mut self, frame: &Frame) -> Result<Vec<Packet>> {
        if frame.width != self.config.width
            || frame.height != self.config.height
            || frame.format != self.config.input_format
        {
            return Err(Error::encode(format!(
                "frame is {}x{} {}, encoder expects {}x{} {}",
                frame.width,
                frame.height,
                frame.format,
                self.config.width,
                self.config.height,
                self.config.input_format
            )));
        }

        let pts = Rational::rescale(frame.pts.0, frame.time_base, self.config.time_base);
        if let Some(last) = self.last_pts {
            if pts <= last {
                return Err(Error::encode(format!(
                    "timestamp {pts} does not advance past {last} in time base {}",
                    self.config.time_base
                )));
            }
        }

        let mut native = self.converter.to_native(frame)?;
        native.set_pts(Some(pts));

        let mut packets = Vec::new();
        match self.encoder.send_frame(&native) {
            Ok(()) => {}
            Err(e) if is_again(&e) => {
                packets.extend(self.receive_packets()?);
                self.encoder
                    .send_frame(&native)
                    .map_err(|e| Error::encode(e.to_string()))?;
            }
            Err(e) => return Err(Error::encode(e.to_string())),
        }
        self.last_pts = Some(pts);

        packets.extend(self.receive_packets()?);
        Ok(packets)
    }

    /**
        Flush the encoder to get any remaining buffered packets.

        Call this at end of stream.
    */
    pub fn flush(&mut self) -> Result<Vec<Packet>> {
        match self.encoder.send_eof() {
            Ok(()) | Err(ffmpeg_next::Error::Eof) => {}
            Err(e) => return Err(Error::encode(e.to_string())),
        }

        self.receive_packets()
    }

    fn receive_packets(&mut self) -> Result<Vec<Packet>> {
        let mut packets = Vec::new();
        let mut encoded = ffmpeg_next::Packet::empty();

        loop {
            match self.encoder.receive_packet(&mut encoded) {
                Ok(()) => packets.push(Packet::new(
                    encoded.data().map(|d| d.to_vec()).unwrap_or_default(),
                    pts_from_ffmpeg(encoded.pts()),
                    pts_from_ffmpeg(encoded.dts()),
                    encoded.duration(),
                    self.config.time_base,
                    0,
                    encoded.is_key(),
                )),
                Err(ffmpeg_next::Error::Eof) => break,
                Err(e) if is_again(&e) => break,
                Err(e) => return Err(Error::encode(e.to_string())),
            }
        }

        Ok(packets)
    }
}

/**
    Encoder implementations to try for `config`, most preferred first.
*/
fn candidates(config: &VideoEncoderConfig) -> Result<Vec<Codec>> {
    if let Some(name) = &config.encoder_name {
        let codec = ffmpeg_next::encoder::find_by_name(name)
            .ok_or_else(|| Error::resource(format!("encoder {name} not found")))?;
        return Ok(vec![codec]);
    }

    let mut found: Vec<Codec> = Vec::new();
    for name in config.codec.encoder_preference() {
        let codec = if *name == config.codec.name() {
            ffmpeg_next::encoder::find(codec_id_to_ffmpeg(config.codec))
        } else {
            ffmpeg_next::encoder::find_by_name(name)
        };
        if let Some(codec) = codec {
            if !found.iter().any(|c| c.name() == codec.name()) {
                found.push(codec);
            }
        }
    }
    Ok(found)
}

fn open_encoder(codec: Codec, config: &VideoEncoderConfig) -> Result<(VideoEncoderFFmpeg, Pixel)> {
    let native_format = preferred_format(codec)?;

    let mut encoder = codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()
        .map_err(|e| Error::resource(e.to_string()))?;

    encoder.set_width(config.width);
    encoder.set_height(config.height);
    encoder.set_format(native_format);
    encoder.set_frame_rate(Some(rational_to_ffmpeg(config.frame_rate)));
    encoder.set_time_base(rational_to_ffmpeg(config.time_base));
    encoder.set_bit_rate(config.bitrate as usize);
    encoder.set_gop(config.gop);
    if let Some(frames) = config.max_b_frames {
        encoder.set_max_b_frames(frames as usize);
    }
    if config.global_header {
        encoder.set_flags(codec::Flags::GLOBAL_HEADER);
    }

    let mut opts = Dictionary::new();
    if let Some(preset) = config.preset {
        opts.set("preset", preset.name());
    }

    let encoder = encoder
        .open_with(opts)
        .map_err(|e| Error::resource(format!("failed to open encoder: {e}")))?;

    Ok((encoder, native_format))
}

/**
    YUV 4:2:0 if the encoder takes it, else its first supported format.
*/
fn preferred_format(codec: Codec) -> Result<Pixel> {
    let yuv420p = pixel_to_ffmpeg(PixelFormat::Yuv420p)?;
    let supported: Vec<Pixel> = codec
        .video()
        .ok()
        .and_then(|video| video.formats().map(|formats| formats.collect()))
        .unwrap_or_default();

    if supported.is_empty() || supported.contains(&yuv420p) {
        return Ok(yuv420p);
    }
    Ok(supported[0])
}

impl std::fmt::Debug for VideoEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoEncoder")
            .field("encoder", &self.encoder_name)
            .field("width", &self.config.width)
            .field("height", &self.config.height)
            .field("time_base", &self.config.time_base)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vio_types::{CodecId, Pts};

    fn h264_encoder(width: u32, height: u32) -> Option<VideoEncoder> {
        let config = VideoEncoderConfig::h264(width, height, Rational::new(4, 1))
            .with_input_format(PixelFormat::Rgb24);
        match VideoEncoder::new(config) {
            Ok(encoder) => Some(encoder),
            Err(e) => {
                eprintln!("skipping: no H.264 encoder ({e})");
                None
            }
        }
    }

    fn gray_frame(width: u32, height: u32, pts: i64) -> Frame {
        Frame::blank(width, height, PixelFormat::Rgb24, Pts(pts), Rational::new(1, 4))
    }

    #[test]
    fn odd_dimensions_are_rejected() {
        let config = VideoEncoderConfig::h264(641, 480, Rational::new(4, 1));
        let err = VideoEncoder::new(config).unwrap_err();
        assert!(matches!(err, Error::Resource(msg) if msg.contains("even")));
    }

    #[test]
    fn decode_only_codecs_are_rejected() {
        let config = VideoEncoderConfig::new(CodecId::Mjpeg, 64, 64, Rational::new(4, 1));
        assert!(matches!(VideoEncoder::new(config), Err(Error::Resource(_))));
    }

    #[test]
    fn every_frame_becomes_a_packet() {
        let Some(mut encoder) = h264_encoder(64, 48) else {
            return;
        };

        let mut packets = Vec::new();
        for pts in 0..8 {
            packets.extend(encoder.encode(&gray_frame(64, 48, pts)).unwrap());
        }
        packets.extend(encoder.flush().unwrap());

        assert_eq!(packets.len(), 8);
        assert!(packets[0].is_keyframe);
        assert!(packets.iter().all(|p| p.time_base == Rational::new(1, 4)));
        assert!(encoder.stream_info().width == 64);
    }

    #[test]
    fn stream_info_names_the_native_format() {
        let Some(encoder) = h264_encoder(64, 48) else {
            return;
        };

        let info = encoder.stream_info();
        assert_eq!(info.pixel_format_name.as_deref(), Some("yuv420p"));
        assert_eq!((info.width, info.height), (64, 48));
    }

    #[test]
    fn non_increasing_timestamps_are_rejected() {
        let Some(mut encoder) = h264_encoder(32, 32) else {
            return;
        };

        encoder.encode(&gray_frame(32, 32, 5)).unwrap();
        let err = encoder.encode(&gray_frame(32, 32, 5)).unwrap_err();
        assert!(matches!(err, Error::Encode(_)));

        // The rejected frame did not poison the encoder
        encoder.encode(&gray_frame(32, 32, 6)).unwrap();
    }

    #[test]
    fn mismatched_frames_are_rejected() {
        let Some(mut encoder) = h264_encoder(32, 32) else {
            return;
        };

        let err = encoder.encode(&gray_frame(64, 32, 0)).unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }
}
