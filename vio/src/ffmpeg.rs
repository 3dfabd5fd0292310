/*!
    FFmpeg-backed engine.
*/

use vio_decode::{VideoDecoder, VideoDecoderConfig};
use vio_encode::{DEFAULT_BITRATE, VideoEncoder, VideoEncoderConfig};
use vio_sink::{Sink, SinkOptions};
use vio_source::{Source, SourceInfo, SourceOptions};
use vio_types::{Frame, PixelFormat, Result, StreamDescriptor};

use crate::engine::{Engine, InputConfig, InputSession, OutputConfig, OutputSession, VideoMetadata};

/**
    The engine used by [`StreamReader::open`](crate::StreamReader::open) and
    [`StreamWriter::open`](crate::StreamWriter::open).
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegEngine;

impl Engine for FfmpegEngine {
    fn open_input(&self, uri: &str, config: &InputConfig) -> Result<Box<dyn InputSession>> {
        Ok(Box::new(FfmpegInput::open(uri, config)?))
    }

    fn open_output(&self, uri: &str, config: &OutputConfig) -> Result<Box<dyn OutputSession>> {
        Ok(Box::new(FfmpegOutput::open(uri, config)?))
    }

    fn probe(&self, uri: &str, config: &InputConfig) -> Result<VideoMetadata> {
        let info = vio_source::probe(uri, &source_options(config))?;
        Ok(metadata_from_info(&info))
    }
}

fn source_options(config: &InputConfig) -> SourceOptions {
    SourceOptions {
        read_timeout: config.read_timeout,
        connect_timeout: config.connect_timeout,
        rtsp_transport: config.rtsp_transport.clone(),
        extra: Vec::new(),
    }
}

fn metadata_from_info(info: &SourceInfo) -> VideoMetadata {
    let mut descriptor = StreamDescriptor::new(info.codec, info.width, info.height, info.frame_rate)
        .with_container(info.container)
        .with_pixel_format(native_pixel_format(&info.pixel_format_name))
        .with_time_base(info.time_base);
    if let Some(bitrate) = info.bitrate {
        descriptor = descriptor.with_bitrate(bitrate);
    }

    VideoMetadata {
        descriptor,
        stream_index: info.stream_index,
        frame_count: info.frame_count(),
        duration: info.duration,
        codec_name: info.codec_name.clone(),
    }
}

/// Closest caller-facing format to a native one, for reporting.
fn native_pixel_format(name: &str) -> PixelFormat {
    match name {
        "nv12" => PixelFormat::Nv12,
        "yuv422p" | "yuvj422p" => PixelFormat::Yuv422p,
        "yuv444p" | "yuvj444p" => PixelFormat::Yuv444p,
        "yuv420p10le" => PixelFormat::Yuv420p10,
        "p010le" => PixelFormat::P010le,
        "gray" => PixelFormat::Gray8,
        "rgb24" => PixelFormat::Rgb24,
        "bgr24" => PixelFormat::Bgr24,
        "rgba" => PixelFormat::Rgba,
        "bgra" => PixelFormat::Bgra,
        _ => PixelFormat::Yuv420p,
    }
}

struct FfmpegInput {
    source: Source,
    decoder: VideoDecoder,
    metadata: VideoMetadata,
    exhausted: bool,
}

impl FfmpegInput {
    fn open(uri: &str, config: &InputConfig) -> Result<Self> {
        let source = Source::open(uri, &source_options(config))?;

        let mut decoder_config = VideoDecoderConfig::new(config.output_format)
            .with_frame_rate(source.info().frame_rate)
            .with_decode_support(config.decode_support);
        if let Some((width, height)) = config.output_size {
            decoder_config = decoder_config.with_output_size(width, height);
        }
        let decoder = VideoDecoder::new(source.codec_config(), source.time_base(), decoder_config)?;

        let metadata = metadata_from_info(source.info());
        Ok(Self {
            source,
            decoder,
            metadata,
            exhausted: false,
        })
    }
}

impl InputSession for FfmpegInput {
    fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    fn read_frames(&mut self) -> Result<Option<Vec<Frame>>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.source.next_packet()? {
            Some(packet) => self.decoder.decode(&packet).map(Some),
            None => {
                self.exhausted = true;
                self.decoder.flush().map(Some)
            }
        }
    }
}

struct FfmpegOutput {
    encoder: VideoEncoder,
    sink: Sink,
}

impl FfmpegOutput {
    fn open(uri: &str, config: &OutputConfig) -> Result<Self> {
        let descriptor = &config.descriptor;
        let mut sink = Sink::open(
            uri,
            descriptor.container,
            &SinkOptions {
                write_timeout: config.write_timeout,
                connect_timeout: config.connect_timeout,
                rtsp_transport: config.rtsp_transport.clone(),
                extra: Vec::new(),
            },
        )?;

        let mut encoder_config = VideoEncoderConfig::new(
            descriptor.codec,
            descriptor.width,
            descriptor.height,
            descriptor.frame_rate,
        )
        .with_time_base(descriptor.time_base)
        .with_input_format(descriptor.pixel_format)
        .with_bitrate(descriptor.bitrate.unwrap_or(DEFAULT_BITRATE))
        .with_gop(config.gop)
        .with_global_header(sink.global_header());
        if let Some(preset) = config.preset {
            encoder_config = encoder_config.with_preset(preset);
        }
        if let Some(name) = &config.encoder_name {
            encoder_config = encoder_config.with_encoder_name(name.as_str());
        }
        let encoder = VideoEncoder::new(encoder_config)?;

        sink.add_video_stream(&encoder.stream_info())?;

        Ok(Self { encoder, sink })
    }
}

impl OutputSession for FfmpegOutput {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        for packet in self.encoder.encode(frame)? {
            self.sink.write(&packet)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        for packet in self.encoder.flush()? {
            self.sink.write(&packet)?;
        }
        self.sink.finish()
    }
}
