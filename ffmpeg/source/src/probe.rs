/*!
    Probing functionality for extracting stream metadata.
*/

use std::time::Duration;

use ffmpeg_next::{format::context::Input as InputContext, media::Type};

use vio_types::{CodecId, ContainerFormat, Error, Rational, Result};

use crate::convert::{codec_id_from_ffmpeg, rational_from_ffmpeg};
use crate::source::{Source, SourceOptions};

/**
    What probing found about the best video stream of a source.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceInfo {
    pub container: ContainerFormat,
    pub codec: CodecId,
    /// Native decoder name, for example `"h264"`.
    pub codec_name: String,
    /// Native pixel format name, for example `"yuvj420p"`.
    pub pixel_format_name: String,
    pub stream_index: usize,
    pub width: u32,
    pub height: u32,
    /// Average frame rate, or `0/1` if the container does not say.
    pub frame_rate: Rational,
    pub time_base: Rational,
    pub bitrate: Option<u64>,
    pub duration: Option<Duration>,
    /// Frame count recorded by the container, if any.
    pub frames: Option<u64>,
}

impl SourceInfo {
    /**
        Number of frames in the stream.

        Uses the count the container recorded, or else `duration * fps`
        rounded to the nearest frame.
    */
    pub fn frame_count(&self) -> Option<u64> {
        if let Some(frames) = self.frames {
            return Some(frames);
        }
        let fps = self.frame_rate.to_f64();
        let duration = self.duration?;
        if fps <= 0.0 {
            return None;
        }
        Some((duration.as_secs_f64() * fps + 0.5).floor() as u64)
    }
}

/**
    Probe a file or URL without setting up a decoder.
*/
pub fn probe(url: &str, options: &SourceOptions) -> Result<SourceInfo> {
    Source::open(url, options).map(|source| source.info().clone())
}

/**
    Describe the best video stream of an already-opened input.
*/
pub(crate) fn extract_source_info(input: &InputContext) -> Result<SourceInfo> {
    let demuxer = input.format().name().to_string();
    let container = ContainerFormat::from_demuxer_name(&demuxer)
        .ok_or_else(|| Error::resource(format!("unsupported container format: {demuxer}")))?;

    let stream = input
        .streams()
        .best(Type::Video)
        .ok_or_else(|| Error::resource("no video stream found"))?;

    let parameters = stream.parameters();
    let native_id = parameters.id();
    let codec = codec_id_from_ffmpeg(native_id)
        .ok_or_else(|| Error::resource(format!("unsupported video codec: {native_id:?}")))?;

    let decoder = ffmpeg_next::codec::context::Context::from_parameters(parameters.clone())
        .and_then(|ctx| ctx.decoder().video())
        .map_err(|e| Error::resource(format!("cannot inspect {codec} stream: {e}")))?;

    if decoder.width() == 0 || decoder.height() == 0 {
        return Err(Error::resource("video stream has no dimensions"));
    }

    let time_base = rational_from_ffmpeg(stream.time_base());

    let frame_rate = if stream.avg_frame_rate().numerator() > 0 {
        rational_from_ffmpeg(stream.avg_frame_rate())
    } else if stream.rate().numerator() > 0 {
        rational_from_ffmpeg(stream.rate())
    } else {
        Rational::new(0, 1)
    };

    let duration = if stream.duration() > 0 && time_base.is_valid() {
        let seconds = stream.duration() as f64 * time_base.to_f64();
        Some(Duration::from_secs_f64(seconds))
    } else if input.duration() > 0 {
        Some(Duration::from_micros(input.duration() as u64))
    } else {
        None
    };

    let frames = u64::try_from(stream.frames()).ok().filter(|&n| n > 0);

    // SAFETY: the parameters pointer is owned by the stream and valid for
    // the duration of this borrow.
    let stream_bitrate = unsafe { (*parameters.as_ptr()).bit_rate };
    let bitrate = if stream_bitrate > 0 {
        Some(stream_bitrate as u64)
    } else if input.bit_rate() > 0 {
        Some(input.bit_rate() as u64)
    } else {
        None
    };

    let pixel_format_name = format!("{:?}", decoder.format()).to_lowercase();
    let codec_name = decoder
        .codec()
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| codec.name().to_string());

    Ok(SourceInfo {
        container,
        codec,
        codec_name,
        pixel_format_name,
        stream_index: stream.index(),
        width: decoder.width(),
        height: decoder.height(),
        frame_rate,
        time_base,
        bitrate,
        duration,
        frames,
    })
}
