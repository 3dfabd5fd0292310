/*!
    Media source implementation.
*/

use std::time::Duration;

use ffmpeg_next::{Dictionary, format::context::Input as InputContext};
use tracing::{debug, trace};

use vio_types::{Error, Packet, Rational, Result};

use crate::codec_config::CodecConfig;
use crate::convert::{error_from_ffmpeg, is_again, pts_from_ffmpeg};
use crate::probe::{SourceInfo, extract_source_info};

/**
    Options for opening a source.

    Timeouts only apply to network protocols; FFmpeg ignores them for files.
*/
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceOptions {
    /// Upper bound on a single blocking read (`rw_timeout`).
    pub read_timeout: Option<Duration>,
    /// Upper bound on establishing the connection (`timeout`).
    pub connect_timeout: Option<Duration>,
    /// RTSP lower transport, for example `"tcp"`.
    pub rtsp_transport: Option<String>,
    /// Extra demuxer and protocol options passed through verbatim.
    pub extra: Vec<(String, String)>,
}

impl SourceOptions {
    fn to_dictionary(&self) -> Dictionary<'static> {
        let mut dict = Dictionary::new();
        if let Some(timeout) = self.read_timeout {
            dict.set("rw_timeout", &timeout.as_micros().to_string());
        }
        if let Some(timeout) = self.connect_timeout {
            dict.set("timeout", &timeout.as_micros().to_string());
        }
        if let Some(transport) = &self.rtsp_transport {
            dict.set("rtsp_transport", transport);
        }
        for (key, value) in &self.extra {
            dict.set(key, value);
        }
        dict
    }
}

/**
    A demuxer producing the packets of the best video stream of a file or URL.

    Packets of every other stream are skipped.
*/
pub struct Source {
    input: InputContext,
    info: SourceInfo,
    codec_config: CodecConfig,
}

impl Source {
    /**
        Open a file path or URL.

        Fails with `Resource` if the input cannot be opened or has no
        decodable video stream, and with `Transport` if a network session
        could not be established.
    */
    pub fn open(url: &str, options: &SourceOptions) -> Result<Self> {
        crate::init()?;

        let input = ffmpeg_next::format::input_with_dictionary(&url, options.to_dictionary())
            .map_err(|e| error_from_ffmpeg(e, &format!("cannot open {url}")))?;

        let info = extract_source_info(&input)?;

        let codec_config = input
            .stream(info.stream_index)
            .map(|stream| CodecConfig::new(stream.parameters()))
            .ok_or_else(|| Error::resource("video stream disappeared after probing"))?;

        debug!(
            url,
            container = %info.container,
            codec = %info.codec,
            width = info.width,
            height = info.height,
            fps = info.frame_rate.to_f64(),
            "source opened"
        );

        Ok(Self {
            input,
            info,
            codec_config,
        })
    }

    pub fn info(&self) -> &SourceInfo {
        &self.info
    }

    /**
        Codec parameters of the video stream. Pass to `vio-decode`.
    */
    pub fn codec_config(&self) -> &CodecConfig {
        &self.codec_config
    }

    pub fn time_base(&self) -> Rational {
        self.info.time_base
    }

    /**
        Read the next packet of the video stream.

        Returns `Ok(None)` at end of stream. A read that FFmpeg asks to retry
        surfaces as `Timeout`.
    */
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        let stream_index = self.info.stream_index;
        let time_base = self.info.time_base;

        loop {
            let mut packet = ffmpeg_next::Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {}
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(e) if is_again(&e) => return Err(Error::Timeout),
                Err(e) => return Err(error_from_ffmpeg(e, "read failed")),
            }

            if packet.stream() != stream_index {
                trace!(stream = packet.stream(), "skipping packet of other stream");
                continue;
            }

            let data = packet.data().map(|d| d.to_vec()).unwrap_or_default();

            return Ok(Some(Packet::new(
                data,
                pts_from_ffmpeg(packet.pts()),
                pts_from_ffmpeg(packet.dts()),
                packet.duration(),
                time_base,
                stream_index,
                packet.is_key(),
            )));
        }
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}
