/*!
    Media sink implementation.
*/

use std::ffi::CString;
use std::os::raw::c_int;
use std::ptr;
use std::time::Duration;

use ffmpeg_next::{Dictionary, codec::Parameters, ffi, format::context::Output as OutputContext};
use tracing::debug;

use vio_source::convert::{codec_id_to_ffmpeg, error_from_ffmpeg, rational_from_ffmpeg, rational_to_ffmpeg};
use vio_types::{ContainerFormat, Error, Packet, Rational, Result, VideoStreamInfo};

/**
    Options for opening a sink.
*/
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SinkOptions {
    /// Upper bound on a single blocking write (`rw_timeout`).
    pub write_timeout: Option<Duration>,
    /// Upper bound on establishing the connection (`timeout`).
    pub connect_timeout: Option<Duration>,
    /// RTSP lower transport, for example `"tcp"`.
    pub rtsp_transport: Option<String>,
    /// Extra muxer options passed to the header write verbatim.
    pub extra: Vec<(String, String)>,
}

impl SinkOptions {
    fn io_dictionary(&self) -> Dictionary<'static> {
        let mut dict = Dictionary::new();
        if let Some(timeout) = self.write_timeout {
            dict.set("rw_timeout", &timeout.as_micros().to_string());
        }
        if let Some(timeout) = self.connect_timeout {
            dict.set("timeout", &timeout.as_micros().to_string());
        }
        dict
    }

    fn muxer_dictionary(&self) -> Dictionary<'static> {
        let mut dict = Dictionary::new();
        if let Some(transport) = &self.rtsp_transport {
            dict.set("rtsp_transport", transport);
        }
        for (key, value) in &self.extra {
            dict.set(key, value);
        }
        dict
    }
}

#[derive(Clone, Copy, Debug)]
struct VideoStream {
    index: usize,
    time_base: Rational,
}

/**
    Media sink for writing one video stream to a container or network muxer.

    The container header is written when the first packet arrives, or by
    [`finish`](Self::finish) if no packet ever does.
*/
pub struct Sink {
    output: OutputContext,
    url: String,
    container: ContainerFormat,
    muxer_options: SinkOptions,
    stream: Option<VideoStream>,
    header_written: bool,
    finished: bool,
}

impl Sink {
    /**
        Create the output for `url` with the muxer of `container`.

        File-backed muxers open their output here; muxers that manage their
        own connection (RTSP) connect when the header is written.
    */
    pub fn open(url: &str, container: ContainerFormat, options: &SinkOptions) -> Result<Self> {
        vio_source::init()?;

        let output = open_output(url, container.muxer_name(), options.io_dictionary())?;

        debug!(url, container = %container, "sink opened");

        Ok(Self {
            output,
            url: url.to_string(),
            container,
            muxer_options: options.clone(),
            stream: None,
            header_written: false,
            finished: false,
        })
    }

    pub fn container(&self) -> ContainerFormat {
        self.container
    }

    /**
        Returns true if the muxer wants codec headers out of band, in which
        case encoders must be opened with a global header.
    */
    pub fn global_header(&self) -> bool {
        self.output
            .format()
            .flags()
            .contains(ffmpeg_next::format::Flags::GLOBAL_HEADER)
    }

    /**
        Add the video stream. Must be called exactly once, before any write.
    */
    pub fn add_video_stream(&mut self, info: &VideoStreamInfo) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::InvalidState("video stream already added".into()));
        }

        let id = codec_id_to_ffmpeg(info.codec);
        let codec = ffmpeg_next::encoder::find(id)
            .or_else(|| ffmpeg_next::decoder::find(id))
            .ok_or_else(|| Error::resource(format!("codec {} not available", info.codec)))?;

        let mut stream = self
            .output
            .add_stream(codec)
            .map_err(|e| Error::resource(format!("failed to add video stream: {e}")))?;

        set_video_parameters(&stream.parameters(), info);
        stream.set_time_base(rational_to_ffmpeg(info.time_base));
        stream.set_rate(rational_to_ffmpeg(info.frame_rate));
        stream.set_avg_frame_rate(rational_to_ffmpeg(info.frame_rate));

        self.stream = Some(VideoStream {
            index: stream.index(),
            time_base: info.time_base,
        });
        Ok(())
    }

    /**
        Write a packet, writing the container header first if needed.
    */
    pub fn write(&mut self, packet: &Packet) -> Result<()> {
        if self.finished {
            return Err(Error::Closed);
        }
        if !self.header_written {
            self.write_header()?;
        }
        let stream = self
            .stream
            .ok_or_else(|| Error::InvalidState("no video stream added".into()))?;

        let mut ffmpeg_pkt = ffmpeg_next::Packet::copy(&packet.data);
        ffmpeg_pkt.set_stream(stream.index);
        ffmpeg_pkt.set_pts(
            packet
                .pts
                .map(|p| Rational::rescale(p.0, packet.time_base, stream.time_base)),
        );
        ffmpeg_pkt.set_dts(
            packet
                .dts
                .map(|p| Rational::rescale(p.0, packet.time_base, stream.time_base)),
        );
        ffmpeg_pkt.set_duration(Rational::rescale(
            packet.duration,
            packet.time_base,
            stream.time_base,
        ));
        if packet.is_keyframe {
            ffmpeg_pkt.set_flags(ffmpeg_next::packet::Flags::KEY);
        }

        ffmpeg_pkt
            .write_interleaved(&mut self.output)
            .map_err(|e| error_from_ffmpeg(e, "failed to write packet"))
    }

    /**
        Finish writing: header if still pending, then the trailer.

        The output may be unplayable if this is not called. Calling it again
        does nothing.
    */
    pub fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        if !self.header_written {
            self.write_header()?;
        }
        self.finished = true;

        self.output
            .write_trailer()
            .map_err(|e| error_from_ffmpeg(e, "failed to write trailer"))?;

        debug!(url = %self.url, "sink finished");
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::InvalidState("no video stream added".into()));
        }

        self.output
            .write_header_with(self.muxer_options.muxer_dictionary())
            .map_err(|e| error_from_ffmpeg(e, &format!("failed to write header to {}", self.url)))?;
        self.header_written = true;

        // Muxers may pick their own stream time base
        if let Some(stream) = self.stream.as_mut() {
            if let Some(native) = self.output.stream(stream.index) {
                stream.time_base = rational_from_ffmpeg(native.time_base());
            }
        }
        Ok(())
    }
}

/**
    Create an output context, opening its byte stream unless the muxer
    manages its own I/O.
*/
fn open_output(url: &str, muxer: &str, io_options: Dictionary) -> Result<OutputContext> {
    let c_url = CString::new(url).map_err(|_| Error::resource("url contains a NUL byte"))?;
    let c_muxer = CString::new(muxer).map_err(|_| Error::resource("muxer name contains a NUL byte"))?;

    // SAFETY: every pointer handed to FFmpeg is either null or derived from a
    // live CString; the context is freed on the error path and owned by the
    // returned wrapper otherwise.
    unsafe {
        let mut ctx: *mut ffi::AVFormatContext = ptr::null_mut();
        let ret = ffi::avformat_alloc_output_context2(
            &mut ctx,
            ptr::null_mut(),
            c_muxer.as_ptr(),
            c_url.as_ptr(),
        );
        if ret < 0 || ctx.is_null() {
            return Err(error_from_ffmpeg(
                ffmpeg_next::Error::from(ret),
                &format!("cannot create {muxer} output"),
            ));
        }

        let needs_file = (*(*ctx).oformat).flags & ffi::AVFMT_NOFILE as c_int == 0;
        if needs_file {
            let mut opts = io_options.disown();
            let ret = ffi::avio_open2(
                &mut (*ctx).pb,
                c_url.as_ptr(),
                ffi::AVIO_FLAG_WRITE as c_int,
                ptr::null(),
                &mut opts,
            );
            Dictionary::own(opts);
            if ret < 0 {
                ffi::avformat_free_context(ctx);
                return Err(error_from_ffmpeg(
                    ffmpeg_next::Error::from(ret),
                    &format!("cannot open {url}"),
                ));
            }
        }

        Ok(OutputContext::wrap(ctx))
    }
}

/**
    Set video stream parameters.
*/
fn set_video_parameters(params: &Parameters, info: &VideoStreamInfo) {
    // SAFETY: the parameters belong to a stream of the output context that is
    // still mutably borrowed by the caller; extradata is allocated with
    // FFmpeg's allocator so the context frees it.
    unsafe {
        let ptr = params.as_ptr() as *mut ffi::AVCodecParameters;

        (*ptr).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_VIDEO;
        (*ptr).codec_id = codec_id_to_ffmpeg(info.codec).into();
        (*ptr).width = info.width as i32;
        (*ptr).height = info.height as i32;
        (*ptr).format = stream_pixel_format(info) as i32;

        // SPS/PPS (or VPS/SPS/PPS) for containers that store them out of band
        if let Some(extradata) = info.extradata.as_ref().filter(|e| !e.is_empty()) {
            let alloc_size = extradata.len() + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
            let buf = ffi::av_mallocz(alloc_size) as *mut u8;
            if !buf.is_null() {
                std::ptr::copy_nonoverlapping(extradata.as_ptr(), buf, extradata.len());
                (*ptr).extradata = buf;
                (*ptr).extradata_size = extradata.len() as i32;
            }
        }

        if let Some(bitrate) = info.bitrate {
            (*ptr).bit_rate = bitrate as i64;
        }
        if let Some(profile) = info.profile {
            (*ptr).profile = profile;
        }
        if let Some(level) = info.level {
            (*ptr).level = level;
        }
    }
}

/**
    Pixel format declared on the stream: the encoder's, or YUV 4:2:0 when the
    name is missing or unknown to FFmpeg.
*/
fn stream_pixel_format(info: &VideoStreamInfo) -> ffi::AVPixelFormat {
    let Some(name) = info.pixel_format_name.as_deref() else {
        return ffi::AVPixelFormat::AV_PIX_FMT_YUV420P;
    };
    let Ok(c_name) = CString::new(name) else {
        return ffi::AVPixelFormat::AV_PIX_FMT_YUV420P;
    };

    // SAFETY: the name is a valid NUL-terminated string for the whole call.
    match unsafe { ffi::av_get_pix_fmt(c_name.as_ptr()) } {
        ffi::AVPixelFormat::AV_PIX_FMT_NONE => {
            debug!(pixel_format = name, "unknown pixel format, declaring yuv420p");
            ffi::AVPixelFormat::AV_PIX_FMT_YUV420P
        }
        format => format,
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("url", &self.url)
            .field("container", &self.container)
            .field("stream", &self.stream)
            .field("header_written", &self.header_written)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
