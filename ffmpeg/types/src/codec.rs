/*!
    Codec and container identifiers.
*/

use std::path::Path;

/**
    Video codecs a pipeline can negotiate.

    Every variant can be decoded; only H.264 and H.265 can be encoded.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    H264,
    H265,
    Mpeg1Video,
    Mpeg2Video,
    /// MPEG-4 Part 2
    Mpeg4,
    Mjpeg,
}

impl CodecId {
    /**
        Returns the FFmpeg codec name.
    */
    pub const fn name(self) -> &'static str {
        match self {
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Mpeg1Video => "mpeg1video",
            Self::Mpeg2Video => "mpeg2video",
            Self::Mpeg4 => "mpeg4",
            Self::Mjpeg => "mjpeg",
        }
    }

    /**
        Returns true if a writer can encode this codec.
    */
    pub const fn can_encode(self) -> bool {
        matches!(self, Self::H264 | Self::H265)
    }

    /**
        Encoder implementations to try, most preferred first.

        The last entry is FFmpeg's generic encoder lookup by codec id.
    */
    pub const fn encoder_preference(self) -> &'static [&'static str] {
        match self {
            Self::H264 => &["libx264", "libopenh264", "h264"],
            Self::H265 => &["libx265", "hevc"],
            _ => &[],
        }
    }
}

impl std::fmt::Display for CodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/**
    Container formats a pipeline can demux or mux.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ContainerFormat {
    Mp4,
    Mov,
    Matroska,
    /// Raw H.264 Annex B elementary stream.
    H264,
    /// Raw H.265 Annex B elementary stream.
    Hevc,
    Mjpeg,
    MpegTs,
    Rtp,
    Rtsp,
}

impl ContainerFormat {
    /**
        Returns the FFmpeg muxer name.
    */
    pub const fn muxer_name(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mov => "mov",
            Self::Matroska => "matroska",
            Self::H264 => "h264",
            Self::Hevc => "hevc",
            Self::Mjpeg => "mjpeg",
            Self::MpegTs => "mpegts",
            Self::Rtp => "rtp",
            Self::Rtsp => "rtsp",
        }
    }

    /**
        Returns true for elementary streams without a container.
    */
    pub const fn is_raw(self) -> bool {
        matches!(self, Self::H264 | Self::Hevc | Self::Mjpeg)
    }

    /**
        Deduce the container from a file extension.
    */
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "mp4" | "m4v" => Some(Self::Mp4),
            "mov" => Some(Self::Mov),
            "mkv" => Some(Self::Matroska),
            "h264" | "264" => Some(Self::H264),
            "hevc" | "h265" | "265" => Some(Self::Hevc),
            "mjpeg" | "mjpg" => Some(Self::Mjpeg),
            "ts" | "m2ts" => Some(Self::MpegTs),
            _ => None,
        }
    }

    /**
        Map an FFmpeg demuxer name to a container.

        Demuxers often register several comma-separated names
        (`"mov,mp4,m4a,3gp,3g2,mj2"`, `"matroska,webm"`); any of them matches.
    */
    pub fn from_demuxer_name(name: &str) -> Option<Self> {
        name.split(',').find_map(|part| match part.trim() {
            "mp4" => Some(Self::Mp4),
            "mov" => Some(Self::Mov),
            "matroska" => Some(Self::Matroska),
            "h264" => Some(Self::H264),
            "hevc" => Some(Self::Hevc),
            "mjpeg" => Some(Self::Mjpeg),
            "mpegts" => Some(Self::MpegTs),
            "rtp" | "sdp" => Some(Self::Rtp),
            "rtsp" => Some(Self::Rtsp),
            _ => None,
        })
    }
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.muxer_name())
    }
}
