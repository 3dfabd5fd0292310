/*!
    Conversion utilities between `ffmpeg_next` types and `vio-types`.
*/

use std::io::ErrorKind;

use ffmpeg_next::{Error as FFmpegError, ffi};

use vio_types::{CodecId, Error, Pts, Rational};

pub fn rational_from_ffmpeg(r: ffmpeg_next::Rational) -> Rational {
    Rational::new(r.numerator(), r.denominator())
}

pub fn rational_to_ffmpeg(r: Rational) -> ffmpeg_next::Rational {
    ffmpeg_next::Rational::new(r.num, r.den)
}

pub fn pts_from_ffmpeg(pts: Option<i64>) -> Option<Pts> {
    pts.map(Pts)
}

/**
    Map a native codec id to a decodable [`CodecId`].
*/
pub fn codec_id_from_ffmpeg(id: ffmpeg_next::codec::Id) -> Option<CodecId> {
    use ffmpeg_next::codec::Id;

    match id {
        Id::H264 => Some(CodecId::H264),
        Id::HEVC => Some(CodecId::H265),
        Id::MPEG1VIDEO => Some(CodecId::Mpeg1Video),
        Id::MPEG2VIDEO => Some(CodecId::Mpeg2Video),
        Id::MPEG4 => Some(CodecId::Mpeg4),
        Id::MJPEG => Some(CodecId::Mjpeg),
        _ => None,
    }
}

pub fn codec_id_to_ffmpeg(codec: CodecId) -> ffmpeg_next::codec::Id {
    use ffmpeg_next::codec::Id;

    match codec {
        CodecId::H264 => Id::H264,
        CodecId::H265 => Id::HEVC,
        CodecId::Mpeg1Video => Id::MPEG1VIDEO,
        CodecId::Mpeg2Video => Id::MPEG2VIDEO,
        CodecId::Mpeg4 => Id::MPEG4,
        CodecId::Mjpeg => Id::MJPEG,
        _ => Id::None,
    }
}

/**
    Returns true if `errno` is FFmpeg asking the caller to try again.
*/
pub fn is_again(e: &FFmpegError) -> bool {
    matches!(e, FFmpegError::Other { errno } if *errno == ffi::EAGAIN)
}

/**
    Returns true if the error means the network session itself broke, as
    opposed to bad data or a missing resource.

    `Exit` is what FFmpeg reports when an I/O call was interrupted.
*/
pub fn is_transport_failure(e: &FFmpegError) -> bool {
    match e {
        FFmpegError::Exit => true,
        FFmpegError::Other { errno } => matches!(
            std::io::Error::from_raw_os_error(*errno).kind(),
            ErrorKind::ConnectionReset
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionAborted
                | ErrorKind::NotConnected
                | ErrorKind::BrokenPipe
                | ErrorKind::TimedOut
                | ErrorKind::HostUnreachable
                | ErrorKind::NetworkUnreachable
                | ErrorKind::NetworkDown
                | ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

/**
    Classify an FFmpeg failure from opening or reading a source or sink.

    Decoders and encoders apply their own category to errors that are not
    transport failures.
*/
pub fn error_from_ffmpeg(e: FFmpegError, context: &str) -> Error {
    match e {
        _ if is_transport_failure(&e) => Error::transport(format!("{context}: {e}")),
        _ if is_again(&e) => Error::Timeout,
        FFmpegError::InvalidData | FFmpegError::Eof => Error::protocol(format!("{context}: {e}")),
        _ => Error::resource(format!("{context}: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_ids_round_trip() {
        for codec in [
            CodecId::H264,
            CodecId::H265,
            CodecId::Mpeg1Video,
            CodecId::Mpeg2Video,
            CodecId::Mpeg4,
            CodecId::Mjpeg,
        ] {
            assert_eq!(codec_id_from_ffmpeg(codec_id_to_ffmpeg(codec)), Some(codec));
        }
        assert_eq!(codec_id_from_ffmpeg(ffmpeg_next::codec::Id::VP9), None);
    }

    #[test]
    fn network_errnos_are_transport_failures() {
        let reset = FFmpegError::Other {
            errno: ffi::ECONNRESET,
        };
        let refused = FFmpegError::Other {
            errno: ffi::ECONNREFUSED,
        };
        assert!(is_transport_failure(&reset));
        assert!(is_transport_failure(&refused));
        assert!(is_transport_failure(&FFmpegError::Exit));
        assert!(error_from_ffmpeg(reset, "read").is_transport());
    }

    #[test]
    fn other_errors_are_classified() {
        assert!(matches!(
            error_from_ffmpeg(FFmpegError::InvalidData, "read"),
            Error::Protocol(_)
        ));
        assert!(matches!(
            error_from_ffmpeg(FFmpegError::DecoderNotFound, "open"),
            Error::Resource(_)
        ));
        assert_eq!(
            error_from_ffmpeg(FFmpegError::Other { errno: ffi::EAGAIN }, "read"),
            Error::Timeout
        );
        let missing = FFmpegError::Other {
            errno: ffi::ENOENT,
        };
        assert!(!is_transport_failure(&missing));
        assert!(matches!(error_from_ffmpeg(missing, "open"), Error::Resource(_)));
    }
}
