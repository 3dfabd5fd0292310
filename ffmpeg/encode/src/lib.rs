/*!
    Video encoding for the vio stream I/O engine.

    This crate turns caller frames into compressed packets. It's the inverse
    of `vio-decode`: frames arrive tightly packed in any supported
    [`PixelFormat`], are converted to the layout the encoder wants, and come
    out as H.264 or H.265 packets ready for `vio-sink`.

    # Example

    ```ignore
    use vio_encode::{VideoEncoder, VideoEncoderConfig, EncoderPreset};
    use vio_types::{PixelFormat, Rational};

    let config = VideoEncoderConfig::h264(640, 480, Rational::new(25, 1))
        .with_input_format(PixelFormat::Rgb24)
        .with_preset(EncoderPreset::Fast);

    let mut encoder = VideoEncoder::new(config)?;

    for frame in frames {
        for packet in encoder.encode(&frame)? {
            // Write to muxer
        }
    }

    // Flush remaining packets (B-frame lookahead)
    let final_packets = encoder.flush()?;
    ```

    # Encoder selection

    Encoders are tried in order of preference until one opens:

    - **H.264**: `libx264`, `libopenh264`, then whatever FFmpeg registers for H.264
    - **H.265**: `libx265`, then whatever FFmpeg registers for HEVC

    A specific encoder can be forced with
    [`VideoEncoderConfig::with_encoder_name`].

    # Defaults

    Unless configured otherwise, encoders run at 400 kb/s with a keyframe
    every 12 frames.
*/

pub use vio_types::{CodecId, Error, Frame, Packet, PixelFormat, Rational, Result, VideoStreamInfo};

mod config;
mod video;

pub use config::{DEFAULT_BITRATE, DEFAULT_GOP, EncoderPreset, VideoEncoderConfig};
pub use video::VideoEncoder;
