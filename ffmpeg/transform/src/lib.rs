/*!
    Pixel format and resolution conversion for the vio stream I/O engine.

    Decoders produce native frames in whatever layout the codec prefers
    (including decoder-only layouts such as `yuvj420p`), with padded rows.
    Callers exchange tightly packed [`Frame`](vio_types::Frame)s in one of the
    [`PixelFormat`](vio_types::PixelFormat)s. This crate converts between the
    two, in both directions.
*/

mod pixel;
mod video;

pub use pixel::{frame_to_native, native_to_frame, pixel_from_ffmpeg, pixel_to_ffmpeg};
pub use video::{FormatConverter, NativeLayout, ScalingAlgorithm};
