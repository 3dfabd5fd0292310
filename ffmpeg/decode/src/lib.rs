/*!
    Video decoding for the vio stream I/O engine.

    This crate turns encoded packets from `vio-source` into caller-facing
    frames. Native frames are converted to the requested pixel format and
    size by a `vio-transform` converter before they leave the decoder.
    Decoding can run on a hardware device; its surfaces are downloaded to
    system memory first.
*/

mod hardware;
mod video;

pub use hardware::DecodeSupport;
pub use video::{VideoDecoder, VideoDecoderConfig};
