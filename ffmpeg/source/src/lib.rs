/*!
    Demuxing and stream probing for the vio stream I/O engine.

    This crate handles the input side of a pipeline. It opens files and
    network URLs, picks the best video stream, describes it, and produces
    encoded packets that `vio-decode` turns into frames.

    It also owns the mapping from `ffmpeg_next` values (rationals, codec ids,
    errors) to their `vio-types` counterparts, which the other stage crates
    reuse.
*/

use std::sync::OnceLock;

use vio_types::{Error, Result};

mod codec_config;
pub mod convert;
mod probe;
mod source;

pub use codec_config::CodecConfig;
pub use probe::{SourceInfo, probe};
pub use source::{Source, SourceOptions};

/**
    Initialize FFmpeg once per process.

    Safe to call from any thread and any number of times. FFmpeg's own log
    output is lowered to errors only; pipeline events are reported through
    `tracing` instead.
*/
pub fn init() -> Result<()> {
    static INIT: OnceLock<Result<()>> = OnceLock::new();

    INIT.get_or_init(|| {
        ffmpeg_next::init().map_err(|e| Error::resource(format!("ffmpeg init failed: {e}")))?;
        ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Error);
        tracing::debug!("ffmpeg initialized");
        Ok(())
    })
    .clone()
}
