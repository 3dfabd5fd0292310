/*!
    Shared types for the vio stream I/O engine.

    This crate defines the vocabulary of the workspace: the types that cross
    crate boundaries between the demux, decode, transform, encode and mux
    stages and the pipeline on top of them. It has no dependency on FFmpeg,
    so pipeline logic and tests can use it without pulling in native bindings.
*/

mod codec;
mod error;
mod format;
mod frame;
mod packet;
mod stream;
mod time;

pub use codec::{CodecId, ContainerFormat};
pub use error::{Error, Result};
pub use format::{PixelFormat, PlaneLayout};
pub use frame::Frame;
pub use packet::Packet;
pub use stream::{StreamDescriptor, VideoStreamInfo};
pub use time::{Pts, Rational};
