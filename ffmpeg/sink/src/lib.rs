/*!
    Muxing for the vio stream I/O engine.

    This crate handles the output side of a pipeline. It takes encoded
    packets from `vio-encode` and writes them into a container file, or hands
    them to a network muxer (RTSP, RTP, MPEG-TS over UDP/TCP).
*/

mod sink;

pub use sink::{Sink, SinkOptions};
