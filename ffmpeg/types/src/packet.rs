/*!
    Compressed packet.
*/

use crate::{Pts, Rational};

/**
    A compressed data unit travelling between demuxer and decoder, or
    between encoder and muxer.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub data: Vec<u8>,
    pub pts: Option<Pts>,
    pub dts: Option<Pts>,
    /// Duration in `time_base` ticks (0 if unknown).
    pub duration: i64,
    pub time_base: Rational,
    pub stream_index: usize,
    pub is_keyframe: bool,
}

impl Packet {
    pub fn new(
        data: Vec<u8>,
        pts: Option<Pts>,
        dts: Option<Pts>,
        duration: i64,
        time_base: Rational,
        stream_index: usize,
        is_keyframe: bool,
    ) -> Self {
        Self {
            data,
            pts,
            dts,
            duration,
            time_base,
            stream_index,
            is_keyframe,
        }
    }

    /**
        An empty packet. Sending it to a decoder starts draining.
    */
    pub fn flush(time_base: Rational, stream_index: usize) -> Self {
        Self::new(Vec::new(), None, None, 0, time_base, stream_index, false)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
