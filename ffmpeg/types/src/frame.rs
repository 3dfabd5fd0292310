/*!
    Decoded video frame.
*/

use std::time::Duration;

use crate::{PixelFormat, Pts, Rational};

/**
    A decoded picture in a caller-facing pixel format.

    `data` holds the planes of `format` back to back, tightly packed
    (no row padding), as described by [`PixelFormat::planes`].

    `sequence` is assigned by the reader at delivery and increases by one for
    every frame handed to the caller. Writers ignore it.
*/
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pts: Pts,
    pub time_base: Rational,
    pub sequence: u64,
}

impl Frame {
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        pts: Pts,
        time_base: Rational,
    ) -> Self {
        Self {
            data,
            width,
            height,
            format,
            pts,
            time_base,
            sequence: 0,
        }
    }

    /**
        Create a frame of the right size for `format`, filled with zeroes.
    */
    pub fn blank(width: u32, height: u32, format: PixelFormat, pts: Pts, time_base: Rational) -> Self {
        let data = vec![0; format.frame_size(width, height)];
        Self::new(data, width, height, format, pts, time_base)
    }

    /**
        Presentation time of this frame.
    */
    pub fn presentation_time(&self) -> Duration {
        self.pts.to_duration(self.time_base)
    }

    /**
        Number of bytes a frame of this size and format must hold.
    */
    pub fn expected_size(&self) -> usize {
        self.format.frame_size(self.width, self.height)
    }

    /**
        Returns true if `data` is large enough for the declared geometry.
    */
    pub fn is_complete(&self) -> bool {
        self.data.len() >= self.expected_size()
    }
}
