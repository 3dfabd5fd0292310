/*!
    Pixel format types.
*/

/**
    Video pixel formats exchanged with callers.

    This is the subset of layouts a caller can hand to, or receive from, a
    pipeline. Native decoder layouts outside this set (for example the
    full-range `yuvj420p` produced by MJPEG decoders) are converted before
    they reach a caller.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 12bpp (most common video format)
    Yuv420p,
    /// Semi-planar YUV 4:2:0, 12bpp (common hardware decoder output)
    Nv12,
    /// Packed BGRA, 32bpp
    Bgra,
    /// Packed RGBA, 32bpp
    Rgba,
    /// Packed RGB, 24bpp
    Rgb24,
    /// Packed BGR, 24bpp
    Bgr24,
    /// Planar YUV 4:2:2, 16bpp
    Yuv422p,
    /// Planar YUV 4:4:4, 24bpp
    Yuv444p,
    /// Planar YUV 4:2:0, 10-bit little-endian in 16-bit words
    Yuv420p10,
    /// Semi-planar YUV 4:2:0, 10-bit little-endian in 16-bit words
    P010le,
    /// Single 8-bit luma plane
    Gray8,
}

/**
    Geometry of one plane in a tightly packed frame buffer.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Bytes per row, without padding.
    pub row_bytes: usize,
    /// Number of rows.
    pub rows: usize,
}

impl PlaneLayout {
    /**
        Total bytes occupied by this plane.
    */
    pub const fn size(&self) -> usize {
        self.row_bytes * self.rows
    }
}

impl PixelFormat {
    /**
        Returns the lowercase name FFmpeg uses for this format.
    */
    pub const fn name(self) -> &'static str {
        match self {
            Self::Yuv420p => "yuv420p",
            Self::Nv12 => "nv12",
            Self::Bgra => "bgra",
            Self::Rgba => "rgba",
            Self::Rgb24 => "rgb24",
            Self::Bgr24 => "bgr24",
            Self::Yuv422p => "yuv422p",
            Self::Yuv444p => "yuv444p",
            Self::Yuv420p10 => "yuv420p10le",
            Self::P010le => "p010le",
            Self::Gray8 => "gray",
        }
    }

    /**
        Plane geometry of a tightly packed `width` x `height` frame.

        Chroma dimensions round up, matching how FFmpeg sizes chroma planes
        for odd luma dimensions.
    */
    pub fn planes(self, width: u32, height: u32) -> Vec<PlaneLayout> {
        let w = width as usize;
        let h = height as usize;
        let cw = w.div_ceil(2);
        let ch = h.div_ceil(2);

        let plane = |row_bytes, rows| PlaneLayout { row_bytes, rows };

        match self {
            Self::Rgba | Self::Bgra => vec![plane(w * 4, h)],
            Self::Rgb24 | Self::Bgr24 => vec![plane(w * 3, h)],
            Self::Gray8 => vec![plane(w, h)],
            Self::Yuv420p => vec![plane(w, h), plane(cw, ch), plane(cw, ch)],
            Self::Yuv420p10 => vec![plane(w * 2, h), plane(cw * 2, ch), plane(cw * 2, ch)],
            Self::Yuv422p => vec![plane(w, h), plane(cw, h), plane(cw, h)],
            Self::Yuv444p => vec![plane(w, h), plane(w, h), plane(w, h)],
            Self::Nv12 => vec![plane(w, h), plane(cw * 2, ch)],
            Self::P010le => vec![plane(w * 2, h), plane(cw * 4, ch)],
        }
    }

    /**
        Size in bytes of a tightly packed `width` x `height` frame.
    */
    pub fn frame_size(self, width: u32, height: u32) -> usize {
        self.planes(width, height).iter().map(PlaneLayout::size).sum()
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
