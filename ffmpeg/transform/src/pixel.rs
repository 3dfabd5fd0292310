/*!
    Pixel format mapping and packed/strided buffer copies.
*/

use ffmpeg_next::{format::Pixel, util::frame::video::Video as VideoFrameFFmpeg};

use vio_types::{Error, Frame, PixelFormat, Pts, Rational, Result};

/**
    Convert our PixelFormat to FFmpeg's Pixel format.
*/
pub fn pixel_to_ffmpeg(format: PixelFormat) -> Result<Pixel> {
    match format {
        PixelFormat::Yuv420p => Ok(Pixel::YUV420P),
        PixelFormat::Nv12 => Ok(Pixel::NV12),
        PixelFormat::Bgra => Ok(Pixel::BGRA),
        PixelFormat::Rgba => Ok(Pixel::RGBA),
        PixelFormat::Rgb24 => Ok(Pixel::RGB24),
        PixelFormat::Bgr24 => Ok(Pixel::BGR24),
        PixelFormat::Yuv422p => Ok(Pixel::YUV422P),
        PixelFormat::Yuv444p => Ok(Pixel::YUV444P),
        PixelFormat::Yuv420p10 => Ok(Pixel::YUV420P10LE),
        PixelFormat::P010le => Ok(Pixel::P010LE),
        PixelFormat::Gray8 => Ok(Pixel::GRAY8),
        _ => Err(Error::resource(format!("pixel format {format} not supported"))),
    }
}

/**
    Convert FFmpeg's Pixel format to ours.

    Returns `None` for native layouts callers never see directly, such as
    `yuvj420p` or big-endian variants. Those go through a converter.
*/
pub fn pixel_from_ffmpeg(format: Pixel) -> Option<PixelFormat> {
    match format {
        Pixel::YUV420P => Some(PixelFormat::Yuv420p),
        Pixel::NV12 => Some(PixelFormat::Nv12),
        Pixel::BGRA => Some(PixelFormat::Bgra),
        Pixel::RGBA => Some(PixelFormat::Rgba),
        Pixel::RGB24 => Some(PixelFormat::Rgb24),
        Pixel::BGR24 => Some(PixelFormat::Bgr24),
        Pixel::YUV422P => Some(PixelFormat::Yuv422p),
        Pixel::YUV444P => Some(PixelFormat::Yuv444p),
        Pixel::YUV420P10LE => Some(PixelFormat::Yuv420p10),
        Pixel::P010LE => Some(PixelFormat::P010le),
        Pixel::GRAY8 => Some(PixelFormat::Gray8),
        _ => None,
    }
}

/**
    Copy a packed caller frame into a newly allocated native frame, inserting
    row padding. The frame's PTS is carried over.
*/
pub fn frame_to_native(frame: &Frame) -> Result<VideoFrameFFmpeg> {
    if frame.width == 0 || frame.height == 0 {
        return Err(Error::resource("frame has zero dimensions"));
    }
    if !frame.is_complete() {
        return Err(Error::resource(format!(
            "frame holds {} bytes, {} needed for {}x{} {}",
            frame.data.len(),
            frame.expected_size(),
            frame.width,
            frame.height,
            frame.format
        )));
    }

    let pixel = pixel_to_ffmpeg(frame.format)?;
    let mut native = VideoFrameFFmpeg::new(pixel, frame.width, frame.height);

    let mut offset = 0;
    for (index, plane) in frame.format.planes(frame.width, frame.height).iter().enumerate() {
        let stride = native.stride(index);
        let dst = native.data_mut(index);
        for row in 0..plane.rows {
            let src_start = offset + row * plane.row_bytes;
            let dst_start = row * stride;
            dst[dst_start..dst_start + plane.row_bytes]
                .copy_from_slice(&frame.data[src_start..src_start + plane.row_bytes]);
        }
        offset += plane.size();
    }

    native.set_pts(Some(frame.pts.0));
    Ok(native)
}

/**
    Copy a native frame into a packed caller frame, dropping row padding.

    The native frame must already be in one of our pixel formats.
*/
pub fn native_to_frame(native: &VideoFrameFFmpeg, pts: Pts, time_base: Rational) -> Result<Frame> {
    let width = native.width();
    let height = native.height();
    if width == 0 || height == 0 {
        return Err(Error::resource("native frame has zero dimensions"));
    }

    let format = pixel_from_ffmpeg(native.format()).ok_or_else(|| {
        Error::resource(format!(
            "native pixel format {:?} needs conversion",
            native.format()
        ))
    })?;

    let mut data = Vec::with_capacity(format.frame_size(width, height));
    for (index, plane) in format.planes(width, height).iter().enumerate() {
        let stride = native.stride(index);
        let src = native.data(index);
        for row in 0..plane.rows {
            let start = row * stride;
            data.extend_from_slice(&src[start..start + plane.row_bytes]);
        }
    }

    Ok(Frame::new(data, width, height, format, pts, time_base))
}
