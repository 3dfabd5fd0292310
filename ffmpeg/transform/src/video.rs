/*!
    Video frame conversion.
*/

use ffmpeg_next::{
    format::Pixel,
    software::scaling::{context::Context as ScalerContext, flag::Flags as ScalerFlags},
    util::frame::video::Video as VideoFrameFFmpeg,
};
use tracing::debug;

use vio_types::{Error, Frame, Pts, Rational, Result};

use crate::pixel::{frame_to_native, native_to_frame};

/**
    Scaling algorithm for video resizing.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScalingAlgorithm {
    /// Nearest neighbor - fastest, lowest quality.
    Nearest,
    /// Bilinear interpolation - fast, acceptable quality.
    #[default]
    Bilinear,
    /// Bicubic interpolation - moderate speed, good quality.
    Bicubic,
    /// Lanczos resampling - slowest, highest quality.
    Lanczos,
}

impl ScalingAlgorithm {
    fn to_ffmpeg_flags(self) -> ScalerFlags {
        match self {
            Self::Nearest => ScalerFlags::POINT,
            Self::Bilinear => ScalerFlags::BILINEAR,
            Self::Bicubic => ScalerFlags::BICUBIC,
            Self::Lanczos => ScalerFlags::LANCZOS,
        }
    }
}

/**
    Format and size of a native frame.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NativeLayout {
    pub format: Pixel,
    pub width: u32,
    pub height: u32,
}

impl NativeLayout {
    pub fn new(format: Pixel, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
        }
    }

    pub fn of(frame: &VideoFrameFFmpeg) -> Self {
        Self::new(frame.format(), frame.width(), frame.height())
    }
}

/**
    Converts frames from one native layout to another.

    The conversion path is negotiated when the converter is created, so an
    impossible conversion is reported before any frame flows. When input and
    output layouts are identical no scaler is allocated and frames are only
    copied.

    If a frame arrives in a different layout than negotiated (a mid-stream
    resolution change, for example), the scaler is rebuilt for it.
*/
pub struct FormatConverter {
    input: NativeLayout,
    output: NativeLayout,
    algorithm: ScalingAlgorithm,
    scaler: Option<ScalerContext>,
}

impl FormatConverter {
    pub fn new(
        input: NativeLayout,
        output: NativeLayout,
        algorithm: ScalingAlgorithm,
    ) -> Result<Self> {
        if output.width == 0 || output.height == 0 {
            return Err(Error::resource("conversion target has zero dimensions"));
        }
        let scaler = build_scaler(input, output, algorithm)?;
        Ok(Self {
            input,
            output,
            algorithm,
            scaler,
        })
    }

    pub fn input(&self) -> NativeLayout {
        self.input
    }

    pub fn output(&self) -> NativeLayout {
        self.output
    }

    /**
        Returns true if frames are copied without scaling.
    */
    pub fn is_passthrough(&self) -> bool {
        self.scaler.is_none()
    }

    /**
        Convert a decoded native frame into a packed caller frame.
    */
    pub fn to_frame(
        &mut self,
        native: &VideoFrameFFmpeg,
        pts: Pts,
        time_base: Rational,
    ) -> Result<Frame> {
        self.renegotiate(NativeLayout::of(native))?;
        match self.scale(native)? {
            Some(scaled) => native_to_frame(&scaled, pts, time_base),
            None => native_to_frame(native, pts, time_base),
        }
    }

    /**
        Convert a packed caller frame into a native frame in the output
        layout. The frame's PTS is carried over unchanged.
    */
    pub fn to_native(&mut self, frame: &Frame) -> Result<VideoFrameFFmpeg> {
        let native = frame_to_native(frame)?;
        self.renegotiate(NativeLayout::of(&native))?;
        Ok(self.scale(&native)?.unwrap_or(native))
    }

    fn renegotiate(&mut self, layout: NativeLayout) -> Result<()> {
        if layout == self.input {
            return Ok(());
        }
        debug!(
            from = ?self.input,
            to = ?layout,
            "input layout changed, rebuilding converter"
        );
        self.scaler = build_scaler(layout, self.output, self.algorithm)?;
        self.input = layout;
        Ok(())
    }

    fn scale(&mut self, src: &VideoFrameFFmpeg) -> Result<Option<VideoFrameFFmpeg>> {
        let Some(scaler) = self.scaler.as_mut() else {
            return Ok(None);
        };

        let mut dst = VideoFrameFFmpeg::new(self.output.format, self.output.width, self.output.height);
        scaler
            .run(src, &mut dst)
            .map_err(|e| Error::resource(format!("scaling failed: {e}")))?;
        dst.set_pts(src.pts());

        Ok(Some(dst))
    }
}

fn build_scaler(
    input: NativeLayout,
    output: NativeLayout,
    algorithm: ScalingAlgorithm,
) -> Result<Option<ScalerContext>> {
    if input == output {
        return Ok(None);
    }

    ScalerContext::get(
        input.format,
        input.width,
        input.height,
        output.format,
        output.width,
        output.height,
        algorithm.to_ffmpeg_flags(),
    )
    .map(Some)
    .map_err(|e| {
        Error::resource(format!(
            "no conversion from {:?} {}x{} to {:?} {}x{}: {e}",
            input.format, input.width, input.height, output.format, output.width, output.height
        ))
    })
}

impl std::fmt::Debug for FormatConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatConverter")
            .field("input", &self.input)
            .field("output", &self.output)
            .field("algorithm", &self.algorithm)
            .field("passthrough", &self.is_passthrough())
            .finish()
    }
}
