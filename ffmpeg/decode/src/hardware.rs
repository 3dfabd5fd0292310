/*!
    Hardware-accelerated decoding.

    A device is attached to the codec context before it is opened; FFmpeg then
    picks the hardware pixel format on its own. Decoded surfaces live in
    device memory and are downloaded before conversion.
*/

use std::ffi::CStr;
use std::ptr;

use ffmpeg_next::{codec, ffi, util::frame::video::Video as VideoFrameFFmpeg};
use tracing::{debug, info, warn};

use vio_types::{Error, Result};

/// `AV_CODEC_HW_CONFIG_METHOD_HW_DEVICE_CTX`
const METHOD_HW_DEVICE_CTX: i32 = 0x01;

/**
    How frames should be decoded.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum DecodeSupport {
    #[default]
    Software,
    /// Use a hardware device when the codec and the machine have one, and
    /// fall back to software otherwise.
    Hardware,
}

impl DecodeSupport {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Software => "software",
            Self::Hardware => "hardware",
        }
    }
}

impl std::fmt::Display for DecodeSupport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/**
    Attach the first hardware device the codec can decode on.

    Returns the device type name, or `None` if the decoder stays in software.
    The context takes ownership of the device reference.
*/
pub(crate) fn attach_device(ctx: &mut codec::context::Context) -> Option<&'static str> {
    // SAFETY: the context is not open yet, so setting hw_device_ctx is
    // allowed; the hardware configs are static tables owned by libavcodec.
    unsafe {
        let raw = ctx.as_mut_ptr();
        let codec = ffi::avcodec_find_decoder((*raw).codec_id);
        if codec.is_null() {
            return None;
        }

        let mut index = 0;
        loop {
            let config = ffi::avcodec_get_hw_config(codec, index);
            if config.is_null() {
                break;
            }
            index += 1;
            if (*config).methods & METHOD_HW_DEVICE_CTX == 0 {
                continue;
            }

            let device_type = (*config).device_type;
            let name = device_name(device_type);
            let mut device: *mut ffi::AVBufferRef = ptr::null_mut();
            let ret = ffi::av_hwdevice_ctx_create(&mut device, device_type, ptr::null(), ptr::null_mut(), 0);
            if ret < 0 || device.is_null() {
                debug!(device = name, error = %ffmpeg_next::Error::from(ret), "hardware device unavailable");
                continue;
            }

            (*raw).hw_device_ctx = device;
            info!(device = name, "hardware decoding enabled");
            return Some(name);
        }
    }

    warn!("no hardware device for this codec, decoding in software");
    None
}

fn device_name(device_type: ffi::AVHWDeviceType) -> &'static str {
    // SAFETY: FFmpeg returns a static string or null.
    unsafe {
        let name = ffi::av_hwdevice_get_type_name(device_type);
        if name.is_null() {
            return "unknown";
        }
        CStr::from_ptr(name).to_str().unwrap_or("unknown")
    }
}

pub(crate) fn is_hardware_frame(frame: &VideoFrameFFmpeg) -> bool {
    // SAFETY: reading a field of a frame we hold a reference to.
    unsafe { !(*frame.as_ptr()).hw_frames_ctx.is_null() }
}

/**
    Copy a hardware surface into system memory.
*/
pub(crate) fn download(frame: &VideoFrameFFmpeg) -> Result<VideoFrameFFmpeg> {
    let mut downloaded = VideoFrameFFmpeg::empty();
    // SAFETY: both frames are valid; the destination is empty so FFmpeg
    // allocates it in the surface's preferred software format.
    let ret = unsafe { ffi::av_hwframe_transfer_data(downloaded.as_mut_ptr(), frame.as_ptr(), 0) };
    if ret < 0 {
        return Err(Error::decode(format!(
            "cannot download hardware frame: {}",
            ffmpeg_next::Error::from(ret)
        )));
    }
    Ok(downloaded)
}
