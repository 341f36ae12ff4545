//! Webcam capture over V4L2 (`v4l` crate), decoded to RGB frames.

use crate::frame::{self, Frame, FrameError};
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Number of mmap buffers queued for a capture session.
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no camera at {0}")]
    DeviceNotFound(String),
    #[error("capture error: {0}")]
    CaptureFailed(String),
    #[error("camera is in use by another process")]
    DeviceBusy,
    #[error("could not agree on a capture format: {0}")]
    FormatNegotiationFailed(String),
    #[error("device does not support video capture")]
    StreamingNotSupported,
}

/// A capture-capable V4L2 node found by [`Camera::list_devices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub path: String,
    /// Card name reported by the driver.
    pub card: String,
    pub driver: String,
    pub bus: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Packed 24-bit RGB.
    Rgb3,
    /// Motion-JPEG, one JPEG image per buffer.
    Mjpg,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Self::Yuyv),
            b"RGB3" => Some(Self::Rgb3),
            b"MJPG" => Some(Self::Mjpg),
            _ => None,
        }
    }
}

/// Map a camera index to its V4L2 device node.
pub fn device_path(index: u32) -> String {
    format!("/dev/video{index}")
}

/// Highest `/dev/videoN` index checked when listing devices.
const MAX_DEVICE_INDEX: u32 = 16;

/// An open webcam with a negotiated RGB-convertible format.
pub struct Camera {
    device: Device,
    pub path: String,
    /// Negotiated resolution; may differ from what was requested.
    pub width: u32,
    pub height: u32,
    pixel_format: PixelFormat,
}

const EBUSY: i32 = 16;

fn open_error(path: &str, e: std::io::Error) -> CameraError {
    if e.raw_os_error() == Some(EBUSY) {
        CameraError::DeviceBusy
    } else {
        CameraError::DeviceNotFound(format!("{path}: {e}"))
    }
}

fn is_capture_device(caps: &v4l::capability::Capabilities) -> bool {
    caps.capabilities
        .contains(v4l::capability::Flags::VIDEO_CAPTURE)
}

impl Camera {
    /// Open `path` (e.g. "/dev/video0") and negotiate `width`x`height`.
    pub fn open(path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(path).exists() {
            return Err(CameraError::DeviceNotFound(path.to_string()));
        }
        let device = Device::with_path(path).map_err(|e| open_error(path, e))?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::CaptureFailed(format!("querying {path}: {e}")))?;
        if !is_capture_device(&caps) {
            return Err(CameraError::StreamingNotSupported);
        }
        tracing::info!(device = path, card = %caps.card, driver = %caps.driver, "camera opened");

        // YUYV preferred; webcams that only stream compressed at this size
        // come back with MJPG, some capture cards with RGB3.
        let mut requested = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("reading format: {e}")))?;
        requested.fourcc = FourCC::new(b"YUYV");
        requested.width = width;
        requested.height = height;
        let format = device
            .set_format(&requested)
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("applying format: {e}")))?;

        let pixel_format = PixelFormat::from_fourcc(format.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "driver offered {} (need YUYV, RGB3 or MJPG)",
                format.fourcc
            ))
        })?;
        tracing::info!(
            width = format.width,
            height = format.height,
            ?pixel_format,
            "capture format"
        );

        Ok(Self {
            device,
            path: path.to_string(),
            width: format.width,
            height: format.height,
            pixel_format,
        })
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Start a capture session. Buffers stay queued until the returned
    /// stream is dropped.
    pub fn stream(&self) -> Result<FrameStream<'_>, CameraError> {
        let stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(format!("mapping buffers: {e}")))?;
        tracing::debug!(device = %self.path, buffers = STREAM_BUFFERS, "capture stream started");
        Ok(FrameStream {
            camera: self,
            stream,
        })
    }

    fn decode(&self, buf: &[u8]) -> Result<image::RgbImage, FrameError> {
        let (w, h) = (self.width, self.height);
        match self.pixel_format {
            PixelFormat::Yuyv => frame::yuyv_to_image(buf, w, h),
            PixelFormat::Rgb3 => frame::rgb_from_raw(buf, w, h),
            PixelFormat::Mjpg => frame::mjpeg_to_rgb(buf),
        }
    }

    /// Capture devices among `/dev/video0` to `/dev/video15`.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..MAX_DEVICE_INDEX)
            .map(device_path)
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).ok()?.query_caps().ok()?;
                is_capture_device(&caps).then(|| DeviceInfo {
                    path,
                    card: caps.card,
                    driver: caps.driver,
                    bus: caps.bus,
                })
            })
            .collect()
    }
}

/// An active mmap capture session on a [`Camera`].
pub struct FrameStream<'a> {
    camera: &'a Camera,
    stream: MmapStream<'a>,
}

impl FrameStream<'_> {
    /// Block until the next buffer is dequeued and convert it to an RGB frame.
    pub fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let (buf, meta) = CaptureStream::next(&mut self.stream)
            .map_err(|e| CameraError::CaptureFailed(format!("dequeue: {e}")))?;

        // Some drivers leave bytesused at zero for fixed-size formats.
        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };
        let image = self.camera.decode(&buf[..used]).map_err(|e| {
            CameraError::CaptureFailed(format!("{:?} frame {}: {e}", self.camera.pixel_format, meta.sequence))
        })?;

        let mut frame = Frame::from_image(image);
        frame.sequence = meta.sequence;
        Ok(frame)
    }
}
