//! handmark-hw: hardware abstraction for camera capture.
//!
//! Provides V4L2-based camera access and the RGB [`Frame`] type the rest
//! of the workspace draws on.

pub mod camera;
pub mod frame;

pub use camera::{device_path, Camera, CameraError, DeviceInfo, FrameStream, PixelFormat};
pub use frame::{Frame, FrameError};
