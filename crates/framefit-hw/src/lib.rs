//! framefit-hw — Hardware abstraction for camera capture.
//!
//! Provides V4L2-based camera access with YUYV/MJPG negotiation and
//! conversion to RGBA frames, behind an acquire/release device seam.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use source::{DeviceProvider, V4lProvider, VideoSource};
