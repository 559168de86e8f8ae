//! Device acquisition seam.
//!
//! A [`DeviceProvider`] acquires an exclusive [`VideoSource`]; dropping the
//! source releases the device. The capture session only sees these traits,
//! so tests substitute in-memory sources.

use crate::camera::{Camera, CameraError};
use crate::frame::Frame;

/// An acquired, exclusively owned stream of frames.
pub trait VideoSource: Send {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;
}

/// Acquires a video source.
pub trait DeviceProvider: Send {
    fn acquire(&self) -> Result<Box<dyn VideoSource>, CameraError>;
}

/// Opens a V4L2 camera on every acquisition. Warm-up frames are discarded
/// on the first read rather than during acquisition, so the wait happens on
/// whichever thread reads the stream.
#[derive(Debug, Clone)]
pub struct V4lProvider {
    pub device_path: String,
    pub width: u32,
    pub height: u32,
    /// Frames discarded after opening while exposure settles.
    pub warmup_frames: usize,
}

impl DeviceProvider for V4lProvider {
    fn acquire(&self) -> Result<Box<dyn VideoSource>, CameraError> {
        let camera = Camera::open(&self.device_path, self.width, self.height)?;
        Ok(Box::new(WarmingCamera {
            camera,
            warmup: self.warmup_frames,
        }))
    }
}

struct WarmingCamera {
    camera: Camera,
    warmup: usize,
}

impl VideoSource for WarmingCamera {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let count = std::mem::take(&mut self.warmup);
        if count > 0 {
            tracing::info!(count, "discarding warmup frames");
            self.camera.warm_up(count)?;
        }
        self.camera.capture_frame()
    }
}
