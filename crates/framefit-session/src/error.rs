use crate::adapter::AdapterError;
use crate::session::CaptureMode;
use framefit_core::render::RenderError;
use framefit_hw::CameraError;
use thiserror::Error;

/// Why the camera could not be used. Surfaced to the caller as-is; the
/// session never retries on its own.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera device found")]
    DeviceNotFound,
    #[error("camera unavailable")]
    Unknown,
}

impl From<&CameraError> for DeviceError {
    fn from(e: &CameraError) -> Self {
        match e {
            CameraError::PermissionDenied(_) => DeviceError::PermissionDenied,
            CameraError::DeviceNotFound(_) => DeviceError::DeviceNotFound,
            _ => DeviceError::Unknown,
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    #[error("failed to decode image: {0}")]
    DecodeFailure(String),
    #[error("{op} is not valid while {mode:?}")]
    InvalidTransition { op: &'static str, mode: CaptureMode },
    #[error("no live frame has arrived yet")]
    NoFrame,
    #[error("nothing has been rendered yet")]
    NothingToExport,
    #[error("detector: {0}")]
    Adapter(#[from] AdapterError),
    #[error("render failed: {0}")]
    Render(#[from] RenderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_error_mapping() {
        assert_eq!(
            DeviceError::from(&CameraError::PermissionDenied("/dev/video0".into())),
            DeviceError::PermissionDenied
        );
        assert_eq!(
            DeviceError::from(&CameraError::DeviceNotFound("/dev/video0".into())),
            DeviceError::DeviceNotFound
        );
        assert_eq!(DeviceError::from(&CameraError::DeviceBusy), DeviceError::Unknown);
        assert_eq!(
            DeviceError::from(&CameraError::CaptureFailed("timeout".into())),
            DeviceError::Unknown
        );
    }

    #[test]
    fn test_invalid_transition_message() {
        let e = SessionError::InvalidTransition {
            op: "start",
            mode: CaptureMode::LiveStreaming,
        };
        assert_eq!(e.to_string(), "start is not valid while LiveStreaming");
    }
}
