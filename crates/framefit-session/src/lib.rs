//! framefit-session — Capture sessions for eyewear try-on.
//!
//! A [`CaptureSession`] owns the camera while it streams, reading it on a
//! [`LiveFeed`] thread, and decides what gets analysed. The detector runs
//! on its own thread behind a [`DetectorHandle`]. A [`SessionDriver`] ties
//! both to the renderer and reports progress as [`Event`]s.

pub mod adapter;
pub mod config;
pub mod driver;
pub mod error;
pub mod feed;
pub mod session;

#[cfg(test)]
mod testing;

pub use adapter::{spawn_detector, AdapterError, DetectionResult, DetectorHandle};
pub use config::{Config, ConfigError};
pub use driver::{Command, Event, SessionDriver};
pub use error::{DeviceError, SessionError};
pub use feed::LiveFeed;
pub use session::{CaptureMode, CaptureSession, Generation, Outcome, Submission, SubmissionKind};
