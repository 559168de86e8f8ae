//! Capture session state machine.
//!
//! A session moves between Idle, Acquiring, LiveStreaming, Captured and
//! Error. It owns the acquired video source, running on a [`LiveFeed`]
//! capture thread, for as long as it streams. Every exit path (capture,
//! reset, read failure, drop) releases it by dropping the feed exactly once.
//!
//! Detection runs elsewhere. The session hands out [`Submission`]s tagged
//! with its current [`Generation`] and takes back [`DetectionResult`]s; any
//! result from an older generation is discarded.

use crate::adapter::DetectionResult;
use crate::error::{DeviceError, SessionError};
use crate::feed::{FrameResult, LiveFeed};
use framefit_core::classifier;
use framefit_core::render;
use framefit_core::{Detection, FaceShape, LandmarkSet};
use framefit_hw::DeviceProvider;
use image::RgbaImage;
use std::sync::Arc;
use uuid::Uuid;

/// Monotonic per-session counter. Bumped by start, capture, external image
/// load and reset.
pub type Generation = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    Idle,
    Acquiring,
    LiveStreaming,
    Captured,
    Error,
}

/// Where a submitted image came from, which decides how it is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionKind {
    /// A live camera frame, shown mirrored.
    Live,
    /// A captured snapshot or uploaded photo, shown as-is.
    Photo,
}

/// One image handed to the detector.
#[derive(Debug, Clone)]
pub struct Submission {
    pub generation: Generation,
    pub kind: SubmissionKind,
    /// Raw (un-mirrored) pixels.
    pub image: Arc<RgbaImage>,
}

/// What applying a detection result did to the session.
#[derive(Debug)]
pub enum Outcome {
    /// The result belonged to an earlier generation and was dropped.
    Stale,
    NoFace,
    Face {
        landmarks: LandmarkSet,
        shape: FaceShape,
        /// True when this face was classified now rather than read from cache.
        newly_classified: bool,
    },
}

pub struct CaptureSession<P: DeviceProvider> {
    id: Uuid,
    provider: P,
    mode: CaptureMode,
    generation: Generation,
    feed: Option<LiveFeed>,
    latest_frame: Option<Arc<RgbaImage>>,
    snapshot: Option<Arc<RgbaImage>>,
    snapshot_pending: bool,
    face_shape: Option<FaceShape>,
}

impl<P: DeviceProvider> CaptureSession<P> {
    pub fn new(provider: P) -> Self {
        let id = Uuid::new_v4();
        tracing::info!(session = %id, "session created");
        Self {
            id,
            provider,
            mode: CaptureMode::Idle,
            generation: 0,
            feed: None,
            latest_frame: None,
            snapshot: None,
            snapshot_pending: false,
            face_shape: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// The cached face shape, if one has been classified since the last
    /// `reanalyze()`.
    pub fn face_shape(&self) -> Option<FaceShape> {
        self.face_shape
    }

    /// The captured or uploaded image, raw orientation.
    pub fn snapshot(&self) -> Option<&Arc<RgbaImage>> {
        self.snapshot.as_ref()
    }

    pub fn has_device(&self) -> bool {
        self.feed.is_some()
    }

    /// The running feed while live. Await its frames off the session and
    /// hand them back through [`accept_frame`](Self::accept_frame).
    pub fn feed_mut(&mut self) -> Option<&mut LiveFeed> {
        self.feed.as_mut()
    }

    /// Acquire the device and begin streaming.
    pub fn start(&mut self) -> Result<(), SessionError> {
        self.require(CaptureMode::Idle, "start")?;
        self.mode = CaptureMode::Acquiring;
        self.bump();

        let source = match self.provider.acquire() {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "device acquisition failed");
                return Err(self.fail(DeviceError::from(&e)));
            }
        };
        match LiveFeed::spawn(source) {
            Ok(feed) => {
                self.feed = Some(feed);
                self.mode = CaptureMode::LiveStreaming;
                tracing::info!(session = %self.id, generation = self.generation, "live streaming");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "failed to spawn capture thread");
                Err(self.fail(DeviceError::Unknown))
            }
        }
    }

    /// Freeze the most recent live frame and release the device.
    ///
    /// Fails with `NoFrame`, staying live, when the camera has not delivered
    /// anything yet.
    pub fn capture_frame(&mut self) -> Result<(), SessionError> {
        self.require(CaptureMode::LiveStreaming, "capture_frame")?;

        if let Some(frame) = self.feed.as_mut().and_then(LiveFeed::try_latest) {
            self.record_frame(frame)?;
        }
        let Some(frame) = self.latest_frame.take() else {
            return Err(SessionError::NoFrame);
        };

        self.release_device();
        self.snapshot = Some(frame);
        self.snapshot_pending = true;
        self.bump();
        self.mode = CaptureMode::Captured;
        tracing::info!(session = %self.id, generation = self.generation, "frame captured");
        Ok(())
    }

    /// Use an uploaded image instead of the camera.
    pub fn load_external_image(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.require(CaptureMode::Idle, "load_external_image")?;

        match render::decode_rgba(bytes) {
            Ok(image) => {
                tracing::info!(
                    session = %self.id,
                    width = image.width(),
                    height = image.height(),
                    "external image loaded"
                );
                self.snapshot = Some(Arc::new(image));
                self.snapshot_pending = true;
                self.bump();
                self.mode = CaptureMode::Captured;
                Ok(())
            }
            Err(e) => {
                self.mode = CaptureMode::Error;
                tracing::warn!(session = %self.id, error = %e, "external image rejected");
                self.mode = CaptureMode::Idle;
                Err(SessionError::DecodeFailure(e.to_string()))
            }
        }
    }

    /// Return to Idle, dropping the snapshot and any held device.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        match self.mode {
            CaptureMode::Idle => {
                tracing::debug!(session = %self.id, "reset while idle");
                Ok(())
            }
            CaptureMode::Captured | CaptureMode::Error => {
                self.release_device();
                self.latest_frame = None;
                self.snapshot = None;
                self.snapshot_pending = false;
                self.bump();
                self.mode = CaptureMode::Idle;
                tracing::info!(session = %self.id, generation = self.generation, "session reset");
                Ok(())
            }
            mode => Err(SessionError::InvalidTransition { op: "reset", mode }),
        }
    }

    /// Forget the cached face shape so the next face is classified again.
    /// A captured photo is queued for detection once more.
    pub fn reanalyze(&mut self) {
        if self.face_shape.take().is_some() {
            tracing::info!(session = %self.id, "face shape cleared for reanalysis");
        }
        if self.mode == CaptureMode::Captured && self.snapshot.is_some() {
            self.snapshot_pending = true;
        }
    }

    /// Take a frame delivered by the feed. Returns the live submission for
    /// it; a read error ends the stream and releases the device.
    pub fn accept_frame(&mut self, frame: FrameResult) -> Result<Submission, SessionError> {
        self.require(CaptureMode::LiveStreaming, "accept_frame")?;
        let image = self.record_frame(frame)?;
        Ok(Submission {
            generation: self.generation,
            kind: SubmissionKind::Live,
            image,
        })
    }

    /// The captured or uploaded snapshot, once per capture or reanalysis.
    /// Live frames arrive through the feed instead.
    pub fn next_submission(&mut self) -> Option<Submission> {
        if self.mode != CaptureMode::Captured || !self.snapshot_pending {
            return None;
        }
        self.snapshot_pending = false;
        self.snapshot.as_ref().map(|image| Submission {
            generation: self.generation,
            kind: SubmissionKind::Photo,
            image: Arc::clone(image),
        })
    }

    /// Apply a detection result. Faces are classified on first sight and
    /// the shape is cached until `reanalyze()`.
    pub fn accept(&mut self, result: DetectionResult) -> Outcome {
        if result.generation != self.generation {
            tracing::debug!(
                session = %self.id,
                result_generation = result.generation,
                current = self.generation,
                "discarding stale detection"
            );
            return Outcome::Stale;
        }

        match result.detection {
            Detection::NotDetected => Outcome::NoFace,
            Detection::Face(landmarks) => {
                let newly_classified = self.face_shape.is_none();
                let shape = *self
                    .face_shape
                    .get_or_insert_with(|| classifier::classify(&landmarks));
                if newly_classified {
                    tracing::info!(session = %self.id, shape = %shape, "face shape detected");
                }
                Outcome::Face {
                    landmarks,
                    shape,
                    newly_classified,
                }
            }
        }
    }

    fn require(&self, expected: CaptureMode, op: &'static str) -> Result<(), SessionError> {
        if self.mode == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                op,
                mode: self.mode,
            })
        }
    }

    fn bump(&mut self) {
        self.generation += 1;
    }

    fn record_frame(&mut self, frame: FrameResult) -> Result<Arc<RgbaImage>, SessionError> {
        match frame {
            Ok(frame) => {
                tracing::trace!(
                    session = %self.id,
                    seq = frame.sequence,
                    width = frame.width(),
                    height = frame.height(),
                    "frame read"
                );
                let image = Arc::new(frame.image);
                self.latest_frame = Some(Arc::clone(&image));
                Ok(image)
            }
            Err(e) => {
                tracing::warn!(session = %self.id, error = %e, "frame read failed");
                Err(self.fail(DeviceError::from(&e)))
            }
        }
    }

    /// Error → Idle with the device released.
    fn fail(&mut self, error: DeviceError) -> SessionError {
        self.mode = CaptureMode::Error;
        self.release_device();
        self.latest_frame = None;
        self.bump();
        self.mode = CaptureMode::Idle;
        SessionError::Device(error)
    }

    fn release_device(&mut self) {
        if let Some(feed) = self.feed.take() {
            drop(feed);
            tracing::info!(session = %self.id, "device released");
        }
    }
}

impl<P: DeviceProvider> Drop for CaptureSession<P> {
    fn drop(&mut self) {
        self.release_device();
    }
}
