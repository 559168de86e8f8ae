//! Landmark detector adapter.
//!
//! The detector is not reentrant, so it lives on a dedicated OS thread
//! that owns it exclusively. Callers talk to it through a clone-safe
//! [`DetectorHandle`]: each submission carries a oneshot reply channel and
//! at most one may be in flight; a second `submit` fails with
//! [`AdapterError::Busy`] until the first resolves.

use crate::session::{Generation, Submission, SubmissionKind};
use framefit_core::{Detection, LandmarkDetector};
use image::RgbaImage;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("a detection is already in flight")]
    Busy,
    #[error("detector thread exited")]
    ChannelClosed,
    #[error("failed to spawn detector thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// A detection tagged with the generation it was submitted under. Carries
/// the submitted image back so the caller renders exactly what was analysed.
#[derive(Debug)]
pub struct DetectionResult {
    pub generation: Generation,
    pub kind: SubmissionKind,
    pub image: Arc<RgbaImage>,
    pub detection: Detection,
}

struct DetectRequest {
    submission: Submission,
    reply: oneshot::Sender<DetectionResult>,
}

/// Clone-safe handle to the detector thread.
#[derive(Clone)]
pub struct DetectorHandle {
    tx: mpsc::Sender<DetectRequest>,
    in_flight: Arc<AtomicBool>,
}

impl DetectorHandle {
    /// Queue one image for detection. Fails with `Busy` while a previous
    /// submission is unresolved.
    pub fn submit(&self, submission: Submission) -> Result<PendingDetection, AdapterError> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return Err(AdapterError::Busy);
        }

        let (reply, rx) = oneshot::channel();
        let generation = submission.generation;
        if self.tx.try_send(DetectRequest { submission, reply }).is_err() {
            self.in_flight.store(false, Ordering::Release);
            return Err(AdapterError::ChannelClosed);
        }

        tracing::debug!(generation, "detection submitted");
        Ok(PendingDetection { rx })
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Resolves to the detection for one submission.
pub struct PendingDetection {
    rx: oneshot::Receiver<DetectionResult>,
}

impl Future for PendingDetection {
    type Output = Result<DetectionResult, AdapterError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.map_err(|_| AdapterError::ChannelClosed))
    }
}

/// Spawn the detector on a dedicated OS thread.
///
/// The thread runs until every [`DetectorHandle`] is dropped. A detector
/// error is logged and reported as `NotDetected`.
pub fn spawn_detector<D>(detector: D) -> Result<DetectorHandle, AdapterError>
where
    D: LandmarkDetector + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<DetectRequest>(1);
    let in_flight = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&in_flight);

    std::thread::Builder::new()
        .name("framefit-detector".into())
        .spawn(move || {
            let mut detector = detector;
            tracing::info!("detector thread started");

            while let Some(DetectRequest { submission, reply }) = rx.blocking_recv() {
                let detection = match detector.detect(&submission.image) {
                    Ok(detection) => detection,
                    Err(e) => {
                        tracing::warn!(
                            generation = submission.generation,
                            error = %e,
                            "detector failed; treating as no face"
                        );
                        Detection::NotDetected
                    }
                };
                tracing::debug!(
                    generation = submission.generation,
                    face = matches!(detection, Detection::Face(_)),
                    "detection complete"
                );

                flag.store(false, Ordering::Release);
                let _ = reply.send(DetectionResult {
                    generation: submission.generation,
                    kind: submission.kind,
                    image: submission.image,
                    detection,
                });
            }

            tracing::info!("detector thread exiting");
        })
        .map_err(AdapterError::Spawn)?;

    Ok(DetectorHandle { tx, in_flight })
}
