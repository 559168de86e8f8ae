//! Async session driver.
//!
//! Owns one [`CaptureSession`], one detector handle and one renderer. It
//! serves [`Command`]s while at most one detection is in flight, feeds each
//! result back through the session (which discards stale generations),
//! renders the surviving ones and reports progress as [`Event`]s.
//!
//! Whatever was analysed or rendered belongs to one session generation.
//! When the generation moves on, the driver drops it, so nothing from a
//! superseded live stream is re-rendered or exported.

use crate::adapter::{AdapterError, DetectionResult, DetectorHandle, PendingDetection};
use crate::error::SessionError;
use crate::feed::FrameResult;
use crate::session::{CaptureMode, CaptureSession, Generation, Outcome, Submission, SubmissionKind};
use framefit_core::catalog::Cart;
use framefit_core::geometry::{self, RenderMode};
use framefit_core::mirror::HorizontalMirror;
use framefit_core::recommend;
use framefit_core::render::{Overlay, Renderer, View};
use framefit_core::{FaceShape, FrameAsset, LandmarkSet, Surface};
use framefit_hw::DeviceProvider;
use image::RgbaImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// How long to wait before resubmitting when the detector is busy.
const BUSY_RETRY: Duration = Duration::from_millis(50);

pub enum Command {
    Start,
    Capture,
    LoadImage(Vec<u8>),
    Reset,
    Reanalyze,
    /// Choose the frame to try on. The bitmap, when given, is composited in
    /// photo mode; live mode always draws the synthetic frame.
    SelectFrame {
        asset: FrameAsset,
        bitmap: Option<Arc<RgbaImage>>,
    },
    /// Add the selected frame to the cart. Fire-and-forget.
    AddToCart,
    /// PNG of the mirror-corrected composite of the last rendered view.
    Export(oneshot::Sender<Result<Vec<u8>, SessionError>>),
    Shutdown,
}

#[derive(Debug)]
pub enum Event {
    ModeChanged(CaptureMode),
    FaceShape {
        shape: FaceShape,
        recommended: &'static [&'static str],
    },
    /// What the user should see now.
    Rendered(Arc<RgbaImage>),
    /// No face in the latest analysed image; the overlay is cleared.
    FaceLost,
    Error(SessionError),
}

struct SelectedFrame {
    asset: FrameAsset,
    bitmap: Option<Arc<RgbaImage>>,
}

impl SelectedFrame {
    fn overlay(&self, landmarks: &LandmarkSet, kind: SubmissionKind, surface: Surface) -> Overlay {
        match (kind, &self.bitmap) {
            (SubmissionKind::Photo, Some(bitmap)) => Overlay::Bitmap {
                transform: geometry::place(landmarks, RenderMode::PhotoAsset, surface),
                bitmap: Arc::clone(bitmap),
            },
            _ => Overlay::Synthetic {
                transform: geometry::place(landmarks, RenderMode::LiveSynthetic, surface),
                style: self.asset.style,
                label: self.asset.name.clone(),
            },
        }
    }
}

/// The last image that came back from the detector with a current generation.
struct Analysed {
    kind: SubmissionKind,
    image: Arc<RgbaImage>,
    landmarks: Option<LandmarkSet>,
}

pub struct SessionDriver<P: DeviceProvider> {
    session: CaptureSession<P>,
    detector: DetectorHandle,
    renderer: Renderer,
    cart: Option<Arc<dyn Cart>>,
    events: mpsc::Sender<Event>,
    selected: Option<SelectedFrame>,
    analysed: Option<Analysed>,
    view: Option<View>,
}

impl<P: DeviceProvider> SessionDriver<P> {
    pub fn new(
        session: CaptureSession<P>,
        detector: DetectorHandle,
        renderer: Renderer,
        events: mpsc::Sender<Event>,
    ) -> Self {
        Self {
            session,
            detector,
            renderer,
            cart: None,
            events,
            selected: None,
            analysed: None,
            view: None,
        }
    }

    pub fn with_cart(mut self, cart: Arc<dyn Cart>) -> Self {
        self.cart = Some(cart);
        self
    }

    /// Run until `Shutdown` or until every command sender is dropped.
    ///
    /// Live frames are read on the session's capture thread and awaited
    /// here. A busy detector is reported once and retried; only a detector
    /// thread that has gone away ends the run with an error.
    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) -> Result<(), SessionError> {
        tracing::info!(session = %self.session.id(), "session driver started");
        let mut pending: Option<PendingDetection> = None;
        let mut queued: Option<Submission> = None;
        let mut busy_reported = false;

        loop {
            if queued
                .as_ref()
                .is_some_and(|q| q.generation != self.session.generation())
            {
                queued = None;
            }
            if pending.is_none() {
                if queued.is_none() {
                    queued = self.session.next_submission();
                }
                if let Some(submission) = queued.take() {
                    match self.detector.submit(submission.clone()) {
                        Ok(detection) => {
                            pending = Some(detection);
                            busy_reported = false;
                        }
                        Err(AdapterError::Busy) => {
                            tracing::debug!(
                                generation = submission.generation,
                                "detector busy; will retry"
                            );
                            if !busy_reported {
                                busy_reported = true;
                                self.emit(Event::Error(AdapterError::Busy.into())).await;
                            }
                            queued = Some(submission);
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
            }

            let want_frame = pending.is_none();
            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => break,
                    Some(command) => self.handle(command).await,
                },
                result = wait_for(&mut pending) => {
                    pending = None;
                    self.on_detection(result?).await;
                }
                frame = next_live_frame(&mut self.session, want_frame) => {
                    // A newer frame replaces one still waiting on a busy detector.
                    queued = self.on_frame(frame).await;
                }
                () = tokio::time::sleep(BUSY_RETRY), if queued.is_some() => {}
            }
        }

        tracing::info!(session = %self.session.id(), "session driver stopped");
        Ok(())
    }

    async fn on_frame(&mut self, frame: FrameResult) -> Option<Submission> {
        let before = (self.session.mode(), self.session.generation());
        let submission = match self.session.accept_frame(frame) {
            Ok(submission) => Some(submission),
            Err(e) => {
                tracing::warn!(session = %self.session.id(), error = %e, "live stream ended");
                self.emit(Event::Error(e)).await;
                None
            }
        };
        self.settle(before).await;
        submission
    }

    async fn handle(&mut self, command: Command) {
        let before = (self.session.mode(), self.session.generation());
        let result = match command {
            Command::Start => self.session.start(),
            Command::Capture => self.session.capture_frame(),
            Command::LoadImage(bytes) => self.session.load_external_image(&bytes),
            Command::Reset => self.session.reset(),
            Command::Reanalyze => {
                self.session.reanalyze();
                Ok(())
            }
            Command::SelectFrame { asset, bitmap } => {
                tracing::info!(product = %asset.product_id, bitmap = bitmap.is_some(), "frame selected");
                self.selected = Some(SelectedFrame { asset, bitmap });
                if self.analysed.is_some() {
                    self.render().await;
                }
                Ok(())
            }
            Command::AddToCart => {
                self.add_to_cart();
                Ok(())
            }
            Command::Export(reply) => {
                let _ = reply.send(self.export());
                Ok(())
            }
            Command::Shutdown => Ok(()),
        };

        if let Err(e) = result {
            tracing::warn!(session = %self.session.id(), error = %e, "command failed");
            self.emit(Event::Error(e)).await;
        }
        self.settle(before).await;
    }

    /// Drop state from a superseded generation and report any mode change.
    async fn settle(&mut self, (mode, generation): (CaptureMode, Generation)) {
        if self.session.generation() != generation
            && (self.analysed.is_some() || self.view.is_some())
        {
            tracing::debug!(
                session = %self.session.id(),
                generation = self.session.generation(),
                "discarding superseded view"
            );
            self.analysed = None;
            self.view = None;
        }
        self.report_mode(mode).await;
    }

    async fn on_detection(&mut self, result: DetectionResult) {
        let kind = result.kind;
        let image = Arc::clone(&result.image);
        let had_face = self
            .analysed
            .as_ref()
            .map_or(true, |a| a.landmarks.is_some());

        let landmarks = match self.session.accept(result) {
            Outcome::Stale => return,
            Outcome::NoFace => {
                if had_face {
                    self.emit(Event::FaceLost).await;
                }
                None
            }
            Outcome::Face {
                landmarks,
                shape,
                newly_classified,
            } => {
                if newly_classified {
                    self.emit(Event::FaceShape {
                        shape,
                        recommended: recommend::recommended_shapes(shape),
                    })
                    .await;
                }
                Some(landmarks)
            }
        };

        self.analysed = Some(Analysed {
            kind,
            image,
            landmarks,
        });
        self.render().await;
    }

    async fn render(&mut self) {
        let Some(analysed) = self.analysed.as_ref() else {
            return;
        };
        let surface = Surface::new(analysed.image.width(), analysed.image.height());

        let overlay = match (&analysed.landmarks, &self.selected) {
            (Some(landmarks), Some(selected)) => {
                Some(selected.overlay(landmarks, analysed.kind, surface))
            }
            _ => None,
        };
        let (base, mirrored) = match analysed.kind {
            SubmissionKind::Live => (
                HorizontalMirror::new(surface.width).apply_image(&analysed.image),
                true,
            ),
            SubmissionKind::Photo => (analysed.image.as_ref().clone(), false),
        };

        let view = View {
            base,
            mirrored,
            overlay,
        };
        let preview = self.renderer.preview(&view);
        self.view = Some(view);
        self.emit(Event::Rendered(Arc::new(preview))).await;
    }

    fn add_to_cart(&self) {
        match (&self.cart, &self.selected) {
            (Some(cart), Some(selected)) => {
                tracing::info!(product = %selected.asset.product_id, "adding to cart");
                cart.add_item(&selected.asset.product_id);
            }
            (None, _) => tracing::warn!("no cart configured"),
            (_, None) => tracing::debug!("add to cart with no frame selected"),
        }
    }

    fn export(&self) -> Result<Vec<u8>, SessionError> {
        let view = self.view.as_ref().ok_or(SessionError::NothingToExport)?;
        Ok(self.renderer.export_png(view)?)
    }

    async fn report_mode(&mut self, before: CaptureMode) {
        let now = self.session.mode();
        if now != before {
            self.emit(Event::ModeChanged(now)).await;
        }
    }

    async fn emit(&mut self, event: Event) {
        if self.events.send(event).await.is_err() {
            tracing::debug!("event receiver dropped");
        }
    }
}

async fn wait_for(
    pending: &mut Option<PendingDetection>,
) -> Result<DetectionResult, AdapterError> {
    match pending {
        Some(detection) => detection.await,
        None => std::future::pending().await,
    }
}

/// Next frame from the live feed, or never when not streaming or not wanted.
async fn next_live_frame<P: DeviceProvider>(
    session: &mut CaptureSession<P>,
    wanted: bool,
) -> FrameResult {
    match session.feed_mut() {
        Some(feed) if wanted => feed.next().await,
        _ => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::spawn_detector;
    use crate::error::DeviceError;
    use crate::testing::{
        encode_test_png, FakeProvider, FixedDetector, GatedDetector, RecordingCart, FRAME_HEIGHT,
        FRAME_WIDTH,
    };
    use framefit_core::{LandmarkDetector, StyleCategory};
    use framefit_hw::CameraError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    struct Harness {
        commands: mpsc::Sender<Command>,
        events: mpsc::Receiver<Event>,
        task: JoinHandle<Result<(), SessionError>>,
    }

    impl Harness {
        fn new<D>(provider: FakeProvider, detector: D, cart: Option<Arc<dyn Cart>>) -> Self
        where
            D: LandmarkDetector + Send + 'static,
        {
            Self::with_handle(provider, spawn_detector(detector).unwrap(), cart)
        }

        fn with_handle(
            provider: FakeProvider,
            handle: DetectorHandle,
            cart: Option<Arc<dyn Cart>>,
        ) -> Self {
            let (command_tx, command_rx) = mpsc::channel(16);
            let (event_tx, event_rx) = mpsc::channel(256);
            let mut driver = SessionDriver::new(
                CaptureSession::new(provider),
                handle,
                Renderer::new(),
                event_tx,
            );
            if let Some(cart) = cart {
                driver = driver.with_cart(cart);
            }
            Self {
                commands: command_tx,
                events: event_rx,
                task: tokio::spawn(driver.run(command_rx)),
            }
        }

        async fn send(&self, command: Command) {
            self.commands.send(command).await.unwrap();
        }

        async fn next_event(&mut self) -> Event {
            timeout(Duration::from_secs(5), self.events.recv())
                .await
                .expect("timed out waiting for event")
                .expect("driver stopped")
        }

        /// Collect events up to and including the first that matches.
        async fn until(&mut self, pred: impl Fn(&Event) -> bool) -> Vec<Event> {
            let mut seen = Vec::new();
            loop {
                let event = self.next_event().await;
                let done = pred(&event);
                seen.push(event);
                if done {
                    return seen;
                }
            }
        }

        async fn export(&self) -> Result<Vec<u8>, SessionError> {
            let (tx, rx) = oneshot::channel();
            self.send(Command::Export(tx)).await;
            rx.await.unwrap()
        }

        /// Events already emitted, without waiting.
        fn drain(&mut self) -> Vec<Event> {
            let mut seen = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                seen.push(event);
            }
            seen
        }

        async fn shutdown(self) {
            self.commands.send(Command::Shutdown).await.unwrap();
            self.task.await.unwrap().unwrap();
        }
    }

    async fn wait_for_calls(calls: &AtomicUsize, count: usize) {
        timeout(Duration::from_secs(5), async {
            while calls.load(Ordering::SeqCst) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("detector was never called");
    }

    fn asset() -> FrameAsset {
        FrameAsset {
            product_id: "ray-01".into(),
            name: "Classic Aviator".into(),
            image_ref: "aviator.png".into(),
            style: StyleCategory::Sunglasses,
        }
    }

    fn is_rendered(event: &Event) -> bool {
        matches!(event, Event::Rendered(_))
    }

    #[tokio::test]
    async fn test_photo_flow_renders_and_exports() {
        let mut h = Harness::new(FakeProvider::new(), FixedDetector::face(), None);
        h.send(Command::SelectFrame {
            asset: asset(),
            bitmap: Some(Arc::new(RgbaImage::from_pixel(20, 10, image::Rgba([0, 0, 0, 255])))),
        })
        .await;
        h.send(Command::LoadImage(encode_test_png(80, 60))).await;

        let events = h.until(is_rendered).await;
        assert!(matches!(events[0], Event::ModeChanged(CaptureMode::Captured)));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::FaceShape { recommended, .. } if !recommended.is_empty())));
        let Some(Event::Rendered(preview)) = events.last() else {
            panic!("expected a render");
        };
        assert_eq!(preview.dimensions(), (80, 60));

        let png = h.export().await.unwrap();
        let exported = image::load_from_memory(&png).unwrap();
        assert_eq!((exported.width(), exported.height()), (80, 60));

        h.shutdown().await;
    }

    #[tokio::test]
    async fn test_live_then_capture() {
        let provider = FakeProvider::new();
        let released = provider.released();
        let mut h = Harness::new(provider, FixedDetector::face(), None);

        h.send(Command::SelectFrame {
            asset: asset(),
            bitmap: None,
        })
        .await;
        h.send(Command::Start).await;
        let mut events = h.until(is_rendered).await;
        assert!(matches!(
            events[0],
            Event::ModeChanged(CaptureMode::LiveStreaming)
        ));

        h.send(Command::Capture).await;
        events.extend(
            h.until(|e| matches!(e, Event::ModeChanged(CaptureMode::Captured)))
                .await,
        );
        assert_eq!(released(), 1);

        let after_capture = h.until(is_rendered).await;
        let Some(Event::Rendered(photo)) = after_capture.last() else {
            panic!("expected photo render");
        };
        assert_eq!(photo.dimensions(), (FRAME_WIDTH, FRAME_HEIGHT));
        events.extend(after_capture);

        let shapes = events
            .iter()
            .filter(|e| matches!(e, Event::FaceShape { .. }))
            .count();
        assert_eq!(shapes, 1, "face shape is classified once and cached");

        h.shutdown().await;
    }

    #[tokio::test]
    async fn test_stale_result_never_rendered() {
        let (detector, gate) = GatedDetector::new();
        let calls = Arc::clone(&detector.calls);
        let mut h = Harness::new(FakeProvider::new(), detector, None);

        // First live frame is submitted and held at the gate.
        h.send(Command::Start).await;
        h.until(|e| matches!(e, Event::ModeChanged(CaptureMode::LiveStreaming)))
            .await;
        wait_for_calls(&calls, 1).await;
        h.send(Command::Capture).await;
        h.until(|e| matches!(e, Event::ModeChanged(CaptureMode::Captured)))
            .await;
        h.send(Command::Reset).await;
        h.until(|e| matches!(e, Event::ModeChanged(CaptureMode::Idle)))
            .await;
        h.send(Command::Start).await;
        h.until(|e| matches!(e, Event::ModeChanged(CaptureMode::LiveStreaming)))
            .await;

        // Release the stale frame, then one current frame.
        gate.send(()).unwrap();
        gate.send(()).unwrap();
        h.until(is_rendered).await;

        let extra = timeout(Duration::from_millis(200), h.events.recv()).await;
        assert!(
            !matches!(extra, Ok(Some(Event::Rendered(_)))),
            "stale frame must not render"
        );

        drop(gate);
        h.shutdown().await;
    }

    #[tokio::test]
    async fn test_capture_drops_live_view() {
        let (detector, gate) = GatedDetector::new();
        let mut h = Harness::new(FakeProvider::new(), detector, None);

        h.send(Command::Start).await;
        gate.send(()).unwrap();
        h.until(is_rendered).await;
        assert!(h.export().await.is_ok());

        // The snapshot is held at the gate, so nothing current is analysed.
        h.send(Command::Capture).await;
        h.until(|e| matches!(e, Event::ModeChanged(CaptureMode::Captured)))
            .await;
        h.send(Command::SelectFrame {
            asset: asset(),
            bitmap: None,
        })
        .await;
        assert!(matches!(
            h.export().await,
            Err(SessionError::NothingToExport)
        ));
        assert!(
            !h.drain().iter().any(is_rendered),
            "live view must not be re-rendered after capture"
        );

        drop(gate);
        h.shutdown().await;
    }

    #[tokio::test]
    async fn test_busy_detector_retried() {
        let (detector, gate) = GatedDetector::new();
        let handle = spawn_detector(detector).unwrap();
        let blocker = handle
            .submit(Submission {
                generation: 0,
                kind: SubmissionKind::Photo,
                image: Arc::new(RgbaImage::new(8, 8)),
            })
            .unwrap();
        let mut h = Harness::with_handle(FakeProvider::new(), handle, None);

        h.send(Command::LoadImage(encode_test_png(32, 24))).await;
        let events = h.until(|e| matches!(e, Event::Error(_))).await;
        assert!(matches!(
            events.last(),
            Some(Event::Error(SessionError::Adapter(AdapterError::Busy)))
        ));

        gate.send(()).unwrap();
        blocker.await.unwrap();
        gate.send(()).unwrap();
        let events = h.until(is_rendered).await;
        assert!(
            !events.iter().any(|e| matches!(e, Event::Error(_))),
            "busy is reported once"
        );
        assert!(h.export().await.is_ok());

        h.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_face_clears_overlay() {
        let mut h = Harness::new(FakeProvider::new(), FixedDetector::none(), None);
        h.send(Command::SelectFrame {
            asset: asset(),
            bitmap: None,
        })
        .await;
        h.send(Command::LoadImage(encode_test_png(40, 30))).await;

        let events = h.until(is_rendered).await;
        assert!(events.iter().any(|e| matches!(e, Event::FaceLost)));
        assert!(!events.iter().any(|e| matches!(e, Event::FaceShape { .. })));

        h.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_failure_reported() {
        let provider =
            FakeProvider::failing(|| CameraError::PermissionDenied("/dev/video0".into()));
        let mut h = Harness::new(provider, FixedDetector::face(), None);

        h.send(Command::Start).await;
        let event = h.next_event().await;
        assert!(matches!(
            event,
            Event::Error(SessionError::Device(DeviceError::PermissionDenied))
        ));

        h.shutdown().await;
    }

    #[tokio::test]
    async fn test_export_before_render() {
        let h = Harness::new(FakeProvider::new(), FixedDetector::face(), None);
        assert!(matches!(
            h.export().await,
            Err(SessionError::NothingToExport)
        ));
        h.shutdown().await;
    }

    #[tokio::test]
    async fn test_reset_clears_export() {
        let mut h = Harness::new(FakeProvider::new(), FixedDetector::face(), None);
        h.send(Command::LoadImage(encode_test_png(16, 16))).await;
        h.until(is_rendered).await;
        assert!(h.export().await.is_ok());

        h.send(Command::Reset).await;
        assert!(matches!(
            h.export().await,
            Err(SessionError::NothingToExport)
        ));
        h.shutdown().await;
    }

    #[tokio::test]
    async fn test_add_to_cart() {
        let cart = Arc::new(RecordingCart::default());
        let h = Harness::new(
            FakeProvider::new(),
            FixedDetector::face(),
            Some(cart.clone() as Arc<dyn Cart>),
        );

        h.send(Command::AddToCart).await;
        h.send(Command::SelectFrame {
            asset: asset(),
            bitmap: None,
        })
        .await;
        h.send(Command::AddToCart).await;
        h.shutdown().await;

        assert_eq!(*cart.items.lock().unwrap(), vec!["ray-01".to_string()]);
    }
}
