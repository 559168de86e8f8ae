//! In-memory fakes for the device, detector and cart seams.

use framefit_core::catalog::Cart;
use framefit_core::detector::DetectorError;
use framefit_core::landmarks::{index, LANDMARK_COUNT};
use framefit_core::render::encode_png;
use framefit_core::{Detection, Landmark, LandmarkDetector, LandmarkSet};
use framefit_hw::{CameraError, DeviceProvider, Frame, VideoSource};
use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};

pub const FRAME_WIDTH: u32 = 64;
pub const FRAME_HEIGHT: u32 = 48;

pub struct FakeProvider {
    acquired: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
    failure: Option<fn() -> CameraError>,
    fail_reads: bool,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            acquired: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
            failure: None,
            fail_reads: false,
        }
    }

    pub fn failing(failure: fn() -> CameraError) -> Self {
        Self {
            failure: Some(failure),
            ..Self::new()
        }
    }

    pub fn with_read_failure(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    pub fn acquired(&self) -> impl Fn() -> usize {
        let count = Arc::clone(&self.acquired);
        move || count.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> impl Fn() -> usize {
        let count = Arc::clone(&self.released);
        move || count.load(Ordering::SeqCst)
    }
}

impl DeviceProvider for FakeProvider {
    fn acquire(&self) -> Result<Box<dyn VideoSource>, CameraError> {
        if let Some(failure) = self.failure {
            return Err(failure());
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSource {
            released: Arc::clone(&self.released),
            fail_reads: self.fail_reads,
            sequence: 0,
        }))
    }
}

struct FakeSource {
    released: Arc<AtomicUsize>,
    fail_reads: bool,
    sequence: u32,
}

impl VideoSource for FakeSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        if self.fail_reads {
            return Err(CameraError::CaptureFailed("unplugged".into()));
        }
        self.sequence += 1;
        Ok(Frame {
            image: RgbaImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Rgba([90, 120, 150, 255])),
            timestamp: std::time::Instant::now(),
            sequence: self.sequence,
        })
    }
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// A plausible face: eyes level across the upper middle of the image.
pub fn face() -> LandmarkSet {
    let mut points = vec![Landmark::new(0.5, 0.5, 0.0); LANDMARK_COUNT];
    for (idx, x, y) in [
        (index::LEFT_EYE_OUTER, 0.4, 0.4),
        (index::RIGHT_EYE_OUTER, 0.6, 0.4),
        (index::LEFT_CHEEK, 0.3, 0.5),
        (index::RIGHT_CHEEK, 0.7, 0.5),
        (index::TOP_HEAD, 0.5, 0.2),
        (index::CHIN, 0.5, 0.75),
        (index::LEFT_JAW, 0.35, 0.65),
        (index::RIGHT_JAW, 0.65, 0.65),
        (index::LEFT_FOREHEAD, 0.34, 0.3),
        (index::RIGHT_FOREHEAD, 0.66, 0.3),
    ] {
        points[idx] = Landmark::new(x, y, 0.0);
    }
    LandmarkSet::new(points).expect("full mesh")
}

pub fn encode_test_png(width: u32, height: u32) -> Vec<u8> {
    encode_png(&RgbaImage::from_pixel(width, height, Rgba([200, 180, 160, 255])))
        .expect("encode png")
}

/// Always returns the same detection.
pub struct FixedDetector {
    pub detection: Detection,
    pub calls: Arc<AtomicUsize>,
}

impl FixedDetector {
    pub fn face() -> Self {
        Self {
            detection: Detection::Face(face()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn none() -> Self {
        Self {
            detection: Detection::NotDetected,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl LandmarkDetector for FixedDetector {
    fn detect(&mut self, _image: &RgbaImage) -> Result<Detection, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.detection.clone())
    }
}

/// Fails every call.
pub struct BrokenDetector;

impl LandmarkDetector for BrokenDetector {
    fn detect(&mut self, _image: &RgbaImage) -> Result<Detection, DetectorError> {
        Err(DetectorError::InferenceFailed("corrupt model".into()))
    }
}

/// Blocks each call until the test opens the gate once.
pub struct GatedDetector {
    gate: mpsc::Receiver<()>,
    /// Calls entered, counted before blocking.
    pub calls: Arc<AtomicUsize>,
}

impl GatedDetector {
    pub fn new() -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let detector = Self {
            gate: rx,
            calls: Arc::new(AtomicUsize::new(0)),
        };
        (detector, tx)
    }
}

impl LandmarkDetector for GatedDetector {
    fn detect(&mut self, _image: &RgbaImage) -> Result<Detection, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.gate.recv() {
            Ok(()) => Ok(Detection::Face(face())),
            Err(_) => Ok(Detection::NotDetected),
        }
    }
}

#[derive(Default)]
pub struct RecordingCart {
    pub items: Mutex<Vec<String>>,
}

impl Cart for RecordingCart {
    fn add_item(&self, product_id: &str) {
        if let Ok(mut items) = self.items.lock() {
            items.push(product_id.to_string());
        }
    }
}
