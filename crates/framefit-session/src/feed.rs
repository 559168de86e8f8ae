//! Live camera feed.
//!
//! Device reads block for a frame interval or longer, so the acquired
//! [`VideoSource`] moves onto a dedicated OS thread that pushes frames into
//! a one-slot channel. Async callers await [`LiveFeed::next`]; the session
//! never touches the device from a runtime worker.
//!
//! Dropping the feed closes the channel and joins the thread, which drops
//! the source. Release is therefore complete when the drop returns.

use framefit_hw::{CameraError, Frame, VideoSource};
use std::thread::JoinHandle;
use tokio::sync::mpsc;

pub type FrameResult = Result<Frame, CameraError>;

pub struct LiveFeed {
    rx: mpsc::Receiver<FrameResult>,
    thread: Option<JoinHandle<()>>,
}

impl LiveFeed {
    /// Start reading `source` on its own thread. The thread stops after the
    /// first read error (which it still delivers) or once the feed is dropped.
    pub fn spawn(source: Box<dyn VideoSource>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<FrameResult>(1);

        let thread = std::thread::Builder::new()
            .name("framefit-capture".into())
            .spawn(move || {
                let mut source = source;
                tracing::debug!("capture thread started");

                loop {
                    let frame = source.next_frame();
                    let failed = frame.is_err();
                    if tx.blocking_send(frame).is_err() || failed {
                        break;
                    }
                }

                drop(source);
                tracing::debug!("capture thread exiting");
            })?;

        Ok(Self {
            rx,
            thread: Some(thread),
        })
    }

    /// Wait for the next frame. A feed whose thread has exited reports a
    /// capture failure.
    pub async fn next(&mut self) -> FrameResult {
        match self.rx.recv().await {
            Some(frame) => frame,
            None => Err(CameraError::CaptureFailed("capture thread exited".into())),
        }
    }

    /// The newest frame already delivered, without waiting. Stops at the
    /// first error so it is not skipped over.
    pub fn try_latest(&mut self) -> Option<FrameResult> {
        let mut latest = None;
        while let Ok(frame) = self.rx.try_recv() {
            let failed = frame.is_err();
            latest = Some(frame);
            if failed {
                break;
            }
        }
        latest
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        self.rx.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("capture thread panicked");
            }
        }
    }
}
