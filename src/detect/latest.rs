use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, Sender, TrySendError};
use image::RgbImage;
use parking_lot::Mutex;

use super::types::{DetectionResult, PoseDetector};

/// Runs a detector on its own worker thread and never blocks the caller.
///
/// `process` hands the frame to the worker (dropping it if the worker is
/// still busy) and returns the most recently *completed* result. That result
/// may belong to an earlier frame: its `sequence` names the submission that
/// produced it, so callers can see the lag.
pub struct LatestResultDetector {
    name: String,
    names: &'static [&'static str],
    edges: &'static [(usize, usize)],
    frames: Option<Sender<(u64, RgbImage)>>,
    slot: Arc<Mutex<DetectionResult>>,
    latest: DetectionResult,
    submitted: u64,
    worker: Option<JoinHandle<()>>,
}

impl LatestResultDetector {
    pub fn new(inner: Box<dyn PoseDetector>) -> Result<Self> {
        let name = format!("{} (async)", inner.model_name());
        let names = inner.landmark_names();
        let edges = inner.skeleton_edges();
        let slot = Arc::new(Mutex::new(DetectionResult::default()));
        let (tx, rx) = bounded::<(u64, RgbImage)>(1);

        let worker_slot = Arc::clone(&slot);
        let worker = thread::Builder::new()
            .name("detector-worker".into())
            .spawn(move || {
                let mut inner = inner;
                for (sequence, frame) in rx.iter() {
                    match inner.process(&frame) {
                        Ok(mut result) => {
                            result.sequence = sequence;
                            *worker_slot.lock() = result;
                        }
                        Err(e) => tracing::warn!("Async detection of frame {} failed: {:#}", sequence, e),
                    }
                }
                tracing::debug!("Detector worker exiting");
            })
            .context("Failed to spawn detector worker")?;

        Ok(Self {
            name,
            names,
            edges,
            frames: Some(tx),
            slot,
            latest: DetectionResult::default(),
            submitted: 0,
            worker: Some(worker),
        })
    }

    /// Sequence number of the newest result the worker has finished.
    pub fn completed_sequence(&self) -> u64 {
        self.slot.lock().sequence
    }

    /// Number of frames offered to the worker so far.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }
}

impl PoseDetector for LatestResultDetector {
    fn process(&mut self, frame: &RgbImage) -> Result<DetectionResult> {
        self.submitted += 1;
        let Some(frames) = &self.frames else {
            bail!("detector worker already shut down");
        };
        match frames.try_send((self.submitted, frame.clone())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                tracing::trace!("Detector busy, skipping frame {}", self.submitted);
            }
            Err(TrySendError::Disconnected(_)) => bail!("detector worker stopped"),
        }

        self.latest = self.slot.lock().clone();
        Ok(self.latest.clone())
    }

    fn latest(&self) -> &DetectionResult {
        &self.latest
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    fn landmark_names(&self) -> &'static [&'static str] {
        self.names
    }

    fn skeleton_edges(&self) -> &'static [(usize, usize)] {
        self.edges
    }
}

impl Drop for LatestResultDetector {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.frames.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Detector worker panicked");
            }
        }
    }
}
