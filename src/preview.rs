//! Bounded hand-off of annotated frames from the run-loop to a display.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use image::RgbImage;

/// Frames a display may fall behind by before new ones are dropped.
pub const PREVIEW_CAPACITY: usize = 2;

/// Result of offering a frame to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The relay was full; the offered frame was discarded and the queued
    /// ones kept.
    Dropped,
}

/// Non-blocking single-producer hand-off with drop-incoming-on-full
/// semantics. Clones share the same queue.
#[derive(Clone)]
pub struct PreviewRelay {
    tx: Sender<RgbImage>,
    rx: Receiver<RgbImage>,
}

impl PreviewRelay {
    pub fn new() -> Self {
        Self::with_capacity(PREVIEW_CAPACITY)
    }

    /// A relay holding up to `capacity` frames, at least one.
    pub fn with_capacity(capacity: usize) -> Self {
        // A zero-capacity crossbeam channel is a rendezvous: try_send would
        // never succeed without a waiting receiver.
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Offer a frame without waiting.
    pub fn push(&self, frame: RgbImage) -> PushOutcome {
        match self.tx.try_send(frame) {
            Ok(()) => PushOutcome::Queued,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                tracing::trace!("Preview relay full, dropping frame");
                PushOutcome::Dropped
            }
        }
    }

    /// Take the oldest pending frame, if any.
    pub fn poll(&self) -> Option<RgbImage> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(PREVIEW_CAPACITY)
    }
}

impl Default for PreviewRelay {
    fn default() -> Self {
        Self::new()
    }
}
