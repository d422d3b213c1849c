//! Observer interface for whatever displays the pipeline.
//!
//! The controller calls these synchronously from the thread that caused the
//! change, after its own locks are released. Implementations must not call
//! back into mutators that would block on the run-loop.

use std::collections::BTreeMap;

use crate::controller::{AppState, PipelineConfig};

pub trait FrontEnd: Send + Sync {
    /// The controller entered `state`.
    fn on_state(&self, _state: AppState) {}

    /// Configuration changed; `config` is the full snapshot after the change.
    fn on_config(&self, _config: &PipelineConfig) {}

    fn message_sink_changed(&self, _active: bool) {}

    fn video_sink_changed(&self, _active: bool) {}

    /// Capture resolution changed; `(0, 0)` once the source is released.
    fn on_resolution(&self, _width: u32, _height: u32) {}

    /// A detector change was refused; show `current` as selected again.
    fn revert_detector_selection(&self, _current: &str) {}

    fn on_cameras(&self, _cameras: &BTreeMap<u32, String>) {}

    fn on_detectors(&self, _names: &[String]) {}
}

/// Front end that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFrontEnd;

impl FrontEnd for NoFrontEnd {}
