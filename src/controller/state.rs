use std::fmt;

use crate::error::TransitionError;

/// Lifecycle of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppState {
    #[default]
    Init,
    Ready,
    Running,
    Paused,
    Stopped,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    Boot,
    Start,
    TogglePause,
    Stop,
}

impl AppState {
    /// The only way the pipeline changes state. Rejected events leave the
    /// current state as it was.
    pub fn transition(self, event: StateEvent) -> Result<AppState, TransitionError> {
        use AppState::*;
        use StateEvent::*;

        match (self, event) {
            (Init, Boot) => Ok(Ready),
            (Init | Ready | Stopped | Paused, Start) => Ok(Running),
            (Running, Start) => Err(TransitionError::AlreadyRunning),
            (Running, TogglePause) => Ok(Paused),
            (Paused, TogglePause) => Ok(Running),
            (Running | Paused, Stop) => Ok(Stopped),
            (from, event) => Err(TransitionError::Illegal { from, event }),
        }
    }

    /// Whether the run-loop should hold a capture handle.
    pub fn holds_capture(self) -> bool {
        matches!(self, AppState::Running | AppState::Paused)
    }

    /// Whether the detector may be replaced.
    pub fn allows_detector_swap(self) -> bool {
        matches!(self, AppState::Ready | AppState::Stopped)
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AppState::Init => "init",
            AppState::Ready => "ready",
            AppState::Running => "running",
            AppState::Paused => "paused",
            AppState::Stopped => "stopped",
        })
    }
}
