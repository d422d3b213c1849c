use thiserror::Error;

use crate::controller::{AppState, StateEvent};

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures creating a detector backend. Always fatal to the controller.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("unknown detector model '{0}'")]
    UnknownModel(String),

    #[error("failed to load detector '{name}': {source}")]
    Backend {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

/// A state change the state machine does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("pipeline is already running")]
    AlreadyRunning,

    #[error("cannot apply {event:?} while {from:?}")]
    Illegal { from: AppState, event: StateEvent },
}
