//! Pose detection video pipeline.
//!
//! A [`controller::PipelineController`] drives a background run-loop that
//! captures frames, runs a [`detect::PoseDetector`] on them, and fans the
//! results out to an OSC message sink, a v4l2loopback video sink and a
//! bounded preview relay. Control arrives from a [`frontend::FrontEnd`] or
//! the OSC [`listener`]. [`batch`] sweeps detectors over a folder of inputs
//! for benchmarking.

pub mod batch;
pub mod camera;
pub mod capture;
pub mod controller;
pub mod detect;
pub mod error;
pub mod frontend;
pub mod listener;
pub mod output;
pub mod perf;
pub mod preview;

pub use controller::{AppState, ConfigUpdate, PipelineConfig, PipelineController};
pub use error::{PipelineError, PipelineResult};
