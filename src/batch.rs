//! Benchmark sweep over detectors, input files and overlay settings.
//!
//! Each run plays one input to its end with both outputs on, so the perf
//! log ends up with one session per (model, input, overlay) combination.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::controller::{AppState, ConfigUpdate, InputKind, PipelineController};

/// File extensions treated as videos when scanning a directory.
pub const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "mov", "avi", "mkv"];

/// How often a run is checked for completion.
pub const RUN_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRun {
    pub model: String,
    pub input: PathBuf,
    pub overlay: bool,
}

#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub models: Vec<String>,
    pub inputs: Vec<PathBuf>,
    pub overlays: Vec<bool>,
    pub poll: Duration,
}

impl BatchPlan {
    /// Every registered detector over every input found in `dir`, with the
    /// overlay on and then off.
    pub fn for_dir(controller: &PipelineController, dir: &Path) -> Result<Self> {
        Ok(Self {
            models: controller.detector_names(),
            inputs: find_inputs(dir)?,
            overlays: vec![true, false],
            poll: RUN_POLL,
        })
    }

    /// Runs in execution order: model, then input, then overlay.
    pub fn runs(&self) -> Vec<BatchRun> {
        let mut runs = Vec::new();
        for model in &self.models {
            for input in &self.inputs {
                for &overlay in &self.overlays {
                    runs.push(BatchRun {
                        model: model.clone(),
                        input: input.clone(),
                        overlay,
                    });
                }
            }
        }
        runs
    }
}

/// Video files and image-sequence directories directly inside `dir`,
/// sorted by path.
pub fn find_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;

    let mut inputs = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .path();
        if path.is_dir() || is_video(&path) {
            inputs.push(path);
        }
    }
    inputs.sort();
    Ok(inputs)
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.iter().any(|v| v.eq_ignore_ascii_case(ext)))
}

/// Execute `plan` on a booted controller and return the number of runs
/// completed.
///
/// Both outputs are started first and left running. A shutdown ends the
/// sweep early; a detector that fails to load aborts it.
pub fn run(controller: &PipelineController, plan: &BatchPlan) -> Result<usize> {
    let runs = plan.runs();
    if plan.inputs.is_empty() {
        bail!("no video files or image directories to test");
    }
    tracing::info!("Batch: {} runs", runs.len());

    controller.start_message_sink();
    controller.start_video_sink();

    for (index, run) in runs.iter().enumerate() {
        if controller.is_shutting_down() {
            tracing::warn!("Batch interrupted after {} of {} runs", index, runs.len());
            return Ok(index);
        }
        tracing::info!(
            "Run {}/{}: {} on {} (overlay {})",
            index + 1,
            runs.len(),
            run.model,
            run.input.display(),
            if run.overlay { "on" } else { "off" }
        );

        controller
            .change_detector(&run.model)
            .with_context(|| format!("Failed to load detector {}", run.model))?;
        if controller.config().detector_model != run.model {
            bail!(
                "detector {} could not be selected while {}",
                run.model,
                controller.state()
            );
        }
        controller.update_config(ConfigUpdate::Input(InputKind::File));
        controller.update_config(ConfigUpdate::VideoFile(Some(run.input.clone())));
        controller.update_config(ConfigUpdate::LoopVideo(false));
        controller.update_config(ConfigUpdate::DrawVideoOverlay(run.overlay));

        if !controller.start() {
            bail!("run {} could not start while {}", index + 1, controller.state());
        }
        while matches!(controller.state(), AppState::Running | AppState::Paused)
            && !controller.is_shutting_down()
        {
            std::thread::sleep(plan.poll);
        }
        tracing::info!("Run {} complete after {} frames", index + 1, controller.frame_count());
    }

    if let Some(path) = controller.perf_log_path() {
        tracing::info!("Performance data saved to {}", path.display());
    }
    Ok(runs.len())
}
