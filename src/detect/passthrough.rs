use image::RgbImage;

use super::landmarks::{COCO17_EDGES, COCO17_NAMES};
use super::types::{DetectionResult, PoseDetector};

/// Detector that finds nothing.
///
/// Lets the pipeline run capture, preview and sinks without a model file.
pub struct Passthrough {
    latest: DetectionResult,
    frames: u64,
}

impl Passthrough {
    pub const NAME: &'static str = "Passthrough";

    pub fn new() -> Self {
        Self {
            latest: DetectionResult::default(),
            frames: 0,
        }
    }
}

impl Default for Passthrough {
    fn default() -> Self {
        Self::new()
    }
}

impl PoseDetector for Passthrough {
    fn process(&mut self, _frame: &RgbImage) -> anyhow::Result<DetectionResult> {
        self.frames += 1;
        self.latest = DetectionResult::empty(self.frames);
        Ok(self.latest.clone())
    }

    fn latest(&self) -> &DetectionResult {
        &self.latest
    }

    fn model_name(&self) -> &str {
        Self::NAME
    }

    fn landmark_names(&self) -> &'static [&'static str] {
        &COCO17_NAMES
    }

    fn skeleton_edges(&self) -> &'static [(usize, usize)] {
        &COCO17_EDGES
    }
}
