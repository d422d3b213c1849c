use anyhow::Result;
use image::{GrayImage, RgbImage};

use super::types::{DetectionResult, PoseDetector};

/// Model producing a subject matte for a frame.
pub trait SegmentationModel: Send {
    /// Matte at the frame's resolution; 255 marks the subject.
    fn segment(&mut self, frame: &RgbImage) -> Result<GrayImage>;

    /// Forget temporal state carried between frames.
    ///
    /// Stateless models keep the default no-op.
    fn reset_state(&mut self) {}
}

/// Pose backend paired with a segmentation model.
///
/// The matte travels in [`DetectionResult::mask`], so the shared overlay
/// blends it under the skeleton. A frame whose segmentation fails keeps its
/// pose result without a mask.
pub struct SegmentedDetector {
    pose: Box<dyn PoseDetector>,
    matting: Box<dyn SegmentationModel>,
    name: String,
    latest: DetectionResult,
}

impl SegmentedDetector {
    pub fn new(pose: Box<dyn PoseDetector>, matting: Box<dyn SegmentationModel>) -> Self {
        let name = format!("{} +Seg", pose.model_name());
        Self {
            pose,
            matting,
            name,
            latest: DetectionResult::default(),
        }
    }
}

impl PoseDetector for SegmentedDetector {
    fn process(&mut self, frame: &RgbImage) -> Result<DetectionResult> {
        let mut result = self.pose.process(frame)?;

        let _span = tracing::debug_span!("segment").entered();
        match self.matting.segment(frame) {
            Ok(mask) => result.mask = Some(mask),
            Err(e) => {
                tracing::warn!("Segmentation of frame {} failed: {:#}", result.sequence, e);
                self.matting.reset_state();
            }
        }

        self.latest = result;
        Ok(self.latest.clone())
    }

    fn latest(&self) -> &DetectionResult {
        &self.latest
    }

    fn model_name(&self) -> &str {
        &self.name
    }

    fn landmark_names(&self) -> &'static [&'static str] {
        self.pose.landmark_names()
    }

    fn skeleton_edges(&self) -> &'static [(usize, usize)] {
        self.pose.skeleton_edges()
    }

    fn has_segmentation(&self) -> bool {
        true
    }
}
