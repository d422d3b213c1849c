use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::{s, ArrayView2, Axis, Ix3};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::landmarks::{COCO17_EDGES, COCO17_NAMES};
use super::preprocess::Preprocessor;
use super::types::{BoundingBox, DetectionResult, Landmark, PoseDetector, Skeleton};

const INPUT_SIZE: u32 = 640;
const BOX_FIELDS: usize = 4;
const KPT_STEP: usize = 3;

/// YOLOv8/YOLO11 pose model exported to ONNX
///
/// Output layout is `[1, 4 + 1 + 17 * 3, anchors]`: centre box, person
/// confidence, then `(x, y, confidence)` per COCO keypoint, all in input
/// pixel space.
pub struct YoloPose {
    session: Session,
    preprocessor: Preprocessor,
    name: String,
    conf: f32,
    iou: f32,
    latest: DetectionResult,
    frames: u64,
}

impl YoloPose {
    /// Load a pose model from an ONNX file
    ///
    /// # Default Configuration
    /// - Input size: 640x640 letterboxed
    /// - Person confidence: 0.25, NMS IoU: 0.45
    pub fn new<P: AsRef<Path>>(model_path: P, name: impl Into<String>) -> Result<Self> {
        let path = model_path.as_ref();
        anyhow::ensure!(
            path.exists(),
            "pose model not found at {} (download it and place it there)",
            path.display()
        );

        tracing::info!("Loading pose model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("Pose model loaded successfully");

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(INPUT_SIZE, INPUT_SIZE),
            name: name.into(),
            conf: 0.25,
            iou: 0.45,
            latest: DetectionResult::default(),
            frames: 0,
        })
    }

    /// `model_cache/<file>` next to the working directory.
    pub fn cached_model_path(file_name: &str) -> PathBuf {
        Path::new("model_cache").join(file_name)
    }
}

impl PoseDetector for YoloPose {
    fn process(&mut self, frame: &RgbImage) -> Result<DetectionResult> {
        let _span = tracing::debug_span!("yolo_pose").entered();
        self.frames += 1;

        let (input, ratio) = self.preprocessor.preprocess(frame)?;

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])
            .context("Failed to run inference")?;

        let preds = outputs[0]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix3>()?;
        let preds = preds.slice(s![0, .., ..]);

        let (width, height) = frame.dimensions();
        let mut result = decode(preds, ratio, width, height, self.conf, self.iou);
        result.sequence = self.frames;

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
        &COCO17_NAMES
    }

    fn skeleton_edges(&self) -> &'static [(usize, usize)] {
        &COCO17_EDGES
    }
}

struct Candidate {
    bbox: BoundingBox,
    confidence: f32,
    skeleton: Skeleton,
}

/// Turn raw `[fields, anchors]` predictions into normalized subjects.
fn decode(
    preds: ArrayView2<'_, f32>,
    ratio: f32,
    width: u32,
    height: u32,
    conf: f32,
    iou: f32,
) -> DetectionResult {
    let (w0, h0) = (width as f32, height as f32);
    let keypoints = preds.nrows().saturating_sub(BOX_FIELDS + 1) / KPT_STEP;

    let mut candidates = Vec::new();
    for pred in preds.axis_iter(Axis(1)) {
        let confidence = pred[BOX_FIELDS];
        if confidence < conf {
            continue;
        }

        let bbox = BoundingBox::new(
            pred[0] / ratio / w0,
            pred[1] / ratio / h0,
            pred[2] / ratio / w0,
            pred[3] / ratio / h0,
        );

        let skeleton = (0..keypoints)
            .map(|i| {
                let base = BOX_FIELDS + 1 + KPT_STEP * i;
                Landmark::new(
                    (pred[base] / ratio / w0).clamp(0.0, 1.0),
                    (pred[base + 1] / ratio / h0).clamp(0.0, 1.0),
                    0.0,
                    pred[base + 2].clamp(0.0, 1.0),
                )
            })
            .collect();

        candidates.push(Candidate {
            bbox,
            confidence,
            skeleton,
        });
    }

    non_max_suppression(&mut candidates, iou);

    let mut result = DetectionResult::default();
    for candidate in candidates {
        result.boxes.push(candidate.bbox);
        result.skeletons.push(candidate.skeleton);
    }
    result
}

fn non_max_suppression(candidates: &mut Vec<Candidate>, iou_threshold: f32) {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept = 0;
    for index in 0..candidates.len() {
        let overlaps = (0..kept).any(|prev| iou(&candidates[prev].bbox, &candidates[index].bbox) > iou_threshold);
        if !overlaps {
            candidates.swap(kept, index);
            kept += 1;
        }
    }
    candidates.truncate(kept);
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let (ax1, ay1, ax2, ay2) = (a.cx - a.w / 2.0, a.cy - a.h / 2.0, a.cx + a.w / 2.0, a.cy + a.h / 2.0);
    let (bx1, by1, bx2, by2) = (b.cx - b.w / 2.0, b.cy - b.h / 2.0, b.cx + b.w / 2.0, b.cy + b.h / 2.0);

    let inter = (ax2.min(bx2) - ax1.max(bx1)).max(0.0) * (ay2.min(by2) - ay1.max(by1)).max(0.0);
    let union = a.w * a.h + b.w * b.h - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Two-keypoint predictions: 4 box fields, 1 confidence, 2 * 3 keypoint fields.
    fn preds(anchors: &[[f32; 11]]) -> Array2<f32> {
        let mut array = Array2::zeros((11, anchors.len()));
        for (col, anchor) in anchors.iter().enumerate() {
            for (row, value) in anchor.iter().enumerate() {
                array[[row, col]] = *value;
            }
        }
        array
    }

    #[test]
    fn decodes_and_suppresses_overlapping_people() {
        let array = preds(&[
            [50.0, 50.0, 20.0, 40.0, 0.9, 40.0, 30.0, 0.8, 60.0, 70.0, 0.7],
            [51.0, 50.0, 20.0, 40.0, 0.6, 40.0, 30.0, 0.8, 60.0, 70.0, 0.7],
            [10.0, 10.0, 4.0, 4.0, 0.1, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        ]);

        let result = decode(array.view(), 1.0, 100, 100, 0.25, 0.45);

        assert_eq!(result.subject_count(), 1);
        assert_eq!(result.boxes.len(), 1);
        let skeleton = &result.skeletons[0];
        assert_eq!(skeleton.len(), 2);
        assert!((skeleton[0].x - 0.4).abs() < 1e-6);
        assert!((skeleton[1].y - 0.7).abs() < 1e-6);
        assert!((skeleton[0].visibility - 0.8).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = BoundingBox::new(0.1, 0.1, 0.1, 0.1);
        let b = BoundingBox::new(0.9, 0.9, 0.1, 0.1);
        assert_eq!(iou(&a, &b), 0.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }
}
