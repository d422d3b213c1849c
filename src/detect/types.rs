use image::{GrayImage, RgbImage};

/// A single keypoint in normalized image coordinates.
///
/// `x` and `y` lie in `[0, 1]`; `z` is backend-relative depth (0 for 2D
/// backends) and `visibility` is a confidence in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
        Self {
            x,
            y,
            z,
            visibility,
        }
    }
}

/// Ordered landmarks for one subject; index order matches the backend's
/// landmark name table.
pub type Skeleton = Vec<Landmark>;

/// Normalized bounding box.
///
/// `(cx, cy)` is the box centre, as pose backends emit it; use
/// [`BoundingBox::to_pixels`] for corners. Sinks send these four values
/// unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

impl BoundingBox {
    pub fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self { cx, cy, w, h }
    }

    /// Corner coordinates `(x1, y1, x2, y2)` in pixels for a `width`x`height` frame.
    pub fn to_pixels(&self, width: u32, height: u32) -> (f32, f32, f32, f32) {
        let (w, h) = (width as f32, height as f32);
        (
            (self.cx - self.w / 2.0) * w,
            (self.cy - self.h / 2.0) * h,
            (self.cx + self.w / 2.0) * w,
            (self.cy + self.h / 2.0) * h,
        )
    }
}

/// Output of one detection step.
///
/// `skeletons` and `boxes` share subject ordering but may differ in length:
/// not every backend reports boxes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectionResult {
    pub skeletons: Vec<Skeleton>,
    pub boxes: Vec<BoundingBox>,
    /// 1-based index of the frame submission that produced this result.
    /// Zero means no frame has been processed yet.
    pub sequence: u64,
    /// Subject matte at frame resolution (255 = subject), from backends
    /// that segment.
    pub mask: Option<GrayImage>,
}

impl DetectionResult {
    pub fn empty(sequence: u64) -> Self {
        Self {
            sequence,
            ..Self::default()
        }
    }

    pub fn subject_count(&self) -> usize {
        self.skeletons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skeletons.is_empty() && self.boxes.is_empty()
    }
}

/// Trait for pose detection backends
///
/// Backends are interchangeable behind this capability set; the controller
/// owns exactly one boxed instance at a time and swaps it by name through
/// [`super::DetectorRegistry`].
pub trait PoseDetector: Send {
    /// Run detection on a frame and return the result, which is also kept
    /// as [`PoseDetector::latest`] for overlay drawing.
    fn process(&mut self, frame: &RgbImage) -> anyhow::Result<DetectionResult>;

    /// Most recent result produced by [`PoseDetector::process`].
    fn latest(&self) -> &DetectionResult;

    /// Human readable model name; perf statistics are keyed by it.
    fn model_name(&self) -> &str;

    /// Landmark index to name table.
    fn landmark_names(&self) -> &'static [&'static str];

    /// Landmark index pairs joined when drawing the skeleton.
    fn skeleton_edges(&self) -> &'static [(usize, usize)] {
        &[]
    }

    /// Draw the latest result onto `frame`.
    ///
    /// `native` asks for the backend's own renderer; backends without one
    /// ignore it and use the shared overlay.
    fn annotate(&self, frame: &mut RgbImage, draw_bbox: bool, native: bool) {
        let _ = native;
        super::overlay::draw_result(frame, self.latest(), self.skeleton_edges(), draw_bbox);
    }

    /// Whether this backend produces a segmentation mask.
    fn has_segmentation(&self) -> bool {
        false
    }
}
