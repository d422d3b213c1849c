mod landmarks;
mod latest;
#[cfg(feature = "onnx")]
mod matting;
pub mod overlay;
mod passthrough;
#[cfg(feature = "onnx")]
mod preprocess;
mod registry;
mod segmented;
pub mod types;
#[cfg(feature = "onnx")]
mod yolo;

pub use landmarks::{landmark_name, COCO17_EDGES, COCO17_NAMES};
pub use latest::LatestResultDetector;
#[cfg(feature = "onnx")]
pub use matting::RobustVideoMatting;
pub use passthrough::Passthrough;
pub use registry::DetectorRegistry;
pub use segmented::{SegmentationModel, SegmentedDetector};
pub use types::{BoundingBox, DetectionResult, Landmark, PoseDetector, Skeleton};
#[cfg(feature = "onnx")]
pub use yolo::YoloPose;

/// Registry with every backend this build supports.
///
/// The first entry is the default model.
pub fn default_registry() -> DetectorRegistry {
    let mut registry = DetectorRegistry::new();

    #[cfg(feature = "onnx")]
    {
        registry.register("YOLOv8 Pose", || {
            let path = YoloPose::cached_model_path("yolov8n-pose.onnx");
            Ok(Box::new(YoloPose::new(path, "YOLOv8 Pose")?) as Box<dyn PoseDetector>)
        });
        registry.register("YOLO11 Pose", || {
            let path = YoloPose::cached_model_path("yolo11n-pose.onnx");
            Ok(Box::new(YoloPose::new(path, "YOLO11 Pose")?) as Box<dyn PoseDetector>)
        });
        registry.register("YOLOv8 Pose +Seg", || {
            let path = YoloPose::cached_model_path("yolov8n-pose.onnx");
            let pose = Box::new(YoloPose::new(path, "YOLOv8 Pose")?);
            let matting = Box::new(RobustVideoMatting::new(YoloPose::cached_model_path(
                "rvm_mobilenetv3_fp32.onnx",
            ))?);
            Ok(Box::new(SegmentedDetector::new(pose, matting)) as Box<dyn PoseDetector>)
        });
        registry.register("YOLOv8 Pose (async)", || {
            let path = YoloPose::cached_model_path("yolov8n-pose.onnx");
            let inner = Box::new(YoloPose::new(path, "YOLOv8 Pose")?);
            Ok(Box::new(LatestResultDetector::new(inner)?) as Box<dyn PoseDetector>)
        });
    }

    registry.register(Passthrough::NAME, || {
        Ok(Box::new(Passthrough::new()) as Box<dyn PoseDetector>)
    });

    registry
}
