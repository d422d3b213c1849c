mod loopback;
mod osc;

pub use loopback::V4L2Output;
pub use osc::{frame_packets, OscMode, OscSender};

use anyhow::Result;
use image::RgbImage;

use crate::detect::DetectionResult;

/// Trait for network video destinations
pub trait VideoSink: Send {
    /// Transmit one frame; pixel format conversion is the sink's job
    fn send_frame(&mut self, frame: &RgbImage) -> Result<()>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);
}

/// Per-frame context handed to message sinks alongside the result.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    pub frame_count: u64,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub model_name: &'a str,
    pub landmark_names: &'a [&'static str],
}

impl FrameContext<'_> {
    /// Metadata goes out on the first frame and then once per `target_fps` frames.
    pub fn wants_metadata(&self) -> bool {
        self.frame_count <= 1 || self.frame_count % u64::from(self.target_fps.max(1)) == 0
    }
}

/// Trait for detection result destinations
pub trait MessageSink: Send {
    fn send(&mut self, result: &DetectionResult, context: &FrameContext<'_>) -> Result<()>;
}
