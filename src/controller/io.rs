use std::collections::BTreeMap;

use anyhow::{Context, Result};

use super::PipelineConfig;
use crate::capture::{self, CaptureSource};
use crate::output::{MessageSink, OscSender, V4L2Output, VideoSink};

/// Opens the resources the controller manages.
///
/// `open_source` is only ever called from the run-loop thread, so the
/// returned handle does not need to be `Send`.
pub trait PipelineIo: Send + Sync {
    fn open_source(&self, config: &PipelineConfig) -> Result<Box<dyn CaptureSource>>;

    fn open_message_sink(&self, config: &PipelineConfig) -> Result<Box<dyn MessageSink>>;

    fn open_video_sink(&self, config: &PipelineConfig) -> Result<Box<dyn VideoSink>>;

    /// Cameras to offer for selection.
    fn cameras(&self) -> BTreeMap<u32, String> {
        crate::camera::available_cameras()
    }
}

/// Real devices: nokhwa/file capture, OSC over UDP, v4l2loopback.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeviceIo;

impl PipelineIo for DeviceIo {
    fn open_source(&self, config: &PipelineConfig) -> Result<Box<dyn CaptureSource>> {
        capture::open_source(config)
    }

    fn open_message_sink(&self, config: &PipelineConfig) -> Result<Box<dyn MessageSink>> {
        let sender = OscSender::new(&config.osc_ip, config.osc_port, config.osc_mode)
            .context("Failed to start OSC sender")?;
        Ok(Box::new(sender))
    }

    fn open_video_sink(&self, config: &PipelineConfig) -> Result<Box<dyn VideoSink>> {
        let output = V4L2Output::new(&config.video_device, config.video_width, config.video_height)
            .context("Failed to initialize v4l2loopback output")?;
        Ok(Box::new(output))
    }
}
