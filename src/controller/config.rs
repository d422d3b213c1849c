use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::output::OscMode;

pub const DEFAULT_OSC_IP: &str = "127.0.0.1";
pub const DEFAULT_OSC_PORT: u16 = 5005;
pub const DEFAULT_VIDEO_DEVICE: &str = "/dev/video10";
pub const DEFAULT_FPS: u32 = 30;

/// Where frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputKind {
    #[default]
    Webcam,
    File,
}

impl FromStr for InputKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "webcam" | "camera" => Ok(Self::Webcam),
            "file" => Ok(Self::File),
            other => Err(anyhow!("unknown input '{}', expected webcam or file", other)),
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Webcam => "webcam",
            Self::File => "file",
        })
    }
}

/// Pipeline settings shared by the controller and the run-loop.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub input: InputKind,
    pub camera_id: u32,
    pub video_file: Option<PathBuf>,
    pub loop_video: bool,
    pub draw_video_overlay: bool,
    pub osc_ip: String,
    pub osc_port: u16,
    pub osc_mode: OscMode,
    pub video_device: PathBuf,
    pub video_width: u32,
    pub video_height: u32,
    pub fps_limit: u32,
    pub detector_model: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: InputKind::Webcam,
            camera_id: 0,
            video_file: None,
            loop_video: false,
            draw_video_overlay: true,
            osc_ip: DEFAULT_OSC_IP.to_string(),
            osc_port: DEFAULT_OSC_PORT,
            osc_mode: OscMode::Bundle,
            video_device: PathBuf::from(DEFAULT_VIDEO_DEVICE),
            video_width: 1280,
            video_height: 720,
            fps_limit: DEFAULT_FPS,
            detector_model: String::new(),
        }
    }
}

/// A change to one configuration key.
///
/// The detector model is not here: it changes only through
/// `PipelineController::change_detector`.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigUpdate {
    Input(InputKind),
    CameraId(u32),
    VideoFile(Option<PathBuf>),
    LoopVideo(bool),
    DrawVideoOverlay(bool),
    OscIp(String),
    OscPort(u16),
    OscMode(OscMode),
    VideoDevice(PathBuf),
    VideoWidth(u32),
    VideoHeight(u32),
    FpsLimit(u32),
}

impl ConfigUpdate {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Input(_) => "input",
            Self::CameraId(_) => "camera_id",
            Self::VideoFile(_) => "video_file",
            Self::LoopVideo(_) => "loop_video",
            Self::DrawVideoOverlay(_) => "draw_video_overlay",
            Self::OscIp(_) => "osc_ip",
            Self::OscPort(_) => "osc_port",
            Self::OscMode(_) => "osc_mode",
            Self::VideoDevice(_) => "video_device",
            Self::VideoWidth(_) => "video_width",
            Self::VideoHeight(_) => "video_height",
            Self::FpsLimit(_) => "fps_limit",
        }
    }
}

impl fmt::Display for ConfigUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = ", self.key())?;
        match self {
            Self::Input(v) => write!(f, "{}", v),
            Self::CameraId(v) => write!(f, "{}", v),
            Self::VideoFile(Some(v)) => write!(f, "{}", v.display()),
            Self::VideoFile(None) => f.write_str("none"),
            Self::LoopVideo(v) | Self::DrawVideoOverlay(v) => write!(f, "{}", v),
            Self::OscIp(v) => f.write_str(v),
            Self::OscPort(v) => write!(f, "{}", v),
            Self::OscMode(v) => write!(f, "{}", v),
            Self::VideoDevice(v) => write!(f, "{}", v.display()),
            Self::VideoWidth(v) | Self::VideoHeight(v) | Self::FpsLimit(v) => write!(f, "{}", v),
        }
    }
}

impl PipelineConfig {
    /// Apply `update`, returning whether the stored value changed.
    ///
    /// `fps_limit` is clamped to at least 1.
    pub fn apply(&mut self, update: ConfigUpdate) -> bool {
        fn set<T: PartialEq>(slot: &mut T, value: T) -> bool {
            if *slot == value {
                false
            } else {
                *slot = value;
                true
            }
        }

        match update {
            ConfigUpdate::Input(v) => set(&mut self.input, v),
            ConfigUpdate::CameraId(v) => set(&mut self.camera_id, v),
            ConfigUpdate::VideoFile(v) => set(&mut self.video_file, v),
            ConfigUpdate::LoopVideo(v) => set(&mut self.loop_video, v),
            ConfigUpdate::DrawVideoOverlay(v) => set(&mut self.draw_video_overlay, v),
            ConfigUpdate::OscIp(v) => set(&mut self.osc_ip, v),
            ConfigUpdate::OscPort(v) => set(&mut self.osc_port, v),
            ConfigUpdate::OscMode(v) => set(&mut self.osc_mode, v),
            ConfigUpdate::VideoDevice(v) => set(&mut self.video_device, v),
            ConfigUpdate::VideoWidth(v) => set(&mut self.video_width, v),
            ConfigUpdate::VideoHeight(v) => set(&mut self.video_height, v),
            ConfigUpdate::FpsLimit(v) => set(&mut self.fps_limit, v.max(1)),
        }
    }

    /// Target time per frame.
    pub fn frame_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(1.0 / f64::from(self.fps_limit.max(1)))
    }
}
