#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use posecam::capture::{CaptureSource, ImageSequence};
use posecam::controller::{InputKind, PipelineConfig, PipelineIo};
use posecam::detect::{DetectionResult, DetectorRegistry, Passthrough, PoseDetector};
use posecam::frontend::FrontEnd;
use posecam::output::{FrameContext, MessageSink, VideoSink};
use posecam::AppState;

/// Resource activity seen by the fakes.
#[derive(Default)]
pub struct Counters {
    pub opens: AtomicUsize,
    pub releases: AtomicUsize,
    pub rewinds: AtomicUsize,
    pub messages: AtomicUsize,
    pub video_frames: AtomicUsize,
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

/// Wraps a real or synthetic source and counts lifecycle events.
pub struct CountingSource {
    inner: Box<dyn CaptureSource>,
    counters: Arc<Counters>,
}

impl CaptureSource for CountingSource {
    fn capture_frame(&mut self) -> Result<Option<RgbImage>> {
        self.inner.capture_frame()
    }

    fn rewind(&mut self) -> Result<bool> {
        self.counters.rewinds.fetch_add(1, Ordering::SeqCst);
        self.inner.rewind()
    }

    fn resolution(&self) -> (u32, u32) {
        self.inner.resolution()
    }
}

impl Drop for CountingSource {
    fn drop(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// Endless solid-colour frames standing in for a webcam.
pub struct SyntheticCamera;

impl CaptureSource for SyntheticCamera {
    fn capture_frame(&mut self) -> Result<Option<RgbImage>> {
        Ok(Some(RgbImage::from_pixel(8, 6, Rgb([40, 80, 120]))))
    }

    fn resolution(&self) -> (u32, u32) {
        (8, 6)
    }
}

pub struct CountingSink(Arc<Counters>);

impl MessageSink for CountingSink {
    fn send(&mut self, _result: &DetectionResult, _context: &FrameContext<'_>) -> Result<()> {
        self.0.messages.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl VideoSink for CountingSink {
    fn send_frame(&mut self, _frame: &RgbImage) -> Result<()> {
        self.0.video_frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (8, 6)
    }
}

/// `PipelineIo` over in-memory fakes. File input reads a real image
/// sequence; webcam input is synthetic.
#[derive(Default)]
pub struct FakeIo {
    pub counters: Arc<Counters>,
    pub fail_open: bool,
}

impl PipelineIo for FakeIo {
    fn open_source(&self, config: &PipelineConfig) -> Result<Box<dyn CaptureSource>> {
        if self.fail_open {
            bail!("device busy");
        }
        let inner: Box<dyn CaptureSource> = match (config.input, config.video_file.as_deref()) {
            (InputKind::File, Some(path)) => Box::new(ImageSequence::open(path)?),
            (InputKind::File, None) => bail!("no file configured"),
            (InputKind::Webcam, _) => Box::new(SyntheticCamera),
        };
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingSource {
            inner,
            counters: self.counters.clone(),
        }))
    }

    fn open_message_sink(&self, _config: &PipelineConfig) -> Result<Box<dyn MessageSink>> {
        Ok(Box::new(CountingSink(self.counters.clone())))
    }

    fn open_video_sink(&self, _config: &PipelineConfig) -> Result<Box<dyn VideoSink>> {
        Ok(Box::new(CountingSink(self.counters.clone())))
    }

    fn cameras(&self) -> BTreeMap<u32, String> {
        BTreeMap::from([(0, "Synthetic".to_string())])
    }
}

/// Detector whose inference always fails.
pub struct FailingDetector {
    latest: DetectionResult,
}

impl PoseDetector for FailingDetector {
    fn process(&mut self, _frame: &RgbImage) -> Result<DetectionResult> {
        bail!("inference exploded")
    }

    fn latest(&self) -> &DetectionResult {
        &self.latest
    }

    fn model_name(&self) -> &str {
        "Failing"
    }

    fn landmark_names(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Time one `annotate` call takes on [`SlowAnnotate`].
pub const ANNOTATE_COST: Duration = Duration::from_millis(40);

/// Detector whose drawing pass dominates, so a frame timed with the video
/// overlay on (two annotate calls) takes twice as long as one without.
#[derive(Default)]
pub struct SlowAnnotate {
    latest: DetectionResult,
    frames: u64,
}

impl PoseDetector for SlowAnnotate {
    fn process(&mut self, _frame: &RgbImage) -> Result<DetectionResult> {
        self.frames += 1;
        self.latest = DetectionResult::empty(self.frames);
        Ok(self.latest.clone())
    }

    fn latest(&self) -> &DetectionResult {
        &self.latest
    }

    fn model_name(&self) -> &str {
        "Slow Annotate"
    }

    fn landmark_names(&self) -> &'static [&'static str] {
        &[]
    }

    fn annotate(&self, _frame: &mut RgbImage, _draw_bbox: bool, _native: bool) {
        std::thread::sleep(ANNOTATE_COST);
    }
}

pub fn registry() -> DetectorRegistry {
    let mut registry = DetectorRegistry::new();
    registry.register("Passthrough", || {
        Ok(Box::new(Passthrough::new()) as Box<dyn PoseDetector>)
    });
    registry.register("Passthrough B", || {
        Ok(Box::new(Passthrough::new()) as Box<dyn PoseDetector>)
    });
    registry.register("Failing", || {
        Ok(Box::new(FailingDetector {
            latest: DetectionResult::default(),
        }) as Box<dyn PoseDetector>)
    });
    registry
}

/// Front end that records what it was told.
#[derive(Default)]
pub struct RecordingFrontEnd {
    pub states: Mutex<Vec<AppState>>,
    pub reverts: Mutex<Vec<String>>,
    pub resolutions: Mutex<Vec<(u32, u32)>>,
    pub message_sink: Mutex<Vec<bool>>,
    pub detectors: Mutex<Vec<String>>,
    pub cameras: Mutex<BTreeMap<u32, String>>,
}

impl FrontEnd for RecordingFrontEnd {
    fn on_state(&self, state: AppState) {
        self.states.lock().push(state);
    }

    fn message_sink_changed(&self, active: bool) {
        self.message_sink.lock().push(active);
    }

    fn on_resolution(&self, width: u32, height: u32) {
        self.resolutions.lock().push((width, height));
    }

    fn revert_detector_selection(&self, current: &str) {
        self.reverts.lock().push(current.to_string());
    }

    fn on_cameras(&self, cameras: &BTreeMap<u32, String>) {
        *self.cameras.lock() = cameras.clone();
    }

    fn on_detectors(&self, names: &[String]) {
        *self.detectors.lock() = names.to_vec();
    }
}

/// Write `count` distinct PNG frames into `dir`.
pub fn write_frames(dir: &Path, count: u8) {
    for i in 0..count {
        RgbImage::from_pixel(8, 6, Rgb([i.wrapping_mul(20), 0, 0]))
            .save(dir.join(format!("frame_{:03}.png", i)))
            .unwrap();
    }
}

/// Poll `condition` until it holds or five seconds pass.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
