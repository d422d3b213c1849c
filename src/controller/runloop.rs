use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use image::RgbImage;

use super::{AppState, InputKind, PipelineConfig, PipelineController, Snapshot};
use crate::capture::CaptureSource;
use crate::detect::DetectionResult;
use crate::output::FrameContext;
use crate::perf::PerfEvent;

/// Sleep between polls while paused.
pub const PAUSED_IDLE: Duration = Duration::from_millis(100);

/// Sleep between polls while ready or stopped.
pub const STOPPED_IDLE: Duration = Duration::from_millis(50);

/// Capture handle plus the session it was opened for.
struct OpenSource {
    source: Box<dyn CaptureSource>,
    session: u64,
}

/// Thread-local state of the run-loop.
///
/// `session`, `model` and `overlay` are the values the last perf sample was
/// taken under.
struct RunLoop {
    controller: PipelineController,
    capture: Option<OpenSource>,
    session: u64,
    model: String,
    overlay: bool,
    frames: u64,
    resolution: (u32, u32),
}

pub(super) fn run(controller: PipelineController) {
    tracing::info!("Pipeline loop started");
    let first = controller.snapshot();
    let mut run_loop = RunLoop {
        controller,
        capture: None,
        session: 0,
        model: first.model,
        overlay: first.config.draw_video_overlay,
        frames: 0,
        resolution: (0, 0),
    };

    while !run_loop.controller.is_shutting_down() {
        let snapshot = run_loop.controller.snapshot();
        run_loop.observe(&snapshot);
        let Snapshot {
            state,
            config,
            session,
            ..
        } = snapshot;
        match state {
            AppState::Running => run_loop.step(&config, session),
            AppState::Paused => std::thread::sleep(PAUSED_IDLE),
            AppState::Init | AppState::Ready | AppState::Stopped => {
                run_loop.release();
                std::thread::sleep(STOPPED_IDLE);
            }
        }
    }

    run_loop.release();
    run_loop.controller.stop_message_sink();
    run_loop.controller.stop_video_sink();
    tracing::info!("Pipeline loop exited");
}

impl RunLoop {
    /// Write a perf event for every setting that changed since the last
    /// iteration. Runs on this thread, before any frame under the new
    /// settings is timed.
    fn observe(&mut self, snapshot: &Snapshot) {
        let mut events = Vec::new();
        if snapshot.session != self.session {
            self.session = snapshot.session;
            self.frames = 0;
            events.push(PerfEvent::Session);
        }
        if snapshot.model != self.model {
            self.model = snapshot.model.clone();
            events.push(PerfEvent::Model);
        }
        if snapshot.config.draw_video_overlay != self.overlay {
            self.overlay = snapshot.config.draw_video_overlay;
            events.push(PerfEvent::Overlay(self.overlay));
        }
        if events.is_empty() {
            return;
        }

        let mut perf = self.controller.shared.perf.lock();
        for event in events {
            perf.record_event(&self.model, event);
        }
    }

    fn step(&mut self, config: &PipelineConfig, session: u64) {
        if self.capture.as_ref().is_some_and(|open| open.session != session) {
            tracing::debug!("New session, reopening source");
            self.release();
        }

        if self.capture.is_none() {
            tracing::info!("Opening {} input", config.input);
            match self.controller.shared.io.open_source(config) {
                Ok(source) => self.capture = Some(OpenSource { source, session }),
                Err(e) => {
                    tracing::error!("Failed to open video source: {:#}", e);
                    self.controller.stop_video_stream();
                    return;
                }
            }
        }

        let started = Instant::now();

        let Some(frame) = self.next_frame(config) else {
            tracing::info!("End of video stream");
            self.controller.stop_video_stream();
            return;
        };

        self.process_frame(frame, config);

        if let Some(rest) = config.frame_interval().checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    /// Capture one frame, rewinding once for looping file input.
    fn next_frame(&mut self, config: &PipelineConfig) -> Option<RgbImage> {
        let open = self.capture.as_mut()?;
        if let Some(frame) = capture(&mut *open.source) {
            return Some(frame);
        }

        if config.input != InputKind::File || !config.loop_video {
            return None;
        }

        tracing::info!("Looping video file");
        match open.source.rewind() {
            Ok(true) => capture(&mut *open.source),
            Ok(false) => None,
            Err(e) => {
                tracing::warn!("Rewind failed: {:#}", e);
                None
            }
        }
    }

    fn process_frame(&mut self, mut frame: RgbImage, config: &PipelineConfig) {
        self.frames += 1;
        self.publish_frames();
        if self.frames == 1 || self.frames % u64::from(config.fps_limit.max(1)) == 0 {
            tracing::info!("Processing frame {}", self.frames);
        }

        let shared = &self.controller.shared;
        let detect_started = Instant::now();
        let (result, preview, model, landmark_names) = {
            let mut detector = shared.detector.lock();
            let _span = tracing::debug_span!("detect").entered();

            let result = match detector.process(&frame) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!("Detection failed on frame {}: {:#}", self.frames, e);
                    DetectionResult::empty(self.frames)
                }
            };

            let mut preview = frame.clone();
            if config.draw_video_overlay {
                detector.annotate(&mut frame, true, false);
            }
            detector.annotate(&mut preview, true, false);

            (
                result,
                preview,
                detector.model_name().to_string(),
                detector.landmark_names(),
            )
        };
        let elapsed = detect_started.elapsed();

        let (width, height) = frame.dimensions();
        if (width, height) != self.resolution {
            self.resolution = (width, height);
            tracing::info!("Capture resolution {}x{}", width, height);
            shared
                .perf
                .lock()
                .record_event(&model, PerfEvent::Resolution { width, height });
            self.controller.front_end().on_resolution(width, height);
        }

        shared
            .perf
            .lock()
            .record_frame(&model, self.frames, elapsed, result.subject_count());

        if let Some(sink) = shared.message_sink.lock().as_mut() {
            let context = FrameContext {
                frame_count: self.frames,
                target_fps: config.fps_limit,
                width,
                height,
                model_name: &model,
                landmark_names,
            };
            if let Err(e) = sink.send(&result, &context) {
                tracing::warn!("Failed to send detection result: {:#}", e);
            }
        }

        shared.preview.push(preview);

        if let Some(sink) = shared.video_sink.lock().as_mut() {
            if let Err(e) = sink.send_frame(&frame) {
                tracing::warn!("Failed to send video frame: {:#}", e);
            }
        }
    }

    fn publish_frames(&self) {
        self.controller
            .shared
            .frame_count
            .store(self.frames, Ordering::Relaxed);
    }

    /// Drop the capture handle, if any, and report the resolution as unknown.
    fn release(&mut self) {
        if self.capture.take().is_none() {
            return;
        }
        tracing::info!("Releasing video source");
        self.resolution = (0, 0);
        self.controller.front_end().on_resolution(0, 0);
    }
}

/// Read one frame; errors count as no frame.
fn capture(source: &mut dyn CaptureSource) -> Option<RgbImage> {
    match source.capture_frame() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Capture failed: {:#}", e);
            None
        }
    }
}
