mod common;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use common::{
    count, registry, wait_until, write_frames, Counters, FakeIo, RecordingFrontEnd, SlowAnnotate,
    ANNOTATE_COST,
};
use posecam::controller::{ConfigUpdate, InputKind, PipelineConfig, PipelineController};
use posecam::detect::{DetectorRegistry, PoseDetector};
use posecam::perf::PerfRecorder;
use posecam::AppState;

struct Harness {
    controller: PipelineController,
    front_end: Arc<RecordingFrontEnd>,
    counters: Arc<Counters>,
    run_loop: Option<JoinHandle<()>>,
}

impl Harness {
    fn new(config: PipelineConfig, io: FakeIo, perf: PerfRecorder) -> Self {
        Self::with_registry(config, io, perf, registry())
    }

    fn with_registry(
        config: PipelineConfig,
        io: FakeIo,
        perf: PerfRecorder,
        registry: DetectorRegistry,
    ) -> Self {
        let counters = io.counters.clone();
        let controller = PipelineController::new(config, registry, io, perf).unwrap();
        let front_end = Arc::new(RecordingFrontEnd::default());
        controller.set_front_end(front_end.clone());
        let run_loop = Some(controller.spawn_run_loop().unwrap());
        Self {
            controller,
            front_end,
            counters,
            run_loop,
        }
    }

    fn webcam(fps: u32) -> Self {
        let config = PipelineConfig {
            fps_limit: fps,
            ..PipelineConfig::default()
        };
        Self::new(config, FakeIo::default(), PerfRecorder::disabled())
    }

    fn finish(&mut self) {
        self.controller.shutdown();
        if let Some(handle) = self.run_loop.take() {
            handle.join().unwrap();
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.finish();
    }
}

fn perf_rows(log: &std::path::Path) -> Vec<Vec<String>> {
    std::fs::read_to_string(log)
        .unwrap()
        .lines()
        .map(|line| line.split(',').map(str::to_string).collect())
        .collect()
}

fn file_config(dir: &std::path::Path, loop_video: bool) -> PipelineConfig {
    PipelineConfig {
        input: InputKind::File,
        video_file: Some(dir.to_path_buf()),
        loop_video,
        fps_limit: 200,
        ..PipelineConfig::default()
    }
}

#[test]
fn looping_file_keeps_running_past_its_length() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), 10);

    let harness = Harness::new(
        file_config(dir.path(), true),
        FakeIo::default(),
        PerfRecorder::disabled(),
    );
    assert_eq!(harness.controller.state(), AppState::Ready);
    assert!(harness.controller.start());

    assert!(wait_until(|| harness.controller.frame_count() >= 25));
    assert!(count(&harness.counters.rewinds) >= 2);
    assert_eq!(harness.controller.state(), AppState::Running);
    assert_eq!(count(&harness.counters.opens), 1);
}

#[test]
fn file_without_loop_stops_at_end_of_stream() {
    let dir = tempfile::tempdir().unwrap();
    write_frames(dir.path(), 3);

    let harness = Harness::new(
        file_config(dir.path(), false),
        FakeIo::default(),
        PerfRecorder::disabled(),
    );
    harness.controller.start_message_sink();
    harness.controller.start();

    assert!(wait_until(|| harness.controller.state() == AppState::Stopped));
    assert_eq!(harness.controller.frame_count(), 3);
    assert!(wait_until(|| count(&harness.counters.releases) == 1));
    assert_eq!(count(&harness.counters.rewinds), 0);
    assert_eq!(count(&harness.counters.messages), 3);
    // End of stream leaves the outputs alone.
    assert!(harness.controller.is_message_sink_active());
}

#[test]
fn overlay_toggle_writes_reset_event_before_next_frame() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("perf.csv");

    let config = PipelineConfig {
        fps_limit: 200,
        ..PipelineConfig::default()
    };
    let mut harness = Harness::new(config, FakeIo::default(), PerfRecorder::create(&log));
    harness.controller.start();
    assert!(wait_until(|| harness.controller.frame_count() >= 3));

    assert!(harness
        .controller
        .update_config(ConfigUpdate::DrawVideoOverlay(false)));
    let toggled_at = harness.controller.frame_count();
    assert!(wait_until(|| harness.controller.frame_count() >= toggled_at + 3));
    harness.finish();

    let contents = std::fs::read_to_string(&log).unwrap();
    let rows: Vec<Vec<&str>> = contents.lines().map(|l| l.split(',').collect()).collect();
    assert_eq!(rows[0][0], "#EVENT");
    assert_eq!(rows[1][0], "#FRAME");

    let event = rows
        .iter()
        .position(|row| row[0] == "EVENT" && row[3] == "overlay")
        .expect("overlay event row");
    assert_eq!(rows[event][4], "off");
    assert_eq!(rows[event][5], "0");

    let next_frame = rows[event + 1..]
        .iter()
        .find(|row| row[0] == "FRAME")
        .expect("frame row after the event");
    // First sample after a reset: the average is that sample.
    assert_eq!(next_frame[4], next_frame[7]);
}

#[test]
fn overlay_reset_is_never_followed_by_an_old_setting_sample() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("perf.csv");

    let mut slow = DetectorRegistry::new();
    slow.register("Slow Annotate", || {
        Ok(Box::new(SlowAnnotate::default()) as Box<dyn PoseDetector>)
    });
    let config = PipelineConfig {
        fps_limit: 1000,
        ..PipelineConfig::default()
    };
    let mut harness =
        Harness::with_registry(config, FakeIo::default(), PerfRecorder::create(&log), slow);
    harness.controller.start();
    assert!(wait_until(|| harness.controller.frame_count() >= 1));

    for toggle in 0..8 {
        let on = toggle % 2 == 1;
        assert!(harness
            .controller
            .update_config(ConfigUpdate::DrawVideoOverlay(on)));
        let toggled_at = harness.controller.frame_count();
        assert!(wait_until(|| harness.controller.frame_count() >= toggled_at + 2));
    }
    harness.finish();

    // Overlay on means two annotate passes per frame.
    let overlay_on_ms = 2.0 * ANNOTATE_COST.as_secs_f64() * 1000.0;
    let rows = perf_rows(&log);
    let mut checked = 0;
    for (index, row) in rows.iter().enumerate() {
        if row[0] != "EVENT" || row[3] != "overlay" || row[4] != "on" {
            continue;
        }
        let next = rows[index + 1..]
            .iter()
            .find(|row| !(row[0] == "EVENT" && row[3] == "overlay"));
        let Some(first) = next.filter(|row| row[0] == "FRAME") else {
            continue;
        };
        let frame_ms: f64 = first[4].parse().unwrap();
        assert!(
            frame_ms >= overlay_on_ms * 0.95,
            "frame {} after overlay-on reset took {} ms",
            first[3],
            frame_ms
        );
        assert_eq!(first[4], first[7], "first sample after a reset is the average");
        checked += 1;
    }
    assert_eq!(checked, 4);
}

#[test]
fn detector_swap_is_refused_while_running() {
    let harness = Harness::webcam(100);
    harness.controller.start();
    assert!(wait_until(|| harness.controller.frame_count() >= 1));

    let before = harness.controller.config();
    assert!(!harness.controller.change_detector("Passthrough B").unwrap());
    assert_eq!(harness.controller.config(), before);
    assert_eq!(harness.controller.state(), AppState::Running);
    assert_eq!(*harness.front_end.reverts.lock(), vec!["Passthrough".to_string()]);

    harness.controller.stop();
    assert!(harness.controller.change_detector("Passthrough B").unwrap());
    assert_eq!(harness.controller.config().detector_model, "Passthrough B");
}

#[test]
fn preview_relay_never_blocks_the_loop() {
    let harness = Harness::webcam(200);
    let preview = harness.controller.preview();
    harness.controller.start();

    assert!(wait_until(|| harness.controller.frame_count() >= 10));
    harness.controller.stop_video_stream();
    assert!(wait_until(|| count(&harness.counters.releases) == 1));

    assert_eq!(preview.len(), 2);
    assert!(preview.poll().is_some());
    assert!(preview.poll().is_some());
    assert!(preview.poll().is_none());
}

#[test]
fn capture_is_released_once_and_reopened_for_a_new_session() {
    let harness = Harness::webcam(100);
    harness.controller.start();
    assert!(wait_until(|| harness.controller.frame_count() >= 1));
    assert_eq!(count(&harness.counters.opens), 1);

    assert!(harness.controller.stop_video_stream());
    assert!(wait_until(|| count(&harness.counters.releases) == 1));
    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(count(&harness.counters.releases), 1);
    assert_eq!(count(&harness.counters.opens), 1);
    assert_eq!(harness.front_end.resolutions.lock().last(), Some(&(0, 0)));

    harness.controller.start();
    assert!(wait_until(|| harness.controller.frame_count() >= 20));

    // Start while paused begins a new session on a fresh handle.
    assert!(harness.controller.pause());
    assert_eq!(harness.controller.state(), AppState::Paused);
    harness.controller.start();
    assert!(wait_until(|| count(&harness.counters.opens) == 3));
    assert_eq!(count(&harness.counters.releases), 2);
    assert!(harness.controller.frame_count() < 20);
}

#[test]
fn failed_open_moves_to_stopped() {
    let io = FakeIo {
        fail_open: true,
        ..FakeIo::default()
    };
    let harness = Harness::new(PipelineConfig::default(), io, PerfRecorder::disabled());
    harness.controller.start();

    assert!(wait_until(|| harness.controller.state() == AppState::Stopped));
    assert_eq!(harness.controller.frame_count(), 0);
    assert_eq!(
        *harness.front_end.states.lock(),
        vec![
            AppState::Init,
            AppState::Ready,
            AppState::Running,
            AppState::Stopped
        ]
    );
}

#[test]
fn detector_errors_do_not_stall_outputs() {
    let config = PipelineConfig {
        detector_model: "Failing".into(),
        fps_limit: 200,
        ..PipelineConfig::default()
    };
    let harness = Harness::new(config, FakeIo::default(), PerfRecorder::disabled());
    harness.controller.start_all();

    assert!(wait_until(|| count(&harness.counters.video_frames) >= 5));
    assert!(count(&harness.counters.messages) >= 5);
    assert!(harness.controller.perf_stats("Failing").frame_count() > 0);
}

#[test]
fn shutdown_tears_down_sinks_and_capture() {
    let mut harness = Harness::webcam(100);
    harness.controller.start_all();
    assert!(wait_until(|| harness.controller.frame_count() >= 2));
    assert!(harness.controller.is_message_sink_active());
    assert!(harness.controller.is_video_sink_active());

    harness.finish();
    assert!(!harness.controller.is_message_sink_active());
    assert!(!harness.controller.is_video_sink_active());
    assert_eq!(count(&harness.counters.opens), count(&harness.counters.releases));
    assert_eq!(harness.front_end.message_sink.lock().last(), Some(&false));
}

#[test]
fn front_end_is_brought_up_to_date_on_attach() {
    let harness = Harness::webcam(30);
    assert_eq!(
        *harness.front_end.detectors.lock(),
        vec!["Passthrough", "Passthrough B", "Failing"]
    );
    assert_eq!(harness.front_end.cameras.lock().get(&0).map(String::as_str), Some("Synthetic"));
    assert_eq!(harness.controller.cameras().len(), 1);
}
