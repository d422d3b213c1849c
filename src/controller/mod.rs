//! Pipeline controller: state machine, configuration, detector and sinks.
//!
//! All mutable pipeline state sits behind an `Arc<Shared>`. `state`,
//! `config`, `session` and the active model name share one lock so the
//! run-loop always sees a consistent snapshot; the detector, each sink and
//! the perf recorder have their own. Where two are held together the order
//! is core, then detector. Mutators never take the detector lock except to
//! swap backends while capture is idle.
//!
//! Only the run-loop writes to the perf recorder, so every reset lands
//! between the last sample taken under the old settings and the first
//! sample taken under the new ones.

mod config;
mod io;
mod runloop;
mod state;

pub use config::{
    ConfigUpdate, InputKind, PipelineConfig, DEFAULT_FPS, DEFAULT_OSC_IP, DEFAULT_OSC_PORT,
    DEFAULT_VIDEO_DEVICE,
};
pub use io::{DeviceIo, PipelineIo};
pub use runloop::{PAUSED_IDLE, STOPPED_IDLE};
pub use state::{AppState, StateEvent};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};

use crate::detect::{DetectorRegistry, PoseDetector};
use crate::error::{PipelineResult, TransitionError};
use crate::frontend::{FrontEnd, NoFrontEnd};
use crate::output::{MessageSink, VideoSink};
use crate::perf::{PerfRecorder, PerfStats};
use crate::preview::PreviewRelay;

struct Core {
    state: AppState,
    config: PipelineConfig,
    /// Bumped by every accepted `start()`.
    session: u64,
    /// Name the active detector reports.
    model: String,
}

/// What the run-loop reads once per iteration.
struct Snapshot {
    state: AppState,
    config: PipelineConfig,
    session: u64,
    model: String,
}

struct Shared {
    core: Mutex<Core>,
    detector: Mutex<Box<dyn PoseDetector>>,
    message_sink: Mutex<Option<Box<dyn MessageSink>>>,
    video_sink: Mutex<Option<Box<dyn VideoSink>>>,
    perf: Mutex<PerfRecorder>,
    front_end: RwLock<Arc<dyn FrontEnd>>,
    registry: DetectorRegistry,
    io: Box<dyn PipelineIo>,
    preview: PreviewRelay,
    cameras: BTreeMap<u32, String>,
    frame_count: AtomicU64,
    shutdown: AtomicBool,
}

enum Swap {
    Refused { state: AppState, current: String },
    Unchanged,
    Changed { model: String, config: PipelineConfig },
}

impl Swap {
    /// Outcome decided by the current state alone, if any.
    fn precheck(core: &Core, name: &str) -> Option<Swap> {
        if !core.state.allows_detector_swap() {
            Some(Swap::Refused {
                state: core.state,
                current: core.config.detector_model.clone(),
            })
        } else if core.config.detector_model == name {
            Some(Swap::Unchanged)
        } else {
            None
        }
    }
}

/// Handle to the pipeline. Clones share the same pipeline.
#[derive(Clone)]
pub struct PipelineController {
    shared: Arc<Shared>,
}

impl PipelineController {
    /// Build a controller in `Init` with the configured detector loaded.
    ///
    /// An empty `config.detector_model` selects the registry's first entry.
    pub fn new<I>(
        mut config: PipelineConfig,
        registry: DetectorRegistry,
        io: I,
        perf: PerfRecorder,
    ) -> PipelineResult<Self>
    where
        I: PipelineIo + 'static,
    {
        if config.detector_model.is_empty() {
            config.detector_model = registry.names().into_iter().next().unwrap_or_default();
        }
        config.fps_limit = config.fps_limit.max(1);

        let detector = registry.create(&config.detector_model)?;
        let model = detector.model_name().to_string();
        tracing::info!("Detector: {}", model);

        let cameras = io.cameras();

        Ok(Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    state: AppState::Init,
                    config,
                    session: 0,
                    model,
                }),
                detector: Mutex::new(detector),
                message_sink: Mutex::new(None),
                video_sink: Mutex::new(None),
                perf: Mutex::new(perf),
                front_end: RwLock::new(Arc::new(NoFrontEnd)),
                registry,
                io: Box::new(io),
                preview: PreviewRelay::new(),
                cameras,
                frame_count: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
            }),
        })
    }

    /// Attach the display and bring it up to date.
    pub fn set_front_end(&self, front_end: Arc<dyn FrontEnd>) {
        *self.shared.front_end.write() = front_end.clone();
        front_end.on_cameras(&self.shared.cameras);
        front_end.on_detectors(&self.shared.registry.names());
        front_end.on_state(self.state());
        front_end.on_config(&self.config());
    }

    fn front_end(&self) -> Arc<dyn FrontEnd> {
        self.shared.front_end.read().clone()
    }

    /// Boot the state machine and start the run-loop thread.
    pub fn spawn_run_loop(&self) -> PipelineResult<JoinHandle<()>> {
        if self.state() == AppState::Init {
            self.apply(StateEvent::Boot)?;
        }
        let controller = self.clone();
        let handle = std::thread::Builder::new()
            .name("pipeline".into())
            .spawn(move || runloop::run(controller))?;
        Ok(handle)
    }

    /// Apply `event`, then log and report the new state.
    fn apply(&self, event: StateEvent) -> Result<AppState, TransitionError> {
        let (from, to) = {
            let mut core = self.shared.core.lock();
            let from = core.state;
            let to = from.transition(event)?;
            core.state = to;
            if event == StateEvent::Start {
                core.session += 1;
                self.shared.frame_count.store(0, Ordering::Relaxed);
            }
            (from, to)
        };
        tracing::info!("State {} -> {}", from, to);
        self.front_end().on_state(to);
        Ok(to)
    }

    /// Start (or resume) capture as a new session.
    ///
    /// Returns `false` if the pipeline was already running. Starting before
    /// the run-loop has booted the state machine is allowed.
    pub fn start(&self) -> bool {
        match self.apply(StateEvent::Start) {
            Ok(_) => true,
            Err(TransitionError::AlreadyRunning) => {
                tracing::warn!("Already running");
                false
            }
            Err(e) => {
                tracing::warn!("Cannot start: {}", e);
                false
            }
        }
    }

    /// Stop capture and tear down both output sinks.
    pub fn stop(&self) {
        tracing::info!("Stopping video stream");
        if let Err(e) = self.apply(StateEvent::Stop) {
            tracing::debug!("Stop ignored: {}", e);
        }
        self.stop_message_sink();
        self.stop_video_sink();
    }

    /// Stop capture but leave the sinks running.
    pub fn stop_video_stream(&self) -> bool {
        match self.apply(StateEvent::Stop) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Stop ignored: {}", e);
                false
            }
        }
    }

    /// Toggle between running and paused.
    pub fn pause(&self) -> bool {
        match self.apply(StateEvent::TogglePause) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Cannot pause: {}", e);
                false
            }
        }
    }

    /// Start both sinks, then capture.
    pub fn start_all(&self) {
        self.start_message_sink();
        self.start_video_sink();
        self.start();
    }

    /// Ask the run-loop to exit and stop everything.
    pub fn shutdown(&self) {
        tracing::info!("Shutting down");
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.stop();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::SeqCst)
    }

    /// Change one configuration key. Returns whether the value changed.
    pub fn update_config(&self, update: ConfigUpdate) -> bool {
        let description = update.to_string();

        let changed = {
            let mut core = self.shared.core.lock();
            core.config.apply(update).then(|| core.config.clone())
        };
        let Some(config) = changed else {
            tracing::debug!("Config unchanged: {}", description);
            return false;
        };

        tracing::info!("Config {}", description);
        self.front_end().on_config(&config);
        true
    }

    /// Replace the active detector with the backend registered as `name`.
    ///
    /// Only allowed while ready or stopped; otherwise the front end is told
    /// to revert its selection and `Ok(false)` is returned. A backend that
    /// fails to load is an error the caller should treat as fatal.
    ///
    /// The backend is built without holding any lock, so state queries and
    /// the run-loop are not held up by model loading.
    pub fn change_detector(&self, name: &str) -> PipelineResult<bool> {
        let precheck = Swap::precheck(&self.shared.core.lock(), name);
        if let Some(swap) = precheck {
            return Ok(self.report_swap(swap));
        }

        let detector = self.shared.registry.create(name)?;
        let model = detector.model_name().to_string();

        // The state may have moved on while the backend loaded.
        let (swap, retired) = {
            let mut core = self.shared.core.lock();
            match Swap::precheck(&core, name) {
                Some(swap) => (swap, detector),
                None => {
                    let retired = std::mem::replace(&mut *self.shared.detector.lock(), detector);
                    core.config.detector_model = name.to_string();
                    core.model = model.clone();
                    let config = core.config.clone();
                    (Swap::Changed { model, config }, retired)
                }
            }
        };
        // Async backends join their worker here, outside every lock.
        drop(retired);

        Ok(self.report_swap(swap))
    }

    fn report_swap(&self, swap: Swap) -> bool {
        match swap {
            Swap::Refused { state, current } => {
                tracing::warn!("Cannot change detector while {}; keeping {}", state, current);
                self.front_end().revert_detector_selection(&current);
                false
            }
            Swap::Unchanged => false,
            Swap::Changed { model, config } => {
                tracing::info!("Detector changed to {}", model);
                self.front_end().on_config(&config);
                true
            }
        }
    }

    /// Open the message sink. Returns whether it is active afterwards.
    pub fn start_message_sink(&self) -> bool {
        let config = self.config();
        let active = {
            let mut sink = self.shared.message_sink.lock();
            if sink.is_some() {
                tracing::warn!("OSC output already active");
                true
            } else {
                match self.shared.io.open_message_sink(&config) {
                    Ok(opened) => {
                        *sink = Some(opened);
                        tracing::info!("OSC output started ({}:{})", config.osc_ip, config.osc_port);
                        true
                    }
                    Err(e) => {
                        tracing::error!("{:#}", e);
                        false
                    }
                }
            }
        };
        self.front_end().message_sink_changed(active);
        active
    }

    pub fn stop_message_sink(&self) {
        if self.shared.message_sink.lock().take().is_some() {
            tracing::info!("OSC output stopped");
        }
        self.front_end().message_sink_changed(false);
    }

    /// Open the video sink. Returns whether it is active afterwards.
    pub fn start_video_sink(&self) -> bool {
        let config = self.config();
        let active = {
            let mut sink = self.shared.video_sink.lock();
            if sink.is_some() {
                tracing::warn!("Video output already active");
                true
            } else {
                match self.shared.io.open_video_sink(&config) {
                    Ok(opened) => {
                        *sink = Some(opened);
                        tracing::info!("Video output started ({})", config.video_device.display());
                        true
                    }
                    Err(e) => {
                        tracing::error!("{:#}", e);
                        false
                    }
                }
            }
        };
        self.front_end().video_sink_changed(active);
        active
    }

    pub fn stop_video_sink(&self) {
        if self.shared.video_sink.lock().take().is_some() {
            tracing::info!("Video output stopped");
        }
        self.front_end().video_sink_changed(false);
    }

    pub fn state(&self) -> AppState {
        self.shared.core.lock().state
    }

    pub fn config(&self) -> PipelineConfig {
        self.shared.core.lock().config.clone()
    }

    fn snapshot(&self) -> Snapshot {
        let core = self.shared.core.lock();
        Snapshot {
            state: core.state,
            config: core.config.clone(),
            session: core.session,
            model: core.model.clone(),
        }
    }

    /// Frames produced in the current session.
    pub fn frame_count(&self) -> u64 {
        self.shared.frame_count.load(Ordering::Relaxed)
    }

    /// Receiving end for annotated preview frames.
    pub fn preview(&self) -> PreviewRelay {
        self.shared.preview.clone()
    }

    pub fn cameras(&self) -> &BTreeMap<u32, String> {
        &self.shared.cameras
    }

    pub fn detector_names(&self) -> Vec<String> {
        self.shared.registry.names()
    }

    /// Name the active detector reports; perf statistics are keyed by it.
    pub fn active_model(&self) -> String {
        self.shared.core.lock().model.clone()
    }

    pub fn perf_stats(&self, model: &str) -> PerfStats {
        self.shared.perf.lock().stats(model)
    }

    pub fn perf_log_path(&self) -> Option<PathBuf> {
        self.shared.perf.lock().path().map(Path::to_path_buf)
    }

    pub fn is_message_sink_active(&self) -> bool {
        self.shared.message_sink.lock().is_some()
    }

    pub fn is_video_sink_active(&self) -> bool {
        self.shared.video_sink.lock().is_some()
    }
}
