use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use posecam::controller::{
    AppState, DeviceIo, InputKind, PipelineConfig, PipelineController, DEFAULT_FPS,
    DEFAULT_OSC_IP, DEFAULT_OSC_PORT, DEFAULT_VIDEO_DEVICE,
};
use posecam::batch::{self, BatchPlan};
use posecam::detect;
use posecam::frontend::FrontEnd;
use posecam::listener::{CommandListener, DEFAULT_LISTEN_PORT};
use posecam::output::OscMode;
use posecam::perf::{self, PerfRecorder};

/// How often the headless display drains the preview relay.
const PREVIEW_POLL: Duration = Duration::from_millis(30);

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input source: webcam or file
    #[arg(long, default_value = "webcam")]
    input: InputKind,

    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    camera_id: u32,

    /// Image file or directory of images to read when --input file
    #[arg(long)]
    video_file: Option<PathBuf>,

    /// Restart file input from the beginning at end of stream
    #[arg(long)]
    loop_video: bool,

    /// Send the video output without the pose overlay
    #[arg(long)]
    no_overlay: bool,

    /// OSC destination address
    #[arg(long, default_value = DEFAULT_OSC_IP)]
    osc_ip: String,

    /// OSC destination port
    #[arg(long, default_value_t = DEFAULT_OSC_PORT)]
    osc_port: u16,

    /// OSC address layout: bundle or legacy
    #[arg(long, default_value = "bundle")]
    osc_mode: OscMode,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = DEFAULT_VIDEO_DEVICE)]
    output_device: PathBuf,

    /// Output resolution width
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output resolution height
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Target frames per second
    #[arg(long, default_value_t = DEFAULT_FPS, value_parser = clap::value_parser!(u32).range(1..))]
    fps: u32,

    /// Detector model name (see --list-detectors); defaults to the first one
    #[arg(short, long)]
    model: Option<String>,

    /// UDP port for incoming OSC control messages
    #[arg(long, default_value_t = DEFAULT_LISTEN_PORT)]
    listen_port: u16,

    /// Performance log path (default: perf_<timestamp>.csv)
    #[arg(long)]
    perf_log: Option<PathBuf>,

    /// Disable the performance log
    #[arg(long, conflicts_with = "perf_log")]
    no_perf_log: bool,

    /// Start both outputs and capture immediately
    #[arg(long)]
    start: bool,

    /// Benchmark every detector on every video in DIR, overlay on and off, then exit
    #[arg(long, value_name = "DIR", conflicts_with = "start")]
    batch: Option<PathBuf>,

    /// Print available cameras and exit
    #[arg(long)]
    list_cameras: bool,

    /// Print available detector models and exit
    #[arg(long)]
    list_detectors: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            input: self.input,
            camera_id: self.camera_id,
            video_file: self.video_file.clone(),
            loop_video: self.loop_video,
            draw_video_overlay: !self.no_overlay,
            osc_ip: self.osc_ip.clone(),
            osc_port: self.osc_port,
            osc_mode: self.osc_mode,
            video_device: self.output_device.clone(),
            video_width: self.output_width,
            video_height: self.output_height,
            fps_limit: self.fps,
            detector_model: self.model.clone().unwrap_or_default(),
        }
    }

    fn perf_recorder(&self) -> PerfRecorder {
        if self.no_perf_log {
            tracing::info!("Performance log disabled");
            return PerfRecorder::disabled();
        }
        let path = self.perf_log.clone().unwrap_or_else(perf::default_log_path);
        PerfRecorder::create(path)
    }
}

/// Display stand-in that logs what a GUI would show.
struct HeadlessFrontEnd;

impl FrontEnd for HeadlessFrontEnd {
    fn on_state(&self, state: AppState) {
        tracing::debug!("[display] state {}", state);
    }

    fn on_config(&self, config: &PipelineConfig) {
        tracing::debug!(
            "[display] {} input, model {}, {} fps, overlay {}",
            config.input,
            config.detector_model,
            config.fps_limit,
            config.draw_video_overlay
        );
    }

    fn message_sink_changed(&self, active: bool) {
        tracing::debug!("[display] OSC output {}", if active { "on" } else { "off" });
    }

    fn video_sink_changed(&self, active: bool) {
        tracing::debug!("[display] video output {}", if active { "on" } else { "off" });
    }

    fn on_resolution(&self, width: u32, height: u32) {
        tracing::debug!("[display] resolution {}x{}", width, height);
    }

    fn revert_detector_selection(&self, current: &str) {
        tracing::info!("Detector selection stays at {}", current);
    }

    fn on_cameras(&self, cameras: &BTreeMap<u32, String>) {
        for (index, name) in cameras {
            tracing::info!("Camera {}: {}", index, name);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let registry = detect::default_registry();

    if args.list_detectors {
        for name in registry.names() {
            println!("{}", name);
        }
        return Ok(());
    }
    if args.list_cameras {
        for (index, name) in posecam::camera::available_cameras() {
            println!("{}: {}", index, name);
        }
        return Ok(());
    }

    tracing::info!("posecam starting");
    let config = args.to_config();
    tracing::info!("Input: {}", config.input);
    tracing::info!("OSC: {}:{} ({})", config.osc_ip, config.osc_port, config.osc_mode);
    tracing::info!(
        "Output: {} {}x{}",
        config.video_device.display(),
        config.video_width,
        config.video_height
    );
    tracing::info!("Target FPS: {}", config.fps_limit);

    let controller = PipelineController::new(config, registry, DeviceIo, args.perf_recorder())
        .context("Failed to initialize pipeline")?;
    controller.set_front_end(Arc::new(HeadlessFrontEnd));

    let ctrlc_controller = controller.clone();
    ctrlc::set_handler(move || ctrlc_controller.shutdown())
        .context("Failed to install Ctrl+C handler")?;

    let run_loop = controller
        .spawn_run_loop()
        .context("Failed to start pipeline loop")?;
    let listener = spawn_listener(&controller, args.listen_port);

    let outcome = match &args.batch {
        Some(dir) => {
            let outcome = run_batch(&controller, dir);
            controller.shutdown();
            outcome
        }
        None => {
            if args.start {
                controller.start_all();
            }
            tracing::info!("Press Ctrl+C to stop");
            run_display(&controller);
            Ok(())
        }
    };

    run_loop
        .join()
        .map_err(|_| anyhow!("pipeline thread panicked"))?;
    if let Some(listener) = listener {
        listener
            .join()
            .map_err(|_| anyhow!("listener thread panicked"))?
            .context("Command listener failed")?;
    }
    outcome?;

    tracing::info!("posecam stopped");
    Ok(())
}

fn run_batch(controller: &PipelineController, dir: &Path) -> Result<()> {
    let plan = BatchPlan::for_dir(controller, dir)?;
    let completed = batch::run(controller, &plan).context("Batch test halted")?;
    tracing::info!("Batch testing complete: {} runs", completed);
    Ok(())
}

/// Start the OSC command listener; without it the pipeline still runs.
fn spawn_listener(controller: &PipelineController, port: u16) -> Option<JoinHandle<Result<()>>> {
    let listener = match CommandListener::bind(port) {
        Ok(listener) => listener,
        Err(e) => {
            tracing::warn!("{:#}; remote control disabled", e);
            return None;
        }
    };
    let controller = controller.clone();
    match std::thread::Builder::new()
        .name("osc-listener".into())
        .spawn(move || listener.serve(&controller))
    {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!("Failed to start OSC listener thread: {}", e);
            None
        }
    }
}

/// Drain the preview relay until shutdown, as a display would.
fn run_display(controller: &PipelineController) {
    let preview = controller.preview();
    let mut shown = 0u64;

    while !controller.is_shutting_down() {
        while let Some(frame) = preview.poll() {
            shown += 1;
            if shown == 1 || shown % 100 == 0 {
                tracing::debug!(
                    "[display] preview frame {} ({}x{})",
                    shown,
                    frame.width(),
                    frame.height()
                );
            }
        }
        std::thread::sleep(PREVIEW_POLL);
    }
}
