//! Per-model latency accounting and the CSV performance log.
//!
//! The log starts with two schema lines, one per row type, followed by
//! interleaved `EVENT` and `FRAME` rows:
//!
//! ```text
//! #EVENT,timestamp,model,event,detail,frame_count
//! #FRAME,timestamp,model,frame,frame_ms,fps,subjects,avg_ms,avg_fps
//! ```

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const EVENT_SCHEMA: [&str; 6] = ["#EVENT", "timestamp", "model", "event", "detail", "frame_count"];
const FRAME_SCHEMA: [&str; 9] = [
    "#FRAME",
    "timestamp",
    "model",
    "frame",
    "frame_ms",
    "fps",
    "subjects",
    "avg_ms",
    "avg_fps",
];

/// Configuration changes that invalidate a model's running average.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PerfEvent {
    Resolution { width: u32, height: u32 },
    Overlay(bool),
    Model,
    Session,
}

impl PerfEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::Resolution { .. } => "resolution",
            Self::Overlay(_) => "overlay",
            Self::Model => "model",
            Self::Session => "session",
        }
    }

    fn detail(&self, model: &str) -> String {
        match self {
            Self::Resolution { width, height } => format!("{}x{}", width, height),
            Self::Overlay(on) => (if *on { "on" } else { "off" }).to_string(),
            Self::Model => model.to_string(),
            Self::Session => String::new(),
        }
    }
}

/// Running totals for one model.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerfStats {
    total: Duration,
    frames: u64,
}

impl PerfStats {
    pub fn record(&mut self, elapsed: Duration) {
        self.total += elapsed;
        self.frames += 1;
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn total_time(&self) -> Duration {
        self.total
    }

    pub fn average_ms(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.total.as_secs_f64() * 1000.0 / self.frames as f64
        }
    }

    pub fn average_fps(&self) -> f64 {
        fps_for(self.average_ms())
    }
}

fn fps_for(ms: f64) -> f64 {
    if ms > 0.0 {
        1000.0 / ms
    } else {
        0.0
    }
}

type LogWriter = csv::Writer<Box<dyn Write + Send>>;

/// Records detect+annotate latency per model and appends rows to the log.
///
/// A recorder whose log could not be opened keeps accounting in memory but
/// writes nothing.
pub struct PerfRecorder {
    writer: Option<LogWriter>,
    path: Option<PathBuf>,
    stats: HashMap<String, PerfStats>,
}

impl PerfRecorder {
    /// Open (truncate) the log at `path`, or disable logging if that fails.
    pub fn create<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match File::create(path) {
            Ok(file) => {
                tracing::info!("Performance log: {}", path.display());
                let mut recorder = Self::from_writer(BufWriter::new(file));
                recorder.path = Some(path.to_path_buf());
                recorder
            }
            Err(e) => {
                tracing::warn!(
                    "Could not open performance log {}: {}; logging disabled",
                    path.display(),
                    e
                );
                Self::disabled()
            }
        }
    }

    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        let writer: Box<dyn Write + Send> = Box::new(writer);
        let mut recorder = Self {
            writer: Some(
                csv::WriterBuilder::new()
                    .flexible(true)
                    .from_writer(writer),
            ),
            path: None,
            stats: HashMap::new(),
        };
        recorder.write_row(&EVENT_SCHEMA);
        recorder.write_row(&FRAME_SCHEMA);
        recorder
    }

    pub fn disabled() -> Self {
        Self {
            writer: None,
            path: None,
            stats: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn stats(&self, model: &str) -> PerfStats {
        self.stats.get(model).copied().unwrap_or_default()
    }

    /// Reset `model`'s accumulator and write an event row.
    pub fn record_event(&mut self, model: &str, event: PerfEvent) {
        let stats = PerfStats::default();
        self.stats.insert(model.to_string(), stats);
        tracing::debug!("Perf event for {}: {} {}", model, event.kind(), event.detail(model));

        let row = [
            "EVENT".to_string(),
            timestamp(),
            model.to_string(),
            event.kind().to_string(),
            event.detail(model),
            stats.frame_count().to_string(),
        ];
        self.write_row(&row);
    }

    /// Add one detect+annotate sample for `model` and write a frame row.
    pub fn record_frame(
        &mut self,
        model: &str,
        frame: u64,
        elapsed: Duration,
        subjects: usize,
    ) -> PerfStats {
        let stats = self.stats.entry(model.to_string()).or_default();
        stats.record(elapsed);
        let stats = *stats;

        let frame_ms = elapsed.as_secs_f64() * 1000.0;
        let row = [
            "FRAME".to_string(),
            timestamp(),
            model.to_string(),
            frame.to_string(),
            format!("{:.3}", frame_ms),
            format!("{:.2}", fps_for(frame_ms)),
            subjects.to_string(),
            format!("{:.3}", stats.average_ms()),
            format!("{:.2}", stats.average_fps()),
        ];
        self.write_row(&row);
        stats
    }

    fn write_row<S: AsRef<[u8]>>(&mut self, row: &[S]) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let written = writer
            .write_record(row)
            .and_then(|()| writer.flush().map_err(csv::Error::from));
        if let Err(e) = written {
            tracing::warn!("Performance log write failed: {}; logging disabled", e);
            self.writer = None;
        }
    }
}

/// `perf_<local time>.csv` in the working directory.
pub fn default_log_path() -> PathBuf {
    PathBuf::from(format!(
        "perf_{}.csv",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}

fn timestamp() -> String {
    chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(path: &Path) -> Vec<Vec<String>> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| line.split(',').map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn running_average_is_mean_of_samples() {
        let mut recorder = PerfRecorder::disabled();
        for ms in [10, 20, 30, 40] {
            recorder.record_frame("m", 1, Duration::from_millis(ms), 1);
        }
        let stats = recorder.stats("m");
        assert_eq!(stats.frame_count(), 4);
        assert!((stats.average_ms() - 25.0).abs() < 1e-9);
        assert!((stats.average_fps() - 40.0).abs() < 1e-9);
    }

    #[test]
    fn event_resets_average_to_first_sample() {
        let mut recorder = PerfRecorder::disabled();
        recorder.record_frame("m", 1, Duration::from_millis(100), 0);
        recorder.record_event("m", PerfEvent::Overlay(false));
        assert_eq!(recorder.stats("m").frame_count(), 0);

        let stats = recorder.record_frame("m", 2, Duration::from_millis(8), 0);
        assert_eq!(stats.frame_count(), 1);
        assert!((stats.average_ms() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn models_are_accounted_separately() {
        let mut recorder = PerfRecorder::disabled();
        recorder.record_frame("a", 1, Duration::from_millis(10), 0);
        recorder.record_frame("b", 1, Duration::from_millis(30), 0);
        recorder.record_event("b", PerfEvent::Model);

        assert_eq!(recorder.stats("a").frame_count(), 1);
        assert_eq!(recorder.stats("b").frame_count(), 0);
    }

    #[test]
    fn writes_header_events_and_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perf.csv");
        let mut recorder = PerfRecorder::create(&path);
        assert!(recorder.is_enabled());
        assert_eq!(recorder.path(), Some(path.as_path()));

        recorder.record_event("m", PerfEvent::Resolution { width: 640, height: 480 });
        recorder.record_frame("m", 1, Duration::from_millis(20), 2);

        let rows = rows(&path);
        assert_eq!(rows[0], EVENT_SCHEMA);
        assert_eq!(rows[1], FRAME_SCHEMA);
        assert_eq!(rows[2][0], "EVENT");
        assert_eq!(&rows[2][2..], ["m", "resolution", "640x480", "0"]);
        assert_eq!(rows[3][0], "FRAME");
        assert_eq!(&rows[3][2..], ["m", "1", "20.000", "50.00", "2", "20.000", "50.00"]);
    }

    #[test]
    fn unwritable_path_disables_logging() {
        let dir = tempfile::tempdir().unwrap();
        let mut recorder = PerfRecorder::create(dir.path().join("missing/dir/perf.csv"));
        assert!(!recorder.is_enabled());

        let stats = recorder.record_frame("m", 1, Duration::from_millis(5), 0);
        assert_eq!(stats.frame_count(), 1);
    }
}
