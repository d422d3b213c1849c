use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use image::RgbImage;

use super::CaptureSource;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "ppm"];

pub(crate) fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// File source backed by still images.
///
/// A directory plays its images in file-name order; a single image is a
/// one-frame stream.
pub struct ImageSequence {
    frames: Vec<PathBuf>,
    position: usize,
    resolution: (u32, u32),
}

impl ImageSequence {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let frames = if path.is_dir() {
            let mut frames = std::fs::read_dir(path)
                .with_context(|| format!("Failed to read frame directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|candidate| candidate.is_file() && is_image_path(candidate))
                .collect::<Vec<_>>();
            frames.sort();
            frames
        } else {
            ensure!(path.is_file(), "{} does not exist", path.display());
            vec![path.to_path_buf()]
        };

        ensure!(!frames.is_empty(), "no image frames found in {}", path.display());
        tracing::info!("Opened {} with {} frame(s)", path.display(), frames.len());

        Ok(Self {
            frames,
            position: 0,
            resolution: (0, 0),
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl CaptureSource for ImageSequence {
    fn capture_frame(&mut self) -> Result<Option<RgbImage>> {
        let Some(path) = self.frames.get(self.position) else {
            return Ok(None);
        };

        let frame = image::open(path)
            .with_context(|| format!("Failed to decode {}", path.display()))?
            .to_rgb8();

        self.position += 1;
        self.resolution = frame.dimensions();
        Ok(Some(frame))
    }

    fn rewind(&mut self) -> Result<bool> {
        self.position = 0;
        Ok(true)
    }

    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }
}
