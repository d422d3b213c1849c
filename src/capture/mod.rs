mod sequence;
mod v4l_capture;
#[cfg(feature = "video-file")]
mod video_file;

pub use sequence::ImageSequence;
pub use v4l_capture::WebcamCapture;
#[cfg(feature = "video-file")]
pub use video_file::VideoFile;

use std::path::Path;

use anyhow::{bail, Result};
use image::RgbImage;

use crate::controller::{InputKind, PipelineConfig};

/// Trait for frame sources
///
/// Handles are not required to be `Send`: the run-loop opens, uses and
/// releases them on its own thread.
pub trait CaptureSource {
    /// Capture the next frame, or `None` at end of stream
    fn capture_frame(&mut self) -> Result<Option<RgbImage>>;

    /// Seek back to the first frame
    ///
    /// Returns `false` for sources that cannot rewind (live cameras).
    fn rewind(&mut self) -> Result<bool> {
        Ok(false)
    }

    /// Get the resolution of captured frames, (0, 0) until known
    fn resolution(&self) -> (u32, u32);
}

/// Open the source selected by `config`.
pub fn open_source(config: &PipelineConfig) -> Result<Box<dyn CaptureSource>> {
    match config.input {
        InputKind::Webcam => Ok(Box::new(WebcamCapture::new(config.camera_id)?)),
        InputKind::File => {
            let Some(path) = config.video_file.as_deref() else {
                bail!("file input selected but no file is configured");
            };
            open_file(path)
        }
    }
}

fn open_file(path: &Path) -> Result<Box<dyn CaptureSource>> {
    if path.is_dir() || sequence::is_image_path(path) {
        return Ok(Box::new(ImageSequence::open(path)?));
    }

    #[cfg(feature = "video-file")]
    {
        Ok(Box::new(VideoFile::open(path)?))
    }
    #[cfg(not(feature = "video-file"))]
    {
        bail!(
            "{} is not an image or image directory; video files need the video-file feature",
            path.display()
        )
    }
}
