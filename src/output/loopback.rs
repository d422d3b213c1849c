use super::VideoSink;
use anyhow::{Context, Result};
use image::RgbImage;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

pub struct V4L2Output {
    path: PathBuf,
    file: File,
    width: u32,
    height: u32,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        if let Err(e) = configure_format(path, width, height) {
            tracing::warn!(
                "Could not set YUYV {}x{} on {}: {:#}",
                width,
                height,
                path.display(),
                e
            );
        }

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options()
            .write(true)
            .open(path)
            .with_context(|| format!("Failed to open v4l2loopback device at {}", path.display()))?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            width,
            height,
        })
    }

    /// Convert RGB frame to YUV422 (YUYV) format
    fn rgb_to_yuyv(rgb_image: &RgbImage) -> Vec<u8> {
        let (width, height) = rgb_image.dimensions();
        let mut yuyv = Vec::with_capacity((width * height * 2) as usize);

        for y in 0..height {
            for x in (0..width).step_by(2) {
                let pixel1 = rgb_image.get_pixel(x, y);
                let pixel2 = if x + 1 < width {
                    rgb_image.get_pixel(x + 1, y)
                } else {
                    pixel1
                };

                let (y1, u1, v1) = rgb_to_yuv(pixel1[0], pixel1[1], pixel1[2]);
                let (y2, u2, v2) = rgb_to_yuv(pixel2[0], pixel2[1], pixel2[2]);

                // Chroma is shared by the pixel pair
                let u = ((u1 as u16 + u2 as u16) / 2) as u8;
                let v = ((v1 as u16 + v2 as u16) / 2) as u8;

                yuyv.extend_from_slice(&[y1, u, y2, v]);
            }
        }

        yuyv
    }
}

/// Ask the loopback device to advertise the format we are about to write.
fn configure_format(path: &Path, width: u32, height: u32) -> Result<()> {
    let device = Device::with_path(path)
        .with_context(|| format!("Failed to open {} for format negotiation", path.display()))?;
    let requested = Format::new(width, height, FourCC::new(b"YUYV"));
    let applied = Output::set_format(&device, &requested).context("VIDIOC_S_FMT failed")?;
    tracing::debug!("Loopback format: {}x{}", applied.width, applied.height);
    Ok(())
}

/// Convert RGB to YUV color space
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let r = r as f32;
    let g = g as f32;
    let b = b as f32;

    let y = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
    let u = ((-0.147 * r - 0.289 * g + 0.436 * b) + 128.0).round().clamp(0.0, 255.0) as u8;
    let v = ((0.615 * r - 0.515 * g - 0.100 * b) + 128.0).round().clamp(0.0, 255.0) as u8;

    (y, u, v)
}

impl VideoSink for V4L2Output {
    fn send_frame(&mut self, frame: &RgbImage) -> Result<()> {
        let resized;
        let frame = if frame.dimensions() != (self.width, self.height) {
            resized = image::imageops::resize(
                frame,
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            );
            &resized
        } else {
            frame
        };

        let yuyv_data = Self::rgb_to_yuyv(frame);

        self.file
            .write_all(&yuyv_data)
            .with_context(|| format!("Failed to write frame to {}", self.path.display()))?;

        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_and_black_map_to_luma_extremes() {
        assert_eq!(rgb_to_yuv(255, 255, 255), (255, 128, 128));
        assert_eq!(rgb_to_yuv(0, 0, 0), (0, 128, 128));
    }

    #[test]
    fn yuyv_packs_two_pixels_into_four_bytes() {
        let mut image = RgbImage::new(3, 1);
        image.put_pixel(0, 0, image::Rgb([255, 255, 255]));
        let packed = V4L2Output::rgb_to_yuyv(&image);

        // Odd width repeats the last pixel to fill the final pair.
        assert_eq!(packed.len(), 8);
        assert_eq!(packed[0], 255);
        assert_eq!(packed[2], 0);
        assert_eq!(packed[4], 0);
        assert_eq!(packed[6], 0);
    }
}
