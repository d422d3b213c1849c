use anyhow::Result;
use image::{imageops, RgbImage};
use ndarray::Array4;

/// Converts RGB frames into a model's NCHW input tensor
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// The frame is scaled by a single ratio so it fits the target size,
    /// placed in the top-left corner and zero padded. Model coordinates are
    /// mapped back to frame pixels by dividing by the returned ratio.
    ///
    /// Returns: (`[1, 3, height, width]` tensor, scale ratio)
    pub fn preprocess(&self, image: &RgbImage) -> Result<(Array4<f32>, f32)> {
        let _span = tracing::debug_span!("preprocess").entered();

        let (width, height) = image.dimensions();
        anyhow::ensure!(width > 0 && height > 0, "cannot preprocess an empty frame");

        let ratio = (self.target_width as f32 / width as f32)
            .min(self.target_height as f32 / height as f32);
        let scaled_width = ((width as f32 * ratio).round() as u32).clamp(1, self.target_width);
        let scaled_height = ((height as f32 * ratio).round() as u32).clamp(1, self.target_height);

        let resized = if (scaled_width, scaled_height) != (width, height) {
            imageops::resize(
                image,
                scaled_width,
                scaled_height,
                imageops::FilterType::Triangle,
            )
        } else {
            image.clone()
        };

        Ok((self.to_tensor(&resized), ratio))
    }

    /// Resize to exactly the target size, ignoring aspect ratio
    ///
    /// For dense models whose output map is stretched back over the frame.
    pub fn stretch(&self, image: &RgbImage) -> Result<Array4<f32>> {
        let _span = tracing::debug_span!("preprocess").entered();
        anyhow::ensure!(
            image.width() > 0 && image.height() > 0,
            "cannot preprocess an empty frame"
        );

        if image.dimensions() == (self.target_width, self.target_height) {
            return Ok(self.to_tensor(image));
        }
        let resized = imageops::resize(
            image,
            self.target_width,
            self.target_height,
            imageops::FilterType::Triangle,
        );
        Ok(self.to_tensor(&resized))
    }

    /// Zero-padded `[1, 3, height, width]` tensor with values in `[0, 1]`.
    fn to_tensor(&self, image: &RgbImage) -> Array4<f32> {
        let mut tensor = Array4::<f32>::zeros((
            1,
            3,
            self.target_height as usize,
            self.target_width as usize,
        ));

        for (x, y, pixel) in image.enumerate_pixels() {
            for channel in 0..3 {
                tensor[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
            }
        }
        tensor
    }
}
