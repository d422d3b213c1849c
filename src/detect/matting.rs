use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops, GrayImage, Luma, RgbImage};
use ndarray::{arr1, s, Array4, ArrayView2, Ix4};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use super::preprocess::Preprocessor;
use super::segmented::SegmentationModel;

const INPUT_SIZE: u32 = 512;

/// RobustVideoMatting exported to ONNX
///
/// Inputs are `src, r1i..r4i, downsample_ratio`; outputs are
/// `fgr, pha, r1o..r4o`. The recurrent states are fed back each frame for
/// temporal consistency.
pub struct RobustVideoMatting {
    session: Session,
    preprocessor: Preprocessor,
    downsample_ratio: f32,
    recurrent: Option<[Array4<f32>; 4]>,
}

impl RobustVideoMatting {
    /// Load a matting model from an ONNX file
    ///
    /// # Default Configuration
    /// - Input size: 512x512
    /// - Downsample ratio: 0.25
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let path = model_path.as_ref();
        anyhow::ensure!(
            path.exists(),
            "matting model not found at {} (download it and place it there)",
            path.display()
        );

        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        tracing::info!("RVM model loaded successfully");

        Ok(Self {
            session,
            preprocessor: Preprocessor::new(INPUT_SIZE, INPUT_SIZE),
            downsample_ratio: 0.25,
            recurrent: None,
        })
    }
}

impl SegmentationModel for RobustVideoMatting {
    fn segment(&mut self, frame: &RgbImage) -> Result<GrayImage> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let input = self.preprocessor.stretch(frame)?;
        // The exported graph accepts 1x1x1x1 zeros as the first-frame state.
        let [r1, r2, r3, r4] = self
            .recurrent
            .take()
            .unwrap_or_else(|| std::array::from_fn(|_| Array4::zeros((1, 1, 1, 1))));
        let ratio = arr1(&[self.downsample_ratio]);

        let outputs = self
            .session
            .run(ort::inputs![
                TensorRef::from_array_view(input.view())?,
                TensorRef::from_array_view(r1.view())?,
                TensorRef::from_array_view(r2.view())?,
                TensorRef::from_array_view(r3.view())?,
                TensorRef::from_array_view(r4.view())?,
                TensorRef::from_array_view(ratio.view())?
            ])
            .context("Failed to run inference")?;

        let pha = outputs[1]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?;
        let (width, height) = frame.dimensions();
        let mask = matte_to_mask(pha.slice(s![0, 0, .., ..]), width, height);

        let mut next = Vec::with_capacity(4);
        for index in 2..6 {
            next.push(
                outputs[index]
                    .try_extract_array::<f32>()?
                    .into_dimensionality::<Ix4>()?
                    .to_owned(),
            );
        }
        self.recurrent = next.try_into().ok();

        Ok(mask)
    }

    fn reset_state(&mut self) {
        tracing::info!("Resetting RVM hidden states");
        self.recurrent = None;
    }
}

/// Alpha values in `[0, 1]` to an 8-bit mask at `width`x`height`.
fn matte_to_mask(matte: ArrayView2<'_, f32>, width: u32, height: u32) -> GrayImage {
    let (rows, cols) = matte.dim();
    let raw = GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        Luma([(matte[[y as usize, x as usize]] * 255.0).clamp(0.0, 255.0) as u8])
    });
    if raw.dimensions() == (width, height) || raw.width() == 0 || raw.height() == 0 {
        return raw;
    }
    imageops::resize(&raw, width, height, imageops::FilterType::Triangle)
}
