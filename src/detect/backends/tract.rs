#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{GrayImage, Luma, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::SegmentationBackend;

/// Tract-based backend for ONNX segmentation models.
///
/// Expects a channels-last model: input `(1, height, width, 3)` with values in `[0, 1]`,
/// output `(1, height, width, classes)`. A pixel whose best class is not background (class 0)
/// is marked as pupil.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, height as usize, width as usize, 3),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            width,
            height,
        })
    }

    fn build_input(&self, frame: &RgbImage) -> Result<Tensor> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            ));
        }
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, self.height as usize, self.width as usize, 3),
            |(_, y, x, channel)| frame.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        Ok(input.into_tensor())
    }

    fn extract_mask(&self, outputs: TVec<TValue>) -> Result<GrayImage> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix4>()
            .context("model output is not (batch, height, width, classes)")?;
        let (_, height, width, classes) = scores.dim();
        if (width as u32, height as u32) != (self.width, self.height) || classes == 0 {
            return Err(anyhow!(
                "unexpected model output shape {:?}",
                scores.shape()
            ));
        }

        let mut mask = GrayImage::new(self.width, self.height);
        for y in 0..height {
            for x in 0..width {
                let mut best = 0;
                for class in 1..classes {
                    if scores[[0, y, x, class]] > scores[[0, y, x, best]] {
                        best = class;
                    }
                }
                let value = if best == 0 { 0 } else { 255 };
                mask.put_pixel(x as u32, y as u32, Luma([value]));
            }
        }
        Ok(mask)
    }
}

impl SegmentationBackend for TractBackend {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn predict(&mut self, batch: &[RgbImage]) -> Result<Vec<GrayImage>> {
        batch
            .iter()
            .map(|frame| {
                let input = self.build_input(frame)?;
                let outputs = self
                    .model
                    .run(tvec!(input.into()))
                    .context("ONNX inference failed")?;
                self.extract_mask(outputs)
            })
            .collect()
    }
}
