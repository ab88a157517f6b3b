use anyhow::{anyhow, Result};
use image::{imageops, GrayImage, Luma, RgbImage};

use crate::detect::backend::SegmentationBackend;

/// Luma below which a pixel counts as pupil.
pub const DEFAULT_DARK_THRESHOLD: u8 = 40;

/// CPU backend for dark-pupil segmentation.
///
/// Under IR illumination the pupil is the darkest region of an eye image, so a fixed luma
/// threshold gives a usable mask without a learned model.
pub struct ThresholdBackend {
    threshold: u8,
}

impl ThresholdBackend {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }
}

impl Default for ThresholdBackend {
    fn default() -> Self {
        Self::new(DEFAULT_DARK_THRESHOLD)
    }
}

impl SegmentationBackend for ThresholdBackend {
    fn name(&self) -> &'static str {
        "threshold"
    }

    fn predict(&mut self, batch: &[RgbImage]) -> Result<Vec<GrayImage>> {
        batch
            .iter()
            .map(|frame| {
                if frame.width() == 0 || frame.height() == 0 {
                    return Err(anyhow!("cannot segment an empty frame"));
                }
                let mut mask = imageops::grayscale(frame);
                for pixel in mask.pixels_mut() {
                    let value = if pixel[0] < self.threshold { 255 } else { 0 };
                    *pixel = Luma([value]);
                }
                Ok(mask)
            })
            .collect()
    }
}
