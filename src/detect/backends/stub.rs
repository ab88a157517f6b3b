use anyhow::Result;
use image::{GrayImage, RgbImage};

use crate::detect::backend::SegmentationBackend;

/// Stub backend for testing. Never finds a pupil.
pub struct StubBackend {
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { calls: 0 }
    }

    /// Number of `predict` calls served.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentationBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn predict(&mut self, batch: &[RgbImage]) -> Result<Vec<GrayImage>> {
        self.calls += 1;
        Ok(batch
            .iter()
            .map(|frame| GrayImage::new(frame.width(), frame.height()))
            .collect())
    }
}
