//! Stereo frame sources for the sending client.
//!
//! - Synthetic eye generator (testing, demos)
//! - Still image pair from local files
//!
//! A source yields one left/right pair per call; pacing is the caller's job.

pub mod still;
pub mod synthetic;

use anyhow::Result;
use image::RgbImage;

use crate::frame::EyePair;

pub use still::StillPairSource;
pub use synthetic::{SyntheticConfig, SyntheticStereoSource};

/// Statistics for a stereo source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub pairs_captured: u64,
    pub description: String,
}

/// Producer of stereo eye pairs.
pub trait StereoSource: Send {
    fn name(&self) -> &'static str;

    /// Prepare the source. Called once before the first `next_pair`.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Capture the next left/right pair.
    fn next_pair(&mut self) -> Result<EyePair<RgbImage>>;

    fn stats(&self) -> SourceStats;
}
