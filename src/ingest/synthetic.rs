use anyhow::Result;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{SourceStats, StereoSource};
use crate::frame::{Eye, EyePair};

const BACKGROUND: Rgb<u8> = Rgb([200, 190, 185]);
const IRIS: Rgb<u8> = Rgb([120, 100, 90]);
const PUPIL: Rgb<u8> = Rgb([12, 12, 12]);
const GLINT: Rgb<u8> = Rgb([255, 255, 255]);

/// Configuration for the synthetic eye generator.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
    pub pupil_radius: i32,
    /// Maximum per-frame pupil movement in pixels along each axis.
    pub jitter: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            width: 400,
            height: 400,
            pupil_radius: 30,
            jitter: 3.0,
            seed: 7,
        }
    }
}

/// Draws a dark pupil on a grey iris for each eye, wandering a little every frame.
pub struct SyntheticStereoSource {
    config: SyntheticConfig,
    rng: StdRng,
    centers: EyePair<(f64, f64)>,
    pairs_captured: u64,
}

impl SyntheticStereoSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        let centers = EyePair::from_fn(|_| (config.width as f64 / 2.0, config.height as f64 / 2.0));
        Self {
            config,
            rng,
            centers,
            pairs_captured: 0,
        }
    }

    /// Pupil centre drawn into the most recent frame for `eye`.
    pub fn pupil_center(&self, eye: Eye) -> (f64, f64) {
        self.centers[eye]
    }

    fn step_centers(&mut self) {
        let jitter = self.config.jitter.abs();
        let margin = (self.config.pupil_radius * 2) as f64;
        let (max_x, max_y) = (self.config.width as f64, self.config.height as f64);
        for eye in Eye::ALL {
            let (x, y) = self.centers[eye];
            let (dx, dy) = if jitter > 0.0 {
                (
                    self.rng.gen_range(-jitter..=jitter),
                    self.rng.gen_range(-jitter..=jitter),
                )
            } else {
                (0.0, 0.0)
            };
            self.centers[eye] = (
                (x + dx).clamp(margin.min(max_x / 2.0), (max_x - margin).max(max_x / 2.0)),
                (y + dy).clamp(margin.min(max_y / 2.0), (max_y - margin).max(max_y / 2.0)),
            );
        }
    }

    fn render(&self, eye: Eye) -> RgbImage {
        let mut frame = RgbImage::from_pixel(self.config.width, self.config.height, BACKGROUND);
        let (x, y) = self.centers[eye];
        let center = (x.round() as i32, y.round() as i32);
        let radius = self.config.pupil_radius.max(1);
        draw_filled_circle_mut(&mut frame, center, radius * 2, IRIS);
        draw_filled_circle_mut(&mut frame, center, radius, PUPIL);
        draw_filled_circle_mut(
            &mut frame,
            (center.0 + radius / 2, center.1 - radius / 2),
            (radius / 6).max(1),
            GLINT,
        );
        frame
    }
}

impl StereoSource for SyntheticStereoSource {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticStereoSource: {}x{} pupil radius {} (seed {})",
            self.config.width,
            self.config.height,
            self.config.pupil_radius,
            self.config.seed
        );
        Ok(())
    }

    fn next_pair(&mut self) -> Result<EyePair<RgbImage>> {
        if self.pairs_captured > 0 {
            self.step_centers();
        }
        self.pairs_captured += 1;
        Ok(EyePair::from_fn(|eye| self.render(eye)))
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            pairs_captured: self.pairs_captured,
            description: format!("synthetic:{}x{}", self.config.width, self.config.height),
        }
    }
}
