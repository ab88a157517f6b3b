use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};

use super::{SourceStats, StereoSource};
use crate::frame::EyePair;

/// Repeats one left/right image pair loaded from local files.
pub struct StillPairSource {
    paths: EyePair<PathBuf>,
    frames: EyePair<RgbImage>,
    pairs_captured: u64,
}

impl StillPairSource {
    pub fn open(left: impl AsRef<Path>, right: impl AsRef<Path>) -> Result<Self> {
        let paths = EyePair::new(left.as_ref().to_path_buf(), right.as_ref().to_path_buf());
        let [left_frame, right_frame] = paths.clone().map(|_, path| load(&path)).into_inner();
        Ok(Self {
            paths,
            frames: EyePair::new(left_frame?, right_frame?),
            pairs_captured: 0,
        })
    }
}

fn load(path: &Path) -> Result<RgbImage> {
    let shown = path.display().to_string();
    if shown.contains("://") {
        return Err(anyhow!(
            "still pair source only supports local paths (got {})",
            shown
        ));
    }
    let frame = image::open(path)
        .with_context(|| format!("failed to open eye image {}", shown))?
        .into_rgb8();
    if frame.width() == 0 || frame.height() == 0 {
        return Err(anyhow!("eye image {} is empty", shown));
    }
    Ok(frame)
}

impl StereoSource for StillPairSource {
    fn name(&self) -> &'static str {
        "still"
    }

    fn next_pair(&mut self) -> Result<EyePair<RgbImage>> {
        self.pairs_captured += 1;
        Ok(self.frames.clone())
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            pairs_captured: self.pairs_captured,
            description: format!(
                "still:{}+{}",
                self.paths.get(crate::frame::Eye::Left).display(),
                self.paths.get(crate::frame::Eye::Right).display()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Eye;
    use image::Rgb;

    #[test]
    fn repeats_loaded_pair() {
        let dir = tempfile::tempdir().unwrap();
        let left = dir.path().join("left.png");
        let right = dir.path().join("right.png");
        RgbImage::from_pixel(8, 6, Rgb([1, 2, 3])).save(&left).unwrap();
        RgbImage::from_pixel(8, 6, Rgb([4, 5, 6])).save(&right).unwrap();

        let mut source = StillPairSource::open(&left, &right).unwrap();
        let first = source.next_pair().unwrap();
        let second = source.next_pair().unwrap();
        assert_eq!(first[Eye::Right].get_pixel(0, 0), &Rgb([4, 5, 6]));
        assert_eq!(first, second);
        assert_eq!(source.stats().pairs_captured, 2);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(StillPairSource::open("/nonexistent/left.png", "/nonexistent/right.png").is_err());
    }

    #[test]
    fn url_is_rejected() {
        assert!(StillPairSource::open("http://camera/left.png", "right.png").is_err());
    }
}
