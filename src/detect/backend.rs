use anyhow::Result;
use image::{GrayImage, RgbImage};

/// Pupil segmentation backend.
///
/// `predict` receives a batch of frames already resized to the backend's working resolution
/// and returns one 8-bit classification mask per frame at the same resolution: 255 where the
/// pixel is classified as pupil, 0 elsewhere. The relay calls it once per stereo pair with a
/// batch of two.
///
/// Implementations must be pure with respect to the batch: no frame may be retained after the
/// call returns.
pub trait SegmentationBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Segment every frame in `batch`. The result has the same length and order as the input.
    fn predict(&mut self, batch: &[RgbImage]) -> Result<Vec<GrayImage>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
