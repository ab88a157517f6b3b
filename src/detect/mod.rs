//! Pupil detection: segmentation backends plus mask-to-ellipse fitting.

mod backend;
mod backends;
mod ellipse;
mod registry;
mod result;

pub use backend::SegmentationBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use backends::threshold::DEFAULT_DARK_THRESHOLD;
pub use backends::{StubBackend, ThresholdBackend};
pub use ellipse::{
    external_contours, fit_ellipse, fit_largest, largest_ellipse, outline_points, polygon_area,
    MIN_CONTOUR_POINTS,
};
pub use registry::{ModelRegistry, SharedBackend};
pub use result::{DetectionMessage, Ellipse, EyeDetections};
