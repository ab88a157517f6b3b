use serde::{Deserialize, Serialize};

use crate::frame::{EyePair, SequenceId};

/// Wire shape of an ellipse: `[[cx, cy], [major, minor], angle]`.
type EllipseWire = ((f64, f64), (f64, f64), f64);

/// Fitted pupil ellipse in the model's native working resolution.
///
/// `axes` holds full axis lengths (not semi-axes). The fitter writes the major axis first and
/// `angle` is the orientation of that first axis in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "EllipseWire", into = "EllipseWire")]
pub struct Ellipse {
    pub center: (f64, f64),
    pub axes: (f64, f64),
    pub angle: f64,
}

impl Ellipse {
    pub fn new(center: (f64, f64), axes: (f64, f64), angle: f64) -> Self {
        Self {
            center,
            axes,
            angle,
        }
    }

    pub fn major_axis(&self) -> f64 {
        self.axes.0
    }

    pub fn minor_axis(&self) -> f64 {
        self.axes.1
    }

    /// Both axis lengths strictly positive and every field finite.
    pub fn is_valid(&self) -> bool {
        let finite = [
            self.center.0,
            self.center.1,
            self.axes.0,
            self.axes.1,
            self.angle,
        ]
        .iter()
        .all(|v| v.is_finite());
        finite && self.axes.0 > 0.0 && self.axes.1 > 0.0
    }

    pub fn area(&self) -> f64 {
        std::f64::consts::PI * (self.axes.0 / 2.0) * (self.axes.1 / 2.0)
    }
}

impl From<EllipseWire> for Ellipse {
    fn from((center, axes, angle): EllipseWire) -> Self {
        Self::new(center, axes, angle)
    }
}

impl From<Ellipse> for EllipseWire {
    fn from(ellipse: Ellipse) -> Self {
        (ellipse.center, ellipse.axes, ellipse.angle)
    }
}

/// Per-eye detection outcome for one stereo pair. `None` means no detection this cycle.
pub type EyeDetections = EyePair<Option<Ellipse>>;

/// One detection result, produced once per processed stereo pair.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionMessage {
    pub sequence_id: SequenceId,
    pub eyes: EyeDetections,
}

impl DetectionMessage {
    pub fn new(sequence_id: SequenceId, eyes: EyeDetections) -> Self {
        Self { sequence_id, eyes }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ellipse_serializes_as_nested_arrays() {
        let ellipse = Ellipse::new((10.0, 12.5), (6.0, 4.0), 30.0);
        let json = serde_json::to_string(&ellipse).unwrap();
        assert_eq!(json, "[[10.0,12.5],[6.0,4.0],30.0]");
    }

    #[test]
    fn ellipse_accepts_integer_fields() {
        let ellipse: Ellipse = serde_json::from_str("[[10,10],[4,6],30]").unwrap();
        assert_eq!(ellipse, Ellipse::new((10.0, 10.0), (4.0, 6.0), 30.0));
    }

    #[test]
    fn validity_requires_positive_axes() {
        assert!(Ellipse::new((1.0, 1.0), (2.0, 1.0), 0.0).is_valid());
        assert!(!Ellipse::new((1.0, 1.0), (2.0, 0.0), 0.0).is_valid());
        assert!(!Ellipse::new((f64::NAN, 1.0), (2.0, 1.0), 0.0).is_valid());
        assert!(!Ellipse::default().is_valid());
    }
}
