//! Pupil record handed to the host eye-tracking runtime.

use serde::Serialize;

use crate::cache::PupilReading;
use crate::frame::Eye;

pub const DETECTOR_IDENTIFIER: &str = "2d";
pub const DETECTION_METHOD: &str = "custom-2d";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EllipseDatum {
    pub center: (f64, f64),
    pub axes: (f64, f64),
    pub angle: f64,
}

/// One pupil datum per eye per host video frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PupilDatum {
    pub ellipse: EllipseDatum,
    pub diameter: f64,
    pub location: (f64, f64),
    pub confidence: f64,
    pub id: usize,
    pub topic: String,
    pub method: String,
    pub timestamp: f64,
    pub norm_pos: (f64, f64),
}

impl PupilDatum {
    /// Build the datum for `eye` from a cache reading taken for a frame of `frame_size` pixels.
    ///
    /// Confidence is always 1.0: the cache returns a usable value even when nothing new
    /// arrived, and the host has no other signal to weigh.
    pub fn from_reading(
        eye: Eye,
        reading: &PupilReading,
        frame_size: (u32, u32),
        timestamp: f64,
    ) -> Self {
        let location = (reading.center_x, reading.center_y);
        let id = eye.index();
        Self {
            ellipse: EllipseDatum {
                center: location,
                axes: (reading.major_axis, reading.minor_axis),
                angle: reading.angle,
            },
            diameter: reading.major_axis,
            location,
            confidence: 1.0,
            id,
            topic: format!("pupil.{}.{}", id, DETECTOR_IDENTIFIER),
            method: DETECTION_METHOD.to_string(),
            timestamp,
            norm_pos: normalize(location, frame_size, true),
        }
    }
}

/// Pixel position to `[0, 1]` frame coordinates, optionally with the y axis pointing up.
pub fn normalize(location: (f64, f64), frame_size: (u32, u32), flip_y: bool) -> (f64, f64) {
    let (width, height) = (frame_size.0 as f64, frame_size.1 as f64);
    if width <= 0.0 || height <= 0.0 {
        return (0.0, 0.0);
    }
    let x = location.0 / width;
    let y = location.1 / height;
    if flip_y {
        (x, 1.0 - y)
    } else {
        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datum_fields_follow_reading() {
        let reading = PupilReading {
            center_x: 100.0,
            center_y: 300.0,
            major_axis: 12.0,
            minor_axis: 8.0,
            angle: 45.0,
        };
        let datum = PupilDatum::from_reading(Eye::Right, &reading, (400, 400), 12.5);
        assert_eq!(datum.id, 1);
        assert_eq!(datum.topic, "pupil.1.2d");
        assert_eq!(datum.method, "custom-2d");
        assert_eq!(datum.diameter, 12.0);
        assert_eq!(datum.location, (100.0, 300.0));
        assert_eq!(datum.norm_pos, (0.25, 0.25));
        assert_eq!(datum.confidence, 1.0);
    }

    #[test]
    fn datum_serializes_with_host_field_names() {
        let datum = PupilDatum::from_reading(Eye::Left, &PupilReading::ZERO, (400, 400), 0.0);
        let value = serde_json::to_value(&datum).unwrap();
        assert_eq!(value["topic"], "pupil.0.2d");
        assert_eq!(value["ellipse"]["axes"][0], 0.0);
        assert_eq!(value["norm_pos"][1], 1.0);
    }

    #[test]
    fn normalize_handles_zero_frame() {
        assert_eq!(normalize((5.0, 5.0), (0, 10), true), (0.0, 0.0));
    }
}
