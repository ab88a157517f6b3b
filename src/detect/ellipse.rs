//! Contour extraction and ellipse fitting on segmentation masks.
//!
//! Only external contours are considered (borders with no enclosing contour). Among those
//! with at least `MIN_CONTOUR_POINTS` points, the one enclosing the most area is treated as a
//! closed polygon and fitted from its area moments: the centroid gives the centre, the eigenvalues of the second central
//! moments give the axes, the major eigenvector gives the angle. For a filled ellipse with
//! semi-axes `a >= b` the moment eigenvalues are `a²/4` and `b²/4`, so full axis lengths are
//! `4·sqrt(λ)`.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};

use super::result::Ellipse;

pub const MIN_CONTOUR_POINTS: usize = 5;

// Polygons with less area than this are treated as lines.
const MIN_AREA: f64 = 1e-6;

/// External contours of the non-zero region of `mask`.
pub fn external_contours(mask: &GrayImage) -> Vec<Contour<i32>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer && contour.parent.is_none())
        .collect()
}

/// Fit an ellipse to a closed polygon. `None` for degenerate input.
pub fn fit_ellipse(points: &[(f64, f64)]) -> Option<Ellipse> {
    if points.len() < MIN_CONTOUR_POINTS {
        return None;
    }

    // Shift to the first vertex to keep the sums well conditioned.
    let (ox, oy) = points[0];
    let mut area2 = 0.0;
    let (mut sx, mut sy) = (0.0, 0.0);
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (i, &(x0, y0)) in points.iter().enumerate() {
        let (x1, y1) = points[(i + 1) % points.len()];
        let (x0, y0, x1, y1) = (x0 - ox, y0 - oy, x1 - ox, y1 - oy);
        let cross = x0 * y1 - x1 * y0;
        area2 += cross;
        sx += (x0 + x1) * cross;
        sy += (y0 + y1) * cross;
        sxx += (x0 * x0 + x0 * x1 + x1 * x1) * cross;
        syy += (y0 * y0 + y0 * y1 + y1 * y1) * cross;
        sxy += (x0 * y1 + 2.0 * x0 * y0 + 2.0 * x1 * y1 + x1 * y0) * cross;
    }

    let area = area2 / 2.0;
    if area.abs() < MIN_AREA {
        return None;
    }
    // Orientation of the polygon cancels in every ratio below.
    let cx = sx / (6.0 * area);
    let cy = sy / (6.0 * area);
    let mu20 = sxx / (12.0 * area) - cx * cx;
    let mu02 = syy / (12.0 * area) - cy * cy;
    let mu11 = sxy / (24.0 * area) - cx * cy;

    let mean = (mu20 + mu02) / 2.0;
    let spread = (((mu20 - mu02) / 2.0).powi(2) + mu11 * mu11).sqrt();
    let major_var = mean + spread;
    let minor_var = mean - spread;
    if minor_var <= 0.0 || major_var <= 0.0 {
        return None;
    }

    let mut angle = 0.5 * (2.0 * mu11).atan2(mu20 - mu02).to_degrees();
    if angle < 0.0 {
        angle += 180.0;
    }
    if angle >= 180.0 {
        angle -= 180.0;
    }

    let ellipse = Ellipse::new(
        (cx + ox, cy + oy),
        (4.0 * major_var.sqrt(), 4.0 * minor_var.sqrt()),
        angle,
    );
    ellipse.is_valid().then_some(ellipse)
}

/// Absolute area enclosed by a polygon (shoelace formula).
pub fn polygon_area(points: &[(f64, f64)]) -> f64 {
    let twice: f64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(&(x0, y0), &(x1, y1))| x0 * y1 - x1 * y0)
        .sum();
    twice.abs() / 2.0
}

/// Fit the polygon with the largest enclosed area among those with at least
/// `MIN_CONTOUR_POINTS` points. Only that polygon is fitted; if its fit is degenerate the
/// result is `None` even when a smaller polygon would fit.
pub fn fit_largest(polygons: &[Vec<(f64, f64)>]) -> Option<Ellipse> {
    polygons
        .iter()
        .filter(|points| points.len() >= MIN_CONTOUR_POINTS)
        .map(|points| (polygon_area(points), points))
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .and_then(|(_, points)| fit_ellipse(points))
}

/// Ellipse of the largest qualifying external contour of `mask`.
pub fn largest_ellipse(mask: &GrayImage) -> Option<Ellipse> {
    let polygons: Vec<Vec<(f64, f64)>> = external_contours(mask)
        .into_iter()
        .map(|contour| {
            contour
                .points
                .iter()
                .map(|p| (p.x as f64, p.y as f64))
                .collect()
        })
        .collect();
    fit_largest(&polygons)
}

/// Points on the ellipse boundary, for drawing. The first point is repeated at the end.
pub fn outline_points(ellipse: &Ellipse, segments: usize) -> Vec<(f32, f32)> {
    let segments = segments.max(8);
    let (a, b) = (ellipse.major_axis() / 2.0, ellipse.minor_axis() / 2.0);
    let (sin, cos) = ellipse.angle.to_radians().sin_cos();
    (0..=segments)
        .map(|i| {
            let t = i as f64 / segments as f64 * std::f64::consts::TAU;
            let (ex, ey) = (a * t.cos(), b * t.sin());
            (
                (ellipse.center.0 + ex * cos - ey * sin) as f32,
                (ellipse.center.1 + ex * sin + ey * cos) as f32,
            )
        })
        .collect()
}
