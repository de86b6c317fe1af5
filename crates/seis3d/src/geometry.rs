//! Geometric primitives for the regridder.
//!
//! Everything works on `glam` double-precision vectors. Triangles carry a
//! value in their z component, so "intersecting" a vertical ray with a value
//! triangle reads the interpolated value at an XY position.

use glam::{DVec2, DVec3};

/// Barycentric tolerance for point-in-triangle tests.
const EPS: f64 = 1e-11;

/// A triangle in 3D; z is either depth or an elastic value.
#[derive(Clone, Copy, Debug)]
pub struct Triangle {
    pub a: DVec3,
    pub b: DVec3,
    pub c: DVec3,
}

impl Triangle {
    pub fn new(a: DVec3, b: DVec3, c: DVec3) -> Self {
        Triangle { a, b, c }
    }

    /// True if (x, y) falls inside the XY projection of this triangle.
    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        self.barycentric(x, y)
            .map(|(u, v, w)| u >= -EPS && v >= -EPS && w >= -EPS)
            .unwrap_or(false)
    }

    /// z of the triangle plane at (x, y), regardless of containment.
    /// `None` when the XY projection is degenerate.
    pub fn plane_z_at(&self, x: f64, y: f64) -> Option<f64> {
        self.barycentric(x, y)
            .map(|(u, v, w)| u * self.a.z + v * self.b.z + w * self.c.z)
    }

    /// Intersect the vertical line at (x, y) with the triangle; `None` when
    /// the line misses the XY projection.
    pub fn vertical_intersection(&self, x: f64, y: f64) -> Option<f64> {
        let (u, v, w) = self.barycentric(x, y)?;
        if u >= -EPS && v >= -EPS && w >= -EPS {
            Some(u * self.a.z + v * self.b.z + w * self.c.z)
        } else {
            None
        }
    }

    fn barycentric(&self, x: f64, y: f64) -> Option<(f64, f64, f64)> {
        let v0 = DVec2::new(self.b.x - self.a.x, self.b.y - self.a.y);
        let v1 = DVec2::new(self.c.x - self.a.x, self.c.y - self.a.y);
        let v2 = DVec2::new(x - self.a.x, y - self.a.y);
        let den = v0.x * v1.y - v1.x * v0.y;
        if den.abs() < 1e-300 {
            return None;
        }
        let v = (v2.x * v1.y - v1.x * v2.y) / den;
        let w = (v0.x * v2.y - v2.x * v0.y) / den;
        Some((1.0 - v - w, v, w))
    }
}

/// Closed polygon in the XY plane; containment by even-odd ray casting.
#[derive(Clone, Debug, Default)]
pub struct Polygon {
    points: Vec<DVec2>,
}

impl Polygon {
    pub fn new() -> Self {
        Polygon { points: Vec::new() }
    }

    pub fn add_point(&mut self, p: DVec3) {
        self.points.push(DVec2::new(p.x, p.y));
    }

    /// Even-odd containment test in XY.
    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut jj = n - 1;
        for ii in 0..n {
            let pi = self.points[ii];
            let pj = self.points[jj];
            if ((pi.y > y) != (pj.y > y))
                && (x < (pj.x - pi.x) * (y - pi.y) / (pj.y - pi.y) + pi.x)
            {
                inside = !inside;
            }
            jj = ii;
        }
        inside
    }
}

/// Decide the quad diagonal by the local Delaunay criterion.
///
/// Corners are ordered row-major: 0=(0,0), 1=(1,0), 2=(0,1), 3=(1,1). The
/// candidate diagonal runs 0-3; when the XY angles it subtends at corners 1
/// and 2 sum to more than pi, the 1-2 diagonal wins instead.
pub fn is_124_triangulate(pts: &[DVec3; 4]) -> bool {
    let angle_at = |corner: DVec3| {
        let v1 = DVec2::new(pts[0].x - corner.x, pts[0].y - corner.y);
        let v2 = DVec2::new(pts[3].x - corner.x, pts[3].y - corner.y);
        let dot = v1.dot(v2);
        let den = v1.length() * v2.length();
        if den < 1e-300 {
            0.0
        } else {
            (dot / den).clamp(-1.0, 1.0).acos()
        }
    };
    let delaunay_angle = angle_at(pts[1]) + angle_at(pts[2]);
    delaunay_angle <= std::f64::consts::PI
}

/// Axis-aligned bounding box of a point set in the frame rotated by `angle`.
/// Returns (min_x, min_y, max_x, max_y) in rotated coordinates.
pub fn rotated_bbox(pts: &[DVec3], angle: f64) -> (f64, f64, f64, f64) {
    let (sin_a, cos_a) = angle.sin_cos();
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in pts {
        let xr = p.x * cos_a + p.y * sin_a;
        let yr = p.y * cos_a - p.x * sin_a;
        min_x = min_x.min(xr);
        min_y = min_y.min(yr);
        max_x = max_x.max(xr);
        max_y = max_y.max(yr);
    }
    (min_x, min_y, max_x, max_y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertical_intersection_interpolates_plane() {
        let tri = Triangle::new(
            DVec3::new(0.0, 0.0, 1.0),
            DVec3::new(1.0, 0.0, 2.0),
            DVec3::new(0.0, 1.0, 3.0),
        );
        let z = tri.vertical_intersection(0.25, 0.25).unwrap();
        assert!((z - 1.75).abs() < 1e-12);
        assert!(tri.vertical_intersection(0.9, 0.9).is_none());
    }

    #[test]
    fn polygon_containment() {
        let mut poly = Polygon::new();
        poly.add_point(DVec3::new(0.0, 0.0, 0.0));
        poly.add_point(DVec3::new(2.0, 0.0, 0.0));
        poly.add_point(DVec3::new(2.0, 2.0, 0.0));
        poly.add_point(DVec3::new(0.0, 2.0, 0.0));
        assert!(poly.contains_xy(1.0, 1.0));
        assert!(!poly.contains_xy(3.0, 1.0));
    }

    #[test]
    fn delaunay_prefers_short_diagonal() {
        // Square: both splits valid, angle sum is exactly pi/2 + pi/2 = pi.
        let square = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
        ];
        assert!(is_124_triangulate(&square));

        // Kite stretched along the 1-2 axis: the 0-3 diagonal becomes illegal.
        let kite = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, -0.05, 0.0),
            DVec3::new(0.05, 1.0, 0.0),
            DVec3::new(0.1, 0.1, 0.0),
        ];
        assert!(!is_124_triangulate(&kite));
    }

    #[test]
    fn rotated_bbox_unrotated_matches_plain_bbox() {
        let pts = [
            DVec3::new(1.0, 2.0, 0.0),
            DVec3::new(3.0, -1.0, 0.0),
            DVec3::new(-2.0, 0.5, 0.0),
        ];
        let (x0, y0, x1, y1) = rotated_bbox(&pts, 0.0);
        assert_eq!((x0, y0, x1, y1), (-2.0, -1.0, 3.0, 2.0));
    }
}
