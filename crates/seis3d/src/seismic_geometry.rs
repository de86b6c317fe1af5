//! Survey geometry.
//!
//! The rotated output rectangle plus its lateral, vertical and temporal
//! sampling. The z range is fixed during surface setup; the t range and
//! trace length are fixed after the TWT grid exists.

use serde::{Deserialize, Serialize};

/// Rotated survey rectangle and sampling of the output grids.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SeismicGeometry {
    /// Reference corner x.
    pub x0: f64,
    /// Reference corner y.
    pub y0: f64,
    /// Extent along the rotated x axis.
    pub lx: f64,
    /// Extent along the rotated y axis.
    pub ly: f64,
    /// Rotation angle in radians.
    pub angle: f64,

    /// Lateral sampling (m).
    pub dx: f64,
    /// Lateral sampling (m).
    pub dy: f64,
    /// Depth sampling (m).
    pub dz: f64,
    /// Time sampling (ms).
    pub dt: f64,

    /// Shallowest output depth.
    pub z_min: f64,
    /// Deepest output depth.
    pub z_max: f64,
    /// Earliest output time (ms).
    pub t_min: f64,
    /// Latest output time (ms).
    pub t_max: f64,

    /// Trace length in samples; derived after the TWT pass.
    pub nt: usize,
    /// Reflector count: bottom_k - top_k + 2.
    pub z_reflector_count: usize,
}

impl SeismicGeometry {
    /// Set the rotated rectangle.
    pub fn set_geometry(&mut self, x0: f64, y0: f64, lx: f64, ly: f64, angle: f64) {
        self.x0 = x0;
        self.y0 = y0;
        self.lx = lx;
        self.ly = ly;
        self.angle = angle;
    }

    /// Set the depth range covered by the output cube.
    pub fn set_z_range(&mut self, z_min: f64, z_max: f64) {
        self.z_min = z_min;
        self.z_max = z_max;
    }

    /// Fix the time axis once top/bottom time surfaces are known. `t_min`
    /// snaps to a multiple of `dt` and `nt` spans the padded surfaces.
    pub fn set_time_axis(&mut self, t_min: f64, t_max: f64) {
        let ns = (t_min / self.dt).round();
        self.t_min = ns * self.dt;
        self.t_max = t_max;
        self.nt = ((t_max - self.t_min) / self.dt).ceil() as usize + 1;
    }

    /// Cells along the rotated x axis.
    pub fn nx(&self) -> usize {
        (self.lx / self.dx).ceil() as usize
    }

    /// Cells along the rotated y axis.
    pub fn ny(&self) -> usize {
        (self.ly / self.dy).ceil() as usize
    }

    /// Depth samples.
    pub fn nz(&self) -> usize {
        ((self.z_max - self.z_min) / self.dz).ceil() as usize
    }

    /// Trace length in samples.
    pub fn nt(&self) -> usize {
        self.nt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> SeismicGeometry {
        let mut g = SeismicGeometry {
            dx: 25.0,
            dy: 25.0,
            dz: 4.0,
            dt: 4.0,
            ..Default::default()
        };
        g.set_geometry(0.0, 0.0, 1000.0, 500.0, 0.0);
        g
    }

    #[test]
    fn lateral_sampling_rounds_up() {
        let mut g = geometry();
        assert_eq!(g.nx(), 40);
        assert_eq!(g.ny(), 20);
        g.lx = 1010.0;
        assert_eq!(g.nx(), 41);
    }

    #[test]
    fn time_axis_snaps_and_counts() {
        let mut g = geometry();
        g.set_time_axis(998.0, 1500.0);
        assert!((g.t_min - 996.0).abs() < 1e-12);
        assert_eq!(g.nt(), ((1500.0f64 - 996.0) / 4.0).ceil() as usize + 1);
    }

    #[test]
    fn depth_sampling_covers_range() {
        let mut g = geometry();
        g.set_z_range(100.0, 341.0);
        assert_eq!(g.nz(), 61);
    }
}
