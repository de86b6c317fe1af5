//! Regular grids.
//!
//! `Grid3` is the rotated pillar grid every regridded property lives on:
//! (nx, ny) cells in the rotated survey rectangle, `nk` vertical samples per
//! pillar with no fixed z spacing (layer index semantics are up to the
//! caller). `Grid2` is a dense row-major matrix used for per-trace work.

use serde::{Deserialize, Serialize};

/// Rotated regular 3D grid with flat storage.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Grid3 {
    /// Reference corner x (unrotated world coordinates).
    pub x0: f64,
    /// Reference corner y.
    pub y0: f64,
    /// Cell size along the rotated x axis.
    pub dx: f64,
    /// Cell size along the rotated y axis.
    pub dy: f64,
    /// Rotation angle in radians.
    pub angle: f64,
    /// Shallow end of the z range covered by the cube.
    pub z_min: f64,
    /// Deep end of the z range.
    pub z_max: f64,
    /// Cells along the rotated x axis.
    pub nx: usize,
    /// Cells along the rotated y axis.
    pub ny: usize,
    /// Vertical samples per pillar.
    pub nk: usize,
    data: Vec<f64>,
}

impl Grid3 {
    /// New grid filled with `fill`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        x0: f64,
        y0: f64,
        dx: f64,
        dy: f64,
        angle: f64,
        z_min: f64,
        z_max: f64,
        nx: usize,
        ny: usize,
        nk: usize,
        fill: f64,
    ) -> Self {
        Grid3 {
            x0,
            y0,
            dx,
            dy,
            angle,
            z_min,
            z_max,
            nx,
            ny,
            nk,
            data: vec![fill; nx * ny * nk],
        }
    }

    /// Same footprint as `other`, different vertical sample count.
    pub fn like(other: &Grid3, nk: usize, fill: f64) -> Self {
        Grid3::new(
            other.x0, other.y0, other.dx, other.dy, other.angle, other.z_min, other.z_max,
            other.nx, other.ny, nk, fill,
        )
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(i < self.nx && j < self.ny && k < self.nk);
        (k * self.ny + j) * self.nx + i
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> f64 {
        self.data[self.index(i, j, k)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, v: f64) {
        let idx = self.index(i, j, k);
        self.data[idx] = v;
    }

    /// Dimensions as a tuple.
    pub fn dims(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nk)
    }

    /// World (x, y) of the centre of cell (i, j).
    pub fn center_of_cell(&self, i: usize, j: usize) -> (f64, f64) {
        let (sin_a, cos_a) = self.angle.sin_cos();
        let xl = (i as f64 + 0.5) * self.dx;
        let yl = (j as f64 + 0.5) * self.dy;
        (
            self.x0 + xl * cos_a - yl * sin_a,
            self.y0 + xl * sin_a + yl * cos_a,
        )
    }

    /// True when the world point (x, y) falls inside the rotated footprint.
    pub fn is_inside(&self, x: f64, y: f64) -> bool {
        let (xl, yl) = self.to_local(x, y);
        xl >= 0.0 && yl >= 0.0 && xl < self.nx as f64 * self.dx && yl < self.ny as f64 * self.dy
    }

    /// Cell index of a world point; `None` outside the footprint.
    pub fn find_index(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let (xl, yl) = self.to_local(x, y);
        if xl < 0.0 || yl < 0.0 {
            return None;
        }
        let i = (xl / self.dx) as usize;
        let j = (yl / self.dy) as usize;
        if i < self.nx && j < self.ny {
            Some((i, j))
        } else {
            None
        }
    }

    /// Rotated-frame coordinate of the grid origin; bounding-box math in the
    /// regridder works in this frame.
    pub fn origin_rot(&self) -> (f64, f64) {
        let (sin_a, cos_a) = self.angle.sin_cos();
        (
            self.x0 * cos_a + self.y0 * sin_a,
            self.y0 * cos_a - self.x0 * sin_a,
        )
    }

    /// Immutable view of the raw samples.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Mutable view of the raw samples.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Mutable k-slabs for lock-free parallel passes (one slab per k).
    pub fn k_slabs_mut(&mut self) -> std::slice::ChunksMut<'_, f64> {
        self.data.chunks_mut(self.nx * self.ny)
    }

    fn to_local(&self, x: f64, y: f64) -> (f64, f64) {
        let (sin_a, cos_a) = self.angle.sin_cos();
        let rx = x - self.x0;
        let ry = y - self.y0;
        (rx * cos_a + ry * sin_a, ry * cos_a - rx * sin_a)
    }
}

/// Dense row-major matrix of f64.
#[derive(Clone, Debug, Default)]
pub struct Grid2 {
    ni: usize,
    nj: usize,
    data: Vec<f64>,
}

impl Grid2 {
    pub fn new(ni: usize, nj: usize, fill: f64) -> Self {
        Grid2 {
            ni,
            nj,
            data: vec![fill; ni * nj],
        }
    }

    pub fn ni(&self) -> usize {
        self.ni
    }

    pub fn nj(&self) -> usize {
        self.nj
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        debug_assert!(i < self.ni && j < self.nj);
        self.data[j * self.ni + i]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, v: f64) {
        debug_assert!(i < self.ni && j < self.nj);
        self.data[j * self.ni + i] = v;
    }

    pub fn fill(&mut self, v: f64) {
        self.data.fill(v);
    }

    /// Column `j` as a contiguous slice.
    pub fn column(&self, j: usize) -> &[f64] {
        &self.data[j * self.ni..(j + 1) * self.ni]
    }

    /// Mutable column `j`.
    pub fn column_mut(&mut self, j: usize) -> &mut [f64] {
        &mut self.data[j * self.ni..(j + 1) * self.ni]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_roundtrip() {
        let mut g = Grid3::new(0.0, 0.0, 10.0, 10.0, 0.0, 0.0, 100.0, 4, 3, 2, 0.0);
        g.set(3, 2, 1, 7.5);
        assert_eq!(g.get(3, 2, 1), 7.5);
        assert_eq!(g.data().len(), 24);
    }

    #[test]
    fn center_and_inside_unrotated() {
        let g = Grid3::new(100.0, 200.0, 10.0, 20.0, 0.0, 0.0, 1.0, 5, 5, 1, 0.0);
        let (x, y) = g.center_of_cell(0, 0);
        assert!((x - 105.0).abs() < 1e-12);
        assert!((y - 210.0).abs() < 1e-12);
        assert!(g.is_inside(100.1, 200.1));
        assert!(!g.is_inside(99.9, 200.1));
        assert!(!g.is_inside(151.0, 210.0));
    }

    #[test]
    fn center_respects_rotation() {
        let angle = std::f64::consts::FRAC_PI_2;
        let g = Grid3::new(0.0, 0.0, 10.0, 10.0, angle, 0.0, 1.0, 2, 2, 1, 0.0);
        let (x, y) = g.center_of_cell(0, 0);
        // Local (5, 5) rotated 90 degrees lands at (-5, 5).
        assert!((x + 5.0).abs() < 1e-9);
        assert!((y - 5.0).abs() < 1e-9);
        assert!(g.is_inside(-5.0, 5.0));
        assert!(!g.is_inside(5.0, -5.0));
    }

    #[test]
    fn find_index_matches_center() {
        let g = Grid3::new(0.0, 0.0, 10.0, 10.0, 0.3, 0.0, 1.0, 6, 4, 1, 0.0);
        for i in 0..6 {
            for j in 0..4 {
                let (x, y) = g.center_of_cell(i, j);
                assert_eq!(g.find_index(x, y), Some((i, j)));
            }
        }
    }

    #[test]
    fn grid2_columns_are_contiguous() {
        let mut m = Grid2::new(3, 2, 0.0);
        m.set(0, 1, 1.0);
        m.set(2, 1, 3.0);
        assert_eq!(m.column(1), &[1.0, 0.0, 3.0]);
    }
}
