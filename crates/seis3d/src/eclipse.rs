//! In-memory corner-point reservoir grid.
//!
//! Stand-in for an Eclipse grid reader: vertical pillars on an (ni+1, nj+1)
//! lattice, eight corner depths per hexahedral cell, a per-cell active flag
//! and named per-cell parameters. File parsing stays outside the engine; the
//! driver deserialises one of these from JSON.

use std::collections::HashMap;

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::geometry::{is_124_triangulate, rotated_bbox, Triangle};
use crate::grid::Grid2;

/// Which face of a cell a layer surface is read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Face {
    /// Shallow face of layer k.
    Top,
    /// Deep face of layer k.
    Bottom,
}

/// Raster description used when sampling a layer surface.
#[derive(Clone, Copy, Debug)]
pub struct RasterSpec {
    pub x0: f64,
    pub y0: f64,
    pub dx: f64,
    pub dy: f64,
    pub angle: f64,
    pub nx: usize,
    pub ny: usize,
}

/// Corner-point grid with vertical pillars.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CornerPointGrid {
    ni: usize,
    nj: usize,
    nk: usize,
    /// Pillar positions, (ni+1) * (nj+1), row-major.
    pillars: Vec<DVec2>,
    /// Corner depths per cell; local corner index is a + 2b + 4c with
    /// a,b in {0,1} along x,y and c = 0 top / 1 bottom.
    zcorn: Vec<[f64; 8]>,
    active: Vec<bool>,
    parameters: HashMap<String, Vec<f64>>,
}

impl CornerPointGrid {
    /// Build a fully active grid whose horizon depths come from
    /// `depth(x, y, horizon)` for horizon indices 0..=nk.
    pub fn from_layer_depths<F>(
        ni: usize,
        nj: usize,
        nk: usize,
        x0: f64,
        y0: f64,
        dx: f64,
        dy: f64,
        depth: F,
    ) -> Self
    where
        F: Fn(f64, f64, usize) -> f64,
    {
        let mut pillars = Vec::with_capacity((ni + 1) * (nj + 1));
        for j in 0..=nj {
            for i in 0..=ni {
                pillars.push(DVec2::new(x0 + i as f64 * dx, y0 + j as f64 * dy));
            }
        }
        let mut zcorn = vec![[0.0; 8]; ni * nj * nk];
        for k in 0..nk {
            for j in 0..nj {
                for i in 0..ni {
                    let mut corners = [0.0; 8];
                    for b in 0..2 {
                        for a in 0..2 {
                            let p = pillars[(j + b) * (ni + 1) + (i + a)];
                            corners[a + 2 * b] = depth(p.x, p.y, k);
                            corners[a + 2 * b + 4] = depth(p.x, p.y, k + 1);
                        }
                    }
                    zcorn[(k * nj + j) * ni + i] = corners;
                }
            }
        }
        CornerPointGrid {
            ni,
            nj,
            nk,
            pillars,
            zcorn,
            active: vec![true; ni * nj * nk],
            parameters: HashMap::new(),
        }
    }

    pub fn ni(&self) -> usize {
        self.ni
    }

    pub fn nj(&self) -> usize {
        self.nj
    }

    pub fn nk(&self) -> usize {
        self.nk
    }

    #[inline]
    fn cell_index(&self, i: usize, j: usize, k: usize) -> usize {
        (k * self.nj + j) * self.ni + i
    }

    /// Per-cell activity flag.
    pub fn is_active(&self, i: usize, j: usize, k: usize) -> bool {
        self.active[self.cell_index(i, j, k)]
    }

    /// Deactivate or reactivate a cell.
    pub fn set_active(&mut self, i: usize, j: usize, k: usize, value: bool) {
        let idx = self.cell_index(i, j, k);
        self.active[idx] = value;
    }

    /// A pillar is active when any cell sharing it is active in any layer.
    pub fn is_pillar_active(&self, i: usize, j: usize) -> bool {
        if i > self.ni || j > self.nj {
            return false;
        }
        let i_lo = i.saturating_sub(1);
        let j_lo = j.saturating_sub(1);
        for k in 0..self.nk {
            for jc in j_lo..=j.min(self.nj - 1) {
                for ic in i_lo..=i.min(self.ni - 1) {
                    if self.is_active(ic, jc, k) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// One of the eight cell corners; (a, b) select the pillar, c the face.
    pub fn find_corner_point(
        &self,
        i: usize,
        j: usize,
        k: usize,
        a: usize,
        b: usize,
        c: usize,
    ) -> DVec3 {
        let p = self.pillars[(j + b) * (self.ni + 1) + (i + a)];
        let z = self.zcorn[self.cell_index(i, j, k)][a + 2 * b + 4 * c];
        DVec3::new(p.x, p.y, z)
    }

    /// Geometric centre of a cell.
    pub fn find_cell_center_point(&self, i: usize, j: usize, k: usize) -> DVec3 {
        let mut sum = DVec3::ZERO;
        for c in 0..2 {
            for b in 0..2 {
                for a in 0..2 {
                    sum += self.find_corner_point(i, j, k, a, b, c);
                }
            }
        }
        sum / 8.0
    }

    /// Mean cell thickness.
    pub fn dz(&self, i: usize, j: usize, k: usize) -> f64 {
        let z = &self.zcorn[self.cell_index(i, j, k)];
        (z[4] + z[5] + z[6] + z[7] - z[0] - z[1] - z[2] - z[3]) / 4.0
    }

    /// First layer with any active cell.
    pub fn find_top_layer(&self) -> usize {
        for k in 0..self.nk {
            for j in 0..self.nj {
                for i in 0..self.ni {
                    if self.is_active(i, j, k) {
                        return k;
                    }
                }
            }
        }
        self.nk
    }

    /// Last layer with any active cell.
    pub fn find_bottom_layer(&self) -> usize {
        for k in (0..self.nk).rev() {
            for j in 0..self.nj {
                for i in 0..self.ni {
                    if self.is_active(i, j, k) {
                        return k;
                    }
                }
            }
        }
        0
    }

    /// Register a per-cell parameter; the slice is indexed like the cells.
    pub fn set_parameter(&mut self, name: &str, values: Vec<f64>) {
        assert_eq!(values.len(), self.ni * self.nj * self.nk);
        self.parameters.insert(name.to_string(), values);
    }

    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.contains_key(name)
    }

    /// Parameter values, cell-indexed.
    pub fn parameter(&self, name: &str) -> Option<&[f64]> {
        self.parameters.get(name).map(|v| v.as_slice())
    }

    /// Parameter value for one cell.
    pub fn parameter_value(&self, values: &[f64], i: usize, j: usize, k: usize) -> f64 {
        values[self.cell_index(i, j, k)]
    }

    /// Smallest axis-aligned rectangle containing all pillars; the enclosing
    /// volume used when no survey area is configured.
    pub fn find_enclosing_volume(&self) -> (f64, f64, f64, f64, f64) {
        let mut min = DVec2::splat(f64::INFINITY);
        let mut max = DVec2::splat(f64::NEG_INFINITY);
        for p in &self.pillars {
            min = min.min(*p);
            max = max.max(*p);
        }
        (min.x, min.y, max.x - min.x, max.y - min.y, 0.0)
    }

    /// Sample the depth of a layer face onto a regular raster.
    ///
    /// With `corner_point` the four pillar depths of each cell are
    /// interpolated through the cell's two triangles; otherwise each cell
    /// contributes its face-average depth as a constant. Raster nodes not
    /// covered by any cell footprint inherit the nearest covered value.
    pub fn layer_surface(
        &self,
        k: usize,
        face: Face,
        corner_point: bool,
        raster: &RasterSpec,
    ) -> Grid2 {
        let mut values = Grid2::new(raster.nx, raster.ny, f64::NAN);
        let (sin_a, cos_a) = raster.angle.sin_cos();
        let x_min_rot = raster.x0 * cos_a + raster.y0 * sin_a;
        let y_min_rot = raster.y0 * cos_a - raster.x0 * sin_a;
        let c = match face {
            Face::Top => 0,
            Face::Bottom => 1,
        };

        let node_xy = |ii: usize, jj: usize| {
            let xl = (ii as f64 + 0.5) * raster.dx;
            let yl = (jj as f64 + 0.5) * raster.dy;
            (
                raster.x0 + xl * cos_a - yl * sin_a,
                raster.y0 + xl * sin_a + yl * cos_a,
            )
        };

        for j in 0..self.nj {
            for i in 0..self.ni {
                let mut pts = [DVec3::ZERO; 4];
                for b in 0..2 {
                    for a in 0..2 {
                        pts[a + 2 * b] = self.find_corner_point(i, j, k, a, b, c);
                    }
                }
                if !corner_point {
                    let mean = (pts[0].z + pts[1].z + pts[2].z + pts[3].z) / 4.0;
                    for p in &mut pts {
                        p.z = mean;
                    }
                }
                let (tri1, tri2) = if is_124_triangulate(&pts) {
                    (
                        Triangle::new(pts[0], pts[1], pts[3]),
                        Triangle::new(pts[0], pts[2], pts[3]),
                    )
                } else {
                    (
                        Triangle::new(pts[0], pts[1], pts[2]),
                        Triangle::new(pts[1], pts[2], pts[3]),
                    )
                };

                let (bb_x0, bb_y0, bb_x1, bb_y1) = rotated_bbox(&pts, raster.angle);
                let start_ii = (((bb_x0 - x_min_rot) / raster.dx - 1.0).max(0.0)) as usize;
                let start_jj = (((bb_y0 - y_min_rot) / raster.dy - 1.0).max(0.0)) as usize;
                let end_ii = ((((bb_x1 - x_min_rot) / raster.dx) + 1.0).max(0.0) as usize)
                    .min(raster.nx);
                let end_jj = ((((bb_y1 - y_min_rot) / raster.dy) + 1.0).max(0.0) as usize)
                    .min(raster.ny);

                for jj in start_jj..end_jj {
                    for ii in start_ii..end_ii {
                        let (x, y) = node_xy(ii, jj);
                        if let Some(z) = tri1
                            .vertical_intersection(x, y)
                            .or_else(|| tri2.vertical_intersection(x, y))
                        {
                            values.set(ii, jj, z);
                        }
                    }
                }
            }
        }

        fill_uncovered(&mut values);
        values
    }
}

/// Flood uncovered raster nodes from their nearest covered neighbours.
fn fill_uncovered(values: &mut Grid2) {
    let ni = values.ni();
    let nj = values.nj();
    let max_sweeps = ni + nj;
    for _ in 0..max_sweeps {
        let mut changed = false;
        let snapshot = values.clone();
        for j in 0..nj {
            for i in 0..ni {
                if !snapshot.get(i, j).is_nan() {
                    continue;
                }
                let mut sum = 0.0;
                let mut n = 0usize;
                let mut push = |v: f64| {
                    if !v.is_nan() {
                        sum += v;
                        n += 1;
                    }
                };
                if i > 0 {
                    push(snapshot.get(i - 1, j));
                }
                if i + 1 < ni {
                    push(snapshot.get(i + 1, j));
                }
                if j > 0 {
                    push(snapshot.get(i, j - 1));
                }
                if j + 1 < nj {
                    push(snapshot.get(i, j + 1));
                }
                if n > 0 {
                    values.set(i, j, sum / n as f64);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_grid() -> CornerPointGrid {
        CornerPointGrid::from_layer_depths(4, 3, 2, 0.0, 0.0, 100.0, 100.0, |_x, _y, h| {
            1000.0 + h as f64 * 50.0
        })
    }

    #[test]
    fn corner_points_follow_pillars() {
        let g = flat_grid();
        let p = g.find_corner_point(1, 2, 0, 1, 0, 1);
        assert_eq!(p.x, 200.0);
        assert_eq!(p.y, 200.0);
        assert_eq!(p.z, 1050.0);
    }

    #[test]
    fn center_is_cell_mean() {
        let g = flat_grid();
        let c = g.find_cell_center_point(0, 0, 0);
        assert!((c.x - 50.0).abs() < 1e-12);
        assert!((c.y - 50.0).abs() < 1e-12);
        assert!((c.z - 1025.0).abs() < 1e-12);
    }

    #[test]
    fn layer_bounds_skip_inactive_layers() {
        let mut g = flat_grid();
        for j in 0..3 {
            for i in 0..4 {
                g.set_active(i, j, 0, false);
            }
        }
        assert_eq!(g.find_top_layer(), 1);
        assert_eq!(g.find_bottom_layer(), 1);
    }

    #[test]
    fn pillar_activity_tracks_cells() {
        let mut g = flat_grid();
        assert!(g.is_pillar_active(0, 0));
        for k in 0..2 {
            for j in 0..3 {
                for i in 0..4 {
                    g.set_active(i, j, k, false);
                }
            }
        }
        assert!(!g.is_pillar_active(2, 2));
    }

    #[test]
    fn layer_surface_recovers_tilted_plane() {
        let g = CornerPointGrid::from_layer_depths(6, 6, 1, 0.0, 0.0, 50.0, 50.0, |x, _y, h| {
            1000.0 + 0.1 * x + h as f64 * 20.0
        });
        let raster = RasterSpec {
            x0: 0.0,
            y0: 0.0,
            dx: 25.0,
            dy: 25.0,
            angle: 0.0,
            nx: 12,
            ny: 12,
        };
        let surf = g.layer_surface(0, Face::Top, true, &raster);
        // An interior node well inside the footprint.
        let z = surf.get(6, 6);
        let x = (6.0 + 0.5) * 25.0;
        assert!((z - (1000.0 + 0.1 * x)).abs() < 1e-6, "z = {z}");
    }

    #[test]
    fn enclosing_volume_spans_pillars() {
        let g = flat_grid();
        let (x0, y0, lx, ly, angle) = g.find_enclosing_volume();
        assert_eq!((x0, y0), (0.0, 0.0));
        assert_eq!((lx, ly), (400.0, 300.0));
        assert_eq!(angle, 0.0);
    }
}
