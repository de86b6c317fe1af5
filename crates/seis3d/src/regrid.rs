//! Corner-point to regular-grid resampling.
//!
//! Phase one of a run. Reflector depths come from layer surfaces with a
//! monotonicity repair; elastic values are dropped onto the regular grid by
//! intersecting vertical rays with triangulated cell tops. The interior is
//! processed in parallel XY blocks whose proposed writes are applied in
//! block order, so results do not depend on the thread schedule; domain
//! edges and corners get synthetic quads with a polygon containment test.

use glam::DVec3;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::constants::MISSING;
use crate::eclipse::{CornerPointGrid, Face, RasterSpec};
use crate::error::Result;
use crate::geometry::{is_124_triangulate, rotated_bbox, Polygon, Triangle};
use crate::grid::Grid3;
use crate::session::Session;

/// Which Vrms leg to materialise in PS mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VrmsLeg {
    /// P down, P up (also the only leg in PP mode).
    Pp,
    /// S legs from the SS travel times.
    Ss,
}

/// Run the full regridding phase.
pub fn run(session: &mut Session) -> Result<()> {
    let n_threads = session
        .settings
        .max_threads
        .min(std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
        .max(1);
    info!(n_threads, "regridding");

    build_thread_pool(n_threads, || {
        find_z_values(session);
        debug!("reflector depths resampled");
        find_elastic_parameters(session);
        post_process_elastic(session);
        debug!("elastic parameters resampled");
    });

    session.release_eclipse();

    build_thread_pool(n_threads, || find_twt(session));
    debug!("travel times built");

    // One wavelet length of time padding, then the time axis is final.
    let twt_pad = session.wavelet.twt_length();
    session.top_time.add(-twt_pad);
    session.bottom_time.add(twt_pad);
    let t_min = session.top_time.min();
    let t_max = session.bottom_time.max();
    session.geometry.set_time_axis(t_min, t_max);

    if session.settings.nmo && session.settings.output.vrms && !session.settings.ps_seismic {
        fill_vrms_grid(session, VrmsLeg::Pp);
    }
    Ok(())
}

/// Run `f` inside a rayon pool of the requested width.
fn build_thread_pool<F: FnOnce() + Send>(n_threads: usize, f: F) {
    match rayon::ThreadPoolBuilder::new().num_threads(n_threads).build() {
        Ok(pool) => pool.install(f),
        // Pool construction only fails under resource exhaustion; the work
        // itself is still valid on the current thread.
        Err(_) => f(),
    }
}

/// Reflector depth surfaces per layer, deepest first, then a downward clamp
/// of negative thickness.
fn find_z_values(session: &mut Session) {
    let eclipse = session.eclipse.as_ref().expect("eclipse present during regridding");
    let z = &session.z_grid;
    let raster = RasterSpec {
        x0: z.x0,
        y0: z.y0,
        dx: z.dx,
        dy: z.dy,
        angle: z.angle,
        nx: z.nx,
        ny: z.ny,
    };
    let top_k = session.top_k;
    let corner = session.settings.cornerpoint_interpolation;
    let nk = z.nk;

    // Deepest reflector is the bottom face of the last reservoir layer.
    let bottom = eclipse.layer_surface(top_k + nk - 2, Face::Bottom, corner, &raster);

    // Remaining reflectors are layer tops; each k is independent.
    let tops: Vec<_> = (0..nk - 1)
        .into_par_iter()
        .map(|k| eclipse.layer_surface(top_k + k, Face::Top, corner, &raster))
        .collect();

    let (nx, ny) = (z.nx, z.ny);
    let z = &mut session.z_grid;
    for j in 0..ny {
        for i in 0..nx {
            z.set(i, j, nk - 1, bottom.get(i, j));
        }
    }
    for (k, top) in tops.iter().enumerate() {
        for j in 0..ny {
            for i in 0..nx {
                z.set(i, j, k, top.get(i, j));
            }
        }
    }

    if session.settings.remove_negative_delta_z {
        remove_negative_thickness(z);
    }
}

/// Clamp each reflector to lie above the one below it, working upward from
/// the deepest so the clamp cascades.
fn remove_negative_thickness(z: &mut Grid3) {
    let slab = z.nx * z.ny;
    let nk = z.nk;
    let data = z.data_mut();
    for k in (0..nk - 1).rev() {
        let (head, tail) = data.split_at_mut((k + 1) * slab);
        let upper = &mut head[k * slab..];
        let lower = &tail[..slab];
        upper
            .par_iter_mut()
            .zip(lower.par_iter())
            .for_each(|(u, &l)| {
                if *u > l {
                    *u = l;
                }
            });
    }
}

/// Copy of a source parameter with inactive cells resolved.
struct SourceParam {
    ni: usize,
    nj: usize,
    data: Vec<f64>,
}

impl SourceParam {
    #[inline]
    fn get(&self, i: usize, j: usize, k: usize) -> f64 {
        self.data[(k * self.nj + j) * self.ni + i]
    }

    #[inline]
    fn set(&mut self, i: usize, j: usize, k: usize, v: f64) {
        self.data[(k * self.nj + j) * self.ni + i] = v;
    }
}

/// Pre-materialise the inactive-cell fallback so the parallel ray-drop only
/// ever reads: a collapsed inactive cell inherits the value above, a thick
/// one falls back to the reservoir default, and anything still under the
/// overburden keeps the overburden value.
fn fill_in_grid_values(
    eclipse: &CornerPointGrid,
    src: &mut SourceParam,
    default_value: f64,
    zlimit: f64,
    default_top: f64,
    top_k: usize,
    bot_k: usize,
) {
    for k in top_k..=bot_k {
        for j in 0..src.nj {
            for i in 0..src.ni {
                if eclipse.is_active(i, j, k) {
                    continue;
                }
                if k > top_k {
                    let above = src.get(i, j, k - 1);
                    if eclipse.dz(i, j, k) < zlimit {
                        src.set(i, j, k, above);
                    } else if above == default_top {
                        src.set(i, j, k, default_top);
                    } else {
                        src.set(i, j, k, default_value);
                    }
                } else {
                    src.set(i, j, k, default_top);
                }
            }
        }
    }
}

/// One proposed write to the output grids.
struct ElasticAssign {
    ii: usize,
    jj: usize,
    k_out: usize,
    vp: f64,
    vs: f64,
    rho: f64,
    extra: Vec<f64>,
}

/// Triangulated ray-drop of vp/vs/rho (and extras) onto the regular grid.
fn find_elastic_parameters(session: &mut Session) {
    let eclipse = session.eclipse.as_ref().expect("eclipse present during regridding");
    let settings = &session.settings;
    let top_k = session.top_k;
    let bot_k = session.bottom_k;
    let zlimit = settings.zero_thickness_limit;
    let const_vp = settings.const_vp;
    let const_vs = settings.const_vs;
    let const_rho = settings.const_rho;

    let regrid_extras =
        settings.output.extra_params_time_segy || settings.output.extra_params_depth_segy;
    let extra_names: Vec<&str> = if regrid_extras {
        settings.extra_parameter_names.iter().map(|s| s.as_str()).collect()
    } else {
        Vec::new()
    };
    let extra_defaults = &settings.extra_parameter_defaults;

    let mut vp_src = source_param(eclipse, &settings.parameter_names[0]);
    let mut vs_src = source_param(eclipse, &settings.parameter_names[1]);
    let mut rho_src = source_param(eclipse, &settings.parameter_names[2]);
    let mut extra_src: Vec<SourceParam> = extra_names
        .iter()
        .map(|name| source_param(eclipse, name))
        .collect();

    fill_in_grid_values(eclipse, &mut vp_src, const_vp[1], zlimit, const_vp[0], top_k, bot_k);
    fill_in_grid_values(eclipse, &mut vs_src, const_vs[1], zlimit, const_vs[0], top_k, bot_k);
    fill_in_grid_values(eclipse, &mut rho_src, const_rho[1], zlimit, const_rho[0], top_k, bot_k);
    for (src, &default) in extra_src.iter_mut().zip(extra_defaults.iter()) {
        fill_in_grid_values(eclipse, src, default, zlimit, default, top_k, bot_k);
    }

    let frame = Grid3::like(&session.vp_grid, 0, 0.0);

    // Interior: XY block decomposition of the source grid. Each block
    // collects its writes; blocks are applied in index order afterwards, so
    // overlap at quad boundaries resolves deterministically.
    let nx_src = eclipse.ni() as i64 - 1;
    let ny_src = eclipse.nj() as i64 - 1;
    let threaded = rayon::current_num_threads() > 1;
    let (n_blocks_x, n_blocks_y) = if threaded { (10, 10) } else { (1, 1) };
    let nxb = ((nx_src as f64 / n_blocks_x as f64) + 0.5).floor().max(1.0) as i64;
    let nyb = ((ny_src as f64 / n_blocks_y as f64) + 0.5).floor().max(1.0) as i64;

    let blocks: Vec<Vec<ElasticAssign>> = (0..n_blocks_x * n_blocks_y)
        .into_par_iter()
        .map(|block| {
            let block_x = block % n_blocks_x;
            let block_y = block / n_blocks_x;
            let i_min = (block_x * nxb).max(0);
            let i_max = if block_x == n_blocks_x - 1 {
                nx_src
            } else {
                ((block_x + 1) * nxb).min(nx_src)
            };
            let j_min = (block_y * nyb).max(0);
            let j_max = if block_y == n_blocks_y - 1 {
                ny_src
            } else {
                ((block_y + 1) * nyb).min(ny_src)
            };

            let mut out = Vec::new();
            for k in top_k..=bot_k + 1 {
                for i in i_min..i_max {
                    for j in j_min..j_max {
                        interior_cell(
                            eclipse,
                            &frame,
                            &vp_src,
                            &vs_src,
                            &rho_src,
                            &extra_src,
                            const_vp[2],
                            const_vs[2],
                            const_rho[2],
                            i as usize,
                            j as usize,
                            k,
                            top_k,
                            bot_k,
                            &mut out,
                        );
                    }
                }
            }
            out
        })
        .collect();

    for block in blocks {
        for a in block {
            apply_assign(session, &a);
        }
    }

    // Edges and corners cover the margin the interior quads never reach.
    let eclipse = session.eclipse.take().expect("eclipse present during regridding");
    let ni = eclipse.ni();
    let nj = eclipse.nj();
    for k in top_k..=bot_k + 1 {
        for i in 0..ni - 1 {
            if let Some(j) = find_bot_cell(&eclipse, nj, i) {
                edge_cell(session, &eclipse, &vp_src, &vs_src, &rho_src, &extra_src, i, j, k, EdgeSide::Bottom);
            }
            if let Some(j) = find_top_cell(&eclipse, i, nj - 1) {
                edge_cell(session, &eclipse, &vp_src, &vs_src, &rho_src, &extra_src, i, j, k, EdgeSide::Top);
            }
        }
        for j in 0..nj - 1 {
            if let Some(i) = find_left_cell(&eclipse, ni, j) {
                edge_cell(session, &eclipse, &vp_src, &vs_src, &rho_src, &extra_src, i, j, k, EdgeSide::Left);
            }
            if let Some(i) = find_right_cell(&eclipse, ni - 1, j) {
                edge_cell(session, &eclipse, &vp_src, &vs_src, &rho_src, &extra_src, i, j, k, EdgeSide::Right);
            }
        }
        for (ci, cj) in [(0, 0), (0, nj - 1), (ni - 1, nj - 1), (ni - 1, 0)] {
            corner_cell(session, &eclipse, &vp_src, &vs_src, &rho_src, &extra_src, ci, cj, k, bot_k);
        }
    }
    session.eclipse = Some(eclipse);
}

fn source_param(eclipse: &CornerPointGrid, name: &str) -> SourceParam {
    let values = eclipse
        .parameter(name)
        .expect("parameter presence checked at session construction");
    SourceParam {
        ni: eclipse.ni(),
        nj: eclipse.nj(),
        data: values.to_vec(),
    }
}

fn apply_assign(session: &mut Session, a: &ElasticAssign) {
    session.vp_grid.set(a.ii, a.jj, a.k_out, a.vp);
    session.vs_grid.set(a.ii, a.jj, a.k_out, a.vs);
    session.rho_grid.set(a.ii, a.jj, a.k_out, a.rho);
    for (grid, &v) in session.extra_grids.iter_mut().zip(a.extra.iter()) {
        grid.set(a.ii, a.jj, a.k_out, v);
    }
}

/// Value bundle at one quad vertex.
#[derive(Clone)]
struct VertexValues {
    vp: f64,
    vs: f64,
    rho: f64,
    extra: Vec<f64>,
}

/// Ray-drop one interior source cell onto the regular grid.
#[allow(clippy::too_many_arguments)]
fn interior_cell(
    eclipse: &CornerPointGrid,
    frame: &Grid3,
    vp_src: &SourceParam,
    vs_src: &SourceParam,
    rho_src: &SourceParam,
    extra_src: &[SourceParam],
    vp_under: f64,
    vs_under: f64,
    rho_under: f64,
    i: usize,
    j: usize,
    k: usize,
    top_k: usize,
    bot_k: usize,
    out: &mut Vec<ElasticAssign>,
) {
    // All nine pillars around the 2x2 cell neighbourhood must be active.
    for dj in 0..3 {
        for di in 0..3 {
            if !eclipse.is_pillar_active(i + di, j + dj) {
                return;
            }
        }
    }

    let k_src = if k <= bot_k { k } else { k - 1 };
    let mut pts = [DVec3::ZERO; 4];
    for (pt, p) in pts.iter_mut().enumerate() {
        *p = eclipse.find_cell_center_point(i + pt % 2, j + pt / 2, k_src);
    }
    if !pts.iter().any(|p| frame.is_inside(p.x, p.y)) {
        return;
    }

    let values: Vec<VertexValues> = (0..4)
        .map(|pt| {
            let (ci, cj) = (i + pt % 2, j + pt / 2);
            if k == bot_k + 1 {
                VertexValues {
                    vp: vp_under,
                    vs: vs_under,
                    rho: rho_under,
                    extra: vec![0.0; extra_src.len()],
                }
            } else {
                VertexValues {
                    vp: vp_src.get(ci, cj, k),
                    vs: vs_src.get(ci, cj, k),
                    rho: rho_src.get(ci, cj, k),
                    extra: extra_src.iter().map(|s| s.get(ci, cj, k)).collect(),
                }
            }
        })
        .collect();

    rasterize_quad(frame, &pts, &values, k - top_k + 1, 0.5, 1.0, None, out);
}

/// Bundle the quad into per-property triangles and emit assignments for
/// every regular cell whose centre the quad covers.
#[allow(clippy::too_many_arguments)]
fn rasterize_quad(
    frame: &Grid3,
    pts: &[DVec3; 4],
    values: &[VertexValues],
    k_out: usize,
    margin_lo: f64,
    margin_hi: f64,
    clip: Option<&Polygon>,
    out: &mut Vec<ElasticAssign>,
) {
    let tri_124 = is_124_triangulate(pts);
    let with_z = |corner: usize, z: f64| DVec3::new(pts[corner].x, pts[corner].y, z);
    let (c1, c2): ([usize; 3], [usize; 3]) = if tri_124 {
        ([0, 1, 3], [0, 2, 3])
    } else {
        ([0, 1, 2], [1, 2, 3])
    };
    let tri_of = |idx: [usize; 3], f: &dyn Fn(usize) -> f64| {
        Triangle::new(
            with_z(idx[0], f(idx[0])),
            with_z(idx[1], f(idx[1])),
            with_z(idx[2], f(idx[2])),
        )
    };
    let vp1 = tri_of(c1, &|p| values[p].vp);
    let vp2 = tri_of(c2, &|p| values[p].vp);
    let vs1 = tri_of(c1, &|p| values[p].vs);
    let vs2 = tri_of(c2, &|p| values[p].vs);
    let rho1 = tri_of(c1, &|p| values[p].rho);
    let rho2 = tri_of(c2, &|p| values[p].rho);

    let (x_min_rot, y_min_rot) = frame.origin_rot();
    let (bb_x0, bb_y0, bb_x1, bb_y1) = rotated_bbox(pts, frame.angle);
    let start_ii = (((bb_x0 - x_min_rot) / frame.dx - margin_lo).max(0.0)) as usize;
    let start_jj = (((bb_y0 - y_min_rot) / frame.dy - margin_lo).max(0.0)) as usize;
    let end_ii = ((((bb_x1 - x_min_rot) / frame.dx) + margin_hi).max(0.0) as usize).min(frame.nx);
    let end_jj = ((((bb_y1 - y_min_rot) / frame.dy) + margin_hi).max(0.0) as usize).min(frame.ny);

    for ii in start_ii..end_ii {
        for jj in start_jj..end_jj {
            let (x, y) = frame.center_of_cell(ii, jj);
            if let Some(poly) = clip {
                if !poly.contains_xy(x, y) {
                    continue;
                }
            }
            let hit = vp1
                .vertical_intersection(x, y)
                .map(|z| (z, vs1, rho1, false))
                .or_else(|| vp2.vertical_intersection(x, y).map(|z| (z, vs2, rho2, true)));
            let Some((vp, vs_tri, rho_tri, second)) = hit else {
                continue;
            };
            let vs = vs_tri.plane_z_at(x, y).unwrap_or(values[0].vs);
            let rho = rho_tri.plane_z_at(x, y).unwrap_or(values[0].rho);
            let c = if second { c2 } else { c1 };
            let extra = (0..values[0].extra.len())
                .map(|e| {
                    tri_of(c, &|p| values[p].extra[e])
                        .plane_z_at(x, y)
                        .unwrap_or(values[0].extra[e])
                })
                .collect();
            out.push(ElasticAssign {
                ii,
                jj,
                k_out,
                vp,
                vs,
                rho,
                extra,
            });
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EdgeSide {
    Bottom,
    Top,
    Left,
    Right,
}

/// Corner-point selectors for the outer edge of a boundary cell; rows are
/// the four (a, b, c) lookups forming the two pillar midpoints.
fn corner_point_dir(side: EdgeSide) -> ([usize; 4], [usize; 4], [usize; 4]) {
    let (top, bot, left, right) = (
        side == EdgeSide::Top,
        side == EdgeSide::Bottom,
        side == EdgeSide::Left,
        side == EdgeSide::Right,
    );
    let mut a = [0; 4];
    let mut b = [0; 4];
    if !(top || bot || left) {
        a[0] = 1;
        a[1] = 1;
    }
    if !(bot || left || right) {
        b[0] = 1;
        b[1] = 1;
    }
    if top || bot || right {
        a[2] = 1;
        a[3] = 1;
    }
    if top || left || right {
        b[2] = 1;
        b[3] = 1;
    }
    (a, b, [0, 1, 0, 1])
}

/// Scan inward from a domain edge to the first cell whose pillars are all
/// active.
fn find_bot_cell(eclipse: &CornerPointGrid, nj: usize, i: usize) -> Option<usize> {
    (0..nj).find(|&j| edge_pillars_active(eclipse, i, j, true))
}

fn find_top_cell(eclipse: &CornerPointGrid, i: usize, j_start: usize) -> Option<usize> {
    (0..=j_start).rev().find(|&j| edge_pillars_active(eclipse, i, j, true))
}

fn find_left_cell(eclipse: &CornerPointGrid, ni: usize, j: usize) -> Option<usize> {
    (0..ni).find(|&i| edge_pillars_active(eclipse, i, j, false))
}

fn find_right_cell(eclipse: &CornerPointGrid, i_start: usize, j: usize) -> Option<usize> {
    (0..=i_start).rev().find(|&i| edge_pillars_active(eclipse, i, j, false))
}

fn edge_pillars_active(eclipse: &CornerPointGrid, i: usize, j: usize, along_x: bool) -> bool {
    let probes: [(usize, usize); 6] = if along_x {
        [(i, j), (i + 1, j), (i, j + 1), (i + 1, j + 1), (i + 2, j), (i + 2, j + 1)]
    } else {
        [(i, j), (i, j + 1), (i + 1, j), (i + 1, j + 1), (i, j + 2), (i + 1, j + 2)]
    };
    probes.iter().all(|&(pi, pj)| eclipse.is_pillar_active(pi, pj))
}

/// Synthetic quad extending a boundary cell pair outward across the domain
/// edge; covered margin cells need a polygon test, not just the bbox.
#[allow(clippy::too_many_arguments)]
fn edge_cell(
    session: &mut Session,
    eclipse: &CornerPointGrid,
    vp_src: &SourceParam,
    vs_src: &SourceParam,
    rho_src: &SourceParam,
    extra_src: &[SourceParam],
    i: usize,
    j: usize,
    k: usize,
    side: EdgeSide,
) {
    let top_k = session.top_k;
    let bot_k = session.bottom_k;
    let settings = &session.settings;
    let (a, b, c) = corner_point_dir(side);
    let (ic, jc) = match side {
        EdgeSide::Bottom | EdgeSide::Top => (i + 1, j),
        EdgeSide::Left | EdgeSide::Right => (i, j + 1),
    };

    let k_src = if k <= bot_k { k } else { k - 1 };
    let pillar_mid = |ci: usize, cj: usize, n: usize| {
        0.5 * (eclipse.find_corner_point(ci, cj, k_src, a[n], b[n], c[n])
            + eclipse.find_corner_point(ci, cj, k_src, a[n + 1], b[n + 1], c[n + 1]))
    };
    let mid1_a = pillar_mid(i, j, 0);
    let mid1_b = pillar_mid(i, j, 2);
    let mid2_a = pillar_mid(ic, jc, 0);
    let mid2_b = pillar_mid(ic, jc, 2);

    let mut pts = [DVec3::ZERO; 4];
    pts[0] = eclipse.find_cell_center_point(i, j, k_src);
    pts[1] = eclipse.find_cell_center_point(ic, jc, k_src);
    pts[2] = mid1_a + mid1_b - pts[0];
    pts[3] = mid2_a + mid2_b - pts[1];
    let mid_edge1 = 0.5 * (mid1_a + mid1_b);
    let mid_edge2 = 0.5 * (mid2_a + mid2_b);

    let frame = Grid3::like(&session.vp_grid, 0, 0.0);
    if !pts.iter().any(|p| frame.is_inside(p.x, p.y)) {
        return;
    }

    let base_values = |ci: usize, cj: usize| {
        if k == bot_k + 1 {
            VertexValues {
                vp: settings.const_vp[2],
                vs: settings.const_vs[2],
                rho: settings.const_rho[2],
                extra: vec![0.0; extra_src.len()],
            }
        } else {
            VertexValues {
                vp: vp_src.get(ci, cj, k),
                vs: vs_src.get(ci, cj, k),
                rho: rho_src.get(ci, cj, k),
                extra: extra_src.iter().map(|s| s.get(ci, cj, k)).collect(),
            }
        }
    };
    let v0 = base_values(i, j);
    let v1 = base_values(ic, jc);
    let values = vec![v0.clone(), v1.clone(), v0, v1];

    let mut poly = Polygon::new();
    poly.add_point(pts[0]);
    poly.add_point(pts[1]);
    poly.add_point(mid_edge2);
    poly.add_point(0.5 * (eclipse.find_corner_point(i, j, k_src, a[2], b[2], c[2])
        + eclipse.find_corner_point(i, j, k_src, a[3], b[3], c[3])));
    poly.add_point(mid_edge1);

    let mut out = Vec::new();
    rasterize_quad(&frame, &pts, &values, k - top_k + 1, 2.0, 2.0, Some(&poly), &mut out);
    for assign in out {
        apply_assign(session, &assign);
    }
}

/// Margin quad at one of the four domain corners; every covered cell takes
/// the corner cell's value.
#[allow(clippy::too_many_arguments)]
fn corner_cell(
    session: &mut Session,
    eclipse: &CornerPointGrid,
    vp_src: &SourceParam,
    vs_src: &SourceParam,
    rho_src: &SourceParam,
    extra_src: &[SourceParam],
    i: usize,
    j: usize,
    k: usize,
    bot_k: usize,
) {
    let top_k = session.top_k;
    let settings = &session.settings;
    let k_src = if k > bot_k { k - 1 } else { k };

    let edge_mid = |a: usize, b: usize| {
        0.5 * (eclipse.find_corner_point(i, j, k_src, a, b, 0)
            + eclipse.find_corner_point(i, j, k_src, a, b, 1))
    };
    let center = eclipse.find_cell_center_point(i, j, k_src);

    // The corner pillar, the two half-edge midpoints beside it, and the cell
    // centre span the margin quad.
    let mut pts = [DVec3::ZERO; 4];
    if i == 0 && j == 0 {
        pts[0] = edge_mid(0, 0);
        pts[1] = 0.5 * (edge_mid(1, 0) + pts[0]);
        pts[3] = center;
        pts[2] = 0.5 * (edge_mid(0, 1) + pts[0]);
    } else if i == 0 {
        pts[2] = edge_mid(0, 1);
        pts[0] = 0.5 * (edge_mid(0, 0) + pts[2]);
        pts[1] = center;
        pts[3] = 0.5 * (edge_mid(1, 1) + pts[2]);
    } else if j == 0 {
        pts[1] = edge_mid(1, 0);
        pts[0] = 0.5 * (edge_mid(0, 0) + pts[1]);
        pts[2] = center;
        pts[3] = 0.5 * (edge_mid(1, 1) + pts[1]);
    } else {
        pts[3] = edge_mid(1, 1);
        pts[1] = 0.5 * (edge_mid(1, 0) + pts[3]);
        pts[0] = center;
        pts[2] = 0.5 * (edge_mid(0, 1) + pts[3]);
    }

    let frame = Grid3::like(&session.vp_grid, 0, 0.0);
    if !pts.iter().any(|p| frame.is_inside(p.x, p.y)) {
        return;
    }

    let (vp, vs, rho, extra) = if k == bot_k + 1 {
        (
            settings.const_vp[2],
            settings.const_vs[2],
            settings.const_rho[2],
            vec![0.0; extra_src.len()],
        )
    } else {
        (
            vp_src.get(i, j, k),
            vs_src.get(i, j, k),
            rho_src.get(i, j, k),
            extra_src.iter().map(|s| s.get(i, j, k)).collect(),
        )
    };

    let mut poly = Polygon::new();
    poly.add_point(pts[0]);
    poly.add_point(pts[1]);
    poly.add_point(pts[3]);
    poly.add_point(pts[2]);

    let (x_min_rot, y_min_rot) = frame.origin_rot();
    let (bb_x0, bb_y0, bb_x1, bb_y1) = rotated_bbox(&pts, frame.angle);
    let start_ii = (((bb_x0 - x_min_rot) / frame.dx - 2.0).max(0.0)) as usize;
    let start_jj = (((bb_y0 - y_min_rot) / frame.dy - 2.0).max(0.0)) as usize;
    let end_ii = ((((bb_x1 - x_min_rot) / frame.dx) + 2.0).max(0.0) as usize).min(frame.nx);
    let end_jj = ((((bb_y1 - y_min_rot) / frame.dy) + 2.0).max(0.0) as usize).min(frame.ny);

    let k_out = k - top_k + 1;
    for ii in start_ii..end_ii {
        for jj in start_jj..end_jj {
            let (x, y) = frame.center_of_cell(ii, jj);
            if poly.contains_xy(x, y) {
                let assign = ElasticAssign {
                    ii,
                    jj,
                    k_out,
                    vp,
                    vs,
                    rho,
                    extra: extra.clone(),
                };
                apply_assign(session, &assign);
            }
        }
    }
}

/// Resolve cells the ray-drop never assigned: below the deepest assignment
/// the column continues as underburden (or extends its last value); holes
/// above it take the reservoir default; a column with no assignment at all
/// (outside any source-cell footprint) stays at the overburden defaults.
fn post_process_elastic(session: &mut Session) {
    let default_underburden = session.settings.default_underburden;
    let const_vp = session.settings.const_vp;
    let const_vs = session.settings.const_vs;
    let const_rho = session.settings.const_rho;
    let (nx, ny, nk) = session.vp_grid.dims();

    for j in 0..ny {
        for i in 0..nx {
            // Scan the reservoir rows bottom-up; the underburden row (nk-1)
            // is constant-initialised and the overburden row (0) never moves.
            let mut found_bot = false;
            for k in (1..nk - 1).rev() {
                let assigned = session.vp_grid.get(i, j, k) != MISSING;
                if found_bot && !assigned {
                    session.vp_grid.set(i, j, k, const_vp[1]);
                    session.vs_grid.set(i, j, k, const_vs[1]);
                    session.rho_grid.set(i, j, k, const_rho[1]);
                } else if !found_bot && assigned {
                    found_bot = true;
                    for kk in k + 1..nk {
                        if default_underburden {
                            session.vp_grid.set(i, j, kk, const_vp[2]);
                            session.vs_grid.set(i, j, kk, const_vs[2]);
                            session.rho_grid.set(i, j, kk, const_rho[2]);
                        } else {
                            let vp = session.vp_grid.get(i, j, k);
                            let vs = session.vs_grid.get(i, j, k);
                            let rho = session.rho_grid.get(i, j, k);
                            session.vp_grid.set(i, j, kk, vp);
                            session.vs_grid.set(i, j, kk, vs);
                            session.rho_grid.set(i, j, kk, rho);
                        }
                    }
                }
            }
            if !found_bot {
                for k in 1..nk - 1 {
                    session.vp_grid.set(i, j, k, const_vp[0]);
                    session.vs_grid.set(i, j, k, const_vs[0]);
                    session.rho_grid.set(i, j, k, const_rho[0]);
                }
            }
        }
    }
}

/// TWT per reflector from the depth and velocity grids, then the serial
/// bottom-time splat (the splat scatters across columns and must not run
/// inside the parallel pass).
fn find_twt(session: &mut Session) {
    let ps = session.settings.ps_seismic;
    let nmo = session.settings.nmo;
    let v_w = session.settings.v_water;
    let z_w = session.settings.z_water;
    let (nx, ny, nk) = session.twt_grid.dims();

    struct ColumnResult {
        twt: Vec<f64>,
        twt_pp: Vec<f64>,
        twt_ss: Vec<f64>,
    }

    let vp = &session.vp_grid;
    let vs = &session.vs_grid;
    let z = &session.z_grid;
    let top_time = &session.top_time;
    let ps_nmo = ps && nmo;

    let columns: Vec<ColumnResult> = (0..nx * ny)
        .into_par_iter()
        .map(|ij| {
            let i = ij % nx;
            let j = ij / nx;
            let (x, y) = vp.center_of_cell(i, j);
            let top = top_time.get_z(x, y);

            let mut col = ColumnResult {
                twt: vec![MISSING; nk],
                twt_pp: if ps_nmo { vec![MISSING; nk] } else { Vec::new() },
                twt_ss: if ps_nmo { vec![MISSING; nk] } else { Vec::new() },
            };
            if top_time.is_missing(top) {
                return col;
            }

            col.twt[0] = top;
            if ps_nmo {
                // Initialise the legs so twt_pp + twt_ss = 2 twt with the
                // configured vp/vs split ratio a = 2.
                let a = 2.0;
                col.twt_pp[0] = 2.0 / (a + 1.0) * (top + 1000.0 * (a - 1.0) * z_w / v_w);
                col.twt_ss[0] = 2.0 * top - col.twt_pp[0];
            }
            for k in 1..nk {
                let dz = z.get(i, j, k) - z.get(i, j, k - 1);
                let vp_k = vp.get(i, j, k + 1);
                let vs_k = vs.get(i, j, k + 1);
                col.twt[k] = if ps {
                    col.twt[k - 1] + 1000.0 * dz / vp_k + 1000.0 * dz / vs_k
                } else {
                    col.twt[k - 1] + 2000.0 * dz / vp_k
                };
                if ps_nmo {
                    col.twt_pp[k] = col.twt_pp[k - 1] + 2000.0 * dz / vp_k;
                    col.twt_ss[k] = col.twt_ss[k - 1] + 2000.0 * dz / vs_k;
                }
            }
            col
        })
        .collect();

    for (ij, col) in columns.iter().enumerate() {
        let i = ij % nx;
        let j = ij / nx;
        for k in 0..nk {
            session.twt_grid.set(i, j, k, col.twt[k]);
        }
        if ps_nmo {
            let pp = session.twt_pp_grid.as_mut().expect("allocated for PS + NMO");
            let ss = session.twt_ss_grid.as_mut().expect("allocated for PS + NMO");
            for k in 0..nk {
                pp.set(i, j, k, col.twt_pp[k]);
                ss.set(i, j, k, col.twt_ss[k]);
            }
        }
    }

    // Splat each column's bottom TWT into the bottom-time surface cells its
    // footprint covers.
    let dx1 = session.twt_grid.dx;
    let dy1 = session.twt_grid.dy;
    let dx2 = session.bottom_time.dx;
    let dy2 = session.bottom_time.dy;
    for j in 0..ny {
        for i in 0..nx {
            let bottom = session.twt_grid.get(i, j, nk - 1);
            if bottom == MISSING {
                continue;
            }
            let (x, y) = session.twt_grid.center_of_cell(i, j);
            let mut sx = x - dx1;
            while sx < x + dx1 {
                let mut sy = y - dy1;
                while sy < y + dy1 {
                    let (ii, jj) = session.bottom_time.find_index(sx, sy);
                    session.bottom_time.set(ii, jj, bottom);
                    sy += dy2;
                }
                sx += dx2;
            }
        }
    }
}

/// Materialise the Vrms cube for the requested leg.
pub fn fill_vrms_grid(session: &mut Session, leg: VrmsLeg) {
    let (nx, ny, nk) = session.twt_grid.dims();
    let mut vrms_out = match session.vrms_grid.take() {
        Some(grid) => grid,
        None => return,
    };
    for j in 0..ny {
        for i in 0..nx {
            let twt_vec: Vec<f64> = match leg {
                VrmsLeg::Pp => {
                    if session.settings.ps_seismic {
                        let pp = session.twt_pp_grid.as_ref().expect("PS Vrms needs PP legs");
                        (0..nk).map(|k| pp.get(i, j, k)).collect()
                    } else {
                        (0..nk).map(|k| session.twt_grid.get(i, j, k)).collect()
                    }
                }
                VrmsLeg::Ss => {
                    let ss = session.twt_ss_grid.as_ref().expect("PS Vrms needs SS legs");
                    (0..nk).map(|k| ss.get(i, j, k)).collect()
                }
            };
            let v_grid = match leg {
                VrmsLeg::Pp => &session.vp_grid,
                VrmsLeg::Ss => &session.vs_grid,
            };
            let vrms = session.find_vrms(&twt_vec, v_grid, i, j);
            for (k, v) in vrms.iter().enumerate() {
                vrms_out.set(i, j, k, *v);
            }
        }
    }
    session.vrms_grid = Some(vrms_out);
}
