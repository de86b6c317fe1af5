//! Per-trace synthesis.
//!
//! One call per (inline, crossline) position: reflection coefficients,
//! optional white noise, moveout curves, wavelet convolution, NMO stretch
//! correction, stacking, depth conversion and timeshift resampling. The
//! function only reads shared grids and returns an owned `TraceResult`, so
//! the scheduler can run any number of these concurrently.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::constants::{OFFSET_SCALE_SQ, ONE_WAY_MS, TWO_WAY_MS};
use crate::grid::Grid2;
use crate::interpolation::{interpolate_linear, interpolate_spline};
use crate::session::{find_sin_theta_ps, moveout, Session, TimeAxes};

/// One unit of work for the producer pool.
#[derive(Clone, Copy, Debug)]
pub struct TraceTask {
    pub il: i32,
    pub xl: i32,
    pub i: usize,
    pub j: usize,
    pub x: f64,
    pub y: f64,
}

/// Everything a trace produces; grids are empty unless the matching output
/// was requested.
#[derive(Clone, Debug, Default)]
pub struct TraceResult {
    pub il: i32,
    pub xl: i32,
    pub i: usize,
    pub j: usize,
    pub x: f64,
    pub y: f64,
    /// Time gather; in NMO mode this is the pre-NMO gather.
    pub prestack: Grid2,
    /// NMO-corrected gather (NMO mode only).
    pub nmo_prestack: Grid2,
    /// Stacked trace.
    pub stack: Grid2,
    /// Depth-converted gather.
    pub depth: Grid2,
    /// Depth-converted stack.
    pub depth_stack: Grid2,
    /// Timeshift-resampled gather.
    pub timeshift: Grid2,
    /// Timeshift-resampled stack.
    pub timeshift_stack: Grid2,
    /// Zero-offset reflection coefficients per layer.
    pub r0: Vec<f64>,
    /// Noisy zero-offset reflections (white-noise runs).
    pub r0_noisy: Vec<f64>,
    /// Tallest populated sample across offsets after NMO correction.
    pub max_sample: usize,
    /// True when the column was skipped and every sample is zero.
    pub empty: bool,
}

impl TraceResult {
    /// All-zero result at a skipped position, dimensioned like a real one.
    pub fn zero(session: &Session, axes: &TimeAxes, task: &TraceTask) -> Self {
        let mut result = TraceResult {
            il: task.il,
            xl: task.xl,
            i: task.i,
            j: task.j,
            x: task.x,
            y: task.y,
            empty: true,
            ..Default::default()
        };
        allocate(&mut result, session, axes);
        result.max_sample = result.stack.ni().max(result.prestack.ni());
        result
    }
}

/// Size every requested grid on a result.
fn allocate(result: &mut TraceResult, session: &Session, axes: &TimeAxes) {
    let output = &session.settings.output;
    let ncols = if session.settings.nmo {
        session.offset_vec.len()
    } else {
        session.theta_vec.len()
    };
    let nt = axes.twt_0.len();

    result.prestack = Grid2::new(nt, ncols, 0.0);
    if session.settings.nmo {
        result.nmo_prestack = Grid2::new(axes.time_samples_stretch, ncols, 0.0);
    }
    if output.any_stack() {
        let ni = if session.settings.nmo {
            axes.time_samples_stretch
        } else {
            nt
        };
        result.stack = Grid2::new(ni, 1, 0.0);
    }
    if output.any_depth() {
        result.depth = Grid2::new(axes.z_0.len(), ncols, 0.0);
        result.depth_stack = Grid2::new(axes.z_0.len(), 1, 0.0);
    }
    if output.any_timeshift() {
        result.timeshift = Grid2::new(axes.twts_0.len(), ncols, 0.0);
        result.timeshift_stack = Grid2::new(axes.twts_0.len(), 1, 0.0);
    }
    if output.reflections {
        result.r0 = vec![0.0; session.nzrefl()];
        if session.settings.white_noise {
            result.r0_noisy = vec![0.0; session.nzrefl()];
        }
    }
}

/// Generate the trace at `task`, NMO or plain depending on the settings.
pub fn generate(session: &Session, axes: &TimeAxes, task: &TraceTask) -> TraceResult {
    if !session.generate_trace_ok(task.i, task.j) {
        return TraceResult::zero(session, axes, task);
    }
    let mut result = TraceResult {
        il: task.il,
        xl: task.xl,
        i: task.i,
        j: task.j,
        x: task.x,
        y: task.y,
        ..Default::default()
    };
    allocate(&mut result, session, axes);

    if session.settings.nmo {
        generate_nmo(session, axes, task, &mut result);
    } else {
        generate_plain(session, axes, task, &mut result);
    }
    if result.empty {
        // A diverged per-trace solve; everything stays zero.
        return result;
    }

    let output = &session.settings.output;
    if output.any_stack() {
        stack_columns(
            if session.settings.nmo {
                &result.nmo_prestack
            } else {
                &result.prestack
            },
            &mut result.stack,
        );
    }
    if output.any_depth() {
        depth_convert(session, axes, task, &mut result);
    }
    if output.any_timeshift() {
        timeshift_convert(session, axes, task, &mut result);
    }
    result
}

/// Angle-gather path: reflections, noise, direct convolution on layer TWT.
fn generate_plain(session: &Session, axes: &TimeAxes, task: &TraceTask, result: &mut TraceResult) {
    let nzrefl = session.nzrefl();
    let theta_vec = &session.theta_vec;
    let (i, j) = (task.i, task.j);

    let twt_vec: Vec<f64> = (0..nzrefl).map(|k| session.twt_grid.get(i, j, k)).collect();

    let mut refl = Grid2::new(nzrefl, theta_vec.len(), 0.0);
    session.find_reflections(&mut refl, theta_vec, i, j);
    snapshot_and_noise(session, &mut refl, i, j, result);

    // Reflectors sit at their own TWT; every sample within the wavelet
    // half-window of one accumulates its contribution.
    let twtx = layer_matrix(&twt_vec, theta_vec.len());
    let n_min = vec![0usize; theta_vec.len()];
    let n_max = vec![axes.twt_0.len(); theta_vec.len()];
    convolve(session, axes, task, &refl, &twtx, &n_min, &n_max, &mut result.prestack);
    result.max_sample = axes.twt_0.len();
}

/// Offset-gather path: moveout curves, convolution along them, then the
/// stretch correction back onto the regular axis.
fn generate_nmo(session: &Session, axes: &TimeAxes, task: &TraceTask, result: &mut TraceResult) {
    let nzrefl = session.nzrefl();
    let offsets = &session.offset_vec;
    let (i, j) = (task.i, task.j);
    let twt_0 = &axes.twt_0;

    let twt_vec: Vec<f64> = (0..nzrefl).map(|k| session.twt_grid.get(i, j, k)).collect();

    let mut theta = Grid2::new(nzrefl, offsets.len(), 0.0);
    let mut twtx = Grid2::new(nzrefl, offsets.len(), 0.0);
    let mut twtx_reg = Grid2::new(twt_0.len(), offsets.len(), 0.0);

    if session.settings.ps_seismic {
        let pp = session.twt_pp_grid.as_ref().expect("PS + NMO carries PP legs");
        let ss = session.twt_ss_grid.as_ref().expect("PS + NMO carries SS legs");
        let twt_pp: Vec<f64> = (0..nzrefl).map(|k| pp.get(i, j, k)).collect();
        let twt_ss: Vec<f64> = (0..nzrefl).map(|k| ss.get(i, j, k)).collect();
        let vrms_pp = session.find_vrms(&twt_pp, &session.vp_grid, i, j);
        let vrms_ss = session.find_vrms(&twt_ss, &session.vs_grid, i, j);

        let mut off_down = Grid2::new(nzrefl, offsets.len(), 0.0);
        let mut off_up = Grid2::new(nzrefl, offsets.len(), 0.0);
        let failures = session.find_ps_nmo_theta_and_offset(
            &mut theta, &mut off_down, &mut off_up, &twt_pp, &twt_ss, &vrms_pp, &vrms_ss, offsets,
        );
        if failures > 0 {
            // Divergence in a per-trace solve zeroes the trace and the run
            // continues.
            result.empty = true;
            return;
        }
        for off in 0..offsets.len() {
            for k in 0..nzrefl {
                twtx.set(
                    k,
                    off,
                    two_leg_moveout(
                        twt_pp[k],
                        twt_ss[k],
                        off_down.get(k, off),
                        off_up.get(k, off),
                        vrms_pp[k],
                        vrms_ss[k],
                    ),
                );
            }
        }

        // Regular moveout: leg travel times and velocities resampled onto
        // the output axis, one Snell solve per (sample, offset).
        let twt_pp_reg = interpolate_linear(&twt_vec, &twt_pp, twt_0);
        let twt_ss_reg = interpolate_linear(&twt_vec, &twt_ss, twt_0);
        let vrms_pp_reg = session.resample_vrms(&twt_pp, &vrms_pp, twt_0, session.settings.const_vp[2]);
        let vrms_ss_reg = session.resample_vrms(&twt_ss, &vrms_ss, twt_0, session.settings.const_vs[2]);
        for (off_idx, &offset) in offsets.iter().enumerate() {
            let mut start = (offset / (vrms_pp_reg[0] * twt_pp_reg[0].max(1e-9) / ONE_WAY_MS))
                .atan()
                .min(0.99);
            for n in 0..twt_0.len() {
                let d_down = vrms_pp_reg[n] * twt_pp_reg[n] / TWO_WAY_MS;
                let d_up = vrms_ss_reg[n] * twt_ss_reg[n] / TWO_WAY_MS;
                let v_ratio = vrms_ss_reg[n] / vrms_pp_reg[n];
                match find_sin_theta_ps(start, offset, d_up, d_down, v_ratio) {
                    Some((y, _)) => {
                        let od = y.asin().tan() * d_down;
                        let ou = (v_ratio * y).asin().tan() * d_up;
                        twtx_reg.set(
                            n,
                            off_idx,
                            two_leg_moveout(
                                twt_pp_reg[n],
                                twt_ss_reg[n],
                                od,
                                ou,
                                vrms_pp_reg[n],
                                vrms_ss_reg[n],
                            ),
                        );
                        start = y;
                    }
                    None => {
                        result.empty = true;
                        return;
                    }
                }
            }
        }

        let mut refl = Grid2::new(nzrefl, offsets.len(), 0.0);
        session.find_nmo_reflections(&mut refl, &theta, i, j);
        snapshot_and_noise(session, &mut refl, i, j, result);

        let (n_min, n_max) = limits_from_twtx(twt_0, &twtx, session.wavelet.twt_length());
        convolve(session, axes, task, &refl, &twtx, &n_min, &n_max, &mut result.prestack);
        result.max_sample = nmo_correct(
            twt_0,
            &result.prestack,
            &twtx_reg,
            &mut result.nmo_prestack,
            &n_min,
            &n_max,
        );
    } else {
        let vrms_vec = session.find_vrms(&twt_vec, &session.vp_grid, i, j);
        let vrms_reg =
            session.resample_vrms(&twt_vec, &vrms_vec, twt_0, session.settings.const_vp[2]);

        for (off_idx, &offset) in offsets.iter().enumerate() {
            for k in 0..nzrefl {
                let denom = vrms_vec[k] * twt_vec[k] / ONE_WAY_MS;
                theta.set(k, off_idx, (offset / denom).atan());
                twtx.set(k, off_idx, moveout(twt_vec[k], offset, vrms_vec[k]));
            }
            for n in 0..twt_0.len() {
                twtx_reg.set(n, off_idx, moveout(twt_0[n], offset, vrms_reg[n]));
            }
        }

        let mut refl = Grid2::new(nzrefl, offsets.len(), 0.0);
        session.find_nmo_reflections(&mut refl, &theta, i, j);
        snapshot_and_noise(session, &mut refl, i, j, result);

        let (n_min, n_max) = limits_from_twtx(twt_0, &twtx, session.wavelet.twt_length());
        convolve(session, axes, task, &refl, &twtx, &n_min, &n_max, &mut result.prestack);
        result.max_sample = nmo_correct(
            twt_0,
            &result.prestack,
            &twtx_reg,
            &mut result.nmo_prestack,
            &n_min,
            &n_max,
        );
    }
}

/// Two-leg converted-wave moveout: each leg is a one-way hyperbola.
fn two_leg_moveout(twt_pp: f64, twt_ss: f64, off_down: f64, off_up: f64, vrms_pp: f64, vrms_ss: f64) -> f64 {
    let down = (twt_pp * twt_pp / 4.0 + OFFSET_SCALE_SQ * off_down * off_down / (vrms_pp * vrms_pp))
        .sqrt();
    let up = (twt_ss * twt_ss / 4.0 + OFFSET_SCALE_SQ * off_up * off_up / (vrms_ss * vrms_ss)).sqrt();
    down + up
}

/// Layer TWT replicated per gather column (the no-moveout "curve").
fn layer_matrix(twt_vec: &[f64], ncols: usize) -> Grid2 {
    let mut m = Grid2::new(twt_vec.len(), ncols, 0.0);
    for c in 0..ncols {
        for (k, &t) in twt_vec.iter().enumerate() {
            m.set(k, c, t);
        }
    }
    m
}

/// Store the zero-offset reflection snapshot and apply seeded white noise.
fn snapshot_and_noise(
    session: &Session,
    refl: &mut Grid2,
    i: usize,
    j: usize,
    result: &mut TraceResult,
) {
    if session.settings.output.reflections {
        for k in 0..refl.ni() {
            result.r0[k] = refl.get(k, 0);
        }
    }
    if session.settings.white_noise {
        let nx = session.geometry.nx();
        let seed = session.settings.seed + (i + nx * j) as u64;
        add_noise_to_reflections(seed, session.settings.noise_std_dev, refl);
        if session.settings.output.reflections {
            for k in 0..refl.ni() {
                result.r0_noisy[k] = refl.get(k, 0);
            }
        }
    }
}

/// Seeded Gaussian perturbation of a reflection matrix. The seed is a pure
/// function of (run seed, i, j), so the result is independent of the thread
/// schedule.
pub fn add_noise_to_reflections(seed: u64, std_dev: f64, refl: &mut Grid2) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let normal = Normal::new(0.0, std_dev).unwrap_or_else(|_| {
        // A zero deviation is a valid degenerate configuration.
        Normal::new(0.0, f64::MIN_POSITIVE).expect("positive deviation")
    });
    for j in 0..refl.nj() {
        for i in 0..refl.ni() {
            let v = refl.get(i, j) + normal.sample(&mut rng);
            refl.set(i, j, v);
        }
    }
}

/// First and one-past-last sample each offset's moveout curve can touch,
/// within the wavelet half-window.
fn limits_from_twtx(twt_0: &[f64], twtx: &Grid2, half_window: f64) -> (Vec<usize>, Vec<usize>) {
    let nk = twtx.ni();
    let noff = twtx.nj();
    let mut n_min = vec![0; noff];
    let mut n_max = vec![0; noff];
    for off in 0..noff {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for k in 0..nk {
            lo = lo.min(twtx.get(k, off));
            hi = hi.max(twtx.get(k, off));
        }
        n_min[off] = twt_0.partition_point(|&t| t < lo - half_window);
        n_max[off] = twt_0.partition_point(|&t| t <= hi + half_window);
    }
    (n_min, n_max)
}

/// Wavelet convolution of the reflection series along the moveout curves.
#[allow(clippy::too_many_arguments)]
fn convolve(
    session: &Session,
    axes: &TimeAxes,
    task: &TraceTask,
    refl: &Grid2,
    twtx: &Grid2,
    n_min: &[usize],
    n_max: &[usize],
    out: &mut Grid2,
) {
    let (cx, cy) = session.z_grid.center_of_cell(task.i, task.j);
    let top = session.top_time.get_z(cx, cy);
    if session.top_time.is_missing(top) {
        out.fill(0.0);
        return;
    }
    let wavelet = &session.wavelet;
    let scale = session.wavelet_scale;
    let cutoff = wavelet.twt_length();
    let nk = refl.ni();

    for off in 0..refl.nj() {
        let lo = n_min[off];
        let hi = n_max[off].min(out.ni());
        for n in 0..out.ni() {
            if n < lo || n >= hi {
                out.set(n, off, 0.0);
                continue;
            }
            let t = axes.twt_0[n];
            let mut seis = 0.0;
            for k in 0..nk {
                let dt = twtx.get(k, off) - t;
                if dt.abs() < cutoff {
                    seis += refl.get(k, off) * scale * wavelet.find_wavelet_point(dt);
                }
            }
            out.set(n, off, seis);
        }
    }
}

/// Resample each offset column from its moveout trajectory onto the regular
/// axis (the NMO stretch correction). Returns the tallest populated sample.
fn nmo_correct(
    t_in: &[f64],
    data_in: &Grid2,
    t_out: &Grid2,
    data_out: &mut Grid2,
    n_min: &[usize],
    n_max: &[usize],
) -> usize {
    let nt_in = data_in.ni();
    let noff = data_in.nj();
    let mut max_sample = 0usize;

    for off in 0..noff {
        let lo = n_min[off];
        let hi = n_max[off].min(nt_in);
        if lo >= hi {
            for k in 0..data_out.ni() {
                data_out.set(k, off, 0.0);
            }
            continue;
        }
        let support_t = &t_in[lo..hi];
        let support_d: Vec<f64> = (lo..hi).map(|k| data_in.get(k, off)).collect();

        // Only evaluate output samples whose trajectory time is inside the
        // support; the trajectory is not monotone in general, so walk until
        // it leaves the support from inside.
        let mut eval_t = Vec::with_capacity(nt_in);
        let mut inside = false;
        for k in 0..nt_in {
            let t = t_out.get(k, off);
            if !inside && t > support_t[0] && t < support_t[support_t.len() - 1] {
                inside = true;
            }
            eval_t.push(t);
            if inside && t > support_t[support_t.len() - 1] {
                break;
            }
        }
        let index = eval_t.len().min(data_out.ni());
        let resampled = interpolate_spline(support_t, &support_d, &eval_t[..index], 0.0);
        for (k, &v) in resampled.iter().enumerate() {
            data_out.set(k, off, v);
        }
        for k in index..data_out.ni() {
            data_out.set(k, off, 0.0);
        }
        max_sample = max_sample.max(index);
    }
    max_sample
}

/// Mean across the gather columns.
fn stack_columns(prestack: &Grid2, stack: &mut Grid2) {
    let inv = 1.0 / prestack.nj() as f64;
    for k in 0..stack.ni() {
        let mut acc = 0.0;
        for off in 0..prestack.nj() {
            acc += prestack.get(k, off);
        }
        stack.set(k, 0, acc * inv);
    }
}

/// (twt, z) support with (0, 0) prepended and a synthetic bottom row
/// extending to the padded reservoir bottom.
fn extrapolate_z_twt(
    session: &Session,
    task: &TraceTask,
    twt_vec: &[f64],
) -> (Vec<f64>, Vec<f64>) {
    let nzrefl = twt_vec.len();
    let (cx, cy) = session.z_grid.center_of_cell(task.i, task.j);
    let z_bot = session.bottom_eclipse.get_z(cx, cy);
    let vel_bot = if session.settings.ps_seismic {
        0.5 * (session.settings.const_vp[2] + session.settings.const_vs[2])
    } else {
        session.settings.const_vp[2]
    };

    let mut twt_ext = Vec::with_capacity(nzrefl + 2);
    let mut z_ext = Vec::with_capacity(nzrefl + 2);
    twt_ext.push(0.0);
    z_ext.push(0.0);
    for k in 0..nzrefl {
        twt_ext.push(twt_vec[k]);
        z_ext.push(session.z_grid.get(task.i, task.j, k));
    }
    let z_last = z_ext[nzrefl];
    z_ext.push(z_bot);
    twt_ext.push(twt_ext[nzrefl] + TWO_WAY_MS * (z_bot - z_last) / vel_bot);
    (twt_ext, z_ext)
}

/// Resample `data` (regular on `t_axis`) onto `out_axis` through the value
/// support (`support_t`, `support_v`): linear map of the axis, spline of the
/// samples.
#[allow(clippy::too_many_arguments)]
fn convert_seis(
    support_t: &[f64],
    support_v: &[f64],
    t_axis: &[f64],
    out_axis: &[f64],
    data: &Grid2,
    out: &mut Grid2,
    max_sample: usize,
) {
    let max_sample = max_sample.min(data.ni()).min(t_axis.len());
    let vt_reg = interpolate_linear(support_t, support_v, &t_axis[..max_sample]);

    for off in 0..data.nj() {
        let column: Vec<f64> = (0..max_sample).map(|k| data.get(k, off)).collect();
        let resampled = interpolate_spline(&vt_reg, &column, out_axis, 0.0);
        for (k, &v) in resampled.iter().enumerate() {
            out.set(k, off, v);
        }
    }
}

/// Depth conversion of the gather and the stack.
fn depth_convert(session: &Session, axes: &TimeAxes, task: &TraceTask, result: &mut TraceResult) {
    let nzrefl = session.nzrefl();
    let twt_vec: Vec<f64> = (0..nzrefl)
        .map(|k| session.twt_grid.get(task.i, task.j, k))
        .collect();
    let (twt_ext, z_ext) = extrapolate_z_twt(session, task, &twt_vec);

    let source = if session.settings.nmo {
        &result.nmo_prestack
    } else {
        &result.prestack
    };
    let max_sample = result.max_sample;
    if session.settings.output.depth_segy {
        convert_seis(&twt_ext, &z_ext, &axes.twt_0, &axes.z_0, source, &mut result.depth, max_sample);
    }
    if session.settings.output.depth_stack_segy || session.settings.output.depth_storm {
        convert_seis(
            &twt_ext,
            &z_ext,
            &axes.twt_0,
            &axes.z_0,
            &result.stack,
            &mut result.depth_stack,
            max_sample,
        );
    }
}

/// Timeshift resampling of the gather and the stack.
fn timeshift_convert(session: &Session, axes: &TimeAxes, task: &TraceTask, result: &mut TraceResult) {
    let Some(shift) = session.twt_timeshift.as_ref() else {
        return;
    };
    let nzrefl = session.nzrefl();
    let mut twt_ext = Vec::with_capacity(nzrefl + 1);
    let mut shift_ext = Vec::with_capacity(nzrefl + 1);
    twt_ext.push(0.0);
    shift_ext.push(0.0);
    for k in 0..nzrefl {
        twt_ext.push(session.twt_grid.get(task.i, task.j, k));
        shift_ext.push(shift.get(task.i, task.j, k));
    }

    let source = if session.settings.nmo {
        &result.nmo_prestack
    } else {
        &result.prestack
    };
    let max_sample = result.max_sample;
    if session.settings.output.timeshift_segy {
        convert_seis(
            &twt_ext,
            &shift_ext,
            &axes.twt_0,
            &axes.twts_0,
            source,
            &mut result.timeshift,
            max_sample,
        );
    }
    if session.settings.output.timeshift_stack_segy || session.settings.output.timeshift_storm {
        convert_seis(
            &twt_ext,
            &shift_ext,
            &axes.twt_0,
            &axes.twts_0,
            &result.stack,
            &mut result.timeshift_stack,
            max_sample,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_is_deterministic_per_seed() {
        let mut a = Grid2::new(8, 3, 0.1);
        let mut b = Grid2::new(8, 3, 0.1);
        add_noise_to_reflections(42, 0.01, &mut a);
        add_noise_to_reflections(42, 0.01, &mut b);
        for j in 0..3 {
            for i in 0..8 {
                assert_eq!(a.get(i, j), b.get(i, j));
            }
        }
        let mut c = Grid2::new(8, 3, 0.1);
        add_noise_to_reflections(43, 0.01, &mut c);
        assert!((0..8).any(|i| c.get(i, 0) != a.get(i, 0)));
    }

    #[test]
    fn limits_bracket_the_curve() {
        let twt_0: Vec<f64> = (0..100).map(|i| (0.5 + i as f64) * 4.0).collect();
        let mut twtx = Grid2::new(2, 1, 0.0);
        twtx.set(0, 0, 100.0);
        twtx.set(1, 0, 200.0);
        let (n_min, n_max) = limits_from_twtx(&twt_0, &twtx, 50.0);
        // Window is (50, 250): samples 50..250 ms.
        assert_eq!(n_min[0], twt_0.partition_point(|&t| t < 50.0));
        assert_eq!(n_max[0], twt_0.partition_point(|&t| t <= 250.0));
    }

    #[test]
    fn stack_is_column_mean() {
        let mut gather = Grid2::new(4, 2, 0.0);
        for k in 0..4 {
            gather.set(k, 0, k as f64);
            gather.set(k, 1, 2.0 * k as f64);
        }
        let mut stack = Grid2::new(4, 1, 0.0);
        stack_columns(&gather, &mut stack);
        for k in 0..4 {
            assert!((stack.get(k, 0) - 1.5 * k as f64).abs() < 1e-12);
        }
    }
}
