//! End-to-end trace synthesis scenarios on a 2x2x3 corner-point grid.

use std::path::PathBuf;

use seis3d::constants::MISSING;
use seis3d::eclipse::CornerPointGrid;
use seis3d::forward::{self, NullReporter};
use seis3d::session::Session;
use seis3d::settings::ModelSettings;
use seis3d::surface::RegularSurface;
use seis3d::trace::{self, TraceTask};
use seis3d::{regrid, Grid3};

/// Three flat layers with distinct elastic triples.
fn two_by_two_grid() -> CornerPointGrid {
    let mut grid = CornerPointGrid::from_layer_depths(2, 2, 3, 0.0, 0.0, 100.0, 100.0, |_, _, h| {
        1000.0 + 50.0 * h as f64
    });
    let n = 2 * 2 * 3;
    let layer_of = |idx: usize| idx / 4;
    grid.set_parameter(
        "VP",
        (0..n).map(|c| [2000.0, 2500.0, 3000.0][layer_of(c)]).collect(),
    );
    grid.set_parameter(
        "VS",
        (0..n).map(|c| [800.0, 1000.0, 1200.0][layer_of(c)]).collect(),
    );
    grid.set_parameter(
        "RHO",
        (0..n).map(|c| [2.1, 2.3, 2.5][layer_of(c)]).collect(),
    );
    grid
}

fn base_settings() -> ModelSettings {
    ModelSettings {
        dx: 50.0,
        dy: 50.0,
        dz: 4.0,
        dt: 4.0,
        peak_frequency: 30.0,
        top_time_constant: 1000.0,
        ..Default::default()
    }
}

fn build(settings: ModelSettings, top_time: Option<RegularSurface>, shift: Option<Grid3>) -> Session {
    let mut session =
        Session::new(settings, two_by_two_grid(), top_time, shift).expect("session builds");
    regrid::run(&mut session).expect("regridding succeeds");
    session
}

fn task_at(session: &Session, i: usize, j: usize) -> TraceTask {
    let (x, y) = session.z_grid.center_of_cell(i, j);
    TraceTask {
        il: i as i32,
        xl: j as i32,
        i,
        j,
        x,
        y,
    }
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("seis3d_{}_{name}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

#[test]
fn zero_offset_reflection_matches_weak_contrast() {
    let mut settings = base_settings();
    settings.output.time_segy = true;
    settings.output.reflections = true;
    let session = build(settings, None, None);
    let axes = session.generate_axes().expect("axes");

    let result = trace::generate(&session, &axes, &task_at(&session, 2, 2));
    assert!(!result.empty);

    // Middle reflector: vp 2500 -> 3000, rho 2.3 -> 2.5.
    let expected = 0.5 * (500.0 / 2750.0 + 0.2 / 2.4);
    assert!(
        (result.r0[2] - expected).abs() < 1e-6,
        "r0[2] = {}, expected {expected}",
        result.r0[2]
    );
}

#[test]
fn nmo_zero_offset_column_equals_plain_pipeline() {
    let mut plain_settings = base_settings();
    plain_settings.output.time_segy = true;
    let plain = build(plain_settings, None, None);
    let plain_axes = plain.generate_axes().expect("axes");
    let plain_result = trace::generate(&plain, &plain_axes, &task_at(&plain, 2, 2));

    let mut nmo_settings = base_settings();
    nmo_settings.nmo = true;
    nmo_settings.offset_0 = 0.0;
    nmo_settings.d_offset = 500.0;
    nmo_settings.offset_max = 1000.0;
    nmo_settings.output.time_segy = true;
    let nmo = build(nmo_settings, None, None);
    let nmo_axes = nmo.generate_axes().expect("axes");
    let nmo_result = trace::generate(&nmo, &nmo_axes, &task_at(&nmo, 2, 2));

    // The two time axes share the sample phase; align them by whole samples.
    let dt = plain.geometry.dt;
    let shift = ((plain_axes.twt_0[0] - nmo_axes.twt_0[0]) / dt).round() as usize;
    let overlap = plain_axes
        .twt_0
        .len()
        .min(nmo_result.nmo_prestack.ni().saturating_sub(shift));
    assert!(overlap > 10, "axes do not overlap enough: {overlap}");

    for n in 0..overlap {
        let plain_v = plain_result.prestack.get(n, 0);
        let nmo_v = nmo_result.nmo_prestack.get(n + shift, 0);
        assert!(
            (plain_v - nmo_v).abs() < 1e-9,
            "sample {n}: plain {plain_v} vs nmo {nmo_v}"
        );
    }
}

#[test]
fn stack_is_mean_of_corrected_gather() {
    let mut settings = base_settings();
    settings.nmo = true;
    settings.offset_0 = 0.0;
    settings.d_offset = 500.0;
    settings.offset_max = 1000.0;
    settings.output.time_segy = true;
    settings.output.time_stack_segy = true;
    let session = build(settings, None, None);
    let axes = session.generate_axes().expect("axes");
    let result = trace::generate(&session, &axes, &task_at(&session, 2, 2));

    let noff = session.offset_vec.len() as f64;
    for n in 0..result.stack.ni() {
        let mean: f64 = (0..session.offset_vec.len())
            .map(|off| result.nmo_prestack.get(n, off))
            .sum::<f64>()
            / noff;
        assert!(
            (result.stack.get(n, 0) - mean).abs() < 1e-12,
            "stack sample {n}"
        );
    }
}

#[test]
fn zero_wavelet_scale_silences_everything() {
    let mut settings = base_settings();
    settings.wavelet_scale = 0.0;
    settings.output.time_segy = true;
    settings.output.time_stack_segy = true;
    let session = build(settings, None, None);
    let axes = session.generate_axes().expect("axes");
    let result = trace::generate(&session, &axes, &task_at(&session, 2, 2));
    for off in 0..result.prestack.nj() {
        for n in 0..result.prestack.ni() {
            assert_eq!(result.prestack.get(n, off), 0.0);
        }
    }
}

#[test]
fn missing_top_time_zeroes_only_that_trace() {
    // Fine input raster with one missing node at the (0, 0) column centre.
    let mut input = RegularSurface::new(-60.0, -60.0, 10.0, 10.0, 0.0, 32, 32, 1000.0);
    let (mi, mj) = input.find_index(25.0, 25.0);
    input.set(mi, mj, MISSING);

    let mut settings = base_settings();
    settings.output.time_segy = true;
    let session = build(settings, Some(input), None);
    let axes = session.generate_axes().expect("axes");

    let dead = trace::generate(&session, &axes, &task_at(&session, 0, 0));
    assert!(dead.empty);
    for off in 0..dead.prestack.nj() {
        for n in 0..dead.prestack.ni() {
            assert_eq!(dead.prestack.get(n, off), 0.0);
        }
    }

    let alive = trace::generate(&session, &axes, &task_at(&session, 0, 1));
    assert!(!alive.empty);
    let energy: f64 = (0..alive.prestack.ni())
        .map(|n| alive.prestack.get(n, 0).abs())
        .sum();
    assert!(energy > 0.0, "adjacent trace lost its signal");
}

#[test]
fn uniform_timeshift_advances_traces_exactly() {
    // First pass without a shift fixes the TWT grid; the cube is that grid
    // plus 20 ms everywhere.
    let mut settings = base_settings();
    settings.output.time_stack_segy = true;
    let reference = build(settings.clone(), None, None);
    let mut shift = Grid3::like(&reference.twt_grid, reference.twt_grid.nk, 0.0);
    let (nx, ny, nk) = reference.twt_grid.dims();
    for k in 0..nk {
        for j in 0..ny {
            for i in 0..nx {
                shift.set(i, j, k, reference.twt_grid.get(i, j, k) + 20.0);
            }
        }
    }

    settings.output.timeshift_stack_segy = true;
    let session = build(settings, None, Some(shift));
    let axes = session.generate_axes().expect("axes");
    assert_eq!(axes.twts_0.len(), axes.twt_0.len() + 5, "20 ms at dt=4 pads 5 samples");
    assert!((axes.twts_0[0] - axes.twt_0[0]).abs() < 1e-12);

    let (i, j) = (2, 2);
    let result = trace::generate(&session, &axes, &task_at(&session, i, j));
    let twt_top = session.twt_grid.get(i, j, 0);
    let twt_bot = session.twt_grid.get(i, j, nk - 1);
    let mut checked = 0usize;
    for (m, &t) in axes.twt_0.iter().enumerate() {
        if t <= twt_top + 1.0 || t >= twt_bot - 1.0 {
            continue;
        }
        let original = result.stack.get(m, 0);
        let shifted = result.timeshift_stack.get(m + 5, 0);
        assert!(
            (original - shifted).abs() < 1e-9,
            "sample {m}: {original} vs {shifted}"
        );
        checked += 1;
    }
    assert!(checked > 5, "too few samples inside the reflector span");
}

#[test]
fn white_noise_is_identical_across_thread_counts() {
    let run = |threads: usize, tag: &str| -> Vec<u8> {
        let mut settings = base_settings();
        settings.white_noise = true;
        settings.noise_std_dev = 0.01;
        settings.seed = 42;
        settings.max_threads = threads;
        settings.output.time_segy = true;
        settings.output.time_storm = true;
        settings.output.time_stack_segy = true;
        settings.output.reflections = true;
        let mut session = build(settings, None, None);
        let dir = temp_dir(&format!("noise_{tag}"));
        forward::run(&mut session, &dir, &mut NullReporter).expect("forward run");
        let bytes = std::fs::read(dir.join("reflections_noise.storm")).expect("noise cube exists");
        let _ = std::fs::remove_dir_all(&dir);
        bytes
    };

    let serial = run(1, "serial");
    let threaded = run(4, "threaded");
    assert_eq!(serial, threaded, "noise depends on the thread schedule");
}

#[test]
fn segy_traces_come_out_in_ilxl_order() {
    let mut settings = base_settings();
    settings.max_threads = 4;
    settings.output.time_stack_segy = true;
    let mut session = build(settings, None, None);
    let dir = temp_dir("order");
    forward::run(&mut session, &dir, &mut NullReporter).expect("forward run");

    let bytes = std::fs::read(dir.join("seismic_time_stack.segy")).expect("stack file exists");
    let ns = u16::from_be_bytes([bytes[3220], bytes[3221]]) as usize;
    let trace_len = 240 + 4 * ns;
    let n_traces = (bytes.len() - 3600) / trace_len;
    assert_eq!(n_traces, 16);

    let mut last = None;
    for t in 0..n_traces {
        let base = 3600 + t * trace_len;
        let il = i32::from_be_bytes(bytes[base + 188..base + 192].try_into().unwrap());
        let xl = i32::from_be_bytes(bytes[base + 192..base + 196].try_into().unwrap());
        if let Some(prev) = last {
            assert!((il, xl) > prev, "trace {t} out of order: {:?} after {prev:?}", (il, xl));
        }
        last = Some((il, xl));
    }
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn depth_time_depth_roundtrip_through_twt_pairs() {
    let mut settings = base_settings();
    settings.output.depth_segy = true;
    settings.output.time_segy = true;
    let session = build(settings, None, None);
    let (i, j) = (2, 2);
    let nzrefl = session.nzrefl();

    // The (twt, z) support the depth conversion is built on: (0, 0) plus the
    // reflector pairs.
    let mut twt_support = vec![0.0];
    let mut z_support = vec![0.0];
    for k in 0..nzrefl {
        twt_support.push(session.twt_grid.get(i, j, k));
        z_support.push(session.z_grid.get(i, j, k));
    }

    // Depth -> time -> depth over the reflector span.
    let z_query: Vec<f64> = (0..20)
        .map(|n| z_support[1] + (z_support[nzrefl] - z_support[1]) * n as f64 / 19.0)
        .collect();
    let t_of_z = seis3d::interpolation::interpolate_linear(&z_support, &twt_support, &z_query);
    let z_back = seis3d::interpolation::interpolate_linear(&twt_support, &z_support, &t_of_z);
    for (orig, back) in z_query.iter().zip(z_back.iter()) {
        assert!((orig - back).abs() < 1e-9, "{orig} came back as {back}");
    }
}

#[test]
fn plain_time_axis_is_cell_centred() {
    let mut settings = base_settings();
    settings.output.time_segy = true;
    let session = build(settings, None, None);
    let axes = session.generate_axes().expect("axes");
    let g = &session.geometry;
    for (i, &t) in axes.twt_0.iter().enumerate() {
        assert!((t - (g.t_min + (0.5 + i as f64) * g.dt)).abs() < 1e-12);
    }
    for (i, &z) in axes.z_0.iter().enumerate() {
        assert!((z - (g.z_min + (0.5 + i as f64) * g.dz)).abs() < 1e-12);
    }
}

#[test]
fn nmo_axis_extends_for_long_offsets() {
    let mut settings = base_settings();
    settings.nmo = true;
    settings.offset_0 = 0.0;
    settings.d_offset = 1000.0;
    settings.offset_max = 3000.0;
    settings.output.time_segy = true;
    let session = build(settings, None, None);
    let axes = session.generate_axes().expect("axes");

    // The stretched axis starts no later and ends no earlier than the plain
    // one, and the usable sample count covers at least the plain trace.
    let g = &session.geometry;
    assert!(axes.twt_0[0] <= g.t_min + 0.5 * g.dt + 1e-9);
    assert!(axes.twt_0[axes.twt_0.len() - 1] >= g.t_max - g.dt);
    assert!(axes.time_samples_stretch >= g.nt().min(axes.twt_0.len()));
}
