//! Regridding invariants on small synthetic corner-point grids.

use seis3d::constants::MISSING;
use seis3d::eclipse::CornerPointGrid;
use seis3d::session::Session;
use seis3d::settings::{AreaSpec, ModelSettings};
use seis3d::{regrid, Grid3};

/// Layered 4x4x3 grid: flat horizons, one elastic triple per layer.
fn layered_grid(ni: usize, nj: usize) -> CornerPointGrid {
    let mut grid = CornerPointGrid::from_layer_depths(ni, nj, 3, 0.0, 0.0, 100.0, 100.0, |_, _, h| {
        1000.0 + 50.0 * h as f64
    });
    let n = ni * nj * 3;
    let layer_of = |idx: usize| idx / (ni * nj);
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
        top_time_constant: 1000.0,
        ..Default::default()
    }
}

fn regridded_session(grid: CornerPointGrid, settings: ModelSettings) -> Session {
    let mut session = Session::new(settings, grid, None, None).expect("session builds");
    regrid::run(&mut session).expect("regridding succeeds");
    session
}

#[test]
fn reflector_depths_are_monotone() {
    let session = regridded_session(layered_grid(4, 4), base_settings());
    let (nx, ny, nk) = session.z_grid.dims();
    for j in 0..ny {
        for i in 0..nx {
            for k in 0..nk - 1 {
                assert!(
                    session.z_grid.get(i, j, k) <= session.z_grid.get(i, j, k + 1) + 1e-9,
                    "layer thickness negative at ({i}, {j}, {k})"
                );
            }
        }
    }
}

#[test]
fn folded_horizons_are_clamped() {
    // Horizon 1 dips below horizon 2 over half the area.
    let mut grid = CornerPointGrid::from_layer_depths(6, 6, 2, 0.0, 0.0, 100.0, 100.0, |x, _, h| {
        match h {
            0 => 1000.0,
            1 => {
                if x > 300.0 {
                    1120.0
                } else {
                    1050.0
                }
            }
            _ => 1100.0,
        }
    });
    let n = 6 * 6 * 2;
    grid.set_parameter("VP", vec![2500.0; n]);
    grid.set_parameter("VS", vec![1000.0; n]);
    grid.set_parameter("RHO", vec![2.2; n]);

    let session = regridded_session(grid, base_settings());
    let (nx, ny, nk) = session.z_grid.dims();
    for j in 0..ny {
        for i in 0..nx {
            for k in 0..nk - 1 {
                assert!(session.z_grid.get(i, j, k) <= session.z_grid.get(i, j, k + 1) + 1e-9);
            }
        }
    }
}

#[test]
fn elastic_rows_carry_layer_values() {
    let session = regridded_session(layered_grid(4, 4), base_settings());
    // An interior column: row 0 overburden, rows 1..=3 the three layers.
    let (nx, ny, _) = session.vp_grid.dims();
    let (i, j) = (nx / 2, ny / 2);
    assert_eq!(session.vp_grid.get(i, j, 0), session.settings.const_vp[0]);
    assert!((session.vp_grid.get(i, j, 1) - 2000.0).abs() < 1e-9);
    assert!((session.vp_grid.get(i, j, 2) - 2500.0).abs() < 1e-9);
    assert!((session.vp_grid.get(i, j, 3) - 3000.0).abs() < 1e-9);
    assert!((session.rho_grid.get(i, j, 2) - 2.3).abs() < 1e-9);
}

#[test]
fn twt_is_monotone_where_defined() {
    let session = regridded_session(layered_grid(4, 4), base_settings());
    let (nx, ny, nk) = session.twt_grid.dims();
    for j in 0..ny {
        for i in 0..nx {
            let top = session.twt_grid.get(i, j, 0);
            if top == MISSING {
                continue;
            }
            for k in 1..nk {
                assert!(
                    session.twt_grid.get(i, j, k) + 1e-9 >= session.twt_grid.get(i, j, k - 1),
                    "TWT decreases at ({i}, {j}, {k})"
                );
            }
        }
    }
}

#[test]
fn twt_matches_interval_velocities() {
    let session = regridded_session(layered_grid(4, 4), base_settings());
    let (i, j) = (2, 2);
    // Reflector spacing is 50 m; layer k sits between reflectors k-1 and k.
    for k in 1..session.nzrefl() {
        let expected = 2000.0 * 50.0 / session.vp_grid.get(i, j, k + 1);
        let actual = session.twt_grid.get(i, j, k) - session.twt_grid.get(i, j, k - 1);
        assert!(
            (actual - expected).abs() < 1e-6,
            "interval {k}: {actual} vs {expected}"
        );
    }
}

#[test]
fn vrms_is_bounded_by_interval_velocities() {
    let session = regridded_session(layered_grid(4, 4), base_settings());
    let (i, j) = (2, 2);
    let nzrefl = session.nzrefl();
    let twt: Vec<f64> = (0..nzrefl).map(|k| session.twt_grid.get(i, j, k)).collect();
    let vrms = session.find_vrms(&twt, &session.vp_grid, i, j);

    // Contributing velocities: the implied overburden velocity plus the
    // interval velocities of the sampled layers.
    let v_over = 2000.0 * session.z_grid.get(i, j, 0) / twt[0];
    for k in 0..nzrefl {
        let mut v_min = v_over;
        let mut v_max = v_over;
        for l in 1..=k {
            let v = session.vp_grid.get(i, j, l + 1);
            v_min = v_min.min(v);
            v_max = v_max.max(v);
        }
        assert!(
            vrms[k] >= v_min - 1e-6 && vrms[k] <= v_max + 1e-6,
            "vrms[{k}] = {} outside [{v_min}, {v_max}]",
            vrms[k]
        );
    }
}

#[test]
fn zero_thickness_cells_inherit_value_above() {
    // Middle layer collapsed to zero thickness and inactive: its regridded
    // row must inherit the layer above, not the reservoir default.
    let mut grid = CornerPointGrid::from_layer_depths(4, 4, 3, 0.0, 0.0, 100.0, 100.0, |_, _, h| {
        match h {
            0 => 1000.0,
            1 => 1050.0,
            2 => 1050.0, // layer 1 has zero thickness
            _ => 1100.0,
        }
    });
    let n = 4 * 4 * 3;
    let layer_of = |idx: usize| idx / 16;
    grid.set_parameter(
        "VP",
        (0..n).map(|c| [2000.0, 2500.0, 3000.0][layer_of(c)]).collect(),
    );
    grid.set_parameter("VS", vec![1000.0; n]);
    grid.set_parameter("RHO", vec![2.2; n]);
    for j in 0..4 {
        for i in 0..4 {
            grid.set_active(i, j, 1, false);
        }
    }

    let session = regridded_session(grid, base_settings());
    let (i, j) = (2, 2);
    assert!(
        (session.vp_grid.get(i, j, 2) - 2000.0).abs() < 1e-9,
        "collapsed layer row = {}",
        session.vp_grid.get(i, j, 2)
    );
}

#[test]
fn underburden_flag_controls_fill_below_reservoir() {
    // Extend mode carries the deepest regridded value into the synthetic
    // underburden row; the flag swaps in the underburden constants instead.
    let extended = regridded_session(layered_grid(4, 4), base_settings());
    let (i, j) = (2, 2);
    let nk = extended.vp_grid.nk;
    assert!((extended.vp_grid.get(i, j, nk - 1) - 3000.0).abs() < 1e-9);
    assert!((extended.vs_grid.get(i, j, nk - 1) - 1200.0).abs() < 1e-9);

    let settings = ModelSettings {
        default_underburden: true,
        ..base_settings()
    };
    let session = regridded_session(layered_grid(4, 4), settings);
    assert_eq!(session.vp_grid.get(i, j, nk - 1), session.settings.const_vp[2]);
    assert_eq!(session.vs_grid.get(i, j, nk - 1), session.settings.const_vs[2]);
    assert_eq!(session.rho_grid.get(i, j, nk - 1), session.settings.const_rho[2]);
}

#[test]
fn columns_outside_footprint_take_overburden_defaults() {
    // Survey area four times the grid footprint; far columns see no quads
    // and stay at the overburden defaults down to the underburden row.
    let mut settings = base_settings();
    settings.area = Some(AreaSpec {
        x0: 0.0,
        y0: 0.0,
        lx: 800.0,
        ly: 800.0,
        angle: 0.0,
    });
    let session = regridded_session(layered_grid(4, 4), settings);

    let (nx, ny, nk) = session.vp_grid.dims();
    let (i, j) = (nx - 1, ny - 1);
    for k in 0..nk - 1 {
        assert_eq!(session.vp_grid.get(i, j, k), session.settings.const_vp[0]);
        assert_eq!(session.vs_grid.get(i, j, k), session.settings.const_vs[0]);
        assert_eq!(session.rho_grid.get(i, j, k), session.settings.const_rho[0]);
    }
    assert_eq!(session.vp_grid.get(i, j, nk - 1), session.settings.const_vp[2]);
}

#[test]
fn single_layer_grid_regrids() {
    let mut grid = CornerPointGrid::from_layer_depths(4, 4, 1, 0.0, 0.0, 100.0, 100.0, |_, _, h| {
        1000.0 + 60.0 * h as f64
    });
    let n = 16;
    grid.set_parameter("VP", vec![2800.0; n]);
    grid.set_parameter("VS", vec![1100.0; n]);
    grid.set_parameter("RHO", vec![2.4; n]);

    let session = regridded_session(grid, base_settings());
    assert_eq!(session.nzrefl(), 2);
    let (i, j) = (2, 2);
    assert!((session.vp_grid.get(i, j, 1) - 2800.0).abs() < 1e-9);
    assert!(session.z_grid.get(i, j, 1) > session.z_grid.get(i, j, 0));
    assert!(session.generate_trace_ok(i, j));
}

#[test]
fn tilted_horizon_tilts_bottom_time() {
    // Depths increase with x; bottom time must do the same.
    let mut grid = CornerPointGrid::from_layer_depths(6, 4, 2, 0.0, 0.0, 100.0, 100.0, |x, _, h| {
        1000.0 + 0.2 * x + 40.0 * h as f64
    });
    let n = 6 * 4 * 2;
    grid.set_parameter("VP", vec![2500.0; n]);
    grid.set_parameter("VS", vec![1000.0; n]);
    grid.set_parameter("RHO", vec![2.2; n]);

    let session = regridded_session(grid, base_settings());
    let surface = &session.bottom_time;
    let j = surface.ny / 2;
    let left = surface.get(1, j);
    let right = surface.get(surface.nx - 2, j);
    assert!(
        right > left,
        "bottom time does not follow the tilt: {left} .. {right}"
    );
}

#[test]
fn timeshift_dimension_mismatch_is_fatal() {
    let grid = layered_grid(4, 4);
    let bad_cube = Grid3::new(0.0, 0.0, 50.0, 50.0, 0.0, 0.0, 1.0, 2, 2, 2, 0.0);
    let result = Session::new(base_settings(), grid, None, Some(bad_cube));
    assert!(matches!(
        result,
        Err(seis3d::SeisError::DimensionMismatch { .. })
    ));
}

#[test]
fn missing_source_parameter_is_fatal() {
    let mut grid = CornerPointGrid::from_layer_depths(2, 2, 1, 0.0, 0.0, 100.0, 100.0, |_, _, _| 1000.0);
    grid.set_parameter("VP", vec![2500.0; 4]);
    grid.set_parameter("VS", vec![1000.0; 4]);
    // RHO never registered.
    let result = Session::new(base_settings(), grid, None, None);
    match result {
        Err(seis3d::SeisError::MissingParameter(name)) => assert_eq!(name, "RHO"),
        Err(other) => panic!("expected MissingParameter, got {other}"),
        Ok(_) => panic!("expected MissingParameter, got a session"),
    }
}
