//! Property-based invariants for regridding and travel-time construction.

use proptest::prelude::*;

use seis3d::constants::MISSING;
use seis3d::eclipse::CornerPointGrid;
use seis3d::session::Session;
use seis3d::settings::ModelSettings;
use seis3d::regrid;

/// A randomly tilted, randomly spaced stack of horizons; always ordered in
/// depth by construction.
fn random_grid(
    base_depth: f64,
    thicknesses: Vec<f64>,
    tilt_x: f64,
    tilt_y: f64,
    vp: Vec<f64>,
) -> CornerPointGrid {
    let nk = thicknesses.len();
    let mut grid =
        CornerPointGrid::from_layer_depths(4, 4, nk, 0.0, 0.0, 100.0, 100.0, move |x, y, h| {
            let stack: f64 = thicknesses.iter().take(h).sum();
            base_depth + stack + tilt_x * x + tilt_y * y
        });
    let n = 4 * 4 * nk;
    let per_layer = 16;
    grid.set_parameter("VP", (0..n).map(|c| vp[c / per_layer]).collect());
    grid.set_parameter("VS", (0..n).map(|c| vp[c / per_layer] * 0.45).collect());
    grid.set_parameter("RHO", vec![2.2; n]);
    grid
}

fn settings() -> ModelSettings {
    ModelSettings {
        dx: 50.0,
        dy: 50.0,
        dz: 4.0,
        dt: 4.0,
        top_time_constant: 800.0,
        ..Default::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10))]

    #[test]
    fn depths_and_twt_stay_monotone(
        base_depth in 500.0..2000.0f64,
        thicknesses in prop::collection::vec(1.0..120.0f64, 2..5),
        tilt_x in -0.3..0.3f64,
        tilt_y in -0.3..0.3f64,
        velocities in prop::collection::vec(1600.0..5500.0f64, 5),
    ) {
        let nk = thicknesses.len();
        let grid = random_grid(base_depth, thicknesses, tilt_x, tilt_y, velocities[..nk].to_vec());
        let mut session = Session::new(settings(), grid, None, None).expect("session builds");
        regrid::run(&mut session).expect("regridding succeeds");

        let (nx, ny, nzr) = session.z_grid.dims();
        for j in 0..ny {
            for i in 0..nx {
                for k in 0..nzr - 1 {
                    prop_assert!(
                        session.z_grid.get(i, j, k) <= session.z_grid.get(i, j, k + 1) + 1e-9,
                        "z not monotone at ({}, {}, {})", i, j, k
                    );
                }
                let top = session.twt_grid.get(i, j, 0);
                if top != MISSING {
                    for k in 1..nzr {
                        prop_assert!(
                            session.twt_grid.get(i, j, k) + 1e-9
                                >= session.twt_grid.get(i, j, k - 1),
                            "twt not monotone at ({}, {}, {})", i, j, k
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn vrms_stays_within_velocity_bounds(
        velocities in prop::collection::vec(1600.0..5500.0f64, 3),
    ) {
        let grid = random_grid(1000.0, vec![40.0, 60.0, 80.0], 0.0, 0.0, velocities.clone());
        let mut session = Session::new(settings(), grid, None, None).expect("session builds");
        regrid::run(&mut session).expect("regridding succeeds");

        let (i, j) = (2, 2);
        let nzrefl = session.nzrefl();
        let twt: Vec<f64> = (0..nzrefl).map(|k| session.twt_grid.get(i, j, k)).collect();
        let vrms = session.find_vrms(&twt, &session.vp_grid, i, j);
        let v_over = 2000.0 * session.z_grid.get(i, j, 0) / twt[0];
        for k in 0..nzrefl {
            let mut v_min = v_over;
            let mut v_max = v_over;
            for l in 1..=k {
                let v = session.vp_grid.get(i, j, l + 1);
                v_min = v_min.min(v);
                v_max = v_max.max(v);
            }
            prop_assert!(
                vrms[k] >= v_min - 1e-6 && vrms[k] <= v_max + 1e-6,
                "vrms[{}] = {} outside [{}, {}]", k, vrms[k], v_min, v_max
            );
        }
    }
}
