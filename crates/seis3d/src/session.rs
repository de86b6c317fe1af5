//! Run-scoped owner of every grid, surface and evaluator.
//!
//! `Session` replaces the pointer graph of handles a forward run needs with
//! one value-owning container: the regridder fills its grids, the trace
//! synthesiser borrows them read-only, and phase-release methods return the
//! memory between phases. It also hosts the travel-time and velocity math
//! shared by both phases.

use tracing::{debug, info, warn};

use crate::constants::{
    MISSING, OFFSET_SCALE_SQ, ONE_WAY_MS, SNELL_MAX_ITER, SNELL_TOLERANCE, TWO_WAY_MS,
};
use crate::eclipse::CornerPointGrid;
use crate::error::{Result, SeisError};
use crate::grid::{Grid2, Grid3};
use crate::interpolation::interpolate_linear;
use crate::seismic_geometry::SeismicGeometry;
use crate::segy::SegyGeometry;
use crate::settings::ModelSettings;
use crate::surface::RegularSurface;
use crate::wavelet::Wavelet;
use crate::zoeppritz::make_evaluator;

/// Output time/depth axes of a run.
#[derive(Clone, Debug, Default)]
pub struct TimeAxes {
    /// Regular TWT samples (cell-centred).
    pub twt_0: Vec<f64>,
    /// Regular depth samples (cell-centred).
    pub z_0: Vec<f64>,
    /// Shift-adjusted time axis; empty without a timeshift cube.
    pub twts_0: Vec<f64>,
    /// Usable sample count of the NMO-corrected trace.
    pub time_samples_stretch: usize,
}

/// Everything a forward run owns.
pub struct Session {
    pub settings: ModelSettings,
    pub geometry: SeismicGeometry,
    pub wavelet: Wavelet,
    pub wavelet_scale: f64,

    /// Source grid; freed after regridding.
    pub eclipse: Option<CornerPointGrid>,
    /// First reservoir layer in the source grid.
    pub top_k: usize,
    /// Last reservoir layer in the source grid.
    pub bottom_k: usize,

    pub top_time: RegularSurface,
    pub bottom_time: RegularSurface,
    pub top_eclipse: RegularSurface,
    pub bottom_eclipse: RegularSurface,

    /// Trace numbering; `None` means plain (i, j) iteration and no SEG-Y
    /// headers sourced from acquisition geometry.
    pub segy_geometry: Option<SegyGeometry>,

    /// Reflector depths, (nx, ny, nzrefl).
    pub z_grid: Grid3,
    /// P velocity, (nx, ny, nzrefl + 1): overburden row, layers, underburden row.
    pub vp_grid: Grid3,
    /// S velocity, same layout.
    pub vs_grid: Grid3,
    /// Density, same layout.
    pub rho_grid: Grid3,
    /// Two-way time per reflector, (nx, ny, nzrefl).
    pub twt_grid: Grid3,
    /// PP-leg TWT; only in PS + NMO mode.
    pub twt_pp_grid: Option<Grid3>,
    /// SS-leg TWT; only in PS + NMO mode.
    pub twt_ss_grid: Option<Grid3>,
    /// RMS velocity; only when requested.
    pub vrms_grid: Option<Grid3>,
    /// Zero-offset reflection snapshots: [clean] or [clean, noisy].
    pub r_grids: Vec<Grid3>,
    /// Regridded extra parameters, one per configured name.
    pub extra_grids: Vec<Grid3>,
    /// Timeshift cube matching (nx, ny, nzrefl).
    pub twt_timeshift: Option<Grid3>,

    /// Reflection angles (angle mode).
    pub theta_vec: Vec<f64>,
    /// Source-receiver offsets (NMO mode).
    pub offset_vec: Vec<f64>,
}

impl Session {
    /// Build the session: derive geometry and surfaces from the corner-point
    /// grid and allocate every output grid.
    pub fn new(
        settings: ModelSettings,
        eclipse: CornerPointGrid,
        top_time_input: Option<RegularSurface>,
        twt_timeshift: Option<Grid3>,
    ) -> Result<Self> {
        settings.validate()?;

        for name in settings
            .parameter_names
            .iter()
            .chain(settings.extra_parameter_names.iter())
        {
            if !eclipse.has_parameter(name) {
                return Err(SeisError::MissingParameter(name.clone()));
            }
        }

        let theta_vec = settings.theta_vec();
        let offset_vec = settings.offset_vec();
        let wavelet = Wavelet::ricker(settings.peak_frequency);
        let wavelet_scale = settings.wavelet_scale;

        let mut geometry = SeismicGeometry {
            dx: settings.dx,
            dy: settings.dy,
            dz: settings.dz,
            dt: settings.dt,
            ..Default::default()
        };
        match settings.area {
            Some(area) => geometry.set_geometry(area.x0, area.y0, area.lx, area.ly, area.angle),
            None => {
                let (x0, y0, lx, ly, angle) = eclipse.find_enclosing_volume();
                geometry.set_geometry(x0, y0, lx, ly, angle);
            }
        }

        let mut session = Session {
            settings,
            geometry,
            wavelet,
            wavelet_scale,
            eclipse: Some(eclipse),
            top_k: 0,
            bottom_k: 0,
            top_time: RegularSurface::new(0.0, 0.0, 1.0, 1.0, 0.0, 1, 1, MISSING),
            bottom_time: RegularSurface::new(0.0, 0.0, 1.0, 1.0, 0.0, 1, 1, MISSING),
            top_eclipse: RegularSurface::new(0.0, 0.0, 1.0, 1.0, 0.0, 1, 1, MISSING),
            bottom_eclipse: RegularSurface::new(0.0, 0.0, 1.0, 1.0, 0.0, 1, 1, MISSING),
            segy_geometry: None,
            z_grid: Grid3::default(),
            vp_grid: Grid3::default(),
            vs_grid: Grid3::default(),
            rho_grid: Grid3::default(),
            twt_grid: Grid3::default(),
            twt_pp_grid: None,
            twt_ss_grid: None,
            vrms_grid: None,
            r_grids: Vec::new(),
            extra_grids: Vec::new(),
            twt_timeshift: None,
            theta_vec,
            offset_vec,
        };

        session.find_surface_geometry(top_time_input);
        session.create_grids();
        session.attach_timeshift(twt_timeshift)?;
        if session.settings.output.any_segy() {
            session.segy_geometry = Some(SegyGeometry::from_grid(
                &session.geometry,
                session.settings.inline_start,
                session.settings.xline_start,
                session.settings.inline_step,
                session.settings.xline_step,
            ));
        }

        info!(
            nx = session.geometry.nx(),
            ny = session.geometry.ny(),
            nzrefl = session.geometry.z_reflector_count,
            "session ready"
        );
        Ok(session)
    }

    /// Reflector layer count (bottom_k - top_k + 2).
    pub fn nzrefl(&self) -> usize {
        self.geometry.z_reflector_count
    }

    fn find_surface_geometry(&mut self, top_time_input: Option<RegularSurface>) {
        let eclipse = self.eclipse.as_ref().expect("eclipse present before regridding");
        let dx = self.geometry.dx;
        let dy = self.geometry.dy;
        let nx = self.geometry.nx();
        let ny = self.geometry.ny();
        let angle = self.geometry.angle;
        let (sin_a, cos_a) = angle.sin_cos();
        // Surfaces cover the survey with a one-cell margin on every side.
        let sx0 = self.geometry.x0 - dx * cos_a + dy * sin_a;
        let sy0 = self.geometry.y0 - dx * sin_a - dy * cos_a;
        let snx = nx + 2;
        let sny = ny + 2;

        self.top_k = eclipse.find_top_layer();
        self.bottom_k = eclipse.find_bottom_layer();
        self.geometry.z_reflector_count = self.bottom_k + 2 - self.top_k;

        let raster = crate::eclipse::RasterSpec {
            x0: sx0,
            y0: sy0,
            dx,
            dy,
            angle,
            nx: snx,
            ny: sny,
        };
        let corner = self.settings.cornerpoint_interpolation;
        let top_vals = eclipse.layer_surface(self.top_k, crate::eclipse::Face::Top, corner, &raster);
        let bot_vals =
            eclipse.layer_surface(self.bottom_k, crate::eclipse::Face::Bottom, corner, &raster);

        self.top_eclipse = RegularSurface::new(sx0, sy0, dx, dy, angle, snx, sny, MISSING);
        self.bottom_eclipse = RegularSurface::new(sx0, sy0, dx, dy, angle, snx, sny, MISSING);
        for j in 0..sny {
            for i in 0..snx {
                self.top_eclipse.set(i, j, top_vals.get(i, j));
                self.bottom_eclipse.set(i, j, bot_vals.get(i, j));
            }
        }

        match &top_time_input {
            Some(input) => {
                let fill = input.min();
                self.top_time = RegularSurface::new(sx0, sy0, dx, dy, angle, snx, sny, fill);
                for j in 0..sny {
                    for i in 0..snx {
                        let (x, y) = self.top_time.get_xy(i, j);
                        let v = input.get_z(x, y);
                        let v = if input.is_missing(v) { MISSING } else { v };
                        self.top_time.set(i, j, v);
                    }
                }
                self.bottom_time =
                    RegularSurface::new(sx0, sy0, dx, dy, angle, snx, sny, self.top_time.max());
            }
            None => {
                let t1 = self.settings.top_time_constant;
                self.top_time = RegularSurface::new(sx0, sy0, dx, dy, angle, snx, sny, t1);
                self.bottom_time = RegularSurface::new(sx0, sy0, dx, dy, angle, snx, sny, t1);
                // Shape the constant top time with the top reservoir relief.
                let d1 = self.top_eclipse.min();
                let v0 = self.settings.const_vp[0];
                for j in 0..sny {
                    for i in 0..snx {
                        let top = self.top_eclipse.get(i, j);
                        if !self.top_eclipse.is_missing(top) {
                            let t = t1 + TWO_WAY_MS * (top - d1) / v0;
                            self.top_time.set(i, j, t);
                            self.bottom_time.set(i, j, t);
                        }
                    }
                }
            }
        }

        // One wavelet length of depth padding above and below the reservoir.
        self.top_eclipse
            .add(-self.wavelet.depth_adjustment(self.settings.const_vp[0]));
        self.bottom_eclipse
            .add(self.wavelet.depth_adjustment(self.settings.const_vp[2]));
        self.geometry
            .set_z_range(self.top_eclipse.min(), self.bottom_eclipse.max());
    }

    fn create_grids(&mut self) {
        let nx = self.geometry.nx();
        let ny = self.geometry.ny();
        let nzrefl = self.nzrefl();
        let g = &self.geometry;
        let base = Grid3::new(
            g.x0, g.y0, g.dx, g.dy, g.angle, g.z_min, g.z_max, nx, ny, nzrefl, 0.0,
        );

        self.z_grid = base.clone();
        self.twt_grid = Grid3::like(&base, nzrefl, 0.0);
        // Elastic grids start undefined; the regridder assigns the reservoir
        // interval and the post-process resolves what never got a value.
        self.vp_grid = Grid3::like(&base, nzrefl + 1, MISSING);
        self.vs_grid = Grid3::like(&base, nzrefl + 1, MISSING);
        self.rho_grid = Grid3::like(&base, nzrefl + 1, MISSING);
        for j in 0..ny {
            for i in 0..nx {
                self.vp_grid.set(i, j, 0, self.settings.const_vp[0]);
                self.vs_grid.set(i, j, 0, self.settings.const_vs[0]);
                self.rho_grid.set(i, j, 0, self.settings.const_rho[0]);
                self.vp_grid.set(i, j, nzrefl, self.settings.const_vp[2]);
                self.vs_grid.set(i, j, nzrefl, self.settings.const_vs[2]);
                self.rho_grid.set(i, j, nzrefl, self.settings.const_rho[2]);
            }
        }

        if self.settings.nmo && self.settings.ps_seismic {
            self.twt_pp_grid = Some(Grid3::like(&base, nzrefl, 0.0));
            self.twt_ss_grid = Some(Grid3::like(&base, nzrefl, 0.0));
        }
        if self.settings.nmo && self.settings.output.vrms {
            self.vrms_grid = Some(Grid3::like(&base, nzrefl, 0.0));
        }
        if self.settings.output.reflections {
            let n = if self.settings.white_noise { 2 } else { 1 };
            self.r_grids = vec![Grid3::like(&base, nzrefl, 0.0); n];
        }
        self.extra_grids = self
            .settings
            .extra_parameter_defaults
            .iter()
            .map(|&d| {
                let mut grid = Grid3::like(&base, nzrefl + 1, d);
                for j in 0..ny {
                    for i in 0..nx {
                        grid.set(i, j, nzrefl, 0.0);
                    }
                }
                grid
            })
            .collect();
    }

    fn attach_timeshift(&mut self, cube: Option<Grid3>) -> Result<()> {
        if let Some(cube) = cube {
            let expected = (self.geometry.nx(), self.geometry.ny(), self.nzrefl());
            if cube.dims() != expected {
                return Err(SeisError::DimensionMismatch {
                    expected,
                    actual: cube.dims(),
                });
            }
            self.twt_timeshift = Some(cube);
        }
        Ok(())
    }

    /// Column (i_max, j_max) carrying the deepest bottom-reflector TWT.
    pub fn find_max_twt_index(&self) -> (usize, usize, f64) {
        let k_max = self.twt_grid.nk - 1;
        let mut best = (0, 0, 0.0);
        for j in 0..self.twt_grid.ny {
            for i in 0..self.twt_grid.nx {
                let v = self.twt_grid.get(i, j, k_max);
                if v > best.2 {
                    best = (i, j, v);
                }
            }
        }
        best
    }

    /// RMS velocity per reflector for column (i, j), from layer TWT `twt_vec`
    /// and the interval velocities of `v_grid` (vp or vs).
    ///
    /// The water column and the overburden above the first reflector enter
    /// through the settings.
    pub fn find_vrms(&self, twt_vec: &[f64], v_grid: &Grid3, i: usize, j: usize) -> Vec<f64> {
        let nk = twt_vec.len();
        let mut vrms = vec![MISSING; nk];
        if twt_vec[0] == MISSING {
            return vrms;
        }
        let v_w = self.settings.v_water;
        let z_w = self.settings.z_water;
        let twt_w = TWO_WAY_MS * z_w / v_w;
        let v_over = TWO_WAY_MS * (self.z_grid.get(i, j, 0) - z_w) / (twt_vec[0] - twt_w);
        let base = v_w * v_w * twt_w + v_over * v_over * (twt_vec[0] - twt_w);
        for k in 0..nk {
            let mut acc = base;
            for l in 1..=k {
                // Interval between reflectors l-1 and l; velocity row l+1
                // matches the interval used when the TWT grid was built.
                let v = v_grid.get(i, j, l + 1);
                acc += v * v * (twt_vec[l] - twt_vec[l - 1]);
            }
            vrms[k] = (acc / twt_vec[k]).sqrt();
        }
        vrms
    }

    /// Regularly sampled Vrms on `twt_0`, extended with a water knot above
    /// and an underburden knot one wavelet below the last reflector.
    pub fn resample_vrms(
        &self,
        twt_vec: &[f64],
        vrms_vec: &[f64],
        twt_0: &[f64],
        const_v_under: f64,
    ) -> Vec<f64> {
        let nk = twt_vec.len();
        let twt_wavelet = self.wavelet.twt_length();
        let v_w = self.settings.v_water;
        let twt_w = TWO_WAY_MS * self.settings.z_water / v_w;

        let mut vrms_under = vrms_vec[nk - 1] * vrms_vec[nk - 1] * twt_vec[nk - 1]
            + const_v_under * const_v_under * twt_wavelet;
        vrms_under /= twt_vec[nk - 1] + twt_wavelet;
        let vrms_under = vrms_under.sqrt();

        let mut twt_in = Vec::with_capacity(nk + 2);
        let mut vrms_in = Vec::with_capacity(nk + 2);
        twt_in.push(twt_w);
        vrms_in.push(v_w);
        for k in 0..nk {
            if twt_in.last().map(|&t| t != twt_vec[k]).unwrap_or(true) {
                twt_in.push(twt_vec[k]);
                vrms_in.push(vrms_vec[k]);
            }
        }
        twt_in.push(twt_in[twt_in.len() - 1] + twt_wavelet);
        vrms_in.push(vrms_under);

        interpolate_linear(&twt_in, &vrms_in, twt_0)
    }

    /// Reflection coefficients per (layer boundary, angle column).
    pub fn find_reflections(&self, r: &mut Grid2, theta_vec: &[f64], i: usize, j: usize) {
        let nzrefl = self.nzrefl();
        let mut evaluator = make_evaluator(self.settings.ps_seismic);
        for (t_idx, &theta) in theta_vec.iter().enumerate() {
            evaluator.compute_constants(theta);
            for k in 0..nzrefl {
                r.set(k, t_idx, self.reflection_at(&*evaluator, i, j, k));
            }
        }
    }

    /// Reflection coefficients with a per-(layer, offset) angle matrix, used
    /// by the NMO path.
    pub fn find_nmo_reflections(&self, r: &mut Grid2, theta: &Grid2, i: usize, j: usize) {
        let nzrefl = self.nzrefl();
        let mut evaluator = make_evaluator(self.settings.ps_seismic);
        for off in 0..theta.nj() {
            for k in 0..nzrefl {
                evaluator.compute_constants(theta.get(k, off));
                r.set(k, off, self.reflection_at(&*evaluator, i, j, k));
            }
        }
    }

    fn reflection_at(
        &self,
        evaluator: &(dyn crate::zoeppritz::ReflectionEvaluator + Send),
        i: usize,
        j: usize,
        k: usize,
    ) -> f64 {
        let vp0 = self.vp_grid.get(i, j, k);
        let vp1 = self.vp_grid.get(i, j, k + 1);
        let vs0 = self.vs_grid.get(i, j, k);
        let vs1 = self.vs_grid.get(i, j, k + 1);
        let rho0 = self.rho_grid.get(i, j, k);
        let rho1 = self.rho_grid.get(i, j, k + 1);
        evaluator.reflection(
            vp1 - vp0,
            0.5 * (vp1 + vp0),
            rho1 - rho0,
            0.5 * (rho1 + rho0),
            vs1 - vs0,
            0.5 * (vs1 + vs0),
        )
    }

    /// True when a trace should be generated at (i, j): the column has a top
    /// time and at least one interior layer departs from the reservoir
    /// defaults.
    pub fn generate_trace_ok(&self, i: usize, j: usize) -> bool {
        if self.twt_grid.get(i, j, 0) == MISSING {
            return false;
        }
        let nk = self.vp_grid.nk;
        let [_, vp1, _] = self.settings.const_vp;
        let [_, vs1, _] = self.settings.const_vs;
        let [_, rho1, _] = self.settings.const_rho;
        (1..nk - 1).any(|k| {
            self.vp_grid.get(i, j, k) != vp1
                || self.vs_grid.get(i, j, k) != vs1
                || self.rho_grid.get(i, j, k) != rho1
        })
    }

    /// Output axes for the run; in NMO mode the time axis is stretched to
    /// bound the longest offset.
    pub fn generate_axes(&self) -> Result<TimeAxes> {
        let mut axes = TimeAxes::default();
        if self.settings.nmo {
            axes.twt_0 = self.generate_twt0_for_nmo(&mut axes.time_samples_stretch)?;
            axes.z_0 = self.generate_z0_for_nmo(&axes.twt_0);
            if self.twt_timeshift.is_some() {
                axes.twts_0 = self.generate_twt0_shift(axes.twt_0[0], axes.time_samples_stretch);
            }
        } else {
            let g = &self.geometry;
            axes.twt_0 = (0..g.nt()).map(|i| g.t_min + (0.5 + i as f64) * g.dt).collect();
            axes.z_0 = (0..g.nz()).map(|i| g.z_min + (0.5 + i as f64) * g.dz).collect();
            axes.time_samples_stretch = axes.twt_0.len();
            if self.twt_timeshift.is_some() {
                axes.twts_0 = self.generate_twt0_shift(axes.twt_0[0], axes.twt_0.len());
            }
        }
        Ok(axes)
    }

    fn generate_twt0_for_nmo(&self, time_samples_stretch: &mut usize) -> Result<Vec<f64>> {
        let g = &self.geometry;
        let nt = g.nt();
        let dt = g.dt;
        let t0 = g.t_min;
        let nzrefl = self.nzrefl();
        let twt_wavelet = self.wavelet.twt_length();
        let offset_max = *self
            .offset_vec
            .last()
            .expect("offset span is never empty");

        let (i_max, j_max, mut max_twt) = self.find_max_twt_index();

        let twtx_max = if self.settings.ps_seismic {
            let twt_pp_grid = self
                .twt_pp_grid
                .as_ref()
                .expect("PS + NMO carries a PP-leg TWT grid");
            let twt_ss_grid = self
                .twt_ss_grid
                .as_ref()
                .expect("PS + NMO carries an SS-leg TWT grid");
            let twt_pp: Vec<f64> = (0..nzrefl).map(|k| twt_pp_grid.get(i_max, j_max, k)).collect();
            let twt_ss: Vec<f64> = (0..nzrefl).map(|k| twt_ss_grid.get(i_max, j_max, k)).collect();
            let vrms_pp = self.find_vrms(&twt_pp, &self.vp_grid, i_max, j_max);
            let vrms_ss = self.find_vrms(&twt_ss, &self.vs_grid, i_max, j_max);

            let vrms_pp_max = vrms_pp[nzrefl - 1];
            let vrms_ss_max = vrms_ss[nzrefl - 1];
            let twt_pp_max = twt_pp[nzrefl - 1];
            let twt_ss_max = twt_ss[nzrefl - 1];

            let d_down = vrms_pp_max * twt_pp_max / TWO_WAY_MS;
            let d_up = vrms_ss_max * twt_ss_max / TWO_WAY_MS;
            let v_ratio = vrms_ss_max / vrms_pp_max;
            let start = (offset_max / (vrms_pp_max * twt_pp_max / ONE_WAY_MS))
                .atan()
                .min(0.99);
            let (y, _) = find_sin_theta_ps(start, offset_max, d_up, d_down, v_ratio).ok_or_else(
                || {
                    SeisError::NumericDivergence(
                        "PS Snell probe at maximum offset".to_string(),
                    )
                },
            )?;
            let theta_down = y.asin();
            let theta_up = (v_ratio * y).asin();
            let offset_down = theta_down.tan() * d_down;
            let offset_up = theta_up.tan() * d_up;
            let twtx_pp = (twt_pp_max * twt_pp_max / 4.0
                + OFFSET_SCALE_SQ * offset_down * offset_down / (vrms_pp_max * vrms_pp_max))
                .sqrt();
            let twtx_ss = (twt_ss_max * twt_ss_max / 4.0
                + OFFSET_SCALE_SQ * offset_up * offset_up / (vrms_ss_max * vrms_ss_max))
                .sqrt();
            twtx_pp + twtx_ss + twt_wavelet
        } else {
            max_twt += twt_wavelet;
            let twt: Vec<f64> = (0..nzrefl).map(|k| self.twt_grid.get(i_max, j_max, k)).collect();
            let vrms = self.find_vrms(&twt, &self.vp_grid, i_max, j_max);
            moveout(max_twt, offset_max, vrms[nzrefl - 1])
        };

        // Stretch handling: extend the axis above t0 and below twtx_max so
        // the NMO-corrected trace survives the wavelet smear at long offsets.
        let stretch = twtx_max / g.t_max;
        let mut twtx_max = twtx_max;
        let mut tmin = t0;
        let mut xtra_top = 0usize;
        if stretch > 1.0 {
            tmin = t0 - 2.0 * stretch * twt_wavelet;
            xtra_top = (2.0 * stretch * twt_wavelet / dt) as usize;
        }

        let mut tmax_nmo = max_twt;
        *time_samples_stretch = if stretch > 1.0 {
            tmax_nmo += 4.0 * stretch * twt_wavelet;
            ((tmax_nmo - tmin) / dt).ceil() as usize
        } else {
            nt
        };

        if stretch > 1.0 {
            twtx_max += stretch * twt_wavelet;
        }
        let mut nt_seis = nt;
        if twtx_max > tmin + nt as f64 * dt {
            nt_seis = ((twtx_max - tmin) / dt).ceil() as usize;
        }

        let start = t0 - xtra_top as f64 * dt;
        let twt_0: Vec<f64> = (0..nt_seis).map(|i| start + (0.5 + i as f64) * dt).collect();
        if *time_samples_stretch > twt_0.len() {
            *time_samples_stretch = twt_0.len();
        }
        debug!(stretch, nt_seis, time_samples_stretch = *time_samples_stretch, "NMO time axis");
        Ok(twt_0)
    }

    fn generate_z0_for_nmo(&self, twt_0: &[f64]) -> Vec<f64> {
        let g = &self.geometry;
        let nz = g.nz();
        let factor = 2.0 * twt_0[twt_0.len() - 1] / g.t_max;
        let pad = factor * self.wavelet.depth_adjustment(self.settings.const_vp[2]);
        let max_z = g.z_min + (nz as f64 - 1.0) * g.dz + pad;
        let min_z = g.z_min - pad;
        let nz_seis = ((max_z - min_z) / g.dz).ceil() as usize;
        (0..nz_seis).map(|i| min_z + (0.5 + i as f64) * g.dz).collect()
    }

    /// Shift-adjusted time axis: `twt_0` padded above and below by the
    /// extreme timeshift deltas at the deepest column.
    fn generate_twt0_shift(&self, twt_0_min: f64, n_samples: usize) -> Vec<f64> {
        let shift = self
            .twt_timeshift
            .as_ref()
            .expect("caller checked the timeshift cube");
        let (i_max, j_max, _) = self.find_max_twt_index();
        let k_max = shift.nk - 1;
        let delta_top = shift.get(i_max, j_max, 0) - self.twt_grid.get(i_max, j_max, 0);
        let delta_bot =
            shift.get(i_max, j_max, k_max) - self.twt_grid.get(i_max, j_max, self.twt_grid.nk - 1);

        let dt = self.geometry.dt;
        let n_top = if delta_top < 0.0 {
            ((-delta_top) / dt).ceil() as usize
        } else {
            0
        };
        let n_bot = if delta_bot > 0.0 {
            (delta_bot / dt).ceil() as usize
        } else {
            0
        };
        let total = n_top + n_samples + n_bot;
        let twts_min = twt_0_min - n_top as f64 * dt;
        (0..total).map(|k| twts_min + k as f64 * dt).collect()
    }

    /// Per-(layer, offset) PS incidence angles and leg offsets via the
    /// two-leg Snell solve. Returns the number of failed solves; failed
    /// entries stay at their previous value and the caller zeroes the trace.
    #[allow(clippy::too_many_arguments)]
    pub fn find_ps_nmo_theta_and_offset(
        &self,
        theta_grid: &mut Grid2,
        offset_down: &mut Grid2,
        offset_up: &mut Grid2,
        twt_pp_vec: &[f64],
        twt_ss_vec: &[f64],
        vrms_pp_vec: &[f64],
        vrms_ss_vec: &[f64],
        offsets: &[f64],
    ) -> usize {
        let mut failures = 0usize;
        for (off_idx, &offset) in offsets.iter().enumerate() {
            let mut start = (offset / (vrms_pp_vec[0] * twt_pp_vec[0] / ONE_WAY_MS))
                .atan()
                .min(0.99);
            for k in 0..twt_pp_vec.len() {
                let d_up = vrms_ss_vec[k] * twt_ss_vec[k] / TWO_WAY_MS;
                let d_down = vrms_pp_vec[k] * twt_pp_vec[k] / TWO_WAY_MS;
                let v_ratio = vrms_ss_vec[k] / vrms_pp_vec[k];
                match find_sin_theta_ps(start, offset, d_up, d_down, v_ratio) {
                    Some((y, _)) => {
                        let theta_down = y.asin();
                        let theta_up = (v_ratio * y).asin();
                        theta_grid.set(k, off_idx, theta_down);
                        offset_down.set(k, off_idx, theta_down.tan() * d_down);
                        offset_up.set(k, off_idx, theta_up.tan() * d_up);
                        start = y;
                    }
                    None => failures += 1,
                }
            }
        }
        if failures > 0 {
            warn!(failures, "PS Snell solves diverged; affected columns zeroed");
        }
        failures
    }

    /// Release the source grid after regridding.
    pub fn release_eclipse(&mut self) {
        self.eclipse = None;
    }

    /// Release vp/vs/rho and extra-parameter grids after trace synthesis.
    pub fn release_elastic_grids(&mut self) {
        self.vp_grid = Grid3::default();
        self.vs_grid = Grid3::default();
        self.rho_grid = Grid3::default();
        self.extra_grids.clear();
    }

    /// Release z, TWT and reflection grids after trace synthesis.
    pub fn release_time_grids(&mut self) {
        self.z_grid = Grid3::default();
        self.twt_grid = Grid3::default();
        self.twt_pp_grid = None;
        self.twt_ss_grid = None;
        self.r_grids.clear();
        self.twt_timeshift = None;
    }
}

/// NMO moveout: twt at `offset` given zero-offset `twt` and stacking
/// velocity `vrms`.
pub fn moveout(twt: f64, offset: f64, vrms: f64) -> f64 {
    (twt * twt + OFFSET_SCALE_SQ * offset * offset / (vrms * vrms)).sqrt()
}

/// Newton solve of the PS two-leg offset equation for y = sin(theta_down):
/// offset = dD*y/sqrt(1-y^2) + dU*vr*y/sqrt(1-vr^2*y^2).
///
/// Returns (y, iterations); `None` on a zero derivative. A step outside
/// [-1, 1] restarts from 0.1.
pub fn find_sin_theta_ps(
    start_value: f64,
    offset: f64,
    d_up: f64,
    d_down: f64,
    v_ratio: f64,
) -> Option<(f64, usize)> {
    let mut y_old = start_value;
    let mut y_new = start_value;
    for it in 0..SNELL_MAX_ITER {
        let y2 = y_old * y_old;
        let vr2y2 = v_ratio * v_ratio * y2;
        let f = -offset
            + d_down * y_old / (1.0 - y2).sqrt()
            + d_up * v_ratio * y_old / (1.0 - vr2y2).sqrt();
        let f_der = d_down / (1.0 - y2).powf(1.5) + d_up * v_ratio / (1.0 - vr2y2).powf(1.5);
        if f_der == 0.0 || !f_der.is_finite() {
            return None;
        }
        y_new = y_old - f / f_der;
        if y_new.abs() > 1.0 {
            y_new = 0.1;
        }
        if (y_new - y_old).abs() < SNELL_TOLERANCE {
            return Some((y_new, it + 1));
        }
        y_old = y_new;
    }
    Some((y_new, SNELL_MAX_ITER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moveout_is_identity_at_zero_offset() {
        assert_eq!(moveout(1200.0, 0.0, 2500.0), 1200.0);
    }

    #[test]
    fn snell_matches_forward_equation() {
        let d_down = 1500.0;
        let d_up = 900.0;
        let v_ratio = 0.55;
        let offset = 800.0;
        let (y, _) = find_sin_theta_ps(0.1, offset, d_up, d_down, v_ratio).unwrap();
        let reconstructed = d_down * y / (1.0 - y * y).sqrt()
            + d_up * v_ratio * y / (1.0 - v_ratio * v_ratio * y * y).sqrt();
        assert!((reconstructed - offset).abs() < 1e-3, "offset = {reconstructed}");
    }

    #[test]
    fn snell_derivative_matches_finite_difference() {
        let d_down = 1500.0;
        let d_up = 900.0;
        let vr = 0.55;
        let f = |y: f64| {
            d_down * y / (1.0 - y * y).sqrt() + d_up * vr * y / (1.0 - vr * vr * y * y).sqrt()
        };
        for y in [0.05, 0.2, 0.4, 0.6] {
            let h = 1e-7;
            let numeric = (f(y + h) - f(y - h)) / (2.0 * h);
            let vr2y2 = vr * vr * y * y;
            let analytic =
                d_down / (1.0 - y * y).powf(1.5) + d_up * vr / (1.0 - vr2y2).powf(1.5);
            assert!(
                ((numeric - analytic) / numeric).abs() < 1e-6,
                "y = {y}: numeric {numeric}, analytic {analytic}"
            );
        }
    }

    #[test]
    fn snell_zero_offset_solution_is_zero() {
        let (y, _) = find_sin_theta_ps(0.1, 0.0, 900.0, 1500.0, 0.55).unwrap();
        assert!(y.abs() < 1e-6);
    }
}
