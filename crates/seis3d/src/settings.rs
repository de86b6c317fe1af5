//! Model settings.
//!
//! Immutable after load. The driver deserialises this from JSON; tests build
//! it in code starting from `Default` and overriding what the scenario needs.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_ZERO_THICKNESS_LIMIT;
use crate::error::{Result, SeisError};

/// Which seismic gates are written at the end of a run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OutputFlags {
    /// Prestack time gather, SEG-Y.
    pub time_segy: bool,
    /// Stacked time section, SEG-Y.
    pub time_stack_segy: bool,
    /// Prestack gather before NMO correction, SEG-Y.
    pub prenmo_segy: bool,
    /// Prestack depth gather, SEG-Y.
    pub depth_segy: bool,
    /// Stacked depth section, SEG-Y.
    pub depth_stack_segy: bool,
    /// Prestack timeshifted gather, SEG-Y.
    pub timeshift_segy: bool,
    /// Stacked timeshifted section, SEG-Y.
    pub timeshift_stack_segy: bool,
    /// Stacked time cube, STORM.
    pub time_storm: bool,
    /// Stacked depth cube, STORM.
    pub depth_storm: bool,
    /// Stacked timeshift cube, STORM.
    pub timeshift_storm: bool,
    /// RMS velocity cube(s), STORM.
    pub vrms: bool,
    /// Zero-offset reflection coefficients (and a noisy copy when white
    /// noise is on), STORM.
    pub reflections: bool,
    /// Vp/Vs/rho cubes, STORM.
    pub elastic_storm: bool,
    /// Reflector depth cube, STORM.
    pub zvalues_storm: bool,
    /// TWT cube, STORM.
    pub twt_storm: bool,
    /// Top/bottom reservoir depth surfaces.
    pub depth_surfaces: bool,
    /// Top/bottom time surfaces.
    pub time_surfaces: bool,
    /// Extra-parameter time gates, SEG-Y.
    pub extra_params_time_segy: bool,
    /// Extra-parameter depth gates, SEG-Y.
    pub extra_params_depth_segy: bool,
}

impl OutputFlags {
    /// Any time-domain seismic requested.
    pub fn any_time(&self) -> bool {
        self.time_segy || self.time_stack_segy || self.prenmo_segy || self.time_storm
    }

    /// Any depth-domain seismic requested.
    pub fn any_depth(&self) -> bool {
        self.depth_segy || self.depth_stack_segy || self.depth_storm
    }

    /// Any timeshifted seismic requested.
    pub fn any_timeshift(&self) -> bool {
        self.timeshift_segy || self.timeshift_stack_segy || self.timeshift_storm
    }

    /// Any stacked output requested.
    pub fn any_stack(&self) -> bool {
        self.time_stack_segy
            || self.depth_stack_segy
            || self.timeshift_stack_segy
            || self.any_storm_seismic()
    }

    /// Any seismic STORM cube requested.
    pub fn any_storm_seismic(&self) -> bool {
        self.time_storm || self.depth_storm || self.timeshift_storm
    }

    /// Any SEG-Y file requested; drives whether trace numbering comes from
    /// an acquisition geometry.
    pub fn any_segy(&self) -> bool {
        self.time_segy
            || self.time_stack_segy
            || self.prenmo_segy
            || self.depth_segy
            || self.depth_stack_segy
            || self.timeshift_segy
            || self.timeshift_stack_segy
            || self.extra_params_time_segy
            || self.extra_params_depth_segy
    }

    /// Anything at all to generate traces for.
    pub fn any_seismic(&self) -> bool {
        self.any_time() || self.any_depth() || self.any_timeshift()
    }
}

/// Optional explicit survey rectangle.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AreaSpec {
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
}

impl AreaSpec {
    /// Survey rectangle spanned by a surface raster (area-from-surface mode).
    pub fn from_surface(surface: &crate::surface::RegularSurface) -> Self {
        AreaSpec {
            x0: surface.x0,
            y0: surface.y0,
            lx: surface.dx * surface.nx as f64,
            ly: surface.dy * surface.ny as f64,
            angle: surface.angle,
        }
    }
}

/// Immutable run configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Elastic defaults: [overburden, reservoir default, underburden].
    pub const_vp: [f64; 3],
    /// S-velocity defaults, same layout as `const_vp`.
    pub const_vs: [f64; 3],
    /// Density defaults, same layout as `const_vp`.
    pub const_rho: [f64; 3],

    /// Water velocity (m/s).
    pub v_water: f64,
    /// Water depth (m).
    pub z_water: f64,

    /// Lateral sampling (m).
    pub dx: f64,
    /// Lateral sampling (m).
    pub dy: f64,
    /// Depth sampling (m).
    pub dz: f64,
    /// Time sampling (ms).
    pub dt: f64,

    /// First reflection angle (radians).
    pub theta_0: f64,
    /// Angle increment (radians); zero means a single angle.
    pub d_theta: f64,
    /// Last reflection angle (radians).
    pub theta_max: f64,

    /// First offset (m).
    pub offset_0: f64,
    /// Offset increment (m); zero means a single offset.
    pub d_offset: f64,
    /// Last offset (m).
    pub offset_max: f64,

    /// Generate offset gathers with NMO correction instead of angle gathers.
    pub nmo: bool,
    /// PS converted-wave mode instead of PP.
    pub ps_seismic: bool,
    /// Add white noise to reflection coefficients.
    pub white_noise: bool,
    /// Standard deviation of the reflection noise.
    pub noise_std_dev: f64,
    /// RNG seed; the per-trace seed is `seed + i + nx * j`.
    pub seed: u64,

    /// Use corner-point interpolation for layer surfaces.
    pub cornerpoint_interpolation: bool,
    /// Clamp negative layer thickness introduced by regridding.
    pub remove_negative_delta_z: bool,
    /// Fill below the reservoir with underburden defaults rather than
    /// extending the deepest regridded value.
    pub default_underburden: bool,
    /// Cells thinner than this inherit the value above.
    pub zero_thickness_limit: f64,

    /// Ricker peak frequency (Hz) when no tabulated wavelet is given.
    pub peak_frequency: f64,
    /// Scale applied to every wavelet sample during convolution.
    pub wavelet_scale: f64,

    /// Constant top reservoir time (ms) when no top-time surface is given.
    pub top_time_constant: f64,
    /// Optional top-time surface; `None` means the constant mode.
    pub top_time_surface: Option<String>,
    /// Optional timeshift cube path; dimensions must match (nx, ny, nzrefl).
    pub twt_timeshift_file: Option<String>,

    /// Explicit survey rectangle; `None` means derive from the grid.
    pub area: Option<AreaSpec>,

    /// Names of the vp/vs/rho parameters in the corner-point grid.
    pub parameter_names: [String; 3],
    /// Extra corner-point parameters to regrid alongside the elastic ones.
    pub extra_parameter_names: Vec<String>,
    /// Fill values for inactive cells, one per extra parameter.
    pub extra_parameter_defaults: Vec<f64>,

    /// Worker cap for both parallel phases.
    pub max_threads: usize,

    /// First inline number in SEG-Y headers.
    pub inline_start: i32,
    /// First crossline number in SEG-Y headers.
    pub xline_start: i32,
    /// Inline step in SEG-Y headers.
    pub inline_step: i32,
    /// Crossline step in SEG-Y headers.
    pub xline_step: i32,
    /// SEG-Y coordinate scalar.
    pub scalco: i16,
    /// Output file prefix.
    pub prefix: String,
    /// Output file suffix.
    pub suffix: String,

    /// Optional [top, bottom] time window (ms) for written traces.
    pub time_window: Option<[f64; 2]>,
    /// Optional [top, bottom] depth window (m) for written traces.
    pub depth_window: Option<[f64; 2]>,

    /// Which outputs to produce.
    pub output: OutputFlags,
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings {
            const_vp: [2500.0, 3500.0, 5000.0],
            const_vs: [1000.0, 2000.0, 3000.0],
            const_rho: [2.0, 2.2, 2.5],
            v_water: 1500.0,
            z_water: 0.0,
            dx: 25.0,
            dy: 25.0,
            dz: 4.0,
            dt: 4.0,
            theta_0: 0.0,
            d_theta: 0.0,
            theta_max: 0.0,
            offset_0: 0.0,
            d_offset: 0.0,
            offset_max: 0.0,
            nmo: false,
            ps_seismic: false,
            white_noise: false,
            noise_std_dev: 0.0,
            seed: 0,
            cornerpoint_interpolation: false,
            remove_negative_delta_z: true,
            default_underburden: false,
            zero_thickness_limit: DEFAULT_ZERO_THICKNESS_LIMIT,
            peak_frequency: 30.0,
            wavelet_scale: 1.0,
            top_time_constant: 1000.0,
            top_time_surface: None,
            twt_timeshift_file: None,
            area: None,
            parameter_names: ["VP".to_string(), "VS".to_string(), "RHO".to_string()],
            extra_parameter_names: Vec::new(),
            extra_parameter_defaults: Vec::new(),
            max_threads: 1,
            inline_start: 0,
            xline_start: 0,
            inline_step: 1,
            xline_step: 1,
            scalco: 1,
            prefix: String::new(),
            suffix: String::new(),
            time_window: None,
            depth_window: None,
            output: OutputFlags::default(),
        }
    }
}

impl ModelSettings {
    /// Validate ranges that would otherwise fail deep inside a phase.
    pub fn validate(&self) -> Result<()> {
        if self.dx <= 0.0 || self.dy <= 0.0 || self.dz <= 0.0 || self.dt <= 0.0 {
            return Err(SeisError::Config(
                "dx, dy, dz and dt must all be positive".to_string(),
            ));
        }
        if self.nmo && self.d_offset < 0.0 {
            return Err(SeisError::Config("offset increment is negative".to_string()));
        }
        if !self.nmo && self.d_theta < 0.0 {
            return Err(SeisError::Config("angle increment is negative".to_string()));
        }
        if self.extra_parameter_names.len() != self.extra_parameter_defaults.len() {
            return Err(SeisError::Config(
                "extra parameter names and defaults differ in length".to_string(),
            ));
        }
        if self.white_noise && self.noise_std_dev < 0.0 {
            return Err(SeisError::Config("noise deviation is negative".to_string()));
        }
        Ok(())
    }

    /// Reflection angles, one per gather column in angle mode.
    pub fn theta_vec(&self) -> Vec<f64> {
        if self.d_theta == 0.0 {
            return vec![self.theta_0];
        }
        let n = ((self.theta_max - self.theta_0) / self.d_theta + 1.01) as usize;
        (0..n).map(|i| self.theta_0 + i as f64 * self.d_theta).collect()
    }

    /// Source-receiver offsets, one per gather column in NMO mode.
    pub fn offset_vec(&self) -> Vec<f64> {
        if self.d_offset == 0.0 {
            return vec![self.offset_0];
        }
        let n = ((self.offset_max - self.offset_0) / self.d_offset) as usize + 1;
        (0..n).map(|i| self.offset_0 + i as f64 * self.d_offset).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn theta_span_counts_both_ends() {
        let settings = ModelSettings {
            theta_0: 0.0,
            d_theta: 0.1,
            theta_max: 0.3,
            ..Default::default()
        };
        let thetas = settings.theta_vec();
        assert_eq!(thetas.len(), 4);
        assert!((thetas[3] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn zero_increment_gives_single_column() {
        let settings = ModelSettings::default();
        assert_eq!(settings.theta_vec().len(), 1);
        assert_eq!(settings.offset_vec().len(), 1);
    }

    #[test]
    fn area_from_surface_spans_the_raster() {
        let s = crate::surface::RegularSurface::new(10.0, 20.0, 25.0, 50.0, 0.1, 4, 2, 0.0);
        let area = AreaSpec::from_surface(&s);
        assert_eq!(area.x0, 10.0);
        assert_eq!(area.y0, 20.0);
        assert_eq!(area.lx, 100.0);
        assert_eq!(area.ly, 100.0);
        assert_eq!(area.angle, 0.1);
    }

    #[test]
    fn validate_rejects_bad_sampling() {
        let settings = ModelSettings {
            dt: 0.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
