//! Synthetic seismic forward modelling on corner-point reservoir grids.
//!
//! A run has two phases. Regridding maps the irregular corner-point grid of
//! elastic properties onto a regular rotated pillar grid by triangulated
//! ray-drop, then derives travel times and velocities. Trace synthesis walks
//! the survey, computing angle or offset gathers per position (Zoeppritz
//! reflections, wavelet convolution, optional NMO correction, depth
//! conversion and timeshift resampling) on a producer pool with a strictly
//! ordered writer.
//!
//! # Example
//!
//! ```no_run
//! use seis3d::eclipse::CornerPointGrid;
//! use seis3d::forward::{self, NullReporter};
//! use seis3d::session::Session;
//! use seis3d::settings::ModelSettings;
//!
//! let grid = CornerPointGrid::from_layer_depths(10, 10, 3, 0.0, 0.0, 100.0, 100.0, |_, _, h| {
//!     1000.0 + 50.0 * h as f64
//! });
//! # let mut grid = grid;
//! # let n = 10 * 10 * 3;
//! # grid.set_parameter("VP", vec![3000.0; n]);
//! # grid.set_parameter("VS", vec![1500.0; n]);
//! # grid.set_parameter("RHO", vec![2.2; n]);
//! let mut settings = ModelSettings::default();
//! settings.output.time_segy = true;
//! let mut session = Session::new(settings, grid, None, None)?;
//! seis3d::regrid::run(&mut session)?;
//! forward::run(&mut session, std::path::Path::new("out"), &mut NullReporter)?;
//! # Ok::<(), seis3d::error::SeisError>(())
//! ```

pub mod constants;
pub mod eclipse;
pub mod error;
pub mod forward;
pub mod geometry;
pub mod grid;
pub mod interpolation;
pub mod output;
pub mod regrid;
pub mod segy;
pub mod seismic_geometry;
pub mod session;
pub mod settings;
pub mod storm;
pub mod surface;
pub mod trace;
pub mod wavelet;
pub mod zoeppritz;

pub use eclipse::CornerPointGrid;
pub use error::{Result, SeisError};
pub use grid::{Grid2, Grid3};
pub use session::Session;
pub use settings::ModelSettings;
pub use surface::RegularSurface;
pub use wavelet::Wavelet;
