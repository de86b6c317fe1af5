//! Shared sentinels and unit conversion factors.

/// Sentinel for undefined samples in grids and surfaces.
pub const MISSING: f64 = -999.0;

/// Two-way metres-to-milliseconds factor: twt = TWO_WAY_MS * dz / v.
pub const TWO_WAY_MS: f64 = 2000.0;

/// One-way metres-to-milliseconds factor.
pub const ONE_WAY_MS: f64 = 1000.0;

/// Offsets enter the moveout equation in km-compatible form, hence 1000^2.
pub const OFFSET_SCALE_SQ: f64 = 1000.0 * 1000.0;

/// Cells thinner than this are treated as zero-thickness (collapsed) cells.
pub const DEFAULT_ZERO_THICKNESS_LIMIT: f64 = 1e-6;

/// Convergence tolerance for the PS Snell solver.
pub const SNELL_TOLERANCE: f64 = 1e-5;

/// Iteration cap for the PS Snell solver.
pub const SNELL_MAX_ITER: usize = 10;
