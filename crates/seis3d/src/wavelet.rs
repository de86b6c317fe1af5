//! Seismic wavelets.
//!
//! The convolution kernel of the trace synthesiser. A wavelet is evaluated
//! at a TWT offset from its centre (ms) and advertises a half-window beyond
//! which it is treated as zero; the same half-window, converted through a
//! velocity, pads the depth surfaces.

use serde::{Deserialize, Serialize};

use crate::constants::TWO_WAY_MS;

/// Ricker or tabulated wavelet.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Wavelet {
    /// Analytic Ricker wavelet.
    Ricker {
        /// Peak frequency in Hz.
        peak_frequency: f64,
    },
    /// Sampled wavelet read from file; `times` are ms relative to centre and
    /// must be strictly increasing.
    Tabulated {
        /// Sample positions (ms, centre at 0).
        times: Vec<f64>,
        /// Amplitudes at `times`.
        amplitudes: Vec<f64>,
    },
}

impl Wavelet {
    /// Ricker wavelet at the given peak frequency.
    pub fn ricker(peak_frequency: f64) -> Self {
        Wavelet::Ricker { peak_frequency }
    }

    /// Amplitude at `dt` ms from the wavelet centre.
    pub fn find_wavelet_point(&self, dt: f64) -> f64 {
        match self {
            Wavelet::Ricker { peak_frequency } => {
                let t = dt / 1000.0;
                let arg = std::f64::consts::PI * peak_frequency * t;
                let arg2 = arg * arg;
                (1.0 - 2.0 * arg2) * (-arg2).exp()
            }
            Wavelet::Tabulated { times, amplitudes } => {
                if times.is_empty() || dt < times[0] || dt > times[times.len() - 1] {
                    return 0.0;
                }
                let hi = times.partition_point(|&v| v < dt).clamp(1, times.len() - 1);
                let lo = hi - 1;
                let span = times[hi] - times[lo];
                if span <= 0.0 {
                    return amplitudes[lo];
                }
                let t = (dt - times[lo]) / span;
                amplitudes[lo] * (1.0 - t) + amplitudes[hi] * t
            }
        }
    }

    /// TWT half-window in ms; samples farther than this from a reflector do
    /// not receive energy from it.
    pub fn twt_length(&self) -> f64 {
        match self {
            // A Ricker at peak frequency f is below ~1e-9 of its peak for
            // |t| > 1.5/f seconds.
            Wavelet::Ricker { peak_frequency } => 1000.0 * 1.5 / peak_frequency,
            Wavelet::Tabulated { times, .. } => {
                if times.is_empty() {
                    0.0
                } else {
                    times[0].abs().max(times[times.len() - 1].abs())
                }
            }
        }
    }

    /// Depth padding (m) equivalent to the TWT half-window at velocity `v`.
    pub fn depth_adjustment(&self, v: f64) -> f64 {
        self.twt_length() * v / TWO_WAY_MS
    }
}
