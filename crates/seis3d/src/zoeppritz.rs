//! Weak-contrast reflection coefficients.
//!
//! PP and PS variants of the Aki-Richards linearisation of the Zoeppritz
//! equations. `compute_constants` caches the angle-dependent terms so the
//! per-interface call only sees contrasts and means.

/// Reflection-coefficient evaluator for a fixed incidence angle.
pub trait ReflectionEvaluator {
    /// Cache the angle-dependent terms for `theta` (radians).
    fn compute_constants(&mut self, theta: f64);

    /// Reflection coefficient from interface contrasts and means.
    fn reflection(
        &self,
        d_vp: f64,
        mean_vp: f64,
        d_rho: f64,
        mean_rho: f64,
        d_vs: f64,
        mean_vs: f64,
    ) -> f64;
}

/// Build the evaluator matching the survey mode.
pub fn make_evaluator(ps_seismic: bool) -> Box<dyn ReflectionEvaluator + Send> {
    if ps_seismic {
        Box::new(ZoeppritzPs::default())
    } else {
        Box::new(ZoeppritzPp::default())
    }
}

/// PP reflection, Aki-Richards form:
/// R = (1 + tan^2 t)/2 * dvp/vp - 4 (vs/vp)^2 sin^2 t * dvs/vs
///   + (1 - 4 (vs/vp)^2 sin^2 t)/2 * drho/rho
#[derive(Clone, Debug, Default)]
pub struct ZoeppritzPp {
    sin2: f64,
    tan2: f64,
}

impl ReflectionEvaluator for ZoeppritzPp {
    fn compute_constants(&mut self, theta: f64) {
        let s = theta.sin();
        self.sin2 = s * s;
        let t = theta.tan();
        self.tan2 = t * t;
    }

    fn reflection(
        &self,
        d_vp: f64,
        mean_vp: f64,
        d_rho: f64,
        mean_rho: f64,
        d_vs: f64,
        mean_vs: f64,
    ) -> f64 {
        let k = mean_vs / mean_vp;
        let k2s = 4.0 * k * k * self.sin2;
        0.5 * (1.0 + self.tan2) * d_vp / mean_vp - k2s * d_vs / mean_vs
            + 0.5 * (1.0 - k2s) * d_rho / mean_rho
    }
}

/// PS converted-wave reflection, Aki-Richards form with the S angle phi
/// given by Snell's law, sin(phi) = (vs/vp) sin(theta).
#[derive(Clone, Debug, Default)]
pub struct ZoeppritzPs {
    sin_t: f64,
    cos_t: f64,
}

impl ReflectionEvaluator for ZoeppritzPs {
    fn compute_constants(&mut self, theta: f64) {
        self.sin_t = theta.sin();
        self.cos_t = theta.cos();
    }

    fn reflection(
        &self,
        _d_vp: f64,
        mean_vp: f64,
        d_rho: f64,
        mean_rho: f64,
        d_vs: f64,
        mean_vs: f64,
    ) -> f64 {
        let k = mean_vs / mean_vp;
        let sin_p = (k * self.sin_t).clamp(-1.0, 1.0);
        let cos_p = (1.0 - sin_p * sin_p).sqrt();
        if cos_p == 0.0 {
            return 0.0;
        }
        let cross = k * self.cos_t * cos_p;
        let front = -self.sin_t / (2.0 * cos_p);
        front
            * ((1.0 - 2.0 * sin_p * sin_p + 2.0 * cross) * d_rho / mean_rho
                - (4.0 * sin_p * sin_p - 4.0 * cross) * d_vs / mean_vs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pp_zero_offset_is_half_contrast_sum() {
        let mut z = ZoeppritzPp::default();
        z.compute_constants(0.0);
        let r = z.reflection(500.0, 2250.0, 0.2, 2.2, 200.0, 900.0);
        let expected = 0.5 * (500.0 / 2250.0 + 0.2 / 2.2);
        assert!((r - expected).abs() < 1e-12);
    }

    #[test]
    fn pp_angle_term_reduces_impedance_only_reflection() {
        let mut z = ZoeppritzPp::default();
        z.compute_constants(0.0);
        let r0 = z.reflection(0.0, 2250.0, 0.0, 2.2, 200.0, 900.0);
        assert!(r0.abs() < 1e-12);
        z.compute_constants(0.3);
        let r = z.reflection(0.0, 2250.0, 0.0, 2.2, 200.0, 900.0);
        // Pure vs contrast only shows at non-zero angle, with negative sign.
        assert!(r < 0.0);
    }

    #[test]
    fn ps_vanishes_at_zero_offset() {
        let mut z = ZoeppritzPs::default();
        z.compute_constants(0.0);
        let r = z.reflection(500.0, 2250.0, 0.2, 2.2, 200.0, 900.0);
        assert_eq!(r, 0.0);
    }

    #[test]
    fn ps_is_odd_in_angle() {
        let mut z = ZoeppritzPs::default();
        z.compute_constants(0.25);
        let r_pos = z.reflection(0.0, 2250.0, 0.2, 2.2, 100.0, 900.0);
        z.compute_constants(-0.25);
        let r_neg = z.reflection(0.0, 2250.0, 0.2, 2.2, 100.0, 900.0);
        assert!((r_pos + r_neg).abs() < 1e-12);
    }
}
