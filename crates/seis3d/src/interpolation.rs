//! 1D resampling used by the trace pipeline.
//!
//! Both entry points tolerate repeated support knots (plateaus in TWT-depth
//! pairs) by dropping duplicates before fitting, matching how the trace
//! synthesiser prepares its (twt, z) supports.

/// Linear interpolation of `(x_in, y_in)` onto `x_out`.
///
/// Outside the support the edge value is held constant. `x_in` must be
/// non-decreasing.
pub fn interpolate_linear(x_in: &[f64], y_in: &[f64], x_out: &[f64]) -> Vec<f64> {
    let (xs, ys) = dedup(x_in, y_in);
    let n = xs.len();
    let mut out = Vec::with_capacity(x_out.len());
    if n == 0 {
        out.resize(x_out.len(), 0.0);
        return out;
    }
    if n == 1 {
        out.resize(x_out.len(), ys[0]);
        return out;
    }
    for &x in x_out {
        if x <= xs[0] {
            out.push(ys[0]);
        } else if x >= xs[n - 1] {
            out.push(ys[n - 1]);
        } else {
            let hi = xs.partition_point(|&v| v < x).max(1);
            let lo = hi - 1;
            let t = (x - xs[lo]) / (xs[hi] - xs[lo]);
            out.push(ys[lo] * (1.0 - t) + ys[hi] * t);
        }
    }
    out
}

/// Natural cubic spline of `(x_in, y_in)` evaluated at `x_out`.
///
/// Points outside the support evaluate to `extrap_value`.
pub fn interpolate_spline(x_in: &[f64], y_in: &[f64], x_out: &[f64], extrap_value: f64) -> Vec<f64> {
    let (xs, ys) = dedup(x_in, y_in);
    let n = xs.len();
    if n < 2 {
        return x_out
            .iter()
            .map(|&x| if n == 1 && x == xs[0] { ys[0] } else { extrap_value })
            .collect();
    }

    let m = second_derivatives(&xs, &ys);
    x_out
        .iter()
        .map(|&x| {
            if x < xs[0] || x > xs[n - 1] {
                return extrap_value;
            }
            let hi = xs.partition_point(|&v| v < x).clamp(1, n - 1);
            let lo = hi - 1;
            let h = xs[hi] - xs[lo];
            let a = (xs[hi] - x) / h;
            let b = (x - xs[lo]) / h;
            a * ys[lo]
                + b * ys[hi]
                + ((a * a * a - a) * m[lo] + (b * b * b - b) * m[hi]) * h * h / 6.0
        })
        .collect()
}

/// Second derivatives for a natural spline (zero curvature at both ends).
fn second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut m = vec![0.0; n];
    if n < 3 {
        return m;
    }
    let mut u = vec![0.0; n - 1];
    for i in 1..n - 1 {
        let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
        let p = sig * m[i - 1] + 2.0;
        m[i] = (sig - 1.0) / p;
        let d = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i]) - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
        u[i] = (6.0 * d / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
    }
    for i in (0..n - 1).rev() {
        m[i] = m[i] * m[i + 1] + u[i];
    }
    m
}

fn dedup(x_in: &[f64], y_in: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut xs = Vec::with_capacity(x_in.len());
    let mut ys = Vec::with_capacity(y_in.len());
    for (idx, &x) in x_in.iter().enumerate() {
        if idx == 0 || x != x_in[idx - 1] {
            xs.push(x);
            ys.push(y_in[idx]);
        }
    }
    (xs, ys)
}
