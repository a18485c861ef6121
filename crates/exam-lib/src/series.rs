//! Numeric helpers over counter time series
//!
//! Rates are derived from cumulative counters as successive differences
//! divided by elapsed time, one value per interval of the time grid.

/// Time derivative of a cumulative counter
pub fn rate(values: &[f64], t: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .zip(t.windows(2))
        .map(|(v, t)| (v[1] - v[0]) / (t[1] - t[0]))
        .collect()
}

/// Scaled time derivative, e.g. CAS counts to bytes
pub fn scaled_rate(values: &[f64], t: &[f64], scale: f64) -> Vec<f64> {
    rate(values, t).into_iter().map(|r| r * scale).collect()
}

/// Interval midpoints of a time grid
pub fn midpoints(t: &[f64]) -> Vec<f64> {
    t.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
}

/// Mean over the finite samples, NaN when there are none
pub fn robust_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0f64, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        return f64::NAN;
    }
    sum / count as f64
}

/// Sample standard deviation (Bessel's correction) over the finite samples
pub fn robust_std(values: &[f64]) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return f64::NAN;
    }
    let mean = finite.iter().sum::<f64>() / finite.len() as f64;
    let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
        / (finite.len() - 1) as f64;
    variance.sqrt()
}

/// Trapezoidal integral of `y` over `x`
pub fn trapz(y: &[f64], x: &[f64]) -> f64 {
    y.windows(2)
        .zip(x.windows(2))
        .map(|(y, x)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
        .sum()
}

/// Element-wise maximum across series, starting from zero
pub fn max_across<'a, I>(series: I, len: usize) -> Vec<f64>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let mut out = vec![0.0f64; len];
    for s in series {
        for (acc, v) in out.iter_mut().zip(s) {
            *acc = acc.max(*v);
        }
    }
    out
}

/// Element-wise minimum across series, starting from a very large value
pub fn min_across<'a, I>(series: I, len: usize) -> Vec<f64>
where
    I: IntoIterator<Item = &'a [f64]>,
{
    let mut out = vec![1e100f64; len];
    for s in series {
        for (acc, v) in out.iter_mut().zip(s) {
            *acc = acc.min(*v);
        }
    }
    out
}

/// Element-wise sum of `addend` into `acc`
pub fn accumulate(acc: &mut [f64], addend: &[f64]) {
    for (a, v) in acc.iter_mut().zip(addend) {
        *a += v;
    }
}

/// Largest finite value, NaN when there is none
pub fn finite_max(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NAN, f64::max)
}
