//! Numeric helpers shared by the correction stages.

/// Small epsilon for numerical comparisons (e.g., avoiding division by zero).
pub const NUMERICAL_EPS: f64 = 1e-10;

/// Arithmetic mean. Returns `NaN` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Median of the values. Returns `NaN` for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// Sample quantile with linear interpolation between order statistics.
///
/// Uses the `(n - 1) * q` position convention, so `q = 0` is the minimum and
/// `q = 1` the maximum. Returns `NaN` for an empty slice.
///
/// # Arguments
/// * `values` - Samples, in any order
/// * `q` - Quantile in \[0, 1\] (clamped)
pub fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Peak-to-peak amplitude, `max - min`. Zero for an empty slice.
pub fn amplitude(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let (lo, hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    hi - lo
}

/// Root mean square. Zero for an empty slice.
pub fn rms(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

/// Remove the least-squares line through `(locations, values)`.
///
/// Returns the residual. When the locations have no spread the slope is taken
/// as zero and only the mean is removed.
pub fn detrend_linear(locations: &[f64], values: &[f64]) -> Vec<f64> {
    let m = values.len();
    if m < 2 || locations.len() != m {
        return values.to_vec();
    }

    let mean_t = mean(locations);
    let mean_y = mean(values);
    let mut ss_t = 0.0;
    let mut sp = 0.0;
    for j in 0..m {
        let dt = locations[j] - mean_t;
        ss_t += dt * dt;
        sp += dt * (values[j] - mean_y);
    }
    let slope = if ss_t.abs() > 1e-15 { sp / ss_t } else { 0.0 };
    let intercept = mean_y - slope * mean_t;

    (0..m)
        .map(|j| values[j] - (intercept + slope * locations[j]))
        .collect()
}
