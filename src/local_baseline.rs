//! Local low-quantile baseline estimation.
//!
//! One estimation pass:
//! 1. Partition the signal into overlapping windows (see [`WindowPlan::spans`]).
//! 2. Take the low quantile of the values in each window. Beneath transient
//!    peaks this is the floor of the signal, i.e. the drift at that window.
//! 3. Place that value at the window center, giving a sparse sample set.
//! 4. Carry the samples to every original location with the configured
//!    [`RegressionMethod`].
//! 5. Subtract: `corrected[i] = values[i] - baseline[i]`.

use crate::error::{CorrectionError, Result};
use crate::helpers::quantile;
use crate::interpolate::interpolate;
use crate::params::RegressionMethod;
use crate::window::WindowPlan;

/// Sparse drift sample taken from one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineSample {
    /// Window center (midpoint of its first and last location).
    pub location: f64,
    /// Low quantile of the window's values.
    pub value: f64,
}

/// Outcome of one estimation pass.
///
/// `corrected[i] + baseline_delta[i] == input[i]` and all vectors have the
/// input's length.
#[derive(Debug, Clone, PartialEq)]
pub struct PassResult {
    pub corrected: Vec<f64>,
    pub baseline_delta: Vec<f64>,
    /// The per-window samples the baseline was interpolated from.
    pub samples: Vec<BaselineSample>,
}

/// Sample the low quantile of each window.
///
/// # Errors
/// [`CorrectionError::Regression`] when a window is empty, holds a non-finite
/// sample, or spans more than one sample at a single location.
pub fn sample_windows(
    locations: &[f64],
    values: &[f64],
    plan: WindowPlan,
    quantile_value: f64,
) -> Result<Vec<BaselineSample>> {
    let n = values.len();
    plan.validate(n)?;

    plan.spans(n)
        .into_iter()
        .enumerate()
        .map(|(w, span)| {
            if span.is_empty() {
                return Err(CorrectionError::Regression(format!(
                    "window {} at {:?} is empty",
                    w, span
                )));
            }
            let locs = &locations[span.clone()];
            let vals = &values[span.clone()];
            if vals.iter().chain(locs.iter()).any(|v| !v.is_finite()) {
                return Err(CorrectionError::Regression(format!(
                    "window {} at {:?} holds a non-finite sample",
                    w, span
                )));
            }
            let first = locs[0];
            let last = locs[locs.len() - 1];
            if locs.len() > 1 && last <= first {
                return Err(CorrectionError::Regression(format!(
                    "window {} at {:?} has zero location spread",
                    w, span
                )));
            }
            Ok(BaselineSample {
                location: 0.5 * (first + last),
                value: quantile(vals, quantile_value),
            })
        })
        .collect()
}

/// Run one local-baseline pass over `(locations, values)`.
///
/// # Arguments
/// * `locations` - Sample positions, non-decreasing
/// * `values` - Signal to correct
/// * `plan` - Window stride and width
/// * `quantile_value` - Low quantile taken inside each window
/// * `method` - How the sparse samples are carried to full resolution
pub fn estimate_pass(
    locations: &[f64],
    values: &[f64],
    plan: WindowPlan,
    quantile_value: f64,
    method: RegressionMethod,
) -> Result<PassResult> {
    let n = values.len();
    if locations.len() != n {
        return Err(CorrectionError::Regression(format!(
            "{} locations for {} values",
            locations.len(),
            n
        )));
    }

    let samples = sample_windows(locations, values, plan, quantile_value)?;
    let sample_x: Vec<f64> = samples.iter().map(|s| s.location).collect();
    let sample_y: Vec<f64> = samples.iter().map(|s| s.value).collect();
    let baseline_delta = interpolate(&sample_x, &sample_y, locations, method)?;

    if baseline_delta.len() != n {
        return Err(CorrectionError::Regression(format!(
            "baseline has {} points, signal has {}",
            baseline_delta.len(),
            n
        )));
    }
    if let Some(i) = baseline_delta.iter().position(|v| !v.is_finite()) {
        return Err(CorrectionError::Regression(format!(
            "baseline is non-finite at index {}",
            i
        )));
    }

    let corrected = values
        .iter()
        .zip(baseline_delta.iter())
        .map(|(v, b)| v - b)
        .collect();

    Ok(PassResult {
        corrected,
        baseline_delta,
        samples,
    })
}
