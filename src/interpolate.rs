//! Carry sparse baseline samples to full resolution.
//!
//! This module provides the four regression methods of [`RegressionMethod`]:
//! - Piecewise linear interpolation
//! - PCHIP (shape-preserving piecewise cubic Hermite, Fritsch-Carlson slopes)
//! - Natural cubic spline
//! - Global least-squares polynomial (SVD solve)
//!
//! Interpolating methods pass exactly through the samples. Query points
//! outside the sample range are extrapolated with the boundary piece.

use crate::error::{CorrectionError, Result};
use crate::params::RegressionMethod;
use nalgebra::{DMatrix, DVector};

/// Evaluate the regression of `(x, y)` at every point of `x_new`.
///
/// # Arguments
/// * `x` - Sample locations, strictly increasing
/// * `y` - Sample values
/// * `x_new` - Query locations, in any order
/// * `method` - Regression method
///
/// # Errors
/// [`CorrectionError::Regression`] for empty, mismatched, non-finite or
/// non-increasing samples, too few samples for the polynomial order, or a
/// failed least-squares solve. [`CorrectionError::InvalidParameters`] for an
/// unusable method.
pub fn interpolate(
    x: &[f64],
    y: &[f64],
    x_new: &[f64],
    method: RegressionMethod,
) -> Result<Vec<f64>> {
    method.validate()?;
    check_samples(x, y)?;

    if x.len() == 1 && !matches!(method, RegressionMethod::Polynomial(_)) {
        return Ok(vec![y[0]; x_new.len()]);
    }

    match method {
        RegressionMethod::Linear => Ok(linear(x, y, x_new)),
        RegressionMethod::PiecewiseCubicHermite => Ok(pchip(x, y, x_new)),
        RegressionMethod::Spline => Ok(natural_spline(x, y, x_new)),
        RegressionMethod::Polynomial(order) => polynomial(x, y, x_new, order),
    }
}

fn check_samples(x: &[f64], y: &[f64]) -> Result<()> {
    if x.is_empty() || x.len() != y.len() {
        return Err(CorrectionError::Regression(format!(
            "need matching non-empty samples, got {} locations and {} values",
            x.len(),
            y.len()
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(CorrectionError::Regression(
            "non-finite baseline sample".to_string(),
        ));
    }
    if let Some(k) = x.windows(2).position(|w| w[1] <= w[0]) {
        return Err(CorrectionError::Regression(format!(
            "sample locations not strictly increasing at {} ({} -> {})",
            k,
            x[k],
            x[k + 1]
        )));
    }
    Ok(())
}

/// Index `k` of the piece `[x[k], x[k+1]]` used for `xq`; clamped so points
/// outside the range use the boundary piece.
fn segment(x: &[f64], xq: f64) -> usize {
    let idx = x.partition_point(|&v| v <= xq);
    idx.saturating_sub(1).min(x.len() - 2)
}

fn linear(x: &[f64], y: &[f64], x_new: &[f64]) -> Vec<f64> {
    x_new
        .iter()
        .map(|&xq| {
            let k = segment(x, xq);
            let slope = (y[k + 1] - y[k]) / (x[k + 1] - x[k]);
            y[k] + slope * (xq - x[k])
        })
        .collect()
}

/// Cubic Hermite piece through `(x0, y0)`, `(x0 + h, y1)` with end slopes
/// `d0`, `d1`.
fn hermite(x0: f64, h: f64, y0: f64, y1: f64, d0: f64, d1: f64, xq: f64) -> f64 {
    let s = (xq - x0) / h;
    let s2 = s * s;
    let s3 = s2 * s;
    let h00 = 2.0 * s3 - 3.0 * s2 + 1.0;
    let h10 = s3 - 2.0 * s2 + s;
    let h01 = -2.0 * s3 + 3.0 * s2;
    let h11 = s3 - s2;
    h00 * y0 + h10 * h * d0 + h01 * y1 + h11 * h * d1
}

/// Sign as -1, 0 or 1 (`f64::signum` maps zero to 1).
fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Shape-preserving end slope from the two boundary intervals.
fn pchip_end_slope(h0: f64, h1: f64, del0: f64, del1: f64) -> f64 {
    let d = ((2.0 * h0 + h1) * del0 - h0 * del1) / (h0 + h1);
    if sign(d) != sign(del0) {
        0.0
    } else if sign(del0) != sign(del1) && d.abs() > (3.0 * del0).abs() {
        3.0 * del0
    } else {
        d
    }
}

fn pchip_slopes(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let del: Vec<f64> = (0..n - 1).map(|k| (y[k + 1] - y[k]) / h[k]).collect();

    if n == 2 {
        return vec![del[0], del[0]];
    }

    let mut d = vec![0.0; n];
    for k in 1..n - 1 {
        if del[k - 1] * del[k] > 0.0 {
            let w1 = 2.0 * h[k] + h[k - 1];
            let w2 = h[k] + 2.0 * h[k - 1];
            d[k] = (w1 + w2) / (w1 / del[k - 1] + w2 / del[k]);
        }
    }
    d[0] = pchip_end_slope(h[0], h[1], del[0], del[1]);
    d[n - 1] = pchip_end_slope(h[n - 2], h[n - 3], del[n - 2], del[n - 3]);
    d
}

fn pchip(x: &[f64], y: &[f64], x_new: &[f64]) -> Vec<f64> {
    let d = pchip_slopes(x, y);
    x_new
        .iter()
        .map(|&xq| {
            let k = segment(x, xq);
            hermite(x[k], x[k + 1] - x[k], y[k], y[k + 1], d[k], d[k + 1], xq)
        })
        .collect()
}

/// Second derivatives of the natural cubic spline (zero at both ends).
fn natural_spline_moments(x: &[f64], y: &[f64]) -> Vec<f64> {
    let n = x.len();
    let mut moments = vec![0.0; n];
    if n < 3 {
        return moments;
    }
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let del: Vec<f64> = (0..n - 1).map(|k| (y[k + 1] - y[k]) / h[k]).collect();

    // Tridiagonal system for the interior moments, solved by forward
    // elimination and back substitution.
    let m = n - 2;
    let mut diag: Vec<f64> = (0..m).map(|i| 2.0 * (h[i] + h[i + 1])).collect();
    let mut rhs: Vec<f64> = (0..m).map(|i| 6.0 * (del[i + 1] - del[i])).collect();
    for i in 1..m {
        let factor = h[i] / diag[i - 1];
        diag[i] -= factor * h[i];
        rhs[i] -= factor * rhs[i - 1];
    }
    moments[m] = rhs[m - 1] / diag[m - 1];
    for i in (0..m - 1).rev() {
        moments[i + 1] = (rhs[i] - h[i + 1] * moments[i + 2]) / diag[i];
    }
    moments
}

fn natural_spline(x: &[f64], y: &[f64], x_new: &[f64]) -> Vec<f64> {
    let moments = natural_spline_moments(x, y);
    x_new
        .iter()
        .map(|&xq| {
            let k = segment(x, xq);
            let h = x[k + 1] - x[k];
            let a = x[k + 1] - xq;
            let b = xq - x[k];
            moments[k] * a.powi(3) / (6.0 * h)
                + moments[k + 1] * b.powi(3) / (6.0 * h)
                + (y[k] / h - moments[k] * h / 6.0) * a
                + (y[k + 1] / h - moments[k + 1] * h / 6.0) * b
        })
        .collect()
}

fn build_vandermonde_matrix(t_norm: &[f64], n_coef: usize) -> DMatrix<f64> {
    let mut design = DMatrix::zeros(t_norm.len(), n_coef);
    for (j, &t) in t_norm.iter().enumerate() {
        let mut power = 1.0;
        for k in 0..n_coef {
            design[(j, k)] = power;
            power *= t;
        }
    }
    design
}

/// Least-squares polynomial over locations normalized to the sample range.
fn polynomial(x: &[f64], y: &[f64], x_new: &[f64], order: usize) -> Result<Vec<f64>> {
    let n_coef = order + 1;
    if x.len() < n_coef {
        return Err(CorrectionError::Regression(format!(
            "polynomial of order {} needs {} baseline samples, have {}",
            order,
            n_coef,
            x.len()
        )));
    }

    let t_min = x[0];
    let t_range = x[x.len() - 1] - t_min;
    let t_norm: Vec<f64> = x.iter().map(|&t| (t - t_min) / t_range).collect();
    let design = build_vandermonde_matrix(&t_norm, n_coef);
    let svd = design.svd(true, true);
    let beta = svd
        .solve(&DVector::from_row_slice(y), 1e-10)
        .map_err(|e| CorrectionError::Regression(format!("least-squares solve failed: {}", e)))?;

    Ok(x_new
        .iter()
        .map(|&xq| {
            let t = (xq - t_min) / t_range;
            // Horner
            beta.iter().rev().fold(0.0, |acc, &c| acc * t + c)
        })
        .collect())
}
