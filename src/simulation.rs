//! Synthetic optical traces.
//!
//! Generates calcium-like transient trains with a known drift so that
//! corrections can be scored against ground truth:
//! ```text
//! y(t) = Σ_k A (1 - exp(-(t - t_k)/τ_rise)) exp(-(t - t_k)/τ_decay) + d(t) + ε(t)
//! ```
//! where `t_k = k * period`, `d(t)` is the injected drift and
//! `ε ~ N(0, noise_sd²)`.

use crate::error::{CorrectionError, Result};
use crate::signal::Signal;
use rand::prelude::*;
use rand_distr::Normal;
use std::f64::consts::PI;

/// Slow drift added beneath the transients.
#[derive(Debug, Clone, PartialEq)]
pub enum Drift {
    None,
    /// `slope * t`
    Linear { slope: f64 },
    /// Settling: `amplitude * exp(-t / tau)`
    Exponential { amplitude: f64, tau: f64 },
    /// `amplitude * sin(2πt / period)`
    Sinusoidal { amplitude: f64, period: f64 },
    /// Sum of several drift terms, e.g. fast settling plus slow thermal drift.
    Compound(Vec<Drift>),
}

impl Drift {
    /// Drift value at time `t`.
    pub fn eval(&self, t: f64) -> f64 {
        match self {
            Drift::None => 0.0,
            Drift::Linear { slope } => slope * t,
            Drift::Exponential { amplitude, tau } => amplitude * (-t / tau).exp(),
            Drift::Sinusoidal { amplitude, period } => amplitude * (2.0 * PI * t / period).sin(),
            Drift::Compound(terms) => terms.iter().map(|d| d.eval(t)).sum(),
        }
    }
}

/// Shape of a synthetic trace.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceSpec {
    /// Number of samples.
    pub len: usize,
    /// Sampling interval.
    pub dt: f64,
    /// Beat period, in the same unit as `dt`. Zero or negative gives no beats.
    pub period: f64,
    pub amplitude: f64,
    pub rise_time: f64,
    pub decay_time: f64,
    pub noise_sd: f64,
    pub drift: Drift,
}

impl Default for TraceSpec {
    /// 20 s at 100 Hz, one beat per second, mild noise and no drift.
    fn default() -> Self {
        Self {
            len: 2000,
            dt: 0.01,
            period: 1.0,
            amplitude: 1.0,
            rise_time: 0.02,
            decay_time: 0.15,
            noise_sd: 0.01,
            drift: Drift::None,
        }
    }
}

/// A generated trace with its ground-truth components.
#[derive(Debug, Clone)]
pub struct SyntheticTrace {
    /// Transients + drift + noise.
    pub signal: Signal,
    /// The injected drift at every sample.
    pub drift: Vec<f64>,
    /// Transients alone, without drift or noise.
    pub transients: Vec<f64>,
}

/// Calcium transient starting at `t = 0`.
fn transient(t: f64, amplitude: f64, rise_time: f64, decay_time: f64) -> f64 {
    if t < 0.0 {
        return 0.0;
    }
    amplitude * (1.0 - (-t / rise_time).exp()) * (-t / decay_time).exp()
}

/// Generate a synthetic trace.
///
/// # Arguments
/// * `spec` - Trace shape
/// * `seed` - Optional random seed for the noise
///
/// # Errors
/// [`CorrectionError::InvalidParameters`] for a non-positive `dt` or time
/// constant, or an invalid noise level.
pub fn synthetic_trace(spec: &TraceSpec, seed: Option<u64>) -> Result<SyntheticTrace> {
    if !(spec.dt > 0.0 && spec.rise_time > 0.0 && spec.decay_time > 0.0) {
        return Err(CorrectionError::InvalidParameters(
            "dt, rise_time and decay_time must be positive".to_string(),
        ));
    }
    if !(spec.noise_sd.is_finite() && spec.noise_sd >= 0.0) {
        return Err(CorrectionError::InvalidParameters(format!(
            "noise_sd {} must be finite and non-negative",
            spec.noise_sd
        )));
    }
    let normal = Normal::new(0.0, spec.noise_sd)
        .map_err(|e| CorrectionError::InvalidParameters(format!("noise_sd: {}", e)))?;
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    // Contributions older than this are below 1e-6 of the peak.
    let tail = spec.decay_time * 14.0;

    let locations: Vec<f64> = (0..spec.len).map(|i| i as f64 * spec.dt).collect();
    let transients: Vec<f64> = locations
        .iter()
        .map(|&t| {
            if spec.period <= 0.0 {
                return 0.0;
            }
            let last_beat = (t / spec.period).floor() as i64;
            let first_beat = ((t - tail) / spec.period).floor().max(0.0) as i64;
            (first_beat..=last_beat)
                .map(|k| {
                    transient(
                        t - k as f64 * spec.period,
                        spec.amplitude,
                        spec.rise_time,
                        spec.decay_time,
                    )
                })
                .sum()
        })
        .collect();
    let drift: Vec<f64> = locations.iter().map(|&t| spec.drift.eval(t)).collect();
    let values: Vec<f64> = transients
        .iter()
        .zip(drift.iter())
        .map(|(&s, &d)| s + d + rng.sample::<f64, _>(normal))
        .collect();

    Ok(SyntheticTrace {
        signal: Signal::new(locations, values)?,
        drift,
        transients,
    })
}
