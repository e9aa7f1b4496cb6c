//! Correction parameters.
//!
//! [`CorrectionParameters`] is built once per invocation and read-only
//! afterwards. It derives serde with `#[serde(default)]` so a configuration
//! layer can deserialize partial documents and inherit the defaults.

use crate::error::{CorrectionError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Highest accepted order for [`RegressionMethod::Polynomial`].
pub const MAX_POLYNOMIAL_ORDER: usize = 9;

/// Method used to carry the sparse per-window baseline samples to every
/// original sample location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionMethod {
    /// Piecewise linear interpolation through the samples.
    Linear,
    /// Global least-squares polynomial of the given order.
    Polynomial(usize),
    /// Natural cubic spline through the samples.
    Spline,
    /// Shape-preserving piecewise cubic Hermite interpolation (PCHIP).
    PiecewiseCubicHermite,
}

impl RegressionMethod {
    /// Check that the method can be evaluated at all.
    pub fn validate(&self) -> Result<()> {
        match *self {
            RegressionMethod::Polynomial(order) if order == 0 || order > MAX_POLYNOMIAL_ORDER => {
                Err(CorrectionError::InvalidParameters(format!(
                    "polynomial order {} outside 1..={}",
                    order, MAX_POLYNOMIAL_ORDER
                )))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for RegressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegressionMethod::Linear => write!(f, "linear"),
            RegressionMethod::Polynomial(order) => write!(f, "polynomial({})", order),
            RegressionMethod::Spline => write!(f, "spline"),
            RegressionMethod::PiecewiseCubicHermite => write!(f, "pchip"),
        }
    }
}

impl FromStr for RegressionMethod {
    type Err = CorrectionError;

    /// Accepts `linear`, `spline`, `pchip`, `poly<N>` and `polynomial(<N>)`.
    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_lowercase();
        match name.as_str() {
            "linear" => return Ok(RegressionMethod::Linear),
            "spline" => return Ok(RegressionMethod::Spline),
            "pchip" | "piecewise_cubic_hermite" => {
                return Ok(RegressionMethod::PiecewiseCubicHermite)
            }
            _ => {}
        }
        let order = name
            .strip_prefix("polynomial(")
            .and_then(|rest| rest.strip_suffix(')'))
            .or_else(|| name.strip_prefix("poly"))
            .and_then(|digits| digits.parse::<usize>().ok())
            .ok_or_else(|| {
                CorrectionError::InvalidParameters(format!("unknown regression method '{}'", s))
            })?;
        let method = RegressionMethod::Polynomial(order);
        method.validate()?;
        Ok(method)
    }
}

/// Which extrema the peak locator looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtremaSign {
    /// Maxima (upward transients).
    Positive,
    /// Minima (downward transients, e.g. voltage dyes with negative response).
    Negative,
}

impl ExtremaSign {
    /// Create from `+1` / `-1`.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(ExtremaSign::Positive),
            -1 => Some(ExtremaSign::Negative),
            _ => None,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            ExtremaSign::Positive => 1.0,
            ExtremaSign::Negative => -1.0,
        }
    }
}

/// Single robust pass or multi-pass refinement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    SinglePass,
    Iterative,
}

/// Statistic used to summarize the inter-peak spacings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceStatistic {
    Median,
    Mean,
}

/// Parameters of one correction invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionParameters {
    /// Interpolation/regression of the sparse baseline samples.
    pub method: RegressionMethod,
    /// Minimum peak prominence as a fraction of the signal range.
    pub selectivity_ratio: f64,
    /// Minimum peak height above the signal minimum, as a fraction of the range.
    pub threshold_ratio: f64,
    pub extrema_sign: ExtremaSign,
    /// Low quantile taken inside each window, in (0, 1).
    pub quantile_value: f64,
    /// `step_size = round(peak_distance * step_size_factor)`.
    pub step_size_factor: f64,
    /// `window_size = round(step_size * window_size_factor)`. With the default
    /// step factor of 0.5, the default of 2.0 makes each window span one peak
    /// distance, so every window holds the same share of the waveform.
    pub window_size_factor: f64,
    pub min_step_size: usize,
    pub min_window_size: usize,
    /// Upper bound on `signal_len / step_size`.
    pub max_num_windows: usize,
    /// Maximum number of passes in [`Strategy::Iterative`].
    pub iteration_cap: usize,
    /// Stop iterating once a pass corrects at most this percentage of the
    /// first pass's amplitude.
    pub convergence_fit_threshold: f64,
    pub strategy: Strategy,
    pub distance_statistic: DistanceStatistic,
    /// Fallback peak distance as a fraction of the signal length.
    pub default_distance_factor: f64,
}

impl Default for CorrectionParameters {
    fn default() -> Self {
        Self {
            method: RegressionMethod::PiecewiseCubicHermite,
            selectivity_ratio: 0.25,
            threshold_ratio: 0.0,
            extrema_sign: ExtremaSign::Positive,
            quantile_value: 0.05,
            step_size_factor: 0.5,
            window_size_factor: 2.0,
            min_step_size: 2,
            min_window_size: 4,
            max_num_windows: 500,
            iteration_cap: 10,
            convergence_fit_threshold: 5.0,
            strategy: Strategy::SinglePass,
            distance_statistic: DistanceStatistic::Median,
            default_distance_factor: 0.05,
        }
    }
}

impl CorrectionParameters {
    /// Defaults with [`Strategy::Iterative`].
    pub fn iterative() -> Self {
        Self {
            strategy: Strategy::Iterative,
            ..Self::default()
        }
    }

    pub fn with_method(mut self, method: RegressionMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_quantile(mut self, quantile_value: f64) -> Self {
        self.quantile_value = quantile_value;
        self
    }

    pub fn with_extrema_sign(mut self, extrema_sign: ExtremaSign) -> Self {
        self.extrema_sign = extrema_sign;
        self
    }

    pub fn with_iteration_cap(mut self, iteration_cap: usize) -> Self {
        self.iteration_cap = iteration_cap;
        self
    }

    pub fn with_convergence_fit_threshold(mut self, percent: f64) -> Self {
        self.convergence_fit_threshold = percent;
        self
    }

    pub fn with_distance_statistic(mut self, statistic: DistanceStatistic) -> Self {
        self.distance_statistic = statistic;
        self
    }

    pub fn with_window_factors(mut self, step_size_factor: f64, window_size_factor: f64) -> Self {
        self.step_size_factor = step_size_factor;
        self.window_size_factor = window_size_factor;
        self
    }

    /// Check every field against its legal range.
    pub fn validate(&self) -> Result<()> {
        self.method.validate()?;

        let invalid = |msg: String| Err(CorrectionError::InvalidParameters(msg));
        if !(self.quantile_value > 0.0 && self.quantile_value < 1.0) {
            return invalid(format!(
                "quantile_value {} must lie in (0, 1)",
                self.quantile_value
            ));
        }
        if !(0.0..=1.0).contains(&self.selectivity_ratio) {
            return invalid(format!(
                "selectivity_ratio {} must lie in [0, 1]",
                self.selectivity_ratio
            ));
        }
        if !(0.0..=1.0).contains(&self.threshold_ratio) {
            return invalid(format!(
                "threshold_ratio {} must lie in [0, 1]",
                self.threshold_ratio
            ));
        }
        for (name, value) in [
            ("step_size_factor", self.step_size_factor),
            ("window_size_factor", self.window_size_factor),
            ("default_distance_factor", self.default_distance_factor),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return invalid(format!("{} {} must be positive and finite", name, value));
            }
        }
        if self.max_num_windows == 0 {
            return invalid("max_num_windows must be at least 1".to_string());
        }
        if self.iteration_cap == 0 {
            return invalid("iteration_cap must be at least 1".to_string());
        }
        if !(self.convergence_fit_threshold.is_finite() && self.convergence_fit_threshold >= 0.0)
        {
            return invalid(format!(
                "convergence_fit_threshold {} must be a non-negative percentage",
                self.convergence_fit_threshold
            ));
        }
        Ok(())
    }
}
