//! # ephys-baseline
//!
//! Adaptive baseline (drift) correction for periodic physiological traces
//! such as calcium-imaging or voltage-dye recordings of beating cells.
//!
//! The corrector measures the beat spacing of a trace, sizes a sliding window
//! from it, takes a low quantile in each window as a sparse sample of the
//! drift, carries those samples back to full resolution with a configurable
//! regression and subtracts the result. Optionally the whole procedure is
//! repeated on its own residual until the per-pass correction becomes
//! negligible.
//!
//! - [`period`]: characteristic peak spacing, with a length-based fallback
//! - [`window`]: step and window sizing
//! - [`local_baseline`]: one quantile-sampling and regression pass
//! - [`correction`]: single-pass and iterative drivers, failure handling,
//!   batch correction
//! - [`simulation`]: synthetic traces with known drift
//!
//! ## Example
//!
//! ```
//! use ephys_baseline::{correct, CorrectionParameters};
//!
//! let t: Vec<f64> = (0..500).map(|i| i as f64).collect();
//! let y: Vec<f64> = t
//!     .iter()
//!     .map(|&ti| (2.0 * std::f64::consts::PI * ti / 25.0).sin() + 0.01 * ti)
//!     .collect();
//!
//! let result = correct(&t, &y, &CorrectionParameters::default()).unwrap();
//! assert_eq!(result.corrected.len(), y.len());
//! ```

#![allow(clippy::needless_range_loop)]
#![allow(clippy::too_many_arguments)]

pub mod parallel;

pub mod correction;
pub mod diagnostics;
pub mod error;
pub mod helpers;
pub mod interpolate;
pub mod local_baseline;
pub mod params;
pub mod peaks;
pub mod period;
pub mod signal;
pub mod simulation;
pub mod window;

// Re-export the correction entry points
pub use correction::{
    correct, correct_batch, BaselineCorrector, CorrectionReport, CorrectionResult, DriftSummary,
    PassSummary,
};

pub use error::{CorrectionError, Result};
pub use helpers::NUMERICAL_EPS;
pub use params::{
    CorrectionParameters, DistanceStatistic, ExtremaSign, RegressionMethod, Strategy,
    MAX_POLYNOMIAL_ORDER,
};
pub use signal::Signal;

// Collaborators
pub use diagnostics::{DiagnosticLevel, DiagnosticSink, NullSink, TracingSink};
pub use peaks::{PeakLocator, SelectivePeakFinder};

// Stage outputs
pub use local_baseline::{BaselineSample, PassResult};
pub use period::{DistanceSource, PeakDistance};
pub use window::WindowPlan;

pub use simulation::{Drift, SyntheticTrace, TraceSpec};
