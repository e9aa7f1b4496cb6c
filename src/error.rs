//! Error taxonomy for baseline correction.
//!
//! Only [`CorrectionError::InputShape`] ever reaches a caller of
//! [`correct`](crate::correction::correct) as an `Err`. Every other variant is
//! produced by an internal stage, absorbed by the failure guard and recorded
//! on the [`CorrectionReport`](crate::correction::CorrectionReport).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CorrectionError {
    /// Malformed or mismatched input, rejected before any processing.
    #[error("invalid input shape: {reason}")]
    InputShape { reason: String },

    #[error("invalid correction parameters: {0}")]
    InvalidParameters(String),

    /// Peak detection failed or found too few peaks.
    #[error("peak-distance estimation failed: {0}")]
    Estimation(String),

    /// Local baseline estimation failed for the chosen window/step/method.
    #[error("baseline regression failed: {0}")]
    Regression(String),

    #[error(
        "illegal window plan: step {step_size}, window {window_size}, signal length {signal_len}"
    )]
    WindowSizing {
        step_size: usize,
        window_size: usize,
        signal_len: usize,
    },

    #[error(
        "iteration cap of {passes} passes reached; last correction was {last_ratio_percent:.2}% of the first"
    )]
    ConvergenceNotReached {
        passes: usize,
        last_ratio_percent: f64,
    },
}

impl CorrectionError {
    pub(crate) fn input_shape(reason: impl Into<String>) -> Self {
        CorrectionError::InputShape {
            reason: reason.into(),
        }
    }

    /// Short stable label, suitable for log fields and batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            CorrectionError::InputShape { .. } => "input_shape",
            CorrectionError::InvalidParameters(_) => "invalid_parameters",
            CorrectionError::Estimation(_) => "estimation",
            CorrectionError::Regression(_) => "regression",
            CorrectionError::WindowSizing { .. } => "window_sizing",
            CorrectionError::ConvergenceNotReached { .. } => "convergence_not_reached",
        }
    }
}

pub type Result<T> = std::result::Result<T, CorrectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_sizing_message_names_all_sizes() {
        let err = CorrectionError::WindowSizing {
            step_size: 8,
            window_size: 8,
            signal_len: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains("step 8"), "{}", msg);
        assert!(msg.contains("signal length 100"), "{}", msg);
        assert_eq!(err.kind(), "window_sizing");
    }

    #[test]
    fn test_convergence_message_formats_ratio() {
        let err = CorrectionError::ConvergenceNotReached {
            passes: 10,
            last_ratio_percent: 12.345,
        };
        assert!(err.to_string().contains("12.35%"));
    }
}
