//! Characteristic peak spacing.
//!
//! The corrector sizes its windows from the beat spacing of the trace. The
//! spacing is measured on a linearly detrended copy so a steep drift in either
//! direction does not bury the peaks. When fewer than [`MIN_PEAK_COUNT`] peaks
//! are found the spacing falls back to a fraction of the signal length.

use crate::error::{CorrectionError, Result};
use crate::helpers::{detrend_linear, mean, median};
use crate::params::{CorrectionParameters, DistanceStatistic};
use crate::peaks::PeakLocator;

/// Fewest peaks from which a spacing is trusted.
pub const MIN_PEAK_COUNT: usize = 3;

/// Where a peak distance came from.
#[derive(Debug, Clone, PartialEq)]
pub enum DistanceSource {
    /// Measured from this many detected peaks.
    Detected { peaks: usize },
    /// Derived from the signal length because detection failed.
    Fallback { reason: CorrectionError },
}

/// Characteristic spacing between successive peaks, in samples.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakDistance {
    /// Always at least 1.
    pub samples: usize,
    pub source: DistanceSource,
}

impl PeakDistance {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, DistanceSource::Fallback { .. })
    }
}

/// Estimate the peak spacing of `values`, falling back to the
/// length-proportional default when detection fails.
///
/// # Arguments
/// * `locations` - Sample positions, used for the linear detrend
/// * `values` - Signal (the raw trace or the current residual)
/// * `params` - Peak-finder ratios, extrema sign and distance statistic
/// * `locator` - Peak-finding capability
pub fn estimate_peak_distance(
    locations: &[f64],
    values: &[f64],
    params: &CorrectionParameters,
    locator: &dyn PeakLocator,
) -> PeakDistance {
    match detected_peak_distance(locations, values, params, locator) {
        Ok((samples, peaks)) => PeakDistance {
            samples,
            source: DistanceSource::Detected { peaks },
        },
        Err(reason) => PeakDistance {
            samples: default_peak_distance(values.len(), params),
            source: DistanceSource::Fallback { reason },
        },
    }
}

/// Spacing from detected peaks, plus the number of peaks it was built from.
fn detected_peak_distance(
    locations: &[f64],
    values: &[f64],
    params: &CorrectionParameters,
    locator: &dyn PeakLocator,
) -> Result<(usize, usize)> {
    let detrended = detrend_linear(locations, values);
    let peaks = locator.find_peaks(
        &detrended,
        params.selectivity_ratio,
        params.threshold_ratio,
        params.extrema_sign,
    )?;
    if peaks.len() < MIN_PEAK_COUNT {
        return Err(CorrectionError::Estimation(format!(
            "found {} peaks, need at least {}",
            peaks.len(),
            MIN_PEAK_COUNT
        )));
    }

    let mut spacings: Vec<f64> = peaks
        .windows(2)
        .filter(|w| w[1] > w[0])
        .map(|w| (w[1] - w[0]) as f64)
        .collect();
    if spacings.is_empty() {
        return Err(CorrectionError::Estimation(
            "peak locator returned no increasing indices".to_string(),
        ));
    }
    spacings.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let spacing = match params.distance_statistic {
        DistanceStatistic::Median => median(&spacings),
        DistanceStatistic::Mean => mean(&spacings),
    };
    Ok(((spacing.round() as usize).max(1), peaks.len()))
}

/// Length-proportional peak distance used when detection fails.
///
/// `ceil(len * default_distance_factor)`, raised when needed so that
/// `round(distance * step_size_factor)` reaches `min_step_size`.
pub fn default_peak_distance(signal_len: usize, params: &CorrectionParameters) -> usize {
    let mut distance = (signal_len as f64 * params.default_distance_factor).ceil();
    let min_step = params.min_step_size.max(1) as f64;
    if (distance * params.step_size_factor).round() < min_step {
        distance = (min_step / params.step_size_factor).ceil();
    }
    if distance.is_finite() && distance >= 1.0 {
        distance as usize
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ExtremaSign;
    use crate::peaks::SelectivePeakFinder;
    use std::f64::consts::PI;

    /// Returns a fixed index list regardless of the signal.
    struct FixedPeaks(Vec<usize>);

    impl PeakLocator for FixedPeaks {
        fn find_peaks(&self, _: &[f64], _: f64, _: f64, _: ExtremaSign) -> Result<Vec<usize>> {
            Ok(self.0.clone())
        }
    }

    struct FailingLocator;

    impl PeakLocator for FailingLocator {
        fn find_peaks(&self, _: &[f64], _: f64, _: f64, _: ExtremaSign) -> Result<Vec<usize>> {
            Err(CorrectionError::Estimation("locator offline".to_string()))
        }
    }

    fn grid(m: usize) -> Vec<f64> {
        (0..m).map(|i| i as f64).collect()
    }

    #[test]
    fn test_sine_with_linear_drift() {
        let m = 600;
        let t = grid(m);
        let values: Vec<f64> = t
            .iter()
            .map(|&ti| (2.0 * PI * ti / 40.0).sin() + 0.02 * ti)
            .collect();
        let params = CorrectionParameters::default();
        let distance = estimate_peak_distance(&t, &values, &params, &SelectivePeakFinder::default());
        assert!(!distance.is_fallback(), "{:?}", distance.source);
        assert!(
            (distance.samples as i64 - 40).abs() <= 1,
            "distance {}",
            distance.samples
        );
    }

    #[test]
    fn test_median_ignores_outlier_spacing_mean_does_not() {
        let t = grid(200);
        let values = vec![0.0; 200];
        let locator = FixedPeaks(vec![10, 20, 30, 40, 130]);
        let params = CorrectionParameters::default();
        let med = estimate_peak_distance(&t, &values, &params, &locator);
        assert_eq!(med.samples, 10);
        assert_eq!(med.source, DistanceSource::Detected { peaks: 5 });

        let params = params.with_distance_statistic(DistanceStatistic::Mean);
        let avg = estimate_peak_distance(&t, &values, &params, &locator);
        // (10 + 10 + 10 + 90) / 4
        assert_eq!(avg.samples, 30);
    }

    #[test]
    fn test_too_few_peaks_falls_back() {
        let t = grid(1000);
        let values = vec![0.0; 1000];
        let params = CorrectionParameters::default();
        let distance = estimate_peak_distance(&t, &values, &params, &FixedPeaks(vec![100, 300]));
        assert!(distance.is_fallback());
        assert_eq!(distance.samples, 50);
    }

    #[test]
    fn test_locator_error_falls_back() {
        let t = grid(400);
        let values = vec![1.0; 400];
        let params = CorrectionParameters::default();
        let distance = estimate_peak_distance(&t, &values, &params, &FailingLocator);
        match distance.source {
            DistanceSource::Fallback {
                reason: CorrectionError::Estimation(msg),
            } => assert!(msg.contains("offline")),
            other => panic!("unexpected source {:?}", other),
        }
        assert_eq!(distance.samples, 20);
    }

    #[test]
    fn test_default_distance_scaled_to_reach_min_step() {
        let params = CorrectionParameters {
            min_step_size: 10,
            step_size_factor: 0.5,
            ..CorrectionParameters::default()
        };
        // ceil(40 * 0.05) = 2 -> step 1 < 10 -> 10 / 0.5 = 20
        assert_eq!(default_peak_distance(40, &params), 20);
        // ceil(2000 * 0.05) = 100 -> step 50 already legal
        assert_eq!(default_peak_distance(2000, &params), 100);
    }

    #[test]
    fn test_default_distance_at_least_one() {
        let params = CorrectionParameters {
            min_step_size: 0,
            default_distance_factor: 1e-6,
            ..CorrectionParameters::default()
        };
        assert!(default_peak_distance(2, &params) >= 1);
    }
}
