//! Peak location.
//!
//! The corrector only needs peak *indices* to infer the beat spacing. It asks
//! for them through the [`PeakLocator`] capability so any prominence- or
//! threshold-based routine can be plugged in. [`SelectivePeakFinder`] is the
//! implementation used by default.

use crate::error::{CorrectionError, Result};
use crate::helpers::{amplitude, median, NUMERICAL_EPS};
use crate::params::ExtremaSign;

/// Capability for locating peaks in a 1D signal.
///
/// An `Err` (or, with `panic = "unwind"`, a panic) from an implementation is
/// treated by the corrector as a failed detection: the pass continues with
/// the default peak distance.
pub trait PeakLocator: Send + Sync {
    /// Return the ascending indices of the peaks of `signal`.
    ///
    /// # Arguments
    /// * `signal` - Samples, typically already linearly detrended
    /// * `selectivity_ratio` - Minimum prominence as a fraction of the signal range
    /// * `threshold_ratio` - Minimum height above the signal minimum, as a fraction of the range
    /// * `extrema_sign` - Whether maxima or minima are wanted
    fn find_peaks(
        &self,
        signal: &[f64],
        selectivity_ratio: f64,
        threshold_ratio: f64,
        extrema_sign: ExtremaSign,
    ) -> Result<Vec<usize>>;
}

/// Prominence and threshold peak finder with a noise floor.
///
/// A candidate is any local extremum (plateaus report their middle sample).
/// It is kept when
/// - its prominence is at least `selectivity_ratio * range`,
/// - its height is at least `min + threshold_ratio * range`, and
/// - its prominence is at least `min_snr` times the noise level estimated
///   from the median absolute second difference.
///
/// The noise floor keeps pure noise from being read as a periodic train.
#[derive(Debug, Clone, Copy)]
pub struct SelectivePeakFinder {
    pub min_snr: f64,
}

impl Default for SelectivePeakFinder {
    fn default() -> Self {
        Self { min_snr: 10.0 }
    }
}

impl PeakLocator for SelectivePeakFinder {
    fn find_peaks(
        &self,
        signal: &[f64],
        selectivity_ratio: f64,
        threshold_ratio: f64,
        extrema_sign: ExtremaSign,
    ) -> Result<Vec<usize>> {
        let n = signal.len();
        if n < 3 {
            return Ok(Vec::new());
        }
        if let Some(i) = signal.iter().position(|v| !v.is_finite()) {
            return Err(CorrectionError::Estimation(format!(
                "non-finite sample at index {}",
                i
            )));
        }

        let sign = extrema_sign.as_f64();
        let work: Vec<f64> = signal.iter().map(|&v| sign * v).collect();

        let range = amplitude(&work);
        if range < NUMERICAL_EPS {
            return Ok(Vec::new());
        }
        let floor = work.iter().cloned().fold(f64::INFINITY, f64::min);
        let min_height = floor + threshold_ratio * range;
        let min_prominence =
            (selectivity_ratio * range).max(self.min_snr * noise_level(&work));

        let peaks = local_maxima(&work)
            .into_iter()
            .filter(|&idx| work[idx] >= min_height)
            .filter(|&idx| compute_prominence(&work, idx) >= min_prominence)
            .collect();
        Ok(peaks)
    }
}

/// Robust white-noise level from second differences.
///
/// `1.4826 * MAD / sqrt(6)`: for white noise the second difference has
/// variance `6 * sigma^2`, while slow signal content barely contributes.
fn noise_level(signal: &[f64]) -> f64 {
    if signal.len() < 3 {
        return 0.0;
    }
    let d2: Vec<f64> = signal
        .windows(3)
        .map(|w| w[2] - 2.0 * w[1] + w[0])
        .collect();
    let center = median(&d2);
    let abs_dev: Vec<f64> = d2.iter().map(|&d| (d - center).abs()).collect();
    1.4826 * median(&abs_dev) / 6.0_f64.sqrt()
}

/// Local maxima, with flat tops reported at their middle sample.
fn local_maxima(signal: &[f64]) -> Vec<usize> {
    let n = signal.len();
    let mut peaks = Vec::new();
    let mut i = 1;
    while i < n - 1 {
        if signal[i] > signal[i - 1] {
            let mut j = i;
            while j + 1 < n && signal[j + 1] == signal[i] {
                j += 1;
            }
            if j + 1 < n && signal[j + 1] < signal[i] {
                peaks.push((i + j) / 2);
            }
            i = j + 1;
        } else {
            i += 1;
        }
    }
    peaks
}

/// Height of a peak above the higher of its two surrounding valleys.
///
/// Each valley is the minimum between the peak and the nearest sample at
/// least as high as the peak (or the signal boundary). Samples tied with the
/// peak on either side belong to its flat top and are skipped first.
fn compute_prominence(signal: &[f64], peak_idx: usize) -> f64 {
    let peak_val = signal[peak_idx];

    let mut first = peak_idx;
    while first > 0 && signal[first - 1] == peak_val {
        first -= 1;
    }
    let mut last = peak_idx;
    while last + 1 < signal.len() && signal[last + 1] == peak_val {
        last += 1;
    }

    let mut left_min = peak_val;
    for &v in signal[..first].iter().rev() {
        if v >= peak_val {
            break;
        }
        left_min = left_min.min(v);
    }

    let mut right_min = peak_val;
    for &v in &signal[last + 1..] {
        if v >= peak_val {
            break;
        }
        right_min = right_min.min(v);
    }

    peak_val - left_min.max(right_min)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_distr::Normal;
    use std::f64::consts::PI;

    fn sine(m: usize, period: f64) -> Vec<f64> {
        (0..m)
            .map(|i| (2.0 * PI * i as f64 / period).sin())
            .collect()
    }

    #[test]
    fn test_sine_peaks_are_one_period_apart() {
        let signal = sine(500, 50.0);
        let peaks = SelectivePeakFinder::default()
            .find_peaks(&signal, 0.25, 0.0, ExtremaSign::Positive)
            .unwrap();
        assert_eq!(peaks.len(), 10, "peaks: {:?}", peaks);
        for w in peaks.windows(2) {
            assert!(((w[1] - w[0]) as i64 - 50).abs() <= 1, "spacing {:?}", w);
        }
        // sin peaks at period / 4
        assert!((peaks[0] as i64 - 12).abs() <= 1, "first peak {}", peaks[0]);
    }

    #[test]
    fn test_negative_sign_finds_troughs() {
        let signal = sine(500, 50.0);
        let troughs = SelectivePeakFinder::default()
            .find_peaks(&signal, 0.25, 0.0, ExtremaSign::Negative)
            .unwrap();
        assert_eq!(troughs.len(), 10);
        assert!((troughs[0] as i64 - 37).abs() <= 1, "first trough {}", troughs[0]);
    }

    #[test]
    fn test_threshold_ratio_drops_low_peaks() {
        // Alternating tall and short bumps
        let mut signal = vec![0.0; 200];
        for k in 0..10 {
            let center = 10 + 20 * k;
            let height = if k % 2 == 0 { 10.0 } else { 3.0 };
            for d in 0..5usize {
                let h = height * (1.0 - d as f64 / 5.0);
                signal[center + d] = h;
                signal[center - d] = h;
            }
        }
        let finder = SelectivePeakFinder::default();
        let all = finder
            .find_peaks(&signal, 0.1, 0.0, ExtremaSign::Positive)
            .unwrap();
        let tall = finder
            .find_peaks(&signal, 0.1, 0.5, ExtremaSign::Positive)
            .unwrap();
        assert_eq!(all.len(), 10);
        assert_eq!(tall.len(), 5);
    }

    #[test]
    fn test_plateau_reports_middle() {
        let signal = vec![0.0, 1.0, 5.0, 5.0, 5.0, 1.0, 0.0];
        let peaks = SelectivePeakFinder { min_snr: 0.0 }
            .find_peaks(&signal, 0.1, 0.0, ExtremaSign::Positive)
            .unwrap();
        assert_eq!(peaks, vec![3]);
    }

    #[test]
    fn test_flat_and_short_signals_have_no_peaks() {
        let finder = SelectivePeakFinder::default();
        assert!(finder
            .find_peaks(&[2.0; 50], 0.25, 0.0, ExtremaSign::Positive)
            .unwrap()
            .is_empty());
        assert!(finder
            .find_peaks(&[1.0, 2.0], 0.25, 0.0, ExtremaSign::Positive)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_white_noise_has_no_peaks() {
        let mut rng = StdRng::seed_from_u64(7);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let signal: Vec<f64> = (0..2000).map(|_| 5.0 + rng.sample(normal)).collect();
        let peaks = SelectivePeakFinder::default()
            .find_peaks(&signal, 0.25, 0.0, ExtremaSign::Positive)
            .unwrap();
        assert!(peaks.len() < 3, "noise produced {} peaks", peaks.len());
    }

    #[test]
    fn test_non_finite_is_estimation_error() {
        let mut signal = sine(100, 20.0);
        signal[40] = f64::NAN;
        let err = SelectivePeakFinder::default()
            .find_peaks(&signal, 0.25, 0.0, ExtremaSign::Positive)
            .unwrap_err();
        assert!(matches!(err, CorrectionError::Estimation(_)));
    }

    #[test]
    fn test_prominence_uses_higher_valley() {
        let signal = vec![0.0, 4.0, 2.0, 6.0, 1.0];
        // peak at 1: left valley 0, right valley 2 (stops at 6) -> 4 - 2
        assert!((compute_prominence(&signal, 1) - 2.0).abs() < 1e-12);
        // peak at 3: left valley 0, right valley 1 -> 6 - 1
        assert!((compute_prominence(&signal, 3) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_flat_top_prominence_measured_past_plateau() {
        let signal = vec![0.0, 1.0, 5.0, 5.0, 5.0, 1.0, 0.0];
        assert!((compute_prominence(&signal, 3) - 5.0).abs() < 1e-12);
        // two-sample tie, as a sampled sine produces when the crest falls
        // halfway between samples
        let signal = vec![0.0, 2.0, 3.0, 3.0, 1.0, 4.0, 0.5];
        assert!((compute_prominence(&signal, 2) - 2.0).abs() < 1e-12);
        assert!((compute_prominence(&signal, 3) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_tied_crests_keep_every_period() {
        // Crests at 12.5 + 50k: samples 12 and 13 tie exactly on each crest.
        let signal: Vec<f64> = (0..500)
            .map(|i| {
                let phase = (i % 50) as f64;
                (2.0 * PI * phase / 50.0).sin()
            })
            .collect();
        assert_eq!(signal[12], signal[13]);
        let peaks = SelectivePeakFinder::default()
            .find_peaks(&signal, 0.25, 0.0, ExtremaSign::Positive)
            .unwrap();
        assert_eq!(peaks, (0..10).map(|k| 12 + 50 * k).collect::<Vec<_>>());
    }
}
