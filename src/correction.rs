//! Adaptive baseline correction.
//!
//! Ties the stages together:
//! - peak spacing from the current residual ([`crate::period`])
//! - window plan from the spacing ([`crate::window`])
//! - one low-quantile baseline pass ([`crate::local_baseline`])
//!
//! In [`Strategy::SinglePass`] this runs once. In [`Strategy::Iterative`] the
//! residual of each pass is fed back in and the per-pass baselines are
//! accumulated until a pass corrects no more than `convergence_fit_threshold`
//! percent of the first pass's amplitude, or `iteration_cap` passes have run.
//!
//! Only malformed input is returned as an error. Any later failure is caught
//! here: the result keeps whatever successful passes came before it (the
//! identity when there were none) and the reason is recorded on the
//! [`CorrectionReport`].

use crate::diagnostics::{DiagnosticLevel, DiagnosticSink, TracingSink};
use crate::error::{CorrectionError, Result};
use crate::helpers::{amplitude, mean, rms, NUMERICAL_EPS};
use crate::local_baseline::{estimate_pass, PassResult};
use crate::params::{CorrectionParameters, ExtremaSign, Strategy};
use crate::peaks::{PeakLocator, SelectivePeakFinder};
use crate::period::{estimate_peak_distance, DistanceSource, PeakDistance};
use crate::signal::{check_shape, Signal};
use crate::slice_maybe_parallel;
use crate::window::{size_windows, WindowPlan};
#[cfg(feature = "parallel")]
use rayon::iter::ParallelIterator;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// What one successful pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct PassSummary {
    /// 1-based pass number.
    pub pass: usize,
    pub peak_distance: PeakDistance,
    pub plan: WindowPlan,
    /// Number of windows, i.e. sparse baseline samples.
    pub sample_count: usize,
    /// `max - min` of this pass's baseline delta.
    pub amplitude: f64,
}

/// Diagnosable account of a correction.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionReport {
    pub strategy: Strategy,
    /// Successful passes, in order. Empty means the identity was returned.
    pub passes: Vec<PassSummary>,
    pub converged: bool,
    /// Non-fatal conditions: peak-distance fallbacks
    /// ([`CorrectionError::Estimation`]) and
    /// [`CorrectionError::ConvergenceNotReached`].
    pub warnings: Vec<CorrectionError>,
    /// The failure that aborted a pass, if any.
    pub failure: Option<CorrectionError>,
}

impl CorrectionReport {
    fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            passes: Vec::new(),
            converged: false,
            warnings: Vec::new(),
            failure: None,
        }
    }

    /// True when no pass was applied and the input came back unchanged.
    pub fn is_identity(&self) -> bool {
        self.passes.is_empty()
    }
}

/// Corrected signal plus the cumulative baseline that was removed.
///
/// `corrected[i] + baseline[i] == original[i]` up to rounding, and both have
/// the original's length on every path.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionResult {
    pub corrected: Vec<f64>,
    pub baseline: Vec<f64>,
    pub report: CorrectionReport,
}

/// Drift severity, for quality-control consumers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftSummary {
    /// `max - min` of the baseline.
    pub amplitude: f64,
    /// Last baseline value minus the first.
    pub net_change: f64,
    /// RMS deviation of the baseline from its own mean.
    pub rms_deviation: f64,
}

impl CorrectionResult {
    fn identity(values: &[f64], report: CorrectionReport) -> Self {
        Self {
            corrected: values.to_vec(),
            baseline: vec![0.0; values.len()],
            report,
        }
    }

    pub fn drift_summary(&self) -> DriftSummary {
        let net_change = match (self.baseline.first(), self.baseline.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        };
        let center = if self.baseline.is_empty() {
            0.0
        } else {
            mean(&self.baseline)
        };
        let deviations: Vec<f64> = self.baseline.iter().map(|b| b - center).collect();
        DriftSummary {
            amplitude: amplitude(&self.baseline),
            net_change,
            rms_deviation: rms(&deviations),
        }
    }
}

/// Per-invocation iteration bookkeeping.
#[derive(Debug, Default)]
struct IterationState {
    iteration: usize,
    /// Correction amplitude of the first pass.
    reference_delta: Option<f64>,
    /// Latest pass amplitude as a percentage of the reference.
    last_ratio_percent: f64,
    converged: bool,
}

impl IterationState {
    /// Record a pass amplitude; returns true once converged.
    fn observe(&mut self, pass_amplitude: f64, threshold_percent: f64) -> bool {
        match self.reference_delta {
            None => {
                self.reference_delta = Some(pass_amplitude);
                self.last_ratio_percent = 100.0;
                // Nothing to refine when the first pass removed nothing.
                self.converged = pass_amplitude < NUMERICAL_EPS;
            }
            Some(reference) => {
                self.last_ratio_percent = 100.0 * pass_amplitude / reference;
                self.converged = self.last_ratio_percent <= threshold_percent;
            }
        }
        self.converged
    }
}

/// Turns a panic inside a caller-supplied locator into an estimation failure,
/// which the period stage then answers with the default peak distance.
struct UnwindGuard<'a>(&'a dyn PeakLocator);

impl PeakLocator for UnwindGuard<'_> {
    fn find_peaks(
        &self,
        signal: &[f64],
        selectivity_ratio: f64,
        threshold_ratio: f64,
        extrema_sign: ExtremaSign,
    ) -> Result<Vec<usize>> {
        catch_unwind(AssertUnwindSafe(|| {
            self.0
                .find_peaks(signal, selectivity_ratio, threshold_ratio, extrema_sign)
        }))
        .unwrap_or_else(|_| {
            Err(CorrectionError::Estimation(
                "peak locator panicked".to_string(),
            ))
        })
    }
}

/// Baseline-correction engine.
///
/// Holds the peak-finding capability and the diagnostic sink; everything else
/// is per call. A corrector can be shared across threads and used for many
/// signals concurrently.
pub struct BaselineCorrector {
    locator: Box<dyn PeakLocator>,
    sink: Box<dyn DiagnosticSink>,
}

impl Default for BaselineCorrector {
    fn default() -> Self {
        Self {
            locator: Box::new(SelectivePeakFinder::default()),
            sink: Box::new(TracingSink),
        }
    }
}

impl std::fmt::Debug for BaselineCorrector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaselineCorrector").finish_non_exhaustive()
    }
}

impl BaselineCorrector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_peak_locator(mut self, locator: impl PeakLocator + 'static) -> Self {
        self.locator = Box::new(locator);
        self
    }

    pub fn with_sink(mut self, sink: impl DiagnosticSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Estimate and remove the baseline of `(locations, values)`.
    ///
    /// # Errors
    /// Only [`CorrectionError::InputShape`]: mismatched lengths, non-finite
    /// samples or decreasing locations. Signals shorter than two samples come
    /// back unchanged with a zero baseline.
    pub fn correct(
        &self,
        locations: &[f64],
        values: &[f64],
        params: &CorrectionParameters,
    ) -> Result<CorrectionResult> {
        check_shape(locations, values)?;

        let mut report = CorrectionReport::new(params.strategy);
        if values.len() < 2 {
            report.converged = true;
            return Ok(CorrectionResult::identity(values, report));
        }

        if let Err(e) = params.validate() {
            self.sink
                .emit(DiagnosticLevel::Warn, &format!("returning input unchanged: {}", e));
            report.failure = Some(e);
            return Ok(CorrectionResult::identity(values, report));
        }

        Ok(self.run(locations, values, params, report))
    }

    pub fn correct_signal(
        &self,
        signal: &Signal,
        params: &CorrectionParameters,
    ) -> Result<CorrectionResult> {
        self.correct(signal.locations(), signal.values(), params)
    }

    /// Correct many independent signals, one call per signal.
    ///
    /// Runs on the rayon pool with the `parallel` feature. Results are in
    /// input order.
    pub fn correct_batch(
        &self,
        signals: &[Signal],
        params: &CorrectionParameters,
    ) -> Vec<Result<CorrectionResult>> {
        slice_maybe_parallel!(signals)
            .map(|signal| self.correct_signal(signal, params))
            .collect()
    }

    /// Iteration loop. Never fails: a failed pass ends the loop and the
    /// accumulated baseline so far is kept.
    fn run(
        &self,
        locations: &[f64],
        values: &[f64],
        params: &CorrectionParameters,
        mut report: CorrectionReport,
    ) -> CorrectionResult {
        let n = values.len();
        let max_passes = match params.strategy {
            Strategy::SinglePass => 1,
            Strategy::Iterative => params.iteration_cap,
        };

        let mut state = IterationState::default();
        let mut cumulative = vec![0.0; n];
        let mut residual = values.to_vec();

        while state.iteration < max_passes {
            state.iteration += 1;
            let attempt = self.single_pass(locations, &residual, params, state.iteration);
            let (pass, summary) = match attempt {
                Ok(done) => done,
                Err(e) => {
                    let kept = if report.passes.is_empty() {
                        "returning input unchanged".to_string()
                    } else {
                        format!("keeping {} earlier passes", report.passes.len())
                    };
                    self.sink.emit(
                        DiagnosticLevel::Warn,
                        &format!("pass {} failed, {}: {}", state.iteration, kept, e),
                    );
                    report.failure = Some(e);
                    break;
                }
            };

            if let DistanceSource::Fallback { reason } = &summary.peak_distance.source {
                report.warnings.push(reason.clone());
            }
            for (c, d) in cumulative.iter_mut().zip(pass.baseline_delta.iter()) {
                *c += d;
            }
            residual = pass.corrected;
            let pass_amplitude = summary.amplitude;
            report.passes.push(summary);

            if state.observe(pass_amplitude, params.convergence_fit_threshold) {
                break;
            }
        }

        match params.strategy {
            Strategy::SinglePass => state.converged = report.failure.is_none(),
            Strategy::Iterative if !state.converged && report.failure.is_none() => {
                let warning = CorrectionError::ConvergenceNotReached {
                    passes: report.passes.len(),
                    last_ratio_percent: state.last_ratio_percent,
                };
                self.sink.emit(DiagnosticLevel::Warn, &warning.to_string());
                report.warnings.push(warning);
            }
            Strategy::Iterative => {}
        }
        report.converged = state.converged;

        if report.passes.is_empty() {
            return CorrectionResult::identity(values, report);
        }
        self.sink.emit(
            DiagnosticLevel::Debug,
            &format!(
                "baseline removed in {} pass(es), converged: {}",
                report.passes.len(),
                report.converged
            ),
        );

        let corrected = values
            .iter()
            .zip(cumulative.iter())
            .map(|(v, b)| v - b)
            .collect();
        CorrectionResult {
            corrected,
            baseline: cumulative,
            report,
        }
    }

    /// PeriodEstimator -> WindowSizer -> LocalBaselineEstimator on `values`.
    fn single_pass(
        &self,
        locations: &[f64],
        values: &[f64],
        params: &CorrectionParameters,
        pass: usize,
    ) -> Result<(PassResult, PassSummary)> {
        let locator = UnwindGuard(self.locator.as_ref());
        let peak_distance = estimate_peak_distance(locations, values, params, &locator);
        if let DistanceSource::Fallback { reason } = &peak_distance.source {
            self.sink.emit(
                DiagnosticLevel::Debug,
                &format!(
                    "pass {}: {}; using default peak distance {}",
                    pass, reason, peak_distance.samples
                ),
            );
        }

        let plan = size_windows(peak_distance.samples, values.len(), params)?;
        let result = estimate_pass(
            locations,
            values,
            plan,
            params.quantile_value,
            params.method,
        )?;
        let summary = PassSummary {
            pass,
            peak_distance,
            plan,
            sample_count: result.samples.len(),
            amplitude: amplitude(&result.baseline_delta),
        };
        self.sink.emit(
            DiagnosticLevel::Trace,
            &format!(
                "pass {}: peak distance {}, step {}, window {}, {} samples, amplitude {:.6}",
                pass,
                summary.peak_distance.samples,
                plan.step_size,
                plan.window_size,
                summary.sample_count,
                summary.amplitude
            ),
        );
        Ok((result, summary))
    }
}

/// Correct one signal with the default peak finder and tracing diagnostics.
///
/// See [`BaselineCorrector::correct`].
pub fn correct(
    locations: &[f64],
    values: &[f64],
    params: &CorrectionParameters,
) -> Result<CorrectionResult> {
    BaselineCorrector::default().correct(locations, values, params)
}

/// Correct many signals with the default corrector.
///
/// See [`BaselineCorrector::correct_batch`].
pub fn correct_batch(
    signals: &[Signal],
    params: &CorrectionParameters,
) -> Vec<Result<CorrectionResult>> {
    BaselineCorrector::default().correct_batch(signals, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NullSink;
    use crate::params::{ExtremaSign, RegressionMethod};
    use std::f64::consts::PI;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Keeps every message for inspection.
    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<(DiagnosticLevel, String)>>);

    impl DiagnosticSink for RecordingSink {
        fn emit(&self, level: DiagnosticLevel, message: &str) {
            if let Ok(mut log) = self.0.lock() {
                log.push((level, message.to_string()));
            }
        }
    }

    /// Real peak finding for the first `ok_calls` calls, then a spacing so
    /// wide that only four windows fit.
    struct WideningLocator {
        ok_calls: usize,
        calls: AtomicUsize,
    }

    impl PeakLocator for WideningLocator {
        fn find_peaks(
            &self,
            signal: &[f64],
            sel: f64,
            thr: f64,
            sign: ExtremaSign,
        ) -> Result<Vec<usize>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.ok_calls {
                SelectivePeakFinder::default().find_peaks(signal, sel, thr, sign)
            } else {
                Ok(vec![0, 400, 800])
            }
        }
    }

    fn grid(m: usize) -> Vec<f64> {
        (0..m).map(|i| i as f64).collect()
    }

    fn sine_plus(t: &[f64], period: f64, drift: impl Fn(f64) -> f64) -> Vec<f64> {
        t.iter()
            .map(|&ti| (2.0 * PI * ti / period).sin() + drift(ti))
            .collect()
    }

    fn quiet() -> BaselineCorrector {
        BaselineCorrector::new().with_sink(NullSink)
    }

    #[test]
    fn test_single_pass_reconstructs_and_reports() {
        let t = grid(800);
        let values = sine_plus(&t, 40.0, |ti| 0.003 * ti);
        let result = quiet()
            .correct(&t, &values, &CorrectionParameters::default())
            .unwrap();
        assert_eq!(result.report.passes.len(), 1);
        assert!(result.report.converged);
        assert!(result.report.failure.is_none());
        let pass = &result.report.passes[0];
        assert_eq!(pass.peak_distance.source, DistanceSource::Detected { peaks: 20 });
        assert_eq!(pass.plan.step_size, 20);
        for i in 0..t.len() {
            assert!((result.corrected[i] + result.baseline[i] - values[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_iterative_converges_on_drifting_sine() {
        let t = grid(2000);
        let values = sine_plus(&t, 50.0, |ti| 2.0 * (-ti / 800.0).exp());
        let params = CorrectionParameters::iterative();
        let result = quiet().correct(&t, &values, &params).unwrap();
        assert!(result.report.converged, "{:?}", result.report);
        assert!(result.report.passes.len() >= 2);
        assert!(result.report.passes.len() <= params.iteration_cap);
        assert!(result.report.warnings.is_empty(), "{:?}", result.report.warnings);
    }

    #[test]
    fn test_iteration_cap_emits_convergence_warning() {
        let t = grid(1000);
        let values = sine_plus(&t, 50.0, |ti| 2.0 * (-ti / 300.0).exp());
        let params = CorrectionParameters::iterative()
            .with_iteration_cap(2)
            .with_convergence_fit_threshold(0.0);
        let result = quiet().correct(&t, &values, &params).unwrap();
        assert_eq!(result.report.passes.len(), 2);
        assert!(!result.report.converged);
        assert!(result
            .report
            .warnings
            .iter()
            .any(|w| matches!(w, CorrectionError::ConvergenceNotReached { passes: 2, .. })));
    }

    #[test]
    fn test_invalid_parameters_give_identity() {
        let t = grid(200);
        let values = sine_plus(&t, 20.0, |ti| 0.01 * ti);
        let params = CorrectionParameters::default().with_quantile(1.5);
        let result = quiet().correct(&t, &values, &params).unwrap();
        assert_eq!(result.corrected, values);
        assert!(result.baseline.iter().all(|&b| b == 0.0));
        assert!(matches!(
            result.report.failure,
            Some(CorrectionError::InvalidParameters(_))
        ));
        assert!(result.report.is_identity());
    }

    #[test]
    fn test_failed_later_pass_keeps_earlier_passes() {
        let t = grid(1000);
        let values = sine_plus(&t, 50.0, |ti| 2.0 * (-ti / 300.0).exp());
        // Pass 1: spacing 50 -> 39 windows. Pass 2: spacing 400 -> 4 windows,
        // too few for a degree-9 fit.
        let params = CorrectionParameters::iterative()
            .with_method(RegressionMethod::Polynomial(9))
            .with_convergence_fit_threshold(0.0);
        let corrector = quiet().with_peak_locator(WideningLocator {
            ok_calls: 1,
            calls: AtomicUsize::new(0),
        });
        let result = corrector.correct(&t, &values, &params).unwrap();
        assert_eq!(result.report.passes.len(), 1, "{:?}", result.report);
        assert_eq!(result.report.passes[0].sample_count, 39);
        assert!(matches!(
            result.report.failure,
            Some(CorrectionError::Regression(_))
        ));
        assert!(!result.report.converged);
        let first_pass_amplitude = result.report.passes[0].amplitude;
        assert!((amplitude(&result.baseline) - first_pass_amplitude).abs() < 1e-12);
        for i in 0..t.len() {
            assert!((result.corrected[i] + result.baseline[i] - values[i]).abs() < 1e-12);
        }
    }

    #[test]
    fn test_short_input_is_identity_without_error() {
        let params = CorrectionParameters::default();
        let empty = quiet().correct(&[], &[], &params).unwrap();
        assert!(empty.corrected.is_empty() && empty.baseline.is_empty());
        let one = quiet().correct(&[0.0], &[4.2], &params).unwrap();
        assert_eq!(one.corrected, vec![4.2]);
        assert_eq!(one.baseline, vec![0.0]);
    }

    #[test]
    fn test_mismatched_lengths_is_input_error() {
        let err = quiet()
            .correct(&[0.0, 1.0, 2.0], &[1.0, 2.0], &CorrectionParameters::default())
            .unwrap_err();
        assert!(matches!(err, CorrectionError::InputShape { .. }));
    }

    #[test]
    fn test_sink_receives_failure_warning() {
        let sink = Arc::new(RecordingSink::default());
        let corrector = BaselineCorrector::new().with_sink(sink.clone());
        let t = grid(100);
        let values = sine_plus(&t, 20.0, |_| 0.0);
        let params = CorrectionParameters::default().with_method(RegressionMethod::Polynomial(0));
        let result = corrector.correct(&t, &values, &params).unwrap();
        assert!(result.report.is_identity());
        let log = sink.0.lock().unwrap();
        assert!(log
            .iter()
            .any(|(level, msg)| *level == DiagnosticLevel::Warn && msg.contains("unchanged")));
    }

    #[test]
    fn test_drift_summary() {
        let result = CorrectionResult {
            corrected: vec![0.0; 3],
            baseline: vec![1.0, 2.0, 3.0],
            report: CorrectionReport::new(Strategy::SinglePass),
        };
        let summary = result.drift_summary();
        assert!((summary.amplitude - 2.0).abs() < 1e-12);
        assert!((summary.net_change - 2.0).abs() < 1e-12);
        assert!((summary.rms_deviation - (2.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_batch_preserves_order() {
        let t = grid(300);
        let signals: Vec<Signal> = [20.0, 30.0, 50.0]
            .iter()
            .map(|&p| Signal::new(t.clone(), sine_plus(&t, p, |ti| 0.01 * ti)).unwrap())
            .collect();
        let results = quiet().correct_batch(&signals, &CorrectionParameters::default());
        assert_eq!(results.len(), 3);
        for (signal, result) in signals.iter().zip(results.iter()) {
            let result = result.as_ref().unwrap();
            assert_eq!(result.corrected.len(), signal.len());
            assert!((result.corrected[7] + result.baseline[7] - signal.values()[7]).abs() < 1e-12);
        }
        let distances: Vec<usize> = results
            .iter()
            .map(|r| r.as_ref().unwrap().report.passes[0].peak_distance.samples)
            .collect();
        assert_eq!(distances, vec![20, 30, 50]);
    }

    #[test]
    fn test_panicking_locator_falls_back_to_default_distance() {
        struct PanickingLocator;

        impl PeakLocator for PanickingLocator {
            fn find_peaks(&self, _: &[f64], _: f64, _: f64, _: ExtremaSign) -> Result<Vec<usize>> {
                panic!("locator bug");
            }
        }

        let t = grid(400);
        let values = sine_plus(&t, 20.0, |ti| 0.01 * ti);
        let result = quiet()
            .with_peak_locator(PanickingLocator)
            .correct(&t, &values, &CorrectionParameters::default())
            .unwrap();
        assert!(result.report.failure.is_none());
        let pass = &result.report.passes[0];
        match &pass.peak_distance.source {
            DistanceSource::Fallback {
                reason: CorrectionError::Estimation(msg),
            } => assert!(msg.contains("panicked"), "{}", msg),
            other => panic!("unexpected source {:?}", other),
        }
        // ceil(400 * 0.05)
        assert_eq!(pass.peak_distance.samples, 20);
    }

    #[test]
    fn test_iteration_state_convergence_rule() {
        let mut state = IterationState::default();
        assert!(!state.observe(4.0, 5.0));
        assert!(!state.observe(0.4, 5.0)); // 10 %
        assert!(state.observe(0.2, 5.0)); // 5 %
        let mut flat = IterationState::default();
        assert!(flat.observe(0.0, 5.0));
    }
}
