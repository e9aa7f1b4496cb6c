//! Example 01: Baseline Correction
//!
//! Generates a synthetic calcium-transient trace with known settling and
//! linear drift, removes the baseline with the single-pass and iterative
//! strategies, and compares the estimated drift against the truth.
//!
//! Run with `RUST_LOG=debug` to see the per-pass diagnostics.

use ephys_baseline::helpers::{amplitude, mean, rms};
use ephys_baseline::simulation::synthetic_trace;
use ephys_baseline::{
    correct, correct_batch, CorrectionParameters, DistanceSource, Drift, RegressionMethod,
    Strategy, TraceSpec,
};
use tracing_subscriber::EnvFilter;

/// RMS of the mean-centered difference, relative to the drift amplitude
fn drift_error(estimate: &[f64], truth: &[f64]) -> f64 {
    let (me, mt) = (mean(estimate), mean(truth));
    let diff: Vec<f64> = estimate
        .iter()
        .zip(truth.iter())
        .map(|(e, t)| (e - me) - (t - mt))
        .collect();
    rms(&diff) / amplitude(truth)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Example 01: Baseline Correction ===\n");

    let spec = TraceSpec {
        len: 3000,
        noise_sd: 0.02,
        drift: Drift::Compound(vec![
            Drift::Exponential {
                amplitude: 2.5,
                tau: 6.0,
            },
            Drift::Linear { slope: 0.04 },
        ]),
        ..TraceSpec::default()
    };
    let trace = synthetic_trace(&spec, Some(42))?;
    let (t, y) = (trace.signal.locations(), trace.signal.values());

    println!("--- Synthetic Trace ---");
    println!("  {} samples, dt = {} s, one beat every {} s", spec.len, spec.dt, spec.period);
    println!("  drift: 2.5 exp(-t/6) + 0.04 t");
    println!("  drift amplitude: {:.4}", amplitude(&trace.drift));

    // --- Section 1: Single pass, each regression method ---
    println!("\n--- Single Pass ---");
    for method in [
        RegressionMethod::PiecewiseCubicHermite,
        RegressionMethod::Spline,
        RegressionMethod::Linear,
        RegressionMethod::Polynomial(4),
    ] {
        let params = CorrectionParameters::default().with_method(method);
        let result = correct(t, y, &params)?;
        let Some(pass) = result.report.passes.first() else {
            println!("  {:<14} returned unchanged: {:?}", method.to_string(), result.report.failure);
            continue;
        };
        let source = match &pass.peak_distance.source {
            DistanceSource::Detected { peaks } => format!("{} peaks", peaks),
            DistanceSource::Fallback { .. } => "fallback".to_string(),
        };
        println!(
            "  {:<14} peak distance {:>4} ({}), step {:>3}, window {:>3}: drift error {:.4}",
            method.to_string(),
            pass.peak_distance.samples,
            source,
            pass.plan.step_size,
            pass.plan.window_size,
            drift_error(&result.baseline, &trace.drift)
        );
    }

    // --- Section 2: Iterative refinement ---
    println!("\n--- Iterative ---");
    let params = CorrectionParameters::iterative();
    let result = correct(t, y, &params)?;
    for pass in &result.report.passes {
        println!(
            "  pass {:>2}: correction amplitude {:.5}",
            pass.pass, pass.amplitude
        );
    }
    println!(
        "  converged: {} after {} passes, drift error {:.4}",
        result.report.converged,
        result.report.passes.len(),
        drift_error(&result.baseline, &trace.drift)
    );
    let summary = result.drift_summary();
    println!(
        "  drift summary: amplitude {:.4}, net change {:.4}, rms {:.4}",
        summary.amplitude, summary.net_change, summary.rms_deviation
    );

    // --- Section 3: Batch ---
    println!("\n--- Batch ---");
    let signals = (0..8)
        .map(|seed| synthetic_trace(&spec, Some(seed)).map(|tr| tr.signal))
        .collect::<Result<Vec<_>, _>>()?;
    let params = CorrectionParameters::default().with_strategy(Strategy::Iterative);
    for (i, result) in correct_batch(&signals, &params).into_iter().enumerate() {
        let result = result?;
        println!(
            "  trace {}: {} passes, drift amplitude {:.4}",
            i,
            result.report.passes.len(),
            result.drift_summary().amplitude
        );
    }

    println!("\n=== Done ===");
    Ok(())
}
