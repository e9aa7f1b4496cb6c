//! Window and step sizing.
//!
//! Maps a peak distance to the stride and width of the sliding window used to
//! sample the baseline. Every plan that leaves this module satisfies
//! `1 <= step_size < window_size <= signal_len`.

use crate::error::{CorrectionError, Result};
use crate::params::CorrectionParameters;
use std::ops::Range;

/// Stride and width of the baseline sampling window, in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPlan {
    pub step_size: usize,
    pub window_size: usize,
}

impl WindowPlan {
    /// Check `1 <= step_size < window_size <= signal_len`.
    pub fn validate(&self, signal_len: usize) -> Result<()> {
        if self.step_size >= 1 && self.step_size < self.window_size && self.window_size <= signal_len
        {
            Ok(())
        } else {
            Err(CorrectionError::WindowSizing {
                step_size: self.step_size,
                window_size: self.window_size,
                signal_len,
            })
        }
    }

    /// Overlapping windows covering `0..signal_len`.
    ///
    /// Windows start every `step_size` samples; the last one is clipped to the
    /// end of the signal rather than dropped.
    pub fn spans(&self, signal_len: usize) -> Vec<Range<usize>> {
        let mut spans = Vec::new();
        if signal_len == 0 || self.step_size == 0 {
            return spans;
        }
        let mut start = 0;
        loop {
            let end = (start + self.window_size).min(signal_len);
            spans.push(start..end);
            if end == signal_len {
                break;
            }
            start += self.step_size;
        }
        spans
    }
}

/// Window width for a given step: scaled, floored at the minimum, and always
/// wider than the step.
fn window_for_step(step_size: usize, params: &CorrectionParameters) -> usize {
    let scaled = (step_size as f64 * params.window_size_factor).round() as usize;
    let window_size = params.min_window_size.max(scaled);
    if window_size <= step_size {
        (step_size as f64 * 1.5).round() as usize
    } else {
        window_size
    }
}

/// Derive the window plan for a signal of `signal_len` samples.
///
/// # Arguments
/// * `peak_distance` - Characteristic peak spacing in samples
/// * `signal_len` - Number of samples, at least 2
/// * `params` - Step/window factors, minimum sizes and the window-count cap
pub fn size_windows(
    peak_distance: usize,
    signal_len: usize,
    params: &CorrectionParameters,
) -> Result<WindowPlan> {
    let scaled_step = (peak_distance as f64 * params.step_size_factor).round() as usize;
    let mut step_size = params.min_step_size.max(scaled_step).max(1);
    let mut window_size = window_for_step(step_size, params);

    if signal_len as f64 / step_size as f64 > params.max_num_windows as f64 {
        step_size = signal_len.div_ceil(params.max_num_windows.max(1)).max(1);
        window_size = window_for_step(step_size, params);
    }

    if window_size > signal_len {
        window_size = signal_len;
        if step_size >= window_size {
            step_size = ((window_size as f64 / 1.5).floor() as usize).max(1);
        }
    }

    let plan = WindowPlan {
        step_size,
        window_size,
    };
    plan.validate(signal_len)?;
    Ok(plan)
}
