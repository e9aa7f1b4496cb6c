//! Owned trace: sample locations plus values.

use crate::error::{CorrectionError, Result};

/// An ordered pair of equal-length sequences: non-decreasing sample
/// `locations` (e.g. frame times) and the sampled `values`.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    locations: Vec<f64>,
    values: Vec<f64>,
}

impl Signal {
    /// Create a signal, checking the input contract.
    ///
    /// # Errors
    /// [`CorrectionError::InputShape`] when the lengths differ, a location or
    /// value is not finite, or the locations decrease.
    pub fn new(locations: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        check_shape(&locations, &values)?;
        Ok(Self { locations, values })
    }

    /// Uniformly sampled signal starting at zero with spacing `dt`.
    pub fn uniform(values: Vec<f64>, dt: f64) -> Result<Self> {
        let locations = (0..values.len()).map(|i| i as f64 * dt).collect();
        Self::new(locations, values)
    }

    pub fn locations(&self) -> &[f64] {
        &self.locations
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume into `(locations, values)`.
    pub fn into_parts(self) -> (Vec<f64>, Vec<f64>) {
        (self.locations, self.values)
    }
}

/// Check the input contract of a `(locations, values)` pair.
pub(crate) fn check_shape(locations: &[f64], values: &[f64]) -> Result<()> {
    if locations.len() != values.len() {
        return Err(CorrectionError::input_shape(format!(
            "{} locations but {} values",
            locations.len(),
            values.len()
        )));
    }
    if let Some(i) = locations.iter().position(|v| !v.is_finite()) {
        return Err(CorrectionError::input_shape(format!(
            "location {} is not finite",
            i
        )));
    }
    if let Some(i) = values.iter().position(|v| !v.is_finite()) {
        return Err(CorrectionError::input_shape(format!(
            "value {} is not finite",
            i
        )));
    }
    if let Some(k) = locations.windows(2).position(|w| w[1] < w[0]) {
        return Err(CorrectionError::input_shape(format!(
            "locations decrease at index {} ({} -> {})",
            k + 1,
            locations[k],
            locations[k + 1]
        )));
    }
    Ok(())
}
