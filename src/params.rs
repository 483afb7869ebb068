//! # Model Parameters
//!
//! $$
//! r_{\text{period}}=(1+r_{\text{annual}})^{1/n}-1
//! $$
//!
//! Market frictions of a risky asset, expressed per compounding period.

use impl_new_derive::ImplNew;
use serde::Deserialize;
use serde::Serialize;

use crate::error::LeverageError;
use crate::error::Result;

/// Frictions applied by the friction-aware return models.
#[derive(ImplNew, Default, Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct ModelParameters {
  /// Proportional rebalancing cost coefficient.
  pub friction: f64,
  /// Per-period rate paid on borrowed cash when leverage exceeds one.
  pub long_rate: f64,
  /// Per-period rate charged when the riskless asset is shorted.
  pub short_rate: f64,
}

impl ModelParameters {
  /// Parameters with every friction set to zero.
  pub fn frictionless() -> Self {
    Self::default()
  }

  /// Convert annualised borrowing rates to the series' compounding period.
  pub fn from_annual(
    friction: f64,
    annual_long_rate: f64,
    annual_short_rate: f64,
    samples_per_annum: f64,
  ) -> Result<Self> {
    if !(samples_per_annum.is_finite() && samples_per_annum > 0.0) {
      return Err(LeverageError::InvalidParameter {
        name: "samples_per_annum",
        value: samples_per_annum,
        reason: "must be positive and finite",
      });
    }
    let per_period = |annual: f64| (1.0 + annual).powf(1.0 / samples_per_annum) - 1.0;
    let params = Self {
      friction,
      long_rate: per_period(annual_long_rate),
      short_rate: per_period(annual_short_rate),
    };
    params.validate()?;
    Ok(params)
  }

  /// Every friction must be finite and non-negative.
  pub fn validate(&self) -> Result<()> {
    for (name, value) in [
      ("friction", self.friction),
      ("long_rate", self.long_rate),
      ("short_rate", self.short_rate),
    ] {
      if !(value.is_finite() && value >= 0.0) {
        return Err(LeverageError::InvalidParameter {
          name,
          value,
          reason: "must be finite and non-negative",
        });
      }
    }
    Ok(())
  }
}

/// Resolution of the leverage grid used for plotting and curve fitting.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSettings {
  /// Number of steps across the bankruptcy-free interval.
  pub resolution: usize,
  /// Distance kept from each edge of the interval.
  pub epsilon: f64,
}

impl Default for GridSettings {
  fn default() -> Self {
    Self {
      resolution: 1000,
      epsilon: 0.01,
    }
  }
}
