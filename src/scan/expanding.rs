//! # Expanding Window
//!
//! $$
//! l^\*_k=l^\*\big([t_0,t_{k+1})\big),\qquad k=w,\dots,T-1
//! $$
//!
//! Optimal leverage of windows anchored at the first observation, growing
//! one period at a time.

use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use super::LeverageSeries;
use super::Scan;
use super::WindowScanner;
use crate::error::Result;
use crate::model::ModelKind;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpandingConfig {
  /// Periods after the first one before the first window closes.
  pub warmup: usize,
}

impl Default for ExpandingConfig {
  fn default() -> Self {
    Self { warmup: 10 }
  }
}

impl WindowScanner<'_> {
  pub fn expanding(&self, model: ModelKind, config: &ExpandingConfig) -> Result<Scan<LeverageSeries>> {
    let ranges: Vec<_> = (config.warmup..self.pair.len()).map(|k| 0..k + 1).collect();
    info!(%model, windows = ranges.len(), "expanding-window scan");
    self.solve_series(model, &ranges)
  }
}
