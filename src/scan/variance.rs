//! # Variance of the Optimal Leverage
//!
//! $$
//! \operatorname{Var}\big(l^\*_W\big)\propto\frac{1}{W}
//! $$
//!
//! Sample variance of the frictionless optimum across non-overlapping windows
//! of a given length, swept over geometrically growing lengths.

use serde::Deserialize;
use serde::Serialize;
use statrs::statistics::Statistics;
use tracing::debug;
use tracing::info;

use super::Scan;
use super::WindowScanner;
use crate::error::LeverageError;
use crate::error::Result;
use crate::model::ModelKind;

#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VarianceSweepConfig {
  /// Periods skipped at the start of the span.
  pub warmup: usize,
  /// First window length, in periods.
  pub initial_length: usize,
  /// Factor applied to the window length after each step.
  pub growth: f64,
}

impl Default for VarianceSweepConfig {
  fn default() -> Self {
    Self {
      warmup: 10,
      initial_length: 17,
      growth: 1.1,
    }
  }
}

/// Variance of `l_opt` over the windows of one length.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct VariancePoint {
  pub length: usize,
  /// Windows that produced a leverage.
  pub windows: usize,
  /// Population variance, `+inf` if any window's optimum is unbounded.
  pub variance: f64,
}

impl WindowScanner<'_> {
  /// Variance of the frictionless optimum over consecutive windows of
  /// `length` periods starting at `start`.
  pub fn leverage_variance(&self, start: usize, length: usize) -> Result<Scan<VariancePoint>> {
    let n = self.pair.len();
    let ranges: Vec<_> = if length == 0 {
      Vec::new()
    } else {
      (start..n)
        .step_by(length)
        .take_while(|s| s + length <= n)
        .map(|s| s..s + length)
        .collect()
    };

    let (values, failures) = self.solve_ranges(ModelKind::Frictionless, &ranges)?;
    let leverages: Vec<f64> = values.iter().flatten().map(|r| r.leverage()).collect();
    let variance = if leverages.is_empty() {
      f64::NAN
    } else if leverages.iter().any(|l| !l.is_finite()) {
      f64::INFINITY
    } else {
      leverages.iter().population_variance()
    };

    debug!(length, windows = leverages.len(), variance, "l_opt variance");
    Ok(Scan {
      output: VariancePoint {
        length,
        windows: leverages.len(),
        variance,
      },
      failures,
    })
  }

  /// Grow the window length geometrically until it exceeds half the usable span.
  pub fn variance_sweep(&self, config: &VarianceSweepConfig) -> Result<Scan<Vec<VariancePoint>>> {
    if config.initial_length == 0 {
      return Err(LeverageError::InvalidParameter {
        name: "initial_length",
        value: 0.0,
        reason: "must be at least one period",
      });
    }
    if !(config.growth.is_finite() && config.growth > 1.0) {
      return Err(LeverageError::InvalidParameter {
        name: "growth",
        value: config.growth,
        reason: "must be finite and greater than one",
      });
    }

    let usable = self.pair.len().saturating_sub(config.warmup);
    info!(usable, initial = config.initial_length, "l_opt variance sweep");

    let mut points = Vec::new();
    let mut failures = Vec::new();
    let mut length = config.initial_length;
    while 2 * length < usable {
      let scan = self.leverage_variance(config.warmup, length)?;
      if scan.output.windows > 0 {
        points.push(scan.output);
      }
      failures.extend(scan.failures);
      length = ((length as f64 * config.growth) as usize).max(length + 1);
    }

    Ok(Scan {
      output: points,
      failures,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::params::ModelParameters;
  use crate::scan::test_support::daily_pair;
  use crate::scan::test_support::iid_pair;

  #[test]
  fn doubling_the_window_roughly_halves_the_variance() {
    let pair = iid_pair(128_000, 0.0005, 0.01, 0.0, 42);
    let scanner = WindowScanner::new(&pair, ModelParameters::frictionless());

    let short = scanner.leverage_variance(0, 400).unwrap().output;
    let long = scanner.leverage_variance(0, 800).unwrap().output;
    assert_eq!(short.windows, 320);
    assert_eq!(long.windows, 160);
    assert!(short.variance.is_finite() && long.variance.is_finite());

    let ratio = short.variance / long.variance;
    assert!(ratio > 1.3 && ratio < 3.2, "variance ratio {ratio}");
  }

  #[test]
  fn sweep_lengths_grow_geometrically() {
    let pair = iid_pair(600, 0.0005, 0.01, 0.0, 5);
    let scanner = WindowScanner::new(&pair, ModelParameters::frictionless());
    let scan = scanner
      .variance_sweep(&VarianceSweepConfig::default())
      .unwrap();

    let lengths: Vec<usize> = scan.output.iter().map(|p| p.length).collect();
    assert_eq!(lengths[0], 17);
    assert_eq!(lengths[1], 18);
    assert!(lengths.windows(2).all(|w| w[1] > w[0]));
    assert!(lengths.iter().all(|l| 2 * l < 590));
    for point in &scan.output {
      assert_eq!(point.windows, 590 / point.length);
    }
  }

  #[test]
  fn unbounded_window_makes_variance_infinite() {
    // The risky asset wins every period of the second window.
    let pair = daily_pair(vec![1.02, 0.98, 1.01, 1.03], vec![1.0; 4]);
    let scanner = WindowScanner::new(&pair, ModelParameters::frictionless());
    let point = scanner.leverage_variance(0, 2).unwrap().output;
    assert_eq!(point.windows, 2);
    assert_eq!(point.variance, f64::INFINITY);
  }

  #[test]
  fn growth_must_exceed_one() {
    let pair = daily_pair(vec![1.02, 0.98], vec![1.0; 2]);
    let scanner = WindowScanner::new(&pair, ModelParameters::frictionless());
    let config = VarianceSweepConfig {
      growth: 1.0,
      ..Default::default()
    };
    assert!(scanner.variance_sweep(&config).is_err());
  }
}
