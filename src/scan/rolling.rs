//! # Fixed-Length Rolling Windows
//!
//! $$
//! l^\*_{k}(W)=l^\*\big([t_k,t_{k+W})\big),\qquad k=0,\dots,T-W
//! $$
//!
//! Optimal leverage of fixed-length windows slid one period at a time, for a
//! handful of window lengths.

use chrono::Datelike;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use super::LeverageSeries;
use super::Scan;
use super::WindowScanner;
use crate::error::LeverageError;
use crate::error::Result;
use crate::model::ModelKind;
use crate::series::AlignedReturnPair;

/// How window lengths are chosen.
#[derive(Default, Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowSelection {
  /// About four log-spaced lengths up to half the span.
  #[default]
  Auto,
  /// Explicit lengths in years.
  Years(Vec<f64>),
}

#[derive(Default, Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RollingConfig {
  pub windows: WindowSelection,
}

/// A rolling window length.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct WindowLength {
  pub years: f64,
  pub periods: usize,
}

/// Rolling scan of one window length.
#[derive(Clone, Debug, PartialEq)]
pub struct RollingColumn {
  pub length: WindowLength,
  pub series: LeverageSeries,
}

/// Round down to a multiple of the leading power of ten.
pub fn log_round(x: f64) -> f64 {
  let p = 10f64.powi(x.abs().log10().floor() as i32);
  p * (x / p).floor()
}

/// `n` geometrically spaced whole numbers from `start` to `end`, deduplicated and sorted.
pub fn log_range(start: f64, end: f64, n: usize) -> Vec<f64> {
  if n < 2 {
    return vec![start.round()];
  }
  let ratio = (end / start).powf(1.0 / (n as f64 - 1.0));
  let mut values: Vec<f64> = (0..n)
    .map(|i| (start * ratio.powi(i as i32)).round())
    .collect();
  values.sort_by(f64::total_cmp);
  values.dedup();
  values
}

/// Number of year-ends (31 December) inside the pair's span.
fn year_ends(first: NaiveDate, last: NaiveDate) -> usize {
  (first.year()..=last.year())
    .filter_map(|y| NaiveDate::from_ymd_opt(y, 12, 31))
    .filter(|d| *d >= first && *d <= last)
    .count()
}

/// Window lengths in years derived from the span of `pair`.
pub fn auto_window_years(pair: &AlignedReturnPair) -> Vec<f64> {
  let years = year_ends(pair.first_date(), pair.last_date()) as f64;
  let half = years / 2.0;
  if half < 1.0 {
    warn!(years, "span too short for automatic window lengths");
    return Vec::new();
  }
  log_range(1.0, log_round(half), 4)
}

impl WindowScanner<'_> {
  /// Window lengths for `selection`, converted to periods of the pair.
  pub fn window_lengths(&self, selection: &WindowSelection) -> Result<Vec<WindowLength>> {
    let years = match selection {
      WindowSelection::Auto => auto_window_years(self.pair),
      WindowSelection::Years(years) => years.clone(),
    };

    let per_year = self.pair.frequency().periods_per_year();
    let mut lengths = Vec::with_capacity(years.len());
    for y in years {
      if !(y.is_finite() && y > 0.0) {
        return Err(LeverageError::InvalidParameter {
          name: "window length",
          value: y,
          reason: "must be a positive number of years",
        });
      }
      let periods = (y * per_year).round() as usize;
      if periods == 0 || periods > self.pair.len() {
        warn!(years = y, periods, available = self.pair.len(), "window length skipped");
        continue;
      }
      lengths.push(WindowLength { years: y, periods });
    }
    Ok(lengths)
  }

  /// Slide a window of `periods` across the span; `T - W + 1` placements.
  pub fn rolling_length(&self, model: ModelKind, length: WindowLength) -> Result<Scan<RollingColumn>> {
    let w = length.periods;
    let ranges: Vec<_> = if w == 0 || w > self.pair.len() {
      Vec::new()
    } else {
      (0..=self.pair.len() - w).map(|k| k..k + w).collect()
    };
    let scan = self.solve_series(model, &ranges)?;
    Ok(Scan {
      output: RollingColumn {
        length,
        series: scan.output,
      },
      failures: scan.failures,
    })
  }

  /// One rolling column per window length.
  pub fn rolling(&self, model: ModelKind, config: &RollingConfig) -> Result<Scan<Vec<RollingColumn>>> {
    let lengths = self.window_lengths(&config.windows)?;
    info!(%model, lengths = lengths.len(), "fixed-window scan");

    let mut columns = Vec::with_capacity(lengths.len());
    let mut failures = Vec::new();
    for length in lengths {
      let scan = self.rolling_length(model, length)?;
      columns.push(scan.output);
      failures.extend(scan.failures);
    }
    Ok(Scan {
      output: columns,
      failures,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::params::ModelParameters;
  use crate::scan::test_support::iid_pair;
  use crate::series::Frequency;

  #[test]
  fn log_helpers_match_human_magnitudes() {
    assert_eq!(log_round(47.0), 40.0);
    assert_eq!(log_round(7.3), 7.0);
    assert_eq!(log_round(150.0), 100.0);
    assert_eq!(log_range(1.0, 20.0, 4), vec![1.0, 3.0, 7.0, 20.0]);
    assert_eq!(log_range(1.0, 2.0, 4), vec![1.0, 2.0]);
  }

  #[test]
  fn auto_lengths_for_a_long_monthly_span() {
    let start = NaiveDate::from_ymd_opt(1950, 1, 31).unwrap();
    let n = 12 * 60;
    let dates: Vec<NaiveDate> = (0..n)
      .scan(start, |d, _| {
        let out = *d;
        *d = Frequency::Monthly.advance(*d, 1).unwrap();
        Some(out)
      })
      .collect();
    let pair =
      AlignedReturnPair::from_parts(dates, vec![1.01; n], vec![1.0; n], Frequency::Monthly).unwrap();

    // 60 year-ends -> half is 30 -> 1, 3, 10, 30
    assert_eq!(auto_window_years(&pair), vec![1.0, 3.0, 10.0, 30.0]);

    let scanner = WindowScanner::new(&pair, ModelParameters::frictionless());
    let lengths = scanner.window_lengths(&WindowSelection::Auto).unwrap();
    assert_eq!(
      lengths.iter().map(|l| l.periods).collect::<Vec<_>>(),
      vec![12, 36, 120, 360]
    );
  }

  #[test]
  fn placements_count_is_t_minus_w_plus_one() {
    let pair = iid_pair(400, 0.001, 0.02, 0.0, 11);
    let scanner = WindowScanner::new(&pair, ModelParameters::frictionless());
    let config = RollingConfig {
      windows: WindowSelection::Years(vec![30.0 / 365.0, 100.0 / 365.0]),
    };
    let scan = scanner.rolling(ModelKind::Frictionless, &config).unwrap();

    assert_eq!(scan.output.len(), 2);
    for column in &scan.output {
      let w = column.length.periods;
      assert_eq!(column.series.len(), 400 - w + 1);
      assert_eq!(column.series.dates[0], pair.dates()[w - 1]);
      assert_eq!(*column.series.dates.last().unwrap(), pair.last_date());
    }
  }

  #[test]
  fn window_longer_than_span_is_skipped() {
    let pair = iid_pair(50, 0.001, 0.02, 0.0, 3);
    let scanner = WindowScanner::new(&pair, ModelParameters::frictionless());
    let lengths = scanner
      .window_lengths(&WindowSelection::Years(vec![1.0, 10.0 / 365.0]))
      .unwrap();
    assert_eq!(lengths.len(), 1);
    assert_eq!(lengths[0].periods, 10);

    assert!(scanner
      .window_lengths(&WindowSelection::Years(vec![-1.0]))
      .is_err());
  }
}
