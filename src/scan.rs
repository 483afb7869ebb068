//! # Window Scans
//!
//! $$
//! \{\,l^\*([s_k,e_k))\,\}_{k=1}^{K}
//! $$
//!
//! Repeated optimal-leverage solves over families of windows of one aligned
//! pair. Windows are solved in parallel and assembled in ascending time
//! order, so every scan is deterministic.

use std::ops::Range;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::NaiveDate;
use rayon::prelude::*;
use tracing::warn;

use crate::bounds::LeverageInterval;
use crate::error::LeverageError;
use crate::error::Result;
use crate::model::ModelKind;
use crate::params::ModelParameters;
use crate::series::AlignedReturnPair;
use crate::series::TimeWindow;
use crate::solver::LeverageResult;
use crate::solver::LeverageSolver;
use crate::solver::DEFAULT_SEARCH_BOUNDS;

pub mod expanding;
pub mod grid;
pub mod rolling;
pub mod variance;

/// A window whose solve failed; its entry in the scan output is missing.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowFailure {
  pub window: TimeWindow,
  pub model: ModelKind,
  pub error: LeverageError,
}

/// Scan output together with the windows that could not be solved.
#[derive(Clone, Debug, PartialEq)]
pub struct Scan<T> {
  pub output: T,
  pub failures: Vec<WindowFailure>,
}

/// Optimal leverage per window, indexed by the last date inside each window.
#[derive(Clone, Debug, PartialEq)]
pub struct LeverageSeries {
  pub model: ModelKind,
  pub dates: Vec<NaiveDate>,
  /// `None` where the window failed.
  pub values: Vec<Option<LeverageResult>>,
}

impl LeverageSeries {
  pub fn len(&self) -> usize {
    self.dates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }

  pub fn get(&self, date: NaiveDate) -> Option<&LeverageResult> {
    let idx = self.dates.binary_search(&date).ok()?;
    self.values[idx].as_ref()
  }

  /// Leverage as floats, `NaN` for failed windows.
  pub fn leverages(&self) -> Vec<f64> {
    self
      .values
      .iter()
      .map(|v| v.map_or(f64::NAN, |r| r.leverage()))
      .collect()
  }
}

/// Runs scans over one aligned pair with one set of model parameters.
#[derive(Clone, Debug)]
pub struct WindowScanner<'a> {
  pair: &'a AlignedReturnPair,
  params: ModelParameters,
  solver: LeverageSolver,
  search: LeverageInterval,
  cancel: Option<Arc<AtomicBool>>,
}

impl<'a> WindowScanner<'a> {
  pub fn new(pair: &'a AlignedReturnPair, params: ModelParameters) -> Self {
    Self {
      pair,
      params,
      solver: LeverageSolver::default(),
      search: DEFAULT_SEARCH_BOUNDS,
      cancel: None,
    }
  }

  pub fn with_solver(mut self, solver: LeverageSolver) -> Self {
    self.solver = solver;
    self
  }

  /// Bounds intersected with every window's own bracket.
  pub fn with_search_bounds(mut self, search: LeverageInterval) -> Self {
    self.search = search;
    self
  }

  /// Flag checked before each window; once set the scan stops with
  /// [`LeverageError::Cancelled`].
  pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
    self.cancel = Some(cancel);
    self
  }

  pub fn pair(&self) -> &AlignedReturnPair {
    self.pair
  }

  pub fn params(&self) -> &ModelParameters {
    &self.params
  }

  pub fn solver(&self) -> &LeverageSolver {
    &self.solver
  }

  pub fn search_bounds(&self) -> &LeverageInterval {
    &self.search
  }

  fn is_cancelled(&self) -> bool {
    self
      .cancel
      .as_ref()
      .is_some_and(|flag| flag.load(Ordering::Relaxed))
  }

  /// Solve every positional window, in order.
  pub(crate) fn solve_ranges(
    &self,
    model: ModelKind,
    ranges: &[Range<usize>],
  ) -> Result<(Vec<Option<LeverageResult>>, Vec<WindowFailure>)> {
    let solved: Vec<Option<Result<LeverageResult>>> = ranges
      .par_iter()
      .map(|range| {
        if self.is_cancelled() {
          return None;
        }
        let (r1, r2) = self.pair.slice(range.clone());
        Some(
          self
            .solver
            .solve_returns(r1, r2, model, &self.params, &self.search),
        )
      })
      .collect();

    if self.is_cancelled() {
      return Err(LeverageError::Cancelled);
    }

    let mut values = Vec::with_capacity(solved.len());
    let mut failures = Vec::new();
    for (range, outcome) in ranges.iter().zip(solved) {
      match outcome {
        Some(Ok(result)) => values.push(Some(result)),
        Some(Err(error)) => {
          let window = self.pair.window_at(range.clone());
          warn!(%window, %model, %error, "window skipped");
          failures.push(WindowFailure {
            window,
            model,
            error,
          });
          values.push(None);
        }
        None => return Err(LeverageError::Cancelled),
      }
    }

    Ok((values, failures))
  }

  /// Solve every positional window and index the results by window end.
  pub(crate) fn solve_series(
    &self,
    model: ModelKind,
    ranges: &[Range<usize>],
  ) -> Result<Scan<LeverageSeries>> {
    let (values, failures) = self.solve_ranges(model, ranges)?;
    let dates = ranges
      .iter()
      .map(|range| self.pair.dates()[range.end - 1])
      .collect();
    Ok(Scan {
      output: LeverageSeries {
        model,
        dates,
        values,
      },
      failures,
    })
  }
}


#[cfg(test)]
mod tests {
  use super::test_support::daily_pair;
  use super::*;

  #[test]
  fn failures_leave_gaps_without_aborting() {
    let pair = daily_pair(vec![1.02, 0.98, 1.05, 0.97, 1.01], vec![1.0; 5]);
    let scanner = WindowScanner::new(&pair, ModelParameters::frictionless())
      .with_search_bounds(LeverageInterval::new(10.0, 20.0));

    // Brackets: 0..4 -> (-40, 66.7), 3..5 -> (-200, 66.7). 2..3 is degenerate.
    let ranges = vec![0..4, 2..3, 3..5];
    let scan = scanner
      .solve_series(ModelKind::Frictionless, &ranges)
      .unwrap();
    assert_eq!(scan.output.len(), 3);
    assert_eq!(scan.output.values[1], Some(LeverageResult::PositiveInfinite));
    assert!(scan.failures.is_empty());

    let scanner = scanner.with_search_bounds(LeverageInterval::new(200.0, 300.0));
    let scan = scanner
      .solve_series(ModelKind::Frictionless, &ranges)
      .unwrap();
    assert_eq!(scan.output.values[0], None);
    assert_eq!(scan.output.values[1], Some(LeverageResult::PositiveInfinite));
    assert_eq!(scan.output.values[2], None);
    assert_eq!(scan.failures.len(), 2);
    assert_eq!(scan.failures[0].window, pair.window_at(0..4));
    assert!(matches!(
      scan.failures[1].error,
      LeverageError::InfeasibleBounds { .. }
    ));
  }

  #[test]
  fn cancelled_scan_reports_cancellation() {
    let pair = daily_pair(vec![1.02, 0.98, 1.05, 0.97], vec![1.0; 4]);
    let flag = Arc::new(AtomicBool::new(true));
    let scanner =
      WindowScanner::new(&pair, ModelParameters::frictionless()).with_cancel_flag(flag);
    assert_eq!(
      scanner
        .solve_series(ModelKind::Frictionless, &[0..4])
        .unwrap_err(),
      LeverageError::Cancelled
    );
  }
}
