//! # Errors
//!
//! $$
//! \mathcal L=(l_{\min},l_{\max}),\quad l_{\min}<l_{\max}
//! $$
//!
//! Error taxonomy shared by every stage of the leverage engine.

use chrono::NaiveDate;
use thiserror::Error;

use crate::series::TimeWindow;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, LeverageError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LeverageError {
  // ---- Series construction ----
  #[error("series is empty")]
  EmptySeries,

  #[error("dates and values differ in length ({dates} dates, {values} values)")]
  LengthMismatch { dates: usize, values: usize },

  #[error("dates are not strictly increasing at position {position} ({previous} -> {current})")]
  NonIncreasing {
    position: usize,
    previous: NaiveDate,
    current: NaiveDate,
  },

  #[error("gap in series at position {position}: expected {expected}, found {found}")]
  NonContiguous {
    position: usize,
    expected: NaiveDate,
    found: NaiveDate,
  },

  #[error("non-finite value {value} at {date}")]
  NonFiniteValue { date: NaiveDate, value: f64 },

  #[error("series frequencies differ ({risky} vs {riskless})")]
  FrequencyMismatch {
    risky: &'static str,
    riskless: &'static str,
  },

  #[error("risky and riskless series share no dates")]
  EmptyIntersection,

  // ---- Windows ----
  #[error("window {window} is empty or inverted")]
  InvalidWindow { window: TimeWindow },

  #[error("window {window} lies outside the data span [{first}, {end_exclusive})")]
  WindowOutOfSpan {
    window: TimeWindow,
    first: NaiveDate,
    end_exclusive: NaiveDate,
  },

  // ---- Solver ----
  #[error("feasible leverage interval [{lower}, {upper}) is empty")]
  InfeasibleBounds { lower: f64, upper: f64 },

  #[error("window {window}: {source}")]
  Window {
    window: TimeWindow,
    #[source]
    source: Box<LeverageError>,
  },

  #[error("invalid parameter `{name}` = {value}: {reason}")]
  InvalidParameter {
    name: &'static str,
    value: f64,
    reason: &'static str,
  },

  #[error("minimizer failed: {0}")]
  Optimizer(String),

  #[error("scan cancelled")]
  Cancelled,

  // ---- Grid and fit ----
  #[error("leverage grid is undefined for a degenerate excess-return sequence")]
  DegenerateGrid,

  #[error("optimal leverage is not finite, the growth parabola cannot be anchored")]
  UnboundedOptimum,

  #[error("grid has {points} points, not enough to drop {trim} from each end")]
  InsufficientGrid { points: usize, trim: usize },

  #[error("curve fit failed: {0}")]
  Fit(String),
}

impl LeverageError {
  /// Attach the identity of the failing window.
  pub fn in_window(self, window: TimeWindow) -> Self {
    match self {
      already @ LeverageError::Window { .. } => already,
      other => LeverageError::Window {
        window,
        source: Box::new(other),
      },
    }
  }
}
