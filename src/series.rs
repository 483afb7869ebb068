//! # Return Series
//!
//! $$
//! W_T=\prod_{t=1}^{T} R_t,\qquad R_t=1+r_t
//! $$
//!
//! Date-indexed relative-return series, the aligned risky/riskless pair the
//! engine consumes, and half-open time windows over that pair.

use std::cmp::Ordering;
use std::fmt::Display;
use std::ops::Range;

use chrono::Datelike;
use chrono::Days;
use chrono::Months;
use chrono::NaiveDate;
use ndarray::s;
use ndarray::Array1;
use ndarray::ArrayView1;
use serde::Deserialize;
use serde::Serialize;

use crate::error::LeverageError;
use crate::error::Result;

/// Sampling frequency of a return series.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
  /// One observation per calendar day.
  #[default]
  Daily,
  /// One observation per month, either on a fixed day or on the last day.
  Monthly,
}

impl Frequency {
  pub fn name(&self) -> &'static str {
    match self {
      Frequency::Daily => "daily",
      Frequency::Monthly => "monthly",
    }
  }

  /// Number of periods in one year.
  pub fn periods_per_year(&self) -> f64 {
    match self {
      Frequency::Daily => 365.0,
      Frequency::Monthly => 12.0,
    }
  }

  /// Date `n` periods after `date`.
  ///
  /// Month-end dates stay on month ends.
  pub fn advance(&self, date: NaiveDate, n: u32) -> Option<NaiveDate> {
    match self {
      Frequency::Daily => date.checked_add_days(Days::new(n as u64)),
      Frequency::Monthly => {
        if is_month_end(date) {
          date
            .with_day(1)?
            .checked_add_months(Months::new(n + 1))?
            .pred_opt()
        } else {
          date.checked_add_months(Months::new(n))
        }
      }
    }
  }
}

impl Display for Frequency {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.name())
  }
}

fn is_month_end(date: NaiveDate) -> bool {
  date
    .succ_opt()
    .map_or(true, |next| next.month() != date.month())
}

/// Half-open interval `[start, end)` of dates.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TimeWindow {
  pub start: NaiveDate,
  pub end: NaiveDate,
}

impl TimeWindow {
  pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
    let window = Self { start, end };
    if start >= end {
      return Err(LeverageError::InvalidWindow { window });
    }
    Ok(window)
  }
}

impl Display for TimeWindow {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "[{}, {})", self.start, self.end)
  }
}

fn validate_index(dates: &[NaiveDate], values: &[f64], frequency: Frequency) -> Result<()> {
  if dates.len() != values.len() {
    return Err(LeverageError::LengthMismatch {
      dates: dates.len(),
      values: values.len(),
    });
  }
  if dates.is_empty() {
    return Err(LeverageError::EmptySeries);
  }

  for (date, &value) in dates.iter().zip(values) {
    if !value.is_finite() {
      return Err(LeverageError::NonFiniteValue { date: *date, value });
    }
  }

  for (position, pair) in dates.windows(2).enumerate() {
    let (previous, current) = (pair[0], pair[1]);
    if current <= previous {
      return Err(LeverageError::NonIncreasing {
        position: position + 1,
        previous,
        current,
      });
    }
    let expected = frequency.advance(previous, 1).unwrap_or(NaiveDate::MAX);
    if current != expected {
      return Err(LeverageError::NonContiguous {
        position: position + 1,
        expected,
        found: current,
      });
    }
  }

  Ok(())
}

/// Relative returns (`1 + r_t`) indexed by contiguous dates.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnSeries {
  dates: Vec<NaiveDate>,
  values: Array1<f64>,
  frequency: Frequency,
}

impl ReturnSeries {
  /// Build a series from relative returns.
  ///
  /// Dates must be strictly increasing with no missing period and every value finite.
  pub fn new(dates: Vec<NaiveDate>, values: Vec<f64>, frequency: Frequency) -> Result<Self> {
    validate_index(&dates, &values, frequency)?;
    Ok(Self {
      dates,
      values: Array1::from_vec(values),
      frequency,
    })
  }

  /// Build a series from a level (price or index) series.
  ///
  /// The first level only serves as the base of the first return.
  pub fn from_levels(dates: Vec<NaiveDate>, levels: &[f64], frequency: Frequency) -> Result<Self> {
    if dates.len() != levels.len() {
      return Err(LeverageError::LengthMismatch {
        dates: dates.len(),
        values: levels.len(),
      });
    }
    if levels.len() < 2 {
      return Err(LeverageError::EmptySeries);
    }

    let values = levels.windows(2).map(|w| w[1] / w[0]).collect();
    Self::new(dates[1..].to_vec(), values, frequency)
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn values(&self) -> ArrayView1<'_, f64> {
    self.values.view()
  }

  pub fn frequency(&self) -> Frequency {
    self.frequency
  }

  pub fn len(&self) -> usize {
    self.dates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }
}

/// Risky and riskless relative returns restricted to their common dates.
#[derive(Clone, Debug, PartialEq)]
pub struct AlignedReturnPair {
  dates: Vec<NaiveDate>,
  risky: Array1<f64>,
  riskless: Array1<f64>,
  frequency: Frequency,
  end_exclusive: NaiveDate,
}

impl AlignedReturnPair {
  /// Inner-join two series on their dates.
  pub fn align(risky: &ReturnSeries, riskless: &ReturnSeries) -> Result<Self> {
    if risky.frequency != riskless.frequency {
      return Err(LeverageError::FrequencyMismatch {
        risky: risky.frequency.name(),
        riskless: riskless.frequency.name(),
      });
    }

    let mut dates = Vec::new();
    let mut r1 = Vec::new();
    let mut r2 = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < risky.len() && j < riskless.len() {
      match risky.dates[i].cmp(&riskless.dates[j]) {
        Ordering::Less => i += 1,
        Ordering::Greater => j += 1,
        Ordering::Equal => {
          dates.push(risky.dates[i]);
          r1.push(risky.values[i]);
          r2.push(riskless.values[j]);
          i += 1;
          j += 1;
        }
      }
    }

    if dates.is_empty() {
      return Err(LeverageError::EmptyIntersection);
    }

    Self::from_parts(dates, r1, r2, risky.frequency)
  }

  /// Build a pair from already aligned columns.
  pub fn from_parts(
    dates: Vec<NaiveDate>,
    risky: Vec<f64>,
    riskless: Vec<f64>,
    frequency: Frequency,
  ) -> Result<Self> {
    validate_index(&dates, &risky, frequency)?;
    validate_index(&dates, &riskless, frequency)?;

    let last = dates[dates.len() - 1];
    let end_exclusive = frequency.advance(last, 1).unwrap_or(NaiveDate::MAX);

    Ok(Self {
      dates,
      risky: Array1::from_vec(risky),
      riskless: Array1::from_vec(riskless),
      frequency,
      end_exclusive,
    })
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn risky(&self) -> ArrayView1<'_, f64> {
    self.risky.view()
  }

  pub fn riskless(&self) -> ArrayView1<'_, f64> {
    self.riskless.view()
  }

  pub fn frequency(&self) -> Frequency {
    self.frequency
  }

  pub fn len(&self) -> usize {
    self.dates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.dates.is_empty()
  }

  pub fn first_date(&self) -> NaiveDate {
    self.dates[0]
  }

  pub fn last_date(&self) -> NaiveDate {
    self.dates[self.dates.len() - 1]
  }

  /// Date one period after the last observation.
  pub fn end_exclusive(&self) -> NaiveDate {
    self.end_exclusive
  }

  /// Window covering every observation.
  pub fn full_window(&self) -> TimeWindow {
    TimeWindow {
      start: self.first_date(),
      end: self.end_exclusive,
    }
  }

  /// Span length in years of 365.25 days, first to last observation.
  pub fn years(&self) -> f64 {
    (self.last_date() - self.first_date()).num_days() as f64 / 365.25
  }

  /// Positional range covered by `window`.
  pub fn window_range(&self, window: &TimeWindow) -> Result<Range<usize>> {
    if window.start >= window.end {
      return Err(LeverageError::InvalidWindow { window: *window });
    }
    if window.start < self.first_date() || window.end > self.end_exclusive {
      return Err(LeverageError::WindowOutOfSpan {
        window: *window,
        first: self.first_date(),
        end_exclusive: self.end_exclusive,
      });
    }

    let start = self.dates.partition_point(|d| *d < window.start);
    let end = self.dates.partition_point(|d| *d < window.end);
    if start >= end {
      return Err(LeverageError::InvalidWindow { window: *window });
    }
    Ok(start..end)
  }

  /// Window whose observations are exactly `range`.
  pub fn window_at(&self, range: Range<usize>) -> TimeWindow {
    let end = self
      .dates
      .get(range.end)
      .copied()
      .unwrap_or(self.end_exclusive);
    TimeWindow {
      start: self.dates[range.start],
      end,
    }
  }

  /// Risky and riskless views over a positional range.
  pub fn slice(&self, range: Range<usize>) -> (ArrayView1<'_, f64>, ArrayView1<'_, f64>) {
    (
      self.risky.slice(s![range.clone()]),
      self.riskless.slice(s![range]),
    )
  }

  /// New pair holding only the observations inside `window`.
  pub fn restrict(&self, window: &TimeWindow) -> Result<Self> {
    let range = self.window_range(window)?;
    let (r1, r2) = self.slice(range.clone());
    Self::from_parts(
      self.dates[range].to_vec(),
      r1.to_vec(),
      r2.to_vec(),
      self.frequency,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  fn daily(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    (0..n)
      .map(|i| start + Days::new(i as u64))
      .collect()
  }

  #[test]
  fn monthly_advance_keeps_month_end() {
    let f = Frequency::Monthly;
    assert_eq!(f.advance(date(2020, 1, 31), 1), Some(date(2020, 2, 29)));
    assert_eq!(f.advance(date(2020, 2, 29), 1), Some(date(2020, 3, 31)));
    assert_eq!(f.advance(date(2020, 1, 1), 3), Some(date(2020, 4, 1)));
  }

  #[test]
  fn rejects_gap_in_daily_series() {
    let dates = vec![date(2020, 1, 1), date(2020, 1, 2), date(2020, 1, 4)];
    let err = ReturnSeries::new(dates, vec![1.0, 1.0, 1.0], Frequency::Daily).unwrap_err();
    assert_eq!(
      err,
      LeverageError::NonContiguous {
        position: 2,
        expected: date(2020, 1, 3),
        found: date(2020, 1, 4),
      }
    );
  }

  #[test]
  fn rejects_unordered_dates() {
    let dates = vec![date(2020, 1, 2), date(2020, 1, 1)];
    let err = ReturnSeries::new(dates, vec![1.0, 1.0], Frequency::Daily).unwrap_err();
    assert!(matches!(err, LeverageError::NonIncreasing { position: 1, .. }));
  }

  #[test]
  fn from_levels_drops_first_period() {
    let dates = daily(date(2020, 1, 1), 3);
    let s = ReturnSeries::from_levels(dates, &[100.0, 110.0, 99.0], Frequency::Daily).unwrap();
    assert_eq!(s.len(), 2);
    assert_eq!(s.dates()[0], date(2020, 1, 2));
    assert!((s.values()[0] - 1.1).abs() < 1e-12);
    assert!((s.values()[1] - 0.9).abs() < 1e-12);
  }

  #[test]
  fn align_keeps_common_dates_only() {
    let a = ReturnSeries::new(
      daily(date(2020, 1, 1), 5),
      vec![1.01, 1.02, 1.03, 1.04, 1.05],
      Frequency::Daily,
    )
    .unwrap();
    let b = ReturnSeries::new(
      daily(date(2020, 1, 3), 5),
      vec![1.0; 5],
      Frequency::Daily,
    )
    .unwrap();

    let pair = AlignedReturnPair::align(&a, &b).unwrap();
    assert_eq!(pair.len(), 3);
    assert_eq!(pair.first_date(), date(2020, 1, 3));
    assert_eq!(pair.last_date(), date(2020, 1, 5));
    assert_eq!(pair.risky().to_vec(), vec![1.03, 1.04, 1.05]);
    assert_eq!(pair.end_exclusive(), date(2020, 1, 6));
  }

  #[test]
  fn disjoint_series_do_not_align() {
    let a = ReturnSeries::new(daily(date(2020, 1, 1), 2), vec![1.0; 2], Frequency::Daily).unwrap();
    let b = ReturnSeries::new(daily(date(2021, 1, 1), 2), vec![1.0; 2], Frequency::Daily).unwrap();
    assert_eq!(
      AlignedReturnPair::align(&a, &b).unwrap_err(),
      LeverageError::EmptyIntersection
    );
  }

  #[test]
  fn window_range_is_half_open() {
    let pair = AlignedReturnPair::from_parts(
      daily(date(2020, 1, 1), 10),
      vec![1.0; 10],
      vec![1.0; 10],
      Frequency::Daily,
    )
    .unwrap();

    let w = TimeWindow::new(date(2020, 1, 3), date(2020, 1, 6)).unwrap();
    assert_eq!(pair.window_range(&w).unwrap(), 2..5);
    assert_eq!(pair.window_range(&pair.full_window()).unwrap(), 0..10);
    assert_eq!(pair.window_at(2..5), w);
    assert_eq!(pair.window_at(0..10), pair.full_window());
  }

  #[test]
  fn window_outside_span_is_rejected() {
    let pair = AlignedReturnPair::from_parts(
      daily(date(2020, 1, 1), 10),
      vec![1.0; 10],
      vec![1.0; 10],
      Frequency::Daily,
    )
    .unwrap();

    let w = TimeWindow::new(date(2019, 12, 31), date(2020, 1, 5)).unwrap();
    assert!(matches!(
      pair.window_range(&w),
      Err(LeverageError::WindowOutOfSpan { .. })
    ));
    assert!(TimeWindow::new(date(2020, 1, 5), date(2020, 1, 5)).is_err());
  }
}
