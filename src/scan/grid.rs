//! # Leverage Grid
//!
//! $$
//! W_t(l_j)=\prod_{s\le t} r_s(l_j),\qquad l_j=l_{\min}+\epsilon+j\,\frac{l_{\max}-l_{\min}}{N}
//! $$
//!
//! Leveraged returns over the full span for an evenly spaced grid of
//! leverage values inside the bankruptcy-free interval.

use chrono::NaiveDate;
use ndarray::s;
use ndarray::Array1;
use ndarray::Array2;
use rayon::prelude::*;
use tracing::info;

use super::WindowScanner;
use crate::bounds::classify_excess;
use crate::bounds::leverage_interval;
use crate::bounds::BoundRule;
use crate::bounds::LeverageInterval;
use crate::error::LeverageError;
use crate::error::Result;
use crate::model::ModelKind;
use crate::model::WealthPath;
use crate::params::GridSettings;

/// Relative returns by date (rows) and leverage (columns) for one model.
#[derive(Clone, Debug, PartialEq)]
pub struct LeverageGrid {
  pub model: ModelKind,
  pub dates: Vec<NaiveDate>,
  pub leverages: Array1<f64>,
  /// `NaN` from each column's ruin period onwards.
  pub returns: Array2<f64>,
  /// First period at which each column's wealth was non-positive.
  pub ruined_at: Vec<Option<usize>>,
}

impl LeverageGrid {
  /// Relative return of a cell; `None` from the ruin period onwards.
  pub fn relative_return(&self, period: usize, column: usize) -> Option<f64> {
    match self.ruined_at[column] {
      Some(ruin) if period >= ruin => None,
      _ => self.returns.get((period, column)).copied(),
    }
  }

  /// Cumulative wealth of one column, zero from the ruin period onwards.
  pub fn equity_curve(&self, column: usize) -> Array1<f64> {
    let mut wealth = 1.0;
    Array1::from_iter((0..self.dates.len()).map(|t| {
      wealth = self.relative_return(t, column).map_or(0.0, |r| wealth * r);
      wealth
    }))
  }

  /// Final wealth of every column.
  pub fn final_equities(&self) -> Array1<f64> {
    Array1::from_iter((0..self.leverages.len()).map(|j| {
      let mut path = WealthPath::new();
      for r in self.returns.column(j) {
        if path.step(*r).is_ruined() {
          break;
        }
      }
      path.wealth()
    }))
  }

  /// Annualised log growth of every column; `-inf` for ruined columns.
  pub fn log_growth_rates(&self, years: f64) -> Array1<f64> {
    self.final_equities().mapv(|w| w.ln() / years)
  }
}

/// Evenly spaced leverage values inside `interval`, `epsilon` away from both ends.
pub fn grid_leverages(interval: &LeverageInterval, settings: &GridSettings) -> Result<Array1<f64>> {
  if settings.resolution == 0 {
    return Err(LeverageError::InvalidParameter {
      name: "resolution",
      value: 0.0,
      reason: "must be at least one",
    });
  }
  if !(settings.epsilon.is_finite() && settings.epsilon >= 0.0) {
    return Err(LeverageError::InvalidParameter {
      name: "epsilon",
      value: settings.epsilon,
      reason: "must be finite and non-negative",
    });
  }
  if !interval.is_finite() || interval.is_empty() {
    return Err(LeverageError::DegenerateGrid);
  }

  let step = interval.width() / settings.resolution as f64;
  let grid = Array1::range(
    interval.lower + settings.epsilon,
    interval.upper - settings.epsilon,
    step,
  );
  if grid.is_empty() {
    return Err(LeverageError::DegenerateGrid);
  }
  Ok(grid)
}

impl WindowScanner<'_> {
  /// Bankruptcy-free leverage interval of the full span.
  pub fn bankruptcy_interval(&self) -> LeverageInterval {
    leverage_interval(
      self.pair.risky(),
      self.pair.riskless(),
      BoundRule::Bankruptcy,
    )
  }

  /// Full-span return table of each model over the leverage grid.
  pub fn grid(&self, models: &[ModelKind], settings: &GridSettings) -> Result<Vec<LeverageGrid>> {
    if classify_excess(self.pair.risky(), self.pair.riskless()).is_degenerate() {
      return Err(LeverageError::DegenerateGrid);
    }
    let interval = self.bankruptcy_interval();
    let leverages = grid_leverages(&interval, settings)?;
    info!(
      points = leverages.len(),
      lower = interval.lower,
      upper = interval.upper,
      "evaluating leverage grid"
    );

    models
      .iter()
      .map(|&model| {
        if self.is_cancelled() {
          return Err(LeverageError::Cancelled);
        }
        Ok(self.grid_for(model, &leverages))
      })
      .collect()
  }

  fn grid_for(&self, model: ModelKind, leverages: &Array1<f64>) -> LeverageGrid {
    let (r1, r2) = (self.pair.risky(), self.pair.riskless());
    let columns: Vec<(Array1<f64>, Option<usize>)> = leverages
      .as_slice()
      .unwrap_or(&[])
      .par_iter()
      .map(|&l| {
        let mut column = model.leveraged_returns(l, r1, r2, &self.params);
        let mut path = WealthPath::new();
        for r in column.iter() {
          if path.step(*r).is_ruined() {
            break;
          }
        }
        if let Some(ruin) = path.ruined_at() {
          column.slice_mut(s![ruin..]).fill(f64::NAN);
        }
        (column, path.ruined_at())
      })
      .collect();

    let mut returns = Array2::zeros((self.pair.len(), leverages.len()));
    let mut ruined_at = Vec::with_capacity(columns.len());
    for (j, (column, ruin)) in columns.into_iter().enumerate() {
      returns.column_mut(j).assign(&column);
      ruined_at.push(ruin);
    }

    LeverageGrid {
      model,
      dates: self.pair.dates().to_vec(),
      leverages: leverages.clone(),
      returns,
      ruined_at,
    }
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;
  use crate::params::ModelParameters;
  use crate::scan::test_support::daily_pair;

  #[test]
  fn grid_spans_the_bankruptcy_interval() {
    let pair = daily_pair(vec![1.02, 0.98, 1.05, 0.97], vec![1.0; 4]);
    let scanner = WindowScanner::new(&pair, ModelParameters::frictionless());
    let settings = GridSettings {
      resolution: 100,
      epsilon: 0.01,
    };
    let grids = scanner.grid(&[ModelKind::Frictionless], &settings).unwrap();
    let grid = &grids[0];

    assert_eq!(grid.returns.dim(), (4, grid.leverages.len()));
    assert_relative_eq!(grid.leverages[0], -20.0 + 0.01, epsilon = 1e-9);
    assert!(*grid.leverages.last().unwrap() < 1.0 / 0.03 - 0.01);
    assert!(grid.ruined_at.iter().all(Option::is_none));
    assert!(grid.returns.iter().all(|r| r.is_finite()));
    assert!(grid.final_equities().iter().all(|w| *w > 0.0));
  }

  #[test]
  fn friction_columns_stay_ruined() {
    let pair = daily_pair(vec![1.3, 0.75, 1.4, 0.8], vec![1.0; 4]);
    let scanner = WindowScanner::new(&pair, ModelParameters::new(3.0, 0.0, 0.0));
    let settings = GridSettings {
      resolution: 50,
      epsilon: 0.001,
    };
    let grids = scanner
      .grid(&[ModelKind::Frictionless, ModelKind::Friction], &settings)
      .unwrap();
    let (m1, m2) = (&grids[0], &grids[1]);

    // The frictionless grid never goes bankrupt inside its own interval.
    assert!(m1.ruined_at.iter().all(Option::is_none));

    let j = m2
      .ruined_at
      .iter()
      .position(Option::is_some)
      .expect("high friction should ruin some leverage");
    let ruin = m2.ruined_at[j].unwrap();
    for t in ruin..m2.dates.len() {
      assert_eq!(m2.relative_return(t, j), None);
      assert!(m2.returns[(t, j)].is_nan());
      assert_eq!(m2.equity_curve(j)[t], 0.0);
    }
    assert_eq!(m2.final_equities()[j], 0.0);
    assert_eq!(m2.log_growth_rates(1.0)[j], f64::NEG_INFINITY);
  }

  #[test]
  fn degenerate_pair_has_no_grid() {
    let pair = daily_pair(vec![1.01, 1.02], vec![1.0, 1.0]);
    let scanner = WindowScanner::new(&pair, ModelParameters::frictionless());
    assert_eq!(
      scanner
        .grid(&ModelKind::ALL, &GridSettings::default())
        .unwrap_err(),
      LeverageError::DegenerateGrid
    );
  }
}
