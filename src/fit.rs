//! # Growth Curve Fit
//!
//! $$
//! g(l)=-a\,(l-l^\*)^2+g_{\max},\qquad \sigma=\sqrt{2a},\quad
//! \mu_0=g_{\max}-a\,l^{\*2},\quad \mu_e=2a\,l^\*
//! $$
//!
//! Least-squares fit of the curvature of the frictionless growth-vs-leverage
//! curve, with the vertex pinned at the solved optimum. The recovered drift
//! and volatility are collected into a [`FitSummary`].
use std::fmt;
use std::fmt::Display;

use chrono::NaiveDate;
use levenberg_marquardt::LeastSquaresProblem;
use levenberg_marquardt::LevenbergMarquardt;
use nalgebra::DMatrix;
use nalgebra::DVector;
use nalgebra::Dyn;
use nalgebra::Owned;
use ndarray::ArrayView1;
use prettytable::row;
use prettytable::Table;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::error::LeverageError;
use crate::error::Result;
use crate::model::ModelKind;
use crate::model::WealthPath;
use crate::scan::grid::LeverageGrid;
use crate::scan::WindowScanner;
use crate::solver::LeverageResult;

#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
  /// Grid points dropped at each end before fitting.
  pub trim: usize,
  /// Starting value of the curvature `a`.
  pub initial_curvature: f64,
  /// Below this coefficient of determination the fit is flagged.
  pub min_r_squared: f64,
}

impl Default for FitConfig {
  fn default() -> Self {
    Self {
      trim: 50,
      initial_curvature: 0.5,
      min_r_squared: 0.9,
    }
  }
}

/// The parabola fit converged but describes the curve poorly.
#[derive(Clone, Copy, PartialEq, Debug, Serialize)]
pub struct CurveFitQualityWarning {
  pub r_squared: f64,
  pub rmse: f64,
  pub threshold: f64,
}

impl Display for CurveFitQualityWarning {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "growth curve is not quadratic: r2 = {:.4} < {:.4}, rmse = {:.3e}",
      self.r_squared, self.threshold, self.rmse
    )
  }
}

/// Fitted parabola and the parameters it implies.
#[derive(Clone, Copy, PartialEq, Debug, Serialize)]
pub struct ParabolaFit {
  /// Curvature `a`.
  pub curvature: f64,
  pub l_opt: f64,
  pub g_max: f64,
  pub sigma: f64,
  pub mu_riskless: f64,
  pub mu_excess: f64,
  pub rmse: f64,
  pub r_squared: f64,
  /// Points used in the fit.
  pub points: usize,
}

/// One-parameter least-squares problem: only the curvature is free.
#[derive(Clone)]
struct PinnedParabola {
  curvature: f64,
  l_opt: f64,
  g_max: f64,
  leverages: DVector<f64>,
  growth: DVector<f64>,
}

impl PinnedParabola {
  fn model(&self, l: f64) -> f64 {
    -self.curvature * (l - self.l_opt).powi(2) + self.g_max
  }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for PinnedParabola {
  type JacobianStorage = Owned<f64, Dyn, Dyn>;
  type ParameterStorage = Owned<f64, Dyn>;
  type ResidualStorage = Owned<f64, Dyn>;

  fn set_params(&mut self, params: &DVector<f64>) {
    self.curvature = params[0];
  }

  fn params(&self) -> DVector<f64> {
    DVector::from_vec(vec![self.curvature])
  }

  fn residuals(&self) -> Option<DVector<f64>> {
    Some(DVector::from_iterator(
      self.leverages.len(),
      self
        .leverages
        .iter()
        .zip(self.growth.iter())
        .map(|(l, g)| self.model(*l) - g),
    ))
  }

  fn jacobian(&self) -> Option<DMatrix<f64>> {
    Some(DMatrix::from_iterator(
      self.leverages.len(),
      1,
      self.leverages.iter().map(|l| -(l - self.l_opt).powi(2)),
    ))
  }
}

/// Frictionless parameter estimates for one pair.
#[derive(Clone, Copy, PartialEq, Debug, Serialize)]
pub struct FitSummary {
  pub start_date: NaiveDate,
  pub end_date: NaiveDate,
  pub years: f64,
  /// Bankruptcy-free leverage interval of the full span.
  pub min_leverage: f64,
  pub max_leverage: f64,
  pub sigma_est: f64,
  pub mu_riskless_est: f64,
  pub mu_excess_est: f64,
  /// Annual log growth of the riskless asset alone.
  pub g_riskless_measured: f64,
  /// Annual log growth of the risky asset alone.
  pub g_risky_measured: f64,
  pub lopt_1: LeverageResult,
  pub lopt_2: LeverageResult,
  pub lopt_3: LeverageResult,
  /// Standard error of `lopt_1`, `1 / (sigma sqrt(years))`.
  pub lopt_error: f64,
}

fn leverage_cell(result: &LeverageResult) -> String {
  match result {
    LeverageResult::Undefined => "undefined".to_string(),
    LeverageResult::PositiveInfinite => "inf".to_string(),
    LeverageResult::NegativeInfinite => "-inf".to_string(),
    LeverageResult::Bounded { leverage, .. } => format!("{leverage:.2}"),
  }
}

impl Display for FitSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut table = Table::new();
    table.add_row(row!["start_date", self.start_date]);
    table.add_row(row!["end_date", self.end_date]);
    table.add_row(row!["years", format!("{:.2}", self.years)]);
    table.add_row(row!["min_leverage", format!("{:.2}", self.min_leverage)]);
    table.add_row(row!["max_leverage", format!("{:.2}", self.max_leverage)]);
    table.add_row(row!["sigma_est", format!("{:.4}", self.sigma_est)]);
    table.add_row(row!["mu_riskless_est", format!("{:.4}", self.mu_riskless_est)]);
    table.add_row(row!["mu_excess_est", format!("{:.4}", self.mu_excess_est)]);
    table.add_row(row!["g_riskless_measured", format!("{:.4}", self.g_riskless_measured)]);
    table.add_row(row!["g_risky_measured", format!("{:.4}", self.g_risky_measured)]);
    table.add_row(row!["lopt_1", leverage_cell(&self.lopt_1)]);
    table.add_row(row!["lopt_2", leverage_cell(&self.lopt_2)]);
    table.add_row(row!["lopt_3", leverage_cell(&self.lopt_3)]);
    table.add_row(row!["lopt_error", format!("{:.2}", self.lopt_error)]);
    write!(f, "{table}")
  }
}

/// Summary plus the fit diagnostics.
#[derive(Clone, Copy, PartialEq, Debug, Serialize)]
pub struct FitOutcome {
  pub summary: FitSummary,
  pub fit: ParabolaFit,
  pub warning: Option<CurveFitQualityWarning>,
}

/// Annual log growth of holding one asset alone; `-inf` if it ever hits zero.
fn measured_growth(returns: ArrayView1<f64>, years: f64) -> f64 {
  let mut path = WealthPath::new();
  for r in returns {
    if path.step(*r).is_ruined() {
      break;
    }
  }
  path.log_wealth().map_or(f64::NEG_INFINITY, |w| w / years)
}

#[derive(Default, Clone, Copy, Debug)]
pub struct GrowthCurveFitter {
  config: FitConfig,
}

impl GrowthCurveFitter {
  pub fn new(config: FitConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &FitConfig {
    &self.config
  }

  /// Fit the curvature of `growth(leverages)` with the vertex held at
  /// `(l_opt, g_max)`.
  ///
  /// The first and last `trim` points are dropped, as are non-finite growth
  /// values (ruined columns).
  pub fn fit_parabola(
    &self,
    leverages: ArrayView1<f64>,
    growth: ArrayView1<f64>,
    l_opt: f64,
    g_max: f64,
  ) -> Result<(ParabolaFit, Option<CurveFitQualityWarning>)> {
    if leverages.len() != growth.len() {
      return Err(LeverageError::LengthMismatch {
        dates: leverages.len(),
        values: growth.len(),
      });
    }
    let trim = self.config.trim;
    if leverages.len() <= 2 * trim {
      return Err(LeverageError::InsufficientGrid {
        points: leverages.len(),
        trim,
      });
    }

    let (l, g): (Vec<f64>, Vec<f64>) = leverages
      .iter()
      .zip(growth.iter())
      .skip(trim)
      .take(leverages.len() - 2 * trim)
      .filter(|(l, g)| l.is_finite() && g.is_finite())
      .map(|(l, g)| (*l, *g))
      .unzip();
    if l.len() < 2 {
      return Err(LeverageError::InsufficientGrid {
        points: l.len(),
        trim,
      });
    }

    let problem = PinnedParabola {
      curvature: self.config.initial_curvature,
      l_opt,
      g_max,
      leverages: DVector::from_vec(l),
      growth: DVector::from_vec(g),
    };
    let (problem, report) = LevenbergMarquardt::new().minimize(problem);
    if !report.termination.was_successful() {
      return Err(LeverageError::Fit(format!("{:?}", report.termination)));
    }

    let curvature = problem.curvature;
    if !(curvature.is_finite() && curvature >= 0.0) {
      return Err(LeverageError::Fit(format!(
        "curvature {curvature} does not describe a concave growth curve"
      )));
    }

    let residuals = problem
      .residuals()
      .ok_or_else(|| LeverageError::Fit("residuals unavailable".into()))?;
    let points = residuals.len();
    let ss_res = residuals.norm_squared();
    let mean = problem.growth.mean();
    let ss_tot = problem.growth.iter().map(|g| (g - mean).powi(2)).sum::<f64>();
    let r_squared = if ss_tot > 0.0 {
      1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
      1.0
    } else {
      0.0
    };
    let rmse = (ss_res / points as f64).sqrt();

    let fit = ParabolaFit {
      curvature,
      l_opt,
      g_max,
      sigma: (2.0 * curvature).sqrt(),
      mu_riskless: g_max - curvature * l_opt * l_opt,
      mu_excess: 2.0 * curvature * l_opt,
      rmse,
      r_squared,
      points,
    };

    let warning = (r_squared < self.config.min_r_squared).then(|| {
      let warning = CurveFitQualityWarning {
        r_squared,
        rmse,
        threshold: self.config.min_r_squared,
      };
      warn!(%warning, "poor quadratic fit");
      warning
    });

    Ok((fit, warning))
  }

  /// Solve all three models over the full span and fit the frictionless grid.
  ///
  /// `grid` must be the frictionless grid of the scanner's pair. The solves
  /// are bounded by the bankruptcy-free interval.
  pub fn summarize(&self, scanner: &WindowScanner<'_>, grid: &LeverageGrid) -> Result<FitOutcome> {
    if grid.model != ModelKind::Frictionless {
      return Err(LeverageError::InvalidParameter {
        name: "grid model",
        value: f64::from(grid.model.number()),
        reason: "the growth curve is fitted to the frictionless grid",
      });
    }
    let pair = scanner.pair();
    let years = pair.years();
    if !(years > 0.0) {
      return Err(LeverageError::InvalidParameter {
        name: "years",
        value: years,
        reason: "the span must be longer than zero days",
      });
    }

    let interval = scanner.bankruptcy_interval();
    let window = pair.full_window();
    let solve = |model: ModelKind| {
      scanner
        .solver()
        .solve(pair, &window, model, scanner.params(), &interval)
    };
    let lopt_1 = solve(ModelKind::Frictionless)?;
    let lopt_2 = solve(ModelKind::Friction)?;
    let lopt_3 = solve(ModelKind::FrictionBorrowing)?;

    let (l_opt, neg_log_wealth) = match lopt_1 {
      LeverageResult::Bounded {
        leverage,
        neg_log_wealth,
      } => (leverage, neg_log_wealth),
      _ => return Err(LeverageError::UnboundedOptimum),
    };
    let g_max = -neg_log_wealth / years;

    let growth = grid.log_growth_rates(years);
    let (fit, warning) = self.fit_parabola(grid.leverages.view(), growth.view(), l_opt, g_max)?;

    let summary = FitSummary {
      start_date: pair.first_date(),
      end_date: pair.last_date(),
      years,
      min_leverage: interval.lower,
      max_leverage: interval.upper,
      sigma_est: fit.sigma,
      mu_riskless_est: fit.mu_riskless,
      mu_excess_est: fit.mu_excess,
      g_riskless_measured: measured_growth(pair.riskless(), years),
      g_risky_measured: measured_growth(pair.risky(), years),
      lopt_1,
      lopt_2,
      lopt_3,
      lopt_error: 1.0 / (fit.sigma * years.sqrt()),
    };
    info!(
      sigma = summary.sigma_est,
      mu_excess = summary.mu_excess_est,
      lopt = l_opt,
      r_squared = fit.r_squared,
      "growth curve fitted"
    );

    Ok(FitOutcome {
      summary,
      fit,
      warning,
    })
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;
  use ndarray::Array1;

  use super::*;
  use crate::params::GridSettings;
  use crate::params::ModelParameters;
  use crate::scan::test_support::daily_pair;
  use crate::scan::test_support::iid_pair;

  fn exact_curve(sigma: f64, mu_riskless: f64, mu_excess: f64) -> (Array1<f64>, Array1<f64>) {
    let l = Array1::linspace(-3.0, 6.0, 201);
    let g = l.mapv(|l| mu_riskless + l * mu_excess - 0.5 * sigma * sigma * l * l);
    (l, g)
  }

  #[test]
  fn recovers_parameters_of_an_exact_parabola() {
    let (sigma, mu_riskless, mu_excess) = (0.2, 0.02, 0.06);
    let (l, g) = exact_curve(sigma, mu_riskless, mu_excess);
    let l_opt = mu_excess / (sigma * sigma);
    let g_max = mu_riskless + mu_excess * mu_excess / (2.0 * sigma * sigma);

    let (fit, warning) = GrowthCurveFitter::default()
      .fit_parabola(l.view(), g.view(), l_opt, g_max)
      .unwrap();

    assert_eq!(fit.points, 101);
    assert_relative_eq!(fit.sigma, sigma, epsilon = 1e-6);
    assert_relative_eq!(fit.mu_riskless, mu_riskless, epsilon = 1e-6);
    assert_relative_eq!(fit.mu_excess, mu_excess, epsilon = 1e-6);
    assert!(fit.r_squared > 0.999999);
    assert!(warning.is_none());
  }

  #[test]
  fn noisy_curve_is_flagged_but_not_rejected() {
    let (l, g) = exact_curve(0.2, 0.02, 0.06);
    let g = Array1::from_iter(
      g.iter()
        .enumerate()
        .map(|(i, g)| if i % 2 == 0 { g + 0.5 } else { g - 0.5 }),
    );

    let (fit, warning) = GrowthCurveFitter::default()
      .fit_parabola(l.view(), g.view(), 1.5, 0.065)
      .unwrap();

    let warning = warning.expect("alternating noise should spoil the fit");
    assert!(warning.r_squared < 0.9);
    assert_relative_eq!(warning.rmse, fit.rmse);
    assert_eq!(warning.threshold, 0.9);
  }

  #[test]
  fn too_few_points_after_trimming() {
    let l = Array1::linspace(0.0, 1.0, 100);
    let g = l.clone();
    assert_eq!(
      GrowthCurveFitter::default()
        .fit_parabola(l.view(), g.view(), 0.5, 1.0)
        .unwrap_err(),
      LeverageError::InsufficientGrid {
        points: 100,
        trim: 50
      }
    );
  }

  #[test]
  fn ruined_columns_are_left_out() {
    let (l, mut g) = exact_curve(0.2, 0.02, 0.06);
    g[60] = f64::NEG_INFINITY;
    let (fit, _) = GrowthCurveFitter::default()
      .fit_parabola(l.view(), g.view(), 1.5, 0.065)
      .unwrap();
    assert_eq!(fit.points, 100);
    assert_relative_eq!(fit.sigma, 0.2, epsilon = 1e-6);
  }

  #[test]
  fn summary_of_a_simulated_pair() {
    let pair = iid_pair(2000, 0.0004, 0.01, 0.0001, 17);
    let params = ModelParameters::new(0.0005, 0.0001, 0.0002);
    let scanner = WindowScanner::new(&pair, params);
    let grids = scanner
      .grid(&[ModelKind::Frictionless], &GridSettings::default())
      .unwrap();

    let outcome = GrowthCurveFitter::default()
      .summarize(&scanner, &grids[0])
      .unwrap();
    let summary = outcome.summary;

    let interval = scanner.bankruptcy_interval();
    assert_eq!(summary.min_leverage, interval.lower);
    assert_eq!(summary.max_leverage, interval.upper);
    assert_relative_eq!(summary.years, 1999.0 / 365.25);
    assert_relative_eq!(
      summary.g_riskless_measured,
      2000.0 * 1.0001f64.ln() / summary.years,
      max_relative = 1e-12
    );
    assert_relative_eq!(
      summary.lopt_error,
      1.0 / (summary.sigma_est * summary.years.sqrt())
    );
    assert_relative_eq!(
      summary.mu_excess_est,
      summary.sigma_est.powi(2) * outcome.fit.l_opt,
      max_relative = 1e-9
    );
    assert!(summary.sigma_est > 0.0);
    assert!(interval.contains(summary.lopt_1.leverage()));
    assert!(summary.lopt_2.finite_leverage().is_some());
    assert!(summary.lopt_3.finite_leverage().is_some());

    let table = summary.to_string();
    assert!(table.contains("sigma_est"));
    assert!(table.contains("lopt_error"));
  }

  #[test]
  fn summary_requires_a_bounded_optimum() {
    // The friction grid is rejected before anything is solved.
    let pair = daily_pair(vec![1.02, 0.98, 1.05, 0.97], vec![1.0; 4]);
    let scanner = WindowScanner::new(&pair, ModelParameters::frictionless());
    let settings = GridSettings {
      resolution: 200,
      epsilon: 0.01,
    };
    let grids = scanner.grid(&[ModelKind::Friction], &settings).unwrap();
    assert!(matches!(
      GrowthCurveFitter::default()
        .summarize(&scanner, &grids[0])
        .unwrap_err(),
      LeverageError::InvalidParameter { .. }
    ));

    let pair = daily_pair(vec![1.01, 1.02, 1.03], vec![1.0; 3]);
    let scanner = WindowScanner::new(&pair, ModelParameters::frictionless());
    let grid = LeverageGrid {
      model: ModelKind::Frictionless,
      dates: pair.dates().to_vec(),
      leverages: Array1::linspace(0.0, 1.0, 200),
      returns: ndarray::Array2::ones((3, 200)),
      ruined_at: vec![None; 200],
    };
    assert_eq!(
      GrowthCurveFitter::default()
        .summarize(&scanner, &grid)
        .unwrap_err(),
      LeverageError::UnboundedOptimum
    );
  }
}
