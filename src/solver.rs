//! # Optimal Leverage Solver
//!
//! $$
//! l^\*=\arg\min_{l\in(l_{\min},l_{\max})}\Big(-\sum_{t}\ln r_t(l)\Big)
//! $$
//!
//! Growth-optimal leverage of a single window, with windows whose excess
//! return never changes sign resolved analytically.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::solver::brent::BrentOpt;
use ndarray::ArrayView1;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use crate::bounds::classify_excess;
use crate::bounds::leverage_interval;
use crate::bounds::BoundRule;
use crate::bounds::ExcessClass;
use crate::bounds::LeverageInterval;
use crate::error::LeverageError;
use crate::error::Result;
use crate::model::ModelKind;
use crate::params::ModelParameters;
use crate::series::AlignedReturnPair;
use crate::series::TimeWindow;

/// Search bounds applied when the caller has none of its own.
pub const DEFAULT_SEARCH_BOUNDS: LeverageInterval = LeverageInterval {
  lower: -500.0,
  upper: 500.0,
};

const MAX_BISECTIONS: usize = 200;

/// Optimal leverage of a window.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LeverageResult {
  /// Risky and riskless returns coincide; any leverage is optimal.
  Undefined,
  /// The risky asset beats the riskless one in every period.
  PositiveInfinite,
  /// The riskless asset beats the risky one in every period.
  NegativeInfinite,
  /// Interior optimum and the minimized `-ln W_T`.
  Bounded { leverage: f64, neg_log_wealth: f64 },
}

impl LeverageResult {
  /// Leverage as a float: `0` when undefined, `±inf` when unbounded.
  pub fn leverage(&self) -> f64 {
    match self {
      LeverageResult::Undefined => 0.0,
      LeverageResult::PositiveInfinite => f64::INFINITY,
      LeverageResult::NegativeInfinite => f64::NEG_INFINITY,
      LeverageResult::Bounded { leverage, .. } => *leverage,
    }
  }

  pub fn finite_leverage(&self) -> Option<f64> {
    match self {
      LeverageResult::Bounded { leverage, .. } => Some(*leverage),
      _ => None,
    }
  }

  /// Final equity multiple at the optimum.
  pub fn equity(&self) -> f64 {
    match self {
      LeverageResult::Undefined => 1.0,
      LeverageResult::PositiveInfinite | LeverageResult::NegativeInfinite => f64::INFINITY,
      LeverageResult::Bounded { neg_log_wealth, .. } => (-neg_log_wealth).exp(),
    }
  }

  /// `ln W_T` at the optimum.
  pub fn log_wealth(&self) -> f64 {
    match self {
      LeverageResult::Undefined => 0.0,
      LeverageResult::PositiveInfinite | LeverageResult::NegativeInfinite => f64::INFINITY,
      LeverageResult::Bounded { neg_log_wealth, .. } => -neg_log_wealth,
    }
  }

  pub fn is_degenerate(&self) -> bool {
    !matches!(self, LeverageResult::Bounded { .. })
  }
}

/// Settings of the bounded Brent minimizer.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
  /// Relative tolerance on the leverage.
  pub eps: f64,
  /// Absolute tolerance on the leverage.
  pub tol: f64,
  pub max_iters: u64,
}

impl Default for SolverConfig {
  fn default() -> Self {
    Self {
      eps: f64::EPSILON.sqrt(),
      tol: 1e-5,
      max_iters: 500,
    }
  }
}

struct NegLogWealth<'a> {
  model: ModelKind,
  r1: ArrayView1<'a, f64>,
  r2: ArrayView1<'a, f64>,
  params: &'a ModelParameters,
}

impl NegLogWealth<'_> {
  fn value(&self, leverage: f64) -> f64 {
    self
      .model
      .neg_log_wealth(leverage, self.r1, self.r2, self.params)
  }

  fn is_solvent(&self, leverage: f64) -> bool {
    self.value(leverage).is_finite()
  }
}

impl CostFunction for NegLogWealth<'_> {
  type Param = f64;
  type Output = f64;

  fn cost(&self, leverage: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    Ok(self.value(*leverage))
  }
}

/// Growth-optimal leverage solver.
#[derive(Default, Clone, Copy, Debug)]
pub struct LeverageSolver {
  config: SolverConfig,
}

impl LeverageSolver {
  pub fn new(config: SolverConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &SolverConfig {
    &self.config
  }

  /// Optimal leverage over a dated window of `pair`.
  ///
  /// Errors carry the identity of the window.
  pub fn solve(
    &self,
    pair: &AlignedReturnPair,
    window: &TimeWindow,
    model: ModelKind,
    params: &ModelParameters,
    search: &LeverageInterval,
  ) -> Result<LeverageResult> {
    let solved = pair.window_range(window).and_then(|range| {
      let (r1, r2) = pair.slice(range);
      self.solve_returns(r1, r2, model, params, search)
    });
    solved.map_err(|err| err.in_window(*window))
  }

  /// Optimal leverage over raw, equally long return slices.
  pub fn solve_returns<'a>(
    &self,
    r1: ArrayView1<'a, f64>,
    r2: ArrayView1<'a, f64>,
    model: ModelKind,
    params: &'a ModelParameters,
    search: &LeverageInterval,
  ) -> Result<LeverageResult> {
    if r1.len() != r2.len() {
      return Err(LeverageError::LengthMismatch {
        dates: r1.len(),
        values: r2.len(),
      });
    }
    if r1.is_empty() {
      return Err(LeverageError::EmptySeries);
    }

    match classify_excess(r1, r2) {
      ExcessClass::AllZero => {
        debug!(periods = r1.len(), "excess return is zero throughout, l_opt undefined");
        return Ok(LeverageResult::Undefined);
      }
      ExcessClass::AllPositive => {
        debug!(periods = r1.len(), "risky asset dominates, l_opt = +inf");
        return Ok(LeverageResult::PositiveInfinite);
      }
      ExcessClass::AllNegative => {
        debug!(periods = r1.len(), "riskless asset dominates, l_opt = -inf");
        return Ok(LeverageResult::NegativeInfinite);
      }
      ExcessClass::Mixed => {}
    }

    let interval = leverage_interval(r1, r2, BoundRule::Bracket)
      .intersect(&leverage_interval(r1, r2, BoundRule::Bankruptcy))
      .intersect(search);
    if interval.is_empty() || !interval.is_finite() {
      return Err(LeverageError::InfeasibleBounds {
        lower: interval.lower,
        upper: interval.upper,
      });
    }

    let cost = NegLogWealth {
      model,
      r1,
      r2,
      params,
    };
    let interval = self.solvent_bracket(&cost, interval)?;
    let brent =
      BrentOpt::new(interval.lower, interval.upper).set_tolerance(self.config.eps, self.config.tol);
    let res = Executor::new(cost, brent)
      .configure(|state| state.max_iters(self.config.max_iters))
      .run()
      .map_err(|err| LeverageError::Optimizer(err.to_string()))?;

    let leverage = res
      .state
      .best_param
      .or(res.state.param)
      .ok_or_else(|| LeverageError::Optimizer("minimizer returned no iterate".into()))?;

    Ok(LeverageResult::Bounded {
      leverage,
      neg_log_wealth: model.neg_log_wealth(leverage, r1, r2, params),
    })
  }

  /// Part of `interval` on which the wealth path stays solvent, so the
  /// objective is finite wherever Brent evaluates it.
  ///
  /// Ruined edges are pulled towards a solvent anchor (`0` if possible, else
  /// the midpoint) by bisection, to within `tol` of ruin.
  fn solvent_bracket(
    &self,
    cost: &NegLogWealth<'_>,
    interval: LeverageInterval,
  ) -> Result<LeverageInterval> {
    let infeasible = LeverageError::InfeasibleBounds {
      lower: interval.lower,
      upper: interval.upper,
    };
    let midpoint = 0.5 * (interval.lower + interval.upper);
    let Some(anchor) = [0.0, midpoint]
      .into_iter()
      .find(|&l| interval.contains(l) && cost.is_solvent(l))
    else {
      return Err(infeasible);
    };

    let solvent = LeverageInterval::new(
      self.solvent_edge(cost, anchor, interval.lower),
      self.solvent_edge(cost, anchor, interval.upper),
    );
    if solvent.is_empty() {
      return Err(infeasible);
    }
    Ok(solvent)
  }

  fn solvent_edge(&self, cost: &NegLogWealth<'_>, anchor: f64, edge: f64) -> f64 {
    if cost.is_solvent(edge) {
      return edge;
    }
    let (mut inner, mut outer) = (anchor, edge);
    for _ in 0..MAX_BISECTIONS {
      if (outer - inner).abs() <= self.config.tol {
        break;
      }
      let mid = 0.5 * (inner + outer);
      if cost.is_solvent(mid) {
        inner = mid;
      } else {
        outer = mid;
      }
    }
    inner
  }
}

/// [`LeverageSolver::solve`] with the default minimizer settings.
pub fn solve(
  pair: &AlignedReturnPair,
  window: &TimeWindow,
  model: ModelKind,
  params: &ModelParameters,
  search: &LeverageInterval,
) -> Result<LeverageResult> {
  LeverageSolver::default().solve(pair, window, model, params, search)
}
