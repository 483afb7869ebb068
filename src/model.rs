//! # Return Models
//!
//! $$
//! r(l)=1+l(R_1-1)+(1-l)(R_2-1)-f\,|l(1-l)(R_2-R_1)|-\mathbb 1_{l<0}|l|\,r_s-\mathbb 1_{l>1}(l-1)\,r_l
//! $$
//!
//! Leveraged relative return of a risky/riskless mix under three friction
//! models, and the one-way solvency state of a wealth path.

use std::fmt::Display;

use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::Zip;
use serde::Deserialize;
use serde::Serialize;

use crate::error::LeverageError;
use crate::params::ModelParameters;

/// Return model variant.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ModelKind {
  /// Model 1: frictionless rebalancing.
  Frictionless,
  /// Model 2: proportional rebalancing cost.
  Friction,
  /// Model 3: rebalancing cost plus borrowing and shorting premia.
  FrictionBorrowing,
}

impl ModelKind {
  pub const ALL: [ModelKind; 3] = [
    ModelKind::Frictionless,
    ModelKind::Friction,
    ModelKind::FrictionBorrowing,
  ];

  /// 1-based model number.
  pub fn number(&self) -> u8 {
    match self {
      ModelKind::Frictionless => 1,
      ModelKind::Friction => 2,
      ModelKind::FrictionBorrowing => 3,
    }
  }

  /// Leveraged relative return of one period.
  #[inline]
  pub fn period_return(&self, leverage: f64, r1: f64, r2: f64, params: &ModelParameters) -> f64 {
    let l = leverage;
    let base = 1.0 + l * (r1 - 1.0) + (1.0 - l) * (r2 - 1.0);
    if let ModelKind::Frictionless = self {
      return base;
    }

    let with_friction = base - params.friction * (l * (1.0 - l) * (r2 - r1)).abs();
    if let ModelKind::Friction = self {
      return with_friction;
    }

    let short_cost = if l < 0.0 { l.abs() * params.short_rate } else { 0.0 };
    let long_cost = if l > 1.0 { (l - 1.0) * params.long_rate } else { 0.0 };
    with_friction - short_cost - long_cost
  }

  /// Leveraged relative return of every period.
  pub fn leveraged_returns(
    &self,
    leverage: f64,
    r1: ArrayView1<f64>,
    r2: ArrayView1<f64>,
    params: &ModelParameters,
  ) -> Array1<f64> {
    Zip::from(&r1)
      .and(&r2)
      .map_collect(|&a, &b| self.period_return(leverage, a, b, params))
  }

  /// Final state of the wealth path for `leverage`.
  pub fn wealth_path(
    &self,
    leverage: f64,
    r1: ArrayView1<f64>,
    r2: ArrayView1<f64>,
    params: &ModelParameters,
  ) -> WealthPath {
    let mut path = WealthPath::new();
    for (&a, &b) in r1.iter().zip(r2.iter()) {
      if path.step(self.period_return(leverage, a, b, params)).is_ruined() {
        break;
      }
    }
    path
  }

  /// `-ln W_T`, or `+inf` once the path is ruined.
  pub fn neg_log_wealth(
    &self,
    leverage: f64,
    r1: ArrayView1<f64>,
    r2: ArrayView1<f64>,
    params: &ModelParameters,
  ) -> f64 {
    match self.wealth_path(leverage, r1, r2, params).log_wealth() {
      Some(log_wealth) => -log_wealth,
      None => f64::INFINITY,
    }
  }
}

impl TryFrom<u8> for ModelKind {
  type Error = LeverageError;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      1 => Ok(ModelKind::Frictionless),
      2 => Ok(ModelKind::Friction),
      3 => Ok(ModelKind::FrictionBorrowing),
      other => Err(LeverageError::InvalidParameter {
        name: "model",
        value: other as f64,
        reason: "model number must be 1, 2 or 3",
      }),
    }
  }
}

impl From<ModelKind> for u8 {
  fn from(model: ModelKind) -> Self {
    model.number()
  }
}

impl Display for ModelKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "model {}", self.number())
  }
}

/// Solvency of a leveraged wealth path.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum Solvency {
  /// Wealth is positive; log wealth accumulated so far.
  Solvent { log_wealth: f64 },
  /// Wealth hit zero or below at `period` (0-based); terminal.
  Ruined { period: usize },
}

/// Wealth accumulator with a one-way `Solvent -> Ruined` transition.
///
/// Wealth is carried in log space so long windows neither overflow nor
/// underflow.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct WealthPath {
  state: Solvency,
  periods: usize,
}

impl Default for WealthPath {
  fn default() -> Self {
    Self::new()
  }
}

impl WealthPath {
  pub fn new() -> Self {
    Self {
      state: Solvency::Solvent { log_wealth: 0.0 },
      periods: 0,
    }
  }

  /// Apply one period's relative return.
  pub fn step(&mut self, relative_return: f64) -> &Self {
    if let Solvency::Solvent { log_wealth } = self.state {
      // NaN also fails this test and ruins the path.
      self.state = if relative_return > 0.0 {
        Solvency::Solvent {
          log_wealth: log_wealth + relative_return.ln(),
        }
      } else {
        Solvency::Ruined {
          period: self.periods,
        }
      };
    }
    self.periods += 1;
    self
  }

  pub fn state(&self) -> Solvency {
    self.state
  }

  pub fn is_ruined(&self) -> bool {
    matches!(self.state, Solvency::Ruined { .. })
  }

  /// Period at which the path was ruined.
  pub fn ruined_at(&self) -> Option<usize> {
    match self.state {
      Solvency::Ruined { period } => Some(period),
      Solvency::Solvent { .. } => None,
    }
  }

  pub fn log_wealth(&self) -> Option<f64> {
    match self.state {
      Solvency::Solvent { log_wealth } => Some(log_wealth),
      Solvency::Ruined { .. } => None,
    }
  }

  /// Wealth multiple, zero once ruined.
  pub fn wealth(&self) -> f64 {
    self.log_wealth().map_or(0.0, f64::exp)
  }
}
