//! # Feasible Leverage Bounds
//!
//! $$
//! a_t=R_{1,t}-R_{2,t},\qquad b_t=-\frac{c_t}{a_t},\qquad
//! l_{\min}=\max_{b_t<0} b_t,\quad l_{\max}=\min_{b_t>0} b_t
//! $$
//!
//! Leverage interval outside of which the frictionless wealth path cannot
//! stay positive, and classification of windows whose excess return never
//! changes sign.

use ndarray::ArrayView1;
use serde::Deserialize;
use serde::Serialize;

/// Sign pattern of the excess return `a = R1 - R2` over a window.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExcessClass {
  /// `a == 0` everywhere; leverage has no effect.
  AllZero,
  /// `a >= 0` everywhere and positive somewhere; growth increases without
  /// bound in leverage.
  AllPositive,
  /// `a <= 0` everywhere and negative somewhere; growth increases without
  /// bound in short exposure.
  AllNegative,
  /// `a` takes both signs; the optimum is bracketed.
  Mixed,
}

impl ExcessClass {
  pub fn is_degenerate(&self) -> bool {
    !matches!(self, ExcessClass::Mixed)
  }
}

/// Classify the excess-return sign pattern of a window.
///
/// Periods with zero excess do not change the class.
pub fn classify_excess(r1: ArrayView1<f64>, r2: ArrayView1<f64>) -> ExcessClass {
  let (mut positive, mut negative) = (false, false);
  for (&a, &b) in r1.iter().zip(r2.iter()) {
    let excess = a - b;
    positive |= excess > 0.0;
    negative |= excess < 0.0;
    if positive && negative {
      return ExcessClass::Mixed;
    }
  }

  match (positive, negative) {
    (false, false) => ExcessClass::AllZero,
    (true, false) => ExcessClass::AllPositive,
    (false, true) => ExcessClass::AllNegative,
    (true, true) => ExcessClass::Mixed,
  }
}

/// Which numerator `c_t` is used for the per-period bound `-c_t / a_t`.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundRule {
  /// `c_t = 1 + R2`: a wide bracket for the optimizer. Leverage values
  /// between this and the bankruptcy edge are rejected by the objective.
  #[default]
  Bracket,
  /// `c_t = R2`: the exact edge where a period's frictionless return hits zero.
  Bankruptcy,
}

/// Open leverage interval `(lower, upper)`; either side may be infinite.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct LeverageInterval {
  pub lower: f64,
  pub upper: f64,
}

impl LeverageInterval {
  pub fn new(lower: f64, upper: f64) -> Self {
    Self { lower, upper }
  }

  pub fn unbounded() -> Self {
    Self::new(f64::NEG_INFINITY, f64::INFINITY)
  }

  /// Empty, inverted or NaN-bounded.
  pub fn is_empty(&self) -> bool {
    !(self.lower < self.upper)
  }

  pub fn is_finite(&self) -> bool {
    self.lower.is_finite() && self.upper.is_finite()
  }

  pub fn contains(&self, leverage: f64) -> bool {
    self.lower < leverage && leverage < self.upper
  }

  pub fn intersect(&self, other: &LeverageInterval) -> LeverageInterval {
    LeverageInterval::new(self.lower.max(other.lower), self.upper.min(other.upper))
  }

  pub fn width(&self) -> f64 {
    self.upper - self.lower
  }
}

/// Leverage interval implied by a window's returns.
///
/// Periods with `a_t == 0` carry no bound and are skipped. A side with no
/// bounding period is infinite.
pub fn leverage_interval(
  r1: ArrayView1<f64>,
  r2: ArrayView1<f64>,
  rule: BoundRule,
) -> LeverageInterval {
  let mut interval = LeverageInterval::unbounded();
  for (&a1, &a2) in r1.iter().zip(r2.iter()) {
    let excess = a1 - a2;
    if excess == 0.0 {
      continue;
    }
    let numerator = match rule {
      BoundRule::Bracket => 1.0 + a2,
      BoundRule::Bankruptcy => a2,
    };
    let b = -numerator / excess;
    if !b.is_finite() {
      continue;
    }
    if b < 0.0 {
      interval.lower = interval.lower.max(b);
    } else if b > 0.0 {
      interval.upper = interval.upper.min(b);
    }
  }
  interval
}
