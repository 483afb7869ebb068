//! # Pair Analysis
//!
//! $$
//! (R_1,R_2)\;\mapsto\;\big(W(l),\ \hat\sigma,\hat\mu,\ l^\*_{\text{exp}}(t),\ l^\*_W(t),\ \operatorname{Var}(l^\*_W)\big)
//! $$
//!
//! Runs every stage for one risky/riskless pair: leverage grids, the
//! growth-curve fit, expanding and rolling scans, and the variance sweep.
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;
use tracing::info;
use tracing::warn;

use crate::error::LeverageError;
use crate::fit::FitConfig;
use crate::fit::FitOutcome;
use crate::fit::GrowthCurveFitter;
use crate::model::ModelKind;
use crate::params::GridSettings;
use crate::params::ModelParameters;
use crate::scan::expanding::ExpandingConfig;
use crate::scan::grid::LeverageGrid;
use crate::scan::rolling::RollingColumn;
use crate::scan::rolling::RollingConfig;
use crate::scan::rolling::WindowSelection;
use crate::scan::variance::VariancePoint;
use crate::scan::variance::VarianceSweepConfig;
use crate::scan::LeverageSeries;
use crate::scan::WindowFailure;
use crate::scan::WindowScanner;
use crate::series::AlignedReturnPair;
use crate::series::TimeWindow;
use crate::solver::LeverageSolver;
use crate::solver::SolverConfig;

/// Per-pair overrides.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PairProperties {
  /// First and last dates to analyse, both inclusive; either side may be
  /// left open.
  pub date_range: (Option<NaiveDate>, Option<NaiveDate>),
  pub models: Vec<ModelKind>,
  pub windows: WindowSelection,
}

impl Default for PairProperties {
  fn default() -> Self {
    Self {
      date_range: (None, None),
      models: ModelKind::ALL.to_vec(),
      windows: WindowSelection::Auto,
    }
  }
}

impl PairProperties {
  /// Window to analyse. A start before the data or an end after it is
  /// ignored with a warning.
  pub fn analysis_window(&self, pair: &AlignedReturnPair) -> crate::error::Result<TimeWindow> {
    let full = pair.full_window();
    let start = match self.date_range.0 {
      Some(start) if start < full.start => {
        warn!(%start, first = %full.start, "start date before data, using first date");
        full.start
      }
      Some(start) => start,
      None => full.start,
    };
    let end = match self.date_range.1 {
      Some(end) if end > pair.last_date() => {
        warn!(%end, last = %pair.last_date(), "end date after data, using end of data");
        full.end
      }
      Some(end) => pair.frequency().advance(end, 1).unwrap_or(full.end),
      None => full.end,
    };
    TimeWindow::new(start, end)
  }
}

/// Stage settings shared by every pair.
#[derive(Default, Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
  pub grid: GridSettings,
  pub solver: SolverConfig,
  pub expanding: ExpandingConfig,
  pub variance: VarianceSweepConfig,
  pub fit: FitConfig,
}

/// Rolling columns of one model.
#[derive(Clone, Debug, PartialEq)]
pub struct RollingScan {
  pub model: ModelKind,
  pub columns: Vec<RollingColumn>,
}

/// Everything produced for one pair.
#[derive(Clone, Debug, PartialEq)]
pub struct PairReport {
  pub window: TimeWindow,
  pub grids: Vec<LeverageGrid>,
  pub fit: FitOutcome,
  pub expanding: Vec<LeverageSeries>,
  pub rolling: Vec<RollingScan>,
  pub variance: Vec<VariancePoint>,
  /// Windows skipped across all scans.
  pub failures: Vec<WindowFailure>,
}

/// Analysis of one risky/riskless pair.
#[derive(Clone, Debug)]
pub struct PairAnalysis {
  config: AnalysisConfig,
  properties: PairProperties,
  params: ModelParameters,
  cancel: Option<Arc<AtomicBool>>,
}

impl PairAnalysis {
  pub fn new(config: AnalysisConfig, properties: PairProperties, params: ModelParameters) -> Self {
    Self {
      config,
      properties,
      params,
      cancel: None,
    }
  }

  pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
    self.cancel = Some(cancel);
    self
  }

  pub fn config(&self) -> &AnalysisConfig {
    &self.config
  }

  pub fn properties(&self) -> &PairProperties {
    &self.properties
  }

  pub fn run(&self, pair: &AlignedReturnPair) -> anyhow::Result<PairReport> {
    self.params.validate().context("invalid model parameters")?;
    if self.properties.models.is_empty() {
      return Err(LeverageError::InvalidParameter {
        name: "models",
        value: 0.0,
        reason: "at least one model must be selected",
      })
      .context("invalid pair properties");
    }

    let window = self
      .properties
      .analysis_window(pair)
      .context("invalid date range")?;
    let pair = pair
      .restrict(&window)
      .with_context(|| format!("failed to restrict pair to {window}"))?;
    info!(%window, periods = pair.len(), frequency = %pair.frequency(), "analysing pair");

    let mut scanner = WindowScanner::new(&pair, self.params)
      .with_solver(LeverageSolver::new(self.config.solver));
    if let Some(cancel) = &self.cancel {
      scanner = scanner.with_cancel_flag(cancel.clone());
    }
    let models = &self.properties.models;

    let mut grid_models = models.clone();
    if !grid_models.contains(&ModelKind::Frictionless) {
      grid_models.insert(0, ModelKind::Frictionless);
    }
    let mut grids = scanner
      .grid(&grid_models, &self.config.grid)
      .context("leverage grid failed")?;

    let fit = {
      let frictionless = grids
        .iter()
        .find(|g| g.model == ModelKind::Frictionless)
        .context("frictionless grid missing")?;
      GrowthCurveFitter::new(self.config.fit)
        .summarize(&scanner, frictionless)
        .context("growth curve fit failed")?
    };
    grids.retain(|g| models.contains(&g.model));

    let mut failures = Vec::new();
    let mut expanding = Vec::with_capacity(models.len());
    for &model in models {
      let scan = scanner
        .expanding(model, &self.config.expanding)
        .with_context(|| format!("expanding scan of {model} failed"))?;
      expanding.push(scan.output);
      failures.extend(scan.failures);
    }

    let rolling_config = RollingConfig {
      windows: self.properties.windows.clone(),
    };
    let mut rolling = Vec::with_capacity(models.len());
    for &model in models {
      let scan = scanner
        .rolling(model, &rolling_config)
        .with_context(|| format!("rolling scan of {model} failed"))?;
      rolling.push(RollingScan {
        model,
        columns: scan.output,
      });
      failures.extend(scan.failures);
    }

    let variance = scanner
      .variance_sweep(&self.config.variance)
      .context("variance sweep failed")?;
    failures.extend(variance.failures);

    if !failures.is_empty() {
      warn!(failures = failures.len(), "some windows could not be solved");
    }
    info!(%window, "pair analysis finished");

    Ok(PairReport {
      window,
      grids,
      fit,
      expanding,
      rolling,
      variance: variance.output,
      failures,
    })
  }
}
