//! # Leverage Efficiency
//!
//! $$
//! l^\*=\arg\max_l\ \ln\prod_{t}\big(1+l\,(R_{1,t}-1)+(1-l)(R_{2,t}-1)-f_t(l)\big)
//! $$
//!
//! Growth-optimal leverage between a risky and a riskless asset under three
//! return models (frictionless, with rebalancing friction, with friction and
//! borrowing costs), scanned over many time windows and summarised by a
//! parabola fit of the growth curve.
//!
pub mod analysis;
pub mod bounds;
pub mod error;
pub mod fit;
pub mod model;
pub mod params;
pub mod scan;
pub mod series;
pub mod solver;

pub use analysis::AnalysisConfig;
pub use analysis::PairAnalysis;
pub use analysis::PairProperties;
pub use analysis::PairReport;
pub use error::LeverageError;
pub use fit::FitSummary;
pub use fit::GrowthCurveFitter;
pub use model::ModelKind;
pub use params::ModelParameters;
pub use scan::WindowScanner;
pub use series::AlignedReturnPair;
pub use series::Frequency;
pub use series::ReturnSeries;
pub use series::TimeWindow;
pub use solver::LeverageResult;
pub use solver::LeverageSolver;
