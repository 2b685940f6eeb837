mod config;
mod engine;
mod error;
mod payout;
mod rates;
mod report;
mod scenario;
mod solver;
mod support;
mod types;
mod validation;

pub use config::EngineConfig;
pub use engine::{
    AccumulationSimulator, ClosedFormProjector, project, project_with_rates, stream_weight,
};
pub use error::{EngineError, EngineResult};
pub use payout::{AnnuityTable, LifetimeDivisors, PayoutCalculator};
pub use rates::{RATE_EPSILON, RateModel, monthly_rate, yearly_factor};
pub use report::{Report, ReportBuilder, ScenarioKind, SolveSummary};
pub use scenario::{
    CapitalLumpSumRequest, CapitalLumpSumResult, LUMP_SUM_ANNUAL_RETURN, LUMP_SUM_HORIZON_YEARS,
    LUMP_SUM_LIFETIME_MONTHS, calculate_capital_lump_sum, compute_capital_at_start,
    compute_from_contribution, solve_for_target_capital, solve_for_target_payment,
};
pub use solver::{
    ContributionSolveResult, SolveIteration, SolveTarget, SolverConfig, solve_contribution,
};
pub use support::{IncomeLevel, MatchBracket, SupportRules};
pub use types::{
    Breakdown, ContributionSchedule, PayoutKind, PayoutOptions, ProjectionStrategy, Sex,
    SimulationParams, SimulationResult, TaxRate, YearSnapshot,
};
pub use validation::{
    AGE_CEILING, HORIZON_CEILING_YEARS, ValidationLimits, validate_params,
    validate_target_capital, validate_target_payout,
};
