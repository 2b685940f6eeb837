use serde::{Deserialize, Serialize};

use super::engine::project_with_rates;
use super::error::{EngineError, EngineResult};
use super::payout::PayoutCalculator;
use super::rates::RateModel;
use super::support::SupportRules;
use super::types::{PayoutKind, PayoutOptions, ProjectionStrategy, SimulationParams, SimulationResult};
use super::validation::{ValidationLimits, validate_params};

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum SolveTarget {
    FinalCapital { amount: f64 },
    MonthlyPayout { amount: f64, kind: PayoutKind },
}

impl SolveTarget {
    pub fn amount(self) -> f64 {
        match self {
            SolveTarget::FinalCapital { amount } | SolveTarget::MonthlyPayout { amount, .. } => {
                amount
            }
        }
    }

    fn achieved(self, result: &SimulationResult, payouts: &PayoutOptions) -> f64 {
        match self {
            SolveTarget::FinalCapital { .. } => result.final_capital,
            SolveTarget::MonthlyPayout { kind, .. } => payouts.monthly(kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SolverConfig {
    pub search_min: f64,
    pub search_max: f64,
    /// Bisection stops once the bracket is narrower than this.
    pub tolerance: f64,
    pub max_iterations: u32,
    pub strategy: ProjectionStrategy,
    /// When set, convergence also requires the achieved value to overshoot
    /// the target by no more than this.
    pub value_tolerance: Option<f64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            search_min: 0.0,
            search_max: 2_000_000.0,
            tolerance: 0.01,
            max_iterations: 80,
            strategy: ProjectionStrategy::Simulated,
            value_tolerance: None,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> EngineResult<()> {
        if !self.search_min.is_finite() || !self.search_max.is_finite() {
            return Err(EngineError::configuration("search bounds must be finite"));
        }
        if self.search_min < 0.0 {
            return Err(EngineError::configuration("searchMin must be >= 0"));
        }
        if self.search_max <= self.search_min {
            return Err(EngineError::configuration(
                "searchMax must be greater than searchMin",
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(EngineError::configuration("tolerance must be > 0"));
        }
        if self.max_iterations == 0 {
            return Err(EngineError::configuration("maxIterations must be > 0"));
        }
        if self
            .value_tolerance
            .is_some_and(|value_tolerance| !value_tolerance.is_finite() || value_tolerance <= 0.0)
        {
            return Err(EngineError::configuration("valueTolerance must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub candidate: f64,
    pub achieved: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionSolveResult {
    pub target: SolveTarget,
    pub required_monthly_contribution: f64,
    pub result: SimulationResult,
    pub payouts: PayoutOptions,
    pub iterations: Vec<SolveIteration>,
    pub converged: bool,
}

/// Everything needed to evaluate one candidate contribution.
struct Objective<'a> {
    params: &'a SimulationParams,
    rules: &'a SupportRules,
    payouts: &'a PayoutCalculator,
    rates: RateModel,
    strategy: ProjectionStrategy,
    target: SolveTarget,
}

struct Evaluation {
    achieved: f64,
    result: SimulationResult,
    payouts: PayoutOptions,
}

impl Objective<'_> {
    fn evaluate(&self, monthly: f64) -> Evaluation {
        let params = self.params.with_monthly_contribution(monthly);
        let result = project_with_rates(&params, self.rules, &self.rates, self.strategy);
        let payouts = self.payouts.payout_options(
            result.final_capital,
            params.sex,
            params.age_at_payout_start(),
        );
        Evaluation {
            achieved: self.target.achieved(&result, &payouts),
            result,
            payouts,
        }
    }
}

/// Smallest monthly contribution whose projection meets `target`.
///
/// The contribution cadence in `params` is ignored; every candidate is a
/// monthly amount.
pub fn solve_contribution(
    params: &SimulationParams,
    target: SolveTarget,
    rules: &SupportRules,
    payouts: &PayoutCalculator,
    config: &SolverConfig,
    limits: &ValidationLimits,
) -> EngineResult<ContributionSolveResult> {
    config.validate()?;
    validate_params(params, limits)?;
    validate_target(params, target, payouts)?;

    let objective = Objective {
        params,
        rules,
        payouts,
        rates: RateModel::new(params.annual_return),
        strategy: config.strategy,
        target,
    };
    let goal = target.amount();

    let low_eval = objective.evaluate(config.search_min);
    if low_eval.achieved >= goal {
        tracing::debug!(target = goal, "Target met at lower search bound");
        return Ok(finish(target, config.search_min, low_eval, Vec::new(), true));
    }

    let high_eval = objective.evaluate(config.search_max);
    if high_eval.achieved < goal {
        return Err(EngineError::UnreachableTarget {
            target: goal,
            achievable: high_eval.achieved,
            upper_bound: config.search_max,
        });
    }

    let mut lo = config.search_min;
    let mut hi = config.search_max;
    let mut hi_eval = high_eval;
    let mut iterations = Vec::with_capacity(config.max_iterations as usize);
    let mut converged = false;

    let mut it = 0;
    while it < config.max_iterations {
        it += 1;
        let mid = (lo + hi) * 0.5;
        let eval = objective.evaluate(mid);
        iterations.push(SolveIteration {
            iteration: it,
            lower_bound: lo,
            upper_bound: hi,
            candidate: mid,
            achieved: eval.achieved,
        });

        if eval.achieved >= goal {
            hi = mid;
            hi_eval = eval;
        } else {
            lo = mid;
        }

        let within_value = config
            .value_tolerance
            .is_none_or(|value_tolerance| hi_eval.achieved - goal <= value_tolerance);
        if hi - lo < config.tolerance && within_value {
            converged = true;
            break;
        }
    }

    if converged {
        tracing::debug!(
            target = goal,
            monthly = hi,
            iterations = iterations.len(),
            "Solved required contribution"
        );
    } else {
        tracing::warn!(
            target = goal,
            monthly = hi,
            width = hi - lo,
            "Reached max iterations before tolerance was met; returning best estimate"
        );
    }

    Ok(finish(target, hi, hi_eval, iterations, converged))
}

fn finish(
    target: SolveTarget,
    monthly: f64,
    eval: Evaluation,
    iterations: Vec<SolveIteration>,
    converged: bool,
) -> ContributionSolveResult {
    ContributionSolveResult {
        target,
        required_monthly_contribution: monthly,
        result: eval.result,
        payouts: eval.payouts,
        iterations,
        converged,
    }
}

fn validate_target(
    params: &SimulationParams,
    target: SolveTarget,
    payouts: &PayoutCalculator,
) -> EngineResult<()> {
    let amount = target.amount();
    if !amount.is_finite() || amount < 0.0 {
        return Err(EngineError::validation(
            "target",
            format!("must be a finite amount >= 0, got {amount}"),
        ));
    }
    if let SolveTarget::MonthlyPayout {
        kind: PayoutKind::Lifetime,
        ..
    } = target
    {
        let age = params.age_at_payout_start();
        if payouts.lifetime.divisor(params.sex, age).is_none() {
            return Err(EngineError::validation(
                "payoutKind",
                format!("no lifetime payout divisor applies at age {age}"),
            ));
        }
    }
    Ok(())
}
