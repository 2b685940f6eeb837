use serde::{Deserialize, Serialize};

use super::solver::ContributionSolveResult;
use super::types::{
    Breakdown, PayoutOptions, ProjectionStrategy, SimulationParams, SimulationResult, YearSnapshot,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    CapitalAtStart,
    FromContribution,
    TargetPayout,
    TargetCapital,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveSummary {
    pub required_monthly_contribution: f64,
    pub target: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Display-ready numbers for one calculation. Amounts are raw floats; the
/// caller owns rounding and currency formatting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub scenario: ScenarioKind,
    pub strategy: ProjectionStrategy,
    pub age_at_payout_start: u32,
    pub monthly_contribution: f64,
    pub final_capital: f64,
    #[serde(flatten)]
    pub breakdown: Breakdown,
    pub payouts: PayoutOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solve: Option<SolveSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub yearly: Vec<YearSnapshot>,
}

pub struct ReportBuilder {
    scenario: ScenarioKind,
    age_at_payout_start: u32,
    monthly_contribution: f64,
    result: SimulationResult,
    payouts: PayoutOptions,
    solve: Option<SolveSummary>,
}

impl ReportBuilder {
    pub fn new(
        scenario: ScenarioKind,
        params: &SimulationParams,
        result: SimulationResult,
        payouts: PayoutOptions,
    ) -> Self {
        Self {
            scenario,
            age_at_payout_start: params.age_at_payout_start(),
            monthly_contribution: params.contribution.monthly_amount(),
            result,
            payouts,
            solve: None,
        }
    }

    /// Report for a solved contribution. The monthly contribution shown is
    /// the solved one, not the cadence the caller supplied.
    pub fn from_solve(
        scenario: ScenarioKind,
        params: &SimulationParams,
        solved: ContributionSolveResult,
    ) -> Self {
        let summary = SolveSummary {
            required_monthly_contribution: solved.required_monthly_contribution,
            target: solved.target.amount(),
            iterations: solved.iterations.len(),
            converged: solved.converged,
        };
        Self {
            monthly_contribution: solved.required_monthly_contribution,
            solve: Some(summary),
            ..Self::new(scenario, params, solved.result, solved.payouts)
        }
    }

    pub fn build(self) -> Report {
        Report {
            scenario: self.scenario,
            strategy: self.result.strategy,
            age_at_payout_start: self.age_at_payout_start,
            monthly_contribution: self.monthly_contribution,
            final_capital: self.result.final_capital,
            breakdown: self.result.breakdown,
            payouts: self.payouts,
            solve: self.solve,
            yearly: self.result.yearly,
        }
    }
}
