use serde::{Deserialize, Serialize};

use super::config::EngineConfig;
use super::engine::project;
use super::error::EngineResult;
use super::payout::LifetimeDivisors;
use super::report::{Report, ReportBuilder, ScenarioKind};
use super::solver::{SolveTarget, SolverConfig, solve_contribution};
use super::support::IncomeLevel;
use super::types::{
    ContributionSchedule, PayoutKind, ProjectionStrategy, Sex, SimulationParams, TaxRate,
};
use super::validation::{validate_target_capital, validate_target_payout};

/// Fixed assumptions of the quick lump-sum estimate.
pub const LUMP_SUM_HORIZON_YEARS: u32 = 15;
pub const LUMP_SUM_ANNUAL_RETURN: f64 = 0.10;
pub const LUMP_SUM_LIFETIME_MONTHS: f64 = 240.0;
const LUMP_SUM_CAPITAL_TOLERANCE: f64 = 0.01;

pub fn compute_capital_at_start(
    params: &SimulationParams,
    config: &EngineConfig,
) -> EngineResult<Report> {
    simulate_report(ScenarioKind::CapitalAtStart, params, config)
}

pub fn compute_from_contribution(
    params: &SimulationParams,
    config: &EngineConfig,
) -> EngineResult<Report> {
    simulate_report(ScenarioKind::FromContribution, params, config)
}

fn simulate_report(
    scenario: ScenarioKind,
    params: &SimulationParams,
    config: &EngineConfig,
) -> EngineResult<Report> {
    let result = project(
        params,
        &config.support,
        &config.limits,
        ProjectionStrategy::Simulated,
    )?;
    let payouts = config.payouts.payout_options(
        result.final_capital,
        params.sex,
        params.age_at_payout_start(),
    );
    tracing::info!(
        scenario = ?scenario,
        final_capital = result.final_capital,
        "Projection complete"
    );
    Ok(ReportBuilder::new(scenario, params, result, payouts).build())
}

pub fn solve_for_target_payment(
    params: &SimulationParams,
    target_monthly: f64,
    kind: PayoutKind,
    config: &EngineConfig,
) -> EngineResult<Report> {
    validate_target_payout(target_monthly, &config.limits)?;
    let target = SolveTarget::MonthlyPayout {
        amount: target_monthly,
        kind,
    };
    solve_report(ScenarioKind::TargetPayout, params, target, config)
}

pub fn solve_for_target_capital(
    params: &SimulationParams,
    target_capital: f64,
    config: &EngineConfig,
) -> EngineResult<Report> {
    validate_target_capital(target_capital, &config.limits)?;
    let target = SolveTarget::FinalCapital {
        amount: target_capital,
    };
    solve_report(ScenarioKind::TargetCapital, params, target, config)
}

fn solve_report(
    scenario: ScenarioKind,
    params: &SimulationParams,
    target: SolveTarget,
    config: &EngineConfig,
) -> EngineResult<Report> {
    let solved = solve_contribution(
        params,
        target,
        &config.support,
        &config.payouts,
        &config.solver,
        &config.limits,
    )?;
    tracing::info!(
        scenario = ?scenario,
        target = target.amount(),
        monthly = solved.required_monthly_contribution,
        converged = solved.converged,
        "Contribution solved"
    );
    Ok(ReportBuilder::from_solve(scenario, params, solved).build())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalLumpSumRequest {
    pub target_sum: f64,
    /// Free-form tier key. Unknown keys fall back to the lowest co-funding
    /// tier.
    pub income_level: String,
    pub tax_rate: TaxRate,
    pub reinvest: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalLumpSumResult {
    pub capital: f64,
    pub monthly_contribution: f64,
    pub personal_total: f64,
    pub state_total: f64,
    pub annual_state_support: f64,
    pub tax_year: f64,
    pub tax_total: f64,
    pub reinvested_tax_total: f64,
    pub investment_income: f64,
    pub life_payment: f64,
    pub ten_year_payment: f64,
    pub lump_sum: f64,
    pub lump_sum_eligible: bool,
    pub match_rate: f64,
    pub income_level: IncomeLevel,
    pub converged: bool,
}

/// Closed-form estimate of the monthly contribution that builds
/// `target_sum` over fifteen years at 10%, with payouts over a flat
/// twenty-year lifetime.
pub fn calculate_capital_lump_sum(
    request: &CapitalLumpSumRequest,
    config: &EngineConfig,
) -> EngineResult<CapitalLumpSumResult> {
    validate_target_capital(request.target_sum, &config.limits)?;

    let income_level = IncomeLevel::resolve(&request.income_level);
    let match_rate = config.support.match_rate_for_level(income_level);

    let params = SimulationParams {
        sex: Sex::Male,
        current_age: config.limits.min_age,
        horizon_years: LUMP_SUM_HORIZON_YEARS,
        contribution: ContributionSchedule::Monthly(0.0),
        income_monthly: 0.0,
        income_level: Some(income_level),
        tax_rate: request.tax_rate,
        reinvest_tax_deduction: request.reinvest,
        starting_capital: 0.0,
        external_transfer_in: 0.0,
        annual_return: LUMP_SUM_ANNUAL_RETURN,
        used_other_deduction_limit_by_year: Default::default(),
    };
    let mut payouts = config.payouts.clone();
    payouts.lifetime = LifetimeDivisors::Flat {
        months: LUMP_SUM_LIFETIME_MONTHS,
    };
    let solver = SolverConfig {
        strategy: ProjectionStrategy::ClosedForm,
        value_tolerance: Some(LUMP_SUM_CAPITAL_TOLERANCE),
        ..config.solver
    };

    let solved = solve_contribution(
        &params,
        SolveTarget::FinalCapital {
            amount: request.target_sum,
        },
        &config.support,
        &payouts,
        &solver,
        &config.limits,
    )?;

    let monthly = solved.required_monthly_contribution;
    let yearly = monthly * 12.0;
    let breakdown = solved.result.breakdown;
    let capital = solved.result.final_capital;

    tracing::info!(
        target = request.target_sum,
        income_level = ?income_level,
        monthly,
        capital,
        "Lump-sum estimate complete"
    );

    Ok(CapitalLumpSumResult {
        capital,
        monthly_contribution: monthly,
        personal_total: breakdown.personal_contributions_total,
        state_total: breakdown.government_support_total,
        annual_state_support: config.support.annual_support(match_rate, yearly),
        tax_year: config
            .support
            .annual_tax_deduction(request.tax_rate, yearly, 0.0),
        tax_total: breakdown.tax_deduction_total,
        reinvested_tax_total: breakdown.reinvested_tax_total,
        investment_income: breakdown.investment_income,
        life_payment: solved.payouts.lifetime_monthly,
        ten_year_payment: solved.payouts.ten_year_monthly,
        lump_sum: solved.payouts.lump_sum,
        lump_sum_eligible: solved.payouts.lump_sum_eligible,
        match_rate,
        income_level,
        converged: solved.converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::EngineError;
    use std::collections::BTreeMap;

    fn assert_approx(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn params() -> SimulationParams {
        SimulationParams {
            sex: Sex::Female,
            current_age: 45,
            horizon_years: 15,
            contribution: ContributionSchedule::Monthly(8_000.0),
            income_monthly: 110_000.0,
            income_level: None,
            tax_rate: TaxRate::Rate15,
            reinvest_tax_deduction: true,
            starting_capital: 0.0,
            external_transfer_in: 200_000.0,
            annual_return: 0.10,
            used_other_deduction_limit_by_year: BTreeMap::new(),
        }
    }

    fn lump_sum_request(level: &str) -> CapitalLumpSumRequest {
        CapitalLumpSumRequest {
            target_sum: 5_000_000.0,
            income_level: level.to_string(),
            tax_rate: TaxRate::Rate13,
            reinvest: true,
        }
    }

    #[test]
    fn lump_sum_end_to_end_hits_target_within_a_cent() {
        let config = EngineConfig::default();
        let result =
            calculate_capital_lump_sum(&lump_sum_request("high"), &config).expect("reachable");

        assert!(result.converged);
        assert!(result.capital >= 5_000_000.0);
        assert!(result.capital - 5_000_000.0 <= 0.01);
        assert_approx(result.life_payment, result.capital / 240.0, 1e-9);
        assert_approx(result.ten_year_payment, result.capital / 120.0, 1e-9);
        assert_approx(result.lump_sum, result.capital, 0.0);
        assert_approx(result.match_rate, 0.25, 0.0);

        let yearly = result.monthly_contribution * 12.0;
        assert_approx(result.personal_total, yearly * 15.0, 1e-6);
        assert_approx(result.annual_state_support, 0.25 * yearly, 1e-6);
        assert_approx(result.state_total, result.annual_state_support * 10.0, 1e-6);
        assert_approx(result.tax_year, 0.13 * yearly, 1e-6);
        assert_approx(result.tax_total, result.tax_year * 15.0, 1e-6);
        assert_approx(
            result.investment_income,
            result.capital - result.personal_total - result.state_total - result.reinvested_tax_total,
            1e-6,
        );
    }

    #[test]
    fn unknown_income_key_uses_lowest_tier() {
        let config = EngineConfig::default();
        let unknown = calculate_capital_lump_sum(&lump_sum_request("platinum"), &config)
            .expect("fallback tier");
        let high = calculate_capital_lump_sum(&lump_sum_request("high"), &config).expect("high");
        assert_eq!(unknown.income_level, IncomeLevel::High);
        assert_eq!(unknown.match_rate, high.match_rate);
        assert_eq!(unknown.monthly_contribution, high.monthly_contribution);

        let low = calculate_capital_lump_sum(&lump_sum_request("LOW"), &config).expect("low");
        assert_approx(low.match_rate, 1.0, 0.0);
        assert!(low.monthly_contribution < high.monthly_contribution);
    }

    #[test]
    fn lump_sum_target_outside_domain_is_rejected() {
        let config = EngineConfig::default();
        let mut request = lump_sum_request("mid");
        request.target_sum = 10_000.0;
        let err = calculate_capital_lump_sum(&request, &config).expect_err("below minimum");
        assert!(matches!(
            err,
            EngineError::Validation {
                field: "targetCapital",
                ..
            }
        ));
    }

    #[test]
    fn capital_at_start_and_from_contribution_agree() {
        let config = EngineConfig::default();
        let at_start = compute_capital_at_start(&params(), &config).expect("valid");
        let from_contribution = compute_from_contribution(&params(), &config).expect("valid");

        assert_eq!(at_start.scenario, ScenarioKind::CapitalAtStart);
        assert_eq!(from_contribution.scenario, ScenarioKind::FromContribution);
        assert_eq!(at_start.final_capital, from_contribution.final_capital);
        assert_eq!(at_start.strategy, ProjectionStrategy::Simulated);
        assert_eq!(at_start.yearly.len(), 15);
        assert_eq!(at_start.age_at_payout_start, 60);
        assert_approx(at_start.breakdown.external_transfer_total, 200_000.0, 0.0);
        // Female at 60 uses the 300-month band.
        assert_approx(
            at_start.payouts.lifetime_monthly,
            at_start.final_capital / 300.0,
            1e-9,
        );
        assert!(at_start.solve.is_none());
    }

    #[test]
    fn target_payment_report_carries_solve_summary() {
        let config = EngineConfig::default();
        let report = solve_for_target_payment(&params(), 40_000.0, PayoutKind::Lifetime, &config)
            .expect("reachable");

        let solve = report.solve.expect("solve summary");
        assert!(solve.converged);
        assert_eq!(solve.target, 40_000.0);
        assert_eq!(report.monthly_contribution, solve.required_monthly_contribution);
        assert!(report.payouts.lifetime_monthly >= 40_000.0);
        assert_eq!(report.scenario, ScenarioKind::TargetPayout);
    }

    #[test]
    fn target_capital_is_validated_and_solved() {
        let config = EngineConfig::default();
        let err = solve_for_target_capital(&params(), 200_000_000.0, &config)
            .expect_err("above maximum");
        assert!(matches!(err, EngineError::Validation { .. }));

        let report =
            solve_for_target_capital(&params(), 3_000_000.0, &config).expect("reachable");
        assert!(report.final_capital >= 3_000_000.0);
        assert_eq!(report.strategy, ProjectionStrategy::Simulated);
    }

    #[test]
    fn target_payout_outside_domain_is_rejected() {
        let config = EngineConfig::default();
        let err = solve_for_target_payment(&params(), 500.0, PayoutKind::TenYear, &config)
            .expect_err("below minimum");
        assert!(matches!(
            err,
            EngineError::Validation {
                field: "targetPayout",
                ..
            }
        ));
    }
}
