use super::error::EngineResult;
use super::rates::{RATE_EPSILON, RateModel};
use super::support::SupportRules;
use super::types::{Breakdown, ProjectionStrategy, SimulationParams, SimulationResult, YearSnapshot};
use super::validation::{ValidationLimits, validate_params};

const MONTHS_PER_YEAR: u32 = 12;

/// Support and reinvested tax earned in one year and credited at the start
/// of the next.
#[derive(Debug, Clone, Copy, Default)]
struct StagedCredit {
    support: f64,
    tax: f64,
}

impl StagedCredit {
    fn take(&mut self) -> StagedCredit {
        std::mem::take(self)
    }
}

#[derive(Debug, Default)]
struct Totals {
    personal: f64,
    support: f64,
    tax_earned: f64,
    reinvested_tax: f64,
}

impl Totals {
    fn credit(&mut self, credit: StagedCredit) -> f64 {
        self.support += credit.support;
        self.reinvested_tax += credit.tax;
        credit.support + credit.tax
    }
}

/// Validates `params` and projects final capital with the chosen strategy.
pub fn project(
    params: &SimulationParams,
    rules: &SupportRules,
    limits: &ValidationLimits,
    strategy: ProjectionStrategy,
) -> EngineResult<SimulationResult> {
    validate_params(params, limits)?;
    let rates = RateModel::new(params.annual_return);
    Ok(project_with_rates(params, rules, &rates, strategy))
}

/// Projection on already validated params with a precomputed rate model.
pub fn project_with_rates(
    params: &SimulationParams,
    rules: &SupportRules,
    rates: &RateModel,
    strategy: ProjectionStrategy,
) -> SimulationResult {
    match strategy {
        ProjectionStrategy::Simulated => AccumulationSimulator::new(rules).run(params, rates),
        ProjectionStrategy::ClosedForm => ClosedFormProjector::new(rules).run(params, rates),
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AccumulationSimulator<'a> {
    rules: &'a SupportRules,
}

impl<'a> AccumulationSimulator<'a> {
    pub fn new(rules: &'a SupportRules) -> Self {
        Self { rules }
    }

    pub fn simulate(
        &self,
        params: &SimulationParams,
        limits: &ValidationLimits,
    ) -> EngineResult<SimulationResult> {
        validate_params(params, limits)?;
        Ok(self.run(params, &RateModel::new(params.annual_return)))
    }

    fn run(&self, params: &SimulationParams, rates: &RateModel) -> SimulationResult {
        let rules = self.rules;
        let match_rate = rules.match_rate_for(params);
        let monthly_amount = params.contribution.monthly_amount();
        let yearly_amount = params.contribution.yearly_amount();

        let mut capital = params.starting_capital + params.external_transfer_in;
        let mut totals = Totals::default();
        let mut staged = StagedCredit::default();
        let mut first_contribution_year = None;
        let mut yearly = Vec::with_capacity(params.horizon_years as usize);

        for year in 1..=params.horizon_years {
            let credited = staged.take();
            capital += totals.credit(credited);

            for _ in 0..MONTHS_PER_YEAR {
                capital = rates.accrue_month(capital + monthly_amount);
            }
            totals.personal += yearly_amount;

            if yearly_amount > 0.0 && first_contribution_year.is_none() {
                first_contribution_year = Some(year);
            }
            let contribution_year = first_contribution_year.map_or(0, |first| year - first + 1);
            let support_earned = rules.support_for_year(match_rate, yearly_amount, contribution_year);
            let tax_earned = rules.annual_tax_deduction(
                params.tax_rate,
                yearly_amount,
                params.used_other_limit(year),
            );
            totals.tax_earned += tax_earned;
            staged = StagedCredit {
                support: support_earned,
                tax: if params.reinvest_tax_deduction {
                    tax_earned
                } else {
                    0.0
                },
            };

            yearly.push(YearSnapshot {
                year,
                age: params.current_age + year - 1,
                personal: yearly_amount,
                support_credited: credited.support,
                tax_credited: credited.tax,
                support_earned,
                tax_earned,
                end_capital: capital,
            });
        }

        // The last year's support and refund land after the horizon but are
        // still part of the payout capital.
        capital += totals.credit(staged.take());

        let mut breakdown = Breakdown {
            personal_contributions_total: totals.personal,
            government_support_total: totals.support,
            tax_deduction_total: totals.tax_earned,
            reinvested_tax_total: totals.reinvested_tax,
            investment_income: 0.0,
            external_transfer_total: params.external_transfer_in,
            starting_capital: params.starting_capital,
        };
        breakdown.investment_income = capital - breakdown.credited_total();

        SimulationResult {
            strategy: ProjectionStrategy::Simulated,
            final_capital: capital,
            breakdown,
            yearly,
        }
    }
}

/// Future value at the horizon of a unit annual inflow received for `years`
/// years from year 1 and compounded for the rest of the horizon.
pub fn stream_weight(rates: &RateModel, horizon_years: u32, years: u32) -> f64 {
    let years = years.min(horizon_years);
    if years == 0 {
        return 0.0;
    }
    let factor = rates.yearly_factor;
    if (factor - 1.0).abs() < RATE_EPSILON {
        return years as f64;
    }
    factor.powi((horizon_years - years) as i32) * (factor.powi(years as i32) - 1.0) / (factor - 1.0)
}

/// Annuity closed form. Support and tax streams are treated as arriving
/// without the one-year lag, so results differ slightly from the simulator.
#[derive(Debug, Clone, Copy)]
pub struct ClosedFormProjector<'a> {
    rules: &'a SupportRules,
}

impl<'a> ClosedFormProjector<'a> {
    pub fn new(rules: &'a SupportRules) -> Self {
        Self { rules }
    }

    pub fn project(
        &self,
        params: &SimulationParams,
        limits: &ValidationLimits,
    ) -> EngineResult<SimulationResult> {
        validate_params(params, limits)?;
        Ok(self.run(params, &RateModel::new(params.annual_return)))
    }

    fn run(&self, params: &SimulationParams, rates: &RateModel) -> SimulationResult {
        let rules = self.rules;
        let horizon = params.horizon_years;
        let months = horizon * MONTHS_PER_YEAR;
        let match_rate = rules.match_rate_for(params);

        let monthly = params.contribution.monthly_amount();
        let yearly = params.contribution.yearly_amount();
        let support_year = rules.annual_support(match_rate, yearly);
        let tax_year = rules.annual_tax_deduction(params.tax_rate, yearly, 0.0);
        let support_years = if yearly > 0.0 {
            rules.support_years().min(horizon)
        } else {
            0
        };

        let contributions_part = monthly * rates.annuity_factor(months);
        let state_part = support_year * stream_weight(rates, horizon, support_years);
        let tax_part = if params.reinvest_tax_deduction {
            tax_year * stream_weight(rates, horizon, horizon)
        } else {
            0.0
        };
        let start_part = (params.starting_capital + params.external_transfer_in) * rates.growth(months);
        let final_capital = contributions_part + state_part + tax_part + start_part;

        let tax_total = tax_year * horizon as f64;
        let mut breakdown = Breakdown {
            personal_contributions_total: yearly * horizon as f64,
            government_support_total: support_year * support_years as f64,
            tax_deduction_total: tax_total,
            reinvested_tax_total: if params.reinvest_tax_deduction {
                tax_total
            } else {
                0.0
            },
            investment_income: 0.0,
            external_transfer_total: params.external_transfer_in,
            starting_capital: params.starting_capital,
        };
        breakdown.investment_income = final_capital - breakdown.credited_total();

        SimulationResult {
            strategy: ProjectionStrategy::ClosedForm,
            final_capital,
            breakdown,
            yearly: Vec::new(),
        }
    }
}
