use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult};
use super::types::SimulationParams;

/// Hard ceilings on configurable limits. Month counts and payout ages are
/// computed in `u32` from these.
pub const AGE_CEILING: u32 = 150;
pub const HORIZON_CEILING_YEARS: u32 = 100;

/// Input domains enforced before any projection runs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValidationLimits {
    pub min_age: u32,
    pub max_age: u32,
    pub max_horizon_years: u32,
    pub min_annual_return: f64,
    pub max_annual_return: f64,
    pub min_target_capital: f64,
    pub max_target_capital: f64,
    pub min_target_payout: f64,
    pub max_target_payout: f64,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            min_age: 18,
            max_age: 100,
            max_horizon_years: 82,
            min_annual_return: 0.0,
            max_annual_return: 0.25,
            min_target_capital: 50_000.0,
            max_target_capital: 100_000_000.0,
            min_target_payout: 1_000.0,
            max_target_payout: 1_000_000.0,
        }
    }
}

impl ValidationLimits {
    pub fn validate(&self) -> EngineResult<()> {
        if self.min_age > self.max_age {
            return Err(EngineError::configuration("minAge must be <= maxAge"));
        }
        if self.max_age > AGE_CEILING {
            return Err(EngineError::configuration(format!(
                "maxAge must be <= {AGE_CEILING}, got {}",
                self.max_age
            )));
        }
        if self.max_horizon_years > HORIZON_CEILING_YEARS {
            return Err(EngineError::configuration(format!(
                "maxHorizonYears must be <= {HORIZON_CEILING_YEARS}, got {}",
                self.max_horizon_years
            )));
        }
        if !(self.min_annual_return <= self.max_annual_return) {
            return Err(EngineError::configuration(
                "minAnnualReturn must be <= maxAnnualReturn",
            ));
        }
        if self.min_annual_return <= -1.0 {
            return Err(EngineError::configuration("minAnnualReturn must be > -1"));
        }
        if !(self.min_target_capital <= self.max_target_capital) {
            return Err(EngineError::configuration(
                "minTargetCapital must be <= maxTargetCapital",
            ));
        }
        if !(self.min_target_payout <= self.max_target_payout) {
            return Err(EngineError::configuration(
                "minTargetPayout must be <= maxTargetPayout",
            ));
        }
        Ok(())
    }
}

pub fn validate_params(params: &SimulationParams, limits: &ValidationLimits) -> EngineResult<()> {
    if params.current_age < limits.min_age || params.current_age > limits.max_age {
        return Err(EngineError::validation(
            "currentAge",
            format!(
                "must be between {} and {}, got {}",
                limits.min_age, limits.max_age, params.current_age
            ),
        ));
    }

    if params.horizon_years == 0 || params.horizon_years > limits.max_horizon_years {
        return Err(EngineError::validation(
            "horizonYears",
            format!(
                "must be between 1 and {}, got {}",
                limits.max_horizon_years, params.horizon_years
            ),
        ));
    }

    non_negative("contribution", params.contribution.amount())?;
    non_negative("incomeMonthly", params.income_monthly)?;
    non_negative("startingCapital", params.starting_capital)?;
    non_negative("externalTransferIn", params.external_transfer_in)?;

    if !params.annual_return.is_finite()
        || params.annual_return < limits.min_annual_return
        || params.annual_return > limits.max_annual_return
    {
        return Err(EngineError::validation(
            "annualReturn",
            format!(
                "must be between {} and {}, got {}",
                limits.min_annual_return, limits.max_annual_return, params.annual_return
            ),
        ));
    }

    for (&year, &used) in &params.used_other_deduction_limit_by_year {
        if year == 0 {
            return Err(EngineError::validation(
                "usedOtherDeductionLimitByYear",
                "years are numbered from 1",
            ));
        }
        non_negative("usedOtherDeductionLimitByYear", used)?;
    }

    Ok(())
}

pub fn validate_target_capital(target: f64, limits: &ValidationLimits) -> EngineResult<()> {
    in_range(
        "targetCapital",
        target,
        limits.min_target_capital,
        limits.max_target_capital,
    )
}

pub fn validate_target_payout(target: f64, limits: &ValidationLimits) -> EngineResult<()> {
    in_range(
        "targetPayout",
        target,
        limits.min_target_payout,
        limits.max_target_payout,
    )
}

fn non_negative(field: &'static str, value: f64) -> EngineResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(EngineError::validation(
            field,
            format!("must be a finite amount >= 0, got {value}"),
        ));
    }
    Ok(())
}

fn in_range(field: &'static str, value: f64, min: f64, max: f64) -> EngineResult<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(EngineError::validation(
            field,
            format!("must be between {min} and {max}, got {value}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ContributionSchedule, Sex, TaxRate};
    use std::collections::BTreeMap;

    fn sample_params() -> SimulationParams {
        SimulationParams {
            sex: Sex::Male,
            current_age: 40,
            horizon_years: 15,
            contribution: ContributionSchedule::Monthly(10_000.0),
            income_monthly: 100_000.0,
            income_level: None,
            tax_rate: TaxRate::Rate13,
            reinvest_tax_deduction: true,
            starting_capital: 0.0,
            external_transfer_in: 0.0,
            annual_return: 0.10,
            used_other_deduction_limit_by_year: BTreeMap::new(),
        }
    }

    fn rejected_field(params: &SimulationParams) -> &'static str {
        match validate_params(params, &ValidationLimits::default()) {
            Err(EngineError::Validation { field, .. }) => field,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn sample_params_are_valid() {
        assert!(validate_params(&sample_params(), &ValidationLimits::default()).is_ok());
    }

    #[test]
    fn age_outside_domain_is_rejected() {
        let mut params = sample_params();
        params.current_age = 17;
        assert_eq!(rejected_field(&params), "currentAge");
        params.current_age = 101;
        assert_eq!(rejected_field(&params), "currentAge");
        params.current_age = 100;
        assert!(validate_params(&params, &ValidationLimits::default()).is_ok());
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let mut params = sample_params();
        params.contribution = ContributionSchedule::Annual(-1.0);
        assert_eq!(rejected_field(&params), "contribution");

        let mut params = sample_params();
        params.income_monthly = -5.0;
        assert_eq!(rejected_field(&params), "incomeMonthly");

        let mut params = sample_params();
        params.external_transfer_in = f64::NAN;
        assert_eq!(rejected_field(&params), "externalTransferIn");

        let mut params = sample_params();
        params.used_other_deduction_limit_by_year.insert(3, -100.0);
        assert_eq!(rejected_field(&params), "usedOtherDeductionLimitByYear");
    }

    #[test]
    fn horizon_and_return_bands_are_enforced() {
        let mut params = sample_params();
        params.horizon_years = 0;
        assert_eq!(rejected_field(&params), "horizonYears");

        let mut params = sample_params();
        params.annual_return = 0.4;
        assert_eq!(rejected_field(&params), "annualReturn");
        params.annual_return = -0.01;
        assert_eq!(rejected_field(&params), "annualReturn");
        params.annual_return = 0.0;
        assert!(validate_params(&params, &ValidationLimits::default()).is_ok());
    }

    #[test]
    fn oversized_limits_are_configuration_errors() {
        assert!(ValidationLimits::default().validate().is_ok());

        let limits = ValidationLimits {
            max_horizon_years: u32::MAX,
            ..ValidationLimits::default()
        };
        assert!(matches!(
            limits.validate(),
            Err(EngineError::Configuration { .. })
        ));

        let limits = ValidationLimits {
            max_age: 151,
            ..ValidationLimits::default()
        };
        assert!(matches!(
            limits.validate(),
            Err(EngineError::Configuration { .. })
        ));

        let limits = ValidationLimits {
            max_age: AGE_CEILING,
            max_horizon_years: HORIZON_CEILING_YEARS,
            ..ValidationLimits::default()
        };
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn target_bounds_are_inclusive() {
        let limits = ValidationLimits::default();
        assert!(validate_target_capital(50_000.0, &limits).is_ok());
        assert!(validate_target_capital(100_000_000.0, &limits).is_ok());
        assert!(validate_target_capital(49_999.0, &limits).is_err());
        assert!(validate_target_capital(100_000_001.0, &limits).is_err());
        assert!(validate_target_payout(999.0, &limits).is_err());
        assert!(validate_target_payout(1_000.0, &limits).is_ok());
    }
}
