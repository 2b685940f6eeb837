use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::support::IncomeLevel;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    #[serde(alias = "m")]
    Male,
    #[serde(alias = "f")]
    Female,
}

/// Personal income tax rates eligible for the PDS deduction.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(into = "f64", try_from = "f64")]
pub enum TaxRate {
    Rate13,
    Rate15,
    Rate18,
    Rate20,
    Rate22,
}

impl TaxRate {
    pub const ALL: [TaxRate; 5] = [
        TaxRate::Rate13,
        TaxRate::Rate15,
        TaxRate::Rate18,
        TaxRate::Rate20,
        TaxRate::Rate22,
    ];

    pub fn fraction(self) -> f64 {
        match self {
            TaxRate::Rate13 => 0.13,
            TaxRate::Rate15 => 0.15,
            TaxRate::Rate18 => 0.18,
            TaxRate::Rate20 => 0.20,
            TaxRate::Rate22 => 0.22,
        }
    }

    pub fn percent(self) -> u32 {
        match self {
            TaxRate::Rate13 => 13,
            TaxRate::Rate15 => 15,
            TaxRate::Rate18 => 18,
            TaxRate::Rate20 => 20,
            TaxRate::Rate22 => 22,
        }
    }

    pub fn from_fraction(value: f64) -> Result<Self, EngineError> {
        Self::ALL
            .into_iter()
            .find(|rate| (rate.fraction() - value).abs() < 1e-9)
            .ok_or_else(|| {
                EngineError::validation(
                    "taxRate",
                    format!("{value} is not one of 0.13, 0.15, 0.18, 0.20, 0.22"),
                )
            })
    }

    pub fn from_percent(value: u32) -> Result<Self, EngineError> {
        Self::ALL
            .into_iter()
            .find(|rate| rate.percent() == value)
            .ok_or_else(|| {
                EngineError::validation(
                    "taxRate",
                    format!("{value}% is not one of 13, 15, 18, 20, 22"),
                )
            })
    }
}

impl From<TaxRate> for f64 {
    fn from(value: TaxRate) -> Self {
        value.fraction()
    }
}

impl TryFrom<f64> for TaxRate {
    type Error = EngineError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        TaxRate::from_fraction(value)
    }
}

/// Contribution cadence. Monthly and annual amounts are mutually exclusive.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cadence", content = "amount", rename_all = "lowercase")]
pub enum ContributionSchedule {
    Monthly(f64),
    Annual(f64),
}

impl ContributionSchedule {
    pub fn amount(self) -> f64 {
        match self {
            ContributionSchedule::Monthly(amount) | ContributionSchedule::Annual(amount) => amount,
        }
    }

    /// Amount credited in each month of a year. Annual contributions are
    /// spread evenly over twelve months.
    pub fn monthly_amount(self) -> f64 {
        match self {
            ContributionSchedule::Monthly(amount) => amount,
            ContributionSchedule::Annual(amount) => amount / 12.0,
        }
    }

    pub fn yearly_amount(self) -> f64 {
        match self {
            ContributionSchedule::Monthly(amount) => amount * 12.0,
            ContributionSchedule::Annual(amount) => amount,
        }
    }
}

impl Default for ContributionSchedule {
    fn default() -> Self {
        ContributionSchedule::Monthly(0.0)
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectionStrategy {
    /// Year-by-month simulation with a one-year lag on support and tax
    /// crediting. Authoritative for user-facing numbers.
    #[default]
    #[serde(alias = "simulator")]
    Simulated,
    /// Annuity closed form without the crediting lag.
    #[serde(alias = "closedForm", alias = "closed_form")]
    ClosedForm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParams {
    pub sex: Sex,
    pub current_age: u32,
    pub horizon_years: u32,
    pub contribution: ContributionSchedule,
    pub income_monthly: f64,
    /// Named tier that overrides the bracket lookup on `income_monthly`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income_level: Option<IncomeLevel>,
    pub tax_rate: TaxRate,
    pub reinvest_tax_deduction: bool,
    #[serde(default)]
    pub starting_capital: f64,
    #[serde(default)]
    pub external_transfer_in: f64,
    pub annual_return: f64,
    #[serde(default)]
    pub used_other_deduction_limit_by_year: BTreeMap<u32, f64>,
}

impl SimulationParams {
    pub fn age_at_payout_start(&self) -> u32 {
        self.current_age + self.horizon_years
    }

    pub fn used_other_limit(&self, year: u32) -> f64 {
        self.used_other_deduction_limit_by_year
            .get(&year)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn with_monthly_contribution(&self, monthly: f64) -> Self {
        Self {
            contribution: ContributionSchedule::Monthly(monthly),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub personal_contributions_total: f64,
    pub government_support_total: f64,
    pub tax_deduction_total: f64,
    pub reinvested_tax_total: f64,
    pub investment_income: f64,
    pub external_transfer_total: f64,
    pub starting_capital: f64,
}

impl Breakdown {
    /// Everything credited to the account other than investment growth.
    pub fn credited_total(&self) -> f64 {
        self.personal_contributions_total
            + self.government_support_total
            + self.reinvested_tax_total
            + self.external_transfer_total
            + self.starting_capital
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSnapshot {
    pub year: u32,
    pub age: u32,
    pub personal: f64,
    pub support_credited: f64,
    pub tax_credited: f64,
    pub support_earned: f64,
    pub tax_earned: f64,
    pub end_capital: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub strategy: ProjectionStrategy,
    pub final_capital: f64,
    pub breakdown: Breakdown,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub yearly: Vec<YearSnapshot>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PayoutKind {
    #[serde(alias = "life")]
    Lifetime,
    #[serde(alias = "10y", alias = "tenYear", alias = "ten_year")]
    TenYear,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutOptions {
    pub lifetime_monthly: f64,
    pub lifetime_calculated: bool,
    pub ten_year_monthly: f64,
    pub lump_sum: f64,
    pub lump_sum_eligible: bool,
}

impl PayoutOptions {
    pub fn monthly(&self, kind: PayoutKind) -> f64 {
        match kind {
            PayoutKind::Lifetime => self.lifetime_monthly,
            PayoutKind::TenYear => self.ten_year_monthly,
        }
    }
}
