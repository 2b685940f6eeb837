use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult};
use super::types::{PayoutOptions, Sex};

/// Expected payout period, in months, per starting-age band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnuityTable {
    male: Vec<(u32, f64)>,
    female: Vec<(u32, f64)>,
}

impl Default for AnnuityTable {
    fn default() -> Self {
        Self {
            male: vec![
                (55, 300.0),
                (60, 240.0),
                (65, 180.0),
                (70, 120.0),
                (75, 84.0),
                (80, 60.0),
            ],
            female: vec![
                (55, 360.0),
                (60, 300.0),
                (65, 240.0),
                (70, 180.0),
                (75, 120.0),
                (80, 84.0),
            ],
        }
    }
}

impl AnnuityTable {
    pub fn new(male: Vec<(u32, f64)>, female: Vec<(u32, f64)>) -> EngineResult<Self> {
        let table = Self { male, female };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> EngineResult<()> {
        for (sex, bands) in [("male", &self.male), ("female", &self.female)] {
            if bands.windows(2).any(|pair| pair[0].0 >= pair[1].0) {
                return Err(EngineError::configuration(format!(
                    "{sex} annuity bands must be sorted by strictly increasing age"
                )));
            }
            if let Some((age, months)) = bands
                .iter()
                .find(|(_, months)| !months.is_finite() || *months <= 0.0)
            {
                return Err(EngineError::configuration(format!(
                    "{sex} annuity band at age {age} has invalid divisor {months}"
                )));
            }
        }
        Ok(())
    }

    /// Divisor of the band with the greatest age not above `age_at_start`.
    pub fn divisor(&self, sex: Sex, age_at_start: u32) -> Option<f64> {
        let bands = match sex {
            Sex::Male => &self.male,
            Sex::Female => &self.female,
        };
        bands
            .iter()
            .take_while(|(age, _)| *age <= age_at_start)
            .last()
            .map(|(_, months)| *months)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum LifetimeDivisors {
    Flat { months: f64 },
    Table(AnnuityTable),
}

impl Default for LifetimeDivisors {
    fn default() -> Self {
        LifetimeDivisors::Table(AnnuityTable::default())
    }
}

impl LifetimeDivisors {
    pub fn divisor(&self, sex: Sex, age_at_start: u32) -> Option<f64> {
        match self {
            LifetimeDivisors::Flat { months } => Some(*months),
            LifetimeDivisors::Table(table) => table.divisor(sex, age_at_start),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PayoutCalculator {
    pub lifetime: LifetimeDivisors,
    pub fixed_term_months: f64,
    pub reference_minimum_pension: f64,
    pub lump_sum_threshold_share: f64,
}

impl Default for PayoutCalculator {
    fn default() -> Self {
        Self {
            lifetime: LifetimeDivisors::default(),
            fixed_term_months: 120.0,
            reference_minimum_pension: 12_000.0,
            lump_sum_threshold_share: 0.10,
        }
    }
}

impl PayoutCalculator {
    pub fn with_flat_lifetime(months: f64) -> Self {
        Self {
            lifetime: LifetimeDivisors::Flat { months },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        match &self.lifetime {
            LifetimeDivisors::Flat { months } if !months.is_finite() || *months <= 0.0 => {
                return Err(EngineError::configuration(format!(
                    "flat lifetime divisor must be > 0, got {months}"
                )));
            }
            LifetimeDivisors::Flat { .. } => {}
            LifetimeDivisors::Table(table) => table.validate()?,
        }
        if !self.fixed_term_months.is_finite() || self.fixed_term_months <= 0.0 {
            return Err(EngineError::configuration(
                "fixedTermMonths must be > 0",
            ));
        }
        if !self.reference_minimum_pension.is_finite() || self.reference_minimum_pension < 0.0 {
            return Err(EngineError::configuration(
                "referenceMinimumPension must be >= 0",
            ));
        }
        Ok(())
    }

    /// Lifetime monthly payout, or `None` when no divisor covers the age.
    pub fn lifetime_monthly(&self, final_capital: f64, sex: Sex, age_at_start: u32) -> Option<f64> {
        self.lifetime
            .divisor(sex, age_at_start)
            .map(|months| final_capital / months)
    }

    pub fn fixed_term_monthly(&self, final_capital: f64) -> f64 {
        final_capital / self.fixed_term_months
    }

    pub fn lump_sum_allowed(&self, lifetime_monthly: f64) -> bool {
        lifetime_monthly < self.lump_sum_threshold_share * self.reference_minimum_pension
    }

    pub fn payout_options(&self, final_capital: f64, sex: Sex, age_at_start: u32) -> PayoutOptions {
        let lifetime = self.lifetime_monthly(final_capital, sex, age_at_start);
        let lifetime_monthly = lifetime.unwrap_or(0.0);
        PayoutOptions {
            lifetime_monthly,
            lifetime_calculated: lifetime.is_some(),
            ten_year_monthly: self.fixed_term_monthly(final_capital),
            lump_sum: final_capital,
            lump_sum_eligible: self.lump_sum_allowed(lifetime_monthly),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn table_lookup_uses_greatest_band_not_above_age() {
        let table = AnnuityTable::default();
        assert_eq!(table.divisor(Sex::Male, 55), Some(300.0));
        assert_eq!(table.divisor(Sex::Male, 59), Some(300.0));
        assert_eq!(table.divisor(Sex::Male, 60), Some(240.0));
        assert_eq!(table.divisor(Sex::Female, 67), Some(240.0));
        assert_eq!(table.divisor(Sex::Female, 95), Some(84.0));
    }

    #[test]
    fn ages_below_first_band_are_uncalculated() {
        let calc = PayoutCalculator::default();
        let options = calc.payout_options(1_200_000.0, Sex::Male, 50);
        assert!(!options.lifetime_calculated);
        assert_approx(options.lifetime_monthly, 0.0);
        assert_approx(options.ten_year_monthly, 10_000.0);
        assert_approx(options.lump_sum, 1_200_000.0);
    }

    #[test]
    fn payout_options_report_lump_sum_regardless_of_eligibility() {
        let calc = PayoutCalculator::default();

        let small = calc.payout_options(180_000.0, Sex::Male, 60);
        assert_approx(small.lifetime_monthly, 750.0);
        assert!(small.lump_sum_eligible);
        assert_approx(small.lump_sum, 180_000.0);

        let large = calc.payout_options(3_600_000.0, Sex::Female, 60);
        assert_approx(large.lifetime_monthly, 12_000.0);
        assert!(!large.lump_sum_eligible);
        assert_approx(large.lump_sum, 3_600_000.0);
    }

    #[test]
    fn flat_divisor_ignores_sex_and_age() {
        let calc = PayoutCalculator::with_flat_lifetime(240.0);
        let options = calc.payout_options(4_800_000.0, Sex::Female, 20);
        assert!(options.lifetime_calculated);
        assert_approx(options.lifetime_monthly, 20_000.0);
        assert_approx(options.ten_year_monthly, 40_000.0);
    }

    #[test]
    fn unsorted_table_is_rejected() {
        let err = AnnuityTable::new(vec![(60, 240.0), (55, 300.0)], vec![(55, 360.0)])
            .expect_err("unsorted bands must fail");
        assert!(matches!(err, EngineError::Configuration { .. }));
        let err = AnnuityTable::new(vec![(55, 0.0)], vec![]).expect_err("zero divisor");
        assert!(matches!(err, EngineError::Configuration { .. }));
    }
}
