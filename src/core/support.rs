use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult};
use super::types::{SimulationParams, TaxRate};

/// One co-funding bracket. Incomes up to and including `upper_bound` get
/// `rate`; `None` marks the open-ended top bracket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchBracket {
    pub upper_bound: Option<f64>,
    pub rate: f64,
}

impl MatchBracket {
    pub fn bounded(upper_bound: f64, rate: f64) -> Self {
        Self {
            upper_bound: Some(upper_bound),
            rate,
        }
    }

    pub fn unbounded(rate: f64) -> Self {
        Self {
            upper_bound: None,
            rate,
        }
    }

    fn contains(&self, income_monthly: f64) -> bool {
        self.upper_bound.is_none_or(|bound| income_monthly <= bound)
    }
}

/// Named income tiers used by the quick lump-sum flow.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncomeLevel {
    Low,
    #[serde(alias = "medium")]
    Mid,
    High,
}

impl IncomeLevel {
    /// The tier used when a caller supplies an unknown key. It carries the
    /// lowest co-funding rate.
    pub const FALLBACK: IncomeLevel = IncomeLevel::High;

    pub fn parse(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "low" => Some(IncomeLevel::Low),
            "mid" | "medium" => Some(IncomeLevel::Mid),
            "high" => Some(IncomeLevel::High),
            _ => None,
        }
    }

    pub fn resolve(key: &str) -> Self {
        Self::parse(key).unwrap_or_else(|| {
            tracing::warn!(
                income_level = key,
                fallback = ?Self::FALLBACK,
                "Unknown income level, using lowest co-funding tier"
            );
            Self::FALLBACK
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "SupportRulesConfig")]
pub struct SupportRules {
    brackets: Vec<MatchBracket>,
    annual_cap: f64,
    min_yearly_contribution: f64,
    support_years: u32,
    deduction_base_limit: f64,
}

/// Wire form of [`SupportRules`]. Missing fields take the program defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SupportRulesConfig {
    brackets: Vec<MatchBracket>,
    annual_cap: f64,
    min_yearly_contribution: f64,
    support_years: u32,
    deduction_base_limit: f64,
}

impl Default for SupportRulesConfig {
    fn default() -> Self {
        let rules = SupportRules::default();
        Self {
            brackets: rules.brackets,
            annual_cap: rules.annual_cap,
            min_yearly_contribution: rules.min_yearly_contribution,
            support_years: rules.support_years,
            deduction_base_limit: rules.deduction_base_limit,
        }
    }
}

impl TryFrom<SupportRulesConfig> for SupportRules {
    type Error = EngineError;

    fn try_from(value: SupportRulesConfig) -> Result<Self, Self::Error> {
        SupportRules::new(
            value.brackets,
            value.annual_cap,
            value.min_yearly_contribution,
            value.support_years,
            value.deduction_base_limit,
        )
    }
}

impl Default for SupportRules {
    fn default() -> Self {
        Self {
            brackets: vec![
                MatchBracket::bounded(80_000.0, 1.0),
                MatchBracket::bounded(150_000.0, 0.5),
                MatchBracket::unbounded(0.25),
            ],
            annual_cap: 36_000.0,
            min_yearly_contribution: 2_000.0,
            support_years: 10,
            deduction_base_limit: 400_000.0,
        }
    }
}

impl SupportRules {
    pub fn new(
        brackets: Vec<MatchBracket>,
        annual_cap: f64,
        min_yearly_contribution: f64,
        support_years: u32,
        deduction_base_limit: f64,
    ) -> EngineResult<Self> {
        validate_brackets(&brackets)?;
        for (name, value) in [
            ("annualCap", annual_cap),
            ("minYearlyContribution", min_yearly_contribution),
            ("deductionBaseLimit", deduction_base_limit),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::configuration(format!(
                    "{name} must be finite and >= 0, got {value}"
                )));
            }
        }
        Ok(Self {
            brackets,
            annual_cap,
            min_yearly_contribution,
            support_years,
            deduction_base_limit,
        })
    }

    pub fn brackets(&self) -> &[MatchBracket] {
        &self.brackets
    }

    pub fn annual_cap(&self) -> f64 {
        self.annual_cap
    }

    pub fn min_yearly_contribution(&self) -> f64 {
        self.min_yearly_contribution
    }

    pub fn support_years(&self) -> u32 {
        self.support_years
    }

    pub fn deduction_base_limit(&self) -> f64 {
        self.deduction_base_limit
    }

    pub fn match_rate(&self, income_monthly: f64) -> f64 {
        self.brackets
            .iter()
            .find(|bracket| bracket.contains(income_monthly))
            .or(self.brackets.last())
            .map_or(0.0, |bracket| bracket.rate)
    }

    /// Low maps to the first bracket, High to the last, Mid to the second
    /// (or the last when fewer than three brackets are configured).
    pub fn match_rate_for_level(&self, level: IncomeLevel) -> f64 {
        let last = self.brackets.len().saturating_sub(1);
        let index = match level {
            IncomeLevel::Low => 0,
            IncomeLevel::Mid => 1.min(last),
            IncomeLevel::High => last,
        };
        self.brackets.get(index).map_or(0.0, |bracket| bracket.rate)
    }

    pub fn match_rate_for(&self, params: &SimulationParams) -> f64 {
        match params.income_level {
            Some(level) => self.match_rate_for_level(level),
            None => self.match_rate(params.income_monthly),
        }
    }

    pub fn annual_support(&self, match_rate: f64, yearly_personal: f64) -> f64 {
        if yearly_personal < self.min_yearly_contribution {
            return 0.0;
        }
        (match_rate * yearly_personal).min(self.annual_cap)
    }

    /// Support for the `contribution_year`-th year counted from the first
    /// year with a personal contribution (1-based).
    pub fn support_for_year(
        &self,
        match_rate: f64,
        yearly_personal: f64,
        contribution_year: u32,
    ) -> f64 {
        if contribution_year == 0 || contribution_year > self.support_years {
            return 0.0;
        }
        self.annual_support(match_rate, yearly_personal)
    }

    pub fn annual_tax_deduction(
        &self,
        tax_rate: TaxRate,
        yearly_personal: f64,
        used_other_limit: f64,
    ) -> f64 {
        let base_available = (self.deduction_base_limit - used_other_limit).max(0.0);
        tax_rate.fraction() * yearly_personal.min(base_available)
    }
}

fn validate_brackets(brackets: &[MatchBracket]) -> EngineResult<()> {
    let Some(last) = brackets.last() else {
        return Err(EngineError::configuration(
            "at least one co-funding bracket is required",
        ));
    };
    if last.upper_bound.is_some() {
        return Err(EngineError::configuration(
            "the last co-funding bracket must be unbounded",
        ));
    }

    let mut previous_bound = f64::NEG_INFINITY;
    let mut previous_rate = f64::INFINITY;
    for (index, bracket) in brackets.iter().enumerate() {
        if !bracket.rate.is_finite() || bracket.rate < 0.0 {
            return Err(EngineError::configuration(format!(
                "bracket {index} has invalid rate {}",
                bracket.rate
            )));
        }
        // The last bracket must carry the lowest rate: it backs IncomeLevel::FALLBACK.
        if bracket.rate > previous_rate {
            return Err(EngineError::configuration(format!(
                "bracket {index} rate {} is higher than the previous bracket rate {previous_rate}",
                bracket.rate
            )));
        }
        previous_rate = bracket.rate;
        let is_last = index + 1 == brackets.len();
        match bracket.upper_bound {
            None if !is_last => {
                return Err(EngineError::configuration(format!(
                    "bracket {index} is unbounded but is not the last bracket"
                )));
            }
            None => {}
            Some(bound) => {
                if !bound.is_finite() || bound < 0.0 {
                    return Err(EngineError::configuration(format!(
                        "bracket {index} has invalid upper bound {bound}"
                    )));
                }
                if bound <= previous_bound {
                    return Err(EngineError::configuration(format!(
                        "bracket {index} upper bound {bound} overlaps the previous bracket"
                    )));
                }
                previous_bound = bound;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, proptest};

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn match_rate_uses_first_bracket_containing_income() {
        let rules = SupportRules::default();
        assert_approx(rules.match_rate(0.0), 1.0);
        assert_approx(rules.match_rate(80_000.0), 1.0);
        assert_approx(rules.match_rate(80_000.01), 0.5);
        assert_approx(rules.match_rate(150_000.0), 0.5);
        assert_approx(rules.match_rate(1_000_000.0), 0.25);
    }

    #[test]
    fn income_levels_map_onto_bracket_positions() {
        let rules = SupportRules::default();
        assert_approx(rules.match_rate_for_level(IncomeLevel::Low), 1.0);
        assert_approx(rules.match_rate_for_level(IncomeLevel::Mid), 0.5);
        assert_approx(rules.match_rate_for_level(IncomeLevel::High), 0.25);

        let two = SupportRules::new(
            vec![MatchBracket::bounded(50_000.0, 1.0), MatchBracket::unbounded(0.5)],
            36_000.0,
            2_000.0,
            10,
            400_000.0,
        )
        .expect("valid rules");
        assert_approx(two.match_rate_for_level(IncomeLevel::Mid), 0.5);
    }

    #[test]
    fn unknown_income_level_falls_back_to_lowest_rate_tier() {
        assert_eq!(IncomeLevel::parse("MEDIUM"), Some(IncomeLevel::Mid));
        assert_eq!(IncomeLevel::parse("premium"), None);
        assert_eq!(IncomeLevel::resolve("premium"), IncomeLevel::High);
        assert_eq!(IncomeLevel::resolve(""), IncomeLevel::High);

        let rules = SupportRules::default();
        let fallback_rate = rules.match_rate_for_level(IncomeLevel::resolve("???"));
        let lowest = rules
            .brackets()
            .iter()
            .map(|bracket| bracket.rate)
            .fold(f64::INFINITY, f64::min);
        assert_approx(fallback_rate, lowest);
    }

    #[test]
    fn fallback_tier_gets_lowest_rate_with_custom_brackets() {
        let rules = SupportRules::new(
            vec![
                MatchBracket::bounded(60_000.0, 0.8),
                MatchBracket::bounded(90_000.0, 0.8),
                MatchBracket::bounded(200_000.0, 0.4),
                MatchBracket::unbounded(0.1),
            ],
            36_000.0,
            2_000.0,
            10,
            400_000.0,
        )
        .expect("non-increasing rates are valid");
        assert_approx(rules.match_rate_for_level(IncomeLevel::resolve("platinum")), 0.1);

        let rising = SupportRules::new(
            vec![MatchBracket::bounded(80_000.0, 0.25), MatchBracket::unbounded(1.0)],
            36_000.0,
            2_000.0,
            10,
            400_000.0,
        );
        assert!(matches!(rising, Err(EngineError::Configuration { .. })));
    }

    #[test]
    fn annual_support_respects_threshold_and_cap() {
        let rules = SupportRules::default();
        assert_approx(rules.annual_support(1.0, 1_999.99), 0.0);
        assert_approx(rules.annual_support(1.0, 2_000.0), 2_000.0);
        assert_approx(rules.annual_support(0.25, 100_000.0), 25_000.0);
        assert_approx(rules.annual_support(1.0, 100_000.0), 36_000.0);
    }

    #[test]
    fn support_stops_after_configured_years() {
        let rules = SupportRules::default();
        assert_approx(rules.support_for_year(1.0, 10_000.0, 1), 10_000.0);
        assert_approx(rules.support_for_year(1.0, 10_000.0, 10), 10_000.0);
        assert_approx(rules.support_for_year(1.0, 10_000.0, 11), 0.0);
        assert_approx(rules.support_for_year(1.0, 10_000.0, 0), 0.0);
    }

    #[test]
    fn tax_deduction_shares_base_limit_with_other_accounts() {
        let rules = SupportRules::default();
        assert_approx(
            rules.annual_tax_deduction(TaxRate::Rate13, 120_000.0, 0.0),
            15_600.0,
        );
        assert_approx(
            rules.annual_tax_deduction(TaxRate::Rate13, 600_000.0, 0.0),
            52_000.0,
        );
        assert_approx(
            rules.annual_tax_deduction(TaxRate::Rate20, 600_000.0, 300_000.0),
            20_000.0,
        );
        assert_approx(
            rules.annual_tax_deduction(TaxRate::Rate20, 600_000.0, 500_000.0),
            0.0,
        );
    }

    #[test]
    fn malformed_brackets_are_configuration_errors() {
        let cases = [
            vec![],
            vec![MatchBracket::bounded(80_000.0, 1.0)],
            vec![MatchBracket::unbounded(1.0), MatchBracket::unbounded(0.5)],
            vec![
                MatchBracket::bounded(150_000.0, 1.0),
                MatchBracket::bounded(80_000.0, 0.5),
                MatchBracket::unbounded(0.25),
            ],
            vec![
                MatchBracket::bounded(80_000.0, 1.0),
                MatchBracket::bounded(80_000.0, 0.5),
                MatchBracket::unbounded(0.25),
            ],
            vec![MatchBracket::bounded(80_000.0, -1.0), MatchBracket::unbounded(0.25)],
            vec![MatchBracket::bounded(80_000.0, 0.25), MatchBracket::unbounded(1.0)],
        ];
        for brackets in cases {
            let err = SupportRules::new(brackets.clone(), 36_000.0, 2_000.0, 10, 400_000.0)
                .expect_err("brackets must be rejected");
            assert!(
                matches!(err, EngineError::Configuration { .. }),
                "unexpected error for {brackets:?}: {err}"
            );
        }
    }

    #[test]
    fn rules_deserialize_through_validation() {
        let json = r#"{
          "brackets": [{ "upperBound": 100000, "rate": 1.0 }, { "upperBound": null, "rate": 0.5 }],
          "annualCap": 36000,
          "minYearlyContribution": 2000,
          "supportYears": 10,
          "deductionBaseLimit": 400000
        }"#;
        let rules: SupportRules = serde_json::from_str(json).expect("valid rules");
        assert_approx(rules.match_rate(120_000.0), 0.5);

        let bad = r#"{
          "brackets": [{ "upperBound": 100000, "rate": 1.0 }],
          "annualCap": 36000,
          "minYearlyContribution": 2000,
          "supportYears": 10,
          "deductionBaseLimit": 400000
        }"#;
        assert!(serde_json::from_str::<SupportRules>(bad).is_err());

        let partial: SupportRules =
            serde_json::from_str(r#"{ "annualCap": 50000 }"#).expect("defaults fill the rest");
        assert_approx(partial.annual_cap(), 50_000.0);
        assert_eq!(partial.support_years(), 10);
        assert_eq!(partial.brackets().len(), 3);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_annual_support_never_exceeds_cap(
            rate_bp in 0u32..20_000,
            yearly in 0u64..50_000_000,
        ) {
            let rules = SupportRules::default();
            let support = rules.annual_support(rate_bp as f64 / 10_000.0, yearly as f64);
            prop_assert!(support >= 0.0);
            prop_assert!(support <= rules.annual_cap());
            if (yearly as f64) < rules.min_yearly_contribution() {
                prop_assert!(support == 0.0);
            }
        }
    }
}
