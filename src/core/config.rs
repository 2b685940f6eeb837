use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult};
use super::payout::PayoutCalculator;
use super::solver::SolverConfig;
use super::support::SupportRules;
use super::validation::ValidationLimits;

/// Every tunable of the engine in one place. Any field left out of a JSON
/// config file keeps its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub default_annual_return: f64,
    pub support: SupportRules,
    pub payouts: PayoutCalculator,
    pub solver: SolverConfig,
    pub limits: ValidationLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_annual_return: 0.10,
            support: SupportRules::default(),
            payouts: PayoutCalculator::default(),
            solver: SolverConfig::default(),
            limits: ValidationLimits::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> EngineResult<Self> {
        let config: EngineConfig = serde_json::from_str(raw)
            .map_err(|err| EngineError::configuration(format!("invalid config JSON: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> EngineResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            EngineError::configuration(format!("failed to read {}: {err}", path.display()))
        })?;
        let config = Self::from_json_str(&raw)?;
        tracing::info!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        self.limits.validate()?;
        self.solver.validate()?;
        self.payouts.validate()?;
        let rate = self.default_annual_return;
        if !rate.is_finite()
            || rate < self.limits.min_annual_return
            || rate > self.limits.max_annual_return
        {
            return Err(EngineError::configuration(format!(
                "defaultAnnualReturn {rate} is outside [{}, {}]",
                self.limits.min_annual_return, self.limits.max_annual_return
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ProjectionStrategy;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EngineConfig::from_json_str("{}").expect("defaults are valid");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_overrides_keep_remaining_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{
              "defaultAnnualReturn": 0.08,
              "solver": { "maxIterations": 40, "strategy": "closed-form" },
              "payouts": { "fixedTermMonths": 180 },
              "support": { "supportYears": 5 }
            }"#,
        )
        .expect("valid overrides");

        assert_eq!(config.default_annual_return, 0.08);
        assert_eq!(config.solver.max_iterations, 40);
        assert_eq!(config.solver.strategy, ProjectionStrategy::ClosedForm);
        assert_eq!(config.solver.search_max, 2_000_000.0);
        assert_eq!(config.payouts.fixed_term_months, 180.0);
        assert_eq!(config.payouts.reference_minimum_pension, 12_000.0);
        assert_eq!(config.support.support_years(), 5);
        assert_eq!(config.limits, ValidationLimits::default());
    }

    #[test]
    fn inconsistent_config_is_a_configuration_error() {
        for raw in [
            r#"{ "defaultAnnualReturn": 0.5 }"#,
            r#"{ "solver": { "searchMin": 10, "searchMax": 5 } }"#,
            r#"{ "limits": { "maxHorizonYears": 4000000000 } }"#,
            r#"{ "support": { "brackets": [] } }"#,
            r#"{ "payouts": { "lifetime": { "kind": "flat", "months": 0 } } }"#,
            "not json",
        ] {
            let err = EngineConfig::from_json_str(raw).expect_err(raw);
            assert!(
                matches!(err, EngineError::Configuration { .. }),
                "{raw} gave {err:?}"
            );
        }
    }

    #[test]
    fn missing_file_is_reported() {
        let err = EngineConfig::load(Path::new("/nonexistent/pds-calc.json"))
            .expect_err("file does not exist");
        assert!(matches!(err, EngineError::Configuration { .. }));
    }
}
