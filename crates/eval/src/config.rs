//! Engine configuration.
//!
//! Passed into the orchestrator explicitly with every request; nothing in
//! the engine reads process-wide settings.

use std::collections::BTreeMap;

use mrv_core::breakdown::PrecursorMode;
use mrv_core::numeric::{canonical_decimal, canonical_decimal_opt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the grid factor for purchased electricity is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectricityMethod {
    /// Average grid factor of the region.
    #[default]
    Location,
    /// Supplier-specific factor.
    Market,
}

impl ElectricityMethod {
    /// Factor subject used when looking up the grid factor.
    pub fn as_str(&self) -> &'static str {
        match self {
            ElectricityMethod::Location => "location",
            ElectricityMethod::Market => "market",
        }
    }
}

/// ETS allowance position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EtsConfig {
    #[serde(default, with = "canonical_decimal")]
    pub free_allocation_tco2e: Decimal,
    #[serde(default, with = "canonical_decimal")]
    pub banked_tco2e: Decimal,
    /// Count indirect (electricity) emissions as covered. Off by default:
    /// only direct and process emissions are covered.
    #[serde(default)]
    pub include_indirect: bool,
}

/// Engine configuration, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Region used for default factor lookups.
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub electricity_method: ElectricityMethod,
    /// Supplier-specific grid factor in kgCO2e/kWh. Only used with the
    /// market method; replaces the catalog lookup.
    #[serde(default, with = "canonical_decimal_opt")]
    pub market_grid_factor_override: Option<Decimal>,
    #[serde(default)]
    pub precursor_mode: PrecursorMode,
    #[serde(default)]
    pub ets: EtsConfig,
    /// Free-form settings carried through to the InputBundle.
    #[serde(default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_region() -> String {
    "TR".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            region: default_region(),
            electricity_method: ElectricityMethod::default(),
            market_grid_factor_override: None,
            precursor_mode: PrecursorMode::default(),
            ets: EtsConfig::default(),
            extra: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::Invalid("region must not be empty".to_string()));
        }
        if self.ets.free_allocation_tco2e.is_sign_negative()
            || self.ets.banked_tco2e.is_sign_negative()
        {
            return Err(ConfigError::Invalid(
                "ets allowances must not be negative".to_string(),
            ));
        }
        if let Some(factor) = self.market_grid_factor_override {
            if factor.is_sign_negative() {
                return Err(ConfigError::Invalid(format!(
                    "market_grid_factor_override must not be negative, got {}",
                    factor
                )));
            }
        }
        Ok(())
    }
}

/// Settings of the engine itself, as opposed to a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Recorded in every bundle; part of the reproducibility key.
    pub engine_version: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.region, "TR");
        assert!(!config.ets.include_indirect);
    }

    #[test]
    fn full_toml_parses() {
        let config = EngineConfig::from_toml_str(
            r#"
            region = "EU"
            electricity_method = "market"
            market_grid_factor_override = "0.35"
            precursor_mode = "chain"

            [ets]
            free_allocation_tco2e = "1000"
            banked_tco2e = "50.5"
            include_indirect = true

            [extra]
            reporting_language = "tr"
            "#,
        )
        .unwrap();
        assert_eq!(config.electricity_method, ElectricityMethod::Market);
        assert_eq!(config.precursor_mode, PrecursorMode::Chain);
        assert_eq!(config.ets.banked_tco2e, Decimal::new(505, 1));
        assert_eq!(config.market_grid_factor_override, Some(Decimal::new(35, 2)));
        assert_eq!(config.extra["reporting_language"], "tr");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = EngineConfig::from_toml_str("regoin = \"TR\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn negative_allowances_are_rejected() {
        let err = EngineConfig::from_toml_str("[ets]\nfree_allocation_tco2e = \"-1\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
