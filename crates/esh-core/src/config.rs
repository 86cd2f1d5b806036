//! Immutable harmonizer configuration.
//!
//! One `HarmonyConfig` is built up front (defaults, YAML file or string) and
//! passed by reference into every model construction, adapter and resultier
//! call. Nothing in the workspace keeps process-wide configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::numeric::Tolerances;
use crate::units::{CurrencyUnit, UnitConvention};
use crate::{CoreError, CoreResult};

/// Relative tolerance used when comparing results of different frameworks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ComparisonTolerance {
    pub relative: f64,
}

impl Default for ComparisonTolerance {
    fn default() -> Self {
        Self { relative: 0.01 }
    }
}

/// Spelling/alias resolution for mapping keys and unit names.
///
/// Keys are normalized (trimmed, lower-cased, spaces and dashes replaced by
/// underscores) before lookup; unknown keys resolve to their normalized form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasTable {
    entries: BTreeMap<String, String>,
}

impl AliasTable {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register `alias` as another spelling of `canonical`.
    pub fn with(mut self, alias: &str, canonical: &str) -> Self {
        self.entries
            .insert(normalize_key(alias), normalize_key(canonical));
        self
    }

    /// Resolve a key to its canonical spelling.
    pub fn resolve(&self, key: &str) -> String {
        let normalized = normalize_key(key);
        match self.entries.get(&normalized) {
            Some(canonical) => canonical.clone(),
            None => normalized,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AliasTable {
    fn default() -> Self {
        Self::empty()
            // component categories
            .with("bus", "busses")
            .with("buses", "busses")
            .with("source", "sources")
            .with("sink", "sinks")
            .with("transformer", "transformers")
            .with("converters", "transformers")
            .with("chp", "chps")
            .with("storage", "storages")
            .with("connector", "connectors")
            .with("links", "connectors")
            .with("timeindex", "timeframe")
            .with("time_index", "timeframe")
            .with("timesteps", "timeframe")
            .with("global_constraint", "global_constraints")
            .with("constraints", "global_constraints")
            // flow parameters
            .with("flow_rate", "flow_rates")
            .with("flow_cost", "flow_costs")
            .with("costs", "flow_costs")
            .with("flow_emission", "flow_emissions")
            .with("emissions", "flow_emissions")
            .with("expansion_cost", "expansion_costs")
            .with("efficiency", "efficiencies")
            .with("conversions", "efficiencies")
            // currencies
            .with("euro", "eur")
            .with("€", "eur")
            .with("dollar", "usd")
            .with("$", "usd")
    }
}

fn normalize_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonyConfig {
    /// Declared unit convention of every normalized result.
    pub units: UnitConvention,
    /// Tolerance for balance checks on normalized loads.
    pub conservation: Tolerances,
    /// Tolerance for cross-framework agreement of global results.
    pub comparison: ComparisonTolerance,
    /// Alias table for mapping keys and currency names.
    pub aliases: AliasTable,
}

impl HarmonyConfig {
    pub fn from_yaml_str(content: &str) -> CoreResult<Self> {
        let config = serde_yaml::from_str(content)?;
        Ok(config)
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Factor turning an amount in the native currency `native` into the
    /// declared currency.
    pub fn currency_factor(&self, native: &str) -> CoreResult<f64> {
        let unit: CurrencyUnit = native.parse()?;
        if self.aliases.resolve(&unit.code) == self.aliases.resolve(&self.units.currency) {
            Ok(unit.scale)
        } else {
            Err(CoreError::CurrencyMismatch {
                native: native.to_string(),
                declared: self.units.currency.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{MassUnit, PowerUnit};

    #[test]
    fn aliases_resolve_spelling_variants() {
        let aliases = AliasTable::default();
        assert_eq!(aliases.resolve("Buses"), "busses");
        assert_eq!(aliases.resolve("busses"), "busses");
        assert_eq!(aliases.resolve("Flow Rate"), "flow_rates");
        assert_eq!(aliases.resolve("unknown-key"), "unknown_key");
    }

    #[test]
    fn currency_factor_accepts_aliases_and_scales() {
        let config = HarmonyConfig::default();
        assert_eq!(config.currency_factor("EUR").unwrap(), 1.0);
        assert_eq!(config.currency_factor("1e6 Euro").unwrap(), 1e6);
        assert!(matches!(
            config.currency_factor("USD"),
            Err(CoreError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn config_from_yaml_overrides_defaults() {
        let yaml = r#"
units:
  currency: USD
  emissions: kt
comparison:
  relative: 0.05
"#;
        let config = HarmonyConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.units.currency, "USD");
        assert_eq!(config.units.emissions, MassUnit::Kt);
        assert_eq!(config.units.power, PowerUnit::MW);
        assert_eq!(config.comparison.relative, 0.05);
        assert!(!config.aliases.is_empty());
    }
}
