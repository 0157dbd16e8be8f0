use std::fmt;
use std::str::FromStr;

use analysis_core::AnalysisError;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// How the four sub-index scores are combined into the total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMethod {
    /// Weighted geometric mean; a single weak sub-index pulls the total down
    /// harder than it would arithmetically, but never to zero.
    Geometric,
    /// Plain weighted sum, kept for scores computed under the older scheme.
    Arithmetic,
}

impl FromStr for AggregationMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "geometric" => Ok(AggregationMethod::Geometric),
            "arithmetic" | "legacy" => Ok(AggregationMethod::Arithmetic),
            other => bail!("unknown aggregation method '{}'", other),
        }
    }
}

impl fmt::Display for AggregationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationMethod::Geometric => f.write_str("geometric"),
            AggregationMethod::Arithmetic => f.write_str("arithmetic"),
        }
    }
}

/// Engine configuration.
///
/// Weights, grade thresholds, and clamp bounds are fixed tables and are not
/// configurable here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_aggregation")]
    pub aggregation: AggregationMethod,
    /// Allow calculation on series that failed validation for missing fields
    /// or short history. Sign-sanity failures still block.
    #[serde(default)]
    pub allow_degraded: bool,
    /// Tail fraction clipped from per-period free cash flow (0.0 disables)
    #[serde(default = "default_winsorize_percentile")]
    pub winsorize_percentile: f64,
}

fn default_aggregation() -> AggregationMethod {
    AggregationMethod::Geometric
}

fn default_winsorize_percentile() -> f64 {
    0.10
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            aggregation: AggregationMethod::Geometric,
            allow_degraded: false,
            winsorize_percentile: 0.10,
        }
    }
}

impl IndexConfig {
    pub fn new(
        aggregation: AggregationMethod,
        allow_degraded: bool,
        winsorize_percentile: f64,
    ) -> Result<Self> {
        if !(0.0..0.5).contains(&winsorize_percentile) {
            return Err(AnalysisError::InvalidConfig(format!(
                "winsorize_percentile must be in [0, 0.5), got {}",
                winsorize_percentile
            ))
            .into());
        }
        Ok(Self {
            aggregation,
            allow_degraded,
            winsorize_percentile,
        })
    }

    /// Reads `RAYMONDS_AGGREGATION`, `RAYMONDS_ALLOW_DEGRADED` and
    /// `RAYMONDS_WINSORIZE_PCT`, falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let aggregation = match lookup("RAYMONDS_AGGREGATION") {
            Some(v) => v.parse::<AggregationMethod>().context("RAYMONDS_AGGREGATION")?,
            None => defaults.aggregation,
        };
        let allow_degraded = match lookup("RAYMONDS_ALLOW_DEGRADED").as_deref().map(str::trim) {
            Some("1") | Some("true") | Some("TRUE") | Some("yes") => true,
            Some("0") | Some("false") | Some("FALSE") | Some("no") | Some("") | None => false,
            Some(other) => bail!("RAYMONDS_ALLOW_DEGRADED: expected true/false, got '{}'", other),
        };
        let winsorize_percentile = match lookup("RAYMONDS_WINSORIZE_PCT") {
            Some(v) => v
                .trim()
                .parse::<f64>()
                .with_context(|| format!("RAYMONDS_WINSORIZE_PCT: '{}' is not a number", v))?,
            None => defaults.winsorize_percentile,
        };

        Self::new(aggregation, allow_degraded, winsorize_percentile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = IndexConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, IndexConfig::default());
        assert_eq!(config.aggregation, AggregationMethod::Geometric);
    }

    #[test]
    fn test_env_overrides() {
        let config = IndexConfig::from_lookup(lookup(&[
            ("RAYMONDS_AGGREGATION", "Arithmetic"),
            ("RAYMONDS_ALLOW_DEGRADED", "1"),
            ("RAYMONDS_WINSORIZE_PCT", "0.05"),
        ]))
        .unwrap();
        assert_eq!(config.aggregation, AggregationMethod::Arithmetic);
        assert!(config.allow_degraded);
        assert_eq!(config.winsorize_percentile, 0.05);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(IndexConfig::from_lookup(lookup(&[("RAYMONDS_AGGREGATION", "median")])).is_err());
        assert!(IndexConfig::from_lookup(lookup(&[("RAYMONDS_ALLOW_DEGRADED", "maybe")])).is_err());
        assert!(IndexConfig::from_lookup(lookup(&[("RAYMONDS_WINSORIZE_PCT", "0.7")])).is_err());
        let err = IndexConfig::new(AggregationMethod::Geometric, false, -0.1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_serde_defaults() {
        let config: IndexConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, IndexConfig::default());
    }
}
