//! disruption.toml configuration parser.
//!
//! ```toml
//! consolidation_ttl = "15s"
//! poll_interval = "10s"
//! multi_node_max_candidates = 100
//!
//! [feature_gates]
//! spot_to_spot_consolidation = true
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DisruptionError, DisruptionResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisruptionConfig {
    pub feature_gates: FeatureGates,
    /// Delay between computing a command and re-validating it.
    #[serde(with = "duration_str")]
    pub consolidation_ttl: Duration,
    /// Interval between reconciliation passes.
    #[serde(with = "duration_str")]
    pub poll_interval: Duration,
    /// Upper bound on candidates considered by one multi-node search.
    pub multi_node_max_candidates: usize,
    #[serde(with = "duration_str")]
    pub single_node_timeout: Duration,
    #[serde(with = "duration_str")]
    pub multi_node_timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureGates {
    /// Allow replacing spot capacity with cheaper spot capacity.
    pub spot_to_spot_consolidation: bool,
}

impl Default for DisruptionConfig {
    fn default() -> Self {
        Self {
            feature_gates: FeatureGates::default(),
            consolidation_ttl: Duration::from_secs(15),
            poll_interval: Duration::from_secs(10),
            multi_node_max_candidates: 100,
            single_node_timeout: Duration::from_secs(3 * 60),
            multi_node_timeout: Duration::from_secs(60),
        }
    }
}

impl DisruptionConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?)
    }

    pub fn from_toml_str(content: &str) -> DisruptionResult<Self> {
        let config: DisruptionConfig =
            toml::from_str(content).map_err(|e| DisruptionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> DisruptionResult<()> {
        if self.multi_node_max_candidates < 2 {
            return Err(DisruptionError::Config(format!(
                "multi_node_max_candidates must be at least 2, got {}",
                self.multi_node_max_candidates
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(DisruptionError::Config(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parse a duration string like "30s", "5m", "1h" or "45". Bare numbers
/// are seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (digits, scale) = if let Some(secs) = s.strip_suffix('s') {
        (secs, 1)
    } else if let Some(mins) = s.strip_suffix('m') {
        (mins, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 60 * 60)
    } else {
        (s, 1)
    };
    let value = digits
        .parse::<u64>()
        .map_err(|_| format!("invalid duration {s:?}"))?;
    let secs = value
        .checked_mul(scale)
        .ok_or_else(|| format!("duration {s:?} is out of range"))?;
    Ok(Duration::from_secs(secs))
}

/// Render a duration in the coarsest unit that represents it exactly.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
