use crate::error::InvalidFrequency;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Target document: a root URL and the endpoints hit beneath it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Prefix joined with each endpoint path (e.g. "http://localhost:8080")
    pub root: String,
    /// Endpoints in declaration order; order determines segment layout
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

impl Config {
    /// Load a config from disk. `.yml`/`.yaml` files are read as YAML,
    /// everything else as TOML.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yml") | Some("yaml")
        );

        if is_yaml {
            Self::from_yaml_str(&contents)
        } else {
            Self::from_toml_str(&contents)
        }
    }

    pub fn from_yaml_str(s: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(s).context("Invalid YAML config")?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(s).context("Invalid TOML config")?;
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Path appended to the root URL
    pub path: String,
    /// 0 = exclude, -1 = auto, otherwise a percentage in (0, 100]
    pub freq: Frequency,
}

/// Share of traffic assigned to one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum Frequency {
    /// Not tested at all
    Excluded,
    /// Splits whatever the explicit percentages leave over
    Auto,
    /// Literal percentage in (0, 100]
    Percentage(f64),
}

const EXCLUDE_SENTINEL: f64 = 0.0;
const AUTO_SENTINEL: f64 = -1.0;

impl TryFrom<f64> for Frequency {
    type Error = InvalidFrequency;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value == EXCLUDE_SENTINEL {
            Ok(Frequency::Excluded)
        } else if value == AUTO_SENTINEL {
            Ok(Frequency::Auto)
        } else if value > 0.0 && value <= 100.0 {
            Ok(Frequency::Percentage(value))
        } else {
            Err(InvalidFrequency(value))
        }
    }
}

impl From<Frequency> for f64 {
    fn from(freq: Frequency) -> Self {
        match freq {
            Frequency::Excluded => EXCLUDE_SENTINEL,
            Frequency::Auto => AUTO_SENTINEL,
            Frequency::Percentage(p) => p,
        }
    }
}
