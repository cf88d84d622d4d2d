use crate::error::{MfsError, Result};
use crate::schema::MfsCategory;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CRORE: f64 = 10_000_000.0;
pub const DEFAULT_MANUAL_OVERRIDE_PATH: &str = "data/mfs_manual.csv";
pub const ALLOW_SAMPLE_ENV: &str = "MFS_ALLOW_SAMPLE";

/// Lower-cased header text -> canonical column name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct HeaderSynonyms(BTreeMap<String, String>);

impl HeaderSynonyms {
    pub fn new(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }

    /// Canonical name for an already lower-cased, trimmed header, or the header itself.
    pub fn canonical<'a>(&'a self, header: &'a str) -> &'a str {
        self.0.get(header).map(String::as_str).unwrap_or(header)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for HeaderSynonyms {
    fn default() -> Self {
        let mut map: BTreeMap<String, String> = [
            ("month", "month"),
            ("particulars", "category"),
            ("items", "category"),
            ("amount (in crore bdt)", "amount_crore_bdt"),
            ("amount(in crore bdt)", "amount_crore_bdt"),
            ("value(in crore bdt)", "amount_crore_bdt"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        for category in MfsCategory::ALL {
            map.insert(category.label().to_lowercase(), category.label().to_string());
        }

        Self(map)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AnomalyConfig {
    #[schemars(description = "Seasonal period in months")]
    pub period: usize,
    #[schemars(description = "Observed months a category needs before it can be flagged")]
    pub min_observations: usize,
    #[schemars(description = "Absolute standardized residual above which a month is flagged")]
    pub z_threshold: f64,
    #[schemars(description = "Use robustness iterations during decomposition")]
    pub robust: bool,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            period: 12,
            min_observations: 24,
            z_threshold: 2.0,
            robust: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PipelineConfig {
    pub header_synonyms: HeaderSynonyms,
    #[schemars(description = "Case-insensitive substrings a category must contain to be kept")]
    pub category_markers: Vec<String>,
    #[schemars(description = "Multiplier from the reported unit (crore BDT) to BDT")]
    pub crore_multiplier: f64,
    #[schemars(description = "Optional CSV of hand-maintained corrections")]
    pub manual_override_path: Option<PathBuf>,
    pub anomaly: AnomalyConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            header_synonyms: HeaderSynonyms::default(),
            category_markers: [
                "cash",
                "p2p",
                "utility",
                "merchant",
                "government",
                "salary",
                "others",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            crore_multiplier: CRORE,
            manual_override_path: Some(PathBuf::from(DEFAULT_MANUAL_OVERRIDE_PATH)),
            anomaly: AnomalyConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.crore_multiplier.is_finite() && self.crore_multiplier > 0.0) {
            return Err(MfsError::InvalidConfig(format!(
                "crore_multiplier must be positive, got {}",
                self.crore_multiplier
            )));
        }

        if self.category_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(MfsError::InvalidConfig(
                "at least one category marker is required".to_string(),
            ));
        }

        let anomaly = &self.anomaly;
        if anomaly.period < 2 {
            return Err(MfsError::InvalidConfig(format!(
                "anomaly period must be at least 2, got {}",
                anomaly.period
            )));
        }
        if anomaly.min_observations < 2 * anomaly.period {
            return Err(MfsError::InvalidConfig(format!(
                "min_observations ({}) must cover two seasonal periods ({})",
                anomaly.min_observations,
                2 * anomaly.period
            )));
        }
        if !(anomaly.z_threshold.is_finite() && anomaly.z_threshold > 0.0) {
            return Err(MfsError::InvalidConfig(format!(
                "z_threshold must be positive, got {}",
                anomaly.z_threshold
            )));
        }

        Ok(())
    }
}

/// Settings for the acquisition collaborator, not the pipeline itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    pub allow_sample: bool,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self { allow_sample: true }
    }
}

impl FetchSettings {
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(ALLOW_SAMPLE_ENV).ok().as_deref())
    }

    /// Anything other than "0" allows the sample fallback.
    pub fn from_env_value(value: Option<&str>) -> Self {
        Self {
            allow_sample: value.map(str::trim) != Some("0"),
        }
    }
}
