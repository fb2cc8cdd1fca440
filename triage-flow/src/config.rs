use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};

use crate::error::{FlowError, Result};

/// Tunables for the pipeline. Every field has a default, so a YAML file only needs the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub timeouts: TimeoutConfig,
    pub emergency: EmergencyConfig,
    pub purchases: PurchaseConfig,
    pub vocabulary: VocabularyConfig,
    pub sessions: SessionConfig,
}

/// Per-collaborator call timeouts, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub inference_secs: u64,
    pub geo_secs: u64,
    pub narration_secs: u64,
    pub search_secs: u64,
    pub export_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            inference_secs: 60,
            geo_secs: 15,
            narration_secs: 30,
            search_secs: 20,
            export_secs: 15,
        }
    }
}

impl TimeoutConfig {
    pub fn inference(&self) -> Duration {
        Duration::from_secs(self.inference_secs)
    }

    pub fn geo(&self) -> Duration {
        Duration::from_secs(self.geo_secs)
    }

    pub fn narration(&self) -> Duration {
        Duration::from_secs(self.narration_secs)
    }

    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search_secs)
    }

    pub fn export(&self) -> Duration {
        Duration::from_secs(self.export_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    pub radius_meters: u32,
    pub place_types: String,
    pub keyword: String,
    /// Facilities placed on the map
    pub map_limit: usize,
    /// Facilities listed in the text summary
    pub summary_limit: usize,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            radius_meters: 5_000,
            place_types: "hospital|clinic|doctor".to_string(),
            keyword: "emergency".to_string(),
            map_limit: 10,
            summary_limit: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurchaseConfig {
    /// Results kept per medication
    pub limit: usize,
    /// Pharmacy domains the product search is restricted to
    pub pharmacy_sites: Vec<String>,
}

impl Default for PurchaseConfig {
    fn default() -> Self {
        Self {
            limit: 3,
            pharmacy_sites: vec![
                "pharmeasy.in".to_string(),
                "netmeds.com".to_string(),
                "1mg.com".to_string(),
                "apollopharmacy.in".to_string(),
                "medplusmart.com".to_string(),
            ],
        }
    }
}

/// How long untouched sessions are kept in memory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: 3_600,
            sweep_interval_secs: 300,
        }
    }
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Optional replacements for the bundled vocabularies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct VocabularyConfig {
    pub highlight: Option<Vec<String>>,
    pub medications: Option<Vec<String>>,
}

impl PipelineConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| FlowError::Config(e.to_string()))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FlowError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }
}
