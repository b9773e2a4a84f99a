//! Farm configuration: operational targets, estimation constants, and the
//! extraction-service endpoint.
//!
//! Loaded from `~/.fieldops/config.json`. Every field has a default so a
//! missing or partial file still yields a working config; the defaults are
//! the operational targets the farm has been running against.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Operational targets the alert rules evaluate against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TargetConfig {
    /// Cladodes per day across the whole operation.
    pub daily_planting_rate: f64,
    /// Hectares the current campaign should cover.
    pub area_planted_ha: f64,
    /// Plants per hectare.
    pub plant_density_per_ha: f64,
    /// Average cladodes per station.
    pub stack_height: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            daily_planting_rate: 1200.0,
            area_planted_ha: 2.0,
            plant_density_per_ha: 12000.0,
            stack_height: 4.0,
        }
    }
}

/// Domain constants used when estimating figures the workers did not report
/// directly. These are assumptions, not derived values — keep them here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EstimateConfig {
    /// Effective stations per hectare with in-fill (primary grid is ~494).
    pub stations_per_ha: f64,
    /// Hours assumed when a report omits hours worked.
    pub standard_workday_hours: f64,
    /// Confidence assigned to rule-based fallback extraction.
    pub fallback_confidence: f64,
}

impl Default for EstimateConfig {
    fn default() -> Self {
        Self {
            stations_per_ha: 600.0,
            standard_workday_hours: 8.0,
            fallback_confidence: 0.5,
        }
    }
}

/// Extraction-service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ExtractionServiceConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    /// Hard cap on a single extraction call. The fallback extractor runs
    /// after this elapses, so keep it short.
    pub timeout_secs: u64,
}

impl Default for ExtractionServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            api_key: None,
            model: "claude-sonnet-4-20250514".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Top-level configuration for the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct FarmConfig {
    pub targets: TargetConfig,
    pub estimates: EstimateConfig,
    pub extraction: ExtractionServiceConfig,
    /// Override for the database location; defaults to `~/.fieldops/fieldops.db`.
    pub db_path: Option<PathBuf>,
}

impl FarmConfig {
    /// Resolve the default config path: `~/.fieldops/config.json`.
    pub fn default_path() -> Result<PathBuf, PipelineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| PipelineError::Configuration("Home directory not found".to_string()))?;
        Ok(home.join(".fieldops").join("config.json"))
    }

    /// Load configuration from an explicit path.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            PipelineError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Load from the default path, falling back to defaults when the file
    /// does not exist. A present-but-invalid file is an error — silently
    /// ignoring a typo'd config would mean running against wrong targets.
    pub fn load_or_default() -> Result<Self, PipelineError> {
        let path = Self::default_path()?;
        if !path.exists() {
            log::info!(
                "No config at {}; using default targets",
                path.display()
            );
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    /// Resolve the database path.
    pub fn resolve_db_path(&self) -> Result<PathBuf, PipelineError> {
        if let Some(ref p) = self.db_path {
            return Ok(p.clone());
        }
        let home = dirs::home_dir()
            .ok_or_else(|| PipelineError::Configuration("Home directory not found".to_string()))?;
        Ok(home.join(".fieldops").join("fieldops.db"))
    }
}
