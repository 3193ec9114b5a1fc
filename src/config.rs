//! Analysis configuration
//!
//! The configuration surface consumed by the pipeline: the closed AOI lookup table,
//! the segmentation threshold, the scan-pattern library and the requested metrics.
//! Configurations are loaded from JSON and validated eagerly so that contract
//! mismatches surface before any frame is processed.

use crate::error::ComputeError;
use crate::outcomes::MetricRequest;
use crate::patterns::PatternDefinition;
use crate::types::Category;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

/// Default minimum run length (frames) for a fixation
pub const DEFAULT_MIN_FIXATION_FRAMES: u32 = 3;

/// Default sampling rate of the annotated frame stream
pub const DEFAULT_SAMPLING_RATE_HZ: f64 = 30.0;

/// Default number of skipped fixations allowed between pattern steps
pub const DEFAULT_MAX_PATTERN_GAP: usize = 1;

/// Raw (object, region) label pair as annotated on a frame
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AoiPair {
    pub object: String,
    pub region: String,
}

impl AoiPair {
    pub fn new(object: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            region: region.into(),
        }
    }
}

/// One row of the AOI lookup table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AoiEntry {
    pub object: String,
    pub region: String,
    /// Canonical category this pair maps to
    pub category: Category,
    /// Named actor the category belongs to (e.g. "mother"), if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

impl AoiEntry {
    pub fn pair(&self) -> AoiPair {
        AoiPair::new(self.object.clone(), self.region.clone())
    }
}

/// Closed (object, region) → category lookup table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AoiTable {
    /// The designated "no signal" pair
    pub off_target: AoiPair,
    #[serde(default)]
    pub entries: Vec<AoiEntry>,
}

impl AoiTable {
    /// All categories in the table, sorted and deduplicated
    pub fn categories(&self) -> Vec<Category> {
        self.entries
            .iter()
            .map(|e| e.category.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Actor binding for every category
    pub fn actors(&self) -> BTreeMap<Category, Option<String>> {
        self.entries
            .iter()
            .map(|e| (e.category.clone(), e.actor.clone()))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.entries.is_empty() {
            return Err(ComputeError::ConfigError(
                "AOI lookup table has no entries".to_string(),
            ));
        }

        let mut seen: HashSet<AoiPair> = HashSet::new();
        let mut actors: BTreeMap<&Category, &Option<String>> = BTreeMap::new();

        for entry in &self.entries {
            let pair = entry.pair();
            if pair == self.off_target {
                return Err(ComputeError::ConfigError(format!(
                    "Off-target pair ({}, {}) is also mapped to category '{}'",
                    pair.object, pair.region, entry.category
                )));
            }
            if entry.category.as_str().is_empty() {
                return Err(ComputeError::ConfigError(format!(
                    "Empty category for pair ({}, {})",
                    pair.object, pair.region
                )));
            }
            if !seen.insert(pair.clone()) {
                return Err(ComputeError::ConfigError(format!(
                    "Duplicate AOI pair ({}, {})",
                    pair.object, pair.region
                )));
            }
            if let Some(existing) = actors.insert(&entry.category, &entry.actor) {
                if existing != &entry.actor {
                    return Err(ComputeError::ConfigError(format!(
                        "Category '{}' is bound to conflicting actors {:?} and {:?}",
                        entry.category, existing, entry.actor
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Full analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Minimum run length (frames) for a run to become a fixation
    #[serde(default = "default_min_fixation_frames")]
    pub min_fixation_frames: u32,
    /// Frame sampling rate, used to convert frame counts to milliseconds
    #[serde(default = "default_sampling_rate_hz")]
    pub sampling_rate_hz: f64,
    /// Closed AOI lookup table
    pub aoi_table: AoiTable,
    /// Target scan patterns
    #[serde(default)]
    pub patterns: Vec<PatternDefinition>,
    /// Maximum skipped fixations between consecutive pattern steps
    #[serde(default = "default_max_pattern_gap")]
    pub max_pattern_gap: usize,
    /// Reject pattern matches that span an off-target break
    #[serde(default)]
    pub confine_patterns_to_episodes: bool,
    /// Per-trial metrics to aggregate
    #[serde(default)]
    pub metrics: Vec<MetricRequest>,
}

fn default_min_fixation_frames() -> u32 {
    DEFAULT_MIN_FIXATION_FRAMES
}

fn default_sampling_rate_hz() -> f64 {
    DEFAULT_SAMPLING_RATE_HZ
}

fn default_max_pattern_gap() -> usize {
    DEFAULT_MAX_PATTERN_GAP
}

impl AnalysisConfig {
    /// Create a configuration with default thresholds and no patterns or metrics
    pub fn new(aoi_table: AoiTable) -> Self {
        Self {
            min_fixation_frames: DEFAULT_MIN_FIXATION_FRAMES,
            sampling_rate_hz: DEFAULT_SAMPLING_RATE_HZ,
            aoi_table,
            patterns: Vec::new(),
            max_pattern_gap: DEFAULT_MAX_PATTERN_GAP,
            confine_patterns_to_episodes: false,
            metrics: Vec::new(),
        }
    }

    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: AnalysisConfig = serde_json::from_str(json)
            .map_err(|e| ComputeError::ConfigError(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self, ComputeError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ComputeError::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(self).map_err(ComputeError::JsonError)
    }

    /// Check every structural constraint of the configuration
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.min_fixation_frames < 1 {
            return Err(ComputeError::ConfigError(
                "min_fixation_frames must be at least 1".to_string(),
            ));
        }
        if !self.sampling_rate_hz.is_finite() || self.sampling_rate_hz <= 0.0 {
            return Err(ComputeError::ConfigError(format!(
                "sampling_rate_hz must be positive, got {}",
                self.sampling_rate_hz
            )));
        }

        self.aoi_table.validate()?;
        let categories: BTreeSet<Category> = self.aoi_table.categories().into_iter().collect();

        let mut pattern_names = HashSet::new();
        for pattern in &self.patterns {
            if !pattern_names.insert(pattern.name.as_str()) {
                return Err(ComputeError::ConfigError(format!(
                    "Duplicate pattern name '{}'",
                    pattern.name
                )));
            }
            pattern.validate(&categories)?;
        }

        let mut metric_names = HashSet::new();
        for metric in &self.metrics {
            let name = metric.name();
            if !metric_names.insert(name.clone()) {
                return Err(ComputeError::ConfigError(format!(
                    "Duplicate metric '{}'",
                    name
                )));
            }
            metric.validate(&categories, &pattern_names)?;
        }

        Ok(())
    }
}
