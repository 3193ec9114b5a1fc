//! Per-trial outcomes and precision weights
//!
//! Turns a trial's fixations, transitions and pattern matches into the scalar
//! outcomes requested in the configuration. Each outcome travels with its
//! precision weight; the weight source must be named explicitly per metric.

use crate::error::ComputeError;
use crate::pipeline::TrialAnalysis;
use crate::types::{Category, GroupKey, TrialKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Trial-level quantity used as a precision weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSource {
    TransitionCount,
    FixationCount,
    FixationFrames,
    OnTargetFrames,
    TotalFrames,
}

impl WeightSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WeightSource::TransitionCount => "transition_count",
            WeightSource::FixationCount => "fixation_count",
            WeightSource::FixationFrames => "fixation_frames",
            WeightSource::OnTargetFrames => "on_target_frames",
            WeightSource::TotalFrames => "total_frames",
        }
    }
}

impl fmt::Display for WeightSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a metric measures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum MetricKind {
    /// Share of fixated frames spent on one category
    AttentionProportion { category: Category },
    /// Share of the trial's transitions going source → destination
    TransitionProportion {
        source: Category,
        destination: Category,
    },
    /// Number of matches of one pattern
    PatternCount { pattern: String },
    /// Matches of one pattern per fixation
    PatternRate { pattern: String },
    FixationCount,
    /// Mean fixation duration in milliseconds
    MeanFixationDuration,
}

impl MetricKind {
    /// Stable identifier used when no explicit name is configured
    pub fn default_name(&self) -> String {
        match self {
            MetricKind::AttentionProportion { category } => {
                format!("attention_proportion:{}", category)
            }
            MetricKind::TransitionProportion {
                source,
                destination,
            } => format!("transition_proportion:{}->{}", source, destination),
            MetricKind::PatternCount { pattern } => format!("pattern_count:{}", pattern),
            MetricKind::PatternRate { pattern } => format!("pattern_rate:{}", pattern),
            MetricKind::FixationCount => "fixation_count".to_string(),
            MetricKind::MeanFixationDuration => "mean_fixation_duration_ms".to_string(),
        }
    }

    /// Outcome for one trial; `None` when the ratio is undefined
    pub fn evaluate(&self, trial: &TrialAnalysis) -> Option<f64> {
        if trial.degenerate {
            return None;
        }

        match self {
            MetricKind::AttentionProportion { category } => {
                let total = trial.fixation_frames();
                let on_category: u64 = trial
                    .fixations
                    .iter()
                    .filter(|f| &f.category == category)
                    .map(|f| f.frame_count)
                    .sum();
                ratio(on_category as f64, total as f64)
            }
            MetricKind::TransitionProportion {
                source,
                destination,
            } => {
                let matching = trial
                    .transitions
                    .iter()
                    .filter(|t| &t.source == source && &t.destination == destination)
                    .count();
                ratio(matching as f64, trial.transitions.len() as f64)
            }
            MetricKind::PatternCount { pattern } => {
                Some(trial.match_count(pattern) as f64)
            }
            MetricKind::PatternRate { pattern } => ratio(
                trial.match_count(pattern) as f64,
                trial.fixations.len() as f64,
            ),
            MetricKind::FixationCount => Some(trial.fixations.len() as f64),
            MetricKind::MeanFixationDuration => {
                let total: f64 = trial.fixations.iter().map(|f| f.duration_ms).sum();
                ratio(total, trial.fixations.len() as f64)
            }
        }
    }
}

fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator > 0.0 {
        Some(numerator / denominator)
    } else {
        None
    }
}

/// A configured metric request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRequest {
    #[serde(flatten)]
    pub kind: MetricKind,
    /// Precision weight source; required, absence is a configuration error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<WeightSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl MetricRequest {
    pub fn new(kind: MetricKind, weight: WeightSource) -> Self {
        Self {
            kind,
            weight: Some(weight),
            name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.kind.default_name())
    }

    /// Bind the request to its weight source
    pub fn resolve(&self) -> Result<ResolvedMetric, ComputeError> {
        let weight = self
            .weight
            .ok_or_else(|| ComputeError::MissingWeightField(self.name()))?;
        Ok(ResolvedMetric {
            name: self.name(),
            kind: self.kind.clone(),
            weight,
        })
    }

    pub(crate) fn validate(
        &self,
        categories: &BTreeSet<Category>,
        patterns: &HashSet<&str>,
    ) -> Result<(), ComputeError> {
        let unknown_category = |category: &Category| {
            ComputeError::ConfigError(format!(
                "Metric '{}' references unknown category '{}'",
                self.name(),
                category
            ))
        };

        match &self.kind {
            MetricKind::AttentionProportion { category } => {
                if !categories.contains(category) {
                    return Err(unknown_category(category));
                }
            }
            MetricKind::TransitionProportion {
                source,
                destination,
            } => {
                for category in [source, destination] {
                    if !categories.contains(category) {
                        return Err(unknown_category(category));
                    }
                }
            }
            MetricKind::PatternCount { pattern } | MetricKind::PatternRate { pattern } => {
                if !patterns.contains(pattern.as_str()) {
                    return Err(ComputeError::ConfigError(format!(
                        "Metric '{}' references unknown pattern '{}'",
                        self.name(),
                        pattern
                    )));
                }
            }
            MetricKind::FixationCount | MetricKind::MeanFixationDuration => {}
        }
        Ok(())
    }
}

/// A metric request with its weight source bound
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMetric {
    pub name: String,
    pub kind: MetricKind,
    pub weight: WeightSource,
}

impl ResolvedMetric {
    /// Evaluate the metric on one trial, producing the record handed to the
    /// modeling side
    pub fn observe(&self, trial: &TrialAnalysis) -> ModelRecord {
        let value = self.kind.evaluate(trial);
        let weight = TrialWeights::from_trial(trial).get(self.weight);

        let status = if trial.degenerate {
            ObservationStatus::Degenerate
        } else if value.is_none() {
            ObservationStatus::Undefined
        } else if !(weight.is_finite() && weight > 0.0) {
            ObservationStatus::ZeroWeight
        } else {
            ObservationStatus::Included
        };

        ModelRecord {
            participant_id: trial.key.participant_id.clone(),
            trial_id: trial.key.trial_id.clone(),
            cohort: trial.group.cohort.clone(),
            condition: trial.group.condition.clone(),
            metric: self.name.clone(),
            value,
            weight,
            weight_source: self.weight,
            status,
        }
    }
}

/// Candidate precision weights of one trial
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialWeights {
    pub total_frames: u64,
    pub on_target_frames: u64,
    pub fixation_frames: u64,
    pub fixation_count: u64,
    pub transition_count: u64,
}

impl TrialWeights {
    pub fn from_trial(trial: &TrialAnalysis) -> Self {
        Self {
            total_frames: trial.total_frames,
            on_target_frames: trial.on_target_frames,
            fixation_frames: trial.fixation_frames(),
            fixation_count: trial.fixations.len() as u64,
            transition_count: trial.transitions.len() as u64,
        }
    }

    pub fn get(&self, source: WeightSource) -> f64 {
        let value = match source {
            WeightSource::TransitionCount => self.transition_count,
            WeightSource::FixationCount => self.fixation_count,
            WeightSource::FixationFrames => self.fixation_frames,
            WeightSource::OnTargetFrames => self.on_target_frames,
            WeightSource::TotalFrames => self.total_frames,
        };
        value as f64
    }
}

/// Whether an observation enters the weighted aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationStatus {
    Included,
    /// Weight is zero; excluded from the mean, kept in counts
    ZeroWeight,
    /// Trial produced no fixations
    Degenerate,
    /// Outcome ratio has a zero denominator
    Undefined,
}

/// One trial × metric record for the modeling collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub participant_id: String,
    pub trial_id: String,
    pub cohort: String,
    pub condition: String,
    pub metric: String,
    pub value: Option<f64>,
    pub weight: f64,
    pub weight_source: WeightSource,
    pub status: ObservationStatus,
}

impl ModelRecord {
    pub fn trial_key(&self) -> TrialKey {
        TrialKey::new(self.participant_id.clone(), self.trial_id.clone())
    }

    pub fn group(&self) -> GroupKey {
        GroupKey::new(self.cohort.clone(), self.condition.clone())
    }
}
