//! Report encoding
//!
//! This module encodes a batch report into the payloads handed to the
//! collaborators: a JSON report for the reporting side (transition tables,
//! pattern counts, weighted summaries) and NDJSON records for the modeling side.

use crate::error::ComputeError;
use crate::pipeline::BatchReport;
use crate::patterns::PatternSummary;
use crate::transition_table::TransitionTable;
use crate::types::TrialKey;
use crate::weighted::{Contrast, WeightedMetric};
use crate::{GAZE_FLUX_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current report schema version
pub const REPORT_VERSION: &str = "gaze.report.v1";

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Trial and observation exclusions of a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExclusionReport {
    pub trial_count: u64,
    pub degenerate_trial_count: u64,
    pub degenerate_trials: Vec<TrialKey>,
    /// Metric observations left out of weighted means, over all metrics
    pub excluded_observations: u64,
}

/// Payload for the reporting collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportPayload {
    pub report_version: String,
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    pub transition_tables: Vec<TransitionTable>,
    pub pattern_summaries: Vec<PatternSummary>,
    pub weighted_metrics: Vec<WeightedMetric>,
    pub contrasts: Vec<Contrast>,
    pub exclusions: ExclusionReport,
}

/// Encoder for report payloads
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn encode(&self, report: &BatchReport) -> ReportPayload {
        let producer = ReportProducer {
            name: PRODUCER_NAME.to_string(),
            version: GAZE_FLUX_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        };

        let exclusions = ExclusionReport {
            trial_count: report.trials.len() as u64,
            degenerate_trial_count: report.degenerate_trials.len() as u64,
            degenerate_trials: report.degenerate_trials.clone(),
            excluded_observations: report
                .weighted
                .metrics
                .iter()
                .map(|m| m.excluded.total())
                .sum(),
        };

        ReportPayload {
            report_version: REPORT_VERSION.to_string(),
            producer,
            computed_at_utc: Utc::now().to_rfc3339(),
            transition_tables: report.transition_tables.clone(),
            pattern_summaries: report.pattern_summaries.clone(),
            weighted_metrics: report.weighted.metrics.clone(),
            contrasts: report.weighted.contrasts.clone(),
            exclusions,
        }
    }

    /// Encode to JSON string
    pub fn encode_to_json(&self, report: &BatchReport) -> Result<String, ComputeError> {
        let payload = self.encode(report);
        serde_json::to_string_pretty(&payload).map_err(ComputeError::JsonError)
    }

    /// One line per trial × metric, including excluded observations
    pub fn model_records_ndjson(&self, report: &BatchReport) -> Result<String, ComputeError> {
        to_ndjson(&report.model_records)
    }

    /// One line per trial with its fixations, transitions and matches
    pub fn trial_details_ndjson(&self, report: &BatchReport) -> Result<String, ComputeError> {
        to_ndjson(&report.trials)
    }
}

fn to_ndjson<T: Serialize>(items: &[T]) -> Result<String, ComputeError> {
    let mut out = String::new();
    for item in items {
        let line = serde_json::to_string(item)
            .map_err(|e| ComputeError::EncodingError(e.to_string()))?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcomes::{ModelRecord, ObservationStatus, WeightSource};
    use crate::types::GroupKey;
    use crate::weighted::{ExclusionCounts, WeightedSummary};
    use pretty_assertions::assert_eq;

    fn make_test_report() -> BatchReport {
        let record = |participant: &str, value: Option<f64>, status| ModelRecord {
            participant_id: participant.to_string(),
            trial_id: "t1".to_string(),
            cohort: "12m".to_string(),
            condition: "social".to_string(),
            metric: "fixation_count".to_string(),
            value,
            weight: 4.0,
            weight_source: WeightSource::FixationCount,
            status,
        };

        BatchReport {
            trials: Vec::new(),
            transition_tables: Vec::new(),
            pattern_summaries: Vec::new(),
            model_records: vec![
                record("p1", Some(4.0), ObservationStatus::Included),
                record("p2", None, ObservationStatus::Degenerate),
            ],
            weighted: WeightedSummary {
                metrics: vec![WeightedMetric {
                    metric: "fixation_count".to_string(),
                    group: GroupKey::new("12m", "social"),
                    weight_source: WeightSource::FixationCount,
                    weighted_mean: Some(4.0),
                    weighted_variance: None,
                    effective_n: Some(1.0),
                    standard_error: None,
                    ci95_lower: None,
                    ci95_upper: None,
                    unweighted_mean: Some(4.0),
                    total_weight: 4.0,
                    trial_count: 2,
                    included_count: 1,
                    excluded: ExclusionCounts {
                        degenerate: 1,
                        ..Default::default()
                    },
                }],
                contrasts: Vec::new(),
            },
            degenerate_trials: vec![TrialKey::new("p2", "t1")],
        }
    }

    #[test]
    fn test_encode_report_payload() {
        let encoder = ReportEncoder::with_instance_id("test-instance".to_string());
        let payload = encoder.encode(&make_test_report());

        assert_eq!(payload.report_version, REPORT_VERSION);
        assert_eq!(payload.producer.name, "gaze-flux");
        assert_eq!(payload.producer.instance_id, "test-instance");
        assert_eq!(payload.exclusions.degenerate_trial_count, 1);
        assert_eq!(payload.exclusions.excluded_observations, 1);
        assert_eq!(payload.weighted_metrics.len(), 1);
    }

    #[test]
    fn test_encode_to_json() {
        let encoder = ReportEncoder::new();
        let json = encoder.encode_to_json(&make_test_report()).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["report_version"], "gaze.report.v1");
        assert_eq!(parsed["exclusions"]["degenerate_trials"][0]["participant_id"], "p2");
        assert!(parsed["computed_at_utc"].as_str().is_some());
    }

    #[test]
    fn test_model_records_ndjson() {
        let ndjson = ReportEncoder::new()
            .model_records_ndjson(&make_test_report())
            .unwrap();
        let lines: Vec<&str> = ndjson.lines().collect();
        assert_eq!(lines.len(), 2);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["status"], "degenerate");
        assert_eq!(second["weight_source"], "fixation_count");
        assert!(second["value"].is_null());
    }
}
