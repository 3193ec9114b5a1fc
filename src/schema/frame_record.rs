//! gaze.frame.v1 schema definition
//!
//! One record per annotated video frame, as delivered by the ingestion side.
//! Every field except `schema_version` is required; they are declared optional
//! here so that a missing field is reported by name instead of as an opaque
//! parse failure.

use serde::{Deserialize, Serialize};

/// Current schema version
pub const SCHEMA_VERSION: &str = "gaze.frame.v1";

/// A single annotated frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Schema version identifier; assumed current when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default)]
    pub participant_id: Option<String>,
    #[serde(default)]
    pub trial_id: Option<String>,
    /// Stimulus condition label
    #[serde(default)]
    pub condition: Option<String>,
    /// Cohort label (e.g. age band)
    #[serde(default)]
    pub cohort: Option<String>,
    /// Frame ordinal within the trial
    #[serde(default)]
    pub ordinal: Option<u64>,
    /// Annotated object (e.g. "mother")
    #[serde(default)]
    pub object: Option<String>,
    /// Annotated region of the object (e.g. "face")
    #[serde(default)]
    pub region: Option<String>,
    /// Frame timestamp in milliseconds
    #[serde(default)]
    pub timestamp_ms: Option<f64>,
}

impl FrameRecord {
    /// Create a frame record for one participant's trial
    pub fn new(
        participant_id: impl Into<String>,
        trial_id: impl Into<String>,
        ordinal: u64,
        timestamp_ms: f64,
    ) -> Self {
        FrameRecord {
            schema_version: Some(SCHEMA_VERSION.to_string()),
            participant_id: Some(participant_id.into()),
            trial_id: Some(trial_id.into()),
            ordinal: Some(ordinal),
            timestamp_ms: Some(timestamp_ms),
            ..Default::default()
        }
    }

    /// Set the cohort and condition labels
    pub fn with_group(mut self, cohort: impl Into<String>, condition: impl Into<String>) -> Self {
        self.cohort = Some(cohort.into());
        self.condition = Some(condition.into());
        self
    }

    /// Set the annotated (object, region) pair
    pub fn with_labels(mut self, object: impl Into<String>, region: impl Into<String>) -> Self {
        self.object = Some(object.into());
        self.region = Some(region.into());
        self
    }

    /// Human-readable position of this record for error messages
    pub fn location(&self, index: usize) -> String {
        match (&self.participant_id, &self.trial_id) {
            (Some(p), Some(t)) => format!("frame {} of participant {}, trial {}", index, p, t),
            _ => format!("frame {}", index),
        }
    }

    /// Validate the record schema
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(version) = &self.schema_version {
            if version != SCHEMA_VERSION {
                return Err(ValidationError::InvalidSchemaVersion {
                    expected: SCHEMA_VERSION.to_string(),
                    actual: version.clone(),
                });
            }
        }

        let text_fields = [
            ("participant_id", &self.participant_id),
            ("trial_id", &self.trial_id),
            ("condition", &self.condition),
            ("cohort", &self.cohort),
            ("object", &self.object),
            ("region", &self.region),
        ];
        for (field, value) in text_fields {
            match value {
                None => return Err(ValidationError::MissingField { field }),
                Some(v) if v.trim().is_empty() && field != "object" && field != "region" => {
                    return Err(ValidationError::EmptyField { field })
                }
                Some(_) => {}
            }
        }

        if self.ordinal.is_none() {
            return Err(ValidationError::MissingField { field: "ordinal" });
        }

        match self.timestamp_ms {
            None => Err(ValidationError::MissingField {
                field: "timestamp_ms",
            }),
            Some(ts) if !ts.is_finite() => Err(ValidationError::NonFiniteTimestamp),
            Some(_) => Ok(()),
        }
    }
}

/// Validation errors for frame records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("Empty identifier field: {field}")]
    EmptyField { field: &'static str },

    #[error("Timestamp is not a finite number")]
    NonFiniteTimestamp,
}
