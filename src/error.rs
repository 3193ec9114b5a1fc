//! Error types for Gaze Flux

use thiserror::Error;

/// Errors that can occur during computation
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing required field '{field}' ({location})")]
    MissingField { location: String, field: String },

    #[error(
        "Unclassifiable (object, region) pair ({object}, {region}) at participant {participant_id}, trial {trial_id}, ordinal {ordinal}"
    )]
    Classification {
        participant_id: String,
        trial_id: String,
        ordinal: u64,
        object: String,
        region: String,
    },

    #[error(
        "Non-monotonic ordinal in participant {participant_id}, trial {trial_id}: {ordinal} follows {previous}"
    )]
    NonMonotonicOrdinal {
        participant_id: String,
        trial_id: String,
        previous: u64,
        ordinal: u64,
    },

    #[error(
        "Inconsistent {field} in participant {participant_id}, trial {trial_id}: expected '{expected}', got '{actual}'"
    )]
    InconsistentTrial {
        participant_id: String,
        trial_id: String,
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("No precision weight configured for metric '{0}'")]
    MissingWeightField(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}
