//! Adapter for converting gaze.frame.v1 records into classified trials
//!
//! Parses frame streams (JSON array or NDJSON), validates them, classifies each
//! frame's (object, region) pair and groups frames into trials keyed by
//! (participant, trial). Contract violations are fatal and carry the location of
//! the offending frame.

use crate::classifier::AoiClassifier;
use crate::error::ComputeError;
use crate::schema::frame_record::*;
use crate::types::{ClassifiedFrame, GroupKey, Trial, TrialKey};
use std::collections::BTreeMap;

/// Adapter for converting frame records to trials
pub struct FrameAdapter;

impl FrameAdapter {
    /// Parse a JSON string containing an array of frame records
    pub fn parse_array(json: &str) -> Result<Vec<FrameRecord>, ComputeError> {
        let records: Vec<FrameRecord> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse NDJSON (newline-delimited JSON) containing frame records
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<FrameRecord>, ComputeError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<FrameRecord>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(ComputeError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Validate and classify frame records, grouping them into trials.
    ///
    /// Trials are returned in (participant, trial) order. Within a trial, frames
    /// keep their input order and ordinals must strictly increase.
    pub fn to_trials(
        records: &[FrameRecord],
        classifier: &AoiClassifier,
    ) -> Result<Vec<Trial>, ComputeError> {
        let mut trials: BTreeMap<TrialKey, Trial> = BTreeMap::new();

        for (index, record) in records.iter().enumerate() {
            let frame = ValidFrame::from_record(record, index)?;
            let key = TrialKey::new(frame.participant_id, frame.trial_id);

            let target = classifier.classify(frame.object, frame.region).map_err(|e| {
                ComputeError::Classification {
                    participant_id: key.participant_id.clone(),
                    trial_id: key.trial_id.clone(),
                    ordinal: frame.ordinal,
                    object: e.object,
                    region: e.region,
                }
            })?;

            let trial = trials.entry(key.clone()).or_insert_with(|| Trial {
                key: key.clone(),
                group: GroupKey::new(frame.cohort, frame.condition),
                frames: Vec::new(),
            });

            check_group(trial, "cohort", &trial.group.cohort, frame.cohort)?;
            check_group(trial, "condition", &trial.group.condition, frame.condition)?;

            if let Some(last) = trial.frames.last() {
                if frame.ordinal <= last.ordinal {
                    return Err(ComputeError::NonMonotonicOrdinal {
                        participant_id: key.participant_id,
                        trial_id: key.trial_id,
                        previous: last.ordinal,
                        ordinal: frame.ordinal,
                    });
                }
            }

            trial.frames.push(ClassifiedFrame {
                ordinal: frame.ordinal,
                timestamp_ms: frame.timestamp_ms,
                target,
            });
        }

        log::debug!(
            "Grouped {} frames into {} trials",
            records.len(),
            trials.len()
        );

        Ok(trials.into_values().collect())
    }

    /// Validate a batch of records without stopping at the first problem
    pub fn validate_frames(records: &[FrameRecord]) -> Vec<ValidationResult> {
        records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| {
                record.validate().err().map(|error| ValidationResult {
                    index,
                    location: record.location(index),
                    error,
                })
            })
            .collect()
    }

    /// Find every schema-valid record whose label pair the classifier rejects
    pub fn unclassifiable_frames(
        records: &[FrameRecord],
        classifier: &AoiClassifier,
    ) -> Vec<LabelIssue> {
        records
            .iter()
            .enumerate()
            .filter(|(_, record)| record.validate().is_ok())
            .filter_map(|(index, record)| {
                let object = record.object.as_deref().unwrap_or_default();
                let region = record.region.as_deref().unwrap_or_default();
                classifier.classify(object, region).err().map(|_| LabelIssue {
                    index,
                    location: record.location(index),
                    object: object.to_string(),
                    region: region.to_string(),
                })
            })
            .collect()
    }
}

/// Result of record validation
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub index: usize,
    pub location: String,
    pub error: ValidationError,
}

/// A record whose (object, region) pair is not in the AOI table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelIssue {
    pub index: usize,
    pub location: String,
    pub object: String,
    pub region: String,
}

/// Borrowed view of a record that passed validation
struct ValidFrame<'a> {
    participant_id: &'a str,
    trial_id: &'a str,
    condition: &'a str,
    cohort: &'a str,
    ordinal: u64,
    object: &'a str,
    region: &'a str,
    timestamp_ms: f64,
}

impl<'a> ValidFrame<'a> {
    fn from_record(record: &'a FrameRecord, index: usize) -> Result<Self, ComputeError> {
        record.validate().map_err(|e| match e {
            ValidationError::MissingField { field } => ComputeError::MissingField {
                location: record.location(index),
                field: field.to_string(),
            },
            other => ComputeError::ParseError(format!(
                "Invalid {}: {}",
                record.location(index),
                other
            )),
        })?;

        let missing = |field: &str| ComputeError::MissingField {
            location: record.location(index),
            field: field.to_string(),
        };

        Ok(ValidFrame {
            participant_id: record.participant_id.as_deref().ok_or_else(|| missing("participant_id"))?,
            trial_id: record.trial_id.as_deref().ok_or_else(|| missing("trial_id"))?,
            condition: record.condition.as_deref().ok_or_else(|| missing("condition"))?,
            cohort: record.cohort.as_deref().ok_or_else(|| missing("cohort"))?,
            ordinal: record.ordinal.ok_or_else(|| missing("ordinal"))?,
            object: record.object.as_deref().ok_or_else(|| missing("object"))?,
            region: record.region.as_deref().ok_or_else(|| missing("region"))?,
            timestamp_ms: record.timestamp_ms.ok_or_else(|| missing("timestamp_ms"))?,
        })
    }
}

fn check_group(trial: &Trial, field: &str, expected: &str, actual: &str) -> Result<(), ComputeError> {
    if expected == actual {
        return Ok(());
    }
    Err(ComputeError::InconsistentTrial {
        participant_id: trial.key.participant_id.clone(),
        trial_id: trial.key.trial_id.clone(),
        field: field.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AoiEntry, AoiPair, AoiTable};
    use crate::types::{AttentionTarget, Category};

    fn classifier() -> AoiClassifier {
        AoiClassifier::new(&AoiTable {
            off_target: AoiPair::new("none", "none"),
            entries: vec![
                AoiEntry {
                    object: "mother".to_string(),
                    region: "face".to_string(),
                    category: Category::new("mother_face"),
                    actor: Some("mother".to_string()),
                },
                AoiEntry {
                    object: "toy".to_string(),
                    region: "body".to_string(),
                    category: Category::new("toy"),
                    actor: None,
                },
            ],
        })
    }

    fn frame(participant: &str, trial: &str, ordinal: u64, object: &str, region: &str) -> FrameRecord {
        FrameRecord::new(participant, trial, ordinal, ordinal as f64 * 33.3)
            .with_group("12m", "social")
            .with_labels(object, region)
    }

    #[test]
    fn test_to_trials_groups_and_classifies() {
        let records = vec![
            frame("p2", "t1", 0, "toy", "body"),
            frame("p1", "t1", 0, "mother", "face"),
            frame("p1", "t1", 1, "none", "none"),
            frame("p2", "t1", 1, "toy", "body"),
        ];

        let trials = FrameAdapter::to_trials(&records, &classifier()).unwrap();
        assert_eq!(trials.len(), 2);
        assert_eq!(trials[0].key, TrialKey::new("p1", "t1"));
        assert_eq!(trials[0].frames.len(), 2);
        assert_eq!(
            trials[0].frames[0].target,
            AttentionTarget::OnTarget(Category::new("mother_face"))
        );
        assert_eq!(trials[0].frames[1].target, AttentionTarget::OffTarget);
        assert_eq!(trials[1].group, GroupKey::new("12m", "social"));
    }

    #[test]
    fn test_unknown_pair_is_located() {
        let records = vec![
            frame("p1", "t1", 0, "toy", "body"),
            frame("p1", "t1", 1, "toy", "face"),
        ];

        let err = FrameAdapter::to_trials(&records, &classifier()).unwrap_err();
        match err {
            ComputeError::Classification {
                participant_id,
                trial_id,
                ordinal,
                object,
                region,
            } => {
                assert_eq!(participant_id, "p1");
                assert_eq!(trial_id, "t1");
                assert_eq!(ordinal, 1);
                assert_eq!((object.as_str(), region.as_str()), ("toy", "face"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_monotonic_ordinal_rejected() {
        let records = vec![
            frame("p1", "t1", 5, "toy", "body"),
            frame("p1", "t1", 4, "toy", "body"),
        ];
        assert!(matches!(
            FrameAdapter::to_trials(&records, &classifier()),
            Err(ComputeError::NonMonotonicOrdinal {
                previous: 5,
                ordinal: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_inconsistent_condition_rejected() {
        let records = vec![
            frame("p1", "t1", 0, "toy", "body"),
            frame("p1", "t1", 1, "toy", "body").with_group("12m", "nonsocial"),
        ];
        assert!(matches!(
            FrameAdapter::to_trials(&records, &classifier()),
            Err(ComputeError::InconsistentTrial { ref field, .. }) if field == "condition"
        ));
    }

    #[test]
    fn test_missing_field_is_structural_error() {
        let mut record = frame("p1", "t1", 0, "toy", "body");
        record.timestamp_ms = None;
        let err = FrameAdapter::to_trials(&[record], &classifier()).unwrap_err();
        assert!(matches!(err, ComputeError::MissingField { ref field, .. } if field == "timestamp_ms"));
    }

    #[test]
    fn test_parse_ndjson() {
        let ndjson = r#"{"participant_id":"p1","trial_id":"t1","condition":"social","cohort":"12m","ordinal":0,"object":"toy","region":"body","timestamp_ms":0.0}

{"participant_id":"p1","trial_id":"t1","condition":"social","cohort":"12m","ordinal":1,"object":"toy","region":"body","timestamp_ms":33.3}"#;

        let records = FrameAdapter::parse_ndjson(ndjson).unwrap();
        assert_eq!(records.len(), 2);

        let err = FrameAdapter::parse_ndjson("{\"ordinal\": 1}\nnot json").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_validate_and_label_reports() {
        let mut broken = frame("p1", "t1", 2, "toy", "body");
        broken.cohort = None;
        let records = vec![
            frame("p1", "t1", 0, "toy", "body"),
            frame("p1", "t1", 1, "ball", "body"),
            broken,
        ];

        let invalid = FrameAdapter::validate_frames(&records);
        assert_eq!(invalid.len(), 1);
        assert_eq!(invalid[0].index, 2);

        let unlabelled = FrameAdapter::unclassifiable_frames(&records, &classifier());
        assert_eq!(unlabelled.len(), 1);
        assert_eq!(unlabelled[0].object, "ball");
    }
}
