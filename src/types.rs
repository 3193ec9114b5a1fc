//! Core data types
//!
//! This module defines the records that flow through the attention pipeline:
//! classified frames, fixations, transitions and the keys used to group them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical attention-target category (an AOI label such as `mother_face`)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(String);

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Category(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Category {
    fn from(name: &str) -> Self {
        Category::new(name)
    }
}

/// Result of classifying a single frame's (object, region) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "category")]
pub enum AttentionTarget {
    /// Observer is engaged with a defined region
    OnTarget(Category),
    /// Observer is not engaged with any defined region
    OffTarget,
}

impl AttentionTarget {
    pub fn category(&self) -> Option<&Category> {
        match self {
            AttentionTarget::OnTarget(category) => Some(category),
            AttentionTarget::OffTarget => None,
        }
    }

    pub fn is_off_target(&self) -> bool {
        matches!(self, AttentionTarget::OffTarget)
    }
}

/// Identifies one trial: one presentation of one stimulus to one participant
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrialKey {
    pub participant_id: String,
    pub trial_id: String,
}

impl TrialKey {
    pub fn new(participant_id: impl Into<String>, trial_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            trial_id: trial_id.into(),
        }
    }
}

impl fmt::Display for TrialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.participant_id, self.trial_id)
    }
}

/// Grouping key for aggregation (e.g. age band × stimulus type)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub cohort: String,
    pub condition: String,
}

impl GroupKey {
    pub fn new(cohort: impl Into<String>, condition: impl Into<String>) -> Self {
        Self {
            cohort: cohort.into(),
            condition: condition.into(),
        }
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.cohort, self.condition)
    }
}

/// A single frame after classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedFrame {
    /// Ordinal index within the trial (strictly increasing)
    pub ordinal: u64,
    /// Frame timestamp in milliseconds
    pub timestamp_ms: f64,
    /// Classified attention target
    pub target: AttentionTarget,
}

/// All classified frames of one trial, in ordinal order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    pub key: TrialKey,
    pub group: GroupKey,
    pub frames: Vec<ClassifiedFrame>,
}

impl Trial {
    /// Number of frames classified as on-target
    pub fn on_target_frames(&self) -> u64 {
        self.frames
            .iter()
            .filter(|f| !f.target.is_off_target())
            .count() as u64
    }
}

/// A maximal run of same-category frames that met the minimum length
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixation {
    pub trial: TrialKey,
    /// Position of this fixation within the trial's fixation sequence
    pub sequence_index: usize,
    /// Engagement episode; an off-target frame starts a new one
    pub episode: usize,
    pub category: Category,
    pub start_ordinal: u64,
    pub end_ordinal: u64,
    /// end_ordinal - start_ordinal + 1
    pub frame_count: u64,
    /// Frame count converted with the configured sampling rate
    pub duration_ms: f64,
    pub start_timestamp_ms: f64,
    pub end_timestamp_ms: f64,
}

/// Ordered pair of consecutive fixations within one engagement episode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub trial: TrialKey,
    /// Ordinal position of the transition within the trial
    pub position: usize,
    pub source: Category,
    pub destination: Category,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attention_target_serialization() {
        let target = AttentionTarget::OnTarget(Category::new("toy"));
        let json = serde_json::to_string(&target).unwrap();
        assert_eq!(json, r#"{"kind":"on_target","category":"toy"}"#);

        let off: AttentionTarget = serde_json::from_str(r#"{"kind":"off_target"}"#).unwrap();
        assert!(off.is_off_target());
        assert_eq!(off.category(), None);
    }

    #[test]
    fn test_keys_order_deterministically() {
        let mut keys = vec![
            TrialKey::new("p2", "t1"),
            TrialKey::new("p1", "t2"),
            TrialKey::new("p1", "t1"),
        ];
        keys.sort();
        assert_eq!(keys[0], TrialKey::new("p1", "t1"));
        assert_eq!(keys[2].to_string(), "p2/t1");
    }

    #[test]
    fn test_on_target_frame_count() {
        let frame = |ordinal, target| ClassifiedFrame {
            ordinal,
            timestamp_ms: ordinal as f64 * 33.3,
            target,
        };
        let trial = Trial {
            key: TrialKey::new("p1", "t1"),
            group: GroupKey::new("12m", "social"),
            frames: vec![
                frame(0, AttentionTarget::OnTarget("toy".into())),
                frame(1, AttentionTarget::OffTarget),
                frame(2, AttentionTarget::OnTarget("toy".into())),
            ],
        };
        assert_eq!(trial.on_target_frames(), 2);
    }
}
