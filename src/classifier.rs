//! Attention-target classification
//!
//! Maps a raw (object, region) annotation onto one canonical category from the
//! configured AOI table. Pairs outside the table are rejected, never defaulted.

use crate::config::{AoiPair, AoiTable};
use crate::types::{AttentionTarget, Category};
use std::collections::HashMap;
use thiserror::Error;

/// An (object, region) pair that is neither in the table nor the off-target pair
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("({object}, {region}) is not in the AOI table")]
pub struct UnknownAoiPair {
    pub object: String,
    pub region: String,
}

/// Stateless lookup built once from an [`AoiTable`]
#[derive(Debug, Clone)]
pub struct AoiClassifier {
    lookup: HashMap<AoiPair, Category>,
    off_target: AoiPair,
}

impl AoiClassifier {
    /// Build a classifier. The table is expected to have passed validation.
    pub fn new(table: &AoiTable) -> Self {
        let lookup = table
            .entries
            .iter()
            .map(|e| (e.pair(), e.category.clone()))
            .collect();

        Self {
            lookup,
            off_target: table.off_target.clone(),
        }
    }

    /// Classify one frame's label pair
    pub fn classify(&self, object: &str, region: &str) -> Result<AttentionTarget, UnknownAoiPair> {
        if object == self.off_target.object && region == self.off_target.region {
            return Ok(AttentionTarget::OffTarget);
        }

        // HashMap<AoiPair, _> cannot be probed with borrowed strs, so build the key
        let key = AoiPair::new(object, region);
        match self.lookup.get(&key) {
            Some(category) => Ok(AttentionTarget::OnTarget(category.clone())),
            None => Err(UnknownAoiPair {
                object: object.to_string(),
                region: region.to_string(),
            }),
        }
    }

    /// Number of mapped (non-sentinel) pairs
    pub(crate) fn len(&self) -> usize {
        self.lookup.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AoiEntry;

    fn table() -> AoiTable {
        AoiTable {
            off_target: AoiPair::new("none", "none"),
            entries: vec![
                AoiEntry {
                    object: "mother".to_string(),
                    region: "face".to_string(),
                    category: Category::new("mother_face"),
                    actor: Some("mother".to_string()),
                },
                AoiEntry {
                    object: "mother".to_string(),
                    region: "eyes".to_string(),
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
        }
    }

    #[test]
    fn test_classify_known_pairs() {
        let classifier = AoiClassifier::new(&table());
        assert_eq!(classifier.len(), 3);

        assert_eq!(
            classifier.classify("mother", "eyes").unwrap(),
            AttentionTarget::OnTarget(Category::new("mother_face"))
        );
        assert_eq!(
            classifier.classify("toy", "body").unwrap(),
            AttentionTarget::OnTarget(Category::new("toy"))
        );
    }

    #[test]
    fn test_classify_off_target_sentinel() {
        let classifier = AoiClassifier::new(&table());
        assert_eq!(
            classifier.classify("none", "none").unwrap(),
            AttentionTarget::OffTarget
        );
    }

    #[test]
    fn test_unknown_pair_is_an_error() {
        let classifier = AoiClassifier::new(&table());
        let err = classifier.classify("toy", "face").unwrap_err();
        assert_eq!(err.object, "toy");
        assert_eq!(err.region, "face");

        // Half of the sentinel is not the sentinel
        assert!(classifier.classify("none", "face").is_err());
    }
}
