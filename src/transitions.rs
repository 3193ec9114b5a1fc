//! Transition extraction
//!
//! Emits one transition per consecutive pair of fixations inside the same
//! engagement episode. No filtering beyond what segmentation already did.

use crate::types::{Fixation, Transition};

/// Extract the ordered transitions of one trial's fixation sequence
pub fn extract_transitions(fixations: &[Fixation]) -> Vec<Transition> {
    fixations
        .windows(2)
        .filter(|pair| pair[0].episode == pair[1].episode)
        .enumerate()
        .map(|(position, pair)| Transition {
            trial: pair[1].trial.clone(),
            position,
            source: pair[0].category.clone(),
            destination: pair[1].category.clone(),
        })
        .collect()
}

/// Number of distinct engagement episodes that contain at least one fixation
pub fn episode_count(fixations: &[Fixation]) -> usize {
    if fixations.is_empty() {
        return 0;
    }
    1 + fixations
        .windows(2)
        .filter(|pair| pair[0].episode != pair[1].episode)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::tests::trial_from;
    use crate::segmenter::FixationSegmenter;
    use crate::types::Category;

    fn fixations_for(labels: &[&str]) -> Vec<Fixation> {
        FixationSegmenter::new(3, 30.0)
            .segment(&trial_from(labels))
            .unwrap()
    }

    #[test]
    fn test_off_target_gap_yields_no_transition() {
        let fixations = fixations_for(&["X", "X", "X", "Y", "Y", "-", "X", "X", "X", "X"]);
        assert_eq!(fixations.len(), 2);
        assert!(extract_transitions(&fixations).is_empty());
        assert_eq!(episode_count(&fixations), 2);
    }

    #[test]
    fn test_consecutive_fixations_yield_ordered_transitions() {
        let fixations = fixations_for(&["A", "A", "A", "B", "B", "B", "C", "C", "C"]);
        let transitions = extract_transitions(&fixations);

        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[0].source, Category::new("A"));
        assert_eq!(transitions[0].destination, Category::new("B"));
        assert_eq!(transitions[1].position, 1);
        assert_eq!(transitions[1].destination, Category::new("C"));
    }

    #[test]
    fn test_transition_count_law() {
        let cases: Vec<Vec<&str>> = vec![
            vec![],
            vec!["A", "A", "A"],
            vec!["A", "A", "A", "B", "B", "B"],
            vec!["A", "A", "A", "-", "B", "B", "B", "C", "C", "C"],
            vec!["A", "A", "A", "B", "A", "A", "A", "-", "-", "C", "C", "C"],
        ];

        for labels in cases {
            let fixations = fixations_for(&labels);
            let transitions = extract_transitions(&fixations);
            assert_eq!(
                transitions.len(),
                fixations.len() - episode_count(&fixations)
            );
            if episode_count(&fixations) <= 1 {
                assert_eq!(transitions.len(), fixations.len().saturating_sub(1));
            }
        }
    }

    #[test]
    fn test_short_interruption_allows_self_transition() {
        let fixations = fixations_for(&["A", "A", "A", "B", "A", "A", "A"]);
        let transitions = extract_transitions(&fixations);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].source, transitions[0].destination);
    }
}
