//! Transition aggregation
//!
//! Accumulates transition counts per (cohort, condition) and produces full
//! source × destination probability tables over the configured category space.
//! Accumulation is a pure count sum, so partial aggregates merge in any order.

use crate::types::{Category, GroupKey, Transition};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

type CountMatrix = BTreeMap<Category, BTreeMap<Category, u64>>;

/// One destination cell of a transition table row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionCell {
    pub destination: Category,
    pub count: u64,
    /// count / row total; 0 when the row has no transitions
    pub probability: f64,
}

/// All transitions leaving one source category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRow {
    pub source: Category,
    pub total: u64,
    pub cells: Vec<TransitionCell>,
}

/// Transition table for one (cohort, condition) group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionTable {
    pub group: GroupKey,
    pub trial_count: u64,
    pub total_transitions: u64,
    pub rows: Vec<TransitionRow>,
}

impl TransitionTable {
    pub fn cell(&self, source: &Category, destination: &Category) -> Option<&TransitionCell> {
        self.rows
            .iter()
            .find(|r| &r.source == source)
            .and_then(|r| r.cells.iter().find(|c| &c.destination == destination))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
struct GroupCounts {
    trials: u64,
    matrix: CountMatrix,
}

/// Mergeable accumulator of transition counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransitionAggregator {
    groups: BTreeMap<GroupKey, GroupCounts>,
}

impl TransitionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one trial's transitions to its group
    pub fn add_trial(&mut self, group: &GroupKey, transitions: &[Transition]) {
        let counts = self.groups.entry(group.clone()).or_default();
        counts.trials += 1;
        for transition in transitions {
            *counts
                .matrix
                .entry(transition.source.clone())
                .or_default()
                .entry(transition.destination.clone())
                .or_insert(0) += 1;
        }
    }

    /// Fold another partial aggregate into this one
    pub fn merge(&mut self, other: TransitionAggregator) {
        for (group, theirs) in other.groups {
            let ours = self.groups.entry(group).or_default();
            ours.trials += theirs.trials;
            for (source, row) in theirs.matrix {
                let our_row = ours.matrix.entry(source).or_default();
                for (destination, count) in row {
                    *our_row.entry(destination).or_insert(0) += count;
                }
            }
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Produce one table per group, with an explicit cell for every pair in
    /// `category_space`. Categories seen in transitions but absent from the
    /// space are appended so no count is lost.
    pub fn tables(&self, category_space: &[Category]) -> Vec<TransitionTable> {
        self.groups
            .iter()
            .map(|(group, counts)| build_table(group, counts, category_space))
            .collect()
    }
}

fn build_table(group: &GroupKey, counts: &GroupCounts, category_space: &[Category]) -> TransitionTable {
    let mut space: Vec<Category> = category_space.to_vec();
    for (source, row) in &counts.matrix {
        if !space.contains(source) {
            space.push(source.clone());
        }
        for destination in row.keys() {
            if !space.contains(destination) {
                space.push(destination.clone());
            }
        }
    }

    let empty = BTreeMap::new();
    let rows: Vec<TransitionRow> = space
        .iter()
        .map(|source| {
            let row = counts.matrix.get(source).unwrap_or(&empty);
            let total: u64 = row.values().sum();
            let cells = space
                .iter()
                .map(|destination| {
                    let count = row.get(destination).copied().unwrap_or(0);
                    let probability = if total > 0 {
                        count as f64 / total as f64
                    } else {
                        0.0
                    };
                    TransitionCell {
                        destination: destination.clone(),
                        count,
                        probability,
                    }
                })
                .collect();

            TransitionRow {
                source: source.clone(),
                total,
                cells,
            }
        })
        .collect();

    TransitionTable {
        group: group.clone(),
        trial_count: counts.trials,
        total_transitions: rows.iter().map(|r| r.total).sum(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrialKey;
    use pretty_assertions::assert_eq;

    fn transition(source: &str, destination: &str) -> Transition {
        Transition {
            trial: TrialKey::new("p1", "t1"),
            position: 0,
            source: Category::new(source),
            destination: Category::new(destination),
        }
    }

    fn space() -> Vec<Category> {
        vec![Category::new("A"), Category::new("B"), Category::new("C")]
    }

    #[test]
    fn test_probabilities_and_zero_cells() {
        let group = GroupKey::new("12m", "social");
        let mut aggregator = TransitionAggregator::new();
        aggregator.add_trial(
            &group,
            &[transition("A", "B"), transition("A", "B"), transition("A", "C")],
        );
        aggregator.add_trial(&group, &[transition("B", "A")]);

        let tables = aggregator.tables(&space());
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.trial_count, 2);
        assert_eq!(table.total_transitions, 4);
        assert_eq!(table.rows.len(), 3);
        assert!(table.rows.iter().all(|r| r.cells.len() == 3));

        let ab = table.cell(&"A".into(), &"B".into()).unwrap();
        assert_eq!(ab.count, 2);
        assert!((ab.probability - 2.0 / 3.0).abs() < 1e-12);

        let aa = table.cell(&"A".into(), &"A".into()).unwrap();
        assert_eq!(aa.count, 0);
        assert_eq!(aa.probability, 0.0);

        // Source with no outgoing transitions still has a full row of zeros
        let c_row = table.rows.iter().find(|r| r.source.as_str() == "C").unwrap();
        assert_eq!(c_row.total, 0);
        assert!(c_row.cells.iter().all(|c| c.probability == 0.0));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let young = GroupKey::new("6m", "social");
        let old = GroupKey::new("12m", "social");

        let mut left = TransitionAggregator::new();
        left.add_trial(&young, &[transition("A", "B")]);
        left.add_trial(&old, &[transition("B", "C")]);

        let mut right = TransitionAggregator::new();
        right.add_trial(&young, &[transition("A", "C"), transition("A", "B")]);

        let mut forward = left.clone();
        forward.merge(right.clone());
        let mut backward = right;
        backward.merge(left);

        assert_eq!(forward.tables(&space()), backward.tables(&space()));
        assert_eq!(forward.group_count(), 2);
    }

    #[test]
    fn test_unlisted_categories_are_kept() {
        let group = GroupKey::new("12m", "social");
        let mut aggregator = TransitionAggregator::new();
        aggregator.add_trial(&group, &[transition("A", "Z")]);

        let table = &aggregator.tables(&space())[0];
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.cell(&"A".into(), &"Z".into()).unwrap().probability, 1.0);
    }
}
