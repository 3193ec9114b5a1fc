//! Scan-pattern mining
//!
//! Detects three-step ordered scan patterns (e.g. one caregiver's face → toy →
//! the other caregiver's face) in a trial's fixation sequence. Each step may skip
//! at most `max_gap` intervening fixations, and a candidate whose first and third
//! fixations belong to the same actor is rejected.
//!
//! Search is a bounded forward lookahead from every start index, so the cost per
//! trial is O(n × gap²). At most one match per (pattern, start index) is kept;
//! matches from different start indices may overlap.

use crate::config::AnalysisConfig;
use crate::error::ComputeError;
use crate::types::{Category, Fixation, GroupKey, TrialKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One step of a pattern: a single category or a set of alternatives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternStep {
    Category(Category),
    AnyOf(Vec<Category>),
}

impl PatternStep {
    pub fn matches(&self, category: &Category) -> bool {
        match self {
            PatternStep::Category(expected) => expected == category,
            PatternStep::AnyOf(options) => options.contains(category),
        }
    }

    pub fn categories(&self) -> Vec<&Category> {
        match self {
            PatternStep::Category(category) => vec![category],
            PatternStep::AnyOf(options) => options.iter().collect(),
        }
    }
}

impl From<&str> for PatternStep {
    fn from(category: &str) -> Self {
        PatternStep::Category(Category::new(category))
    }
}

/// A named three-step target pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternDefinition {
    pub name: String,
    pub steps: [PatternStep; 3],
}

impl PatternDefinition {
    pub fn new(name: impl Into<String>, steps: [PatternStep; 3]) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    pub(crate) fn validate(&self, known: &BTreeSet<Category>) -> Result<(), ComputeError> {
        if self.name.trim().is_empty() {
            return Err(ComputeError::ConfigError(
                "Pattern name must not be empty".to_string(),
            ));
        }
        for (position, step) in self.steps.iter().enumerate() {
            let categories = step.categories();
            if categories.is_empty() {
                return Err(ComputeError::ConfigError(format!(
                    "Pattern '{}' step {} lists no categories",
                    self.name,
                    position + 1
                )));
            }
            if let Some(unknown) = categories.into_iter().find(|c| !known.contains(*c)) {
                return Err(ComputeError::ConfigError(format!(
                    "Pattern '{}' references unknown category '{}'",
                    self.name, unknown
                )));
            }
        }
        Ok(())
    }
}

/// A matched occurrence of a pattern within one trial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub trial: TrialKey,
    pub pattern: String,
    /// Fixation sequence indices of the three matched steps
    pub indices: [usize; 3],
    pub categories: [Category; 3],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub third_actor: Option<String>,
    pub start_ordinal: u64,
    pub end_ordinal: u64,
}

/// Miner for the configured pattern library
#[derive(Debug, Clone)]
pub struct PatternMiner {
    patterns: Vec<PatternDefinition>,
    actors: BTreeMap<Category, Option<String>>,
    max_gap: usize,
    confine_to_episodes: bool,
}

impl PatternMiner {
    pub fn new(
        patterns: Vec<PatternDefinition>,
        actors: BTreeMap<Category, Option<String>>,
        max_gap: usize,
    ) -> Self {
        Self {
            patterns,
            actors,
            max_gap,
            confine_to_episodes: false,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(
            config.patterns.clone(),
            config.aoi_table.actors(),
            config.max_pattern_gap,
        )
        .confined_to_episodes(config.confine_patterns_to_episodes)
    }

    /// Reject candidates whose steps are separated by an off-target break
    pub fn confined_to_episodes(mut self, confine: bool) -> Self {
        self.confine_to_episodes = confine;
        self
    }

    pub fn patterns(&self) -> &[PatternDefinition] {
        &self.patterns
    }

    pub fn pattern_names(&self) -> Vec<String> {
        self.patterns.iter().map(|p| p.name.clone()).collect()
    }

    /// All matches of every pattern, grouped by pattern in library order
    pub fn mine(&self, fixations: &[Fixation]) -> Vec<PatternMatch> {
        let mut matches = Vec::new();
        for pattern in &self.patterns {
            for start in 0..fixations.len() {
                if let Some(found) = self.match_from(pattern, fixations, start) {
                    matches.push(found);
                }
            }
        }
        matches
    }

    fn match_from(
        &self,
        pattern: &PatternDefinition,
        fixations: &[Fixation],
        i: usize,
    ) -> Option<PatternMatch> {
        let [first_step, second_step, third_step] = &pattern.steps;
        let first = &fixations[i];
        if !first_step.matches(&first.category) {
            return None;
        }
        let first_actor = self.actor_of(&first.category);

        for j in self.lookahead(fixations, i) {
            if !second_step.matches(&fixations[j].category) {
                continue;
            }
            for k in self.lookahead(fixations, j) {
                let third = &fixations[k];
                if !third_step.matches(&third.category) {
                    continue;
                }
                let third_actor = self.actor_of(&third.category);
                if first_actor == third_actor {
                    continue;
                }

                return Some(PatternMatch {
                    trial: first.trial.clone(),
                    pattern: pattern.name.clone(),
                    indices: [i, j, k],
                    categories: [
                        first.category.clone(),
                        fixations[j].category.clone(),
                        third.category.clone(),
                    ],
                    first_actor: first_actor.map(str::to_string),
                    third_actor: third_actor.map(str::to_string),
                    start_ordinal: first.start_ordinal,
                    end_ordinal: third.end_ordinal,
                });
            }
        }

        None
    }

    /// Candidate indices for the next step after `from`
    fn lookahead<'a>(
        &'a self,
        fixations: &'a [Fixation],
        from: usize,
    ) -> impl Iterator<Item = usize> + 'a {
        let end = from
            .saturating_add(self.max_gap)
            .saturating_add(2)
            .min(fixations.len());
        let episode = fixations[from].episode;
        ((from + 1)..end)
            .take_while(move |&next| !self.confine_to_episodes || fixations[next].episode == episode)
    }

    fn actor_of(&self, category: &Category) -> Option<&str> {
        self.actors.get(category).and_then(|a| a.as_deref())
    }
}

/// Pattern counts for one (cohort, condition, pattern)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub group: GroupKey,
    pub pattern: String,
    pub match_count: u64,
    pub trials_with_match: u64,
    pub trial_count: u64,
    pub matches_per_trial: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct TallyCounts {
    matches: u64,
    trials_with_match: u64,
    trials: u64,
}

/// Mergeable per-group pattern counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternTally {
    counts: BTreeMap<(GroupKey, String), TallyCounts>,
}

impl PatternTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one trial. Every pattern in `patterns` is counted as observed,
    /// including those with no match.
    pub fn add_trial(&mut self, group: &GroupKey, patterns: &[String], matches: &[PatternMatch]) {
        for pattern in patterns {
            let found = matches.iter().filter(|m| &m.pattern == pattern).count() as u64;
            let counts = self
                .counts
                .entry((group.clone(), pattern.clone()))
                .or_default();
            counts.trials += 1;
            counts.matches += found;
            if found > 0 {
                counts.trials_with_match += 1;
            }
        }
    }

    pub fn merge(&mut self, other: PatternTally) {
        for (key, theirs) in other.counts {
            let ours = self.counts.entry(key).or_default();
            ours.matches += theirs.matches;
            ours.trials_with_match += theirs.trials_with_match;
            ours.trials += theirs.trials;
        }
    }

    pub fn summaries(&self) -> Vec<PatternSummary> {
        self.counts
            .iter()
            .map(|((group, pattern), counts)| PatternSummary {
                group: group.clone(),
                pattern: pattern.clone(),
                match_count: counts.matches,
                trials_with_match: counts.trials_with_match,
                trial_count: counts.trials,
                matches_per_trial: if counts.trials > 0 {
                    counts.matches as f64 / counts.trials as f64
                } else {
                    0.0
                },
            })
            .collect()
    }
}
