//! Pipeline orchestration
//!
//! This module provides the public API for gaze-flux. Each trial runs through
//! segmentation → transition extraction → pattern mining independently; the
//! results are then folded into mergeable aggregates (transition tables, pattern
//! tallies, weighted metrics).

use crate::classifier::AoiClassifier;
use crate::config::AnalysisConfig;
use crate::encoder::ReportEncoder;
use crate::error::ComputeError;
use crate::outcomes::ModelRecord;
use crate::patterns::{PatternMatch, PatternMiner, PatternSummary, PatternTally};
use crate::schema::{FrameAdapter, FrameRecord};
use crate::segmenter::FixationSegmenter;
use crate::transition_table::{TransitionAggregator, TransitionTable};
use crate::transitions::{episode_count, extract_transitions};
use crate::types::{Category, Fixation, GroupKey, Transition, Trial, TrialKey};
use crate::weighted::{WeightedMetricAggregator, WeightedSummary};
use serde::{Deserialize, Serialize};
use std::thread;

/// Everything derived from a single trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialAnalysis {
    pub key: TrialKey,
    pub group: GroupKey,
    pub total_frames: u64,
    pub on_target_frames: u64,
    pub fixations: Vec<Fixation>,
    pub transitions: Vec<Transition>,
    pub matches: Vec<PatternMatch>,
    /// No fixation survived segmentation
    pub degenerate: bool,
}

impl TrialAnalysis {
    /// Frames covered by emitted fixations
    pub fn fixation_frames(&self) -> u64 {
        self.fixations.iter().map(|f| f.frame_count).sum()
    }

    pub fn match_count(&self, pattern: &str) -> usize {
        self.matches.iter().filter(|m| m.pattern == pattern).count()
    }
}

/// Aggregated output of a batch of trials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub trials: Vec<TrialAnalysis>,
    pub transition_tables: Vec<TransitionTable>,
    pub pattern_summaries: Vec<PatternSummary>,
    pub model_records: Vec<ModelRecord>,
    pub weighted: WeightedSummary,
    pub degenerate_trials: Vec<TrialKey>,
}

/// Convert a JSON array of gaze.frame.v1 records into an encoded report.
///
/// # Arguments
/// * `frames_json` - JSON array of frame records
/// * `config_json` - Analysis configuration JSON
///
/// # Example
/// ```ignore
/// let report_json = frames_to_report(&frames, &config)?;
/// ```
pub fn frames_to_report(frames_json: &str, config_json: &str) -> Result<String, ComputeError> {
    let config = AnalysisConfig::from_json(config_json)?;
    let processor = GazeProcessor::new(config)?;
    let records = FrameAdapter::parse_array(frames_json)?;
    let report = processor.analyze_records(&records)?;
    ReportEncoder::new().encode_to_json(&report)
}

/// Configured processor for batches of trials.
///
/// Construction validates the configuration once; the processor itself holds
/// no per-trial state and can be shared across worker threads.
#[derive(Debug, Clone)]
pub struct GazeProcessor {
    classifier: AoiClassifier,
    segmenter: FixationSegmenter,
    miner: PatternMiner,
    categories: Vec<Category>,
    metrics: WeightedMetricAggregator,
}

impl GazeProcessor {
    /// Create a processor. Fails on an invalid configuration or a metric
    /// without a weight source.
    pub fn new(config: AnalysisConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        let metrics = WeightedMetricAggregator::new(&config.metrics)?;
        let classifier = AoiClassifier::new(&config.aoi_table);
        log::debug!(
            "Processor ready: {} AOI pairs, {} patterns, {} metrics",
            classifier.len(),
            config.patterns.len(),
            config.metrics.len()
        );

        Ok(Self {
            classifier,
            segmenter: FixationSegmenter::from_config(&config),
            miner: PatternMiner::from_config(&config),
            categories: config.aoi_table.categories(),
            metrics,
        })
    }

    pub fn classifier(&self) -> &AoiClassifier {
        &self.classifier
    }

    /// Configured category space, sorted
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Validate, classify and group raw frame records into trials
    pub fn to_trials(&self, records: &[FrameRecord]) -> Result<Vec<Trial>, ComputeError> {
        FrameAdapter::to_trials(records, &self.classifier)
    }

    /// Segment, extract transitions and mine patterns for one trial
    pub fn analyze_trial(&self, trial: &Trial) -> Result<TrialAnalysis, ComputeError> {
        let fixations = self.segmenter.segment(trial)?;
        let transitions = extract_transitions(&fixations);
        let matches = self.miner.mine(&fixations);
        let degenerate = fixations.is_empty();

        if degenerate {
            log::warn!(
                "Degenerate trial {} ({}): no fixation of at least {} frames",
                trial.key,
                trial.group,
                self.segmenter.min_frames()
            );
        } else {
            log::debug!(
                "Trial {}: {} fixations in {} episodes, {} transitions, {} pattern matches",
                trial.key,
                fixations.len(),
                episode_count(&fixations),
                transitions.len(),
                matches.len()
            );
        }

        Ok(TrialAnalysis {
            key: trial.key.clone(),
            group: trial.group.clone(),
            total_frames: trial.frames.len() as u64,
            on_target_frames: trial.on_target_frames(),
            fixations,
            transitions,
            matches,
            degenerate,
        })
    }

    /// Run the full pipeline over raw frame records
    pub fn analyze_records(&self, records: &[FrameRecord]) -> Result<BatchReport, ComputeError> {
        let trials = self.to_trials(records)?;
        self.run(&trials)
    }

    /// Process trials sequentially
    pub fn run(&self, trials: &[Trial]) -> Result<BatchReport, ComputeError> {
        let partial = self.process(trials)?;
        Ok(self.finish(partial))
    }

    /// Process trials on up to `workers` scoped threads and merge the partial
    /// aggregates. The report equals the one produced by [`GazeProcessor::run`].
    pub fn run_parallel(&self, trials: &[Trial], workers: usize) -> Result<BatchReport, ComputeError> {
        let workers = workers.max(1);
        if workers == 1 || trials.len() < 2 {
            return self.run(trials);
        }

        let chunk_size = trials.len().div_ceil(workers);
        log::debug!(
            "Splitting {} trials into chunks of {} across {} workers",
            trials.len(),
            chunk_size,
            workers
        );

        let partials: Vec<Result<Partial, ComputeError>> = thread::scope(|scope| {
            let handles: Vec<_> = trials
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || self.process(chunk)))
                .collect();

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        });

        let mut merged = self.empty_partial();
        for partial in partials {
            merged.merge(partial?);
        }
        Ok(self.finish(merged))
    }

    fn empty_partial(&self) -> Partial {
        Partial {
            trials: Vec::new(),
            model_records: Vec::new(),
            transitions: TransitionAggregator::new(),
            patterns: PatternTally::new(),
            weighted: self.metrics.empty_clone(),
        }
    }

    fn process(&self, trials: &[Trial]) -> Result<Partial, ComputeError> {
        let pattern_names = self.miner.pattern_names();
        let mut partial = self.empty_partial();

        for trial in trials {
            let analysis = self.analyze_trial(trial)?;
            partial
                .transitions
                .add_trial(&analysis.group, &analysis.transitions);
            partial
                .patterns
                .add_trial(&analysis.group, &pattern_names, &analysis.matches);
            let records = partial.weighted.observe_trial(&analysis);
            partial.model_records.extend(records);
            partial.trials.push(analysis);
        }

        Ok(partial)
    }

    fn finish(&self, partial: Partial) -> BatchReport {
        let degenerate_trials: Vec<TrialKey> = partial
            .trials
            .iter()
            .filter(|t| t.degenerate)
            .map(|t| t.key.clone())
            .collect();
        let fixation_count: usize = partial.trials.iter().map(|t| t.fixations.len()).sum();
        let weighted = partial.weighted.summarize();
        let exclusions: u64 = weighted.metrics.iter().map(|m| m.excluded.total()).sum();

        log::info!(
            "Analyzed {} trials in {} groups: {} fixations, {} degenerate trials, {} excluded observations",
            partial.trials.len(),
            partial.transitions.group_count(),
            fixation_count,
            degenerate_trials.len(),
            exclusions
        );

        BatchReport {
            transition_tables: partial.transitions.tables(&self.categories),
            pattern_summaries: partial.patterns.summaries(),
            trials: partial.trials,
            model_records: partial.model_records,
            weighted,
            degenerate_trials,
        }
    }
}

/// Per-worker slice of a batch
struct Partial {
    trials: Vec<TrialAnalysis>,
    model_records: Vec<ModelRecord>,
    transitions: TransitionAggregator,
    patterns: PatternTally,
    weighted: WeightedMetricAggregator,
}

impl Partial {
    fn merge(&mut self, other: Partial) {
        self.trials.extend(other.trials);
        self.model_records.extend(other.model_records);
        self.transitions.merge(other.transitions);
        self.patterns.merge(other.patterns);
        self.weighted.merge(other.weighted);
    }
}
