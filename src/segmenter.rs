//! Fixation segmentation
//!
//! Run-length encodes a trial's classified frames into fixations. Runs shorter than
//! the configured minimum are discarded; off-target runs are never emitted and also
//! end the current engagement episode, so fixations on either side of a look-away
//! are never treated as adjacent.

use crate::config::AnalysisConfig;
use crate::error::ComputeError;
use crate::types::{AttentionTarget, ClassifiedFrame, Fixation, Trial};

/// A closed run of same-target frames
#[derive(Debug, Clone, PartialEq)]
struct Run {
    target: AttentionTarget,
    start_ordinal: u64,
    end_ordinal: u64,
    start_timestamp_ms: f64,
    end_timestamp_ms: f64,
    length: u64,
}

impl Run {
    fn open(frame: &ClassifiedFrame) -> Self {
        Run {
            target: frame.target.clone(),
            start_ordinal: frame.ordinal,
            end_ordinal: frame.ordinal,
            start_timestamp_ms: frame.timestamp_ms,
            end_timestamp_ms: frame.timestamp_ms,
            length: 1,
        }
    }

    fn extend(&mut self, frame: &ClassifiedFrame) {
        self.end_ordinal = frame.ordinal;
        self.end_timestamp_ms = frame.timestamp_ms;
        self.length += 1;
    }
}

/// Left fold state: the open run plus every run closed so far
#[derive(Debug, Default)]
struct RunFold {
    current: Option<Run>,
    closed: Vec<Run>,
}

impl RunFold {
    fn push(mut self, frame: &ClassifiedFrame) -> Self {
        if let Some(run) = self.current.as_mut() {
            if run.target == frame.target {
                run.extend(frame);
                return self;
            }
        }
        if let Some(run) = self.current.replace(Run::open(frame)) {
            self.closed.push(run);
        }
        self
    }

    fn finish(mut self) -> Vec<Run> {
        if let Some(run) = self.current.take() {
            self.closed.push(run);
        }
        self.closed
    }
}

/// Segmenter for converting a trial's frames into fixations
#[derive(Debug, Clone)]
pub struct FixationSegmenter {
    min_frames: u64,
    sampling_rate_hz: f64,
}

impl FixationSegmenter {
    pub fn new(min_frames: u32, sampling_rate_hz: f64) -> Self {
        Self {
            min_frames: u64::from(min_frames.max(1)),
            sampling_rate_hz,
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.min_fixation_frames, config.sampling_rate_hz)
    }

    pub fn min_frames(&self) -> u64 {
        self.min_frames
    }

    /// Segment one trial into its ordered fixation sequence.
    ///
    /// Ordinals are checked before anything is emitted. A trial with no qualifying
    /// run yields an empty sequence, not an error.
    ///
    /// Fixations are maximal: two fixations that touch in time (the second
    /// starts at the ordinal after the first ends) never share a category. A run
    /// shorter than the threshold is dropped without closing the episode, so
    /// `A A A B A A A` at a threshold of 3 yields two `A` fixations that follow
    /// each other in the sequence but do not touch.
    pub fn segment(&self, trial: &Trial) -> Result<Vec<Fixation>, ComputeError> {
        check_ordinals(trial)?;

        let runs = trial
            .frames
            .iter()
            .fold(RunFold::default(), RunFold::push)
            .finish();

        let mut fixations: Vec<Fixation> = Vec::new();
        let mut episode = 0;
        let mut break_pending = false;

        for run in &runs {
            let category = match &run.target {
                AttentionTarget::OffTarget => {
                    if !fixations.is_empty() {
                        break_pending = true;
                    }
                    continue;
                }
                AttentionTarget::OnTarget(category) => category,
            };

            if run.length < self.min_frames {
                continue;
            }

            if break_pending {
                episode += 1;
                break_pending = false;
            }

            fixations.push(Fixation {
                trial: trial.key.clone(),
                sequence_index: fixations.len(),
                episode,
                category: category.clone(),
                start_ordinal: run.start_ordinal,
                end_ordinal: run.end_ordinal,
                frame_count: run.length,
                duration_ms: self.frames_to_ms(run.length),
                start_timestamp_ms: run.start_timestamp_ms,
                end_timestamp_ms: run.end_timestamp_ms,
            });
        }

        log::debug!(
            "Segmented trial {}: {} frames, {} runs, {} fixations",
            trial.key,
            trial.frames.len(),
            runs.len(),
            fixations.len()
        );

        Ok(fixations)
    }

    fn frames_to_ms(&self, frames: u64) -> f64 {
        frames as f64 * 1000.0 / self.sampling_rate_hz
    }
}

/// Ordinals must be strictly increasing within a trial
fn check_ordinals(trial: &Trial) -> Result<(), ComputeError> {
    for pair in trial.frames.windows(2) {
        if pair[1].ordinal <= pair[0].ordinal {
            return Err(ComputeError::NonMonotonicOrdinal {
                participant_id: trial.key.participant_id.clone(),
                trial_id: trial.key.trial_id.clone(),
                previous: pair[0].ordinal,
                ordinal: pair[1].ordinal,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{Category, GroupKey, TrialKey};
    use pretty_assertions::assert_eq;

    /// Build a trial from single-letter categories; "-" is off-target
    pub(crate) fn trial_from(labels: &[&str]) -> Trial {
        let frames = labels
            .iter()
            .enumerate()
            .map(|(i, label)| ClassifiedFrame {
                ordinal: i as u64,
                timestamp_ms: i as f64 * 1000.0 / 30.0,
                target: if *label == "-" {
                    AttentionTarget::OffTarget
                } else {
                    AttentionTarget::OnTarget(Category::new(*label))
                },
            })
            .collect();

        Trial {
            key: TrialKey::new("p1", "t1"),
            group: GroupKey::new("12m", "social"),
            frames,
        }
    }

    fn summary(fixations: &[Fixation]) -> Vec<(String, u64, u64, usize)> {
        fixations
            .iter()
            .map(|f| {
                (
                    f.category.to_string(),
                    f.start_ordinal,
                    f.end_ordinal,
                    f.episode,
                )
            })
            .collect()
    }

    #[test]
    fn test_off_target_breaks_adjacency() {
        let trial = trial_from(&["X", "X", "X", "Y", "Y", "-", "X", "X", "X", "X"]);
        let fixations = FixationSegmenter::new(3, 30.0).segment(&trial).unwrap();

        assert_eq!(
            summary(&fixations),
            vec![("X".to_string(), 0, 2, 0), ("X".to_string(), 6, 9, 1)]
        );
        assert_eq!(fixations[0].frame_count, 3);
        assert_eq!(fixations[1].frame_count, 4);
        assert_eq!(fixations[1].sequence_index, 1);
    }

    #[test]
    fn test_short_runs_discarded_without_breaking_episode() {
        let trial = trial_from(&["A", "A", "A", "B", "C", "C", "C"]);
        let fixations = FixationSegmenter::new(3, 30.0).segment(&trial).unwrap();

        assert_eq!(
            summary(&fixations),
            vec![("A".to_string(), 0, 2, 0), ("C".to_string(), 4, 6, 0)]
        );
    }

    #[test]
    fn test_same_category_neighbours_do_not_touch() {
        let trial = trial_from(&["A", "A", "A", "B", "A", "A", "A"]);
        let fixations = FixationSegmenter::new(3, 30.0).segment(&trial).unwrap();

        assert_eq!(
            summary(&fixations),
            vec![("A".to_string(), 0, 2, 0), ("A".to_string(), 4, 6, 0)]
        );
        assert!(fixations[1].start_ordinal > fixations[0].end_ordinal + 1);
    }

    #[test]
    fn test_empty_and_degenerate_trials() {
        let segmenter = FixationSegmenter::new(3, 30.0);
        assert!(segmenter.segment(&trial_from(&[])).unwrap().is_empty());
        assert!(segmenter
            .segment(&trial_from(&["A", "A", "-", "-", "-", "B"]))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_long_fixation_preserved() {
        let labels = vec!["A"; 5000];
        let fixations = FixationSegmenter::new(3, 50.0)
            .segment(&trial_from(&labels))
            .unwrap();

        assert_eq!(fixations.len(), 1);
        assert_eq!(fixations[0].frame_count, 5000);
        assert!((fixations[0].duration_ms - 100_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_leading_off_target_does_not_open_episode() {
        let trial = trial_from(&["-", "-", "A", "A", "A", "-", "B", "B", "B"]);
        let fixations = FixationSegmenter::new(3, 30.0).segment(&trial).unwrap();
        assert_eq!(fixations[0].episode, 0);
        assert_eq!(fixations[1].episode, 1);
    }

    #[test]
    fn test_non_monotonic_ordinals_rejected() {
        let mut trial = trial_from(&["A", "A", "A"]);
        trial.frames[2].ordinal = 1;

        let err = FixationSegmenter::new(3, 30.0).segment(&trial).unwrap_err();
        assert!(matches!(
            err,
            ComputeError::NonMonotonicOrdinal {
                previous: 1,
                ordinal: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_minimum_duration_and_maximality() {
        let trial = trial_from(&[
            "A", "A", "A", "A", "B", "B", "B", "B", "B", "A", "C", "C", "-", "C", "C", "C",
            "A", "A", "A",
        ]);
        let segmenter = FixationSegmenter::new(3, 30.0);
        let fixations = segmenter.segment(&trial).unwrap();

        assert!(fixations.iter().all(|f| f.frame_count >= 3));
        for pair in fixations.windows(2) {
            let touching = pair[1].start_ordinal == pair[0].end_ordinal + 1;
            assert!(!(touching && pair[0].category == pair[1].category));
        }
        let total: u64 = fixations.iter().map(|f| f.frame_count).sum();
        assert!(total <= trial.on_target_frames());
    }

    #[test]
    fn test_segmentation_is_deterministic() {
        let trial = trial_from(&["A", "A", "A", "B", "B", "B", "-", "A", "A", "A"]);
        let segmenter = FixationSegmenter::new(2, 30.0);
        assert_eq!(
            segmenter.segment(&trial).unwrap(),
            segmenter.segment(&trial).unwrap()
        );
    }

    #[test]
    fn test_threshold_of_one_keeps_every_run() {
        let trial = trial_from(&["A", "B", "A"]);
        let fixations = FixationSegmenter::new(1, 30.0).segment(&trial).unwrap();
        assert_eq!(fixations.len(), 3);
    }
}
