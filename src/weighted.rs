//! Precision-weighted metric aggregation
//!
//! Reduces per-trial outcomes into weighted group statistics. Every metric must
//! name its weight source; there is no implicit uniform weighting. Zero-weight,
//! degenerate and undefined observations are excluded from the mean but counted
//! and logged.
//!
//! Accumulators hold only sums (Σw, Σw², Σwx, Σwx²), so partial aggregates from
//! different workers merge associatively.

use crate::error::ComputeError;
use crate::outcomes::{MetricRequest, ModelRecord, ObservationStatus, ResolvedMetric, WeightSource};
use crate::pipeline::TrialAnalysis;
use crate::types::GroupKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Two-sided 95% normal quantile
const Z_95: f64 = 1.959_963_984_540_054;

/// Observations excluded from a weighted mean, by reason
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionCounts {
    pub zero_weight: u64,
    pub degenerate: u64,
    pub undefined: u64,
}

impl ExclusionCounts {
    pub fn total(&self) -> u64 {
        self.zero_weight + self.degenerate + self.undefined
    }
}

/// Weighted summary of one metric in one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedMetric {
    pub metric: String,
    pub group: GroupKey,
    pub weight_source: WeightSource,
    pub weighted_mean: Option<f64>,
    /// Reliability-weighted (unbiased) variance
    pub weighted_variance: Option<f64>,
    /// (Σw)² / Σw²
    pub effective_n: Option<f64>,
    pub standard_error: Option<f64>,
    pub ci95_lower: Option<f64>,
    pub ci95_upper: Option<f64>,
    /// Plain mean of included values, reported for audit only
    pub unweighted_mean: Option<f64>,
    pub total_weight: f64,
    pub trial_count: u64,
    pub included_count: u64,
    pub excluded: ExclusionCounts,
}

/// Difference of weighted means between two groups for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contrast {
    pub metric: String,
    pub group_a: GroupKey,
    pub group_b: GroupKey,
    /// mean(a) - mean(b)
    pub difference: f64,
    pub standard_error: Option<f64>,
    pub z: Option<f64>,
}

/// Output of the weighted aggregator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightedSummary {
    pub metrics: Vec<WeightedMetric>,
    pub contrasts: Vec<Contrast>,
}

impl WeightedSummary {
    pub fn get(&self, metric: &str, group: &GroupKey) -> Option<&WeightedMetric> {
        self.metrics
            .iter()
            .find(|m| m.metric == metric && &m.group == group)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct WeightedAccumulator {
    trials: u64,
    included: u64,
    excluded: ExclusionCounts,
    sum_w: f64,
    sum_w2: f64,
    sum_wx: f64,
    sum_wx2: f64,
    sum_x: f64,
}

impl WeightedAccumulator {
    fn observe(&mut self, record: &ModelRecord) {
        self.trials += 1;
        match (record.status, record.value) {
            (ObservationStatus::Included, Some(x)) => {
                let w = record.weight;
                self.included += 1;
                self.sum_w += w;
                self.sum_w2 += w * w;
                self.sum_wx += w * x;
                self.sum_wx2 += w * x * x;
                self.sum_x += x;
            }
            (ObservationStatus::ZeroWeight, _) => self.excluded.zero_weight += 1,
            (ObservationStatus::Degenerate, _) => self.excluded.degenerate += 1,
            (ObservationStatus::Undefined, _) | (ObservationStatus::Included, None) => {
                self.excluded.undefined += 1
            }
        }
    }

    fn merge(&mut self, other: &WeightedAccumulator) {
        self.trials += other.trials;
        self.included += other.included;
        self.excluded.zero_weight += other.excluded.zero_weight;
        self.excluded.degenerate += other.excluded.degenerate;
        self.excluded.undefined += other.excluded.undefined;
        self.sum_w += other.sum_w;
        self.sum_w2 += other.sum_w2;
        self.sum_wx += other.sum_wx;
        self.sum_wx2 += other.sum_wx2;
        self.sum_x += other.sum_x;
    }

    fn summarize(&self, metric: &str, group: &GroupKey, weight_source: WeightSource) -> WeightedMetric {
        let mean = if self.sum_w > 0.0 {
            Some(self.sum_wx / self.sum_w)
        } else {
            None
        };

        let variance = mean.and_then(|m| {
            let denominator = self.sum_w - self.sum_w2 / self.sum_w;
            if denominator > 0.0 {
                let squares = (self.sum_wx2 - self.sum_w * m * m).max(0.0);
                Some(squares / denominator)
            } else {
                None
            }
        });

        let effective_n = if self.sum_w2 > 0.0 {
            Some(self.sum_w * self.sum_w / self.sum_w2)
        } else {
            None
        };

        let standard_error = match (variance, effective_n) {
            (Some(v), Some(n)) if n > 0.0 => Some((v / n).sqrt()),
            _ => None,
        };

        let (ci95_lower, ci95_upper) = match (mean, standard_error) {
            (Some(m), Some(se)) => (Some(m - Z_95 * se), Some(m + Z_95 * se)),
            _ => (None, None),
        };

        WeightedMetric {
            metric: metric.to_string(),
            group: group.clone(),
            weight_source,
            weighted_mean: mean,
            weighted_variance: variance,
            effective_n,
            standard_error,
            ci95_lower,
            ci95_upper,
            unweighted_mean: if self.included > 0 {
                Some(self.sum_x / self.included as f64)
            } else {
                None
            },
            total_weight: self.sum_w,
            trial_count: self.trials,
            included_count: self.included,
            excluded: self.excluded,
        }
    }
}

/// Mergeable weighted aggregator over all configured metrics
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedMetricAggregator {
    metrics: Vec<ResolvedMetric>,
    accumulators: BTreeMap<(String, GroupKey), WeightedAccumulator>,
}

impl WeightedMetricAggregator {
    /// Set up the aggregator. Fails if any metric lacks a weight source.
    pub fn new(requests: &[MetricRequest]) -> Result<Self, ComputeError> {
        let metrics = requests
            .iter()
            .map(MetricRequest::resolve)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            metrics,
            accumulators: BTreeMap::new(),
        })
    }

    pub fn metrics(&self) -> &[ResolvedMetric] {
        &self.metrics
    }

    /// An empty aggregator over the same metrics
    pub fn empty_clone(&self) -> Self {
        Self {
            metrics: self.metrics.clone(),
            accumulators: BTreeMap::new(),
        }
    }

    /// Evaluate every metric on one trial and accumulate the results
    pub fn observe_trial(&mut self, trial: &TrialAnalysis) -> Vec<ModelRecord> {
        let records: Vec<ModelRecord> = self.metrics.iter().map(|m| m.observe(trial)).collect();
        for record in &records {
            self.observe(record);
        }
        records
    }

    /// Accumulate one record. Records for unknown metrics are ignored.
    pub fn observe(&mut self, record: &ModelRecord) {
        if !self.metrics.iter().any(|m| m.name == record.metric) {
            log::warn!(
                "Ignoring record for unconfigured metric '{}' ({}/{})",
                record.metric,
                record.participant_id,
                record.trial_id
            );
            return;
        }

        if record.status == ObservationStatus::ZeroWeight {
            log::warn!(
                "Excluding {}/{} from '{}': zero {} weight",
                record.participant_id,
                record.trial_id,
                record.metric,
                record.weight_source
            );
        }

        self.accumulators
            .entry((record.metric.clone(), record.group()))
            .or_default()
            .observe(record);
    }

    pub fn merge(&mut self, other: WeightedMetricAggregator) {
        for (key, theirs) in other.accumulators {
            self.accumulators.entry(key).or_default().merge(&theirs);
        }
    }

    /// Weighted statistics per (metric, group) and pairwise group contrasts
    pub fn summarize(&self) -> WeightedSummary {
        let mut metrics = Vec::new();
        for metric in &self.metrics {
            for ((name, group), accumulator) in &self.accumulators {
                if name == &metric.name {
                    metrics.push(accumulator.summarize(name, group, metric.weight));
                }
            }
        }

        let contrasts = self
            .metrics
            .iter()
            .flat_map(|metric| {
                let rows: Vec<&WeightedMetric> =
                    metrics.iter().filter(|m| m.metric == metric.name).collect();
                pairwise_contrasts(&rows)
            })
            .collect();

        WeightedSummary { metrics, contrasts }
    }
}

fn pairwise_contrasts(rows: &[&WeightedMetric]) -> Vec<Contrast> {
    let mut contrasts = Vec::new();
    for (i, a) in rows.iter().enumerate() {
        for b in &rows[i + 1..] {
            let (Some(mean_a), Some(mean_b)) = (a.weighted_mean, b.weighted_mean) else {
                continue;
            };
            let difference = mean_a - mean_b;
            let standard_error = match (a.standard_error, b.standard_error) {
                (Some(se_a), Some(se_b)) => Some((se_a * se_a + se_b * se_b).sqrt()),
                _ => None,
            };
            let z = standard_error
                .filter(|se| *se > 0.0)
                .map(|se| difference / se);

            contrasts.push(Contrast {
                metric: a.metric.clone(),
                group_a: a.group.clone(),
                group_b: b.group.clone(),
                difference,
                standard_error,
                z,
            });
        }
    }
    contrasts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcomes::MetricKind;
    use pretty_assertions::assert_eq;

    fn record(group: &GroupKey, trial: &str, value: Option<f64>, weight: f64) -> ModelRecord {
        let status = match value {
            None => ObservationStatus::Undefined,
            Some(_) if weight <= 0.0 => ObservationStatus::ZeroWeight,
            Some(_) => ObservationStatus::Included,
        };
        ModelRecord {
            participant_id: format!("p-{}", trial),
            trial_id: trial.to_string(),
            cohort: group.cohort.clone(),
            condition: group.condition.clone(),
            metric: "fixation_count".to_string(),
            value,
            weight,
            weight_source: WeightSource::FixationFrames,
            status,
        }
    }

    fn aggregator() -> WeightedMetricAggregator {
        WeightedMetricAggregator::new(&[MetricRequest::new(
            MetricKind::FixationCount,
            WeightSource::FixationFrames,
        )])
        .unwrap()
    }

    #[test]
    fn test_equal_outcomes_give_common_value() {
        let group = GroupKey::new("12m", "social");
        let mut agg = aggregator();
        agg.observe(&record(&group, "t1", Some(0.5), 2.0));
        agg.observe(&record(&group, "t2", Some(0.5), 10.0));

        let summary = agg.summarize();
        let metric = summary.get("fixation_count", &group).unwrap();
        assert_eq!(metric.weighted_mean, Some(0.5));
        assert_eq!(metric.unweighted_mean, Some(0.5));
        assert!(metric.weighted_variance.unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_weighting_differs_from_naive_mean() {
        let group = GroupKey::new("12m", "social");
        let mut agg = aggregator();
        agg.observe(&record(&group, "t1", Some(0.1), 2.0));
        agg.observe(&record(&group, "t2", Some(0.5), 10.0));

        let summary = agg.summarize();
        let metric = summary.get("fixation_count", &group).unwrap();
        let weighted = metric.weighted_mean.unwrap();
        let naive = metric.unweighted_mean.unwrap();

        assert!((weighted - 5.2 / 12.0).abs() < 1e-12);
        assert!((naive - 0.3).abs() < 1e-12);
        assert!((weighted - naive).abs() > 0.1);
        assert_eq!(metric.total_weight, 12.0);
        assert_eq!(metric.included_count, 2);
    }

    #[test]
    fn test_zero_weight_excluded_but_counted() {
        let group = GroupKey::new("12m", "social");
        let mut agg = aggregator();
        agg.observe(&record(&group, "t1", Some(0.8), 4.0));
        agg.observe(&record(&group, "t2", Some(0.0), 0.0));
        agg.observe(&record(&group, "t3", None, 3.0));

        let summary = agg.summarize();
        let metric = summary.get("fixation_count", &group).unwrap();
        assert_eq!(metric.weighted_mean, Some(0.8));
        assert_eq!(metric.trial_count, 3);
        assert_eq!(metric.included_count, 1);
        assert_eq!(metric.excluded.zero_weight, 1);
        assert_eq!(metric.excluded.undefined, 1);
        assert_eq!(metric.excluded.total(), 2);
        // A single observation has no variance estimate
        assert_eq!(metric.weighted_variance, None);
    }

    #[test]
    fn test_missing_weight_fails_setup() {
        let request = MetricRequest {
            kind: MetricKind::MeanFixationDuration,
            weight: None,
            name: Some("duration".to_string()),
        };
        let err = WeightedMetricAggregator::new(&[request]).unwrap_err();
        assert!(matches!(err, ComputeError::MissingWeightField(ref m) if m == "duration"));
    }

    #[test]
    fn test_variance_and_confidence_bounds() {
        let group = GroupKey::new("12m", "social");
        let mut agg = aggregator();
        for (i, (x, w)) in [(1.0, 1.0), (2.0, 1.0), (3.0, 1.0), (4.0, 1.0)]
            .into_iter()
            .enumerate()
        {
            agg.observe(&record(&group, &i.to_string(), Some(x), w));
        }

        let summary = agg.summarize();
        let metric = summary.get("fixation_count", &group).unwrap();
        // Unit weights reduce to the sample variance
        assert!((metric.weighted_variance.unwrap() - 5.0 / 3.0).abs() < 1e-12);
        assert!((metric.effective_n.unwrap() - 4.0).abs() < 1e-12);
        let se = (5.0f64 / 3.0 / 4.0).sqrt();
        assert!((metric.standard_error.unwrap() - se).abs() < 1e-12);
        assert!(metric.ci95_lower.unwrap() < 2.5 && metric.ci95_upper.unwrap() > 2.5);
    }

    #[test]
    fn test_merge_matches_single_pass() {
        let young = GroupKey::new("6m", "social");
        let old = GroupKey::new("12m", "social");
        let records = vec![
            record(&young, "a", Some(0.2), 3.0),
            record(&young, "b", Some(0.6), 5.0),
            record(&old, "c", Some(0.9), 2.0),
            record(&old, "d", Some(0.4), 7.0),
        ];

        let mut single = aggregator();
        records.iter().for_each(|r| single.observe(r));

        let mut left = aggregator();
        let mut right = left.empty_clone();
        records[..2].iter().for_each(|r| left.observe(r));
        records[2..].iter().for_each(|r| right.observe(r));
        right.merge(left);

        assert_eq!(single.summarize(), right.summarize());
    }

    #[test]
    fn test_pairwise_contrast() {
        let young = GroupKey::new("6m", "social");
        let old = GroupKey::new("12m", "social");
        let mut agg = aggregator();
        agg.observe(&record(&young, "a", Some(0.2), 1.0));
        agg.observe(&record(&young, "b", Some(0.4), 1.0));
        agg.observe(&record(&old, "c", Some(0.7), 1.0));
        agg.observe(&record(&old, "d", Some(0.9), 1.0));

        let summary = agg.summarize();
        assert_eq!(summary.contrasts.len(), 1);
        let contrast = &summary.contrasts[0];
        // BTreeMap order: "12m" < "6m"
        assert_eq!(contrast.group_a, old);
        assert_eq!(contrast.group_b, young);
        assert!((contrast.difference - 0.5).abs() < 1e-12);
        assert!(contrast.z.unwrap() > 0.0);
    }
}
