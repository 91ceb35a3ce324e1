//! Classification metrics computed per step and averaged per epoch.

use std::collections::BTreeMap;

/// Scalars reported for one minibatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepMetrics {
    /// Mean binary cross-entropy of the batch.
    pub total_loss: f32,
    /// Fraction of negatives scored above 0.5.
    pub false_positive_rate: f32,
    /// Fraction of positives scored below 0.5.
    pub false_negative_rate: f32,
}

impl StepMetrics {
    /// Compute error rates at the 0.5 decision threshold.
    ///
    /// Soft labels are binarized at 0.5 for the rate computation. A class
    /// absent from the batch reports a rate of 0.
    pub fn compute(probabilities: &[f32], labels: &[f32], loss: f32) -> Self {
        let mut positives = 0usize;
        let mut negatives = 0usize;
        let mut false_negatives = 0usize;
        let mut false_positives = 0usize;

        for (&p, &label) in probabilities.iter().zip(labels.iter()) {
            if label >= 0.5 {
                positives += 1;
                if p < 0.5 {
                    false_negatives += 1;
                }
            } else {
                negatives += 1;
                if p >= 0.5 {
                    false_positives += 1;
                }
            }
        }

        let rate = |errors: usize, total: usize| {
            if total == 0 {
                0.0
            } else {
                errors as f32 / total as f32
            }
        };

        Self {
            total_loss: loss,
            false_positive_rate: rate(false_positives, negatives),
            false_negative_rate: rate(false_negatives, positives),
        }
    }
}

/// Gradient-magnitude scalars reported for one optimizer step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientMetrics {
    /// Mean L2 norm over per-parameter gradients.
    pub mean_norm: f32,
    /// Largest per-parameter gradient L2 norm.
    pub max_norm: f32,
}

impl GradientMetrics {
    /// Summarize one norm per parameter. No gradients reports zeros.
    pub fn compute(norms: &[f32]) -> Self {
        if norms.is_empty() {
            return Self {
                mean_norm: 0.0,
                max_norm: 0.0,
            };
        }
        let sum: f32 = norms.iter().sum();
        let max = norms.iter().fold(0.0f32, |acc, &n| acc.max(n));
        Self {
            mean_norm: sum / norms.len() as f32,
            max_norm: max,
        }
    }
}

impl MetricReport for GradientMetrics {
    fn metrics(&self) -> Vec<(String, f32)> {
        vec![
            ("gradient_norm_mean".to_string(), self.mean_norm),
            ("gradient_norm_max".to_string(), self.max_norm),
        ]
    }
}

/// Named scalar summaries a metrics bundle can report.
pub trait MetricReport {
    /// The scalars to log, as (name, value) pairs.
    fn metrics(&self) -> Vec<(String, f32)>;
}

impl MetricReport for StepMetrics {
    fn metrics(&self) -> Vec<(String, f32)> {
        vec![
            ("total_loss".to_string(), self.total_loss),
            ("false_positive_rate".to_string(), self.false_positive_rate),
            ("false_negative_rate".to_string(), self.false_negative_rate),
        ]
    }
}

/// Running averages over an epoch of step metrics.
#[derive(Debug, Default)]
pub struct MetricsTracker {
    sums: BTreeMap<String, f64>,
    count: usize,
}

impl MetricsTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate one step's metrics.
    pub fn add(&mut self, report: &dyn MetricReport) {
        for (name, value) in report.metrics() {
            *self.sums.entry(name).or_insert(0.0) += value as f64;
        }
        self.count += 1;
    }

    /// Number of accumulated steps.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean of every accumulated scalar.
    pub fn averages(&self) -> Vec<(String, f32)> {
        if self.count == 0 {
            return Vec::new();
        }
        self.sums
            .iter()
            .map(|(name, sum)| (name.clone(), (sum / self.count as f64) as f32))
            .collect()
    }
}
