//! Naive Bayes shot-quality model.
//!
//! The model is rebuilt from scratch for every decision:
//!
//!   P(label | x) ∝ P(label) · Π_i P(x_i | label)
//!
//! - `P(label)` is Laplace-smoothed over the two resolved labels.
//! - The numeric features (dx, dy, shot group) use a per-label normal
//!   density. Each feature's standard deviation is floored at a sixth of its
//!   precision (the mean gap between distinct observed values), so a label
//!   seen with a single value still yields a usable density.
//! - The projectile type uses Laplace-smoothed per-label frequencies.
//!
//! Unlabeled rows in the training set are ignored.

use ordered_float::OrderedFloat;

use crate::dataset::{Label, ShotRecord};
use crate::env::ProjectileType;

const NUMERIC_FEATURES: usize = 3;
const DEFAULT_PRECISION: f64 = 0.01;
const RESOLVED: [Label; 2] = [Label::Good, Label::Bad];

#[derive(Debug, Clone, Copy, PartialEq)]
struct Normal {
    mean: f64,
    std_dev: f64,
}

impl Normal {
    fn fit(values: &[f64], precision: f64) -> Self {
        let floor = precision / 6.0;
        if values.is_empty() {
            return Self {
                mean: 0.0,
                std_dev: floor,
            };
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std_dev: variance.sqrt().max(floor),
        }
    }

    fn log_density(&self, x: f64) -> f64 {
        let z = (x - self.mean) / self.std_dev;
        -0.5 * z * z - self.std_dev.ln() - 0.5 * (2.0 * std::f64::consts::PI).ln()
    }
}

#[derive(Debug, Clone)]
struct ClassModel {
    label: Label,
    count: usize,
    numeric: [Normal; NUMERIC_FEATURES],
    projectile_counts: [usize; ProjectileType::ALL.len()],
}

/// A trained model. Cheap to build, never cached between decisions.
#[derive(Debug, Clone)]
pub struct NaiveBayesModel {
    classes: Vec<ClassModel>,
    total: usize,
}

fn projectile_index(p: ProjectileType) -> usize {
    ProjectileType::ALL
        .iter()
        .position(|&q| q == p)
        .unwrap_or(ProjectileType::ALL.len() - 1)
}

/// Mean gap between sorted distinct values.
fn precision_of(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    values.dedup();
    if values.len() < 2 {
        return DEFAULT_PRECISION;
    }
    let span = values[values.len() - 1] - values[0];
    span / (values.len() - 1) as f64
}

impl NaiveBayesModel {
    /// Fit a model to every resolved record in `records`.
    pub fn train(records: &[ShotRecord]) -> Self {
        let labeled: Vec<&ShotRecord> = records.iter().filter(|r| r.label.is_resolved()).collect();

        let precisions: Vec<f64> = (0..NUMERIC_FEATURES)
            .map(|i| precision_of(labeled.iter().map(|r| r.numeric_features()[i]).collect()))
            .collect();

        let classes = RESOLVED
            .iter()
            .map(|&label| {
                let rows: Vec<&&ShotRecord> = labeled.iter().filter(|r| r.label == label).collect();

                let numeric = std::array::from_fn(|i| {
                    let values: Vec<f64> = rows.iter().map(|r| r.numeric_features()[i]).collect();
                    Normal::fit(&values, precisions[i])
                });

                let mut projectile_counts = [0usize; ProjectileType::ALL.len()];
                for r in &rows {
                    projectile_counts[projectile_index(r.projectile)] += 1;
                }

                ClassModel {
                    label,
                    count: rows.len(),
                    numeric,
                    projectile_counts,
                }
            })
            .collect();

        Self {
            classes,
            total: labeled.len(),
        }
    }

    /// Number of resolved records the model was trained on.
    pub fn training_size(&self) -> usize {
        self.total
    }

    /// Unnormalized log posterior for each label that has training data.
    fn log_scores(&self, record: &ShotRecord) -> Vec<(Label, f64)> {
        let features = record.numeric_features();
        let n_labels = RESOLVED.len() as f64;
        let n_types = ProjectileType::ALL.len() as f64;

        self.classes
            .iter()
            .filter(|c| c.count > 0)
            .map(|c| {
                let prior = ((c.count as f64 + 1.0) / (self.total as f64 + n_labels)).ln();
                let numeric: f64 = c
                    .numeric
                    .iter()
                    .zip(features.iter())
                    .map(|(dist, &x)| dist.log_density(x))
                    .sum();
                let seen = c.projectile_counts[projectile_index(record.projectile)] as f64;
                let categorical = ((seen + 1.0) / (c.count as f64 + n_types)).ln();
                (c.label, prior + numeric + categorical)
            })
            .collect()
    }

    /// Most probable label for `record`. An untrained model predicts `Good`.
    pub fn predict(&self, record: &ShotRecord) -> Label {
        self.log_scores(record)
            .into_iter()
            .max_by_key(|(_, score)| OrderedFloat(*score))
            .map(|(label, _)| label)
            .unwrap_or(Label::Good)
    }

    /// Posterior probability that `record` is a good shot.
    pub fn probability_good(&self, record: &ShotRecord) -> f64 {
        let scores = self.log_scores(record);
        let Some(max) = scores.iter().map(|(_, s)| OrderedFloat(*s)).max() else {
            return 1.0;
        };
        let max = max.into_inner();
        let total: f64 = scores.iter().map(|(_, s)| (s - max).exp()).sum();
        scores
            .iter()
            .find(|(label, _)| *label == Label::Good)
            .map(|(_, s)| (s - max).exp() / total)
            .unwrap_or(0.0)
    }
}
