//! The rejection policy that sits between the classifier and the trigger.
//!
//! ```text
//! persisted < min_training_records ──────────────► Execute(SmallSample)
//! predicted Good ────────────────────────────────► Execute(PredictedGood)
//! predicted Bad, rejected < max_rejections ──────► Reject (rejected += 1)
//! predicted Bad, rejected >= max_rejections ─────► ForceFallback
//! ```
//!
//! The fallback does not reset the rejection counter, so once it has been
//! reached every further bad prediction in the same level goes straight to
//! the fallback.

use anyhow::{Context, Result};
use tracing::{debug, info};

use super::naive_bayes::NaiveBayesModel;
use crate::config::GateConfig;
use crate::dataset::{DatasetStore, Label, ShotRecord};

/// Why a shot was cleared to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteReason {
    /// Too little history to trust a prediction.
    SmallSample,
    PredictedGood,
}

/// What to do with a candidate shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Execute(ExecuteReason),
    /// Discard the candidate. Carries the incremented rejection count.
    Reject { rejected_count: u32 },
    /// Stop rejecting and fire a randomized fallback shot.
    ForceFallback,
}

/// Apply the rejection policy to a prediction (`None` = not consulted).
pub fn decide(prediction: Option<Label>, rejected_count: u32, max_rejections: u32) -> GateDecision {
    match prediction {
        None => GateDecision::Execute(ExecuteReason::SmallSample),
        Some(Label::Good) | Some(Label::Unlabeled) => {
            GateDecision::Execute(ExecuteReason::PredictedGood)
        }
        Some(Label::Bad) if rejected_count < max_rejections => GateDecision::Reject {
            rejected_count: rejected_count + 1,
        },
        Some(Label::Bad) => GateDecision::ForceFallback,
    }
}

/// Classifier verdict for one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateOutcome {
    pub decision: GateDecision,
    /// `None` when the classifier was not consulted.
    pub prediction: Option<Label>,
    pub probability_good: Option<f64>,
    /// Persisted records for the level at decision time.
    pub persisted: usize,
}

/// Retrains on the level's history and gates a candidate.
#[derive(Debug, Clone)]
pub struct QualityGate {
    config: GateConfig,
}

impl QualityGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Decide whether `candidate` should be fired on `level`.
    ///
    /// The store is read-only here; the candidate only ever reaches a
    /// scratch copy.
    pub fn evaluate(
        &self,
        store: &DatasetStore,
        level: u32,
        candidate: &ShotRecord,
        rejected_count: u32,
    ) -> Result<GateOutcome> {
        store
            .ensure_initialized(level)
            .with_context(|| format!("Failed to initialize dataset for level {level}"))?;
        let persisted = store.snapshot(level)?.len();

        if persisted < self.config.min_training_records {
            debug!(
                level,
                persisted,
                min = self.config.min_training_records,
                "sample too small, skipping classifier"
            );
            return Ok(GateOutcome {
                decision: decide(None, rejected_count, self.config.max_rejections),
                prediction: None,
                probability_good: None,
                persisted,
            });
        }

        let scratch = store
            .scratch_with_candidate(level, candidate)
            .context("Failed to build classifier scratch set")?;
        let model = NaiveBayesModel::train(&scratch.labeled());
        let prediction = model.predict(candidate);
        let probability_good = model.probability_good(candidate);

        let decision = decide(Some(prediction), rejected_count, self.config.max_rejections);
        info!(
            level,
            persisted,
            trained_on = model.training_size(),
            prediction = %prediction,
            p_good = format!("{probability_good:.3}"),
            rejected_count,
            ?decision,
            "shot quality predicted"
        );

        Ok(GateOutcome {
            decision,
            prediction: Some(prediction),
            probability_good: Some(probability_good),
            persisted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Point, ProjectileType};

    fn bad(dx: i32) -> ShotRecord {
        ShotRecord {
            release_dx: dx,
            release_dy: 30,
            projectile: ProjectileType::RedBird,
            shot_group: 0,
            label: Label::Bad,
        }
    }

    fn store() -> (tempfile::TempDir, DatasetStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            DatasetStore::with_dirs(tmp.path().join("learnings"), tmp.path().join("tmp")).unwrap();
        (tmp, store)
    }

    fn gate() -> QualityGate {
        QualityGate::new(crate::config::AgentConfig::default().gate)
    }

    #[test]
    fn test_decide_table() {
        assert_eq!(
            decide(None, 3, 3),
            GateDecision::Execute(ExecuteReason::SmallSample)
        );
        assert_eq!(
            decide(Some(Label::Good), 3, 3),
            GateDecision::Execute(ExecuteReason::PredictedGood)
        );
        assert_eq!(
            decide(Some(Label::Bad), 0, 3),
            GateDecision::Reject { rejected_count: 1 }
        );
        assert_eq!(
            decide(Some(Label::Bad), 2, 3),
            GateDecision::Reject { rejected_count: 3 }
        );
        assert_eq!(decide(Some(Label::Bad), 3, 3), GateDecision::ForceFallback);
        assert_eq!(decide(Some(Label::Bad), 7, 3), GateDecision::ForceFallback);
    }

    #[test]
    fn test_rejections_never_exceed_bound_before_fallback() {
        let mut rejected = 0;
        let mut rejections = 0;
        loop {
            match decide(Some(Label::Bad), rejected, 3) {
                GateDecision::Reject { rejected_count } => {
                    rejected = rejected_count;
                    rejections += 1;
                    assert!(rejected <= 3);
                }
                GateDecision::ForceFallback => break,
                other => panic!("unexpected decision {other:?}"),
            }
        }
        assert_eq!(rejections, 3);
        assert_eq!(rejected, 3);
    }

    #[test]
    fn test_small_sample_skips_classifier() {
        let (_tmp, store) = store();
        for dx in 0..4 {
            store.append(1, &bad(70 + dx)).unwrap();
        }
        let candidate = ShotRecord::candidate(Point::new(-70, 30), ProjectileType::RedBird, 4);
        let outcome = gate().evaluate(&store, 1, &candidate, 0).unwrap();

        assert_eq!(outcome.persisted, 4);
        assert_eq!(outcome.prediction, None);
        assert_eq!(
            outcome.decision,
            GateDecision::Execute(ExecuteReason::SmallSample)
        );
    }

    #[test]
    fn test_bad_history_rejects_without_persisting() {
        let (_tmp, store) = store();
        for dx in 0..6 {
            store.append(1, &bad(70 + dx)).unwrap();
        }
        let before = store.snapshot(1).unwrap();
        let candidate = ShotRecord::candidate(Point::new(-72, 30), ProjectileType::RedBird, 6);

        let outcome = gate().evaluate(&store, 1, &candidate, 1).unwrap();

        assert_eq!(outcome.prediction, Some(Label::Bad));
        assert_eq!(outcome.decision, GateDecision::Reject { rejected_count: 2 });
        assert_eq!(store.snapshot(1).unwrap(), before);
    }

    #[test]
    fn test_five_records_consults_classifier() {
        let (_tmp, store) = store();
        for dx in 0..5 {
            store.append(1, &bad(70 + dx)).unwrap();
        }
        let candidate = ShotRecord::candidate(Point::new(-71, 30), ProjectileType::RedBird, 5);
        let outcome = gate().evaluate(&store, 1, &candidate, 0).unwrap();

        assert_eq!(outcome.persisted, 5);
        assert_eq!(outcome.prediction, Some(Label::Bad));
        assert!(outcome.probability_good.is_some());
        assert_eq!(outcome.decision, GateDecision::Reject { rejected_count: 1 });
    }

    #[test]
    fn test_boundaries_do_not_count_toward_sample() {
        let (_tmp, store) = store();
        for dx in 0..4 {
            store.append(1, &bad(70 + dx)).unwrap();
        }
        store.mark_level_boundary(1).unwrap();
        assert_eq!(store.snapshot(1).unwrap().entries().len(), 5);

        let candidate = ShotRecord::candidate(Point::new(-71, 30), ProjectileType::RedBird, 0);
        let outcome = gate().evaluate(&store, 1, &candidate, 0).unwrap();

        assert_eq!(outcome.persisted, 4);
        assert_eq!(outcome.prediction, None);
        assert_eq!(
            outcome.decision,
            GateDecision::Execute(ExecuteReason::SmallSample)
        );
    }
}
