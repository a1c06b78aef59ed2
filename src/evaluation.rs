//! Post-shot outcome evaluation.
//!
//! A shot is labeled by comparing the scene before and after it:
//!
//!   destruction    = |100 - post_obstacles / pre_obstacles * 100|
//!   targets_needed = max(1, floor(pre_targets / pre_projectiles))  if pre_targets > pre_projectiles
//!                  = 1                                              otherwise
//!   targets_killed = |pre_targets - post_targets|
//!
//! The shot is good if destruction reaches the threshold, enough targets
//! fell, or the shot won the level.

use serde::{Deserialize, Serialize};

use crate::dataset::Label;
use crate::env::SceneSnapshot;

/// Object counts taken from one scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneCounts {
    pub obstacles: usize,
    pub targets: usize,
    pub projectiles: usize,
}

impl SceneCounts {
    pub fn from_scene(scene: &SceneSnapshot) -> Self {
        Self {
            obstacles: scene.obstacles.len(),
            targets: scene.targets.len(),
            projectiles: scene.projectiles.len(),
        }
    }
}

/// Everything the labeler needs about one shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShotObservation {
    pub before: SceneCounts,
    pub after: SceneCounts,
    pub won: bool,
}

/// The label and the numbers behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutcomeReport {
    pub label: Label,
    pub destruction_percentage: f64,
    pub targets_needed: usize,
    pub targets_killed: usize,
    pub won: bool,
}

/// Percentage of obstacles destroyed. An empty starting scene counts as 0.
pub fn destruction_percentage(pre_obstacles: usize, post_obstacles: usize) -> f64 {
    if pre_obstacles == 0 {
        return 0.0;
    }
    (100.0 - post_obstacles as f64 / pre_obstacles as f64 * 100.0).abs()
}

/// Targets a single shot must kill to count as good on its own.
pub fn targets_needed(pre_targets: usize, pre_projectiles: usize) -> usize {
    if pre_projectiles == 0 || pre_targets <= pre_projectiles {
        return 1;
    }
    (pre_targets / pre_projectiles).max(1)
}

/// Label a shot.
pub fn evaluate(observation: &ShotObservation, destruction_threshold: f64) -> OutcomeReport {
    let before = observation.before;
    let after = observation.after;

    let destruction = destruction_percentage(before.obstacles, after.obstacles);
    let needed = targets_needed(before.targets, before.projectiles);
    let killed = before.targets.abs_diff(after.targets);

    let good = destruction >= destruction_threshold || killed >= needed || observation.won;

    OutcomeReport {
        label: if good { Label::Good } else { Label::Bad },
        destruction_percentage: destruction,
        targets_needed: needed,
        targets_killed: killed,
        won: observation.won,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(obstacles: usize, targets: usize, projectiles: usize) -> SceneCounts {
        SceneCounts {
            obstacles,
            targets,
            projectiles,
        }
    }

    fn observe(before: SceneCounts, after: SceneCounts, won: bool) -> OutcomeReport {
        evaluate(&ShotObservation { before, after, won }, 15.0)
    }

    #[test]
    fn test_twenty_percent_destruction_is_good() {
        // 20 -> 16 obstacles, one of two targets killed.
        let report = observe(counts(20, 2, 3), counts(16, 1, 2), false);
        assert!((report.destruction_percentage - 20.0).abs() < 1e-9);
        assert_eq!(report.label, Label::Good);
    }

    #[test]
    fn test_destruction_alone_is_enough() {
        // Needs 2 kills (4 targets / 2 projectiles) and gets none, but 20% fell.
        let report = observe(counts(20, 4, 2), counts(16, 4, 1), false);
        assert_eq!(report.targets_needed, 2);
        assert_eq!(report.targets_killed, 0);
        assert_eq!(report.label, Label::Good);
    }

    #[test]
    fn test_low_destruction_no_kills_is_bad() {
        let report = observe(counts(20, 2, 3), counts(19, 2, 2), false);
        assert!((report.destruction_percentage - 5.0).abs() < 1e-9);
        assert_eq!(report.label, Label::Bad);
    }

    #[test]
    fn test_kills_meet_requirement() {
        let report = observe(counts(40, 6, 2), counts(39, 3, 1), false);
        assert_eq!(report.targets_needed, 3);
        assert_eq!(report.targets_killed, 3);
        assert_eq!(report.label, Label::Good);

        let short = observe(counts(40, 6, 2), counts(39, 4, 1), false);
        assert_eq!(short.label, Label::Bad);
    }

    #[test]
    fn test_win_is_always_good() {
        let report = observe(counts(20, 1, 1), counts(20, 1, 0), true);
        assert_eq!(report.label, Label::Good);
    }

    #[test]
    fn test_targets_needed_edges() {
        assert_eq!(targets_needed(1, 3), 1);
        assert_eq!(targets_needed(3, 3), 1);
        assert_eq!(targets_needed(5, 2), 2);
        assert_eq!(targets_needed(7, 0), 1);
        assert_eq!(targets_needed(0, 0), 1);
    }

    #[test]
    fn test_destruction_with_empty_scene() {
        assert_eq!(destruction_percentage(0, 0), 0.0);
        assert!((destruction_percentage(10, 0) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_labeling_is_deterministic() {
        let obs = ShotObservation {
            before: counts(33, 3, 3),
            after: counts(30, 3, 2),
            won: false,
        };
        let first = evaluate(&obs, 15.0);
        for _ in 0..10 {
            assert_eq!(evaluate(&obs, 15.0), first);
        }
    }
}
