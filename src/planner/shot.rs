//! The shot planner: one decision cycle from screenshot to labeled record.
//!
//! A cycle:
//! 1. Locate the sling (zooming out while it is missing and the level is
//!    still being played) and the targets.
//! 2. Pick an aim point and a release point.
//! 3. Time the tap for the projectile on the sling.
//! 4. Ask the quality gate whether the candidate may fire; rejected
//!    candidates end the cycle, an exhausted rejection budget swaps in a
//!    randomized fallback release.
//! 5. Re-check the sling for drift, fire, calibrate, label the outcome and
//!    append the labeled record to the level's dataset.
//!
//! The session state goes in by value and comes back updated in the
//! [`CycleReport`]; on error the caller still holds its original copy.

use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::selector::{ReleaseChoice, TargetSelector};
use super::session::SessionState;
use super::timing;
use crate::classifier::{GateDecision, QualityGate};
use crate::config::{AgentConfig, EvaluationConfig};
use crate::dataset::{DatasetStore, Label, ShotRecord};
use crate::env::{GameEnv, GameState, Point, ProjectileType, Region, ShotCommand};
use crate::evaluation::{self, OutcomeReport, SceneCounts, ShotObservation};

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Details of a shot that was actually fired.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiredShot {
    pub command: ShotCommand,
    /// The labeled record appended to the dataset.
    pub record: ShotRecord,
    pub outcome: OutcomeReport,
    pub tap_percent: u32,
    /// Classifier verdict, `None` when the sample was too small to ask.
    pub prediction: Option<Label>,
    /// Whether the randomized fallback replaced the planned release.
    pub fallback: bool,
}

/// How a decision cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ShotResult {
    /// The sling could not be found and the level is no longer playing.
    NoSling,
    NoTargets,
    UnknownProjectile,
    /// Neither a launch point nor the fixed-angle fallback resolved.
    NoReleasePoint,
    /// The classifier predicted a bad shot; nothing was fired.
    Rejected { rejected_count: u32 },
    /// The sling moved or was rescaled between planning and firing.
    SceneDrift,
    /// The release point was not behind the sling.
    InvalidRelease,
    Fired(FiredShot),
}

impl ShotResult {
    pub fn fired(&self) -> Option<&FiredShot> {
        match self {
            ShotResult::Fired(shot) => Some(shot),
            _ => None,
        }
    }
}

/// Everything a cycle hands back to the dispatch loop.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub session: SessionState,
    /// Game state observed at the end of the cycle.
    pub game_state: GameState,
    pub result: ShotResult,
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Plans, gates, fires and labels shots.
pub struct ShotPlanner<R> {
    selector: TargetSelector,
    gate: QualityGate,
    evaluation: EvaluationConfig,
    pre_shot_delay: Duration,
    max_sling_scale_delta: f64,
    rng: R,
}

impl<R: Rng> ShotPlanner<R> {
    pub fn new(config: &AgentConfig, rng: R) -> Self {
        Self {
            selector: TargetSelector::new(config.selection.clone()),
            gate: QualityGate::new(config.gate.clone()),
            evaluation: config.evaluation.clone(),
            pre_shot_delay: Duration::from_millis(config.runner.pre_shot_delay_ms),
            max_sling_scale_delta: config.runner.max_sling_scale_delta,
            rng,
        }
    }

    /// Run one decision cycle against `env`.
    pub async fn run_cycle<E: GameEnv>(
        &mut self,
        env: &mut E,
        store: &DatasetStore,
        mut session: SessionState,
    ) -> Result<CycleReport> {
        let level = session.current_level;

        // 1. Find the sling, zooming out while it is missing.
        let mut scene = env.capture_scene().await.context("scene capture failed")?;
        let mut state = env.current_game_state().await?;
        while scene.sling.is_none() && state == GameState::Playing {
            warn!(level, "no slingshot detected, zooming out");
            env.zoom_out_fully().await?;
            scene = env.capture_scene().await.context("scene capture failed")?;
            state = env.current_game_state().await?;
        }

        let Some(sling) = scene.sling else {
            return Ok(finish(session, state, ShotResult::NoSling));
        };

        // 2. Aim.
        let Some(aim) = self
            .selector
            .choose_aim(&scene.targets, session.previous_aim, &mut self.rng)
        else {
            debug!(level, "no targets visible");
            return Ok(finish(session, state, ShotResult::NoTargets));
        };

        tokio::time::sleep(self.pre_shot_delay).await;
        let projectile = env.projectile_type_on_sling().await?;
        if projectile == ProjectileType::Unknown {
            warn!(level, "projectile on sling not recognized");
            return Ok(finish(session, state, ShotResult::UnknownProjectile));
        }

        let Some(release) =
            self.selector
                .resolve_release(&*env, &sling, aim.aim, projectile, &mut self.rng)
        else {
            warn!(level, aim = %aim.aim, "no release point found");
            return Ok(finish(session, state, ShotResult::NoReleasePoint));
        };

        // 3. Time the tap and build the candidate.
        let mut plan = self.plan_shot(&*env, &sling, release, aim.aim, projectile);
        let candidate = ShotRecord::candidate(plan.offset(), projectile, session.shots_fired);

        // 4. Gate.
        let verdict = self
            .gate
            .evaluate(store, level, &candidate, session.rejected_count)
            .with_context(|| format!("quality gate failed for level {level}"))?;

        let mut fallback = false;
        match verdict.decision {
            GateDecision::Execute(reason) => {
                debug!(level, ?reason, "candidate cleared");
            }
            GateDecision::Reject { rejected_count } => {
                info!(level, rejected_count, "candidate rejected");
                session.rejected_count = rejected_count;
                session.previous_aim = Some(aim.aim);
                return Ok(finish(
                    session,
                    state,
                    ShotResult::Rejected { rejected_count },
                ));
            }
            GateDecision::ForceFallback => {
                let max_angle = self.gate.config().random_angle_max_degrees;
                let Some((choice, fallback_aim)) = self.selector.forced_fallback(
                    &*env,
                    &sling,
                    &scene.targets,
                    aim.aim,
                    max_angle,
                    &mut self.rng,
                ) else {
                    warn!(level, "fallback could not resolve a release point");
                    return Ok(finish(session, state, ShotResult::NoReleasePoint));
                };
                info!(
                    level,
                    rejected_count = session.rejected_count,
                    source = ?choice.source,
                    "rejection budget spent, firing fallback"
                );
                plan = self.plan_shot(&*env, &sling, choice, fallback_aim, projectile);
                fallback = true;
            }
        }
        // The fallback target is random, so repeat detection tracks the planned aim.
        session.previous_aim = Some(aim.aim);

        // 5. Re-check the sling before firing.
        env.zoom_out_fully().await?;
        let recheck = env.capture_scene().await.context("scene capture failed")?;
        let drifted = match recheck.sling {
            Some(now) => now.scale_delta(&sling) >= self.max_sling_scale_delta,
            None => true,
        };
        if drifted {
            warn!(level, "sling moved or rescaled before firing, aborting shot");
            return Ok(finish(session, state, ShotResult::SceneDrift));
        }

        let command = plan.command();
        if command.dx >= 0 {
            warn!(level, dx = command.dx, "release point is not behind the sling");
            return Ok(finish(session, state, ShotResult::InvalidRelease));
        }

        let before = SceneCounts::from_scene(&scene);
        env.execute_shot(command)
            .await
            .with_context(|| format!("failed to execute shot on level {level}"))?;

        let state = env.current_game_state().await?;
        let after_scene = env.capture_scene().await.context("scene capture failed")?;
        if state == GameState::Playing {
            env.calibrate(&after_scene.trajectory_points, &sling, plan.release.point);
        }

        // 6. Label and persist.
        let observation = ShotObservation {
            before,
            after: SceneCounts::from_scene(&after_scene),
            won: state == GameState::Won,
        };
        let outcome =
            evaluation::evaluate(&observation, self.evaluation.destruction_threshold);

        let record = ShotRecord::candidate(plan.offset(), projectile, session.shots_fired)
            .with_label(outcome.label);
        store
            .append(level, &record)
            .with_context(|| format!("failed to record shot for level {level}"))?;
        session.shots_fired += 1;

        info!(
            level,
            projectile = %projectile,
            dx = command.dx,
            dy = command.dy,
            tap_ms = command.tap_delay_ms,
            label = %outcome.label,
            destruction = format!("{:.1}", outcome.destruction_percentage),
            killed = outcome.targets_killed,
            fallback,
            "shot fired"
        );

        let fired = FiredShot {
            command,
            record,
            outcome,
            tap_percent: plan.tap_percent,
            prediction: verdict.prediction,
            fallback,
        };
        Ok(finish(session, state, ShotResult::Fired(fired)))
    }

    fn plan_shot<E: GameEnv + ?Sized>(
        &mut self,
        env: &E,
        sling: &Region,
        release: ReleaseChoice,
        aim: Point,
        projectile: ProjectileType,
    ) -> PlannedShot {
        let reference = env.reference_point(sling);
        let angle = env.release_angle(sling, release.point).to_degrees();
        let tap_percent =
            timing::tap_percentage(projectile.tap_behaviour(), angle, &mut self.rng);
        let tap_delay_ms = env.tap_time(sling, release.point, aim, tap_percent);
        debug!(
            release = %release.point,
            source = ?release.source,
            angle = format!("{angle:.1}"),
            tap_percent,
            tap_delay_ms,
            "shot planned"
        );
        PlannedShot {
            reference,
            release,
            tap_percent,
            tap_delay_ms,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct PlannedShot {
    reference: Point,
    release: ReleaseChoice,
    tap_percent: u32,
    tap_delay_ms: u64,
}

impl PlannedShot {
    /// Signed offset of the release point from the reference point.
    fn offset(&self) -> Point {
        Point::new(
            self.release.point.x - self.reference.x,
            self.release.point.y - self.reference.y,
        )
    }

    fn command(&self) -> ShotCommand {
        let offset = self.offset();
        ShotCommand {
            reference: self.reference,
            dx: offset.x,
            dy: offset.y,
            tap_delay_ms: self.tap_delay_ms,
        }
    }
}

fn finish(session: SessionState, game_state: GameState, result: ShotResult) -> CycleReport {
    CycleReport {
        session,
        game_state,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::mock::{MockGame, MockLevel, ShotEffect};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn store() -> (tempfile::TempDir, DatasetStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            DatasetStore::with_dirs(tmp.path().join("learnings"), tmp.path().join("tmp")).unwrap();
        (tmp, store)
    }

    fn planner(seed: u64) -> ShotPlanner<StdRng> {
        ShotPlanner::new(&AgentConfig::without_delays(), StdRng::seed_from_u64(seed))
    }

    fn seed_bad_history(store: &DatasetStore, level: u32, n: i32) {
        for i in 0..n {
            let record = ShotRecord {
                release_dx: 70 + i,
                release_dy: 30,
                projectile: ProjectileType::RedBird,
                shot_group: 0,
                label: Label::Bad,
            };
            store.append(level, &record).unwrap();
        }
    }

    fn single_level(projectiles: Vec<ProjectileType>, targets: usize) -> MockGame {
        MockGame::with_levels(vec![MockLevel {
            obstacles: 20,
            targets,
            projectiles,
            effects: vec![ShotEffect::new(1, 0)],
        }])
    }

    #[tokio::test]
    async fn test_fresh_level_fires_without_classifier() {
        let (_tmp, store) = store();
        let mut game = MockGame::new();
        let report = planner(1)
            .run_cycle(&mut game, &store, SessionState::new(1))
            .await
            .unwrap();

        let fired = report.result.fired().copied().unwrap();
        assert_eq!(fired.prediction, None);
        assert_eq!(fired.tap_percent, 0);
        assert_eq!(fired.command.tap_delay_ms, 0);
        assert!(!fired.fallback);
        assert!(fired.command.dx < 0);
        // 20 -> 16 obstacles.
        assert_eq!(fired.record.label, Label::Good);

        assert_eq!(game.executed.len(), 1);
        assert_eq!(report.session.shots_fired, 1);
        assert!(report.session.previous_aim.is_some());

        let data = store.snapshot(1).unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data.last_record(), Some(&fired.record));
    }

    #[tokio::test]
    async fn test_bad_prediction_is_rejected_without_firing() {
        let (_tmp, store) = store();
        seed_bad_history(&store, 1, 6);
        let before = store.snapshot(1).unwrap();

        let mut game = MockGame::new();
        let mut session = SessionState::new(1);
        session.rejected_count = 1;

        let report = planner(2).run_cycle(&mut game, &store, session).await.unwrap();

        assert_eq!(report.result, ShotResult::Rejected { rejected_count: 2 });
        assert_eq!(report.session.rejected_count, 2);
        assert_eq!(report.session.shots_fired, 0);
        assert!(report.session.previous_aim.is_some());
        assert!(game.executed.is_empty());
        assert_eq!(store.snapshot(1).unwrap(), before);
    }

    #[tokio::test]
    async fn test_spent_budget_forces_fallback() {
        let (_tmp, store) = store();
        seed_bad_history(&store, 1, 6);

        let mut game = MockGame::new();
        let mut session = SessionState::new(1);
        session.rejected_count = 3;

        let report = planner(3).run_cycle(&mut game, &store, session).await.unwrap();

        let fired = report.result.fired().copied().unwrap();
        assert!(fired.fallback);
        assert_eq!(fired.prediction, Some(Label::Bad));
        assert_eq!(game.executed.len(), 1);
        // The fallback leaves the rejection count alone.
        assert_eq!(report.session.rejected_count, 3);
        assert_eq!(store.snapshot(1).unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_fallback_remembers_planned_aim() {
        let center = Point::new(610, 310);
        for seed in 0..8 {
            let (_tmp, store) = store();
            seed_bad_history(&store, 1, 6);
            let mut game = single_level(vec![ProjectileType::RedBird; 3], 1);
            let mut session = SessionState::new(1);
            session.rejected_count = 3;
            session.previous_aim = Some(center);

            let report = planner(seed).run_cycle(&mut game, &store, session).await.unwrap();

            assert!(report.result.fired().is_some_and(|f| f.fallback));
            // The planned aim was jittered off the lone target; the fallback
            // target must not overwrite it.
            let remembered = report.session.previous_aim.unwrap();
            assert_ne!(remembered, center, "seed {seed}");
            assert!(remembered.distance(&center) <= 10.0, "seed {seed}");
        }
    }

    #[tokio::test]
    async fn test_missing_sling_zooms_out_until_found() {
        let (_tmp, store) = store();
        let mut game = MockGame::new().script_sling([None, None]);
        let report = planner(4)
            .run_cycle(&mut game, &store, SessionState::new(1))
            .await
            .unwrap();

        assert!(report.result.fired().is_some());
        // Two searches plus the pre-fire zoom.
        assert_eq!(game.zoom_outs, 3);
    }

    #[tokio::test]
    async fn test_missing_sling_after_level_ended() {
        let (_tmp, store) = store();
        let mut game = MockGame::new()
            .script_sling([None])
            .script_states([GameState::Lost]);
        let report = planner(5)
            .run_cycle(&mut game, &store, SessionState::new(1))
            .await
            .unwrap();

        assert_eq!(report.result, ShotResult::NoSling);
        assert_eq!(report.game_state, GameState::Lost);
        assert_eq!(game.zoom_outs, 0);
    }

    #[tokio::test]
    async fn test_sling_rescale_aborts_shot() {
        let (_tmp, store) = store();
        let sling = MockGame::new().sling();
        let wider = Region::new(sling.x, sling.y, sling.width + 10, sling.height);
        let mut game = MockGame::new().script_sling([Some(sling), Some(wider)]);

        let report = planner(6)
            .run_cycle(&mut game, &store, SessionState::new(1))
            .await
            .unwrap();

        assert_eq!(report.result, ShotResult::SceneDrift);
        assert!(game.executed.is_empty());
        assert!(store.snapshot(1).unwrap().is_empty());
        assert!(report.session.previous_aim.is_some());
    }

    #[tokio::test]
    async fn test_small_rescale_is_tolerated() {
        let (_tmp, store) = store();
        let sling = MockGame::new().sling();
        let nudged = Region::new(sling.x + 3, sling.y, sling.width + 3, sling.height + 3);
        let mut game = MockGame::new().script_sling([Some(sling), Some(nudged)]);

        let report = planner(7)
            .run_cycle(&mut game, &store, SessionState::new(1))
            .await
            .unwrap();
        assert!(report.result.fired().is_some());
    }

    #[tokio::test]
    async fn test_aborted_cycles_leave_session_alone() {
        let (_tmp, store) = store();

        let mut no_targets = single_level(vec![ProjectileType::RedBird], 0);
        let report = planner(8)
            .run_cycle(&mut no_targets, &store, SessionState::new(1))
            .await
            .unwrap();
        assert_eq!(report.result, ShotResult::NoTargets);
        assert_eq!(report.session, SessionState::new(1));

        let mut unknown = single_level(vec![ProjectileType::Unknown], 2);
        let report = planner(9)
            .run_cycle(&mut unknown, &store, SessionState::new(1))
            .await
            .unwrap();
        assert_eq!(report.result, ShotResult::UnknownProjectile);
        assert_eq!(report.session, SessionState::new(1));

        let mut unreachable = single_level(vec![ProjectileType::RedBird], 2)
            .with_launch_points(0)
            .without_angle_fallback();
        let report = planner(10)
            .run_cycle(&mut unreachable, &store, SessionState::new(1))
            .await
            .unwrap();
        assert_eq!(report.result, ShotResult::NoReleasePoint);
        assert_eq!(report.session, SessionState::new(1));
        assert!(unreachable.executed.is_empty());
    }

    #[tokio::test]
    async fn test_calibrates_only_while_playing() {
        let (_tmp, store) = store();
        let mut game = MockGame::new();
        let mut planner = planner(11);

        // First shot leaves level 1 in play, second one wins it.
        let report = planner
            .run_cycle(&mut game, &store, SessionState::new(1))
            .await
            .unwrap();
        assert_eq!(report.game_state, GameState::Playing);
        assert_eq!(game.calibrations, 1);

        let report = planner.run_cycle(&mut game, &store, report.session).await.unwrap();
        assert_eq!(report.game_state, GameState::Won);
        assert_eq!(game.calibrations, 1);
        assert_eq!(report.result.fired().unwrap().record.shot_group, 0);
        assert_eq!(report.session.shots_fired, 2);
        assert_eq!(store.snapshot(1).unwrap().len(), 2);
    }
}
