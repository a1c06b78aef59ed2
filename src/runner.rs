//! The dispatch loop.
//!
//! [`AgentRunner`] owns the game, the dataset store, the planner and the
//! session. Each iteration reads the game state, runs a decision cycle if the
//! level is being played, and then reacts to whatever state the game ended
//! up in:
//!
//! ```text
//! Won          settle, boundary, record score, reset counters, load next level
//! Lost         boundary, reset counters, restart
//! menus        navigate back and reload the current level
//! otherwise    carry on
//! ```
//!
//! Every iteration is a single error boundary: a failure is logged and the
//! loop keeps going. The session only changes once the step that produced
//! it has committed its side effects, and a level load or restart that
//! failed is retried before anything else.

use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::AgentConfig;
use crate::dataset::DatasetStore;
use crate::env::{GameEnv, GameState};
use crate::planner::{ScoreBoard, SessionState, ShotPlanner, ShotResult};

/// What one iteration of the loop amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Keep playing the current level.
    Continue,
    /// The level was won and the next one loaded.
    LevelAdvanced { completed: u32, score: u32 },
    /// The level was lost and restarted.
    Retry,
}

/// Totals for a call to [`AgentRunner::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub cycles: usize,
    pub shots_fired: usize,
    pub levels_completed: usize,
    pub levels_lost: usize,
    pub errors: usize,
}

/// Drives decision cycles against a game.
pub struct AgentRunner<E, R> {
    env: E,
    store: DatasetStore,
    planner: ShotPlanner<R>,
    session: SessionState,
    scores: ScoreBoard,
    settle_delay: Duration,
    last_result: Option<ShotResult>,
    pending: Option<Transition>,
    failed_cycles: usize,
}

impl<E: GameEnv, R: Rng> AgentRunner<E, R> {
    pub fn new(config: &AgentConfig, env: E, store: DatasetStore, rng: R) -> Self {
        Self {
            env,
            store,
            planner: ShotPlanner::new(config, rng),
            session: SessionState::new(config.runner.start_level),
            scores: ScoreBoard::new(),
            settle_delay: Duration::from_millis(config.runner.settle_delay_ms),
            last_result: None,
            pending: None,
            failed_cycles: 0,
        }
    }

    /// Resume from an existing session instead of a fresh one.
    pub fn with_session(mut self, session: SessionState) -> Self {
        self.session = session;
        self
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn scores(&self) -> &ScoreBoard {
        &self.scores
    }

    pub fn store(&self) -> &DatasetStore {
        &self.store
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Result of the most recent decision cycle, if one ran.
    pub fn last_result(&self) -> Option<&ShotResult> {
        self.last_result.as_ref()
    }

    /// Load the session's level and make sure its dataset exists.
    pub async fn start(&mut self) -> Result<()> {
        let level = self.session.current_level;
        self.store.ensure_initialized(level)?;
        self.env
            .load_level(level)
            .await
            .with_context(|| format!("failed to load level {level}"))?;
        info!(level, "agent started");
        Ok(())
    }

    /// Run `max_cycles` iterations, or forever with `None`.
    pub async fn run(&mut self, max_cycles: Option<usize>) -> RunSummary {
        let mut summary = RunSummary::default();
        while max_cycles.map_or(true, |max| summary.cycles < max) {
            let failed_before = self.failed_cycles;
            let outcome = self.run_once().await;
            summary.cycles += 1;
            summary.errors += self.failed_cycles - failed_before;
            if matches!(self.last_result, Some(ShotResult::Fired(_))) {
                summary.shots_fired += 1;
            }
            match outcome {
                CycleOutcome::LevelAdvanced { .. } => summary.levels_completed += 1,
                CycleOutcome::Retry => summary.levels_lost += 1,
                CycleOutcome::Continue => {}
            }
        }
        info!(
            cycles = summary.cycles,
            shots = summary.shots_fired,
            completed = summary.levels_completed,
            lost = summary.levels_lost,
            errors = summary.errors,
            total_score = self.scores.total(),
            "run finished"
        );
        summary
    }

    /// One iteration inside the error boundary.
    ///
    /// The session is committed as soon as a cycle or a level end has
    /// produced side effects, so a later failure in the same iteration never
    /// rolls it back past them.
    pub async fn run_once(&mut self) -> CycleOutcome {
        self.last_result = None;
        match self.step().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    level = self.session.current_level,
                    pending = ?self.pending,
                    error = format!("{e:#}"),
                    "decision cycle failed, continuing"
                );
                self.failed_cycles += 1;
                CycleOutcome::Continue
            }
        }
    }

    async fn step(&mut self) -> Result<CycleOutcome> {
        if let Some(pending) = self.pending {
            return self.finish_transition(pending).await;
        }

        let mut state = self.env.current_game_state().await?;
        if state == GameState::Playing {
            let report = self
                .planner
                .run_cycle(&mut self.env, &self.store, self.session.clone())
                .await?;
            debug!(level = self.session.current_level, result = ?report.result, "cycle finished");
            self.session = report.session;
            self.last_result = Some(report.result);
            state = report.game_state;
        }

        if state.is_level_end() {
            self.end_level(state).await
        } else {
            self.handle_screen(state).await
        }
    }

    /// Record a won or lost attempt, then move the game on.
    ///
    /// The boundary is the first durable effect. The counters reset and the
    /// transition is marked pending in the same step, so a failed load or
    /// restart is retried on the next iteration without a second boundary.
    async fn end_level(&mut self, state: GameState) -> Result<CycleOutcome> {
        let level = self.session.current_level;
        let pending = if state == GameState::Won {
            tokio::time::sleep(self.settle_delay).await;
            let score = self.env.read_score().await?;

            self.store.mark_level_boundary(level)?;
            let new_best = self.scores.record(level, score);
            info!(level, score, new_best, "level won");
            for (lvl, entry) in self.scores.iter() {
                info!(level = *lvl, best = entry.best, completions = entry.completions, "level score");
            }
            info!(total = self.scores.total(), "total score");

            self.session.current_level = level + 1;
            Transition::Advance {
                completed: level,
                score,
            }
        } else {
            self.store.mark_level_boundary(level)?;
            info!(level, shots = self.session.shots_fired, "level lost, restarting");
            Transition::Restart
        };
        self.session.end_level_attempt();
        self.pending = Some(pending);

        self.finish_transition(pending).await
    }

    async fn finish_transition(&mut self, pending: Transition) -> Result<CycleOutcome> {
        let level = self.session.current_level;
        let outcome = match pending {
            Transition::Advance { completed, score } => {
                self.env
                    .load_level(level)
                    .await
                    .with_context(|| format!("failed to load level {level}"))?;
                self.env.reset();
                CycleOutcome::LevelAdvanced { completed, score }
            }
            Transition::Restart => {
                self.env
                    .restart_level()
                    .await
                    .with_context(|| format!("failed to restart level {level}"))?;
                CycleOutcome::Retry
            }
        };
        self.pending = None;
        Ok(outcome)
    }

    async fn handle_screen(&mut self, state: GameState) -> Result<CycleOutcome> {
        let level = self.session.current_level;
        match state {
            GameState::LevelSelect | GameState::MainMenu | GameState::EpisodeMenu => {
                info!(level, ?state, "unexpected menu, reloading level");
                if state != GameState::LevelSelect {
                    self.env.navigate_to_level_select().await?;
                }
                self.env
                    .load_level(level)
                    .await
                    .with_context(|| format!("failed to reload level {level}"))?;
                Ok(CycleOutcome::Continue)
            }
            _ => Ok(CycleOutcome::Continue),
        }
    }
}

/// A level transition whose bookkeeping is done but whose game-side step
/// (load or restart) has not succeeded yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Advance { completed: u32, score: u32 },
    Restart,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::mock::{MockGame, MockLevel, ShotEffect};
    use crate::env::ProjectileType;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn runner_with(game: MockGame) -> (tempfile::TempDir, AgentRunner<MockGame, StdRng>) {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            DatasetStore::with_dirs(tmp.path().join("learnings"), tmp.path().join("tmp")).unwrap();
        let runner = AgentRunner::new(
            &AgentConfig::without_delays(),
            game,
            store,
            StdRng::seed_from_u64(7),
        );
        (tmp, runner)
    }

    #[tokio::test]
    async fn test_win_records_score_and_advances() {
        let (_tmp, mut runner) = runner_with(MockGame::new());
        runner.start().await.unwrap();

        assert_eq!(runner.run_once().await, CycleOutcome::Continue);
        assert_eq!(runner.session().shots_fired, 1);

        let outcome = runner.run_once().await;
        let CycleOutcome::LevelAdvanced { completed, score } = outcome else {
            panic!("expected level advance, got {outcome:?}");
        };
        assert_eq!(completed, 1);
        assert!(score > 0);
        assert_eq!(runner.scores().best(1), Some(score));

        let session = runner.session();
        assert_eq!(session.current_level, 2);
        assert_eq!(session.rejected_count, 0);
        assert_eq!(session.shots_fired, 0);

        assert_eq!(runner.env().loaded_levels, vec![1, 2]);
        assert_eq!(runner.env().level(), 2);

        let data = runner.store().snapshot(1).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.boundary_count(), 1);
    }

    #[tokio::test]
    async fn test_loss_restarts_and_resets_counters() {
        let game = MockGame::with_levels(vec![MockLevel {
            obstacles: 20,
            targets: 2,
            projectiles: vec![ProjectileType::RedBird],
            effects: vec![ShotEffect::new(0, 0)],
        }]);
        let (_tmp, mut runner) = runner_with(game);
        let mut session = SessionState::new(1);
        session.rejected_count = 2;
        runner = runner.with_session(session);

        assert_eq!(runner.run_once().await, CycleOutcome::Retry);
        assert_eq!(runner.env().restarts, 1);
        assert_eq!(runner.session().current_level, 1);
        assert_eq!(runner.session().rejected_count, 0);
        assert_eq!(runner.session().shots_fired, 0);

        let data = runner.store().snapshot(1).unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data.boundary_count(), 1);
        assert_eq!(data.label_counts(), (0, 1));
    }

    #[tokio::test]
    async fn test_menu_reloads_level_without_reset() {
        let game = MockGame::new().script_states([GameState::MainMenu]);
        let (_tmp, mut runner) = runner_with(game);
        let mut session = SessionState::new(3);
        session.rejected_count = 2;
        session.shots_fired = 1;
        runner = runner.with_session(session.clone());

        assert_eq!(runner.run_once().await, CycleOutcome::Continue);
        assert_eq!(runner.env().loaded_levels, vec![3]);
        assert_eq!(runner.session(), &session);
        assert!(runner.last_result().is_none());
        assert!(runner.store().levels().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_cycle_keeps_session() {
        let (tmp, mut runner) = runner_with(MockGame::new());
        let mut session = SessionState::new(1);
        session.rejected_count = 2;
        runner = runner.with_session(session.clone());

        // Without the data dir the gate cannot initialize the level log.
        std::fs::remove_dir_all(tmp.path().join("learnings")).unwrap();

        assert_eq!(runner.run_once().await, CycleOutcome::Continue);
        assert_eq!(runner.session(), &session);
        assert!(runner.env().executed.is_empty());
    }

    #[tokio::test]
    async fn test_run_plays_through_levels() {
        let (_tmp, mut runner) = runner_with(MockGame::new());
        runner.start().await.unwrap();

        // Levels 1-3 take 2 + 4 + 3 shots.
        let summary = runner.run(Some(9)).await;
        assert_eq!(summary.cycles, 9);
        assert_eq!(summary.shots_fired, 9);
        assert_eq!(summary.levels_completed, 3);
        assert_eq!(summary.errors, 0);
        assert_eq!(runner.session().current_level, 4);
        assert_eq!(runner.scores().len(), 3);
        assert_eq!(runner.store().levels().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_loss_with_unwritable_log_is_retried_whole() {
        let game = MockGame::new().script_states([GameState::Lost, GameState::Lost]);
        let (tmp, mut runner) = runner_with(game);
        let mut session = SessionState::new(1);
        session.rejected_count = 3;
        session.shots_fired = 2;
        runner = runner.with_session(session.clone());

        let data_dir = tmp.path().join("learnings");
        std::fs::remove_dir_all(&data_dir).unwrap();

        // Nothing happened: no restart, counters kept.
        assert_eq!(runner.run_once().await, CycleOutcome::Continue);
        assert_eq!(runner.env().restarts, 0);
        assert_eq!(runner.session(), &session);

        std::fs::create_dir_all(&data_dir).unwrap();
        assert_eq!(runner.run_once().await, CycleOutcome::Retry);
        assert_eq!(runner.env().restarts, 1);
        assert_eq!(runner.session().rejected_count, 0);
        assert_eq!(runner.session().shots_fired, 0);
        assert_eq!(runner.store().snapshot(1).unwrap().boundary_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_restart_keeps_reset_and_single_boundary() {
        let game = MockGame::with_levels(vec![MockLevel {
            obstacles: 20,
            targets: 2,
            projectiles: vec![ProjectileType::RedBird],
            effects: vec![ShotEffect::new(0, 0)],
        }])
        .fail_navigation(1);
        let (_tmp, mut runner) = runner_with(game);

        // Shot lands, level lost, restart fails.
        assert_eq!(runner.run_once().await, CycleOutcome::Continue);
        assert!(runner.last_result().and_then(|r| r.fired()).is_some());
        assert_eq!(runner.env().restarts, 0);
        assert_eq!(runner.session().shots_fired, 0);
        assert_eq!(runner.store().snapshot(1).unwrap().boundary_count(), 1);

        // The restart is retried on its own.
        assert_eq!(runner.run_once().await, CycleOutcome::Retry);
        assert_eq!(runner.env().restarts, 1);
        let data = runner.store().snapshot(1).unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data.boundary_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_level_load_does_not_repeat_win() {
        let (_tmp, mut runner) = runner_with(MockGame::new().fail_navigation(1));

        assert_eq!(runner.run_once().await, CycleOutcome::Continue);
        // Winning shot; loading level 2 fails.
        assert_eq!(runner.run_once().await, CycleOutcome::Continue);
        assert_eq!(runner.session().current_level, 2);
        assert_eq!(runner.session().shots_fired, 0);
        assert!(runner.env().loaded_levels.is_empty());

        let outcome = runner.run_once().await;
        assert!(matches!(
            outcome,
            CycleOutcome::LevelAdvanced { completed: 1, .. }
        ));
        assert_eq!(runner.env().loaded_levels, vec![2]);
        assert_eq!(runner.scores().iter().next().unwrap().1.completions, 1);
        let data = runner.store().snapshot(1).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.boundary_count(), 1);
    }

    #[tokio::test]
    async fn test_persisted_shot_counts_even_if_menu_reload_fails() {
        let game = MockGame::new()
            .script_states([GameState::Playing, GameState::Playing, GameState::MainMenu])
            .fail_navigation(1);
        let (_tmp, mut runner) = runner_with(game);

        assert_eq!(runner.run_once().await, CycleOutcome::Continue);
        assert!(runner.env().loaded_levels.is_empty());
        assert_eq!(runner.store().snapshot(1).unwrap().len(), 1);
        assert_eq!(runner.session().shots_fired, 1);
    }
}
