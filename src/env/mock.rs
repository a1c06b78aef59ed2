//! A scripted stand-in for the real game.
//!
//! [`MockGame`] implements all three collaborator traits over a tiny
//! deterministic simulation: each level has a fixed number of obstacles,
//! targets and queued projectiles, and every executed shot applies the next
//! scripted [`ShotEffect`]. Useful for tests and for exercising the full
//! decision loop from the CLI without a game client.

use std::collections::VecDeque;

use anyhow::Result;

use super::traits::{
    Actuator, GameState, Perception, Point, ProjectileType, Region, SceneObject, SceneSnapshot,
    ShotCommand, TrajectoryModel,
};

/// Distance from the reference point to the release point, in pixels.
const DRAG_RADIUS: f64 = 80.0;
const LOW_ARC_DEGREES: f64 = 20.0;
const HIGH_ARC_DEGREES: f64 = 65.0;
/// Milliseconds of flight per pixel of horizontal distance.
const FLIGHT_MS_PER_PIXEL: f64 = 4.0;

/// What one shot does to the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShotEffect {
    pub obstacles_destroyed: usize,
    pub targets_killed: usize,
}

impl ShotEffect {
    pub const fn new(obstacles_destroyed: usize, targets_killed: usize) -> Self {
        Self {
            obstacles_destroyed,
            targets_killed,
        }
    }
}

/// A canned level layout.
#[derive(Debug, Clone)]
pub struct MockLevel {
    pub obstacles: usize,
    pub targets: usize,
    /// Projectiles in the order they are loaded on the sling.
    pub projectiles: Vec<ProjectileType>,
    /// Effects applied to successive shots (cycled).
    pub effects: Vec<ShotEffect>,
}

/// Scripted game implementing [`Perception`], [`TrajectoryModel`] and
/// [`Actuator`].
#[derive(Debug, Clone)]
pub struct MockGame {
    levels: Vec<MockLevel>,
    level: u32,
    state: GameState,
    sling: Region,
    obstacles: usize,
    targets: usize,
    shots_taken: usize,
    score: u32,
    /// Overrides for successive `capture_scene` sling detections.
    sling_script: VecDeque<Option<Region>>,
    /// Overrides for successive `current_game_state` answers.
    state_script: VecDeque<GameState>,
    launch_point_count: usize,
    angle_fallback: bool,
    /// Level loads and restarts left to fail.
    navigation_failures: usize,
    last_flight: Vec<Point>,
    /// Every shot executed so far.
    pub executed: Vec<ShotCommand>,
    pub zoom_outs: usize,
    pub calibrations: usize,
    pub restarts: usize,
    pub loaded_levels: Vec<u32>,
}

impl MockGame {
    /// A mock pre-loaded with three short levels.
    pub fn new() -> Self {
        Self::with_levels(Self::default_levels())
    }

    /// A mock over custom level layouts. Level `n` maps to
    /// `levels[(n - 1) % levels.len()]`.
    pub fn with_levels(levels: Vec<MockLevel>) -> Self {
        assert!(!levels.is_empty(), "MockGame needs at least one level");
        let mut game = Self {
            levels,
            level: 1,
            state: GameState::Playing,
            sling: Region::new(100, 300, 20, 60),
            obstacles: 0,
            targets: 0,
            shots_taken: 0,
            score: 0,
            sling_script: VecDeque::new(),
            state_script: VecDeque::new(),
            launch_point_count: 2,
            angle_fallback: true,
            navigation_failures: 0,
            last_flight: Vec::new(),
            executed: Vec::new(),
            zoom_outs: 0,
            calibrations: 0,
            restarts: 0,
            loaded_levels: Vec::new(),
        };
        game.reset_level();
        game
    }

    /// Limit how many launch points `estimate_launch_points` returns (0..=2).
    pub fn with_launch_points(mut self, count: usize) -> Self {
        self.launch_point_count = count.min(2);
        self
    }

    /// Make `release_point_for_angle` fail.
    pub fn without_angle_fallback(mut self) -> Self {
        self.angle_fallback = false;
        self
    }

    /// Make the next `count` level loads or restarts fail.
    pub fn fail_navigation(mut self, count: usize) -> Self {
        self.navigation_failures = count;
        self
    }

    /// Queue sling detections for the next captures (`None` = not found).
    pub fn script_sling(mut self, detections: impl IntoIterator<Item = Option<Region>>) -> Self {
        self.sling_script.extend(detections);
        self
    }

    /// Queue answers for the next `current_game_state` calls.
    pub fn script_states(mut self, states: impl IntoIterator<Item = GameState>) -> Self {
        self.state_script.extend(states);
        self
    }

    pub fn sling(&self) -> Region {
        self.sling
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    fn layout(&self) -> &MockLevel {
        let idx = (self.level.max(1) as usize - 1) % self.levels.len();
        &self.levels[idx]
    }

    fn reset_level(&mut self) {
        let layout = self.layout().clone();
        self.obstacles = layout.obstacles;
        self.targets = layout.targets;
        self.shots_taken = 0;
        self.score = 0;
        self.last_flight.clear();
        self.state = GameState::Playing;
    }

    fn check_navigation(&mut self, what: &str) -> Result<()> {
        if self.navigation_failures > 0 {
            self.navigation_failures -= 1;
            anyhow::bail!("scripted {what} failure");
        }
        Ok(())
    }

    fn projectiles_remaining(&self) -> usize {
        self.layout().projectiles.len().saturating_sub(self.shots_taken)
    }

    fn scene(&self, sling: Option<Region>) -> SceneSnapshot {
        let targets = (0..self.targets)
            .map(|i| SceneObject::new(Region::new(600 + 40 * i as i32, 300, 20, 20)))
            .collect();
        let obstacles = (0..self.obstacles)
            .map(|i| {
                let col = (i % 10) as i32;
                let row = (i / 10) as i32;
                SceneObject::new(Region::new(560 + 12 * col, 280 - 12 * row, 10, 10))
            })
            .collect();
        let projectiles = (0..self.projectiles_remaining())
            .map(|i| SceneObject::new(Region::new(80 - 15 * i as i32, 350, 10, 10)))
            .collect();
        SceneSnapshot {
            sling,
            obstacles,
            targets,
            projectiles,
            trajectory_points: self.last_flight.clone(),
        }
    }

    // -- built-in levels ----------------------------------------------------

    fn default_levels() -> Vec<MockLevel> {
        use ProjectileType::*;
        vec![
            MockLevel {
                obstacles: 20,
                targets: 2,
                projectiles: vec![RedBird, RedBird, RedBird],
                effects: vec![ShotEffect::new(4, 1), ShotEffect::new(2, 1)],
            },
            MockLevel {
                obstacles: 30,
                targets: 3,
                projectiles: vec![YellowBird, BlueBird, RedBird, RedBird],
                effects: vec![
                    ShotEffect::new(1, 0),
                    ShotEffect::new(6, 1),
                    ShotEffect::new(3, 1),
                    ShotEffect::new(5, 1),
                ],
            },
            MockLevel {
                obstacles: 40,
                targets: 4,
                projectiles: vec![BlackBird, WhiteBird, BlackBird],
                effects: vec![ShotEffect::new(12, 2), ShotEffect::new(2, 0)],
            },
        ]
    }
}

impl Default for MockGame {
    fn default() -> Self {
        Self::new()
    }
}

impl Perception for MockGame {
    async fn capture_scene(&mut self) -> Result<SceneSnapshot> {
        let sling = match self.sling_script.pop_front() {
            Some(scripted) => scripted,
            None => Some(self.sling),
        };
        Ok(self.scene(sling))
    }
}

impl TrajectoryModel for MockGame {
    fn estimate_launch_points(&self, sling: &Region, _aim: Point) -> Vec<Point> {
        [LOW_ARC_DEGREES, HIGH_ARC_DEGREES]
            .into_iter()
            .take(self.launch_point_count)
            .filter_map(|deg| self.release_point_for_angle_unchecked(sling, deg.to_radians()))
            .collect()
    }

    fn release_point_for_angle(&self, sling: &Region, angle: f64) -> Option<Point> {
        if !self.angle_fallback {
            return None;
        }
        self.release_point_for_angle_unchecked(sling, angle)
    }

    fn reference_point(&self, sling: &Region) -> Point {
        Point::new(sling.x + sling.width / 2, sling.y + sling.height / 5)
    }

    fn release_angle(&self, sling: &Region, release: Point) -> f64 {
        let reference = self.reference_point(sling);
        let dx = f64::from(reference.x - release.x);
        let dy = f64::from(release.y - reference.y);
        dy.atan2(dx)
    }

    fn tap_time(&self, sling: &Region, _release: Point, aim: Point, tap_percent: u32) -> u64 {
        let reference = self.reference_point(sling);
        let flight_ms = f64::from((aim.x - reference.x).abs()) * FLIGHT_MS_PER_PIXEL;
        (flight_ms * f64::from(tap_percent) / 100.0).round() as u64
    }

    fn calibrate(&mut self, observed: &[Point], _sling: &Region, _release: Point) {
        if !observed.is_empty() {
            self.calibrations += 1;
        }
    }

    fn reset(&mut self) {
        self.calibrations = 0;
    }
}

impl MockGame {
    fn release_point_for_angle_unchecked(&self, sling: &Region, angle: f64) -> Option<Point> {
        let reference = self.reference_point(sling);
        let x = f64::from(reference.x) - DRAG_RADIUS * angle.cos();
        let y = f64::from(reference.y) + DRAG_RADIUS * angle.sin();
        Some(Point::new(x.round() as i32, y.round() as i32))
    }
}

impl Actuator for MockGame {
    async fn current_game_state(&mut self) -> Result<GameState> {
        Ok(self.state_script.pop_front().unwrap_or(self.state))
    }

    async fn projectile_type_on_sling(&mut self) -> Result<ProjectileType> {
        Ok(self
            .layout()
            .projectiles
            .get(self.shots_taken)
            .copied()
            .unwrap_or(ProjectileType::Unknown))
    }

    async fn execute_shot(&mut self, shot: ShotCommand) -> Result<()> {
        if self.state != GameState::Playing {
            anyhow::bail!("cannot shoot while the game is in state {:?}", self.state);
        }

        let layout = self.layout();
        let effect = layout.effects[self.shots_taken % layout.effects.len()];
        let destroyed = effect.obstacles_destroyed.min(self.obstacles);

        self.obstacles -= destroyed;
        self.targets = self.targets.saturating_sub(effect.targets_killed);
        self.shots_taken += 1;
        self.score += 500 * destroyed as u32 + 5_000 * effect.targets_killed as u32;
        self.executed.push(shot);

        let origin = shot.reference;
        self.last_flight = (1..=5)
            .map(|i| Point::new(origin.x + 100 * i, origin.y - 20 * i + 4 * i * i))
            .collect();

        if self.targets == 0 {
            self.score += 10_000 * self.projectiles_remaining() as u32;
            self.state = GameState::Won;
        } else if self.projectiles_remaining() == 0 {
            self.state = GameState::Lost;
        }

        tracing::debug!(
            level = self.level,
            destroyed,
            targets_left = self.targets,
            state = ?self.state,
            "mock shot executed"
        );
        Ok(())
    }

    async fn load_level(&mut self, level: u32) -> Result<()> {
        self.check_navigation("level load")?;
        self.level = level;
        self.loaded_levels.push(level);
        self.reset_level();
        Ok(())
    }

    async fn restart_level(&mut self) -> Result<()> {
        self.check_navigation("restart")?;
        self.restarts += 1;
        self.reset_level();
        Ok(())
    }

    async fn zoom_out_fully(&mut self) -> Result<()> {
        self.zoom_outs += 1;
        Ok(())
    }

    async fn navigate_to_level_select(&mut self) -> Result<()> {
        self.state = GameState::LevelSelect;
        Ok(())
    }

    async fn read_score(&mut self) -> Result<u32> {
        Ok(self.score)
    }
}
