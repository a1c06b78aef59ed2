//! Collaborator traits and the shared scene types.
//!
//! The decision engine never looks at pixels or drives the mouse itself. It
//! talks to three collaborators:
//! - [`Perception`] -- turns the current screen into a [`SceneSnapshot`].
//! - [`TrajectoryModel`] -- launch geometry (release points, angles, tap times).
//! - [`Actuator`] -- game state queries, shot execution and level navigation.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// A point in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// An axis-aligned bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Region {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Squared change in width and height between two observations of the
    /// same object. Used to detect that the view was rescaled.
    pub fn scale_delta(&self, other: &Region) -> f64 {
        let dw = f64::from(self.width - other.width);
        let dh = f64::from(self.height - other.height);
        dw * dw + dh * dh
    }
}

/// A segmented object in the scene (target, obstacle or projectile).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneObject {
    pub bounds: Region,
}

impl SceneObject {
    pub const fn new(bounds: Region) -> Self {
        Self { bounds }
    }

    pub fn center(&self) -> Point {
        self.bounds.center()
    }
}

/// Everything perception extracted from one screenshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SceneSnapshot {
    /// Bounding box of the slingshot, if it was located.
    pub sling: Option<Region>,
    pub obstacles: Vec<SceneObject>,
    pub targets: Vec<SceneObject>,
    /// Projectiles waiting on or next to the sling.
    pub projectiles: Vec<SceneObject>,
    /// Points of the most recent flight path (post-shot calibration data).
    pub trajectory_points: Vec<Point>,
}

// ---------------------------------------------------------------------------
// Game state and projectiles
// ---------------------------------------------------------------------------

/// The screen the game is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameState {
    Playing,
    Won,
    Lost,
    LevelSelect,
    MainMenu,
    EpisodeMenu,
    Other,
}

impl GameState {
    /// Whether this state terminates the current level attempt.
    pub fn is_level_end(&self) -> bool {
        matches!(self, Self::Won | Self::Lost)
    }
}

/// The projectile loaded on the sling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectileType {
    RedBird,
    YellowBird,
    BlueBird,
    BlackBird,
    WhiteBird,
    Unknown,
}

/// How a projectile reacts to a mid-flight tap. This is the tag the timing
/// table is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TapBehaviour {
    /// No special ability; tapping does nothing.
    InstantDetonate,
    /// Speed boost on tap; best timing depends on the arc.
    AngleSensitiveTap,
    /// Drops a payload over an area.
    AreaBurst,
    /// Explodes on or shortly after contact.
    ProximityExplode,
    /// Splits into several smaller projectiles.
    SplitOnTap,
    Default,
}

impl ProjectileType {
    pub const ALL: [ProjectileType; 6] = [
        Self::RedBird,
        Self::YellowBird,
        Self::BlueBird,
        Self::BlackBird,
        Self::WhiteBird,
        Self::Unknown,
    ];

    /// Label used in the dataset files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RedBird => "RedBird",
            Self::YellowBird => "YellowBird",
            Self::BlueBird => "BlueBird",
            Self::BlackBird => "BlackBird",
            Self::WhiteBird => "WhiteBird",
            Self::Unknown => "Unknown",
        }
    }

    /// Parse from a string (case-insensitive).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "redbird" | "red" => Some(Self::RedBird),
            "yellowbird" | "yellow" => Some(Self::YellowBird),
            "bluebird" | "blue" => Some(Self::BlueBird),
            "blackbird" | "black" => Some(Self::BlackBird),
            "whitebird" | "white" => Some(Self::WhiteBird),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn tap_behaviour(&self) -> TapBehaviour {
        match self {
            Self::RedBird => TapBehaviour::InstantDetonate,
            Self::YellowBird => TapBehaviour::AngleSensitiveTap,
            Self::WhiteBird => TapBehaviour::AreaBurst,
            Self::BlackBird => TapBehaviour::ProximityExplode,
            Self::BlueBird => TapBehaviour::SplitOnTap,
            Self::Unknown => TapBehaviour::Default,
        }
    }

    /// Projectiles that should always take the high arc when one exists.
    pub fn prefers_high_arc(&self) -> bool {
        matches!(self, Self::WhiteBird)
    }
}

impl std::fmt::Display for ProjectileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully specified drag-and-release gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotCommand {
    /// Reference point on the sling the drag starts from.
    pub reference: Point,
    /// Signed release offset from `reference`.
    pub dx: i32,
    pub dy: i32,
    /// Delay after release before the tap, in milliseconds.
    pub tap_delay_ms: u64,
}

// ---------------------------------------------------------------------------
// Collaborator traits
// ---------------------------------------------------------------------------

/// Scene perception.
///
/// Implementors only need [`Perception::capture_scene`]; the `find_*`
/// helpers take a fresh capture and project out one part of it.
#[allow(async_fn_in_trait)]
pub trait Perception: Send {
    /// Take a screenshot and segment it.
    async fn capture_scene(&mut self) -> anyhow::Result<SceneSnapshot>;

    async fn find_sling_region(&mut self) -> anyhow::Result<Option<Region>> {
        Ok(self.capture_scene().await?.sling)
    }

    async fn find_obstacles(&mut self) -> anyhow::Result<Vec<SceneObject>> {
        Ok(self.capture_scene().await?.obstacles)
    }

    async fn find_targets(&mut self) -> anyhow::Result<Vec<SceneObject>> {
        Ok(self.capture_scene().await?.targets)
    }

    async fn find_projectiles_on_field(&mut self) -> anyhow::Result<Vec<SceneObject>> {
        Ok(self.capture_scene().await?.projectiles)
    }

    async fn find_trajectory_points(&mut self) -> anyhow::Result<Vec<Point>> {
        Ok(self.capture_scene().await?.trajectory_points)
    }
}

/// Launch geometry for a given sling.
///
/// All angles are in radians.
pub trait TrajectoryModel: Send {
    /// Release points that hit `aim`: low arc first, optional high arc second.
    fn estimate_launch_points(&self, sling: &Region, aim: Point) -> Vec<Point>;

    /// Release point for a launch at `angle`, or `None` if it cannot be
    /// resolved for this sling.
    fn release_point_for_angle(&self, sling: &Region, angle: f64) -> Option<Point>;

    /// Fixed anchor on the sling that release offsets are measured from.
    fn reference_point(&self, sling: &Region) -> Point;

    /// Launch angle produced by releasing at `release`.
    fn release_angle(&self, sling: &Region, release: Point) -> f64;

    /// Absolute tap delay (ms) for tapping at `tap_percent` of the flight
    /// from `release` to `aim`.
    fn tap_time(&self, sling: &Region, release: Point, aim: Point, tap_percent: u32) -> u64;

    /// Refine the model from an observed flight path.
    fn calibrate(&mut self, observed: &[Point], sling: &Region, release: Point);

    /// Forget any calibration (a new level may use a different scale).
    fn reset(&mut self) {}
}

/// Game control.
#[allow(async_fn_in_trait)]
pub trait Actuator: Send {
    async fn current_game_state(&mut self) -> anyhow::Result<GameState>;

    async fn projectile_type_on_sling(&mut self) -> anyhow::Result<ProjectileType>;

    /// Perform the drag, release and (optional) tap. Returns once the
    /// projectile has settled.
    async fn execute_shot(&mut self, shot: ShotCommand) -> anyhow::Result<()>;

    async fn load_level(&mut self, level: u32) -> anyhow::Result<()>;

    async fn restart_level(&mut self) -> anyhow::Result<()>;

    async fn zoom_out_fully(&mut self) -> anyhow::Result<()>;

    async fn navigate_to_level_select(&mut self) -> anyhow::Result<()>;

    /// Score shown on the end-of-level screen.
    async fn read_score(&mut self) -> anyhow::Result<u32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance() {
        let a = Point::new(0, 0);
        let b = Point::new(3, 4);
        assert!((a.distance(&b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_region_scale_delta() {
        let a = Region::new(0, 0, 10, 20);
        let b = Region::new(5, 5, 13, 24);
        assert!((a.scale_delta(&b) - 25.0).abs() < 1e-9);
        assert_eq!(a.scale_delta(&a), 0.0);
    }

    #[test]
    fn test_projectile_type_parse_roundtrip() {
        for p in ProjectileType::ALL {
            assert_eq!(ProjectileType::from_str_loose(p.as_str()), Some(p));
        }
        assert_eq!(
            ProjectileType::from_str_loose("  yellowBIRD "),
            Some(ProjectileType::YellowBird)
        );
        assert_eq!(ProjectileType::from_str_loose("pig"), None);
    }

    #[test]
    fn test_only_white_bird_prefers_high_arc() {
        let high: Vec<_> = ProjectileType::ALL
            .into_iter()
            .filter(|p| p.prefers_high_arc())
            .collect();
        assert_eq!(high, vec![ProjectileType::WhiteBird]);
    }

    #[test]
    fn test_level_end_states() {
        assert!(GameState::Won.is_level_end());
        assert!(GameState::Lost.is_level_end());
        assert!(!GameState::Playing.is_level_end());
        assert!(!GameState::MainMenu.is_level_end());
    }
}
