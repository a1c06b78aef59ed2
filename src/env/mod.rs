//! Game-facing collaborators.
//!
//! The decision engine reaches the game only through the traits in
//! [`traits`]: [`Perception`] for the scene, [`TrajectoryModel`] for launch
//! geometry and [`Actuator`] for state queries, shots and navigation.
//!
//! [`mock::MockGame`] implements all three over a scripted simulation so the
//! full decision loop can run without a game client.

pub mod mock;
pub mod traits;

pub use traits::{
    Actuator, GameState, Perception, Point, ProjectileType, Region, SceneObject, SceneSnapshot,
    ShotCommand, TapBehaviour, TrajectoryModel,
};

/// Everything a decision cycle needs from the game, bundled.
pub trait GameEnv: Perception + TrajectoryModel + Actuator {}

impl<T: Perception + TrajectoryModel + Actuator> GameEnv for T {}
