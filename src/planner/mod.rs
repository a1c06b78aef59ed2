//! Shot planning: target selection, tap timing and the per-cycle
//! orchestration that ties them to the classifier and the dataset.

pub mod selector;
pub mod session;
pub mod shot;
pub mod timing;

pub use selector::{AimSelection, ReleaseChoice, ReleaseSource, TargetSelector};
pub use session::{LevelScore, ScoreBoard, SessionState};
pub use shot::{CycleReport, FiredShot, ShotPlanner, ShotResult};
pub use timing::{tap_percentage, tap_window, TapWindow};
