use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Complete configuration for the shot-planning agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub dataset: DatasetConfig,
    pub selection: SelectionConfig,
    pub gate: GateConfig,
    pub evaluation: EvaluationConfig,
    pub runner: RunnerConfig,
}

/// Where the per-level shot logs live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Directory holding one log per level (default: "learnings").
    pub data_dir: PathBuf,
    /// Directory for the short-lived classifier scratch copies (default: "tmp").
    pub scratch_dir: PathBuf,
}

/// Target and trajectory selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// A new target closer than this to the previous aim point gets jittered
    /// (default: 10.0).
    pub repeat_aim_radius: f64,
    /// Distance the jittered aim point is moved (default: 10.0).
    pub jitter_radius: f64,
    /// With two candidates, the high arc is taken with probability
    /// 1 / high_arc_odds (default: 6).
    pub high_arc_odds: u32,
    /// Release angle used when no launch point reaches the target
    /// (default: 45.0).
    pub fallback_angle_degrees: f64,
}

/// Classifier gate and rejection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Minimum persisted records before the classifier is consulted
    /// (default: 5).
    pub min_training_records: usize,
    /// Bad predictions rejected before a fallback shot is forced (default: 3).
    pub max_rejections: u32,
    /// Upper bound (exclusive) of the random fallback angle (default: 80.0).
    pub random_angle_max_degrees: f64,
}

/// Post-shot labeling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Obstacle destruction percentage that makes a shot good (default: 15.0).
    pub destruction_threshold: f64,
}

/// Dispatch loop timing and scene checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Level to load on start (default: 1).
    pub start_level: u32,
    /// Wait after a win before reading the score, in ms (default: 3000).
    pub settle_delay_ms: u64,
    /// Wait before reading the projectile on the sling, in ms (default: 1000).
    pub pre_shot_delay_ms: u64,
    /// Squared sling width/height change that aborts a shot (default: 25.0).
    pub max_sling_scale_delta: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig {
                data_dir: PathBuf::from("learnings"),
                scratch_dir: PathBuf::from("tmp"),
            },
            selection: SelectionConfig {
                repeat_aim_radius: 10.0,
                jitter_radius: 10.0,
                high_arc_odds: 6,
                fallback_angle_degrees: 45.0,
            },
            gate: GateConfig {
                min_training_records: 5,
                max_rejections: 3,
                random_angle_max_degrees: 80.0,
            },
            evaluation: EvaluationConfig {
                destruction_threshold: 15.0,
            },
            runner: RunnerConfig {
                start_level: 1,
                settle_delay_ms: 3000,
                pre_shot_delay_ms: 1000,
                max_sling_scale_delta: 25.0,
            },
        }
    }
}

impl AgentConfig {
    /// Defaults with every delay zeroed, for tests and dry runs.
    pub fn without_delays() -> Self {
        let mut config = Self::default();
        config.runner.settle_delay_ms = 0;
        config.runner.pre_shot_delay_ms = 0;
        config
    }
}
