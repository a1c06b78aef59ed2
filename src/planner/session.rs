//! Per-run state carried between decision cycles.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::env::Point;

/// Counters that survive from one decision cycle to the next.
///
/// Passed by value into each cycle and handed back updated, so a failed
/// cycle leaves the caller's copy untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub current_level: u32,
    /// Bad predictions rejected so far in this level attempt.
    pub rejected_count: u32,
    /// Shots executed and recorded in this level attempt.
    pub shots_fired: u32,
    /// Aim point of the last decision, used to jitter repeated targeting.
    pub previous_aim: Option<Point>,
}

impl SessionState {
    pub fn new(level: u32) -> Self {
        Self {
            current_level: level,
            rejected_count: 0,
            shots_fired: 0,
            previous_aim: None,
        }
    }

    /// Reset the per-attempt counters. Called exactly when a level is won or
    /// lost.
    pub fn end_level_attempt(&mut self) {
        self.rejected_count = 0;
        self.shots_fired = 0;
    }
}

/// Best score recorded for one level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelScore {
    pub best: u32,
    pub completions: u32,
    pub last_completed_at: DateTime<Utc>,
}

/// Scores for every level completed this run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBoard {
    levels: BTreeMap<u32, LevelScore>,
}

impl ScoreBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completion, keeping the maximum. Returns `true` if `score`
    /// is a new best for the level.
    pub fn record(&mut self, level: u32, score: u32) -> bool {
        let now = Utc::now();
        match self.levels.get_mut(&level) {
            Some(entry) => {
                entry.completions += 1;
                entry.last_completed_at = now;
                if score > entry.best {
                    entry.best = score;
                    true
                } else {
                    false
                }
            }
            None => {
                self.levels.insert(
                    level,
                    LevelScore {
                        best: score,
                        completions: 1,
                        last_completed_at: now,
                    },
                );
                true
            }
        }
    }

    pub fn best(&self, level: u32) -> Option<u32> {
        self.levels.get(&level).map(|s| s.best)
    }

    /// Sum of the best score of every completed level.
    pub fn total(&self) -> u64 {
        self.levels.values().map(|s| u64::from(s.best)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &LevelScore)> {
        self.levels.iter()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
