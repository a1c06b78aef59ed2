//! Shot records and the per-level dataset they accumulate into.
//!
//! Every executed shot becomes one [`ShotRecord`] line in its level's log:
//!
//! ```text
//! dx,dy,projectileType,shotGroup,label
//! ```
//!
//! A blank line marks the end of a level attempt. The label `?` only ever
//! appears in scratch copies handed to the classifier.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::env::{Point, ProjectileType};

// ---------------------------------------------------------------------------
// Label
// ---------------------------------------------------------------------------

/// Shot quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    Good,
    Bad,
    /// The candidate being classified. Never persisted to a level log.
    Unlabeled,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Bad => "bad",
            Self::Unlabeled => "?",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "good" => Some(Self::Good),
            "bad" => Some(Self::Bad),
            "?" => Some(Self::Unlabeled),
            _ => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unlabeled)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Shot record
// ---------------------------------------------------------------------------

/// One row of training data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotRecord {
    /// Horizontal release offset from the sling reference point (magnitude).
    pub release_dx: i32,
    /// Vertical release offset from the sling reference point (magnitude).
    pub release_dy: i32,
    pub projectile: ProjectileType,
    /// Shot index within the level divided by two, so a shot and its retry
    /// land in the same group.
    pub shot_group: u32,
    pub label: Label,
}

impl ShotRecord {
    /// Build an unlabeled candidate from a signed release offset.
    pub fn candidate(offset: Point, projectile: ProjectileType, shots_fired: u32) -> Self {
        Self {
            release_dx: offset.x.abs(),
            release_dy: offset.y.abs(),
            projectile,
            shot_group: shots_fired / 2,
            label: Label::Unlabeled,
        }
    }

    pub fn with_label(self, label: Label) -> Self {
        Self { label, ..self }
    }

    /// The numeric features, in file order.
    pub fn numeric_features(&self) -> [f64; 3] {
        [
            f64::from(self.release_dx),
            f64::from(self.release_dy),
            f64::from(self.shot_group),
        ]
    }

    /// Serialize as one dataset line (no trailing newline).
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.release_dx,
            self.release_dy,
            self.projectile.as_str(),
            self.shot_group,
            self.label.as_str()
        )
    }

    /// Parse one non-blank dataset line.
    pub fn from_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        if fields.len() != 5 {
            bail!("expected 5 comma-separated fields, found {}", fields.len());
        }

        let release_dx = fields[0]
            .parse::<i32>()
            .with_context(|| format!("invalid dx {:?}", fields[0]))?;
        let release_dy = fields[1]
            .parse::<i32>()
            .with_context(|| format!("invalid dy {:?}", fields[1]))?;
        let projectile = ProjectileType::from_str_loose(fields[2])
            .with_context(|| format!("unknown projectile type {:?}", fields[2]))?;
        let shot_group = fields[3]
            .parse::<u32>()
            .with_context(|| format!("invalid shot group {:?}", fields[3]))?;
        let label =
            Label::parse(fields[4]).with_context(|| format!("unknown label {:?}", fields[4]))?;

        Ok(Self {
            release_dx,
            release_dy,
            projectile,
            shot_group,
            label,
        })
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

/// One line of a level log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetEntry {
    Shot(ShotRecord),
    /// End of a level attempt.
    Boundary,
}

/// An ordered, read-only view of a level's log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    entries: Vec<DatasetEntry>,
}

impl Dataset {
    pub fn new(entries: Vec<DatasetEntry>) -> Self {
        Self { entries }
    }

    /// Parse the contents of a level log. Lines starting with `%` are schema
    /// header and are skipped.
    ///
    /// A final line without its newline is the remains of an interrupted
    /// append; it is skipped with a warning.
    pub fn parse(text: &str) -> Result<Self> {
        let torn_tail = !text.is_empty() && !text.ends_with('\n');
        let line_count = text.lines().count();

        let mut entries = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if torn_tail && idx + 1 == line_count {
                warn!(line = idx + 1, content = %line, "Skipping torn final line");
                break;
            }
            let trimmed = line.trim();
            if trimmed.starts_with('%') {
                continue;
            }
            if trimmed.is_empty() {
                entries.push(DatasetEntry::Boundary);
                continue;
            }
            let record = ShotRecord::from_line(trimmed)
                .with_context(|| format!("line {}: {:?}", idx + 1, line))?;
            entries.push(DatasetEntry::Shot(record));
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[DatasetEntry] {
        &self.entries
    }

    /// All shot records in order, skipping boundaries.
    pub fn records(&self) -> impl Iterator<Item = &ShotRecord> {
        self.entries.iter().filter_map(|e| match e {
            DatasetEntry::Shot(r) => Some(r),
            DatasetEntry::Boundary => None,
        })
    }

    /// Records with a resolved label, cloned for training.
    pub fn labeled(&self) -> Vec<ShotRecord> {
        self.records()
            .filter(|r| r.label.is_resolved())
            .copied()
            .collect()
    }

    /// Number of shot records (boundaries excluded).
    pub fn len(&self) -> usize {
        self.records().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn boundary_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, DatasetEntry::Boundary))
            .count()
    }

    /// `(good, bad)` counts.
    pub fn label_counts(&self) -> (usize, usize) {
        self.records().fold((0, 0), |(good, bad), r| match r.label {
            Label::Good => (good + 1, bad),
            Label::Bad => (good, bad + 1),
            Label::Unlabeled => (good, bad),
        })
    }

    /// Whether this dataset's entries are a prefix of `later`'s.
    pub fn is_prefix_of(&self, later: &Dataset) -> bool {
        later.entries.len() >= self.entries.len()
            && later.entries[..self.entries.len()] == self.entries[..]
    }

    /// The last record, if the log ends with one.
    pub fn last_record(&self) -> Option<&ShotRecord> {
        match self.entries.last() {
            Some(DatasetEntry::Shot(r)) => Some(r),
            _ => None,
        }
    }
}
