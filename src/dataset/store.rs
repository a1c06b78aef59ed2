//! Per-level append-only shot logs on disk.
//!
//! Each level owns one file, `{data_dir}/level{n}.data`, created from a fixed
//! schema header on first use. Lines are only ever appended, one full line
//! per write, and flushed to disk before the call returns.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{Dataset, ShotRecord};
use crate::config::DatasetConfig;

/// Schema header written at the top of every new level log.
pub const SCHEMA_TEMPLATE: &str = "\
% slingshot shot-quality dataset
% columns: releaseDx,releaseDy,projectileType,shotGroup,label
% releaseDx, releaseDy: numeric (absolute release offset from the sling reference point)
% projectileType: {RedBird,YellowBird,BlueBird,BlackBird,WhiteBird,Unknown}
% shotGroup: numeric (shot index / 2)
% label: {good,bad}
% a blank line ends a level attempt
";

/// Owns every level log under a data directory.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    data_dir: PathBuf,
    scratch_dir: PathBuf,
}

impl DatasetStore {
    /// Open (and create if needed) the data and scratch directories.
    pub fn open(config: &DatasetConfig) -> Result<Self> {
        Self::with_dirs(&config.data_dir, &config.scratch_dir)
    }

    pub fn with_dirs(data_dir: impl AsRef<Path>, scratch_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        let scratch_dir = scratch_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data dir {}", data_dir.display()))?;
        fs::create_dir_all(&scratch_dir)
            .with_context(|| format!("Failed to create scratch dir {}", scratch_dir.display()))?;
        Ok(Self {
            data_dir,
            scratch_dir,
        })
    }

    /// Path of the log for `level`.
    pub fn level_path(&self, level: u32) -> PathBuf {
        self.data_dir.join(format!("level{level}.data"))
    }

    /// Create the level's log from the schema template if it does not exist.
    pub fn ensure_initialized(&self, level: u32) -> Result<()> {
        let path = self.level_path(level);
        if path.exists() {
            return Ok(());
        }

        // create_new keeps a concurrent creator from truncating the file.
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(SCHEMA_TEMPLATE.as_bytes())
                    .and_then(|_| file.sync_all())
                    .with_context(|| format!("Failed to write template to {}", path.display()))?;
                info!(level, path = %path.display(), "Initialized level dataset");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to create {}", path.display())),
        }
    }

    /// Append one labeled record.
    pub fn append(&self, level: u32, record: &ShotRecord) -> Result<()> {
        if !record.label.is_resolved() {
            bail!("refusing to persist an unlabeled record for level {level}");
        }
        self.ensure_initialized(level)?;
        self.append_line(&self.level_path(level), &record.to_line())?;
        debug!(level, record = %record.to_line(), "Appended shot record");
        Ok(())
    }

    /// Append a blank separator marking the end of a level attempt.
    pub fn mark_level_boundary(&self, level: u32) -> Result<()> {
        self.ensure_initialized(level)?;
        self.append_line(&self.level_path(level), "")?;
        debug!(level, "Appended level boundary");
        Ok(())
    }

    /// Read the level's full log. A missing log is an empty dataset.
    pub fn snapshot(&self, level: u32) -> Result<Dataset> {
        let path = self.level_path(level);
        if !path.exists() {
            return Ok(Dataset::default());
        }
        read_dataset(&path)
    }

    /// Copy the level's log to a private scratch file, append `candidate`
    /// with the `?` label, and read the result back.
    ///
    /// The scratch file is removed afterwards; a failed removal is logged and
    /// otherwise ignored. The level log itself is never touched.
    pub fn scratch_with_candidate(&self, level: u32, candidate: &ShotRecord) -> Result<Dataset> {
        self.ensure_initialized(level)?;

        let scratch = self
            .scratch_dir
            .join(format!("level{level}-{}.scratch", Uuid::new_v4()));
        fs::copy(self.level_path(level), &scratch).with_context(|| {
            format!("Failed to copy level {level} dataset to {}", scratch.display())
        })?;

        let unlabeled = candidate.with_label(super::types::Label::Unlabeled);
        let result = self
            .append_line(&scratch, &unlabeled.to_line())
            .and_then(|_| read_dataset(&scratch));

        if let Err(e) = fs::remove_file(&scratch) {
            warn!(path = %scratch.display(), error = %e, "Unable to remove scratch dataset");
        }

        result
    }

    /// Levels that have a log, in ascending order.
    pub fn levels(&self) -> Result<Vec<u32>> {
        let mut levels = Vec::new();
        let dir = fs::read_dir(&self.data_dir)
            .with_context(|| format!("Failed to list {}", self.data_dir.display()))?;
        for entry in dir {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(level) = name
                .strip_prefix("level")
                .and_then(|rest| rest.strip_suffix(".data"))
                .and_then(|n| n.parse::<u32>().ok())
            {
                levels.push(level);
            }
        }
        levels.sort_unstable();
        Ok(levels)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Write `line` plus a newline in a single call, then flush to disk.
    ///
    /// A torn final line left by an interrupted write is cut off first, so
    /// the new line never lands on the end of a partial one.
    fn append_line(&self, path: &Path, line: &str) -> Result<()> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open {} for append", path.display()))?;
        truncate_torn_tail(&mut file, path)?;
        file.write_all(buf.as_bytes())
            .and_then(|_| file.flush())
            .and_then(|_| file.sync_data())
            .with_context(|| format!("Failed to append to {}", path.display()))?;
        Ok(())
    }
}

/// Drop everything after the last newline. Returns the bytes removed.
fn truncate_torn_tail(file: &mut File, path: &Path) -> Result<u64> {
    let len = file
        .metadata()
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    if len == 0 {
        return Ok(0);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))
        .and_then(|_| file.read_exact(&mut last))
        .with_context(|| format!("Failed to read the tail of {}", path.display()))?;
    if last[0] == b'\n' {
        return Ok(0);
    }

    let mut contents = Vec::with_capacity(len as usize);
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_to_end(&mut contents))
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let keep = contents
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |pos| pos as u64 + 1);
    file.set_len(keep)
        .with_context(|| format!("Failed to truncate {}", path.display()))?;

    let removed = len - keep;
    warn!(
        path = %path.display(),
        removed,
        tail = %String::from_utf8_lossy(&contents[keep as usize..]),
        "Dropped torn final line before appending"
    );
    Ok(removed)
}

fn read_dataset(path: &Path) -> Result<Dataset> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset {}", path.display()))?;
    Dataset::parse(&text).with_context(|| format!("Failed to parse dataset {}", path.display()))
}
