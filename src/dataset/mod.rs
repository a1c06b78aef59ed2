//! Persistent shot-quality data.
//!
//! This module provides:
//! - [`types::ShotRecord`], [`types::Label`] -- one labeled shot.
//! - [`types::Dataset`] -- the ordered, read-only view of a level's log.
//! - [`store::DatasetStore`] -- the per-level append-only log files.

pub mod store;
pub mod types;

pub use store::DatasetStore;
pub use types::{Dataset, DatasetEntry, Label, ShotRecord};
