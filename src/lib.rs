//! Slingshot shot-quality agent.
//!
//! Plans slingshot shots, gates each candidate through a naive Bayes
//! classifier retrained on the level's shot history, fires accepted shots,
//! labels their outcome and appends the result to a per-level dataset.

pub mod classifier;
pub mod config;
pub mod dataset;
pub mod env;
pub mod evaluation;
pub mod planner;
pub mod runner;
