//! Online shot-quality classification.
//!
//! A fresh [`NaiveBayesModel`] is trained on the level's history for every
//! candidate, and [`gate::QualityGate`] turns its prediction into an
//! execute / reject / force-fallback decision.

pub mod gate;
pub mod naive_bayes;

pub use gate::{decide, ExecuteReason, GateDecision, GateOutcome, QualityGate};
pub use naive_bayes::NaiveBayesModel;
