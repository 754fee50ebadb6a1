//! Persistent per-learner knowledge model.
//!
//! For every concept a learner touches this tracks a Bayesian mastery
//! estimate, an SM-2 review schedule and recurring misconceptions, and rolls
//! them up per topic and subject. The core is synchronous and does no I/O:
//! callers load a [`LearnerProfile`], call
//! [`LearnerProfile::record_interaction`], query it, and persist it with
//! [`snapshot::serialize`]. One writer per learner at a time.

pub mod db;
pub mod engine;
pub mod error;
pub mod mastery;
pub mod misconception;
pub mod models;
pub mod query;
pub mod schedule;
pub mod snapshot;

pub use engine::Interaction;
pub use error::{Error, Result};
pub use models::{KnowledgeNode, LearnerProfile, Misconception, MisconceptionStatus, UpdateEvent};
