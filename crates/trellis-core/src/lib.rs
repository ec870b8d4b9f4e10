//! # trellis-core
//!
//! Building blocks shared by every trellis crate:
//!
//! - [`exception`]: the framework error taxonomy and its HTTP status mapping
//! - [`dependencies`]: [`DependenciesList`], an ordered container resolving
//!   "first / last / after X" placement constraints
//! - [`milestones`]: one-shot latches that flush deferred registrations
//! - [`negotiation`]: media types, `Accept` parsing and best-match selection

pub mod dependencies;
pub mod exception;
pub mod milestones;
pub mod negotiation;

pub use dependencies::{DependenciesList, Position};
pub use exception::{Error, HttpError, Result};
pub use milestones::{Milestone, Milestones};
pub use negotiation::{AcceptHeader, MediaType};

/// Request and validation parameters: an ordered map of names to JSON values.
///
/// Repeated query keys are collected into arrays.
pub type Params = serde_json::Map<String, serde_json::Value>;
