//! Schemas, field validators and validation outcomes.

pub use trellis_validation::*;
