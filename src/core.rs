//! Errors, milestones, ordered registrations and content negotiation.

pub use trellis_core::*;
