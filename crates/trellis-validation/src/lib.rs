//! # trellis-validation
//!
//! Input validation for controller methods.
//!
//! A *validation intent* is any schema object. The [`ValidatorRegistry`]
//! knows, per schema type, the function validating parameters against it.
//! A validator either returns the cleaned parameters or fails; failures of a
//! registered type are *exploded* into per-field errors and the values to
//! redisplay, giving an [`Outcome::Invalid`] the pipeline branches on.
//!
//! Shipped schemas:
//!
//! - [`Fields`]: a mapping of parameter names to [`fields`] validators
//! - [`fields::Nested`]: a field validated by a nested [`Fields`] schema
//! - [`Widget`]: any object implementing [`Validate`]
//! - [`ValidateWith`]: a closure over the parameters

pub mod error;
pub mod fields;
pub mod registry;
pub mod schema;

pub use error::{BoxError, FieldError, ValidationError};
pub use fields::{Field, FieldValidator};
pub use registry::{Explosion, Outcome, SchemaRef, ValidatorRegistry};
pub use schema::{Fields, Validate, ValidateWith, Widget};
