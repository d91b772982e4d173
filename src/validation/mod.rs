//! Validation of generated data before it reaches the platform.
//!
//! Model output is untrusted; [`SchemaValidator::check`] is the boundary it
//! must pass before the seeding path accepts it.

pub mod schema_validator;

pub use schema_validator::{SchemaValidationResult, SchemaValidator, DEFAULT_RATING_RANGE};
