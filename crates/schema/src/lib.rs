//! Declared output shapes for model responses.
//!
//! Core principle: **the caller declares the shape once, and everything else
//! is derived from it.** A [`Schema`] produces the prompt fragment describing
//! the expected output ([`Schema::describe`]), the JSON Schema handed to
//! providers that accept native tool declarations ([`Schema::json_schema`]),
//! and the validator that turns raw model output into a conforming value
//! ([`Schema::validate`]).
//!
//! Validation is a pure function of the input and the declared schema. It
//! performs a small set of permitted coercions (numeric strings to numbers,
//! numbers to strings) so that near-miss model output still round-trips.

mod error;
mod schema;
mod validate;

pub use error::{FieldError, ValidationError};
pub use schema::{Constraints, Field, FieldType, Schema};
