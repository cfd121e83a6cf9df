//! Validation error types.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single field-level violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Path of the offending field. `$` refers to the value as a whole.
    pub field: String,
    /// Human-readable description of the violation.
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Failed validation of a value against a [`Schema`](crate::Schema).
///
/// Carries every field-level violation found, not just the first, so the
/// whole list can be fed back to the model in one re-prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("validation failed: {}", render(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    /// A failure with a single root-level error.
    pub fn root(message: impl Into<String>) -> Self {
        Self {
            errors: vec![FieldError::new("$", message)],
        }
    }

    /// Bulleted rendering used inside re-prompt messages.
    pub fn bullet_list(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("- {e}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn render(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(FieldError::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_errors() {
        let err = ValidationError::new(vec![
            FieldError::new("age", "must be at least 0"),
            FieldError::new("name", "missing required field"),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: age: must be at least 0; name: missing required field"
        );
    }

    #[test]
    fn bullet_list_one_line_per_error() {
        let err = ValidationError::new(vec![
            FieldError::new("a", "x"),
            FieldError::new("b", "y"),
        ]);
        assert_eq!(err.bullet_list(), "- a: x\n- b: y");
    }
}
