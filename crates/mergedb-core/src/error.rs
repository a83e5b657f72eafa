//! Error types for the core crate.

use thiserror::Error;

use crate::types::Value;

/// Values longer than this are cut short in error messages.
const MAX_VALUE_DISPLAY_LEN: usize = 100;

/// Errors raised while comparing or converting values.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Two values of incomparable type classes were compared.
    #[error("type mismatch: cannot compare {left} with {right} (value: {value})")]
    TypeMismatch {
        /// Type name of the left operand.
        left: &'static str,
        /// Type name of the right operand.
        right: &'static str,
        /// The right operand, truncated for display.
        value: String,
    },
}

impl CoreError {
    /// Creates a type mismatch between two values.
    #[must_use]
    pub fn incomparable(left: &Value, right: &Value) -> Self {
        Self::TypeMismatch {
            left: left.type_name(),
            right: right.type_name(),
            value: truncate(right.to_string()),
        }
    }
}

fn truncate(mut text: String) -> String {
    if text.len() <= MAX_VALUE_DISPLAY_LEN {
        return text;
    }
    let mut end = MAX_VALUE_DISPLAY_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    text.push_str("...");
    text
}
