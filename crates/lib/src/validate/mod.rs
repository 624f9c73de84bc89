//! Payload validation for LINE WORKS message fields.
//!
//! Every validator works on raw `serde_json::Value`s so that wrong types are
//! reported with the field name instead of a generic deserialization error.
//! Validators stop at the first violated rule.

mod action;
mod primitives;
mod quick_reply;

pub use action::{validate_action, validate_action_object};
pub use primitives::{
    validate_image_url, validate_path_segment, validate_string_param, validate_url,
};
pub use quick_reply::validate_quick_reply;

use std::fmt;

/// A caller-supplied field violates its contract. The message names the field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    /// Prefix the message with the enclosing context (e.g. "column 2").
    pub fn context(self, prefix: impl fmt::Display) -> Self {
        Self(format!("{}: {}", prefix, self.0))
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}
