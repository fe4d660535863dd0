//! crates/readers_core/src/validation.rs
//!
//! Field-scoped validation errors.
//!
//! Errors are kept as a tree keyed by field name so that nested payloads
//! (a chapter's covers, a cover's videos) report against a path such as
//! `chapters.covers.desc`. The tree serializes to the JSON body returned on
//! a 400 response:
//!
//! ```json
//! { "chapters": { "covers": { "desc": ["This field is required."] } } }
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Key used for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// A node in the error tree: either a list of messages for a leaf field or
/// a nested set of field errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldError {
    Messages(Vec<String>),
    Nested(FieldErrors),
}

/// A tree of validation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an error set holding one message for one field.
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Builds an error set holding one `non_field_errors` message.
    pub fn non_field(message: impl Into<String>) -> Self {
        Self::single(NON_FIELD_ERRORS, message)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Adds a message to a top-level field.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.add_at(&[field], message);
    }

    /// Adds a message at a nested path, creating intermediate nodes.
    ///
    /// When a path runs through a node that already holds plain messages,
    /// those messages move under `non_field_errors` of the new nested node.
    pub fn add_at(&mut self, path: &[&str], message: impl Into<String>) {
        let Some((head, rest)) = path.split_first() else {
            self.add(NON_FIELD_ERRORS, message);
            return;
        };

        if rest.is_empty() {
            match self
                .0
                .entry((*head).to_string())
                .or_insert_with(|| FieldError::Messages(Vec::new()))
            {
                FieldError::Messages(messages) => messages.push(message.into()),
                FieldError::Nested(nested) => nested.add(NON_FIELD_ERRORS, message),
            }
            return;
        }

        let node = self
            .0
            .entry((*head).to_string())
            .or_insert_with(|| FieldError::Nested(FieldErrors::new()));
        if let FieldError::Messages(messages) = node {
            let mut nested = FieldErrors::new();
            for existing in messages.drain(..) {
                nested.add(NON_FIELD_ERRORS, existing);
            }
            *node = FieldError::Nested(nested);
        }
        if let FieldError::Nested(nested) = node {
            nested.add_at(rest, message);
        }
    }

    /// Merges every message of `other` into this set under `field`.
    ///
    /// Top-level `non_field_errors` of `other` become messages of `field`
    /// itself.
    pub fn nest(&mut self, field: &str, other: FieldErrors) {
        for (path, message) in other.flatten() {
            if path.len() == 1 && path[0] == NON_FIELD_ERRORS {
                self.add(field, message);
                continue;
            }
            let mut full = vec![field];
            full.extend(path.iter().map(String::as_str));
            self.add_at(&full, message);
        }
    }

    /// Looks up the node at a path.
    pub fn at(&self, path: &[&str]) -> Option<&FieldError> {
        let (head, rest) = path.split_first()?;
        let node = self.0.get(*head)?;
        if rest.is_empty() {
            return Some(node);
        }
        match node {
            FieldError::Nested(nested) => nested.at(rest),
            FieldError::Messages(_) => None,
        }
    }

    /// Returns the leaf messages at a path, if the path ends in a leaf.
    pub fn messages_at(&self, path: &[&str]) -> Option<&[String]> {
        match self.at(path)? {
            FieldError::Messages(messages) => Some(messages),
            FieldError::Nested(_) => None,
        }
    }

    /// Lists every message with the path leading to it.
    pub fn flatten(&self) -> Vec<(Vec<String>, String)> {
        let mut out = Vec::new();
        for (field, node) in &self.0 {
            match node {
                FieldError::Messages(messages) => {
                    for message in messages {
                        out.push((vec![field.clone()], message.clone()));
                    }
                }
                FieldError::Nested(nested) => {
                    for (mut path, message) in nested.flatten() {
                        path.insert(0, field.clone());
                        out.push((path, message));
                    }
                }
            }
        }
        out
    }

    /// `Ok(())` when no errors were recorded, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .flatten()
            .into_iter()
            .map(|(path, message)| format!("{}: {}", path.join("."), message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_paths_serialize_as_a_tree() {
        let mut errors = FieldErrors::new();
        errors.add_at(&["chapters", "covers", "desc"], "This field is required.");
        errors.add_at(&["chapters", "title"], "This field may not be blank.");

        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            json!({
                "chapters": {
                    "covers": { "desc": ["This field is required."] },
                    "title": ["This field may not be blank."]
                }
            })
        );
    }

    #[test]
    fn leaf_messages_move_aside_when_a_path_nests_through_them() {
        let mut errors = FieldErrors::new();
        errors.add_at(&["chapters", "covers"], "Expected a list of items but got type \"dict\".");
        errors.add_at(&["chapters", "covers", "id"], "This field is required.");

        assert_eq!(
            errors.messages_at(&["chapters", "covers", NON_FIELD_ERRORS]).unwrap(),
            ["Expected a list of items but got type \"dict\"."]
        );
        assert!(errors.messages_at(&["chapters", "covers", "id"]).is_some());
    }

    #[test]
    fn display_joins_paths() {
        let mut errors = FieldErrors::single("minor_version", "Must be greater than 1 (latest: 1.1).");
        errors.nest("chapters", FieldErrors::single("id", "This field is required."));
        assert_eq!(
            errors.to_string(),
            "chapters.id: This field is required.; minor_version: Must be greater than 1 (latest: 1.1)."
        );
    }
}
