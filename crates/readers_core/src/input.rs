//! crates/readers_core/src/input.rs
//!
//! Turns loosely typed request input (JSON bodies, query strings, multipart
//! text fields) into the typed inputs of the catalog, collecting a
//! [`FieldErrors`] entry for every field that does not fit.

use crate::domain::{CollectionFilter, NewCollection, NewFeedback, LOCALIZATION_MAX_LEN};
use crate::validation::FieldErrors;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::LazyLock;

pub const REQUIRED: &str = "This field is required.";
pub const NOT_NULL: &str = "This field may not be null.";
pub const NOT_BLANK: &str = "This field may not be blank.";
pub const INVALID_INT: &str = "A valid integer is required.";
pub const INVALID_STRING: &str = "Not a valid string.";
pub const INVALID_BOOL: &str = "Must be a valid boolean.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";

/// The name a JSON value's type goes by in error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Message for a value that should have been an object.
pub fn expected_object(value: &Value) -> String {
    format!(
        "Invalid data. Expected a dictionary, but got {}.",
        json_type_name(value)
    )
}

/// Message for a value that should have been a list.
pub fn expected_list(value: &Value) -> String {
    format!(
        "Expected a list of items but got type \"{}\".",
        json_type_name(value)
    )
}

/// Parses an integer from a JSON number or a numeric string.
pub fn int_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| f as i64)
        }),
        Value::String(s) => int_from_str(s),
        _ => None,
    }
}

/// Parses an integer from text, tolerating surrounding whitespace.
pub fn int_from_str(text: &str) -> Option<i64> {
    text.trim().parse::<i64>().ok()
}

/// Parses the boolean spellings accepted in query strings and forms.
pub fn bool_from_str(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s.]+$").expect("email pattern compiles")
});

/// Checks the general shape of an email address.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// A cursor over a JSON object that records errors as fields are read.
pub struct ObjectFields<'a> {
    object: &'a Map<String, Value>,
    errors: FieldErrors,
}

impl<'a> ObjectFields<'a> {
    /// Starts reading `body`, which must be a JSON object.
    pub fn new(body: &'a Value) -> Result<Self, FieldErrors> {
        match body {
            Value::Object(object) => Ok(Self {
                object,
                errors: FieldErrors::new(),
            }),
            other => Err(FieldErrors::non_field(expected_object(other))),
        }
    }

    fn present(&mut self, field: &str) -> Option<&'a Value> {
        match self.object.get(field) {
            None => None,
            Some(Value::Null) => {
                self.errors.add(field, NOT_NULL);
                None
            }
            Some(value) => Some(value),
        }
    }

    fn int(&mut self, field: &str, value: &Value) -> Option<i32> {
        match int_from_value(value).and_then(|v| i32::try_from(v).ok()) {
            Some(v) => Some(v),
            None => {
                self.errors.add(field, INVALID_INT);
                None
            }
        }
    }

    fn string(&mut self, field: &str, value: &Value) -> Option<String> {
        match value {
            Value::String(s) if s.trim().is_empty() => {
                self.errors.add(field, NOT_BLANK);
                None
            }
            Value::String(s) => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => {
                self.errors.add(field, INVALID_STRING);
                None
            }
        }
    }

    pub fn required_int(&mut self, field: &str) -> Option<i32> {
        if !self.object.contains_key(field) {
            self.errors.add(field, REQUIRED);
            return None;
        }
        let value = self.present(field)?;
        self.int(field, value)
    }

    pub fn required_id(&mut self, field: &str) -> Option<i64> {
        if !self.object.contains_key(field) {
            self.errors.add(field, REQUIRED);
            return None;
        }
        let value = self.present(field)?;
        match int_from_value(value) {
            Some(v) => Some(v),
            None => {
                self.errors.add(field, "Incorrect type. Expected pk value.");
                None
            }
        }
    }

    pub fn int_or(&mut self, field: &str, default: i32) -> Option<i32> {
        if !self.object.contains_key(field) {
            return Some(default);
        }
        let value = self.present(field)?;
        self.int(field, value)
    }

    pub fn required_string(&mut self, field: &str) -> Option<String> {
        if !self.object.contains_key(field) {
            self.errors.add(field, REQUIRED);
            return None;
        }
        let value = self.present(field)?;
        self.string(field, value)
    }

    /// Like `required_string`, but keeps surrounding whitespace; only the
    /// empty string counts as blank.
    pub fn required_raw_string(&mut self, field: &str) -> Option<String> {
        if !self.object.contains_key(field) {
            self.errors.add(field, REQUIRED);
            return None;
        }
        match self.present(field)? {
            Value::String(s) if s.is_empty() => {
                self.errors.add(field, NOT_BLANK);
                None
            }
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => {
                self.errors.add(field, INVALID_STRING);
                None
            }
        }
    }

    pub fn string_or(&mut self, field: &str, default: &str) -> Option<String> {
        if !self.object.contains_key(field) {
            return Some(default.to_string());
        }
        let value = self.present(field)?;
        self.string(field, value)
    }

    /// Any JSON value; `null` and absence both read as `None`.
    pub fn optional_any(&self, field: &str) -> Option<Value> {
        self.object.get(field).filter(|v| !v.is_null()).cloned()
    }

    /// Records an extra error discovered by the caller.
    pub fn reject(&mut self, field: &str, message: impl Into<String>) {
        self.errors.add(field, message);
    }

    pub fn finish(self) -> Result<(), FieldErrors> {
        self.errors.into_result()
    }
}

/// Checks the length bound of a localization tag.
pub fn check_localization(fields: &mut ObjectFields<'_>, localization: &Option<String>) {
    if let Some(localization) = localization {
        if localization.chars().count() > LOCALIZATION_MAX_LEN {
            fields.reject(
                "localization",
                format!(
                    "Ensure this field has no more than {} characters.",
                    LOCALIZATION_MAX_LEN
                ),
            );
        }
    }
}

/// Reads the body of a create-collection request.
pub fn parse_new_collection(body: &Value) -> Result<NewCollection, FieldErrors> {
    let mut fields = ObjectFields::new(body)?;
    let major_version = fields.required_int("major_version");
    let minor_version = fields.required_int("minor_version");
    let localization = fields.required_string("localization");
    check_localization(&mut fields, &localization);
    fields.finish()?;

    match (major_version, minor_version, localization) {
        (Some(major_version), Some(minor_version), Some(localization)) => Ok(NewCollection {
            major_version,
            minor_version,
            localization,
        }),
        _ => Err(FieldErrors::non_field("Invalid collection data.")),
    }
}

/// Reads the body of a feedback submission.
///
/// Absent fields fall back to the stored defaults: page and chapter `0`,
/// version `1.0`, localization `en-US`.
pub fn parse_new_feedback(body: &Value) -> Result<NewFeedback, FieldErrors> {
    let mut fields = ObjectFields::new(body)?;
    let workbook = fields.required_id("workbook");
    let page_number = fields.int_or("page_number", 0);
    let chapter_number = fields.int_or("chapter_number", 0);
    let description = fields.required_string("description");
    let user_email = fields.required_string("user_email");
    if let Some(email) = &user_email {
        if !is_valid_email(email) {
            fields.reject("user_email", INVALID_EMAIL);
        }
    }
    let major_version = fields.int_or("major_version", 1);
    let minor_version = fields.int_or("minor_version", 0);
    let localization = fields.string_or("localization", "en-US");
    check_localization(&mut fields, &localization);
    let logs = fields.optional_any("logs");
    fields.finish()?;

    match (
        workbook,
        page_number,
        chapter_number,
        description,
        user_email,
        major_version,
        minor_version,
        localization,
    ) {
        (
            Some(workbook),
            Some(page_number),
            Some(chapter_number),
            Some(description),
            Some(user_email),
            Some(major_version),
            Some(minor_version),
            Some(localization),
        ) => Ok(NewFeedback {
            workbook,
            page_number,
            chapter_number,
            description,
            user_email,
            major_version,
            minor_version,
            localization,
            logs,
        }),
        _ => Err(FieldErrors::non_field("Invalid feedback data.")),
    }
}

/// Reads the collection filters from query parameters.
///
/// Unknown parameters are ignored; known ones must parse, and an empty
/// value means "no filter".
pub fn parse_collection_filter(
    params: &HashMap<String, String>,
) -> Result<CollectionFilter, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut filter = CollectionFilter::default();

    let present = |key: &str| params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());

    if let Some(raw) = present("major_version") {
        match int_from_str(raw).and_then(|v| i32::try_from(v).ok()) {
            Some(v) => filter.major_version = Some(v),
            None => errors.add("major_version", INVALID_INT),
        }
    }
    if let Some(raw) = present("minor_version") {
        match int_from_str(raw).and_then(|v| i32::try_from(v).ok()) {
            Some(v) => filter.minor_version = Some(v),
            None => errors.add("minor_version", INVALID_INT),
        }
    }
    if let Some(raw) = present("localization") {
        filter.localization = Some(raw.to_string());
    }
    if let Some(raw) = present("is_released") {
        match bool_from_str(raw) {
            Some(v) => filter.is_released = Some(v),
            None => errors.add("is_released", INVALID_BOOL),
        }
    }

    errors.into_result()?;
    Ok(filter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_strings_keep_surrounding_whitespace() {
        let body = json!({"password": "  padded pass  ", "spaces": "   ", "empty": ""});
        let mut fields = ObjectFields::new(&body).unwrap();
        assert_eq!(
            fields.required_raw_string("password").as_deref(),
            Some("  padded pass  ")
        );
        assert_eq!(fields.required_raw_string("spaces").as_deref(), Some("   "));
        assert_eq!(fields.required_raw_string("empty"), None);
        let errors = fields.finish().unwrap_err();
        assert_eq!(errors.messages_at(&["empty"]).unwrap(), [NOT_BLANK]);
    }

    #[test]
    fn collection_body_accepts_numbers_and_numeric_strings() {
        let parsed = parse_new_collection(&json!({
            "major_version": 1,
            "minor_version": "2",
            "localization": "en-US"
        }))
        .unwrap();
        assert_eq!(parsed.major_version, 1);
        assert_eq!(parsed.minor_version, 2);
        assert_eq!(parsed.localization, "en-US");
    }

    #[test]
    fn collection_body_reports_every_bad_field() {
        let errors = parse_new_collection(&json!({
            "major_version": "one",
            "localization": "en-US-long"
        }))
        .unwrap_err();

        assert_eq!(errors.messages_at(&["major_version"]).unwrap(), [INVALID_INT]);
        assert_eq!(errors.messages_at(&["minor_version"]).unwrap(), [REQUIRED]);
        assert_eq!(
            errors.messages_at(&["localization"]).unwrap(),
            ["Ensure this field has no more than 5 characters."]
        );
    }

    #[test]
    fn collection_body_must_be_an_object() {
        let errors = parse_new_collection(&json!([1, 2])).unwrap_err();
        assert_eq!(
            errors.messages_at(&["non_field_errors"]).unwrap(),
            ["Invalid data. Expected a dictionary, but got list."]
        );
    }

    #[test]
    fn feedback_defaults_and_logs() {
        let parsed = parse_new_feedback(&json!({
            "workbook": 3,
            "description": "Typo on the second line",
            "user_email": "reader@example.org",
            "logs": {"device": "tablet"}
        }))
        .unwrap();

        assert_eq!(parsed.workbook, 3);
        assert_eq!(parsed.page_number, 0);
        assert_eq!(parsed.major_version, 1);
        assert_eq!(parsed.minor_version, 0);
        assert_eq!(parsed.localization, "en-US");
        assert_eq!(parsed.logs, Some(json!({"device": "tablet"})));
    }

    #[test]
    fn feedback_rejects_bad_email_and_blank_description() {
        let errors = parse_new_feedback(&json!({
            "workbook": 3,
            "description": "  ",
            "user_email": "not-an-email"
        }))
        .unwrap_err();

        assert_eq!(errors.messages_at(&["description"]).unwrap(), [NOT_BLANK]);
        assert_eq!(errors.messages_at(&["user_email"]).unwrap(), [INVALID_EMAIL]);
    }

    #[test]
    fn filter_parses_and_rejects() {
        let mut params = HashMap::new();
        params.insert("major_version".to_string(), "2".to_string());
        params.insert("localization".to_string(), "fr-FR".to_string());
        params.insert("is_released".to_string(), "True".to_string());
        params.insert("minor_version".to_string(), "".to_string());

        let filter = parse_collection_filter(&params).unwrap();
        assert_eq!(filter.major_version, Some(2));
        assert_eq!(filter.minor_version, None);
        assert_eq!(filter.localization.as_deref(), Some("fr-FR"));
        assert_eq!(filter.is_released, Some(true));

        params.insert("minor_version".to_string(), "x".to_string());
        params.insert("is_released".to_string(), "maybe".to_string());
        let errors = parse_collection_filter(&params).unwrap_err();
        assert_eq!(errors.messages_at(&["minor_version"]).unwrap(), [INVALID_INT]);
        assert_eq!(errors.messages_at(&["is_released"]).unwrap(), [INVALID_BOOL]);
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a b@c.de"));
        assert!(!is_valid_email("a@@c.de"));
    }
}
