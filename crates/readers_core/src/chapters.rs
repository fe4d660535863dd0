//! crates/readers_core/src/chapters.rs
//!
//! Structural validation of a workbook's chapter document.
//!
//! The document is a non-empty list of chapters:
//!
//! ```json
//! [{
//!   "requires": ["atom"],
//!   "title": "Atomic and Molecular Mass",
//!   "id": "atomic_mass",
//!   "chap_num": 3,
//!   "start_page": 15,
//!   "covers": [{
//!     "id": "mole",
//!     "desc": "Define a mole",
//!     "videos": [{ "link": "https://...", "title": "..." }],
//!     "references": [{ "link": "https://...", "title": "..." }]
//!   }]
//! }]
//! ```
//!
//! Unknown keys are rejected at every level. Errors are reported by field
//! path without list indices, so a missing `desc` on any cover of any
//! chapter lands under `covers.desc`.

use crate::input::{expected_list, expected_object, INVALID_INT, INVALID_STRING, NOT_BLANK, NOT_NULL, REQUIRED};
use crate::validation::FieldErrors;
use serde_json::{Map, Value};

const CHAPTER_FIELDS: &[&str] = &["requires", "title", "id", "chap_num", "start_page", "covers"];
const COVER_FIELDS: &[&str] = &["id", "desc", "videos", "references"];
const LINK_FIELDS: &[&str] = &["link", "title"];

const NOT_ALLOWED: &str = "This field is not allowed.";
const EMPTY_LIST: &str = "This list may not be empty.";

/// The kinds of value a schema field can require.
#[derive(Clone, Copy)]
enum Kind {
    NonEmptyString,
    Integer,
    StringList,
}

/// Validates a decoded chapters payload and hands it back unchanged.
///
/// Every violation is collected; the returned errors are relative to the
/// chapters field itself (e.g. `title`, `covers.desc`).
pub fn validate_chapters(payload: Value) -> Result<Value, FieldErrors> {
    let mut errors = FieldErrors::new();

    match &payload {
        Value::Array(chapters) if chapters.is_empty() => {
            errors.add_at(&[], EMPTY_LIST);
        }
        Value::Array(chapters) => {
            for chapter in chapters {
                check_chapter(chapter, &mut errors);
            }
        }
        other => errors.add_at(&[], expected_list(other)),
    }

    errors.into_result()?;
    Ok(payload)
}

fn check_chapter(chapter: &Value, errors: &mut FieldErrors) {
    let Some(object) = as_object(chapter, &[], errors) else {
        return;
    };

    reject_unknown(object, CHAPTER_FIELDS, &[], errors);
    check_field(object, "title", Kind::NonEmptyString, true, &[], errors);
    check_field(object, "id", Kind::NonEmptyString, true, &[], errors);
    check_field(object, "chap_num", Kind::Integer, true, &[], errors);
    check_field(object, "start_page", Kind::Integer, true, &[], errors);
    check_field(object, "requires", Kind::StringList, false, &[], errors);

    if let Some(covers) = object.get("covers") {
        for cover in as_list(covers, &["covers"], errors) {
            check_cover(cover, errors);
        }
    }
}

fn check_cover(cover: &Value, errors: &mut FieldErrors) {
    let path = ["covers"];
    let Some(object) = as_object(cover, &path, errors) else {
        return;
    };

    reject_unknown(object, COVER_FIELDS, &path, errors);
    check_field(object, "id", Kind::NonEmptyString, true, &path, errors);
    check_field(object, "desc", Kind::NonEmptyString, true, &path, errors);

    for key in ["videos", "references"] {
        if let Some(links) = object.get(key) {
            let link_path = ["covers", key];
            for link in as_list(links, &link_path, errors) {
                check_link(link, &link_path, errors);
            }
        }
    }
}

fn check_link(link: &Value, path: &[&str], errors: &mut FieldErrors) {
    let Some(object) = as_object(link, path, errors) else {
        return;
    };

    reject_unknown(object, LINK_FIELDS, path, errors);
    check_field(object, "link", Kind::NonEmptyString, true, path, errors);
    check_field(object, "title", Kind::NonEmptyString, true, path, errors);
}

fn as_object<'v>(
    value: &'v Value,
    path: &[&str],
    errors: &mut FieldErrors,
) -> Option<&'v Map<String, Value>> {
    match value {
        Value::Object(object) => Some(object),
        other => {
            errors.add_at(path, expected_object(other));
            None
        }
    }
}

fn as_list<'v>(value: &'v Value, path: &[&str], errors: &mut FieldErrors) -> &'v [Value] {
    match value {
        Value::Array(items) => items,
        other => {
            errors.add_at(path, expected_list(other));
            &[]
        }
    }
}

fn reject_unknown(
    object: &Map<String, Value>,
    allowed: &[&str],
    path: &[&str],
    errors: &mut FieldErrors,
) {
    for key in object.keys() {
        if !allowed.contains(&key.as_str()) {
            errors.add_at(&with(path, key), NOT_ALLOWED);
        }
    }
}

fn check_field(
    object: &Map<String, Value>,
    field: &str,
    kind: Kind,
    required: bool,
    path: &[&str],
    errors: &mut FieldErrors,
) {
    let at = with(path, field);
    let Some(value) = object.get(field) else {
        if required {
            errors.add_at(&at, REQUIRED);
        }
        return;
    };

    match (kind, value) {
        (_, Value::Null) => errors.add_at(&at, NOT_NULL),
        (Kind::NonEmptyString, Value::String(s)) if s.trim().is_empty() => {
            errors.add_at(&at, NOT_BLANK)
        }
        (Kind::NonEmptyString, Value::String(_)) => {}
        (Kind::NonEmptyString, _) => errors.add_at(&at, INVALID_STRING),
        (Kind::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => {}
        (Kind::Integer, _) => errors.add_at(&at, INVALID_INT),
        (Kind::StringList, Value::Array(items)) => {
            if items.iter().any(|item| !item.is_string()) {
                errors.add_at(&at, INVALID_STRING);
            }
        }
        (Kind::StringList, other) => errors.add_at(&at, expected_list(other)),
    }
}

fn with<'p>(path: &[&'p str], field: &'p str) -> Vec<&'p str> {
    let mut full = path.to_vec();
    full.push(field);
    full
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn good_chapters() -> Value {
        json!([
            {
                "requires": [],
                "title": "Introduction to the Kontinua Sequence",
                "id": "introduction",
                "chap_num": 1,
                "covers": [{
                    "id": "kont_intro",
                    "desc": "Introduction to Kontinua",
                    "videos": [{"link": "https://youtu.be/CuV_jd1PD3M", "title": "Director's Cut"}],
                    "references": [{"link": "https://kontinua.org/", "title": "Kontinua"}]
                }],
                "start_page": 3
            },
            {
                "requires": ["atom"],
                "title": "Atomic and Molecular Mass",
                "id": "atomic_mass",
                "chap_num": 3,
                "covers": [],
                "start_page": 15
            }
        ])
    }

    #[test]
    fn valid_document_is_returned_unchanged() {
        let payload = good_chapters();
        assert_eq!(validate_chapters(payload.clone()).unwrap(), payload);
    }

    #[test]
    fn rejects_non_list_and_empty_list() {
        let errors = validate_chapters(json!({})).unwrap_err();
        assert_eq!(
            errors.messages_at(&["non_field_errors"]).unwrap(),
            ["Expected a list of items but got type \"dict\"."]
        );

        let errors = validate_chapters(json!([])).unwrap_err();
        assert_eq!(errors.messages_at(&["non_field_errors"]).unwrap(), [EMPTY_LIST]);
    }

    #[test]
    fn missing_title_is_reported_at_title() {
        let mut payload = good_chapters();
        payload[1].as_object_mut().unwrap().remove("title");

        let errors = validate_chapters(payload).unwrap_err();
        assert_eq!(errors.messages_at(&["title"]).unwrap(), [REQUIRED]);
    }

    #[test]
    fn empty_or_null_essential_fields_are_rejected() {
        for (field, value) in [
            ("title", json!("")),
            ("id", json!("")),
            ("chap_num", json!(null)),
            ("start_page", json!(null)),
        ] {
            let mut payload = good_chapters();
            payload[0][field] = value;
            let errors = validate_chapters(payload).unwrap_err();
            assert!(errors.at(&[field]).is_some(), "expected an error for {field}");
        }
    }

    #[test]
    fn cover_missing_desc_is_reported_under_covers() {
        let mut payload = good_chapters();
        payload[0]["covers"][0].as_object_mut().unwrap().remove("desc");

        let errors = validate_chapters(payload).unwrap_err();
        assert_eq!(errors.messages_at(&["covers", "desc"]).unwrap(), [REQUIRED]);
    }

    #[test]
    fn cover_with_blank_id_is_rejected() {
        let mut payload = good_chapters();
        payload[0]["covers"][0]["id"] = json!("");

        let errors = validate_chapters(payload).unwrap_err();
        assert_eq!(errors.messages_at(&["covers", "id"]).unwrap(), [NOT_BLANK]);
    }

    #[test]
    fn covers_must_be_a_list() {
        let mut payload = good_chapters();
        payload[1]["covers"] = json!({});

        let errors = validate_chapters(payload).unwrap_err();
        assert!(errors.messages_at(&["covers"]).is_some());
    }

    #[test]
    fn unknown_properties_are_rejected_at_every_level() {
        let mut payload = good_chapters();
        payload[0]["book"] = json!("01");
        payload[0]["covers"][0]["extra"] = json!(true);
        payload[0]["covers"][0]["videos"][0]["duration"] = json!(12);

        let errors = validate_chapters(payload).unwrap_err();
        assert_eq!(errors.messages_at(&["book"]).unwrap(), [NOT_ALLOWED]);
        assert_eq!(errors.messages_at(&["covers", "extra"]).unwrap(), [NOT_ALLOWED]);
        assert_eq!(
            errors.messages_at(&["covers", "videos", "duration"]).unwrap(),
            [NOT_ALLOWED]
        );
    }

    #[test]
    fn links_need_link_and_title() {
        let mut payload = good_chapters();
        payload[0]["covers"][0]["references"][0]
            .as_object_mut()
            .unwrap()
            .remove("link");

        let errors = validate_chapters(payload).unwrap_err();
        assert_eq!(
            errors.messages_at(&["covers", "references", "link"]).unwrap(),
            [REQUIRED]
        );
    }
}
