//! crates/readers_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database; they derive `Serialize`
//! because their JSON shape is the API's response shape.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Maximum length of a localization tag such as `en-US`.
pub const LOCALIZATION_MAX_LEN: usize = 5;

/// A versioned, localized release bundle of workbooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Collection {
    pub id: i64,
    pub major_version: i32,
    pub minor_version: i32,
    pub localization: String,
    pub is_released: bool,
    pub creation_date: DateTime<Utc>,
}

/// Input for creating a collection. Release state always starts `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCollection {
    pub major_version: i32,
    pub minor_version: i32,
    pub localization: String,
}

/// Who is looking at the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Anonymous callers: only released collections and their workbooks.
    Public,
    /// Authenticated callers: everything.
    All,
}

impl Visibility {
    pub fn released_only(self) -> bool {
        matches!(self, Visibility::Public)
    }
}

/// Exact-match filters applied to collection listings and latest lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionFilter {
    pub major_version: Option<i32>,
    pub minor_version: Option<i32>,
    pub localization: Option<String>,
    pub is_released: Option<bool>,
}

impl CollectionFilter {
    /// A filter matching every collection of one localization.
    pub fn localization(localization: &str) -> Self {
        Self {
            localization: Some(localization.to_string()),
            ..Self::default()
        }
    }

    /// Whether a collection passes both this filter and the visibility gate.
    pub fn matches(&self, collection: &Collection, visibility: Visibility) -> bool {
        if visibility.released_only() && !collection.is_released {
            return false;
        }
        self.major_version.map_or(true, |v| v == collection.major_version)
            && self.minor_version.map_or(true, |v| v == collection.minor_version)
            && self
                .localization
                .as_deref()
                .map_or(true, |l| l == collection.localization)
            && self.is_released.map_or(true, |r| r == collection.is_released)
    }
}

/// A numbered unit within a collection: a PDF plus chapter metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Workbook {
    pub id: i64,
    pub number: i32,
    pub collection: i64,
    pub chapters: Value,
    /// Storage path of the PDF, relative to the media root.
    pub pdf: String,
}

/// Input for creating a workbook. `pdf` is the already-stored path.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWorkbook {
    pub number: i32,
    pub collection: i64,
    pub chapters: Value,
    pub pdf: String,
}

/// A collection together with its workbooks, as returned by retrieve.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionDetail {
    pub collection: Collection,
    pub workbooks: Vec<Workbook>,
}

/// User-submitted feedback about a page of a workbook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    pub id: i64,
    pub workbook: i64,
    pub page_number: i32,
    pub chapter_number: i32,
    pub description: String,
    pub user_email: String,
    pub created_at: DateTime<Utc>,
    pub major_version: i32,
    pub minor_version: i32,
    pub localization: String,
    /// Free-form client diagnostics, stored as received.
    pub logs: Option<Value>,
}

/// Input for submitting feedback.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFeedback {
    pub workbook: i64,
    pub page_number: i32,
    pub chapter_number: i32,
    pub description: String,
    pub user_email: String,
    pub major_version: i32,
    pub minor_version: i32,
    pub localization: String,
    pub logs: Option<Value>,
}

/// The email-ready view of a feedback submission.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackNotice {
    pub feedback: Feedback,
    pub workbook_number: i32,
}

impl FeedbackNotice {
    pub fn subject(&self) -> String {
        format!(
            "User Feedback: Workbook {} (v{}.{} {})",
            self.workbook_number,
            self.feedback.major_version,
            self.feedback.minor_version,
            self.feedback.localization
        )
    }
}

// Represents an API user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
}

// Only used internally for token issuance - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}
