//! crates/readers_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or mail relays.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{
    Collection, CollectionFilter, Feedback, FeedbackNotice, NewCollection, NewFeedback,
    NewWorkbook, User, UserCredentials, Visibility, Workbook,
};
use crate::validation::FieldErrors;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, file system).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl From<FieldErrors> for PortError {
    fn from(errors: FieldErrors) -> Self {
        PortError::Validation(errors)
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Reported when a collection's version triple is already taken.
pub const COLLECTION_NOT_UNIQUE: &str =
    "The fields major_version, minor_version, localization must make a unique set.";

/// Reported when a collection already holds a workbook with that number.
pub const WORKBOOK_NOT_UNIQUE: &str = "The fields number, collection must make a unique set.";

/// Message for a reference to a row that does not exist.
pub fn invalid_pk(id: i64) -> String {
    format!("Invalid pk \"{}\" - object does not exist.", id)
}

//=========================================================================================
// Repository Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait CollectionRepository: Send + Sync {
    /// Inserts a new, unreleased collection.
    ///
    /// A taken version triple fails with a `Validation` error carrying
    /// [`COLLECTION_NOT_UNIQUE`] under `non_field_errors`.
    async fn insert_collection(&self, new: &NewCollection) -> PortResult<Collection>;

    async fn get_collection(&self, id: i64, visibility: Visibility) -> PortResult<Collection>;

    /// Lists matching collections, newest version first, then by localization.
    async fn list_collections(
        &self,
        filter: &CollectionFilter,
        visibility: Visibility,
    ) -> PortResult<Vec<Collection>>;

    async fn collection_exists(
        &self,
        major_version: i32,
        minor_version: i32,
        localization: &str,
    ) -> PortResult<bool>;

    async fn set_released(&self, id: i64, released: bool) -> PortResult<Collection>;

    /// Deletes the collection together with its workbooks and their feedback.
    /// Returns the PDF paths of exactly the workbook rows that were removed;
    /// stored files are not touched.
    async fn delete_collection(&self, id: i64) -> PortResult<Vec<String>>;
}

#[async_trait]
pub trait WorkbookRepository: Send + Sync {
    /// Inserts a workbook.
    ///
    /// A taken `(number, collection)` pair fails with [`WORKBOOK_NOT_UNIQUE`];
    /// an unknown collection fails with an invalid-pk error on `collection`.
    async fn insert_workbook(&self, new: &NewWorkbook) -> PortResult<Workbook>;

    /// Looks up a workbook; `Visibility::Public` hides unreleased collections.
    async fn get_workbook(&self, id: i64, visibility: Visibility) -> PortResult<Workbook>;

    /// Lists the workbooks of a collection ordered by number.
    async fn list_workbooks(&self, collection_id: i64) -> PortResult<Vec<Workbook>>;

    /// Deletes the workbook row and its feedback. Stored files are not touched.
    async fn delete_workbook(&self, id: i64) -> PortResult<()>;
}

#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    async fn insert_feedback(&self, new: &NewFeedback) -> PortResult<Feedback>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn create_user(&self, username: &str, password_hash: &str) -> PortResult<User>;

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials>;

    /// Returns the user's token, storing `candidate` first if they have none.
    async fn get_or_create_token(&self, user_id: i64, candidate: &str) -> PortResult<String>;

    /// Resolves a token key to its user, or `NotFound`.
    async fn user_for_token(&self, key: &str) -> PortResult<User>;

    async fn delete_tokens(&self, user_id: i64) -> PortResult<()>;
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Stores a file and returns its storage path. The path is unique even
    /// when `file_name` repeats.
    async fn save(&self, file_name: &str, data: Bytes) -> PortResult<String>;

    /// Removes a stored file. A file that is already gone is not an error.
    async fn delete(&self, path: &str) -> PortResult<()>;

    /// The public URL a stored path is served under.
    fn url(&self, path: &str) -> String;
}

#[async_trait]
pub trait FeedbackNotifier: Send + Sync {
    /// Delivers a notification about newly submitted feedback.
    async fn notify(&self, notice: &FeedbackNotice) -> PortResult<()>;
}
