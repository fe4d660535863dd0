//! In-memory implementations of the repository and storage ports.
//!
//! Used by tests and local experiments. All tables live behind a single
//! `RwLock` so that the uniqueness checks and cascades are atomic, the way
//! a database transaction would make them.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use crate::domain::{
    Collection, CollectionFilter, Feedback, NewCollection, NewFeedback, NewWorkbook, User,
    UserCredentials, Visibility, Workbook,
};
use crate::ports::{
    invalid_pk, CollectionRepository, CredentialStore, FeedbackRepository, FileStorage,
    PortError, PortResult, WorkbookRepository, COLLECTION_NOT_UNIQUE, WORKBOOK_NOT_UNIQUE,
};
use crate::validation::FieldErrors;
use crate::versioning::sort_collections;

#[derive(Default)]
struct Tables {
    next_id: i64,
    collections: Vec<Collection>,
    workbooks: Vec<Workbook>,
    feedback: Vec<Feedback>,
    users: Vec<UserCredentials>,
    // token key -> user id
    tokens: HashMap<String, i64>,
}

impl Tables {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn is_visible(&self, workbook: &Workbook, visibility: Visibility) -> bool {
        !visibility.released_only()
            || self
                .collections
                .iter()
                .any(|c| c.id == workbook.collection && c.is_released)
    }
}

/// In-memory store for tests.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read(&self) -> PortResult<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| PortError::Unexpected("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> PortResult<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| PortError::Unexpected("in-memory store lock poisoned".to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn collection_not_found(id: i64) -> PortError {
    PortError::NotFound(format!("Collection {} not found", id))
}

fn workbook_not_found(id: i64) -> PortError {
    PortError::NotFound(format!("Workbook {} not found", id))
}

#[async_trait]
impl CollectionRepository for InMemoryStore {
    async fn insert_collection(&self, new: &NewCollection) -> PortResult<Collection> {
        let mut tables = self.write()?;
        let taken = tables.collections.iter().any(|c| {
            c.major_version == new.major_version
                && c.minor_version == new.minor_version
                && c.localization == new.localization
        });
        if taken {
            return Err(FieldErrors::non_field(COLLECTION_NOT_UNIQUE).into());
        }

        let collection = Collection {
            id: tables.allocate_id(),
            major_version: new.major_version,
            minor_version: new.minor_version,
            localization: new.localization.clone(),
            is_released: false,
            creation_date: Utc::now(),
        };
        tables.collections.push(collection.clone());
        Ok(collection)
    }

    async fn get_collection(&self, id: i64, visibility: Visibility) -> PortResult<Collection> {
        let tables = self.read()?;
        tables
            .collections
            .iter()
            .find(|c| c.id == id && (!visibility.released_only() || c.is_released))
            .cloned()
            .ok_or_else(|| collection_not_found(id))
    }

    async fn list_collections(
        &self,
        filter: &CollectionFilter,
        visibility: Visibility,
    ) -> PortResult<Vec<Collection>> {
        let tables = self.read()?;
        let mut matching: Vec<Collection> = tables
            .collections
            .iter()
            .filter(|c| filter.matches(c, visibility))
            .cloned()
            .collect();
        sort_collections(&mut matching);
        Ok(matching)
    }

    async fn collection_exists(
        &self,
        major_version: i32,
        minor_version: i32,
        localization: &str,
    ) -> PortResult<bool> {
        let tables = self.read()?;
        Ok(tables.collections.iter().any(|c| {
            c.major_version == major_version
                && c.minor_version == minor_version
                && c.localization == localization
        }))
    }

    async fn set_released(&self, id: i64, released: bool) -> PortResult<Collection> {
        let mut tables = self.write()?;
        let collection = tables
            .collections
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| collection_not_found(id))?;
        collection.is_released = released;
        Ok(collection.clone())
    }

    async fn delete_collection(&self, id: i64) -> PortResult<Vec<String>> {
        let mut tables = self.write()?;
        let before = tables.collections.len();
        tables.collections.retain(|c| c.id != id);
        if tables.collections.len() == before {
            return Err(collection_not_found(id));
        }

        let (removed, kept): (Vec<Workbook>, Vec<Workbook>) = tables
            .workbooks
            .drain(..)
            .partition(|w| w.collection == id);
        tables.workbooks = kept;
        tables
            .feedback
            .retain(|f| !removed.iter().any(|w| w.id == f.workbook));
        Ok(removed.into_iter().map(|w| w.pdf).collect())
    }
}

#[async_trait]
impl WorkbookRepository for InMemoryStore {
    async fn insert_workbook(&self, new: &NewWorkbook) -> PortResult<Workbook> {
        let mut tables = self.write()?;
        if !tables.collections.iter().any(|c| c.id == new.collection) {
            return Err(FieldErrors::single("collection", invalid_pk(new.collection)).into());
        }
        let taken = tables
            .workbooks
            .iter()
            .any(|w| w.number == new.number && w.collection == new.collection);
        if taken {
            return Err(FieldErrors::non_field(WORKBOOK_NOT_UNIQUE).into());
        }

        let workbook = Workbook {
            id: tables.allocate_id(),
            number: new.number,
            collection: new.collection,
            chapters: new.chapters.clone(),
            pdf: new.pdf.clone(),
        };
        tables.workbooks.push(workbook.clone());
        Ok(workbook)
    }

    async fn get_workbook(&self, id: i64, visibility: Visibility) -> PortResult<Workbook> {
        let tables = self.read()?;
        tables
            .workbooks
            .iter()
            .find(|w| w.id == id && tables.is_visible(w, visibility))
            .cloned()
            .ok_or_else(|| workbook_not_found(id))
    }

    async fn list_workbooks(&self, collection_id: i64) -> PortResult<Vec<Workbook>> {
        let tables = self.read()?;
        let mut workbooks: Vec<Workbook> = tables
            .workbooks
            .iter()
            .filter(|w| w.collection == collection_id)
            .cloned()
            .collect();
        workbooks.sort_by_key(|w| w.number);
        Ok(workbooks)
    }

    async fn delete_workbook(&self, id: i64) -> PortResult<()> {
        let mut tables = self.write()?;
        let before = tables.workbooks.len();
        tables.workbooks.retain(|w| w.id != id);
        if tables.workbooks.len() == before {
            return Err(workbook_not_found(id));
        }
        tables.feedback.retain(|f| f.workbook != id);
        Ok(())
    }
}

#[async_trait]
impl FeedbackRepository for InMemoryStore {
    async fn insert_feedback(&self, new: &NewFeedback) -> PortResult<Feedback> {
        let mut tables = self.write()?;
        if !tables.workbooks.iter().any(|w| w.id == new.workbook) {
            return Err(FieldErrors::single("workbook", invalid_pk(new.workbook)).into());
        }

        let feedback = Feedback {
            id: tables.allocate_id(),
            workbook: new.workbook,
            page_number: new.page_number,
            chapter_number: new.chapter_number,
            description: new.description.clone(),
            user_email: new.user_email.clone(),
            created_at: Utc::now(),
            major_version: new.major_version,
            minor_version: new.minor_version,
            localization: new.localization.clone(),
            logs: new.logs.clone(),
        };
        tables.feedback.push(feedback.clone());
        Ok(feedback)
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn create_user(&self, username: &str, password_hash: &str) -> PortResult<User> {
        let mut tables = self.write()?;
        if tables.users.iter().any(|u| u.username == username) {
            return Err(FieldErrors::single(
                "username",
                "A user with that username already exists.",
            )
            .into());
        }
        let id = tables.allocate_id();
        tables.users.push(UserCredentials {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        });
        Ok(User {
            id,
            username: username.to_string(),
        })
    }

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials> {
        let tables = self.read()?;
        tables
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", username)))
    }

    async fn get_or_create_token(&self, user_id: i64, candidate: &str) -> PortResult<String> {
        let mut tables = self.write()?;
        if let Some((key, _)) = tables.tokens.iter().find(|(_, owner)| **owner == user_id) {
            return Ok(key.clone());
        }
        tables.tokens.insert(candidate.to_string(), user_id);
        Ok(candidate.to_string())
    }

    async fn user_for_token(&self, key: &str) -> PortResult<User> {
        let tables = self.read()?;
        let user_id = tables
            .tokens
            .get(key)
            .ok_or_else(|| PortError::NotFound("Token not found".to_string()))?;
        tables
            .users
            .iter()
            .find(|u| u.id == *user_id)
            .map(|u| User {
                id: u.id,
                username: u.username.clone(),
            })
            .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))
    }

    async fn delete_tokens(&self, user_id: i64) -> PortResult<()> {
        let mut tables = self.write()?;
        tables.tokens.retain(|_, owner| *owner != user_id);
        Ok(())
    }
}

/// In-memory file storage for tests.
pub struct InMemoryFiles {
    files: RwLock<HashMap<String, Bytes>>,
    counter: RwLock<u64>,
}

impl InMemoryFiles {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            counter: RwLock::new(0),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files
            .read()
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.files.read().map(|files| files.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryFiles {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileStorage for InMemoryFiles {
    async fn save(&self, file_name: &str, data: Bytes) -> PortResult<String> {
        let mut counter = self
            .counter
            .write()
            .map_err(|_| PortError::Unexpected("file counter lock poisoned".to_string()))?;
        *counter += 1;
        let path = format!("{}_{}", counter, file_name);

        self.files
            .write()
            .map_err(|_| PortError::Unexpected("file table lock poisoned".to_string()))?
            .insert(path.clone(), data);
        Ok(path)
    }

    async fn delete(&self, path: &str) -> PortResult<()> {
        self.files
            .write()
            .map_err(|_| PortError::Unexpected("file table lock poisoned".to_string()))?
            .remove(path);
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("/media/{}", path)
    }
}
