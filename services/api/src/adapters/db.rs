//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the repository ports from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.
//!
//! Uniqueness and cascades are left to the schema's constraints; the adapter
//! translates constraint violations into field errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use readers_core::domain::{
    Collection, CollectionFilter, Feedback, NewCollection, NewFeedback, NewWorkbook, User,
    UserCredentials, Visibility, Workbook,
};
use readers_core::ports::{
    invalid_pk, CollectionRepository, CredentialStore, FeedbackRepository, PortError, PortResult,
    WorkbookRepository, COLLECTION_NOT_UNIQUE, WORKBOOK_NOT_UNIQUE,
};
use readers_core::validation::FieldErrors;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the repository ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct CollectionRecord {
    id: i64,
    major_version: i32,
    minor_version: i32,
    localization: String,
    is_released: bool,
    creation_date: DateTime<Utc>,
}
impl CollectionRecord {
    fn to_domain(self) -> Collection {
        Collection {
            id: self.id,
            major_version: self.major_version,
            minor_version: self.minor_version,
            localization: self.localization,
            is_released: self.is_released,
            creation_date: self.creation_date,
        }
    }
}

#[derive(FromRow)]
struct WorkbookRecord {
    id: i64,
    number: i32,
    collection_id: i64,
    chapters: Json<Value>,
    pdf: String,
}
impl WorkbookRecord {
    fn to_domain(self) -> Workbook {
        Workbook {
            id: self.id,
            number: self.number,
            collection: self.collection_id,
            chapters: self.chapters.0,
            pdf: self.pdf,
        }
    }
}

#[derive(FromRow)]
struct FeedbackRecord {
    id: i64,
    workbook_id: i64,
    page_number: i32,
    chapter_number: i32,
    description: String,
    user_email: String,
    created_at: DateTime<Utc>,
    major_version: i32,
    minor_version: i32,
    localization: String,
    logs: Option<Json<Value>>,
}
impl FeedbackRecord {
    fn to_domain(self) -> Feedback {
        Feedback {
            id: self.id,
            workbook: self.workbook_id,
            page_number: self.page_number,
            chapter_number: self.chapter_number,
            description: self.description,
            user_email: self.user_email,
            created_at: self.created_at,
            major_version: self.major_version,
            minor_version: self.minor_version,
            localization: self.localization,
            logs: self.logs.map(|logs| logs.0),
        }
    }
}

#[derive(FromRow)]
struct UserRecord {
    id: i64,
    username: String,
    password_hash: String,
}

const COLLECTION_COLUMNS: &str =
    "id, major_version, minor_version, localization, is_released, creation_date";
const WORKBOOK_COLUMNS: &str = "w.id, w.number, w.collection_id, w.chapters, w.pdf";

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps a unique-constraint violation to a `non_field_errors` message.
fn map_unique(e: sqlx::Error, message: &str) -> PortError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            FieldErrors::non_field(message).into()
        }
        _ => unexpected(e),
    }
}

//=========================================================================================
// Repository Trait Implementations
//=========================================================================================

#[async_trait]
impl CollectionRepository for DbAdapter {
    async fn insert_collection(&self, new: &NewCollection) -> PortResult<Collection> {
        let record = sqlx::query_as::<_, CollectionRecord>(&format!(
            "INSERT INTO collections (major_version, minor_version, localization) \
             VALUES ($1, $2, $3) RETURNING {}",
            COLLECTION_COLUMNS
        ))
        .bind(new.major_version)
        .bind(new.minor_version)
        .bind(&new.localization)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique(e, COLLECTION_NOT_UNIQUE))?;

        Ok(record.to_domain())
    }

    async fn get_collection(&self, id: i64, visibility: Visibility) -> PortResult<Collection> {
        let record = sqlx::query_as::<_, CollectionRecord>(&format!(
            "SELECT {} FROM collections WHERE id = $1 AND ($2 = FALSE OR is_released)",
            COLLECTION_COLUMNS
        ))
        .bind(id)
        .bind(visibility.released_only())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Collection {} not found", id)))?;

        Ok(record.to_domain())
    }

    async fn list_collections(
        &self,
        filter: &CollectionFilter,
        visibility: Visibility,
    ) -> PortResult<Vec<Collection>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM collections WHERE TRUE",
            COLLECTION_COLUMNS
        ));
        if visibility.released_only() {
            query.push(" AND is_released");
        }
        if let Some(major_version) = filter.major_version {
            query.push(" AND major_version = ").push_bind(major_version);
        }
        if let Some(minor_version) = filter.minor_version {
            query.push(" AND minor_version = ").push_bind(minor_version);
        }
        if let Some(localization) = &filter.localization {
            query.push(" AND localization = ").push_bind(localization.clone());
        }
        if let Some(is_released) = filter.is_released {
            query.push(" AND is_released = ").push_bind(is_released);
        }
        query.push(" ORDER BY major_version DESC, minor_version DESC, localization ASC");

        let records = query
            .build_query_as::<CollectionRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn collection_exists(
        &self,
        major_version: i32,
        minor_version: i32,
        localization: &str,
    ) -> PortResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM collections \
             WHERE major_version = $1 AND minor_version = $2 AND localization = $3)",
        )
        .bind(major_version)
        .bind(minor_version)
        .bind(localization)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(exists)
    }

    async fn set_released(&self, id: i64, released: bool) -> PortResult<Collection> {
        let record = sqlx::query_as::<_, CollectionRecord>(&format!(
            "UPDATE collections SET is_released = $2 WHERE id = $1 RETURNING {}",
            COLLECTION_COLUMNS
        ))
        .bind(id)
        .bind(released)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Collection {} not found", id)))?;

        Ok(record.to_domain())
    }

    async fn delete_collection(&self, id: i64) -> PortResult<Vec<String>> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        // The row lock blocks workbook inserts into this collection until commit.
        let locked: Option<i64> =
            sqlx::query_scalar("SELECT id FROM collections WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(unexpected)?;
        if locked.is_none() {
            return Err(PortError::NotFound(format!("Collection {} not found", id)));
        }

        let pdfs: Vec<String> =
            sqlx::query_scalar("DELETE FROM workbooks WHERE collection_id = $1 RETURNING pdf")
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .map_err(unexpected)?;
        sqlx::query("DELETE FROM collections WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;

        tx.commit().await.map_err(unexpected)?;
        Ok(pdfs)
    }
}

#[async_trait]
impl WorkbookRepository for DbAdapter {
    async fn insert_workbook(&self, new: &NewWorkbook) -> PortResult<Workbook> {
        let record = sqlx::query_as::<_, WorkbookRecord>(
            "INSERT INTO workbooks AS w (number, collection_id, chapters, pdf) \
             VALUES ($1, $2, $3, $4) \
             RETURNING w.id, w.number, w.collection_id, w.chapters, w.pdf",
        )
        .bind(new.number)
        .bind(new.collection)
        .bind(Json(&new.chapters))
        .bind(&new.pdf)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                FieldErrors::single("collection", invalid_pk(new.collection)).into()
            }
            _ => map_unique(e, WORKBOOK_NOT_UNIQUE),
        })?;

        Ok(record.to_domain())
    }

    async fn get_workbook(&self, id: i64, visibility: Visibility) -> PortResult<Workbook> {
        let record = sqlx::query_as::<_, WorkbookRecord>(&format!(
            "SELECT {} FROM workbooks w JOIN collections c ON c.id = w.collection_id \
             WHERE w.id = $1 AND ($2 = FALSE OR c.is_released)",
            WORKBOOK_COLUMNS
        ))
        .bind(id)
        .bind(visibility.released_only())
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("Workbook {} not found", id)))?;

        Ok(record.to_domain())
    }

    async fn list_workbooks(&self, collection_id: i64) -> PortResult<Vec<Workbook>> {
        let records = sqlx::query_as::<_, WorkbookRecord>(&format!(
            "SELECT {} FROM workbooks w WHERE w.collection_id = $1 ORDER BY w.number ASC",
            WORKBOOK_COLUMNS
        ))
        .bind(collection_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn delete_workbook(&self, id: i64) -> PortResult<()> {
        let result = sqlx::query("DELETE FROM workbooks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Workbook {} not found", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl FeedbackRepository for DbAdapter {
    async fn insert_feedback(&self, new: &NewFeedback) -> PortResult<Feedback> {
        let record = sqlx::query_as::<_, FeedbackRecord>(
            "INSERT INTO feedback (workbook_id, page_number, chapter_number, description, \
             user_email, major_version, minor_version, localization, logs) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id, workbook_id, page_number, chapter_number, description, user_email, \
             created_at, major_version, minor_version, localization, logs",
        )
        .bind(new.workbook)
        .bind(new.page_number)
        .bind(new.chapter_number)
        .bind(&new.description)
        .bind(&new.user_email)
        .bind(new.major_version)
        .bind(new.minor_version)
        .bind(&new.localization)
        .bind(new.logs.as_ref().map(Json))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                FieldErrors::single("workbook", invalid_pk(new.workbook)).into()
            }
            _ => unexpected(e),
        })?;

        Ok(record.to_domain())
    }
}

#[async_trait]
impl CredentialStore for DbAdapter {
    async fn create_user(&self, username: &str, password_hash: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (username, password_hash) VALUES ($1, $2) \
             RETURNING id, username, password_hash",
        )
        .bind(username)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                FieldErrors::single("username", "A user with that username already exists.")
                    .into()
            }
            _ => unexpected(e),
        })?;

        Ok(User {
            id: record.id,
            username: record.username,
        })
    }

    async fn get_user_by_username(&self, username: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", username)))?;

        Ok(UserCredentials {
            id: record.id,
            username: record.username,
            password_hash: record.password_hash,
        })
    }

    async fn get_or_create_token(&self, user_id: i64, candidate: &str) -> PortResult<String> {
        sqlx::query(
            "INSERT INTO api_tokens (key, user_id) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(candidate)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        let key: String = sqlx::query_scalar("SELECT key FROM api_tokens WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(unexpected)?;

        Ok(key)
    }

    async fn user_for_token(&self, key: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT u.id, u.username, u.password_hash FROM api_tokens t \
             JOIN users u ON u.id = t.user_id WHERE t.key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound("Token not found".to_string()))?;

        Ok(User {
            id: record.id,
            username: record.username,
        })
    }

    async fn delete_tokens(&self, user_id: i64) -> PortResult<()> {
        sqlx::query("DELETE FROM api_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}
