//! services/api/src/web/collections.rs
//!
//! Handlers for the `/api/collections` resource.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use readers_core::domain::{Collection, CollectionDetail};
use readers_core::input::{parse_collection_filter, parse_new_collection};
use readers_core::ports::FileStorage;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::web::middleware::{AuthUser, Caller};
use crate::web::rest::{json_body, parse_id, MessageResponse};
use crate::web::state::AppState;

//=========================================================================================
// API Response Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct CollectionResponse {
    pub id: i64,
    pub major_version: i32,
    pub minor_version: i32,
    pub localization: String,
    pub is_released: bool,
    pub creation_date: DateTime<Utc>,
}

impl From<Collection> for CollectionResponse {
    fn from(c: Collection) -> Self {
        Self {
            id: c.id,
            major_version: c.major_version,
            minor_version: c.minor_version,
            localization: c.localization,
            is_released: c.is_released,
            creation_date: c.creation_date,
        }
    }
}

/// A workbook as listed inside a collection.
#[derive(Serialize, ToSchema)]
pub struct WorkbookSummary {
    pub id: i64,
    pub number: i32,
    /// Public URL of the PDF.
    pub pdf: String,
}

#[derive(Serialize, ToSchema)]
pub struct CollectionDetailResponse {
    #[serde(flatten)]
    pub collection: CollectionResponse,
    pub workbooks: Vec<WorkbookSummary>,
}

impl CollectionDetailResponse {
    fn build(detail: CollectionDetail, storage: &dyn FileStorage) -> Self {
        Self {
            collection: detail.collection.into(),
            workbooks: detail
                .workbooks
                .into_iter()
                .map(|w| WorkbookSummary {
                    id: w.id,
                    number: w.number,
                    pdf: storage.url(&w.pdf),
                })
                .collect(),
        }
    }
}

/// Body accepted by `POST /api/collections`.
#[derive(ToSchema)]
pub struct CreateCollectionRequest {
    pub major_version: i32,
    pub minor_version: i32,
    /// At most five characters, e.g. `en-US`.
    pub localization: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// List collections, newest version first.
///
/// Anonymous callers only see released collections.
#[utoipa::path(
    get,
    path = "/api/collections",
    tag = "collections",
    params(
        ("major_version" = Option<i32>, Query, description = "Exact major version"),
        ("minor_version" = Option<i32>, Query, description = "Exact minor version"),
        ("localization" = Option<String>, Query, description = "Localization tag, e.g. en-US"),
        ("is_released" = Option<bool>, Query, description = "Release state")
    ),
    responses(
        (status = 200, description = "Matching collections", body = [CollectionResponse]),
        (status = 400, description = "Invalid query parameter")
    )
)]
pub async fn list_collections_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<CollectionResponse>>, ApiError> {
    let filter = parse_collection_filter(&params)?;
    let collections = state
        .catalog
        .list_collections(&filter, caller.visibility())
        .await?;
    Ok(Json(collections.into_iter().map(Into::into).collect()))
}

/// The latest collection among those matching the filters.
#[utoipa::path(
    get,
    path = "/api/collections/latest",
    tag = "collections",
    params(
        ("major_version" = Option<i32>, Query, description = "Exact major version"),
        ("minor_version" = Option<i32>, Query, description = "Exact minor version"),
        ("localization" = Option<String>, Query, description = "Localization tag, e.g. en-US"),
        ("is_released" = Option<bool>, Query, description = "Release state")
    ),
    responses(
        (status = 200, description = "The latest matching collection", body = CollectionResponse),
        (status = 400, description = "Invalid query parameter"),
        (status = 404, description = "No collections found", body = MessageResponse)
    )
)]
pub async fn latest_collection_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<CollectionResponse>, ApiError> {
    let filter = parse_collection_filter(&params)?;
    let latest = state
        .catalog
        .latest_collection(&filter, caller.visibility())
        .await?;
    Ok(Json(latest.into()))
}

/// Retrieve a collection together with its workbooks.
#[utoipa::path(
    get,
    path = "/api/collections/{id}",
    tag = "collections",
    params(("id" = i64, Path, description = "Collection id")),
    responses(
        (status = 200, description = "The collection", body = CollectionDetailResponse),
        (status = 404, description = "Unknown or unreleased collection")
    )
)]
pub async fn get_collection_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<CollectionDetailResponse>, ApiError> {
    let detail = state
        .catalog
        .get_collection(parse_id(&id)?, caller.visibility())
        .await?;
    Ok(Json(CollectionDetailResponse::build(
        detail,
        state.catalog.storage().as_ref(),
    )))
}

/// Create a new, unreleased collection.
///
/// The version must move forward from the latest collection of the same
/// localization.
#[utoipa::path(
    post,
    path = "/api/collections",
    tag = "collections",
    request_body = CreateCollectionRequest,
    responses(
        (status = 201, description = "Collection created", body = CollectionResponse),
        (status = 400, description = "Validation errors keyed by field"),
        (status = 401, description = "Not authenticated")
    ),
    security(("token" = []))
)]
pub async fn create_collection_handler(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let new = parse_new_collection(&json_body(&body)?)?;
    let created = state.catalog.create_collection(new).await?;
    Ok((StatusCode::CREATED, Json(CollectionResponse::from(created))))
}

/// Delete a collection, its workbooks, and their PDFs.
#[utoipa::path(
    delete,
    path = "/api/collections/{id}",
    tag = "collections",
    params(("id" = i64, Path, description = "Collection id")),
    responses(
        (status = 204, description = "Collection deleted"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Unknown collection")
    ),
    security(("token" = []))
)]
pub async fn delete_collection_handler(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.catalog.delete_collection(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Make a collection publicly visible.
#[utoipa::path(
    patch,
    path = "/api/collections/{id}/release",
    tag = "collections",
    params(("id" = i64, Path, description = "Collection id")),
    responses(
        (status = 200, description = "Collection released", body = MessageResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Unknown collection")
    ),
    security(("token" = []))
)]
pub async fn release_collection_handler(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.catalog.set_released(parse_id(&id)?, true).await?;
    Ok(Json(MessageResponse::new("Collection released.")))
}

/// Hide a collection from anonymous callers again.
#[utoipa::path(
    patch,
    path = "/api/collections/{id}/unrelease",
    tag = "collections",
    params(("id" = i64, Path, description = "Collection id")),
    responses(
        (status = 200, description = "Collection un-released", body = MessageResponse),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Unknown collection")
    ),
    security(("token" = []))
)]
pub async fn unrelease_collection_handler(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.catalog.set_released(parse_id(&id)?, false).await?;
    Ok(Json(MessageResponse::new("Collection un-released.")))
}

