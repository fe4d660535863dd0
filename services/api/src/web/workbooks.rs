//! services/api/src/web/workbooks.rs
//!
//! Handlers for the `/api/workbooks` resource. Workbooks are uploaded as
//! multipart forms carrying the PDF next to its chapter metadata.

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use readers_core::catalog::WorkbookUpload;
use readers_core::domain::Workbook;
use readers_core::input::{int_from_str, INVALID_INT, REQUIRED};
use readers_core::ports::FileStorage;
use readers_core::validation::FieldErrors;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::web::middleware::{AuthUser, Caller};
use crate::web::rest::parse_id;
use crate::web::state::AppState;

const NO_FILE: &str = "No file was submitted.";
const NOT_A_FILE: &str = "The submitted data was not a file. Check the encoding type on the form.";
const EMPTY_FILE: &str = "The submitted file is empty.";
const INVALID_JSON: &str = "Value must be valid JSON.";

//=========================================================================================
// API Request and Response Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct WorkbookResponse {
    pub id: i64,
    pub number: i32,
    pub collection: i64,
    #[schema(value_type = Object)]
    pub chapters: Value,
    /// Public URL of the PDF.
    pub pdf: String,
}

impl WorkbookResponse {
    fn build(workbook: Workbook, storage: &dyn FileStorage) -> Self {
        Self {
            pdf: storage.url(&workbook.pdf),
            id: workbook.id,
            number: workbook.number,
            collection: workbook.collection,
            chapters: workbook.chapters,
        }
    }
}

/// The multipart form accepted by `POST /api/workbooks`.
#[derive(ToSchema)]
pub struct WorkbookForm {
    pub number: i32,
    /// Id of the owning collection.
    pub collection: i64,
    /// The chapter list as JSON text.
    pub chapters: String,
    #[schema(value_type = String, format = Binary)]
    pub pdf: Vec<u8>,
}

/// Fields read from the multipart body before they are checked.
#[derive(Default)]
struct RawForm {
    number: Option<String>,
    collection: Option<String>,
    chapters: Option<String>,
    pdf: Option<(Option<String>, Bytes)>,
}

async fn read_form(mut multipart: Multipart) -> Result<RawForm, ApiError> {
    let mut form = RawForm::default();
    let malformed = |e: axum::extract::multipart::MultipartError| {
        ApiError::MalformedBody(format!("Multipart form parse error - {}", e.body_text()))
    };

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "pdf" => {
                let file_name = field.file_name().map(str::to_string);
                let data = field.bytes().await.map_err(malformed)?;
                form.pdf = Some((file_name, data));
            }
            "number" | "collection" | "chapters" => {
                let text = field.text().await.map_err(malformed)?;
                match name.as_str() {
                    "number" => form.number = Some(text),
                    "collection" => form.collection = Some(text),
                    _ => form.chapters = Some(text),
                }
            }
            other => warn!("Ignoring unexpected multipart field '{}'", other),
        }
    }
    Ok(form)
}

/// Checks the raw form field by field, collecting every problem.
///
/// The chapter structure itself is validated by the catalog.
fn check_form(form: RawForm) -> Result<WorkbookUpload, FieldErrors> {
    let mut errors = FieldErrors::new();

    let number = match form.number.as_deref().map(str::trim) {
        None | Some("") => {
            errors.add("number", REQUIRED);
            None
        }
        Some(raw) => match int_from_str(raw).and_then(|v| i32::try_from(v).ok()) {
            Some(v) => Some(v),
            None => {
                errors.add("number", INVALID_INT);
                None
            }
        },
    };

    let collection = match form.collection.as_deref().map(str::trim) {
        None | Some("") => {
            errors.add("collection", REQUIRED);
            None
        }
        Some(raw) => match int_from_str(raw) {
            Some(v) => Some(v),
            None => {
                errors.add(
                    "collection",
                    "Incorrect type. Expected pk value, received str.",
                );
                None
            }
        },
    };

    let chapters = match form.chapters.as_deref() {
        None | Some("") => {
            errors.add("chapters", REQUIRED);
            None
        }
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(v) => Some(v),
            Err(_) => {
                errors.add("chapters", INVALID_JSON);
                None
            }
        },
    };

    let pdf = match form.pdf {
        None => {
            errors.add("pdf", NO_FILE);
            None
        }
        Some((None, _)) => {
            errors.add("pdf", NOT_A_FILE);
            None
        }
        Some((Some(_), data)) if data.is_empty() => {
            errors.add("pdf", EMPTY_FILE);
            None
        }
        Some((Some(name), data)) => Some((name, data)),
    };

    errors.into_result()?;
    match (number, collection, chapters, pdf) {
        (Some(number), Some(collection), Some(chapters), Some((pdf_name, pdf))) => {
            Ok(WorkbookUpload {
                number,
                collection,
                chapters,
                pdf_name,
                pdf,
            })
        }
        _ => Err(FieldErrors::non_field("Invalid workbook data.")),
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Upload a workbook PDF with its chapter metadata.
#[utoipa::path(
    post,
    path = "/api/workbooks",
    tag = "workbooks",
    request_body(content = WorkbookForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Workbook created", body = WorkbookResponse),
        (status = 400, description = "Validation errors keyed by field"),
        (status = 401, description = "Not authenticated")
    ),
    security(("token" = []))
)]
pub async fn create_workbook_handler(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let multipart = multipart.map_err(|e| ApiError::MalformedBody(e.body_text()))?;
    let upload = check_form(read_form(multipart).await?)?;

    let workbook = state.catalog.create_workbook(upload).await?;
    let response = WorkbookResponse::build(workbook, state.catalog.storage().as_ref());
    Ok((StatusCode::CREATED, Json(response)))
}

/// Retrieve a workbook with its chapters and PDF URL.
#[utoipa::path(
    get,
    path = "/api/workbooks/{id}",
    tag = "workbooks",
    params(("id" = i64, Path, description = "Workbook id")),
    responses(
        (status = 200, description = "The workbook", body = WorkbookResponse),
        (status = 404, description = "Unknown workbook, or its collection is unreleased")
    )
)]
pub async fn get_workbook_handler(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<WorkbookResponse>, ApiError> {
    let workbook = state
        .catalog
        .get_workbook(parse_id(&id)?, caller.visibility())
        .await?;
    Ok(Json(WorkbookResponse::build(
        workbook,
        state.catalog.storage().as_ref(),
    )))
}

/// Delete a workbook and its PDF.
#[utoipa::path(
    delete,
    path = "/api/workbooks/{id}",
    tag = "workbooks",
    params(("id" = i64, Path, description = "Workbook id")),
    responses(
        (status = 204, description = "Workbook deleted"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Unknown workbook")
    ),
    security(("token" = []))
)]
pub async fn delete_workbook_handler(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.catalog.delete_workbook(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}
