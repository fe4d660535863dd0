//! services/api/src/web/feedback.rs
//!
//! Handler for public feedback submissions.

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use readers_core::input::parse_new_feedback;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::web::rest::json_body;
use crate::web::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct FeedbackResponse {
    pub message: String,
    /// Whether the notification email was delivered to the relay.
    pub email_sent: bool,
}

/// Body accepted by `POST /api/feedback`.
#[derive(ToSchema)]
pub struct FeedbackRequest {
    /// Id of the workbook the feedback is about.
    pub workbook: i64,
    pub page_number: Option<i32>,
    pub chapter_number: Option<i32>,
    pub description: String,
    pub user_email: String,
    pub major_version: Option<i32>,
    pub minor_version: Option<i32>,
    pub localization: Option<String>,
    /// Free-form client diagnostics.
    #[schema(value_type = Option<Object>)]
    pub logs: Option<serde_json::Value>,
}

/// Submit feedback about a workbook page.
///
/// The version triple must name an existing collection. A notification
/// email is attempted once; its outcome is reported but never fails the request.
#[utoipa::path(
    post,
    path = "/api/feedback",
    tag = "feedback",
    request_body = FeedbackRequest,
    responses(
        (status = 201, description = "Feedback stored", body = FeedbackResponse),
        (status = 400, description = "Validation errors keyed by field"),
        (status = 429, description = "Too many submissions from this client")
    )
)]
pub async fn submit_feedback_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let new = parse_new_feedback(&json_body(&body)?)?;
    let receipt = state.catalog.submit_feedback(new).await?;

    Ok((
        StatusCode::CREATED,
        Json(FeedbackResponse {
            message: "Feedback submitted successfully".to_string(),
            email_sent: receipt.email_sent,
        }),
    ))
}
