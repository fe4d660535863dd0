//! services/api/src/web/rest.rs
//!
//! Assembles the REST API: the router with its middleware stack, the shared
//! request helpers, and the master definition for the OpenAPI specification.

use crate::error::ApiError;
use crate::web::{
    auth::{obtain_token_handler, revoke_token_handler, TokenRequest, TokenResponse},
    collections::{
        create_collection_handler, delete_collection_handler, get_collection_handler,
        latest_collection_handler, list_collections_handler, release_collection_handler,
        unrelease_collection_handler, CollectionDetailResponse, CollectionResponse,
        CreateCollectionRequest, WorkbookSummary,
    },
    feedback::{submit_feedback_handler, FeedbackRequest, FeedbackResponse},
    middleware::{authenticate, log_requests, throttle_anonymous, throttle_feedback},
    state::AppState,
    workbooks::{
        create_workbook_handler, delete_workbook_handler, get_workbook_handler, WorkbookForm,
        WorkbookResponse,
    },
};
use axum::{
    body::Bytes,
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use readers_core::input::int_from_str;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::warn;
use utoipa::{
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
    Modify, OpenApi, ToSchema,
};
use utoipa_swagger_ui::SwaggerUi;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        root_handler,
        crate::web::auth::obtain_token_handler,
        crate::web::auth::revoke_token_handler,
        crate::web::collections::list_collections_handler,
        crate::web::collections::latest_collection_handler,
        crate::web::collections::get_collection_handler,
        crate::web::collections::create_collection_handler,
        crate::web::collections::delete_collection_handler,
        crate::web::collections::release_collection_handler,
        crate::web::collections::unrelease_collection_handler,
        crate::web::workbooks::create_workbook_handler,
        crate::web::workbooks::get_workbook_handler,
        crate::web::workbooks::delete_workbook_handler,
        crate::web::feedback::submit_feedback_handler,
    ),
    components(
        schemas(
            MessageResponse,
            TokenRequest,
            TokenResponse,
            CollectionResponse,
            CollectionDetailResponse,
            CreateCollectionRequest,
            WorkbookSummary,
            WorkbookResponse,
            WorkbookForm,
            FeedbackRequest,
            FeedbackResponse,
        )
    ),
    modifiers(&TokenSecurity),
    tags(
        (name = "Readers API", description = "Versioned workbook collections and reader feedback."),
        (name = "auth", description = "API token management"),
        (name = "collections", description = "Versioned, localized collections"),
        (name = "workbooks", description = "Workbook PDFs with chapter metadata"),
        (name = "feedback", description = "Reader feedback submissions")
    )
)]
pub struct ApiDoc;

/// Registers the `Authorization: Token <key>` scheme referenced by gated paths.
struct TokenSecurity;

impl Modify for TokenSecurity {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "token",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "Authorization",
                    "Token <key>",
                ))),
            );
        }
    }
}

//=========================================================================================
// Shared Payloads and Request Helpers
//=========================================================================================

/// A plain `{"message": ...}` payload.
#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Decodes a JSON request body. An empty body reads as an empty object so
/// that missing fields are reported one by one.
pub fn json_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::MalformedBody(format!("JSON parse error - {}", e)))
}

/// Parses a path id; anything that is not an integer cannot name a record.
pub fn parse_id(raw: &str) -> Result<i64, ApiError> {
    int_from_str(raw).ok_or_else(|| {
        ApiError::Port(readers_core::ports::PortError::NotFound(
            "Not found.".to_string(),
        ))
    })
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Report the API name and version.
#[utoipa::path(
    get,
    path = "/api",
    tag = "Readers API",
    responses((status = 200, description = "API banner", body = MessageResponse))
)]
pub async fn root_handler() -> Json<MessageResponse> {
    Json(MessageResponse::new(format!(
        "Readers API v{}",
        env!("CARGO_PKG_VERSION")
    )))
}

//=========================================================================================
// Router
//=========================================================================================

fn cors_layer(allowed_origin: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    match allowed_origin.map(str::parse::<HeaderValue>) {
        Some(Ok(origin)) => cors.allow_origin(origin),
        Some(Err(_)) => {
            warn!("Ignoring invalid CORS_ALLOWED_ORIGIN; cross-origin requests stay blocked");
            cors
        }
        None => cors,
    }
}

/// Builds the complete application: the `/api` routes with authentication
/// and throttling, media file serving, and the Swagger UI.
pub fn router(state: Arc<AppState>) -> Router {
    let config = state.config.clone();

    let feedback_routes = Router::new()
        .route("/feedback", post(submit_feedback_handler))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            throttle_feedback,
        ));

    // Layers run bottom-up: authenticate sees the request before throttling.
    let api_router = Router::new()
        .route("/", get(root_handler))
        .route(
            "/token",
            post(obtain_token_handler).delete(revoke_token_handler),
        )
        .route(
            "/collections",
            get(list_collections_handler).post(create_collection_handler),
        )
        .route("/collections/latest", get(latest_collection_handler))
        .route(
            "/collections/{id}",
            get(get_collection_handler).delete(delete_collection_handler),
        )
        .route(
            "/collections/{id}/release",
            patch(release_collection_handler),
        )
        .route(
            "/collections/{id}/unrelease",
            patch(unrelease_collection_handler),
        )
        .route("/workbooks", post(create_workbook_handler))
        .route(
            "/workbooks/{id}",
            get(get_workbook_handler).delete(delete_workbook_handler),
        )
        .merge(feedback_routes)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            throttle_anonymous,
        ))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            authenticate,
        ))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .with_state(state);

    let mut app = Router::new().nest("/api", api_router);

    if config.media_url.starts_with('/') && config.media_url.len() > 1 {
        app = app.nest_service(&config.media_url, ServeDir::new(&config.media_root));
    } else {
        warn!(
            media_url = %config.media_url,
            "MEDIA_URL is not a local path; media files are not served by this process"
        );
    }

    app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer(config.cors_allowed_origin.as_deref()))
        .layer(axum_middleware::from_fn(log_requests))
}
