//! services/api/src/web/middleware.rs
//!
//! Request middleware: token authentication, throttling, and request logging,
//! plus the extractors handlers use to learn who is calling.

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use readers_core::domain::{User, Visibility};
use readers_core::ports::PortError;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::state::AppState;

//=========================================================================================
// Caller Identity
//=========================================================================================

/// Who made the current request, as established by [`authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(User),
}

impl Caller {
    /// The slice of the catalog this caller may read.
    pub fn visibility(&self) -> Visibility {
        match self {
            Caller::Anonymous => Visibility::Public,
            Caller::User(_) => Visibility::All,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Caller::User(_))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Caller>()
            .cloned()
            .unwrap_or(Caller::Anonymous))
    }
}

/// Extracts the authenticated user, rejecting anonymous callers with a 401.
///
/// Place it before any body extractor so the credential check comes first.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Caller>() {
            Some(Caller::User(user)) => Ok(AuthUser(user.clone())),
            _ => Err(ApiError::Unauthenticated),
        }
    }
}

//=========================================================================================
// Authentication
//=========================================================================================

/// Reads the token key from an `Authorization: Token <key>` header.
///
/// No header, or a different scheme, means the request is anonymous.
fn token_from_headers(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| ApiError::InvalidToken)?;

    let mut parts = value.split_whitespace();
    match parts.next() {
        Some(scheme) if scheme.eq_ignore_ascii_case("token") => {}
        _ => return Ok(None),
    }
    match (parts.next(), parts.next()) {
        (Some(key), None) => Ok(Some(key.to_string())),
        _ => Err(ApiError::InvalidToken),
    }
}

/// Middleware that resolves the request's token to a [`Caller`] and stores
/// it in the request extensions.
///
/// A token that is present but unknown fails the request even on public routes.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let caller = match token_from_headers(req.headers())? {
        None => Caller::Anonymous,
        Some(key) => match state.credentials.user_for_token(&key).await {
            Ok(user) => Caller::User(user),
            Err(PortError::NotFound(_)) => return Err(ApiError::InvalidToken),
            Err(e) => return Err(e.into()),
        },
    };

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

//=========================================================================================
// Throttling
//=========================================================================================

/// Identifies the client for throttling: the peer address, or the first
/// `X-Forwarded-For` hop when `trust_forwarded` is set.
pub fn client_key(req: &Request, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(first_hop) = forwarded {
            return first_hop.to_string();
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Throttles requests that carry no token. Must run after [`authenticate`].
pub async fn throttle_anonymous(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let anonymous = !req
        .extensions()
        .get::<Caller>()
        .is_some_and(Caller::is_authenticated);

    if anonymous {
        let client = client_key(&req, state.config.trust_forwarded_for);
        if !state.limiters.anonymous.check(&client) {
            warn!(client = %client, "Throttled anonymous request");
            return Err(ApiError::Throttled);
        }
    }
    Ok(next.run(req).await)
}

/// Throttles feedback submissions per client.
pub async fn throttle_feedback(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let client = client_key(&req, state.config.trust_forwarded_for);
    if !state.limiters.feedback.check(&client) {
        warn!(client = %client, "Throttled feedback submission");
        return Err(ApiError::Throttled);
    }
    Ok(next.run(req).await)
}

//=========================================================================================
// Request Logging
//=========================================================================================

/// Logs every request and its outcome under a per-request id.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or_default().to_string();
    let span = info_span!("request", %request_id);

    async move {
        let started = Instant::now();
        info!(%method, %path, %query, "Request received");

        let response = next.run(req).await;

        let status = response.status();
        let latency_ms = started.elapsed().as_millis() as u64;
        if status.is_server_error() {
            error!(%method, %path, status = status.as_u16(), latency_ms, "Request failed");
        } else if status.is_client_error() {
            warn!(%method, %path, status = status.as_u16(), latency_ms, "Request rejected");
        } else {
            info!(%method, %path, status = status.as_u16(), latency_ms, "Request completed");
        }
        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn reads_token_scheme_case_insensitively() {
        let key = token_from_headers(&headers_with("token abc123")).unwrap();
        assert_eq!(key.as_deref(), Some("abc123"));
        let key = token_from_headers(&headers_with("Token abc123")).unwrap();
        assert_eq!(key.as_deref(), Some("abc123"));
    }

    #[test]
    fn other_schemes_and_missing_header_are_anonymous() {
        assert_eq!(token_from_headers(&HeaderMap::new()).unwrap(), None);
        assert_eq!(token_from_headers(&headers_with("Bearer abc")).unwrap(), None);
    }

    #[test]
    fn malformed_token_headers_are_rejected() {
        assert!(matches!(
            token_from_headers(&headers_with("Token")),
            Err(ApiError::InvalidToken)
        ));
        assert!(matches!(
            token_from_headers(&headers_with("Token a b")),
            Err(ApiError::InvalidToken)
        ));
    }

    #[test]
    fn client_key_uses_forwarded_header_only_when_trusted() {
        let mut req = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(axum::body::Body::empty())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 1], 4000))));
        assert_eq!(client_key(&req, true), "203.0.113.7");
        assert_eq!(client_key(&req, false), "192.0.2.1");

        let req = axum::http::Request::builder().body(axum::body::Body::empty()).unwrap();
        assert_eq!(client_key(&req, false), "unknown");
    }
}
