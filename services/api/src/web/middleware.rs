//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::error;

use crate::web::state::{AppState, AuthContext};

/// Middleware that validates the caller's access token and resolves the user.
///
/// The token is read from the `Authorization: Bearer` header, or from the
/// `access_token` query parameter for WebSocket upgrades where browsers cannot
/// set headers. If valid, an [`AuthContext`] is inserted into the request
/// extensions. If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let access_token = bearer_token(&req)
        .or_else(|| query_token(&req))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let user_id = state
        .auth
        .user_for_token(&access_token)
        .await
        .map_err(|e| {
            error!("Failed to validate access token: {:?}", e);
            StatusCode::UNAUTHORIZED
        })?;

    req.extensions_mut().insert(AuthContext {
        user_id,
        access_token,
    });

    Ok(next.run(req).await)
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn query_token(req: &Request) -> Option<String> {
    req.uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("access_token="))
        .map(str::to_string)
        .filter(|t| !t.is_empty())
}
