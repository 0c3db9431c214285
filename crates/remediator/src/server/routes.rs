use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use http::{header, HeaderMap, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::AppState;
use crate::{metrics::gather_metrics, Error};

const DEFAULT_TASK_LIMIT: usize = 100;
const MAX_TASK_LIMIT: usize = 1000;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn webhook(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    if !authorized(state.bearer_token.as_deref(), &headers) {
        warn!("Rejected webhook request with missing or invalid bearer token");
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized", "Missing or invalid bearer token");
    }

    match state.webhook.handle_body(&body).await {
        Ok(summary) => {
            info!(
                received = summary.received,
                accepted = summary.accepted,
                skipped = summary.skipped,
                resolved = summary.resolved,
                "Webhook processed"
            );
            Json(json!({ "status": "ok" })).into_response()
        }
        Err(Error::Validation(message)) => error_response(StatusCode::BAD_REQUEST, "malformed_payload", &message),
        Err(e) => {
            error!("Failed to process webhook: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Internal server error")
        }
    }
}

fn authorized(expected: Option<&str>, headers: &HeaderMap) -> bool {
    let Some(expected) = expected else {
        return true;
    };

    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token.as_bytes().ct_eq(expected.as_bytes()).into())
}

fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (status, Json(json!({ "error": error, "message": message }))).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

pub async fn list_tasks(State(state): State<Arc<AppState>>, Query(params): Query<ListParams>) -> Response {
    let limit = params.limit.unwrap_or(DEFAULT_TASK_LIMIT).min(MAX_TASK_LIMIT);

    match state.store.list_tasks(limit).await {
        Ok(tasks) => Json(tasks).into_response(),
        Err(e) => {
            error!("Failed to list tasks: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Internal server error")
        }
    }
}

pub async fn get_task(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match state.store.get_task(id).await {
        Ok(Some(task)) => Json(task).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "error": "Task not found" }))).into_response(),
        Err(e) => {
            error!("Failed to get task {}: {}", id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "Internal server error")
        }
    }
}

pub async fn list_cooldowns(State(state): State<Arc<AppState>>) -> Response {
    Json(state.dispatcher.active_cooldowns().await).into_response()
}

pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn no_token_configured_allows_everything() {
        assert!(authorized(None, &HeaderMap::new()));
        assert!(authorized(None, &with_auth("Bearer whatever")));
    }

    #[test]
    fn configured_token_must_match() {
        assert!(authorized(Some("s3cret"), &with_auth("Bearer s3cret")));
        assert!(!authorized(Some("s3cret"), &with_auth("Bearer wrong")));
        assert!(!authorized(Some("s3cret"), &with_auth("Basic s3cret")));
        assert!(!authorized(Some("s3cret"), &HeaderMap::new()));
    }

    #[test]
    fn presented_token_is_compared_verbatim() {
        assert!(!authorized(Some("s3cret"), &with_auth("Bearer s3cret ")));
        assert!(!authorized(Some("s3cret"), &with_auth("Bearer  s3cret")));
        assert!(!authorized(Some("s3cret"), &with_auth("Bearer s3cre")));
        assert!(!authorized(Some("s3cret"), &with_auth("Bearer s3cret2")));
    }
}
