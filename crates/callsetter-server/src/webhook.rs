//! VAPI server webhook ingestion.

use crate::api::ApiError;
use crate::AppState;
use axum::{extract::Extension, http::HeaderMap, Json};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

const SECRET_HEADER: &str = "x-vapi-secret";

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    /// SDK event the webhook was translated to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<&'static str>,
}

/// Compares without short-circuiting on the first differing byte.
fn secrets_match(expected: &str, given: &str) -> bool {
    let (a, b) = (expected.as_bytes(), given.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Handler for `POST /webhooks/vapi`.
pub async fn vapi_webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<WebhookAck>, ApiError> {
    let vapi = state
        .vapi
        .as_ref()
        .ok_or_else(|| ApiError::ServiceUnavailable("VAPI is not configured".to_string()))?;

    if let Some(expected) = &state.webhook_secret {
        let given = headers
            .get(SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !secrets_match(expected, given) {
            tracing::warn!("rejected VAPI webhook with missing or wrong secret");
            return Err(ApiError::Unauthorized("invalid webhook secret".to_string()));
        }
    }

    let event = vapi.ingest_webhook(&body);
    Ok(Json(WebhookAck {
        received: true,
        event,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_comparison() {
        assert!(secrets_match("hook", "hook"));
        assert!(!secrets_match("hook", "hoo"));
        assert!(!secrets_match("hook", "hool"));
        assert!(!secrets_match("hook", ""));
    }
}
