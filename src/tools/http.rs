//! Shared HTTP plumbing for the adapters
//!
//! Maps transport outcomes onto the adapter error taxonomy.

use crate::error::AdapterError;
use crate::models::RawPayload;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Longest slice of an error body carried into an error message
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expect {
    Json,
    Text,
}

/// One long-lived client (connection-pooled) shared by all adapters.
pub(crate) fn build_client() -> crate::Result<Client> {
    let client = Client::builder()
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .user_agent(concat!("wealth-advisor-orchestrator/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

pub(crate) async fn send(
    request: RequestBuilder,
    timeout: Duration,
    expect: Expect,
) -> Result<RawPayload, AdapterError> {
    let response = request
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| from_reqwest(e, timeout))?;

    let status = response.status();
    let body = response.text().await.map_err(|e| from_reqwest(e, timeout))?;

    if !status.is_success() {
        return Err(from_status(status, &body));
    }

    debug!(status = %status, bytes = body.len(), "Adapter response received");

    Ok(match expect {
        Expect::Text => RawPayload::Text(body),
        Expect::Json if body.trim().is_empty() => RawPayload::Json(serde_json::Value::Null),
        // Left as text; the normalizer decides it carries no evidence.
        Expect::Json => match serde_json::from_str(&body) {
            Ok(value) => RawPayload::Json(value),
            Err(_) => RawPayload::Text(body),
        },
    })
}

pub(crate) fn from_status(status: StatusCode, body: &str) -> AdapterError {
    let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
    let message = format!("HTTP {}: {}", status.as_u16(), snippet.trim());

    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        AdapterError::Transient(message)
    } else {
        AdapterError::Validation(message)
    }
}

fn from_reqwest(err: reqwest::Error, timeout: Duration) -> AdapterError {
    if err.is_timeout() {
        AdapterError::Timeout(timeout)
    } else if err.is_builder() {
        AdapterError::Validation(err.to_string())
    } else {
        AdapterError::Transient(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            from_status(StatusCode::SERVICE_UNAVAILABLE, "down"),
            AdapterError::Transient(_)
        ));
        assert!(matches!(
            from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            AdapterError::Transient(_)
        ));
        assert!(matches!(
            from_status(StatusCode::BAD_REQUEST, "bad query"),
            AdapterError::Validation(_)
        ));
        assert!(matches!(
            from_status(StatusCode::UNAUTHORIZED, ""),
            AdapterError::Validation(_)
        ));
    }

    #[test]
    fn test_error_body_is_truncated() {
        let body = "x".repeat(5_000);
        let AdapterError::Transient(message) = from_status(StatusCode::BAD_GATEWAY, &body) else {
            panic!("expected transient");
        };
        assert!(message.len() < 300);
    }
}
