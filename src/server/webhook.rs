//! Webhook endpoint handler.
//!
//! Verifies the delivery's signature, parses it into a [`GitHubEvent`] and
//! hands it to the dispatcher before returning 202 Accepted. Handling runs
//! in its own task, so a slow GitHub API never holds the delivery open.
//!
//! [`GitHubEvent`]: crate::webhooks::GitHubEvent

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::AppState;
use crate::types::EventGuid;
use crate::webhooks::{ParseError, SignatureError, parse_webhook, verify_payload};

/// Header name for GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for GitHub signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// Errors that can occur when accepting a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid signature: {0}")]
    InvalidSignature(#[source] SignatureError),

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] ParseError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingHeader(_) | WebhookError::InvalidPayload(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
        };
        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// # Response
///
/// - 202 Accepted: the event was dispatched, or is of a kind nothing acts on
/// - 400 Bad Request: missing header or malformed payload
/// - 401 Unauthorized: missing or wrong signature
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let event_type = get_header(&headers, HEADER_EVENT)?;
    let guid = EventGuid::new(get_header(&headers, HEADER_DELIVERY)?);

    debug!(guid = %guid, event_type = %event_type, "Received webhook");

    // Nothing in the body is trusted until the signature checks out.
    let signature = headers.get(HEADER_SIGNATURE).and_then(|v| v.to_str().ok());
    verify_payload(&body, signature, app_state.webhook_secret()).map_err(|e| {
        warn!(guid = %guid, error = %e, "Rejecting webhook");
        WebhookError::InvalidSignature(e)
    })?;

    match parse_webhook(&event_type, &guid, &body)? {
        Some(event) => {
            info!(guid = %guid, event_type = %event_type, "Dispatching webhook");
            app_state.dispatch(event);
            Ok((StatusCode::ACCEPTED, "Accepted"))
        }
        None => {
            debug!(guid = %guid, event_type = %event_type, "Nothing to do for webhook");
            Ok((StatusCode::ACCEPTED, "Ignored"))
        }
    }
}

/// Extracts a required header value as a string.
fn get_header(headers: &HeaderMap, name: &'static str) -> Result<String, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or(WebhookError::MissingHeader(name))
}
