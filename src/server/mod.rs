//! HTTP server for the trigger.
//!
//! # Endpoints
//!
//! - `POST /webhook` - Accepts GitHub webhook deliveries (returns 202 Accepted)
//! - `GET /health` - Returns 200 if server is running

use std::fmt;
use std::sync::Arc;

use tracing::{Instrument, error, info_span};

use crate::catalog::JobCatalog;
use crate::github::GitHubClient;
use crate::jobs::JobStore;
use crate::webhooks::{Context, GitHubEvent, handle_event};

pub mod health;
pub mod webhook;

pub use health::health_handler;
pub use webhook::{WebhookError, webhook_handler};

type Dispatch = dyn Fn(GitHubEvent) + Send + Sync;

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Webhook secret for HMAC-SHA256 signature verification.
    webhook_secret: Vec<u8>,

    /// Receives every verified, parsed event. Must not block.
    dispatch: Box<Dispatch>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        webhook_secret: impl Into<Vec<u8>>,
        dispatch: impl Fn(GitHubEvent) + Send + Sync + 'static,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                webhook_secret: webhook_secret.into(),
                dispatch: Box::new(dispatch),
            }),
        }
    }

    /// State that handles each event on its own task against `ctx`.
    /// Handler failures are logged; GitHub does not see them.
    pub fn spawning<G, J, C>(webhook_secret: impl Into<Vec<u8>>, ctx: Arc<Context<G, J, C>>) -> Self
    where
        G: GitHubClient + 'static,
        J: JobStore + 'static,
        C: JobCatalog + 'static,
    {
        Self::new(webhook_secret, move |event| {
            let ctx = Arc::clone(&ctx);
            let span = info_span!(
                "event",
                guid = %event.guid(),
                kind = event.kind(),
                repo = %event.repo_id()
            );
            tokio::spawn(
                async move {
                    if let Err(e) = handle_event(&ctx, &event).await {
                        error!(error = %e, "Event handling failed");
                    }
                }
                .instrument(span),
            );
        })
    }

    /// Returns the webhook secret.
    pub fn webhook_secret(&self) -> &[u8] {
        &self.inner.webhook_secret
    }

    pub fn dispatch(&self, event: GitHubEvent) {
        (self.inner.dispatch)(event)
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
