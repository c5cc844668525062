//! Webhook handling for GitHub events.
//!
//! This module provides:
//! - Signature verification for webhook payloads (HMAC-SHA256)
//! - Parsing of the event types the trigger acts on
//! - The handlers that turn events into jobs, statuses, labels and comments

pub mod events;
pub mod handlers;
pub mod parser;
pub mod signature;

pub use events::{
    CommentAction, CommentKind, GenericCommentEvent, GitHubEvent, PrAction, PullRequestEvent,
    PushEvent,
};
pub use handlers::{Context, HandlerError, handle_event};
pub use parser::{ParseError, parse_webhook};
pub use signature::{SignatureError, sign_payload, verify_payload};
