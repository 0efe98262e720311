/// Timeline synchronization between a local edit session and a shared backend document.
/// Optimistic local history, poll + push reconciliation, and resume-time conflict decisions.
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

mod config;
pub use config::*;

mod history;
pub use history::*;

mod backend;
pub use backend::*;

mod memory;
pub use memory::*;

mod http;
pub use http::*;

mod activity;
pub use activity::*;

mod document;
pub use document::*;

mod editor;
pub use editor::*;

mod reconciler;
pub use reconciler::*;

mod notify;
pub use notify::*;

mod resume;
pub use resume::*;

mod session;
pub use session::*;

#[derive(Debug, Error)]
pub enum CollaborationError {
    #[error("network error: {0}")]
    NetworkError(String),

    #[error("backend returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("timeline error: {0}")]
    Timeline(#[from] timeline::TimelineError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("sync is already running")]
    SyncActive,

    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

impl From<reqwest::Error> for CollaborationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            CollaborationError::SerializationError(e.to_string())
        } else {
            CollaborationError::NetworkError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for CollaborationError {
    fn from(e: serde_json::Error) -> Self {
        CollaborationError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CollaborationError>;

/// Identity of a writer: a user session, a collaborator, or the automation agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Backend document identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
