//! Error taxonomy for the bot core.
//!
//! Drops (malformed payloads, messages before the handshake, packets for
//! another node) never surface as errors: the router logs and discards them.
//! Everything that can reach a handler or the process owner is typed here.
use thiserror::Error;

/// Failures of the persisted session store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading, writing or renaming the store file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The store file could not be parsed, or the store could not be serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The exclusive file lock could not be taken.
    #[error("failed to lock {path}: {source}")]
    Lock {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the external completion backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request never produced an HTTP response.
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status.
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body was not the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The backend answered without any choice to use.
    #[error("backend returned no answer")]
    EmptyAnswer,
}

/// Failures of the transport send primitive.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("send to {to} failed: {reason}")]
    Send { to: String, reason: String },

    #[error("transport closed")]
    Closed,
}

/// Typed outcome of a failed command handler. Rendered to reply text in one place.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Missing or extra arguments; carries the hint shown to the user.
    #[error("usage: {0}")]
    Usage(&'static str),

    #[error(transparent)]
    Provider(ProviderError),

    #[error(transparent)]
    Persistence(StoreError),
}

/// Error returned by [`crate::storage::SessionStore::ask`], which can fail in
/// either the provider call or the write that follows it.
#[derive(Debug, Error)]
pub enum AskError {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<AskError> for CommandError {
    fn from(e: AskError) -> Self {
        match e {
            AskError::Provider(p) => CommandError::Provider(p),
            AskError::Store(s) => CommandError::Persistence(s),
        }
    }
}

impl From<StoreError> for CommandError {
    fn from(e: StoreError) -> Self {
        CommandError::Persistence(e)
    }
}

/// The router has stopped and no longer accepts transport events.
#[derive(Debug, Error)]
#[error("event queue closed")]
pub struct QueueClosed;
