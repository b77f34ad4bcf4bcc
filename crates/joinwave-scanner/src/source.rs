use std::future::Future;
use std::path::PathBuf;

use futures_util::stream::BoxStream;
use joinwave_types::{ConversationHandle, RawEvent};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("source unavailable: {0}")]
    Unavailable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed export {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// One event could not be decoded. The stream goes on after it.
    #[error("malformed event {event_id}: {reason}")]
    MalformedEvent { event_id: i64, reason: String },
}

/// Where conversation history comes from. Every call may fail on its own;
/// the scanner decides which failures are fatal.
pub trait EventSource: Send + Sync {
    /// Lazily yields at most `limit` events of the conversation, in the
    /// source's native order. A [`SourceError::MalformedEvent`] item stands in
    /// for an undecodable event; any other error ends the stream.
    fn events<'a>(
        &'a self,
        conversation: &'a ConversationHandle,
        limit: usize,
    ) -> BoxStream<'a, Result<RawEvent, SourceError>>;

    /// Maps a public handle to the conversation's numeric id.
    fn resolve_identifier(&self, handle: &str)
    -> impl Future<Output = Result<i64, SourceError>> + Send;

    /// Best-effort display name of a user. `Ok(None)` means the user exists
    /// but has no name.
    fn resolve_display_name(
        &self,
        subject_id: i64,
    ) -> impl Future<Output = Result<Option<String>, SourceError>> + Send;
}
