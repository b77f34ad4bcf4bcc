use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Why an event, or one entry of it, produced no record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// Membership action with no users listed and no usable sender.
    NoSubjectShape,
    /// An entry in the matched shape could not be read as a user id.
    InvalidSubject(String),
    /// The source could not decode the event at all.
    MalformedEvent(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedItem {
    pub event_id: i64,
    pub reason: SkipReason,
}

/// How the event loop ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ScanStop {
    Completed,
    LimitReached,
    Cancelled,
    TimedOut,
    SourceFailed(String),
}

/// Aggregate of per-item results for one scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub scan_id: Uuid,
    pub conversation_id: i64,
    pub events_seen: usize,
    /// Records normalized and handed to the store, new or not.
    pub normalized: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub unresolved_names: usize,
    /// Records stamped with wall-clock time because the event had no date.
    pub degraded_timestamps: usize,
    pub skipped: Vec<SkippedItem>,
    pub stop: ScanStop,
}

impl ScanOutcome {
    pub fn new(conversation_id: i64) -> Self {
        Self {
            scan_id: Uuid::new_v4(),
            conversation_id,
            events_seen: 0,
            normalized: 0,
            inserted: 0,
            duplicates: 0,
            unresolved_names: 0,
            degraded_timestamps: 0,
            skipped: Vec::new(),
            stop: ScanStop::Completed,
        }
    }

    pub(crate) fn skip(&mut self, event_id: i64, reason: SkipReason) {
        self.skipped.push(SkippedItem { event_id, reason });
    }
}

#[derive(Debug, Error)]
pub enum ScanError {
    /// The store rejected a write. The scan stopped there; `outcome` holds
    /// everything done up to that point.
    #[error("join store failed after {} records: {source:#}", .outcome.normalized)]
    Persistence {
        outcome: Box<ScanOutcome>,
        source: anyhow::Error,
    },
}

impl ScanError {
    pub fn partial_outcome(&self) -> &ScanOutcome {
        match self {
            Self::Persistence { outcome, .. } => outcome,
        }
    }
}
