use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{StreamExt, stream};
use joinwave_db::{InsertOutcome, JoinStore};
use joinwave_types::{ConversationHandle, JoinRecord, RawEvent};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::action::MemberAction;
use crate::outcome::{ScanError, ScanOutcome, ScanStop, SkipReason};
use crate::source::{EventSource, SourceError};

/// Conversation id used when a handle cannot be resolved. The scan still
/// runs; its records land under this id.
pub const UNRESOLVED_CONVERSATION_ID: i64 = 0;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Maximum number of events pulled from the source.
    pub limit: usize,
    /// Display-name lookups in flight at once within one event.
    pub resolve_concurrency: usize,
    pub timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            limit: 2000,
            resolve_concurrency: 8,
            timeout: None,
            cancel: CancellationToken::new(),
        }
    }
}

/// Numeric handles are used as-is; named ones go through the source and
/// fall back to [`UNRESOLVED_CONVERSATION_ID`] on failure.
pub async fn resolve_conversation<E: EventSource>(source: &E, handle: &ConversationHandle) -> i64 {
    match handle {
        ConversationHandle::Id(id) => *id,
        ConversationHandle::Name(name) => match source.resolve_identifier(name).await {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    handle = %name,
                    "Could not resolve conversation, recording under id {}: {}",
                    UNRESOLVED_CONVERSATION_ID,
                    e
                );
                UNRESOLVED_CONVERSATION_ID
            }
        },
    }
}

/// Walks up to `options.limit` events of a conversation and stores one join
/// record per subject of every membership action.
///
/// Per-item problems (undecodable events, unreadable shapes, failed name
/// lookups, missing dates) are recorded in the outcome and never stop the
/// scan. A source failure, cancellation or timeout ends the scan early with a
/// partial outcome; cancellation and timeout also cut short handle resolution
/// and the name lookups and writes of the current event. A store failure is
/// returned as [`ScanError::Persistence`], carrying the partial outcome.
pub async fn scan_history<E, S>(
    source: &E,
    store: Arc<S>,
    handle: &ConversationHandle,
    options: &ScanOptions,
) -> Result<ScanOutcome, ScanError>
where
    E: EventSource,
    S: JoinStore + 'static,
{
    let deadline = options.timeout.map(|t| Instant::now() + t);
    let cancel = options.cancel.clone();

    let resolved = tokio::select! {
        biased;
        stop = interrupted(&cancel, deadline) => Err(stop),
        id = resolve_conversation(source, handle) => Ok(id),
    };
    let conversation_id = match resolved {
        Ok(id) => id,
        Err(stop) => {
            warn!(%handle, ?stop, "Scan interrupted while resolving conversation");
            let mut outcome = ScanOutcome::new(UNRESOLVED_CONVERSATION_ID);
            outcome.stop = stop;
            return Ok(outcome);
        }
    };

    let outcome = ScanOutcome::new(conversation_id);
    let span = info_span!("scan", scan_id = %outcome.scan_id, conversation_id);

    Scan {
        source,
        store,
        options,
        cancel,
        deadline,
        outcome,
    }
    .run(handle)
    .instrument(span)
    .await
}

struct Scan<'a, E, S> {
    source: &'a E,
    store: Arc<S>,
    options: &'a ScanOptions,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    outcome: ScanOutcome,
}

impl<E, S> Scan<'_, E, S>
where
    E: EventSource,
    S: JoinStore + 'static,
{
    async fn run(mut self, handle: &ConversationHandle) -> Result<ScanOutcome, ScanError> {
        info!(%handle, limit = self.options.limit, "Scanning history for joins");

        let cancel = self.cancel.clone();
        let deadline = self.deadline;
        let limit = self.options.limit;
        let source = self.source;
        // one past the limit tells a truncated history from an exhausted one
        let mut events = source.events(handle, limit.saturating_add(1));

        loop {
            let next = tokio::select! {
                biased;
                stop = interrupted(&cancel, deadline) => {
                    self.outcome.stop = stop;
                    break;
                }
                next = events.next() => next,
            };

            if next.is_some() && self.outcome.events_seen >= limit {
                self.outcome.stop = ScanStop::LimitReached;
                break;
            }

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(SourceError::MalformedEvent { event_id, reason })) => {
                    warn!(event_id, "Undecodable event, skipping: {}", reason);
                    self.outcome.events_seen += 1;
                    self.outcome.skip(event_id, SkipReason::MalformedEvent(reason));
                    continue;
                }
                Some(Err(e)) => {
                    error!("Event source failed, ending scan early: {}", e);
                    self.outcome.stop = ScanStop::SourceFailed(e.to_string());
                    break;
                }
                None => break,
            };

            self.outcome.events_seen += 1;
            let processed = tokio::select! {
                biased;
                stop = interrupted(&cancel, deadline) => Err(stop),
                result = self.process(&event) => Ok(result),
            };

            match processed {
                Ok(Ok(())) => {}
                Ok(Err(source)) => {
                    error!(
                        event_id = event.id,
                        "Join store failed, aborting scan: {:#}", source
                    );
                    return Err(ScanError::Persistence {
                        outcome: Box::new(self.outcome),
                        source,
                    });
                }
                Err(stop) => {
                    warn!(event_id = event.id, ?stop, "Scan interrupted mid-event");
                    self.outcome.stop = stop;
                    break;
                }
            }
        }

        info!(
            events = self.outcome.events_seen,
            normalized = self.outcome.normalized,
            inserted = self.outcome.inserted,
            duplicates = self.outcome.duplicates,
            skipped = self.outcome.skipped.len(),
            stop = ?self.outcome.stop,
            "Scan finished"
        );
        Ok(self.outcome)
    }

    /// Only store errors escape; everything else is folded into the outcome.
    async fn process(&mut self, event: &RawEvent) -> anyhow::Result<()> {
        let Some(action) = &event.action else {
            return Ok(());
        };
        if !action.kind.is_membership_change() {
            return Ok(());
        }

        let Some(shape) = MemberAction::classify(action, event.sender.as_ref()) else {
            warn!(event_id = event.id, "Membership action names no subject, skipping");
            self.outcome.skip(event.id, SkipReason::NoSubjectShape);
            return Ok(());
        };

        let extraction = shape.extract();
        for reason in extraction.rejected {
            warn!(event_id = event.id, shape = shape.name(), "Unreadable subject: {}", reason);
            self.outcome.skip(event.id, SkipReason::InvalidSubject(reason));
        }
        if extraction.ids.is_empty() {
            return Ok(());
        }

        let timestamp = match event.date {
            Some(date) => epoch_seconds(date),
            None => {
                warn!(
                    event_id = event.id,
                    "Event has no date, stamping joins with current time"
                );
                self.outcome.degraded_timestamps += extraction.ids.len();
                epoch_seconds(Utc::now())
            }
        };

        let source = self.source;
        let names: Vec<_> = stream::iter(extraction.ids)
            .map(move |subject_id| async move {
                (subject_id, source.resolve_display_name(subject_id).await)
            })
            .buffered(self.options.resolve_concurrency.max(1))
            .collect()
            .await;

        for (subject_id, name) in names {
            let display_name = match name {
                Ok(name) => name,
                Err(e) => {
                    warn!(event_id = event.id, subject_id, "Name lookup failed: {}", e);
                    self.outcome.unresolved_names += 1;
                    None
                }
            };

            let record = JoinRecord {
                conversation_id: self.outcome.conversation_id,
                subject_id,
                display_name,
                timestamp,
            };
            self.persist(record).await?;
        }

        Ok(())
    }

    async fn persist(&mut self, record: JoinRecord) -> anyhow::Result<()> {
        let store = self.store.clone();
        let subject_id = record.subject_id;
        let result = tokio::task::spawn_blocking(move || store.insert_if_absent(&record))
            .await
            .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

        match result {
            InsertOutcome::Inserted => self.outcome.inserted += 1,
            InsertOutcome::Duplicate => {
                debug!(subject_id, "Join already recorded");
                self.outcome.duplicates += 1;
            }
        }
        self.outcome.normalized += 1;
        Ok(())
    }
}

/// Resolves once the scan has to stop early.
async fn interrupted(cancel: &CancellationToken, deadline: Option<Instant>) -> ScanStop {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => ScanStop::Cancelled,
        _ = deadline_elapsed(deadline) => ScanStop::TimedOut,
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Fractional seconds since the epoch, microsecond precision.
fn epoch_seconds(date: DateTime<Utc>) -> f64 {
    date.timestamp() as f64 + f64::from(date.timestamp_subsec_micros()) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn epoch_seconds_keeps_subsecond_part() {
        let date = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        assert_eq!(epoch_seconds(date), 1_700_000_000.25);
    }
}
