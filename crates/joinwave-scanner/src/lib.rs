//! History scanning: pull a bounded slice of a conversation's events from an
//! [`EventSource`], turn membership actions into join records, and append
//! them to a [`joinwave_db::JoinStore`].

pub mod action;
pub mod export;
pub mod outcome;
pub mod scan;
pub mod source;

pub use action::{Extraction, MemberAction};
pub use export::ExportSource;
pub use outcome::{ScanError, ScanOutcome, ScanStop, SkipReason, SkippedItem};
pub use scan::{ScanOptions, resolve_conversation, scan_history};
pub use source::{EventSource, SourceError};
