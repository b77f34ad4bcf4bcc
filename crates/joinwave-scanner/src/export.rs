use std::collections::HashMap;
use std::path::Path;

use futures_util::stream::{self, BoxStream, StreamExt};
use joinwave_types::{ConversationHandle, RawEvent};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::source::{EventSource, SourceError};

/// One exported conversation file. Events and users stay as raw JSON so a
/// bad entry only costs that entry.
#[derive(Debug, Deserialize)]
struct ConversationExport {
    id: i64,
    #[serde(default)]
    handle: Option<String>,
    #[serde(default)]
    events: Vec<Value>,
    #[serde(default)]
    users: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ExportUser {
    id: i64,
    #[serde(default)]
    username: Option<String>,
}

/// Event source backed by a directory of JSON conversation exports, one
/// `*.json` file per conversation. Handles match the file's `handle` field or
/// its file stem, case-insensitively and with an optional leading `@`.
pub struct ExportSource {
    conversations: Vec<ConversationExport>,
    by_handle: HashMap<String, usize>,
    by_id: HashMap<i64, usize>,
    names: HashMap<i64, Option<String>>,
}

fn normalize_handle(handle: &str) -> String {
    handle.trim_start_matches('@').to_lowercase()
}

impl ExportSource {
    pub async fn load(dir: &Path) -> Result<Self, SourceError> {
        let mut source = Self {
            conversations: Vec::new(),
            by_handle: HashMap::new(),
            by_id: HashMap::new(),
            names: HashMap::new(),
        };

        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let export = match read_export(&path).await {
                Ok(export) => export,
                Err(e) => {
                    warn!("Skipping unreadable export: {}", e);
                    continue;
                }
            };

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .map(normalize_handle);
            debug!(
                path = %path.display(),
                conversation_id = export.id,
                events = export.events.len(),
                "Loaded conversation export"
            );
            source.add(export, stem);
        }

        info!(
            "Loaded {} conversation export(s) from {}",
            source.conversations.len(),
            dir.display()
        );
        Ok(source)
    }

    fn add(&mut self, export: ConversationExport, stem: Option<String>) {
        let idx = self.conversations.len();
        if let Some(prev) = self.by_id.insert(export.id, idx) {
            warn!(
                conversation_id = export.id,
                "Conversation exported twice, later file wins (earlier index {})", prev
            );
        }
        for handle in export.handle.as_deref().map(normalize_handle).into_iter().chain(stem) {
            self.by_handle.insert(handle, idx);
        }
        for raw in &export.users {
            let user = match ExportUser::deserialize(raw) {
                Ok(user) => user,
                Err(e) => {
                    warn!(conversation_id = export.id, "Ignoring malformed user entry: {}", e);
                    continue;
                }
            };
            // a named entry beats an anonymous one from another export
            let slot = self.names.entry(user.id).or_insert(None);
            if user.username.is_some() {
                *slot = user.username;
            }
        }
        self.conversations.push(export);
    }

    fn find(&self, conversation: &ConversationHandle) -> Option<&ConversationExport> {
        let idx = match conversation {
            ConversationHandle::Id(id) => self.by_id.get(id),
            ConversationHandle::Name(name) => self.by_handle.get(&normalize_handle(name)),
        }?;
        self.conversations.get(*idx)
    }
}

async fn read_export(path: &Path) -> Result<ConversationExport, SourceError> {
    let raw = tokio::fs::read(path).await?;
    serde_json::from_slice(&raw).map_err(|source| SourceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn decode_event(raw: &Value) -> Result<RawEvent, SourceError> {
    RawEvent::deserialize(raw).map_err(|e| SourceError::MalformedEvent {
        event_id: raw.get("id").and_then(Value::as_i64).unwrap_or_default(),
        reason: e.to_string(),
    })
}

impl EventSource for ExportSource {
    fn events<'a>(
        &'a self,
        conversation: &'a ConversationHandle,
        limit: usize,
    ) -> BoxStream<'a, Result<RawEvent, SourceError>> {
        match self.find(conversation) {
            Some(export) => stream::iter(export.events.iter().take(limit).map(decode_event)).boxed(),
            None => stream::once(async move {
                Err(SourceError::NotFound(format!("conversation {}", conversation)))
            })
            .boxed(),
        }
    }

    async fn resolve_identifier(&self, handle: &str) -> Result<i64, SourceError> {
        self.by_handle
            .get(&normalize_handle(handle))
            .and_then(|idx| self.conversations.get(*idx))
            .map(|export| export.id)
            .ok_or_else(|| SourceError::NotFound(format!("conversation handle {}", handle)))
    }

    async fn resolve_display_name(&self, subject_id: i64) -> Result<Option<String>, SourceError> {
        self.names
            .get(&subject_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("user {}", subject_id)))
    }
}
