use serde::{Deserialize, Serialize};

/// One observed membership join. The (conversation_id, subject_id, timestamp)
/// triple is the dedup key in the store; a rejoin at a different timestamp is
/// a distinct record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRecord {
    pub conversation_id: i64,
    pub subject_id: i64,
    pub display_name: Option<String>,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl JoinRecord {
    /// Display name if known, otherwise the numeric subject id.
    pub fn label(&self) -> String {
        match &self.display_name {
            Some(name) => name.clone(),
            None => self.subject_id.to_string(),
        }
    }
}

/// A merged burst interval. Indices point into the ascending timestamp
/// sequence the wave was computed from and mean nothing outside of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wave {
    pub start_index: usize,
    pub end_index: usize,
    pub count: usize,
}

impl Wave {
    pub fn new(start_index: usize, end_index: usize) -> Self {
        Self {
            start_index,
            end_index,
            count: end_index - start_index + 1,
        }
    }
}

/// A wave resolved against its records, as served by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveSummary {
    /// 1-based position in the report.
    pub index: usize,
    pub count: usize,
    pub start_timestamp: f64,
    pub end_timestamp: f64,
    pub members: Vec<String>,
}
