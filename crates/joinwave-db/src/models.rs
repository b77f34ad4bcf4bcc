use joinwave_types::JoinRecord;

/// Row of the `joins` table. Kept apart from the shared model so column
/// naming can differ from the API.
pub struct JoinRow {
    pub chat_id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub joined_ts: f64,
}

impl From<JoinRow> for JoinRecord {
    fn from(row: JoinRow) -> Self {
        Self {
            conversation_id: row.chat_id,
            subject_id: row.user_id,
            display_name: row.username,
            timestamp: row.joined_ts,
        }
    }
}
