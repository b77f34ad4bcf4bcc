use crate::models::JoinRow;
use crate::{Database, InsertOutcome};
use anyhow::Result;
use joinwave_types::JoinRecord;
use rusqlite::Connection;

impl Database {
    // -- Joins --

    /// `INSERT OR IGNORE` on the composite primary key. Returns whether a row
    /// was actually written.
    pub fn insert_join(&self, record: &JoinRecord) -> Result<InsertOutcome> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO joins (chat_id, user_id, username, joined_ts) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    record.conversation_id,
                    record.subject_id,
                    record.display_name,
                    record.timestamp
                ],
            )?;
            Ok(if changed == 0 {
                InsertOutcome::Duplicate
            } else {
                InsertOutcome::Inserted
            })
        })
    }

    pub fn get_joins(&self, conversation_id: i64) -> Result<Vec<JoinRecord>> {
        self.with_conn(|conn| query_joins(conn, conversation_id))
    }

    pub fn count_joins(&self, conversation_id: i64) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM joins WHERE chat_id = ?1",
                [conversation_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

fn query_joins(conn: &Connection, conversation_id: i64) -> Result<Vec<JoinRecord>> {
    // rowid breaks timestamp ties in insertion order
    let mut stmt = conn.prepare(
        "SELECT chat_id, user_id, username, joined_ts
         FROM joins
         WHERE chat_id = ?1
         ORDER BY joined_ts ASC, rowid ASC",
    )?;

    let rows = stmt
        .query_map([conversation_id], |row| {
            Ok(JoinRow {
                chat_id: row.get(0)?,
                user_id: row.get(1)?,
                username: row.get(2)?,
                joined_ts: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows.into_iter().map(JoinRecord::from).collect())
}
