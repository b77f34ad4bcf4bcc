use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// Brings the schema up to date. Safe to call on every open.
pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Join DB: running migration v1 (joins table)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE IF NOT EXISTS joins (
                chat_id     INTEGER NOT NULL,
                user_id     INTEGER NOT NULL,
                username    TEXT,
                joined_ts   REAL NOT NULL,
                PRIMARY KEY (chat_id, user_id, joined_ts)
            );

            CREATE INDEX IF NOT EXISTS idx_joins_chat_ts
                ON joins(chat_id, joined_ts);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    Ok(())
}
