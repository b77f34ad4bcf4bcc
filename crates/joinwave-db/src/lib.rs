pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use joinwave_types::JoinRecord;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

const READER_POOL_SIZE: usize = 4;

/// Result of a conditional insert on the (conversation, subject, timestamp) key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
}

/// Append-only, deduplicated join log. No update or delete is offered.
pub trait JoinStore: Send + Sync {
    /// Idempotent schema setup.
    fn initialize(&self) -> Result<()>;

    /// Atomic check-and-insert. Racing callers on the same key never produce
    /// two rows.
    fn insert_if_absent(&self, record: &JoinRecord) -> Result<InsertOutcome>;

    /// All records of a conversation, ascending by timestamp, ties in
    /// insertion order.
    fn fetch_ordered(&self, conversation_id: i64) -> Result<Vec<JoinRecord>>;
}

/// SQLite-backed join store: one writer connection, a small pool of
/// read-only connections so reads never queue behind inserts.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.busy_timeout(std::time::Duration::from_secs(5))?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                    | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Join DB opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    /// Private in-memory database. Reads go through the writer connection.
    pub fn open_in_memory() -> Result<Self> {
        let writer = Connection::open_in_memory()?;
        migrations::run(&writer)?;
        Ok(Self {
            writer: Mutex::new(writer),
            readers: Vec::new(),
            reader_idx: AtomicUsize::new(0),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        if self.readers.is_empty() {
            return self.with_conn_mut(f);
        }
        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| anyhow::anyhow!("Reader lock poisoned: {}", e))?;
        f(&conn)
    }

    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("Writer lock poisoned: {}", e))?;
        f(&conn)
    }
}

impl JoinStore for Database {
    fn initialize(&self) -> Result<()> {
        self.with_conn_mut(migrations::run)
    }

    fn insert_if_absent(&self, record: &JoinRecord) -> Result<InsertOutcome> {
        self.insert_join(record)
    }

    fn fetch_ordered(&self, conversation_id: i64) -> Result<Vec<JoinRecord>> {
        self.get_joins(conversation_id)
    }
}
