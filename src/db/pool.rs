use rusqlite::Connection;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Connection pool for the control-plane store (tenants + task ledger).
///
/// One writer behind a mutex, a small set of readers picked round-robin.
/// Tenant content stores are NOT served by this pool; they are opened per
/// activation through `tenant::store::TenantRouter`.
pub struct ControlPool {
    path: String,
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

impl ControlPool {
    pub fn open(path: &str, reader_count: usize) -> anyhow::Result<Self> {
        let writer = Connection::open(path)?;
        writer.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        let mut readers = Vec::with_capacity(reader_count);
        for _ in 0..reader_count {
            let r = Connection::open(path)?;
            r.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            readers.push(Mutex::new(r));
        }

        Ok(Self {
            path: path.to_string(),
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
        })
    }

    /// The on-disk path this pool was opened from. Workers use it to open
    /// their own pools instead of contending on the server's.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn write<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T>,
    {
        let conn = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("writer lock poisoned"))?;
        f(&conn)
    }

    pub fn read<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T>,
    {
        let start = self.next_reader.fetch_add(1, Ordering::Relaxed);
        for offset in 0..self.readers.len() {
            let idx = (start + offset) % self.readers.len();
            if let Ok(conn) = self.readers[idx].try_lock() {
                return f(&conn);
            }
        }
        // All busy: block on the one we were assigned.
        let conn = self.readers[start % self.readers.len()]
            .lock()
            .map_err(|_| anyhow::anyhow!("reader lock poisoned"))?;
        f(&conn)
    }
}
