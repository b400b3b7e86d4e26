use crate::error::Result;
use rusqlite::Connection;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(0);

/// A savepoint covering one write operation.
///
/// Scopes nest: a scope opened while another is active only becomes durable
/// when the outermost one is committed. Dropping a scope without calling
/// `commit` rolls back everything done inside it.
pub(crate) struct WriteScope<'a> {
    conn: &'a Connection,
    name: String,
    finished: bool,
}

impl<'a> WriteScope<'a> {
    pub(crate) fn begin(conn: &'a Connection) -> Result<Self> {
        let id = NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed);
        let name = format!("gpkg_write_{id}");
        conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        Ok(Self {
            conn,
            name,
            finished: false,
        })
    }

    pub(crate) fn commit(mut self) -> Result<()> {
        self.conn.execute_batch(&format!("RELEASE {}", self.name))?;
        self.finished = true;
        Ok(())
    }
}

impl Drop for WriteScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let sql = format!("ROLLBACK TO {name}; RELEASE {name}", name = self.name);
        if let Err(err) = self.conn.execute_batch(&sql) {
            log::error!("failed to roll back savepoint {}: {err}", self.name);
        }
    }
}
