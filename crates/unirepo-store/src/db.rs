//! Database connection management
//!
//! Opening and configuring SQLite connections

use std::path::Path;

use rusqlite::Connection;

use crate::errors::{open_error, Result};

/// Open a SQLite database at the given path
pub fn open<P: AsRef<Path>>(backend: &str, path: P) -> Result<Connection> {
    let conn = Connection::open(path).map_err(|e| open_error(backend, e))?;
    configure(backend, &conn, true)?;
    Ok(conn)
}

/// Open an in-memory SQLite database
pub fn open_in_memory(backend: &str) -> Result<Connection> {
    let conn = Connection::open_in_memory().map_err(|e| open_error(backend, e))?;
    configure(backend, &conn, false)?;
    Ok(conn)
}

/// Configure a connection
///
/// WAL only applies to file-backed databases; in-memory ones keep the
/// `memory` journal.
pub fn configure(backend: &str, conn: &Connection, file_backed: bool) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")
        .map_err(|e| open_error(backend, e))?;

    if file_backed {
        // journal_mode returns the resulting mode as a row
        let _mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| open_error(backend, e))?;
    }

    Ok(())
}
