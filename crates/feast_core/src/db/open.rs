//! Store location and connection bootstrap.
//!
//! # Responsibility
//! - Create the `Database` directory on demand.
//! - Open file or in-memory SQLite connections and migrate them.
//!
//! # Invariants
//! - Returned connections have migrations fully applied.
//! - `migration_performed` is only true for an existing, older schema.

use super::migrations::apply_migrations;
use super::DbResult;
use log::{error, info, warn};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const DATABASE_DIR_NAME: &str = "Database";

/// A migrated connection plus what happened while opening it.
#[derive(Debug)]
pub struct OpenedStore {
    pub conn: Connection,
    pub migration_performed: bool,
}

/// Returns `<base>/Database`, creating it when missing.
///
/// Creation failures are logged, not returned; opening the store inside a
/// missing directory fails later with the real cause.
pub fn database_directory(base: impl AsRef<Path>) -> PathBuf {
    let dir = base.as_ref().join(DATABASE_DIR_NAME);
    if let Err(err) = std::fs::create_dir_all(&dir) {
        warn!(
            "event=db_dir_create module=db status=error path={} error={}",
            dir.display(),
            err
        );
    }
    dir
}

/// Opens the store file at `path` and applies all pending migrations.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_store(path: impl AsRef<Path>) -> DbResult<OpenedStore> {
    let path = path.as_ref();
    let started_at = Instant::now();
    info!(
        "event=db_open module=db status=start mode=file path={}",
        path.display()
    );

    let result = Connection::open(path)
        .map_err(Into::into)
        .and_then(bootstrap_connection);
    log_open_result("file", started_at, result)
}

/// Opens an in-memory store; used by tests and dry runs.
pub fn open_store_in_memory() -> DbResult<OpenedStore> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode=memory");

    let result = Connection::open_in_memory()
        .map_err(Into::into)
        .and_then(bootstrap_connection);
    log_open_result("memory", started_at, result)
}

fn log_open_result(
    mode: &str,
    started_at: Instant,
    result: DbResult<OpenedStore>,
) -> DbResult<OpenedStore> {
    match &result {
        Ok(store) => info!(
            "event=db_open module=db status=ok mode={} duration_ms={} migration_performed={}",
            mode,
            started_at.elapsed().as_millis(),
            store.migration_performed
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode={} duration_ms={} error_code={} error={}",
            mode,
            started_at.elapsed().as_millis(),
            err.code(),
            err
        ),
    }
    result
}

fn bootstrap_connection(mut conn: Connection) -> DbResult<OpenedStore> {
    conn.busy_timeout(Duration::from_secs(5))?;
    let report = apply_migrations(&mut conn)?;
    Ok(OpenedStore {
        conn,
        migration_performed: report.upgraded_existing_schema(),
    })
}
