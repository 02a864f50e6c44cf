//! Schema history of the restaurant store.
//!
//! - v1: `restaurants` keyed by `object_id`, with `identifier`, `idx`, `name`.
//! - v2: nullable `latitude`/`longitude` and a non-unique `identifier` index.
//!
//! # Invariants
//! - Versions increase by one per step; the store's version lives in
//!   `PRAGMA user_version`.
//! - A store newer than [`latest_version`] is never touched.
//! - All pending steps commit together or not at all.

use crate::db::{DbError, DbResult};
use log::debug;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("0001_init.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("0002_location.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Outcome of a migration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
}

impl MigrationReport {
    /// True when an already-initialized schema was upgraded.
    pub fn upgraded_existing_schema(&self) -> bool {
        self.from_version > 0 && self.from_version < self.to_version
    }
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<MigrationReport> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::MissingSourceModel {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    let report = MigrationReport {
        from_version: current_version,
        to_version: latest,
    };
    if current_version == latest {
        return Ok(report);
    }

    let pending: Vec<&Migration> = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current_version)
        .collect();
    let tx = conn.transaction()?;
    for migration in &pending {
        debug!(
            "event=db_migrate module=db status=apply version={}",
            migration.version
        );
        tx.execute_batch(migration.sql)?;
    }
    tx.pragma_update(None, "user_version", latest)?;
    tx.commit()?;
    debug!(
        "event=db_migrate module=db status=ok from_version={} to_version={} steps={}",
        current_version,
        latest,
        pending.len()
    );

    Ok(report)
}

/// Reads `PRAGMA user_version` without applying anything.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
