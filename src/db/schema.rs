// src/db/schema.rs

//! SQLite schema for tracked apps and settings
//!
//! Versions are applied in order and recorded in `schema_version`, so an
//! older database is brought forward on open.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Version a freshly migrated database ends up at
pub const SCHEMA_VERSION: i32 = 1;

fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Highest applied version, 0 for a blank database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Apply every version above the recorded one
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Migrating database schema to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!("Schema migration complete. Now at version {}", SCHEMA_VERSION);
    Ok(())
}

fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(Error::InitError(format!(
            "Unknown migration version: {}",
            version
        ))),
    }
}

/// Version 1
///
/// - apps: one row per tracked GitHub repository
/// - settings: free-form key/value pairs (API token, last check time)
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating apps and settings tables");

    conn.execute_batch(
        "
        CREATE TABLE apps (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            repo_url TEXT NOT NULL,
            owner TEXT NOT NULL,
            repo TEXT NOT NULL,
            installed_version TEXT,
            latest_version TEXT,
            package_type TEXT NOT NULL
                CHECK(package_type IN ('deb', 'rpm', 'appimage', 'source')),
            install_path TEXT,
            added_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            auto_update INTEGER NOT NULL DEFAULT 0,
            include_prerelease INTEGER NOT NULL DEFAULT 0,
            UNIQUE(owner, repo)
        );

        CREATE INDEX idx_apps_name ON apps(name);

        CREATE TABLE settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        ",
    )?;

    info!("Created apps and settings tables");
    Ok(())
}
