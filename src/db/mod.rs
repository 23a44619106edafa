// src/db/mod.rs

//! Tracking store
//!
//! One SQLite file holds every tracked app and the stored settings. The rest
//! of the crate persists through the [`AppStore`] trait, implemented here for
//! a plain `rusqlite::Connection`.

pub mod models;
pub mod schema;

use crate::error::{Error, Result};
use models::{Setting, TrackedApp};
use rusqlite::Connection;
use std::path::Path;
use tracing::{debug, info};

/// Create the database file (and its directory) and migrate it
///
/// Safe to call on an existing database.
pub fn init(db_path: &str) -> Result<()> {
    debug!("Creating tracking database at {}", db_path);

    if let Some(parent) = Path::new(db_path).parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::InitError(format!("Cannot create {}: {}", parent.display(), e)))?;
    }

    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;

    info!("Tracking database ready at {}", db_path);
    Ok(())
}

/// Open an existing database; a missing file is `DatabaseNotFound`
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        return Err(Error::DatabaseNotFound(db_path.to_string()));
    }

    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    Ok(conn)
}

/// Open the database, creating and migrating it first if needed
pub fn open_or_init(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        init(db_path)?;
    }
    let conn = open(db_path)?;
    schema::migrate(&conn)?;
    Ok(conn)
}

/// Persisted tracking store
///
/// The flows in `tracker` only ever go through these operations, so the
/// storage engine behind them is interchangeable.
pub trait AppStore {
    /// Insert a new record, assigning its id
    fn add_app(&self, app: &mut TrackedApp) -> Result<i64>;

    /// All tracked apps ordered by name
    fn get_all_apps(&self) -> Result<Vec<TrackedApp>>;

    fn get_app_by_id(&self, id: i64) -> Result<Option<TrackedApp>>;

    fn get_app_by_owner_repo(&self, owner: &str, repo: &str) -> Result<Option<TrackedApp>>;

    /// Write back every mutable field and bump `updated_at`
    fn update_app(&self, app: &mut TrackedApp) -> Result<()>;

    /// Stop tracking an app; never uninstalls anything
    fn delete_app(&self, id: i64) -> Result<()>;

    fn get_setting(&self, key: &str) -> Result<Option<String>>;

    fn set_setting(&self, key: &str, value: &str) -> Result<()>;
}

impl AppStore for Connection {
    fn add_app(&self, app: &mut TrackedApp) -> Result<i64> {
        app.insert(self)
    }

    fn get_all_apps(&self) -> Result<Vec<TrackedApp>> {
        TrackedApp::list_all(self)
    }

    fn get_app_by_id(&self, id: i64) -> Result<Option<TrackedApp>> {
        TrackedApp::find_by_id(self, id)
    }

    fn get_app_by_owner_repo(&self, owner: &str, repo: &str) -> Result<Option<TrackedApp>> {
        TrackedApp::find_by_owner_repo(self, owner, repo)
    }

    fn update_app(&self, app: &mut TrackedApp) -> Result<()> {
        app.update(self)
    }

    fn delete_app(&self, id: i64) -> Result<()> {
        TrackedApp::delete(self, id)
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Setting::get(self, key)
    }

    fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        Setting::set(self, key, value)
    }
}
