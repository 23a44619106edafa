// src/db/models.rs

//! Data models for Autonomix database entities
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading, updating, and deleting records.

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fmt;
use std::str::FromStr;

/// How a tracked app gets installed on this machine
///
/// Fixed when the app is added. Tarball and zip release assets are both
/// handled by the source backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallType {
    Deb,
    Rpm,
    AppImage,
    Source,
}

impl InstallType {
    pub const ALL: [InstallType; 4] = [
        InstallType::Deb,
        InstallType::Rpm,
        InstallType::AppImage,
        InstallType::Source,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            InstallType::Deb => "deb",
            InstallType::Rpm => "rpm",
            InstallType::AppImage => "appimage",
            InstallType::Source => "source",
        }
    }
}

impl FromStr for InstallType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deb" => Ok(InstallType::Deb),
            "rpm" => Ok(InstallType::Rpm),
            "appimage" => Ok(InstallType::AppImage),
            "source" | "tarball" | "zip" => Ok(InstallType::Source),
            _ => Err(format!("Invalid package type: {}", s)),
        }
    }
}

impl fmt::Display for InstallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const APP_COLUMNS: &str = "id, name, repo_url, owner, repo, installed_version, latest_version, \
     package_type, install_path, added_at, updated_at, auto_update, include_prerelease";

/// A repository the user tracks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedApp {
    pub id: Option<i64>,
    pub name: String,
    pub repo_url: String,
    pub owner: String,
    pub repo: String,
    /// `None` means not installed
    pub installed_version: Option<String>,
    /// `None` means never checked
    pub latest_version: Option<String>,
    pub package_type: InstallType,
    pub install_path: Option<String>,
    pub added_at: Option<String>,
    pub updated_at: Option<String>,
    pub auto_update: bool,
    pub include_prerelease: bool,
}

impl TrackedApp {
    /// Create a new, not yet installed, record
    pub fn new(name: &str, owner: &str, repo: &str, package_type: InstallType) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            repo_url: format!("https://github.com/{}/{}", owner, repo),
            owner: owner.to_string(),
            repo: repo.to_string(),
            installed_version: None,
            latest_version: None,
            package_type,
            install_path: None,
            added_at: None,
            updated_at: None,
            auto_update: false,
            include_prerelease: false,
        }
    }

    /// True iff both versions are known and differ
    ///
    /// Plain string inequality: a re-tagged release with a cosmetic change
    /// still counts as an update.
    pub fn has_update(&self) -> bool {
        match (&self.installed_version, &self.latest_version) {
            (Some(installed), Some(latest)) => installed != latest,
            _ => false,
        }
    }

    pub fn is_installed(&self) -> bool {
        self.installed_version.is_some()
    }

    /// `owner/repo`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Insert this app into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO apps (name, repo_url, owner, repo, installed_version, latest_version,
                               package_type, install_path, auto_update, include_prerelease)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &self.name,
                &self.repo_url,
                &self.owner,
                &self.repo,
                &self.installed_version,
                &self.latest_version,
                self.package_type.as_str(),
                &self.install_path,
                self.auto_update,
                self.include_prerelease,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);

        // Pick up the timestamps the database assigned
        if let Some(stored) = Self::find_by_id(conn, id)? {
            self.added_at = stored.added_at;
            self.updated_at = stored.updated_at;
        }

        Ok(id)
    }

    /// Find an app by ID
    pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!("SELECT {} FROM apps WHERE id = ?1", APP_COLUMNS))?;
        let app = stmt.query_row([id], Self::from_row).optional()?;
        Ok(app)
    }

    /// Find an app by its owner/repo pair
    pub fn find_by_owner_repo(conn: &Connection, owner: &str, repo: &str) -> Result<Option<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM apps WHERE owner = ?1 COLLATE NOCASE AND repo = ?2 COLLATE NOCASE",
            APP_COLUMNS
        ))?;
        let app = stmt.query_row([owner, repo], Self::from_row).optional()?;
        Ok(app)
    }

    /// List all apps
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM apps ORDER BY name COLLATE NOCASE, id",
            APP_COLUMNS
        ))?;

        let apps = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(apps)
    }

    /// Persist every mutable field
    pub fn update(&mut self, conn: &Connection) -> Result<()> {
        let Some(id) = self.id else {
            return Err(crate::Error::NotFoundError(format!(
                "App {} has no id; insert it first",
                self.full_name()
            )));
        };

        let changed = conn.execute(
            "UPDATE apps SET name = ?1, installed_version = ?2, latest_version = ?3,
                             install_path = ?4, auto_update = ?5, include_prerelease = ?6,
                             updated_at = CURRENT_TIMESTAMP
             WHERE id = ?7",
            params![
                &self.name,
                &self.installed_version,
                &self.latest_version,
                &self.install_path,
                self.auto_update,
                self.include_prerelease,
                id,
            ],
        )?;

        if changed == 0 {
            return Err(crate::Error::NotFoundError(format!("App id {}", id)));
        }

        self.updated_at = conn
            .query_row("SELECT updated_at FROM apps WHERE id = ?1", [id], |row| row.get(0))
            .optional()?;

        Ok(())
    }

    /// Delete an app by ID
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM apps WHERE id = ?1", [id])?;
        Ok(())
    }

    /// Convert a database row to a TrackedApp
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let type_str: String = row.get(7)?;
        let package_type = type_str.parse::<InstallType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
            )
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            repo_url: row.get(2)?,
            owner: row.get(3)?,
            repo: row.get(4)?,
            installed_version: row.get(5)?,
            latest_version: row.get(6)?,
            package_type,
            install_path: row.get(8)?,
            added_at: row.get(9)?,
            updated_at: row.get(10)?,
            auto_update: row.get(11)?,
            include_prerelease: row.get(12)?,
        })
    }
}

/// Key/value settings
pub struct Setting;

impl Setting {
    pub const GITHUB_TOKEN: &'static str = "github_token";
    pub const LAST_CHECK: &'static str = "last_check";

    pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
        let value = conn
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, Connection) {
        let temp_file = NamedTempFile::new().unwrap();
        let conn = Connection::open(temp_file.path()).unwrap();
        schema::migrate(&conn).unwrap();
        (temp_file, conn)
    }

    #[test]
    fn test_install_type_parsing() {
        assert_eq!("deb".parse::<InstallType>().unwrap(), InstallType::Deb);
        assert_eq!("AppImage".parse::<InstallType>().unwrap(), InstallType::AppImage);
        assert_eq!("tarball".parse::<InstallType>().unwrap(), InstallType::Source);
        assert!("flatpak".parse::<InstallType>().is_err());
        assert_eq!(InstallType::Rpm.to_string(), "rpm");
    }

    #[test]
    fn test_has_update() {
        let mut app = TrackedApp::new("tool", "octo", "tool", InstallType::Deb);

        app.installed_version = Some("1.0".to_string());
        app.latest_version = Some("1.0".to_string());
        assert!(!app.has_update());

        app.latest_version = Some("1.1".to_string());
        assert!(app.has_update());

        app.installed_version = None;
        assert!(!app.has_update());

        app.installed_version = Some("1.0".to_string());
        app.latest_version = None;
        assert!(!app.has_update());
    }

    #[test]
    fn test_app_crud() {
        let (_temp, conn) = create_test_db();

        let mut app = TrackedApp::new("Tool", "octo", "tool", InstallType::AppImage);
        app.latest_version = Some("2.0".to_string());
        let id = app.insert(&conn).unwrap();
        assert!(id > 0);
        assert!(app.added_at.is_some());

        let found = TrackedApp::find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(found.name, "Tool");
        assert_eq!(found.package_type, InstallType::AppImage);
        assert_eq!(found.latest_version.as_deref(), Some("2.0"));
        assert!(found.installed_version.is_none());

        let by_repo = TrackedApp::find_by_owner_repo(&conn, "Octo", "TOOL").unwrap();
        assert_eq!(by_repo.map(|a| a.id), Some(Some(id)));

        app.installed_version = Some("2.0".to_string());
        app.install_path = Some("/home/u/.local/bin/tool.AppImage".to_string());
        app.update(&conn).unwrap();

        let updated = TrackedApp::find_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(updated.installed_version.as_deref(), Some("2.0"));
        assert!(!updated.has_update());

        TrackedApp::delete(&conn, id).unwrap();
        assert!(TrackedApp::find_by_id(&conn, id).unwrap().is_none());
    }

    #[test]
    fn test_update_without_id_fails() {
        let (_temp, conn) = create_test_db();
        let mut app = TrackedApp::new("tool", "octo", "tool", InstallType::Deb);
        assert!(app.update(&conn).is_err());
    }

    #[test]
    fn test_list_all_sorted_by_name() {
        let (_temp, conn) = create_test_db();

        TrackedApp::new("zeta", "a", "zeta", InstallType::Deb).insert(&conn).unwrap();
        TrackedApp::new("Alpha", "b", "alpha", InstallType::Rpm).insert(&conn).unwrap();

        let names: Vec<String> = TrackedApp::list_all(&conn)
            .unwrap()
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "zeta"]);
    }

    #[test]
    fn test_settings() {
        let (_temp, conn) = create_test_db();

        assert!(Setting::get(&conn, Setting::GITHUB_TOKEN).unwrap().is_none());
        Setting::set(&conn, Setting::GITHUB_TOKEN, "abc").unwrap();
        Setting::set(&conn, Setting::GITHUB_TOKEN, "def").unwrap();
        assert_eq!(
            Setting::get(&conn, Setting::GITHUB_TOKEN).unwrap().as_deref(),
            Some("def")
        );
    }
}
