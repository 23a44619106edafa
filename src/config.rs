// src/config.rs

//! Runtime configuration
//!
//! Autonomix keeps no configuration file. Everything is either derived from
//! XDG locations, overridden through environment variables, or stored in the
//! settings table of the database.

use crate::db::AppStore;
use crate::db::models::Setting;
use crate::error::Result;
use std::env;
use std::path::PathBuf;
use tracing::debug;

/// Default release API endpoint
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Environment variable overriding the database location
pub const ENV_DB_PATH: &str = "AUTONOMIX_DB";

/// Environment variable overriding the release API endpoint
pub const ENV_API_URL: &str = "AUTONOMIX_API_URL";

/// Environment variable carrying a bearer credential
pub const ENV_TOKEN: &str = "GITHUB_TOKEN";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub api_base: String,
    pub token: Option<String>,
    /// Where AppImages are copied to
    pub bin_dir: PathBuf,
    /// Where desktop entries are written
    pub desktop_dir: PathBuf,
    /// Install prefix for source builds
    pub source_prefix: PathBuf,
}

impl Config {
    /// Build the configuration from the environment
    ///
    /// `db_override` comes from the command line and wins over `AUTONOMIX_DB`.
    pub fn from_env(db_override: Option<PathBuf>) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        let db_path = db_override
            .or_else(|| env::var_os(ENV_DB_PATH).map(PathBuf::from))
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| home.join(".config"))
                    .join("autonomix")
                    .join("autonomix.db")
            });

        let api_base = env::var(ENV_API_URL)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let token = env::var(ENV_TOKEN).ok().filter(|v| !v.is_empty());

        let desktop_dir = dirs::data_dir()
            .unwrap_or_else(|| home.join(".local/share"))
            .join("applications");

        let config = Self {
            db_path,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            bin_dir: home.join(".local/bin"),
            desktop_dir,
            source_prefix: home.join(".local"),
        };

        debug!("Configuration: {:?}", config.redacted());
        config
    }

    /// Fill the token from the settings table if the environment had none
    pub fn load_stored_token(&mut self, store: &dyn AppStore) -> Result<()> {
        if self.token.is_none() {
            self.token = store
                .get_setting(Setting::GITHUB_TOKEN)?
                .filter(|t| !t.is_empty());
        }
        Ok(())
    }

    pub fn db_path_str(&self) -> String {
        self.db_path.to_string_lossy().into_owned()
    }

    fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.token.is_some() {
            copy.token = Some("***".to_string());
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn test_config(root: &std::path::Path) -> Config {
        Config {
            db_path: root.join("autonomix.db"),
            api_base: DEFAULT_API_BASE.to_string(),
            token: None,
            bin_dir: root.join("bin"),
            desktop_dir: root.join("applications"),
            source_prefix: root.to_path_buf(),
        }
    }

    #[test]
    fn test_db_override_wins() {
        let config = Config::from_env(Some(PathBuf::from("/tmp/explicit.db")));
        assert_eq!(config.db_path, PathBuf::from("/tmp/explicit.db"));
        assert!(config.bin_dir.ends_with(".local/bin"));
        assert!(config.desktop_dir.ends_with("applications"));
    }

    #[test]
    fn test_stored_token_used_when_env_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        let conn = db::open_or_init(&config.db_path_str()).unwrap();

        conn.set_setting(Setting::GITHUB_TOKEN, "stored").unwrap();
        config.load_stored_token(&conn).unwrap();
        assert_eq!(config.token.as_deref(), Some("stored"));

        config.token = Some("from-env".to_string());
        config.load_stored_token(&conn).unwrap();
        assert_eq!(config.token.as_deref(), Some("from-env"));
    }

    #[test]
    fn test_redacted_hides_token() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.token = Some("secret".to_string());
        assert_eq!(config.redacted().token.as_deref(), Some("***"));
    }
}
