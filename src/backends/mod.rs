// src/backends/mod.rs

//! Installation backends
//!
//! One backend per install type. Each answers availability, install,
//! uninstall, presence and version questions independently by asking the
//! operating system, never the tracking database.

pub mod appimage;
pub mod archive;
pub mod deb;
pub mod rpm;
pub mod source;

pub use appimage::AppImageBackend;
pub use deb::DebBackend;
pub use rpm::RpmBackend;
pub use source::SourceBackend;

use crate::config::Config;
use crate::db::models::InstallType;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;
use wait_timeout::ChildExt;

/// Reported version when a backend sees the app but cannot tell its version
pub const VERSION_UNKNOWN: &str = "installed";

/// Privilege escalation wrapper for native package tools
pub(crate) const ELEVATE: &str = "pkexec";

/// Capability contract shared by every backend
///
/// `is_installed` and `installed_version` are best-effort queries: a query
/// that fails for any reason answers "no", it never errors.
pub trait Backend: Send + Sync {
    /// The install type this backend serves
    fn install_type(&self) -> InstallType;

    /// Whether the native tooling exists on this host
    fn is_available(&self) -> bool;

    /// Install a downloaded artifact, returning where it ended up
    fn install(&self, artifact: &Path) -> Result<String>;

    /// Remove an installed app
    ///
    /// `install_location` is whatever `install` returned earlier, if known.
    fn uninstall(&self, app_name: &str, install_location: Option<&str>) -> Result<()>;

    fn is_installed(&self, app_name: &str) -> bool;

    /// Installed version, [`VERSION_UNKNOWN`] when present without one, or `None`
    fn installed_version(&self, app_name: &str) -> Option<String>;
}

/// Routing table from install type to backend
pub struct BackendRegistry {
    backends: HashMap<InstallType, Box<dyn Backend>>,
}

impl BackendRegistry {
    pub fn empty() -> Self {
        Self {
            backends: HashMap::new(),
        }
    }

    /// The four native backends, writing to the locations in `config`
    pub fn with_defaults(config: &Config) -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(DebBackend::new()));
        registry.register(Box::new(RpmBackend::new()));
        registry.register(Box::new(AppImageBackend::new(
            config.bin_dir.clone(),
            config.desktop_dir.clone(),
        )));
        registry.register(Box::new(SourceBackend::new(config.source_prefix.clone())));
        registry
    }

    /// Add or replace the backend for its install type
    pub fn register(&mut self, backend: Box<dyn Backend>) {
        self.backends.insert(backend.install_type(), backend);
    }

    pub fn get(&self, install_type: InstallType) -> Option<&dyn Backend> {
        self.backends.get(&install_type).map(|b| b.as_ref())
    }

    /// Registered install types in a stable order
    pub fn install_types(&self) -> Vec<InstallType> {
        InstallType::ALL
            .into_iter()
            .filter(|t| self.backends.contains_key(t))
            .collect()
    }
}

/// Package names worth asking a native package manager about
///
/// Upstream project names rarely match distro package names, so this tries
/// separator spellings, drops `-bin`/`-git` suffixes and a `lib` prefix, and
/// finally adds every installed package whose name contains the app name.
/// Order is preserved and duplicates removed.
pub fn name_variants(app_name: &str, installed_packages: &[String]) -> Vec<String> {
    let name = app_name.trim().to_lowercase();
    let mut variants = vec![
        name.clone(),
        name.replace('-', ""),
        name.replace('_', "-"),
        name.replace('-', "_"),
    ];

    for suffix in ["-bin", "-git"] {
        if let Some(stripped) = name.strip_suffix(suffix) {
            variants.push(stripped.to_string());
        }
    }
    if let Some(stripped) = name.strip_prefix("lib") {
        variants.push(stripped.to_string());
    }

    if !name.is_empty() {
        variants.extend(
            installed_packages
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty() && p.to_lowercase().contains(&name))
                .map(str::to_string),
        );
    }

    let mut seen = std::collections::HashSet::new();
    variants.retain(|v| !v.is_empty() && seen.insert(v.clone()));
    variants
}

/// Install location recorded for natively managed packages
pub(crate) fn managed_location(tool: &str, package: &str) -> String {
    format!("/usr (managed by {}: {})", tool, package)
}

/// Package name out of a location produced by [`managed_location`]
pub(crate) fn managed_package(location: Option<&str>, tool: &str) -> Option<String> {
    let prefix = format!("/usr (managed by {}: ", tool);
    location?
        .strip_prefix(&prefix)?
        .strip_suffix(')')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

/// Captured result of a native command
#[derive(Debug, Clone)]
pub(crate) struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Diagnostic text for error messages: stderr, else stdout
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        "command exited with a failure status".to_string()
    }
}

/// Run a command to completion, capturing its output
///
/// Only a failure to launch is an error; a non-zero exit is reported in
/// the returned output.
pub(crate) fn run(cmd: &mut Command) -> Result<CommandOutput> {
    debug!("Running {:?}", cmd);

    let output = cmd
        .stdin(Stdio::null())
        .output()
        .map_err(|e| Error::Io(std::io::Error::new(e.kind(), format!("{:?}: {}", cmd, e))))?;

    let result = CommandOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    if !result.success {
        debug!("{:?} exited with {}", cmd, output.status);
    }
    Ok(result)
}

/// Like [`run`], but any failure to launch just means "no answer"
pub(crate) fn query(cmd: &mut Command) -> Option<CommandOutput> {
    match run(cmd) {
        Ok(output) => Some(output),
        Err(e) => {
            debug!("Query failed: {}", e);
            None
        }
    }
}

/// Run a query that must finish within `timeout`
///
/// Returns `None` if the command could not start or was killed for
/// overrunning. Both pipes are drained while the child runs, so a chatty
/// child never stalls on a full pipe.
pub(crate) fn query_with_timeout(cmd: &mut Command, timeout: Duration) -> Option<CommandOutput> {
    debug!("Running {:?} with a {}s limit", cmd, timeout.as_secs());

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .ok()?;

    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    match child.wait_timeout(timeout) {
        Ok(Some(status)) => Some(CommandOutput {
            success: status.success(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        }),
        Ok(None) => {
            debug!("{:?} timed out; killing it", cmd);
            let _ = child.kill();
            let _ = child.wait();
            None
        }
        Err(e) => {
            debug!("Waiting on {:?} failed: {}", cmd, e);
            let _ = child.kill();
            None
        }
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn collect(reader: Option<JoinHandle<String>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

pub(crate) fn tool_available(name: &str) -> bool {
    which::which(name).is_ok()
}

/// Fail with `NotFoundError` when the artifact is missing
pub(crate) fn require_artifact(artifact: &Path) -> Result<()> {
    if artifact.exists() {
        Ok(())
    } else {
        Err(Error::NotFoundError(format!(
            "Package not found: {}",
            artifact.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(InstallType, bool);

    impl Backend for Stub {
        fn install_type(&self) -> InstallType {
            self.0
        }
        fn is_available(&self) -> bool {
            self.1
        }
        fn install(&self, _artifact: &Path) -> Result<String> {
            Ok("stub".to_string())
        }
        fn uninstall(&self, _app_name: &str, _location: Option<&str>) -> Result<()> {
            Ok(())
        }
        fn is_installed(&self, _app_name: &str) -> bool {
            false
        }
        fn installed_version(&self, _app_name: &str) -> Option<String> {
            None
        }
    }

    #[test]
    fn test_name_variants_separators() {
        let variants = name_variants("my-tool", &[]);
        assert_eq!(variants[0], "my-tool");
        assert!(variants.contains(&"mytool".to_string()));
        assert!(variants.contains(&"my_tool".to_string()));
    }

    #[test]
    fn test_name_variants_affixes() {
        assert!(name_variants("mytool-bin", &[]).contains(&"mytool".to_string()));
        assert!(name_variants("mytool-git", &[]).contains(&"mytool".to_string()));
        assert!(name_variants("libfoo", &[]).contains(&"foo".to_string()));
    }

    #[test]
    fn test_name_variants_installed_substring_and_dedup() {
        let installed = vec![
            "ripgrep".to_string(),
            "tool-common".to_string(),
            "Tool".to_string(),
            "tool".to_string(),
        ];
        let variants = name_variants("Tool", &installed);
        assert_eq!(variants, vec!["tool", "tool-common", "Tool"]);
    }

    #[test]
    fn test_managed_location_round_trip() {
        let location = managed_location("dpkg", "my-tool");
        assert_eq!(location, "/usr (managed by dpkg: my-tool)");
        assert_eq!(managed_package(Some(&location), "dpkg").as_deref(), Some("my-tool"));
        assert_eq!(managed_package(Some(&location), "rpm"), None);
        assert_eq!(managed_package(Some("/usr (managed by dpkg: )"), "dpkg"), None);
        assert_eq!(managed_package(None, "dpkg"), None);
    }

    #[test]
    fn test_registry_routing() {
        let mut registry = BackendRegistry::empty();
        registry.register(Box::new(Stub(InstallType::Rpm, true)));
        registry.register(Box::new(Stub(InstallType::Deb, false)));

        assert!(registry.get(InstallType::AppImage).is_none());
        assert!(!registry.get(InstallType::Deb).unwrap().is_available());
        assert_eq!(registry.install_types(), vec![InstallType::Deb, InstallType::Rpm]);

        registry.register(Box::new(Stub(InstallType::Deb, true)));
        assert!(registry.get(InstallType::Deb).unwrap().is_available());
    }

    #[test]
    fn test_run_reports_failure_text() {
        let output = run(Command::new("sh").args(["-c", "echo oops >&2; exit 3"])).unwrap();
        assert!(!output.success);
        assert_eq!(output.diagnostic(), "oops");
    }

    #[test]
    fn test_query_missing_program() {
        assert!(query(&mut Command::new("/nonexistent/autonomix-missing")).is_none());
    }

    #[test]
    fn test_query_with_timeout_kills_slow_child() {
        let slow = query_with_timeout(
            Command::new("sh").args(["-c", "sleep 5"]),
            Duration::from_millis(100),
        );
        assert!(slow.is_none());

        let quick = query_with_timeout(
            Command::new("sh").args(["-c", "echo tool 1.2.3"]),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(quick.success);
        assert_eq!(quick.stdout.trim(), "tool 1.2.3");
    }

    #[test]
    fn test_query_with_timeout_drains_large_output() {
        let started = std::time::Instant::now();
        let chatty = query_with_timeout(
            Command::new("sh").args(["-c", "echo tool 3.1.4; yes filler | head -c 200000"]),
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(chatty.success);
        assert!(chatty.stdout.starts_with("tool 3.1.4"));
        assert!(chatty.stdout.len() > 200_000);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_require_artifact() {
        let missing = Path::new("/nonexistent/tool.deb");
        assert!(matches!(require_artifact(missing), Err(Error::NotFoundError(_))));
    }
}
