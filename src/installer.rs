// src/installer.rs

//! Installation coordinator
//!
//! Routes install, uninstall and status requests to the backend registered
//! for a package type. Routing failures are raised before any native tool
//! runs.

use crate::backends::{Backend, BackendRegistry};
use crate::config::Config;
use crate::db::models::InstallType;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

pub struct Installer {
    registry: BackendRegistry,
}

impl Installer {
    pub fn new(registry: BackendRegistry) -> Self {
        Self { registry }
    }

    /// Coordinator over the native backends
    pub fn from_config(config: &Config) -> Self {
        Self::new(BackendRegistry::with_defaults(config))
    }

    /// Resolve a package type name to its registered backend
    pub fn backend_for(&self, package_type: &str) -> Result<&dyn Backend> {
        let install_type: InstallType = package_type
            .parse()
            .map_err(|_| Error::UnsupportedBackend(package_type.to_string()))?;
        self.backend(install_type)
    }

    pub fn backend(&self, install_type: InstallType) -> Result<&dyn Backend> {
        self.registry
            .get(install_type)
            .ok_or_else(|| Error::UnsupportedBackend(install_type.to_string()))
    }

    fn available_backend(&self, install_type: InstallType) -> Result<&dyn Backend> {
        let backend = self.backend(install_type)?;
        if !backend.is_available() {
            return Err(Error::BackendUnavailable(install_type.to_string()));
        }
        Ok(backend)
    }

    /// Install an artifact with the backend for `install_type`
    pub fn install(&self, artifact: &Path, install_type: InstallType) -> Result<String> {
        let backend = self.available_backend(install_type)?;
        info!("Installing {} as {}", artifact.display(), install_type);
        backend.install(artifact)
    }

    pub fn uninstall(
        &self,
        install_type: InstallType,
        app_name: &str,
        install_location: Option<&str>,
    ) -> Result<()> {
        let backend = self.available_backend(install_type)?;
        info!("Uninstalling {} ({})", app_name, install_type);
        backend.uninstall(app_name, install_location)
    }

    /// `(installed, version)` as the backend sees it
    ///
    /// An unknown or unavailable backend answers `(false, None)` without
    /// invoking any native tool.
    pub fn check_app_status(&self, app_name: &str, install_type: InstallType) -> (bool, Option<String>) {
        let Some(backend) = self.registry.get(install_type) else {
            debug!("No backend registered for {}", install_type);
            return (false, None);
        };
        if !backend.is_available() {
            debug!("{} backend unavailable; skipping status of {}", install_type, app_name);
            return (false, None);
        }

        if !backend.is_installed(app_name) {
            return (false, None);
        }
        (true, backend.installed_version(app_name))
    }

    /// Install types usable on this host
    pub fn available_types(&self) -> Vec<InstallType> {
        self.registry
            .install_types()
            .into_iter()
            .filter(|t| self.registry.get(*t).is_some_and(|b| b.is_available()))
            .collect()
    }

    /// The host's native install type
    pub fn system_install_type(&self) -> InstallType {
        system_install_type()
    }

    /// How the running copy of `package_name` was installed, if detectable
    ///
    /// Checks dpkg, then rpm, then whether we run from an AppImage, then
    /// whether the executable lives under the user-local prefix.
    pub fn detect_self_install_type(&self, package_name: &str) -> Option<InstallType> {
        detect_self_install_type(
            package_name,
            std::env::var_os("APPIMAGE").map(PathBuf::from),
            std::env::current_exe().ok(),
            dirs::home_dir().map(|h| h.join(".local")),
        )
    }
}

/// deb if dpkg is present, else rpm if rpm is present, else appimage
pub fn system_install_type() -> InstallType {
    if which::which("dpkg").is_ok() {
        InstallType::Deb
    } else if which::which("rpm").is_ok() {
        InstallType::Rpm
    } else {
        InstallType::AppImage
    }
}

fn detect_self_install_type(
    package_name: &str,
    appimage_env: Option<PathBuf>,
    current_exe: Option<PathBuf>,
    local_prefix: Option<PathBuf>,
) -> Option<InstallType> {
    let succeeded = |program: &str, args: &[&str]| {
        Command::new(program)
            .args(args)
            .arg(package_name)
            .output()
            .is_ok_and(|out| out.status.success())
    };

    if which::which("dpkg").is_ok() && succeeded("dpkg", &["-s"]) {
        return Some(InstallType::Deb);
    }
    if which::which("rpm").is_ok() && succeeded("rpm", &["-q"]) {
        return Some(InstallType::Rpm);
    }
    if appimage_env.is_some_and(|p| !p.as_os_str().is_empty()) {
        return Some(InstallType::AppImage);
    }
    if let (Some(exe), Some(prefix)) = (current_exe, local_prefix) {
        if exe.starts_with(&prefix) {
            return Some(InstallType::Source);
        }
    }
    None
}
