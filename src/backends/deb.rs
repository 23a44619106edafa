// src/backends/deb.rs

//! Debian-family backend (dpkg, with apt for dependency repair)

use super::{
    Backend, CommandOutput, ELEVATE, archive, managed_location, managed_package, name_variants,
    query, require_artifact, run, tool_available,
};
use crate::db::models::InstallType;
use crate::error::{Error, Result};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, warn};

const INSTALLED_STATUS: &str = "Status: install ok installed";

#[derive(Debug, Default)]
pub struct DebBackend;

impl DebBackend {
    pub fn new() -> Self {
        Self
    }

    /// Every package dpkg knows about
    fn package_list(&self) -> Vec<String> {
        query(Command::new("dpkg-query").args(["-W", "-f=${Package}\n"]))
            .filter(|out| out.success)
            .map(|out| out.stdout.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn candidates(&self, app_name: &str) -> Vec<String> {
        name_variants(app_name, &self.package_list())
    }

    fn package_installed(&self, package: &str) -> bool {
        query(Command::new("dpkg").args(["-s", package]))
            .is_some_and(|out| out.success && out.stdout.contains(INSTALLED_STATUS))
    }

    fn package_version(&self, package: &str) -> Option<String> {
        query(Command::new("dpkg-query").args(["-W", "-f=${Version}", package]))
            .filter(|out| out.success)
            .map(|out| out.stdout.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn repair_dependencies(&self) -> Result<CommandOutput> {
        info!("Attempting dependency repair with apt-get");
        run(Command::new(ELEVATE).args(["apt-get", "install", "-f", "-y"]))
    }
}

impl Backend for DebBackend {
    fn install_type(&self) -> InstallType {
        InstallType::Deb
    }

    fn is_available(&self) -> bool {
        tool_available("dpkg")
    }

    fn install(&self, artifact: &Path) -> Result<String> {
        require_artifact(artifact)?;

        let package = archive::deb_package_name(artifact).unwrap_or_else(|e| {
            debug!("Could not read package name from {}: {}", artifact.display(), e);
            archive::file_stem(artifact)
        });

        info!("Installing {} ({})", artifact.display(), package);
        let dpkg = run(Command::new(ELEVATE).args(["dpkg", "-i"]).arg(artifact))?;

        if !dpkg.success {
            warn!("dpkg -i failed: {}", dpkg.diagnostic());

            // dpkg leaves the package unconfigured when dependencies are missing
            let repair = self.repair_dependencies()?;
            if !(repair.success && self.package_installed(&package)) {
                return Err(Error::InstallFailed(format!(
                    "dpkg -i {}: {}{}",
                    artifact.display(),
                    dpkg.diagnostic(),
                    if repair.success {
                        String::new()
                    } else {
                        format!("; apt-get install -f: {}", repair.diagnostic())
                    }
                )));
            }
            info!("Dependency repair completed the installation of {}", package);
        }

        info!("Installed {}", package);
        Ok(managed_location("dpkg", &package))
    }

    fn uninstall(&self, app_name: &str, install_location: Option<&str>) -> Result<()> {
        let package = managed_package(install_location, "dpkg")
            .or_else(|| {
                self.candidates(app_name)
                    .into_iter()
                    .find(|name| self.package_installed(name))
            })
            .unwrap_or_else(|| app_name.to_lowercase());

        info!("Removing {}", package);
        let output = run(Command::new(ELEVATE).args(["dpkg", "-r", &package]))?;
        if !output.success {
            return Err(Error::UninstallFailed(format!(
                "dpkg -r {}: {}",
                package,
                output.diagnostic()
            )));
        }

        info!("Removed {}", package);
        Ok(())
    }

    fn is_installed(&self, app_name: &str) -> bool {
        self.candidates(app_name)
            .iter()
            .any(|name| self.package_installed(name))
    }

    fn installed_version(&self, app_name: &str) -> Option<String> {
        self.candidates(app_name)
            .iter()
            .find_map(|name| self.package_version(name))
    }
}
