// src/backends/rpm.rs

//! RPM-family backend
//!
//! Installs and removes through the first front end present: dnf, then
//! zypper, then yum, then bare rpm. Queries always go to rpm itself.

use super::{
    Backend, ELEVATE, archive, managed_location, managed_package, name_variants, query,
    require_artifact, run, tool_available,
};
use crate::db::models::InstallType;
use crate::error::{Error, Result};
use std::path::Path;
use std::process::Command;
use tracing::{debug, info};

/// Front ends in priority order: modern, SUSE, legacy
const FRONT_ENDS: [&str; 3] = ["dnf", "zypper", "yum"];

#[derive(Debug, Default)]
pub struct RpmBackend;

impl RpmBackend {
    pub fn new() -> Self {
        Self
    }

    fn front_end(&self) -> Option<&'static str> {
        FRONT_ENDS.into_iter().find(|tool| tool_available(tool))
    }

    fn install_command(&self, artifact: &Path) -> Command {
        let mut cmd = Command::new(ELEVATE);
        match self.front_end() {
            Some(tool) => cmd.args([tool, "install", "-y"]),
            None => cmd.args(["rpm", "-i"]),
        };
        cmd.arg(artifact);
        cmd
    }

    fn remove_command(&self, package: &str) -> Command {
        let mut cmd = Command::new(ELEVATE);
        match self.front_end() {
            Some(tool) => cmd.args([tool, "remove", "-y"]),
            None => cmd.args(["rpm", "-e"]),
        };
        cmd.arg(package);
        cmd
    }

    fn package_list(&self) -> Vec<String> {
        query(Command::new("rpm").args(["-qa", "--queryformat", "%{NAME}\n"]))
            .filter(|out| out.success)
            .map(|out| out.stdout.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn candidates(&self, app_name: &str) -> Vec<String> {
        name_variants(app_name, &self.package_list())
    }

    fn package_installed(&self, package: &str) -> bool {
        query(Command::new("rpm").args(["-q", package])).is_some_and(|out| out.success)
    }

    fn package_version(&self, package: &str) -> Option<String> {
        query(Command::new("rpm").args(["-q", "--queryformat", "%{VERSION}", package]))
            .filter(|out| out.success)
            .map(|out| out.stdout.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

impl Backend for RpmBackend {
    fn install_type(&self) -> InstallType {
        InstallType::Rpm
    }

    fn is_available(&self) -> bool {
        tool_available("rpm")
    }

    fn install(&self, artifact: &Path) -> Result<String> {
        require_artifact(artifact)?;

        let package = archive::rpm_package_name(artifact).unwrap_or_else(|e| {
            debug!("Could not read RPM header of {}: {}", artifact.display(), e);
            archive::file_stem(artifact)
        });

        info!("Installing {} ({})", artifact.display(), package);
        let output = run(&mut self.install_command(artifact))?;
        if !output.success {
            return Err(Error::InstallFailed(format!(
                "RPM installation of {} failed: {}",
                artifact.display(),
                output.diagnostic()
            )));
        }

        info!("Installed {}", package);
        Ok(managed_location("rpm", &package))
    }

    fn uninstall(&self, app_name: &str, install_location: Option<&str>) -> Result<()> {
        let package = managed_package(install_location, "rpm")
            .or_else(|| {
                self.candidates(app_name)
                    .into_iter()
                    .find(|name| self.package_installed(name))
            })
            .unwrap_or_else(|| app_name.to_lowercase());

        info!("Removing {}", package);
        let output = run(&mut self.remove_command(&package))?;
        if !output.success {
            return Err(Error::UninstallFailed(format!(
                "Removing {}: {}",
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
