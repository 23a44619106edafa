// src/backends/source.rs

//! Build-from-source backend
//!
//! Unpacks a source archive, detects its build system from marker files and
//! installs into a user-local prefix. Source installs leave no manifest, so
//! this backend refuses to uninstall.

use super::{Backend, VERSION_UNKNOWN, archive, query_with_timeout, require_artifact, run, tool_available};
use crate::db::models::InstallType;
use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info};

/// Limit for running an installed binary with `--version`
pub const VERSION_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

static OUTPUT_VERSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d+\.\d+(?:\.\d+)?)").ok());

/// Build systems in detection order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildSystem {
    Cargo,
    Go,
    CMake,
    Meson,
    Autotools,
    Make,
}

impl BuildSystem {
    const DETECT_ORDER: [(BuildSystem, &'static str); 6] = [
        (BuildSystem::Cargo, "Cargo.toml"),
        (BuildSystem::Go, "go.mod"),
        (BuildSystem::CMake, "CMakeLists.txt"),
        (BuildSystem::Meson, "meson.build"),
        (BuildSystem::Autotools, "configure"),
        (BuildSystem::Make, "Makefile"),
    ];

    /// First build system whose marker file exists in `src_dir`
    pub fn detect(src_dir: &Path) -> Option<Self> {
        Self::DETECT_ORDER
            .into_iter()
            .find(|(_, marker)| src_dir.join(marker).exists())
            .map(|(system, _)| system)
    }

    /// Commands that build and install `src_dir` into `prefix`, in order
    pub fn commands(&self, src_dir: &Path, prefix: &Path) -> Vec<Command> {
        let prefix_str = prefix.to_string_lossy();
        let build_dir = src_dir.join("build");
        let jobs = format!("-j{}", build_jobs());

        let at = |program: &str, dir: &Path, args: &[&str]| {
            let mut cmd = Command::new(program);
            cmd.current_dir(dir).args(args);
            cmd
        };

        match self {
            BuildSystem::Cargo => {
                let mut cmd = Command::new("cargo");
                cmd.arg("install")
                    .arg("--path")
                    .arg(src_dir)
                    .arg("--root")
                    .arg(prefix);
                vec![cmd]
            }
            BuildSystem::Go => {
                let mut cmd = at("go", src_dir, &["install", "./..."]);
                cmd.env("GOBIN", prefix.join("bin"));
                vec![cmd]
            }
            BuildSystem::CMake => vec![
                at(
                    "cmake",
                    src_dir,
                    &[
                        "-S",
                        ".",
                        "-B",
                        "build",
                        &format!("-DCMAKE_INSTALL_PREFIX={}", prefix_str),
                    ],
                ),
                at("cmake", src_dir, &["--build", "build"]),
                at("cmake", src_dir, &["--install", "build"]),
            ],
            BuildSystem::Meson => vec![
                at(
                    "meson",
                    src_dir,
                    &["setup", "build", &format!("--prefix={}", prefix_str)],
                ),
                at("ninja", &build_dir, &[]),
                at("ninja", &build_dir, &["install"]),
            ],
            BuildSystem::Autotools => vec![
                at("./configure", src_dir, &[&format!("--prefix={}", prefix_str)]),
                at("make", src_dir, &[jobs.as_str()]),
                at("make", src_dir, &["install"]),
            ],
            BuildSystem::Make => {
                let prefix_arg = format!("PREFIX={}", prefix_str);
                vec![
                    at("make", src_dir, &[jobs.as_str(), prefix_arg.as_str()]),
                    at("make", src_dir, &["install", &prefix_arg]),
                ]
            }
        }
    }

    /// Where the installed files end up
    fn install_location(&self, prefix: &Path) -> PathBuf {
        match self {
            BuildSystem::Cargo | BuildSystem::Go => prefix.join("bin"),
            _ => prefix.to_path_buf(),
        }
    }
}

impl fmt::Display for BuildSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildSystem::Cargo => "cargo",
            BuildSystem::Go => "go",
            BuildSystem::CMake => "cmake",
            BuildSystem::Meson => "meson",
            BuildSystem::Autotools => "autotools",
            BuildSystem::Make => "make",
        };
        f.write_str(name)
    }
}

/// Parallel make jobs: one per available CPU
fn build_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// First version-like substring of a `--version` output
pub fn version_from_output(output: &str) -> Option<String> {
    LazyLock::force(&OUTPUT_VERSION)
        .as_ref()?
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[derive(Debug, Clone)]
pub struct SourceBackend {
    prefix: PathBuf,
}

impl SourceBackend {
    pub fn new(prefix: PathBuf) -> Self {
        Self { prefix }
    }

    fn binary_path(&self, app_name: &str) -> Option<PathBuf> {
        let bin_dir = self.prefix.join("bin");
        [app_name.to_string(), app_name.to_lowercase()]
            .into_iter()
            .filter(|n| !n.is_empty())
            .map(|n| bin_dir.join(n))
            .find(|p| p.is_file())
    }

    fn build(&self, src_dir: &Path) -> Result<String> {
        let system = BuildSystem::detect(src_dir).ok_or_else(|| {
            Error::InstallFailed(format!(
                "Could not detect build system in {}",
                src_dir.display()
            ))
        })?;

        info!("Building {} with {}", src_dir.display(), system);
        for mut cmd in system.commands(src_dir, &self.prefix) {
            let output = run(&mut cmd)?;
            debug!("{}", output.stdout.trim());
            if !output.success {
                return Err(Error::InstallFailed(format!(
                    "{} build step {:?} failed: {}",
                    system,
                    cmd.get_program(),
                    output.diagnostic()
                )));
            }
        }

        Ok(system
            .install_location(&self.prefix)
            .to_string_lossy()
            .into_owned())
    }
}

impl Backend for SourceBackend {
    fn install_type(&self) -> InstallType {
        InstallType::Source
    }

    fn is_available(&self) -> bool {
        ["make", "cmake", "cargo", "go"]
            .into_iter()
            .any(tool_available)
    }

    fn install(&self, artifact: &Path) -> Result<String> {
        require_artifact(artifact)?;

        if artifact.is_dir() {
            return self.build(artifact);
        }

        // Scoped: the unpacked tree is deleted when this returns
        let work = tempfile::tempdir()?;
        let src_dir = archive::extract_source(artifact, work.path())?;
        self.build(&src_dir)
    }

    fn uninstall(&self, app_name: &str, _install_location: Option<&str>) -> Result<()> {
        Err(Error::UninstallFailed(format!(
            "{} was built from source; remove its files under {} manually",
            app_name,
            self.prefix.display()
        )))
    }

    fn is_installed(&self, app_name: &str) -> bool {
        self.binary_path(app_name).is_some()
    }

    fn installed_version(&self, app_name: &str) -> Option<String> {
        let binary = self.binary_path(app_name)?;

        let version = query_with_timeout(
            Command::new(&binary).arg("--version"),
            VERSION_QUERY_TIMEOUT,
        )
        .filter(|out| out.success)
        .and_then(|out| version_from_output(&out.stdout));

        Some(version.unwrap_or_else(|| VERSION_UNKNOWN.to_string()))
    }
}
