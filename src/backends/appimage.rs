// src/backends/appimage.rs

//! Portable AppImage backend
//!
//! Installing copies the image into a user-local bin directory, marks it
//! executable and writes a desktop entry. No external tooling is involved,
//! so the backend is always available.

use super::{Backend, VERSION_UNKNOWN, require_artifact};
use crate::db::models::InstallType;
use crate::error::{Error, Result};
use regex::Regex;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

static FILENAME_VERSION: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[-_]v?(\d+\.\d+(?:\.\d+)?)").ok());

#[derive(Debug, Clone)]
pub struct AppImageBackend {
    bin_dir: PathBuf,
    desktop_dir: PathBuf,
}

impl AppImageBackend {
    pub fn new(bin_dir: PathBuf, desktop_dir: PathBuf) -> Self {
        Self {
            bin_dir,
            desktop_dir,
        }
    }

    /// Every AppImage in the bin directory whose name mentions the app
    fn find_all(&self, app_name: &str) -> Vec<PathBuf> {
        let needle = app_name.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let Ok(entries) = fs::read_dir(&self.bin_dir) else {
            return Vec::new();
        };

        let mut matches: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .filter(|p| {
                let name = file_name_lower(p);
                name.contains(&needle) && name.contains("appimage")
            })
            .collect();

        // read_dir order is unspecified
        matches.sort();
        matches
    }

    /// Most recently written matching image
    fn find_installed(&self, app_name: &str) -> Option<PathBuf> {
        self.find_all(app_name)
            .into_iter()
            .max_by_key(|p| (fs::metadata(p).and_then(|m| m.modified()).ok(), p.clone()))
    }

    fn remove_image(&self, image: &Path) -> Result<()> {
        info!("Removing {}", image.display());
        fs::remove_file(image)
            .map_err(|e| Error::UninstallFailed(format!("{}: {}", image.display(), e)))?;

        let entry = self.desktop_entry_path(image);
        if entry.exists() {
            debug!("Removing desktop entry {}", entry.display());
            fs::remove_file(&entry)?;
        }
        Ok(())
    }

    fn desktop_entry_path(&self, image: &Path) -> PathBuf {
        self.desktop_dir
            .join(format!("{}.desktop", desktop_id(image).to_lowercase()))
    }

    fn write_desktop_entry(&self, image: &Path) -> Result<PathBuf> {
        let name = desktop_id(image);
        let contents = format!(
            "[Desktop Entry]\n\
             Type=Application\n\
             Name={}\n\
             Exec=\"{}\" %U\n\
             Icon=application-x-executable\n\
             Terminal=false\n\
             Categories=Utility;\n\
             Comment=Installed via Autonomix\n",
            name,
            image.display()
        );

        fs::create_dir_all(&self.desktop_dir)?;
        let path = self.desktop_entry_path(image);
        fs::write(&path, contents)?;
        debug!("Wrote desktop entry {}", path.display());
        Ok(path)
    }
}

/// Base application name from an image filename: `Tool-1.2-x86_64.AppImage` -> `Tool`
fn desktop_id(image: &Path) -> String {
    let file_name = image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let stem = match file_name.to_ascii_lowercase().rfind(".appimage") {
        Some(idx) => file_name[..idx].to_string(),
        None => file_name,
    };

    stem.split('-')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("appimage")
        .to_string()
}

fn file_name_lower(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Version embedded in an image filename, if any
pub fn version_from_filename(file_name: &str) -> Option<String> {
    LazyLock::force(&FILENAME_VERSION)
        .as_ref()?
        .captures(file_name)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

impl Backend for AppImageBackend {
    fn install_type(&self) -> InstallType {
        InstallType::AppImage
    }

    fn is_available(&self) -> bool {
        true
    }

    fn install(&self, artifact: &Path) -> Result<String> {
        require_artifact(artifact)?;

        let file_name = artifact.file_name().ok_or_else(|| {
            Error::InstallFailed(format!("Invalid AppImage path: {}", artifact.display()))
        })?;

        fs::create_dir_all(&self.bin_dir)?;
        let target = self.bin_dir.join(file_name);

        info!("Installing {} to {}", artifact.display(), target.display());
        fs::copy(artifact, &target)?;
        fs::set_permissions(&target, fs::Permissions::from_mode(0o755))?;

        // An update replaces every earlier image of the same app
        for stale in self.find_all(&desktop_id(&target)) {
            if stale != target {
                debug!("Replacing {}", stale.display());
                fs::remove_file(&stale)?;
            }
        }

        self.write_desktop_entry(&target)?;

        Ok(target.to_string_lossy().into_owned())
    }

    fn uninstall(&self, app_name: &str, install_location: Option<&str>) -> Result<()> {
        let mut images: Vec<PathBuf> = install_location
            .map(PathBuf::from)
            .filter(|p| p.is_file())
            .into_iter()
            .collect();
        for image in self.find_all(app_name) {
            if !images.contains(&image) {
                images.push(image);
            }
        }

        if images.is_empty() {
            return Err(Error::NotFoundError(format!(
                "No installed AppImage found for {}",
                app_name
            )));
        }

        for image in &images {
            self.remove_image(image)?;
        }

        let by_name = self
            .desktop_dir
            .join(format!("{}.desktop", app_name.to_lowercase()));
        if by_name.exists() {
            debug!("Removing desktop entry {}", by_name.display());
            fs::remove_file(&by_name)?;
        }

        Ok(())
    }

    fn is_installed(&self, app_name: &str) -> bool {
        self.find_installed(app_name).is_some()
    }

    fn installed_version(&self, app_name: &str) -> Option<String> {
        let image = self.find_installed(app_name)?;
        let file_name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Some(version_from_filename(&file_name).unwrap_or_else(|| VERSION_UNKNOWN.to_string()))
    }
}
