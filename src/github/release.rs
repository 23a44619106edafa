// src/github/release.rs

//! Release and asset metadata as returned by the release API
//!
//! Package type, architecture and version are derived from raw strings on
//! every read. Nothing derived is stored on these values.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Artifact format inferred from an asset's filename
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageType {
    Deb,
    Rpm,
    AppImage,
    Tarball,
    Zip,
}

impl PackageType {
    /// Infer the artifact format from a filename suffix (case-insensitive)
    pub fn from_filename(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.ends_with(".deb") {
            Some(PackageType::Deb)
        } else if lower.ends_with(".rpm") {
            Some(PackageType::Rpm)
        } else if lower.ends_with(".appimage") {
            Some(PackageType::AppImage)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tar.xz") {
            Some(PackageType::Tarball)
        } else if lower.ends_with(".zip") {
            Some(PackageType::Zip)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PackageType::Deb => "deb",
            PackageType::Rpm => "rpm",
            PackageType::AppImage => "appimage",
            PackageType::Tarball => "tarball",
            PackageType::Zip => "zip",
        }
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU architecture inferred from an asset's filename
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    X86_64,
    Arm64,
    X86,
    Armhf,
    /// No architecture marker: treated as architecture-neutral
    Unknown,
}

impl Architecture {
    /// Substring match in priority order; `x86_64` must win over `x86`
    pub fn from_filename(name: &str) -> Self {
        let lower = name.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["x86_64", "amd64", "x64"]) {
            Architecture::X86_64
        } else if has(&["aarch64", "arm64"]) {
            Architecture::Arm64
        } else if has(&["i386", "i686", "x86"]) {
            Architecture::X86
        } else if has(&["armhf", "armv7"]) {
            Architecture::Armhf
        } else {
            Architecture::Unknown
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Architecture::X86_64 => "x86_64",
            Architecture::Arm64 => "arm64",
            Architecture::X86 => "x86",
            Architecture::Armhf => "armhf",
            Architecture::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A downloadable file attached to a release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    #[serde(rename = "browser_download_url")]
    pub download_url: String,
    #[serde(rename = "size", default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub content_type: String,
    /// `sha256:<hex>` when the API publishes one
    #[serde(default)]
    pub digest: Option<String>,
}

impl ReleaseAsset {
    pub fn package_type(&self) -> Option<PackageType> {
        PackageType::from_filename(&self.name)
    }

    pub fn architecture(&self) -> Architecture {
        Architecture::from_filename(&self.name)
    }

    /// Hex SHA-256 from the published digest, if any
    pub fn sha256(&self) -> Option<&str> {
        self.digest
            .as_deref()
            .and_then(|d| d.strip_prefix("sha256:"))
            .filter(|hex| !hex.is_empty())
    }
}

/// A tagged, published version of a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(rename = "name", default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
    #[serde(rename = "prerelease", default)]
    pub is_prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub html_url: String,
    /// Generated source archive for the tag
    #[serde(default)]
    pub tarball_url: Option<String>,
}

impl Release {
    /// Canonical version string used for every comparison
    pub fn version(&self) -> String {
        normalize_version(&self.tag_name)
    }

    /// Release title, falling back to the tag
    pub fn title(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.tag_name)
    }
}

/// Strip a leading `v`/`V` and an optional `release-`/`release_` prefix
pub fn normalize_version(tag: &str) -> String {
    static PREFIX: LazyLock<Option<Regex>> =
        LazyLock::new(|| Regex::new(r"^[vV]?(?:release[_-]?)?").ok());

    match LazyLock::force(&PREFIX).as_ref() {
        Some(re) => re.replace(tag, "").into_owned(),
        None => tag.to_string(),
    }
}

/// Repository metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_url: String,
}
