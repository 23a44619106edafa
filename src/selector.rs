// src/selector.rs

//! Asset selection
//!
//! Narrows a release's assets to the single artifact that fits this machine.
//! Selection itself is pure; host facts are detected once and passed in.

use crate::db::models::InstallType;
use crate::github::{Architecture, PackageType, ReleaseAsset};
use crate::installer;
use std::process::Command;
use tracing::debug;

/// What the selector needs to know about the running machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFacts {
    /// Normalized architecture name (`x86_64`, `arm64`, `armhf`, or the raw value)
    pub arch: String,
    /// Package format native to this host
    pub preferred: PackageType,
}

impl HostFacts {
    pub fn new(raw_arch: &str, preferred: PackageType) -> Self {
        Self {
            arch: normalize_arch(raw_arch),
            preferred,
        }
    }

    /// Inspect the running machine
    pub fn detect() -> Self {
        let raw = Command::new("uname")
            .arg("-m")
            .output()
            .ok()
            .filter(|out| out.status.success())
            .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| std::env::consts::ARCH.to_string());

        let facts = Self::new(&raw, native_package_type());
        debug!("Host facts: arch={} preferred={}", facts.arch, facts.preferred);
        facts
    }

    fn accepts(&self, arch: Architecture) -> bool {
        arch == Architecture::Unknown || arch.as_str() == self.arch
    }
}

/// Map raw platform names onto the names used for asset architectures
pub fn normalize_arch(raw: &str) -> String {
    match raw {
        "amd64" => "x86_64".to_string(),
        "aarch64" => "arm64".to_string(),
        "armv7l" => "armhf".to_string(),
        other => other.to_string(),
    }
}

/// Package format of the host's native package manager
pub fn native_package_type() -> PackageType {
    package_type_for(installer::system_install_type())
}

/// Pick the best asset for the host
///
/// Exact architecture beats architecture-neutral. When nothing of the
/// preferred type fits, an AppImage is offered instead.
pub fn select_best_asset<'a>(
    assets: &'a [ReleaseAsset],
    preferred: Option<PackageType>,
    host: &HostFacts,
) -> Option<&'a ReleaseAsset> {
    let preferred = preferred.unwrap_or(host.preferred);

    best_of_type(assets, preferred, host).or_else(|| {
        if preferred == PackageType::AppImage {
            None
        } else {
            debug!("No {} asset fits {}; trying AppImage", preferred, host.arch);
            best_of_type(assets, PackageType::AppImage, host)
        }
    })
}

/// Pick the asset a tracked app of `install_type` can install
///
/// Unlike `select_best_asset` the result always has a format the app's
/// backend understands. Source apps take a tarball, then a zip.
pub fn select_for_install<'a>(
    assets: &'a [ReleaseAsset],
    install_type: InstallType,
    host: &HostFacts,
) -> Option<&'a ReleaseAsset> {
    match install_type {
        InstallType::Deb => best_of_type(assets, PackageType::Deb, host),
        InstallType::Rpm => best_of_type(assets, PackageType::Rpm, host),
        InstallType::AppImage => best_of_type(assets, PackageType::AppImage, host),
        InstallType::Source => best_of_type(assets, PackageType::Tarball, host)
            .or_else(|| best_of_type(assets, PackageType::Zip, host)),
    }
}

/// Install type for an asset format
pub fn install_type_for(package_type: PackageType) -> InstallType {
    match package_type {
        PackageType::Deb => InstallType::Deb,
        PackageType::Rpm => InstallType::Rpm,
        PackageType::AppImage => InstallType::AppImage,
        PackageType::Tarball | PackageType::Zip => InstallType::Source,
    }
}

/// Asset format an install type prefers
pub fn package_type_for(install_type: InstallType) -> PackageType {
    match install_type {
        InstallType::Deb => PackageType::Deb,
        InstallType::Rpm => PackageType::Rpm,
        InstallType::AppImage => PackageType::AppImage,
        InstallType::Source => PackageType::Tarball,
    }
}

fn best_of_type<'a>(
    assets: &'a [ReleaseAsset],
    wanted: PackageType,
    host: &HostFacts,
) -> Option<&'a ReleaseAsset> {
    let mut neutral = None;

    for asset in assets {
        if asset.package_type() != Some(wanted) {
            continue;
        }
        let arch = asset.architecture();
        if !host.accepts(arch) {
            continue;
        }
        if arch != Architecture::Unknown {
            return Some(asset);
        }
        neutral.get_or_insert(asset);
    }

    neutral
}
