// src/reconcile.rs

//! State reconciliation
//!
//! The tracked record is a cache of what the backend reports. Whenever the
//! two disagree about whether an app is installed, the backend wins.

use crate::backends::VERSION_UNKNOWN;
use crate::db::models::TrackedApp;
use crate::installer::Installer;
use tracing::info;

/// What a backend reported about one app
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedState {
    pub installed: bool,
    pub version: Option<String>,
}

impl From<(bool, Option<String>)> for ObservedState {
    fn from((installed, version): (bool, Option<String>)) -> Self {
        Self { installed, version }
    }
}

/// Outcome of reconciling one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Unchanged,
    /// Installed outside Autonomix; the reported version was adopted
    AdoptedExternalInstall { version: String },
    /// Removed outside Autonomix; the recorded version was cleared
    ClearedExternalRemoval { previous: String },
}

impl Change {
    pub fn is_change(&self) -> bool {
        !matches!(self, Change::Unchanged)
    }
}

/// Merge backend-observed state into a tracked record
///
/// Only presence is reconciled. When both sides agree the app is installed
/// the recorded version is kept, since native tools often decorate versions
/// (`1.0-1` for a `1.0` tag) and overwriting would flip `has_update`.
pub fn reconcile(tracked: &TrackedApp, observed: &ObservedState) -> (TrackedApp, Change) {
    let mut next = tracked.clone();

    let change = match (&tracked.installed_version, observed.installed) {
        (None, true) => {
            let version = observed
                .version
                .clone()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| VERSION_UNKNOWN.to_string());
            next.installed_version = Some(version.clone());
            Change::AdoptedExternalInstall { version }
        }
        (Some(previous), false) => {
            let previous = previous.clone();
            next.installed_version = None;
            next.install_path = None;
            Change::ClearedExternalRemoval { previous }
        }
        _ => Change::Unchanged,
    };

    (next, change)
}

/// Query the backend for `app` and apply [`reconcile`] in place
pub fn reconcile_app(installer: &Installer, app: &mut TrackedApp) -> Change {
    let observed: ObservedState = installer
        .check_app_status(&app.name, app.package_type)
        .into();
    let (next, change) = reconcile(app, &observed);

    match &change {
        Change::AdoptedExternalInstall { version } => {
            info!("{} is installed outside Autonomix (version {})", app.name, version)
        }
        Change::ClearedExternalRemoval { previous } => {
            info!("{} {} was removed outside Autonomix", app.name, previous)
        }
        Change::Unchanged => {}
    }

    *app = next;
    change
}
