// src/tracker.rs

//! Application flows
//!
//! Each flow reads one tracked record, drives the resolver, selector and
//! coordinator, and writes the record back. Callers serialize flows per app;
//! only the release fetches of `check_updates` run in parallel.

use crate::db::AppStore;
use crate::db::models::{InstallType, Setting, TrackedApp};
use crate::error::{Error, Result};
use crate::github::{self, GitHubClient, Release};
use crate::installer::Installer;
use crate::reconcile::{self, Change};
use crate::selector::{self, HostFacts};
use crate::worker::{self, CancelToken, Progress, ProgressSink};
use rayon::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Choices made when adding a repository
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Display name; defaults to the repository name
    pub name: Option<String>,
    /// Install type; defaults to the type of the best asset for this host
    pub install_type: Option<InstallType>,
    pub include_prerelease: bool,
    pub auto_update: bool,
}

/// Result of an update-check pass
#[derive(Debug, Default)]
pub struct UpdateReport {
    pub checked: usize,
    /// Apps with a newer release than the installed one
    pub updates: Vec<TrackedApp>,
    /// Apps whose release lookup failed, with the reason
    pub failures: Vec<(String, String)>,
    /// Records corrected to match the backends
    pub reconciled: Vec<(String, Change)>,
}

impl UpdateReport {
    /// Updates the user asked to have installed automatically
    pub fn auto_updates(&self) -> impl Iterator<Item = &TrackedApp> {
        self.updates.iter().filter(|app| app.auto_update)
    }
}

pub struct Tracker<S: AppStore> {
    store: S,
    client: GitHubClient,
    installer: Installer,
    host: HostFacts,
}

impl<S: AppStore> Tracker<S> {
    pub fn new(store: S, client: GitHubClient, installer: Installer, host: HostFacts) -> Self {
        Self {
            store,
            client,
            installer,
            host,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn client(&self) -> &GitHubClient {
        &self.client
    }

    pub fn installer(&self) -> &Installer {
        &self.installer
    }

    pub fn host(&self) -> &HostFacts {
        &self.host
    }

    pub fn list_apps(&self) -> Result<Vec<TrackedApp>> {
        self.store.get_all_apps()
    }

    pub fn get_app(&self, app_id: i64) -> Result<TrackedApp> {
        self.store
            .get_app_by_id(app_id)?
            .ok_or_else(|| Error::NotFoundError(format!("No tracked app with id {}", app_id)))
    }

    /// Look an app up by numeric id or `owner/repo` (or repository URL)
    pub fn find_app(&self, reference: &str) -> Result<TrackedApp> {
        if let Ok(id) = reference.trim().parse::<i64>() {
            return self.get_app(id);
        }

        let (owner, repo) = github::parse_repo_reference(reference)?;
        self.store
            .get_app_by_owner_repo(&owner, &repo)?
            .ok_or_else(|| Error::NotFoundError(format!("{}/{} is not tracked", owner, repo)))
    }

    /// Start tracking a repository
    pub fn add_app(&self, input: &str, options: &AddOptions) -> Result<TrackedApp> {
        let (owner, repo) = github::parse_repo_reference(input)?;

        if let Some(existing) = self.store.get_app_by_owner_repo(&owner, &repo)? {
            return Err(Error::ConflictError(format!(
                "{} is already tracked as '{}'",
                existing.full_name(),
                existing.name
            )));
        }

        let release = self
            .client
            .fetch_newest_release(&owner, &repo, options.include_prerelease)?;

        let install_type = options.install_type.unwrap_or_else(|| {
            release
                .as_ref()
                .and_then(|r| selector::select_best_asset(&r.assets, None, &self.host))
                .and_then(|asset| asset.package_type())
                .map(selector::install_type_for)
                .unwrap_or_else(|| self.installer.system_install_type())
        });

        let name = match &options.name {
            Some(name) if !name.trim().is_empty() => name.trim().to_string(),
            _ => self.default_name(&owner, &repo),
        };

        let mut app = TrackedApp::new(&name, &owner, &repo, install_type);
        app.latest_version = release.as_ref().map(Release::version);
        app.include_prerelease = options.include_prerelease;
        app.auto_update = options.auto_update;

        reconcile::reconcile_app(&self.installer, &mut app);

        self.store.add_app(&mut app)?;
        info!(
            "Tracking {} ({}) as {}, latest {}",
            app.name,
            app.full_name(),
            app.package_type,
            app.latest_version.as_deref().unwrap_or("none")
        );
        Ok(app)
    }

    fn default_name(&self, owner: &str, repo: &str) -> String {
        match self.client.fetch_repo_info(owner, repo) {
            Ok(info) if !info.name.is_empty() => info.name,
            Ok(_) => repo.to_string(),
            Err(e) => {
                debug!("Repository info for {}/{} unavailable: {}", owner, repo, e);
                repo.to_string()
            }
        }
    }

    /// Download and install the newest release; also used for updates
    ///
    /// The download directory belongs to this call and is removed when it
    /// returns, whatever the outcome.
    pub fn install_app(
        &self,
        app_id: i64,
        progress: Option<&ProgressSink>,
        cancel: Option<&CancelToken>,
    ) -> Result<TrackedApp> {
        let mut app = self.get_app(app_id)?;

        // Fail on routing before downloading anything
        let backend = self.installer.backend(app.package_type)?;
        if !backend.is_available() {
            return Err(Error::BackendUnavailable(app.package_type.to_string()));
        }

        let release = self
            .client
            .fetch_newest_release(&app.owner, &app.repo, app.include_prerelease)?
            .ok_or_else(|| {
                Error::NotFoundError(format!("{} has no published releases", app.full_name()))
            })?;

        let work_dir = tempfile::Builder::new().prefix("autonomix-").tempdir()?;
        let artifact = self.download_artifact(&app, &release, work_dir.path(), progress, cancel)?;

        worker::report(
            progress,
            Progress::Installing {
                artifact: artifact.display().to_string(),
            },
        );
        let location = self.installer.install(&artifact, app.package_type)?;

        let version = release.version();
        info!("Installed {} {}", app.name, version);
        app.installed_version = Some(version.clone());
        app.latest_version = Some(version);
        app.install_path = Some(location);
        self.store.update_app(&mut app)?;

        Ok(app)
    }

    fn download_artifact(
        &self,
        app: &TrackedApp,
        release: &Release,
        dest_dir: &std::path::Path,
        progress: Option<&ProgressSink>,
        cancel: Option<&CancelToken>,
    ) -> Result<PathBuf> {
        if let Some(asset) = selector::select_for_install(&release.assets, app.package_type, &self.host) {
            debug!("Selected asset {} for {}", asset.name, app.name);
            return self.client.download_asset(asset, dest_dir, progress, cancel);
        }

        // Source builds can fall back to the generated tag archive
        if app.package_type == InstallType::Source {
            if let Some(url) = release.tarball_url.as_deref() {
                let dest = dest_dir.join(format!("{}-{}.tar.gz", app.repo, release.version()));
                self.client.download_url(url, &dest, progress, cancel)?;
                return Ok(dest);
            }
        }

        Err(Error::NotFoundError(format!(
            "No {} package for {} in release {}",
            app.package_type, self.host.arch, release.tag_name
        )))
    }

    /// Remove the installed app, keeping it tracked
    pub fn uninstall_app(&self, app_id: i64) -> Result<TrackedApp> {
        let mut app = self.get_app(app_id)?;

        self.installer
            .uninstall(app.package_type, &app.name, app.install_path.as_deref())?;

        info!("Uninstalled {}", app.name);
        app.installed_version = None;
        app.install_path = None;
        self.store.update_app(&mut app)?;
        Ok(app)
    }

    /// Stop tracking an app; nothing is uninstalled
    pub fn remove_app(&self, app_id: i64) -> Result<TrackedApp> {
        let app = self.get_app(app_id)?;
        self.store.delete_app(app_id)?;
        info!("Stopped tracking {}", app.full_name());
        Ok(app)
    }

    /// Fetch the latest version of every app, then reconcile every app
    ///
    /// One app's failed lookup never stops the others.
    pub fn check_updates(&self) -> Result<UpdateReport> {
        let mut apps = self.store.get_all_apps()?;
        let mut report = UpdateReport {
            checked: apps.len(),
            ..Default::default()
        };

        let client = &self.client;
        let fetched: Vec<Result<Option<Release>>> = apps
            .par_iter()
            .map(|app| client.fetch_newest_release(&app.owner, &app.repo, app.include_prerelease))
            .collect();

        for (app, result) in apps.iter_mut().zip(fetched) {
            let mut dirty = false;

            match result {
                Ok(Some(release)) => {
                    let version = release.version();
                    if app.latest_version.as_deref() != Some(version.as_str()) {
                        debug!("{} latest version is now {}", app.name, version);
                        app.latest_version = Some(version);
                        dirty = true;
                    }
                }
                Ok(None) => debug!("{} has no releases", app.full_name()),
                Err(e) => {
                    warn!("Update check failed for {}: {}", app.full_name(), e);
                    report.failures.push((app.name.clone(), e.to_string()));
                }
            }

            let change = reconcile::reconcile_app(&self.installer, app);
            if change.is_change() {
                report.reconciled.push((app.name.clone(), change));
                dirty = true;
            }

            if dirty {
                if let Err(e) = self.store.update_app(app) {
                    warn!("Could not save {}: {}", app.full_name(), e);
                    report.failures.push((app.name.clone(), e.to_string()));
                    continue;
                }
            }
            if app.has_update() {
                info!(
                    "Update available for {}: {} -> {}",
                    app.name,
                    app.installed_version.as_deref().unwrap_or_default(),
                    app.latest_version.as_deref().unwrap_or_default()
                );
                report.updates.push(app.clone());
            }
        }

        self.store
            .set_setting(Setting::LAST_CHECK, &chrono::Utc::now().to_rfc3339())?;

        Ok(report)
    }

    /// Reconcile every tracked app against its backend
    pub fn refresh(&self) -> Result<Vec<(String, Change)>> {
        let mut changes = Vec::new();
        for mut app in self.store.get_all_apps()? {
            let change = reconcile::reconcile_app(&self.installer, &mut app);
            if change.is_change() {
                self.store.update_app(&mut app)?;
                changes.push((app.name.clone(), change));
            }
        }
        Ok(changes)
    }

    /// Reconcile one app and return its current record
    pub fn refresh_app(&self, app_id: i64) -> Result<TrackedApp> {
        let mut app = self.get_app(app_id)?;
        if reconcile::reconcile_app(&self.installer, &mut app).is_change() {
            self.store.update_app(&mut app)?;
        }
        Ok(app)
    }

    /// Make sure the running application tracks itself
    ///
    /// The recorded installed version is always the running version.
    pub fn register_self(&self) -> Result<TrackedApp> {
        let (owner, repo) = github::parse_repo_reference(env!("CARGO_PKG_REPOSITORY"))?;
        let version = env!("CARGO_PKG_VERSION");

        if let Some(mut app) = self.store.get_app_by_owner_repo(&owner, &repo)? {
            if app.installed_version.as_deref() != Some(version) {
                debug!("Recording running version {} for {}", version, app.name);
                app.installed_version = Some(version.to_string());
                self.store.update_app(&mut app)?;
            }
            return Ok(app);
        }

        let install_type = self
            .installer
            .detect_self_install_type(env!("CARGO_PKG_NAME"))
            .unwrap_or_else(|| self.installer.system_install_type());

        let mut app = TrackedApp::new("Autonomix", &owner, &repo, install_type);
        app.installed_version = Some(version.to_string());
        self.store.add_app(&mut app)?;

        info!("Registered Autonomix {} for self-updates ({})", version, install_type);
        Ok(app)
    }

    pub fn releases(&self, input: &str, include_prerelease: bool) -> Result<Vec<Release>> {
        let (owner, repo) = github::parse_repo_reference(input)?;
        self.client.fetch_all_releases(&owner, &repo, include_prerelease)
    }
}
