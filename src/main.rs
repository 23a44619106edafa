// src/main.rs

use anyhow::{Result, anyhow, bail};
use autonomix::config::Config;
use autonomix::db::AppStore;
use autonomix::db::models::{InstallType, Setting, TrackedApp};
use autonomix::github::GitHubClient;
use autonomix::installer::Installer;
use autonomix::selector::HostFacts;
use autonomix::tracker::{AddOptions, Tracker};
use autonomix::worker::{self, CancelToken, Progress};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "autonomix")]
#[command(author, version, about = "Track GitHub releases and install them with the native package manager", long_about = None)]
struct Cli {
    /// Database path (default: ~/.config/autonomix/autonomix.db)
    #[arg(short, long, global = true)]
    db_path: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start tracking a repository
    Add {
        /// owner/repo or repository URL
        repo: String,
        /// Display name (default: repository name)
        #[arg(short, long)]
        name: Option<String>,
        /// Install type: deb, rpm, appimage or source (default: best asset for this host)
        #[arg(short = 't', long = "type")]
        install_type: Option<InstallType>,
        /// Consider prereleases when looking for the newest release
        #[arg(long)]
        prerelease: bool,
        /// Install updates found by `check` automatically
        #[arg(long)]
        auto_update: bool,
    },
    /// List tracked applications
    List,
    /// Show one tracked application
    Info {
        /// Numeric id or owner/repo
        app: String,
    },
    /// Download and install the newest release
    Install {
        /// Numeric id or owner/repo
        app: String,
    },
    /// Install available updates
    Update {
        /// Numeric id or owner/repo
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        app: Option<String>,
        /// Update every app with a newer release
        #[arg(short, long)]
        all: bool,
    },
    /// Uninstall an application but keep tracking it
    Uninstall {
        /// Numeric id or owner/repo
        app: String,
    },
    /// Stop tracking an application (does not uninstall)
    Remove {
        /// Numeric id or owner/repo
        app: String,
    },
    /// Look for new releases of every tracked application
    Check,
    /// Re-read install state from the package managers
    Refresh,
    /// List the releases of a repository
    Releases {
        /// owner/repo or repository URL
        repo: String,
        /// Include prereleases
        #[arg(long)]
        prerelease: bool,
    },
    /// Read or write a stored setting
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print a setting
    Get { key: String },
    /// Store a setting
    Set { key: String, value: String },
}

/// Ctrl-C routing: cancels the armed download, otherwise exits
#[derive(Clone, Default)]
struct Interrupt {
    token: CancelToken,
    armed: Arc<AtomicBool>,
}

impl Interrupt {
    fn install(&self) -> Result<()> {
        let this = self.clone();
        ctrlc::set_handler(move || {
            if this.armed.load(Ordering::SeqCst) {
                eprintln!("\nCancelling download...");
                this.token.cancel();
            } else {
                std::process::exit(130);
            }
        })?;
        Ok(())
    }

    fn arm(&self) {
        self.token.reset();
        self.armed.store(true, Ordering::SeqCst);
    }

    fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

fn open_tracker(config: &Config) -> Result<Tracker<Connection>> {
    let conn = autonomix::db::open_or_init(&config.db_path_str())?;

    let mut config = config.clone();
    config.load_stored_token(&conn)?;

    Ok(Tracker::new(
        conn,
        GitHubClient::from_config(&config)?,
        Installer::from_config(&config),
        HostFacts::detect(),
    ))
}

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}";

/// Spinner shown until the download reports a content length
fn download_bar(label: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        bar.set_style(style);
    }
    bar.set_message(label.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn show_progress(bar: &ProgressBar, event: &Progress) {
    match event {
        Progress::Downloading { received, total } => {
            if bar.length() != Some(*total) {
                bar.set_length(*total);
                if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
                    bar.set_style(style.progress_chars("#>-"));
                }
            }
            bar.set_position(*received);
        }
        Progress::Installing { artifact } => {
            bar.set_message(format!("installing {}", artifact));
        }
    }
}

/// Install on a worker thread, drawing progress until it finishes
fn run_install(config: &Config, interrupt: &Interrupt, app_id: i64, label: &str) -> Result<TrackedApp> {
    let (tx, rx) = mpsc::channel();
    let cancel = interrupt.token.clone();
    let worker_config = config.clone();

    interrupt.arm();
    let task = worker::spawn("install", move || {
        let tracker = open_tracker(&worker_config)
            .map_err(|e| autonomix::Error::InitError(e.to_string()))?;
        tracker.install_app(app_id, Some(&tx), Some(&cancel))
    });

    let bar = download_bar(label);
    let result = loop {
        for event in rx.try_iter() {
            if matches!(event, Progress::Installing { .. }) {
                // The native tool owns the install; Ctrl-C exits from here on
                interrupt.disarm();
            }
            show_progress(&bar, &event);
        }
        if let Some(result) = task.wait_timeout(Duration::from_millis(100)) {
            break result;
        }
    };
    bar.finish_and_clear();

    interrupt.disarm();
    Ok(result?)
}

fn print_app(app: &TrackedApp) {
    let id = app.id.map(|id| id.to_string()).unwrap_or_default();
    let installed = app.installed_version.as_deref().unwrap_or("-");
    let latest = app.latest_version.as_deref().unwrap_or("-");
    let marker = if app.has_update() { " *" } else { "" };

    println!(
        "  [{}] {} ({}) {} installed: {} latest: {}{}",
        id,
        app.name,
        app.full_name(),
        app.package_type,
        installed,
        latest,
        marker
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let Some(command) = cli.command else {
        println!("Autonomix v{}", env!("CARGO_PKG_VERSION"));
        println!("Run 'autonomix --help' for usage information");
        return Ok(());
    };

    if let Commands::Completions { shell } = command {
        clap_complete::generate(shell, &mut Cli::command(), "autonomix", &mut io::stdout());
        return Ok(());
    }

    let config = Config::from_env(cli.db_path);
    let tracker = open_tracker(&config)?;

    if let Err(e) = tracker.register_self() {
        warn!("Self-registration failed: {}", e);
    }

    let interrupt = Interrupt::default();
    interrupt.install()?;

    match command {
        Commands::Add {
            repo,
            name,
            install_type,
            prerelease,
            auto_update,
        } => {
            let options = AddOptions {
                name,
                install_type,
                include_prerelease: prerelease,
                auto_update,
            };
            let app = tracker.add_app(&repo, &options)?;

            println!("Now tracking {} ({})", app.name, app.full_name());
            println!("  Install type: {}", app.package_type);
            println!(
                "  Latest version: {}",
                app.latest_version.as_deref().unwrap_or("no releases")
            );
            if let Some(version) = &app.installed_version {
                println!("  Already installed: {}", version);
            }
            Ok(())
        }
        Commands::List => {
            let apps = tracker.list_apps()?;
            if apps.is_empty() {
                println!("No tracked applications.");
            } else {
                println!("Tracked applications:");
                for app in &apps {
                    print_app(app);
                }
                let updates = apps.iter().filter(|a| a.has_update()).count();
                println!("\nTotal: {} app(s), {} update(s) available", apps.len(), updates);
            }
            Ok(())
        }
        Commands::Info { app } => {
            let found = tracker.find_app(&app)?;
            let id = found.id.ok_or_else(|| anyhow!("{} has no id", found.name))?;
            let app = tracker.refresh_app(id)?;

            println!("{} ({})", app.name, app.full_name());
            println!("  Repository: {}", app.repo_url);
            println!("  Install type: {}", app.package_type);
            println!(
                "  Installed: {}",
                app.installed_version.as_deref().unwrap_or("no")
            );
            println!("  Latest: {}", app.latest_version.as_deref().unwrap_or("unknown"));
            if let Some(path) = &app.install_path {
                println!("  Location: {}", path);
            }
            println!("  Prereleases: {}", if app.include_prerelease { "yes" } else { "no" });
            println!("  Auto-update: {}", if app.auto_update { "yes" } else { "no" });
            if let Some(added) = &app.added_at {
                println!("  Added: {}", added);
            }
            Ok(())
        }
        Commands::Install { app } => {
            let app = tracker.find_app(&app)?;
            let id = app.id.ok_or_else(|| anyhow!("{} has no id", app.name))?;

            println!("Installing {}...", app.name);
            let app = run_install(&config, &interrupt, id, &app.name)?;
            println!(
                "Installed {} {}",
                app.name,
                app.installed_version.as_deref().unwrap_or_default()
            );
            Ok(())
        }
        Commands::Update { app, all } => {
            let targets: Vec<TrackedApp> = if all {
                tracker
                    .list_apps()?
                    .into_iter()
                    .filter(|a| a.has_update())
                    .collect()
            } else {
                let reference = app.ok_or_else(|| anyhow!("Specify an app or --all"))?;
                vec![tracker.find_app(&reference)?]
            };

            if targets.is_empty() {
                println!("Everything is up to date.");
                return Ok(());
            }

            let mut failed = 0;
            for app in targets {
                let Some(id) = app.id else { continue };
                println!(
                    "Updating {} {} -> {}",
                    app.name,
                    app.installed_version.as_deref().unwrap_or("-"),
                    app.latest_version.as_deref().unwrap_or("-")
                );
                match run_install(&config, &interrupt, id, &app.name) {
                    Ok(_) => {}
                    Err(e) => {
                        eprintln!("  Failed: {}", e);
                        failed += 1;
                    }
                }
            }

            if failed > 0 {
                bail!("{} update(s) failed", failed);
            }
            Ok(())
        }
        Commands::Uninstall { app } => {
            let app = tracker.find_app(&app)?;
            let id = app.id.ok_or_else(|| anyhow!("{} has no id", app.name))?;
            let app = tracker.uninstall_app(id)?;
            println!("Uninstalled {} (still tracked)", app.name);
            Ok(())
        }
        Commands::Remove { app } => {
            let app = tracker.find_app(&app)?;
            let id = app.id.ok_or_else(|| anyhow!("{} has no id", app.name))?;
            let app = tracker.remove_app(id)?;
            println!("Stopped tracking {}", app.full_name());
            Ok(())
        }
        Commands::Check => {
            let worker_config = config.clone();
            let report = worker::spawn("check", move || {
                let tracker = open_tracker(&worker_config)
                    .map_err(|e| autonomix::Error::InitError(e.to_string()))?;
                tracker.check_updates()
            })
            .wait()?;

            println!("Checked {} app(s)", report.checked);
            for (name, change) in &report.reconciled {
                println!("  {}: {:?}", name, change);
            }
            for (name, message) in &report.failures {
                println!("  {}: check failed: {}", name, message);
            }
            if report.updates.is_empty() {
                println!("Everything is up to date.");
            } else {
                println!("Updates available:");
                for app in &report.updates {
                    print_app(app);
                }
            }

            for app in report.auto_updates() {
                let Some(id) = app.id else { continue };
                info!("Auto-updating {}", app.name);
                if let Err(e) = run_install(&config, &interrupt, id, &app.name) {
                    eprintln!("  Auto-update of {} failed: {}", app.name, e);
                }
            }
            Ok(())
        }
        Commands::Refresh => {
            let changes = tracker.refresh()?;
            if changes.is_empty() {
                println!("All records match the installed state.");
            } else {
                for (name, change) in &changes {
                    println!("  {}: {:?}", name, change);
                }
                println!("Updated {} record(s)", changes.len());
            }
            Ok(())
        }
        Commands::Releases { repo, prerelease } => {
            let releases = tracker.releases(&repo, prerelease)?;
            if releases.is_empty() {
                println!("No releases found.");
            }
            for release in &releases {
                let flag = if release.is_prerelease { " (prerelease)" } else { "" };
                println!(
                    "  {} {}{} - {} asset(s), published {}",
                    release.version(),
                    release.title(),
                    flag,
                    release.assets.len(),
                    release.published_at.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
        Commands::Config { action } => match action {
            ConfigAction::Get { key } => {
                match tracker.store().get_setting(&key)? {
                    Some(value) if key == Setting::GITHUB_TOKEN => {
                        println!("{} = <{} characters>", key, value.len())
                    }
                    Some(value) => println!("{} = {}", key, value),
                    None => println!("{} is not set", key),
                }
                Ok(())
            }
            ConfigAction::Set { key, value } => {
                if key != Setting::GITHUB_TOKEN {
                    bail!("Unknown setting '{}' (settable: {})", key, Setting::GITHUB_TOKEN);
                }
                tracker.store().set_setting(&key, &value)?;
                println!("Stored {}", key);
                Ok(())
            }
        },
        Commands::Completions { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_add_with_type() {
        let cli = Cli::try_parse_from(["autonomix", "add", "octo/tool", "--type", "AppImage"]).unwrap();
        match cli.command {
            Some(Commands::Add { repo, install_type, .. }) => {
                assert_eq!(repo, "octo/tool");
                assert_eq!(install_type, Some(InstallType::AppImage));
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_update_requires_target() {
        assert!(Cli::try_parse_from(["autonomix", "update"]).is_err());
        assert!(Cli::try_parse_from(["autonomix", "update", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["autonomix", "update", "1", "--all"]).is_err());
    }

    #[test]
    fn test_global_db_path_after_subcommand() {
        let cli = Cli::try_parse_from(["autonomix", "list", "--db-path", "/tmp/a.db"]).unwrap();
        assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/a.db")));
    }

    #[test]
    fn test_progress_bar_gains_length_from_download() {
        let bar = ProgressBar::new_spinner();
        bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());
        assert_eq!(bar.length(), None);

        show_progress(&bar, &Progress::Downloading { received: 10, total: 100 });
        assert_eq!(bar.length(), Some(100));
        assert_eq!(bar.position(), 10);

        show_progress(&bar, &Progress::Downloading { received: 50, total: 100 });
        assert_eq!(bar.position(), 50);

        show_progress(
            &bar,
            &Progress::Installing {
                artifact: "tool.deb".into(),
            },
        );
        assert_eq!(bar.message(), "installing tool.deb");
        assert_eq!(bar.position(), 50);
    }
}
