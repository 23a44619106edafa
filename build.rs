// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn app_arg() -> Arg {
    Arg::new("app")
        .required(true)
        .help("Numeric id or owner/repo")
}

fn build_cli() -> Command {
    Command::new("autonomix")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Autonomix Contributors")
        .about("Track GitHub releases and install them with the native package manager")
        .subcommand_required(false)
        .arg(
            Arg::new("db_path")
                .short('d')
                .long("db-path")
                .value_name("PATH")
                .global(true)
                .help("Database path (default: ~/.config/autonomix/autonomix.db)"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log at debug level unless RUST_LOG says otherwise"),
        )
        .subcommand(
            Command::new("add")
                .about("Start tracking a repository")
                .arg(Arg::new("repo").required(true).help("owner/repo or repository URL"))
                .arg(
                    Arg::new("name")
                        .short('n')
                        .long("name")
                        .help("Display name (default: repository name)"),
                )
                .arg(
                    Arg::new("type")
                        .short('t')
                        .long("type")
                        .value_parser(["deb", "rpm", "appimage", "source"])
                        .help("Install type (default: best asset for this host)"),
                )
                .arg(
                    Arg::new("prerelease")
                        .long("prerelease")
                        .action(ArgAction::SetTrue)
                        .help("Consider prereleases when looking for the newest release"),
                )
                .arg(
                    Arg::new("auto_update")
                        .long("auto-update")
                        .action(ArgAction::SetTrue)
                        .help("Install updates found by check automatically"),
                ),
        )
        .subcommand(Command::new("list").about("List tracked applications"))
        .subcommand(
            Command::new("info")
                .about("Show one tracked application")
                .arg(app_arg()),
        )
        .subcommand(
            Command::new("install")
                .about("Download and install the newest release")
                .arg(app_arg()),
        )
        .subcommand(
            Command::new("update")
                .about("Install available updates")
                .arg(Arg::new("app").help("Numeric id or owner/repo"))
                .arg(
                    Arg::new("all")
                        .short('a')
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .help("Update every app with a newer release"),
                ),
        )
        .subcommand(
            Command::new("uninstall")
                .about("Uninstall an application but keep tracking it")
                .arg(app_arg()),
        )
        .subcommand(
            Command::new("remove")
                .about("Stop tracking an application (does not uninstall)")
                .arg(app_arg()),
        )
        .subcommand(Command::new("check").about("Look for new releases of every tracked application"))
        .subcommand(Command::new("refresh").about("Re-read install state from the package managers"))
        .subcommand(
            Command::new("releases")
                .about("List the releases of a repository")
                .arg(Arg::new("repo").required(true).help("owner/repo or repository URL"))
                .arg(
                    Arg::new("prerelease")
                        .long("prerelease")
                        .action(ArgAction::SetTrue)
                        .help("Include prereleases"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Read or write a stored setting")
                .subcommand(
                    Command::new("get")
                        .about("Print a setting")
                        .arg(Arg::new("key").required(true)),
                )
                .subcommand(
                    Command::new("set")
                        .about("Store a setting")
                        .arg(Arg::new("key").required(true))
                        .arg(Arg::new("value").required(true)),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let Some(manifest_dir) = env::var_os("CARGO_MANIFEST_DIR") else {
        println!("cargo:warning=CARGO_MANIFEST_DIR not set; skipping man page");
        return;
    };
    let man_dir = PathBuf::from(manifest_dir).join("man");
    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("autonomix.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
