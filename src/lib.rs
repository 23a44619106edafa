// src/lib.rs

//! Autonomix
//!
//! Tracks applications published as GitHub releases and installs them
//! through whichever native package manager fits the artifact (DEB, RPM,
//! AppImage, or a build from source).
//!
//! # Architecture
//!
//! - Release resolution: fetch release metadata, normalize version strings
//! - Asset selection: pick the one artifact that fits this machine
//! - Backends: install, uninstall and query across native package ecosystems
//! - Coordinator: route every request to the backend for a package type
//! - Reconciliation: the tracked record is a cache of what the backend reports
//! - Database-first: tracked apps and settings live in SQLite

pub mod backends;
pub mod config;
pub mod db;
mod error;
pub mod github;
pub mod installer;
pub mod reconcile;
pub mod selector;
pub mod tracker;
pub mod worker;

pub use error::{Error, Result};
