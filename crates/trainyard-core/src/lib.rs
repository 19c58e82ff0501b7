//! Core library for trainyard.
//!
//! This crate provides the foundational types and functionality used by the
//! `trainyard` CLI and any downstream consumers.
//!
//! # Modules
//!
//! - [`changelog`] - Changelog parsing and release-entry merging
//! - [`collect`] - Cutting a release entry from per-repository fragments
//! - [`config`] - Configuration loading and management
//! - [`error`] - Error types and result aliases
//! - [`finalize`] - Post-publication repository advancement
//! - [`git`] - Git operations on release-train mirrors
//! - [`manifest`] - The distribution manifest document
//! - [`preflight`] - Release readiness checks
//! - [`publish`] - The artifact publication pipeline
//! - [`resolve`] - Release spec resolution from artifact notes
//! - [`storage`] - Object storage collaborator
//! - [`version`] - Release identifier model and ordering
//!
//! # Quick Start
//!
//! ```no_run
//! use trainyard_core::{Config, ConfigLoader};
//!
//! let config = ConfigLoader::new()
//!     .with_user_config(true)
//!     .load()
//!     .expect("Failed to load configuration");
//!
//! println!("Log level: {:?}", config.log_level);
//! ```
#![deny(unsafe_code)]

pub mod changelog;

pub mod collect;

pub mod config;

pub mod error;

pub mod finalize;

pub mod git;

pub mod manifest;

pub mod preflight;

pub mod publish;

pub mod resolve;

pub mod storage;

pub mod version;

pub use config::{Config, ConfigLoader, LogLevel};

pub use error::{ConfigError, ConfigResult};

pub use version::Version;

// Re-export chrono so downstream crates don't need a direct dependency.
pub use chrono;
