//! Command implementations

pub mod collect;

pub mod doctor;

pub mod finalize;

pub mod publish;

pub mod releases;

use anyhow::Context;
use camino::Utf8PathBuf;
use trainyard_core::config::{Config, DistributionConfig, TrainConfig};

/// Fetch the `[train]` section or fail with a pointer to the config docs.
///
/// Shared across commands that operate on the release train.
pub fn require_train(config: &Config) -> anyhow::Result<&TrainConfig> {
    let train = config
        .train
        .as_ref()
        .context("no [train] section configured — add repositories to .trainyard.toml")?;
    anyhow::ensure!(
        !train.repositories.is_empty(),
        "[train] has no repositories configured"
    );
    Ok(train)
}

/// Fetch the `[distribution]` section or fail with a pointer to the config docs.
pub fn require_distribution(config: &Config) -> anyhow::Result<&DistributionConfig> {
    config
        .distribution
        .as_ref()
        .context("no [distribution] section configured — add bucket and manifest_key to .trainyard.toml")
}

/// Resolve the mirror cache directory for the train.
pub fn cache_dir(train: &TrainConfig) -> anyhow::Result<Utf8PathBuf> {
    train
        .cache_dir()
        .context("no cache directory configured and no platform default available")
}
