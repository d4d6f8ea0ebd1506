//! Subcommands and the helpers they share.

pub mod batch;
pub mod config;
pub mod process;

use std::path::Path;

use gstx_core::{ExtractionStrategy, GstxConfig, ScorerKind};

/// File extensions the pipeline accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "png", "jpg", "jpeg", "tif", "tiff", "txt"];

/// `--strategy` values.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum StrategyArg {
    /// Label patterns over the text
    Pattern,
    /// Generative model returning JSON
    Model,
}

impl From<StrategyArg> for ExtractionStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::Pattern => ExtractionStrategy::Pattern,
            StrategyArg::Model => ExtractionStrategy::Model,
        }
    }
}

/// `--scorer` values.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum ScorerArg {
    /// Trusted iff no field has low confidence
    Tier,
    /// Trusted iff the averaged field score exceeds the threshold
    Average,
}

impl From<ScorerArg> for ScorerKind {
    fn from(arg: ScorerArg) -> Self {
        match arg {
            ScorerArg::Tier => ScorerKind::Tier,
            ScorerArg::Average => ScorerKind::Average,
        }
    }
}

/// Load the config file (explicit path, else the user config if present),
/// then apply environment overrides.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<GstxConfig> {
    let config = match config_path {
        Some(path) => GstxConfig::from_file(Path::new(path))
            .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path, e))?,
        None => {
            let default_path = config::default_config_path();
            if default_path.exists() {
                GstxConfig::from_file(&default_path)?
            } else {
                GstxConfig::default()
            }
        }
    };
    Ok(config.with_env_overrides())
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
