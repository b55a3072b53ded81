//! CLI error types and conversions

use crate::config::ConfigError;
use crate::pipeline::PipelineError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    /// Pipeline error
    #[error("pipeline error: {0}")]
    PipelineError(#[from] PipelineError),
}
