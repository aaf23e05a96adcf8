//! Plugin-level error types.
//!
//! Everything that can go wrong before or around the delegate engine, with
//! the CNI error code reported for it.

use cluster_client::ClusterError;
use delegate_engine::EngineError;
use thiserror::Error;

/// Errors reported to the runtime by the meta-plugin.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("required environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("unsupported CNI_COMMAND {0:?}")]
    UnknownCommand(String),

    #[error("failed to read configuration from stdin: {0}")]
    Stdin(#[source] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to create Kubernetes client: {0}")]
    Cluster(#[from] ClusterError),

    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

impl PluginError {
    /// CNI error code
    pub fn code(&self) -> u32 {
        match self {
            PluginError::MissingEnv(_) | PluginError::UnknownCommand(_) => 4,
            PluginError::Stdin(_) => 5,
            PluginError::Engine(e) => e.code(),
            PluginError::Cluster(_) | PluginError::Encode(_) => 999,
        }
    }
}
