//! CNI client errors

use crate::models::CniErrorReply;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while executing a CNI plugin
#[derive(Debug, Error)]
pub enum CniError {
    /// Plugin binary is not present on any search path entry
    #[error("failed to find plugin {plugin:?} in path {paths:?}")]
    PluginNotFound { plugin: String, paths: Vec<PathBuf> },

    /// Plugin ran and reported a structured CNI error
    #[error("plugin {plugin} failed: {reply}")]
    Plugin { plugin: String, reply: CniErrorReply },

    /// Plugin exited non-zero without a decodable error reply
    #[error("plugin {plugin} exited with {status}: {stderr}")]
    Exit { plugin: String, status: String, stderr: String },

    /// Plugin process could not be spawned or awaited
    #[error("failed to execute plugin {plugin}: {source}")]
    Exec {
        plugin: String,
        #[source]
        source: std::io::Error,
    },

    /// Plugin result on stdout is not a CNI result
    #[error("failed to decode result of plugin {plugin}: {source}")]
    Decode {
        plugin: String,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CHECK requested for a configuration older than 0.4.0
    #[error("configuration version {version:?} does not support the CHECK command")]
    CheckUnsupported { version: String },

    /// Plugin configuration is unusable (e.g. missing `type`)
    #[error("invalid plugin configuration: {0}")]
    InvalidConfig(String),
}

impl CniError {
    /// Well-known CNI error code for this failure
    pub fn code(&self) -> u32 {
        match self {
            CniError::Plugin { reply, .. } => reply.code,
            CniError::CheckUnsupported { .. } => 1,
            CniError::Exec { .. } => 5,
            CniError::Decode { .. } | CniError::Serialization(_) => 6,
            CniError::InvalidConfig(_) => 7,
            CniError::PluginNotFound { .. } | CniError::Exit { .. } => 999,
        }
    }
}
