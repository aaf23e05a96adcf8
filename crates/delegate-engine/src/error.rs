//! Delegate engine errors

use cluster_client::ClusterError;
use cni_client::{CniCommand, CniError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while resolving, loading or invoking delegates
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed annotation, argument string or interface layout
    #[error("parse error: {0}")]
    Parse(String),

    /// No source could produce a configuration for the reference
    #[error("network {reference} not found: {reason}")]
    NotFound { reference: String, reason: String },

    /// Configuration is present but unusable
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Namespace isolation forbids the reference
    #[error(
        "namespace isolation violation: pod namespace {pod_namespace:?} may not reference a network in namespace {target_namespace:?}"
    )]
    Authorization {
        pod_namespace: String,
        target_namespace: String,
    },

    /// A delegate plugin failed
    #[error("delegate {index} ({network}, type {plugin}) {command} failed: {source}")]
    Invocation {
        index: usize,
        network: String,
        plugin: String,
        command: CniCommand,
        #[source]
        source: CniError,
    },

    /// The command deadline passed while a delegate was running
    #[error("delegate {index} ({network}) {command} did not finish within the {timeout:?} command deadline")]
    DeadlineExceeded {
        index: usize,
        network: String,
        command: CniCommand,
        timeout: Duration,
    },

        /// ADD failed and undoing the completed delegates also failed
    #[error("{primary}; rollback failed: {}", join_errors(.failures))]
    Rollback {
        primary: Box<EngineError>,
        failures: Vec<EngineError>,
    },

    /// DEL attempted every delegate and some failed
    #[error("DEL failed for {} delegate(s): {}", .0.len(), join_errors(.0))]
    Delete(Vec<EngineError>),

    /// Kubernetes API error
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Device resource lookup failed
    #[error("device resources: {0}")]
    Resources(#[from] ResourceError),

    /// Readiness indicator never appeared
    #[error("readiness indicator {} did not appear within {timeout:?}", .path.display())]
    NotReady { path: PathBuf, timeout: Duration },

    /// Filesystem error
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn join_errors(errors: &[EngineError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    /// CNI error code reported to the runtime
    ///
    /// Codes 4-7 are the well-known CNI codes; plugin failures pass the
    /// plugin's own code through; everything else is 999.
    pub fn code(&self) -> u32 {
        match self {
            EngineError::Parse(_) | EngineError::Serialization(_) => 6,
            EngineError::Config(_)
            | EngineError::Authorization { .. }
            | EngineError::NotFound { .. } => 7,
            EngineError::Io { .. } => 5,
            EngineError::Invocation { source, .. } => source.code(),
            EngineError::Rollback { primary, .. } => primary.code(),
            EngineError::Delete(failures) => failures.first().map_or(999, EngineError::code),
            EngineError::Cluster(_)
            | EngineError::Resources(_)
            | EngineError::NotReady { .. }
            | EngineError::DeadlineExceeded { .. } => 999,
        }
    }
}

/// Errors reading kubelet device assignments
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("failed to read checkpoint {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode checkpoint {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Pod identity lacks a UID to match checkpoint entries against
    #[error("pod {0} has no UID")]
    MissingUid(String),
}
