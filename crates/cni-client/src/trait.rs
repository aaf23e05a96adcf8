//! PluginExecutor trait for mocking
//!
//! Abstracts plugin execution so the delegate engine can run against an
//! in-memory executor in unit tests.

use crate::error::CniError;
use crate::models::{CniCommand, RuntimeEnv};

/// Executes a single CNI plugin binary.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait PluginExecutor: Send + Sync {
    /// Run `plugin` (the config's `type`) for `command` with `config` on stdin.
    ///
    /// Returns the raw stdout of the plugin. For DEL and CHECK this is
    /// normally empty.
    async fn exec_plugin(
        &self,
        plugin: &str,
        command: CniCommand,
        config: &[u8],
        env: &RuntimeEnv,
    ) -> Result<Vec<u8>, CniError>;
}
