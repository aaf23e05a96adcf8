//! Mock PluginExecutor for unit testing
//!
//! Records every plugin invocation in memory and answers with configured
//! results or failures, so chains can be exercised without plugin binaries.

use crate::error::CniError;
use crate::executor_trait::PluginExecutor;
use crate::models::*;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One observed plugin execution
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub plugin: String,
    pub command: CniCommand,
    pub container_id: String,
    pub ifname: String,
    pub args: Vec<(String, String)>,
    /// Configuration the plugin received on stdin
    pub config: Value,
}

/// Mock executor for testing
///
/// Plugins are identified by their `type`. Unless configured otherwise, ADD
/// returns a result with one sandbox interface named after `CNI_IFNAME`,
/// and DEL/CHECK succeed with empty output.
#[derive(Clone, Default)]
pub struct MockPluginExecutor {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    results: Arc<Mutex<HashMap<String, CniResult>>>,
    failures: Arc<Mutex<HashMap<(String, CniCommand), CniErrorReply>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockPluginExecutor {
    /// Create a new mock executor
    pub fn new() -> Self {
        Self::default()
    }

    /// ADD result returned for `plugin` (for test setup)
    pub fn set_result(&self, plugin: &str, result: CniResult) {
        lock(&self.results).insert(plugin.to_string(), result);
    }

    /// Make `command` on `plugin` fail with a CNI error reply (for test setup)
    pub fn fail_on(&self, plugin: &str, command: CniCommand, code: u32, msg: &str) {
        lock(&self.failures).insert((plugin.to_string(), command), CniErrorReply::new(code, msg));
    }

    /// Every call observed so far, oldest first
    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    /// Calls for one command, oldest first
    pub fn calls_for(&self, command: CniCommand) -> Vec<RecordedCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.command == command)
            .cloned()
            .collect()
    }

    /// Plugin types invoked for one command, in call order
    pub fn plugins_for(&self, command: CniCommand) -> Vec<String> {
        self.calls_for(command).into_iter().map(|c| c.plugin).collect()
    }

    fn default_result(env: &RuntimeEnv) -> CniResult {
        CniResult {
            interfaces: vec![Interface {
                name: env.ifname.clone(),
                sandbox: env.netns.clone(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl PluginExecutor for MockPluginExecutor {
    async fn exec_plugin(
        &self,
        plugin: &str,
        command: CniCommand,
        config: &[u8],
        env: &RuntimeEnv,
    ) -> Result<Vec<u8>, CniError> {
        let config: Value = serde_json::from_slice(config)?;
        let cni_version = config
            .get("cniVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        lock(&self.calls).push(RecordedCall {
            plugin: plugin.to_string(),
            command,
            container_id: env.container_id.clone(),
            ifname: env.ifname.clone(),
            args: env.args.clone(),
            config,
        });

        if let Some(reply) = lock(&self.failures).get(&(plugin.to_string(), command)) {
            return Err(CniError::Plugin {
                plugin: plugin.to_string(),
                reply: reply.clone(),
            });
        }

        match command {
            CniCommand::Add => {
                let mut result = lock(&self.results)
                    .get(plugin)
                    .cloned()
                    .unwrap_or_else(|| Self::default_result(env));
                result.cni_version = cni_version;
                Ok(serde_json::to_vec(&result)?)
            }
            CniCommand::Del | CniCommand::Check => Ok(Vec::new()),
        }
    }
}
