//! Delegate invocation
//!
//! Runs one delegate through a `PluginExecutor`. A plugin list is executed
//! plugin by plugin the way a runtime would: ADD runs in list order feeding
//! each result to the next plugin as `prevResult`, DEL runs in reverse, and
//! CHECK runs in order with the cached result as `prevResult`.

use crate::delegate::{NetworkConfig, PluginConf};
use cni_client::{CniCommand, CniError, CniResult, PluginExecutor, RuntimeEnv};
use semver::Version;
use serde_json::{Map, Value};
use tracing::debug;

/// Oldest configuration version that knows CHECK
const CHECK_MIN_VERSION: Version = Version::new(0, 4, 0);

/// Whether configurations of `cni_version` support CHECK
pub fn supports_check(cni_version: &str) -> bool {
    Version::parse(cni_version).is_ok_and(|v| v >= CHECK_MIN_VERSION)
}

/// List-level keys every plugin of a list inherits
struct ListContext<'a> {
    name: Option<&'a str>,
    cni_version: Option<&'a str>,
}

fn single_context(plugin: &PluginConf) -> ListContext<'_> {
    ListContext {
        name: plugin.name(),
        cni_version: plugin.cni_version(),
    }
}

/// Configuration bytes for one plugin execution
fn plugin_config(
    plugin: &PluginConf,
    list: &ListContext<'_>,
    capability_args: &Map<String, Value>,
    prev_result: Option<&CniResult>,
) -> Result<Vec<u8>, CniError> {
    let mut conf = plugin.as_map().clone();
    if let Some(name) = list.name {
        conf.insert("name".to_string(), Value::String(name.to_string()));
    }
    if let Some(version) = list.cni_version {
        conf.insert("cniVersion".to_string(), Value::String(version.to_string()));
    }

    let runtime_config: Map<String, Value> = plugin
        .capabilities()
        .filter_map(|cap| Some((cap.to_string(), capability_args.get(cap)?.clone())))
        .collect();
    if !runtime_config.is_empty() {
        conf.insert("runtimeConfig".to_string(), Value::Object(runtime_config));
    }

    if let Some(prev) = prev_result {
        let mut prev = prev.clone();
        if let Some(version) = list.cni_version {
            prev.cni_version = version.to_string();
        }
        conf.insert("prevResult".to_string(), serde_json::to_value(&prev)?);
    }
    Ok(serde_json::to_vec(&conf)?)
}

async fn exec(
    executor: &dyn PluginExecutor,
    plugin: &PluginConf,
    command: CniCommand,
    config: Vec<u8>,
    env: &RuntimeEnv,
) -> Result<Vec<u8>, CniError> {
    debug!(
        "{} plugin {} ifname {} container {}",
        command,
        plugin.plugin_type(),
        env.ifname,
        env.container_id
    );
    executor
        .exec_plugin(plugin.plugin_type(), command, &config, env)
        .await
}

fn decode(plugin: &PluginConf, stdout: &[u8]) -> Result<CniResult, CniError> {
    CniResult::from_slice(stdout).map_err(|source| CniError::Decode {
        plugin: plugin.plugin_type().to_string(),
        source,
    })
}

/// ADD the delegate, returning the final result
pub async fn add(
    executor: &dyn PluginExecutor,
    conf: &NetworkConfig,
    env: &RuntimeEnv,
    capability_args: &Map<String, Value>,
) -> Result<CniResult, CniError> {
    match conf {
        NetworkConfig::Single(plugin) => {
            let config = plugin_config(plugin, &single_context(plugin), capability_args, None)?;
            let stdout = exec(executor, plugin, CniCommand::Add, config, env).await?;
            decode(plugin, &stdout)
        }
        NetworkConfig::List(list) => {
            let context = ListContext {
                name: list.name(),
                cni_version: list.cni_version(),
            };
            let mut prev: Option<CniResult> = None;
            for plugin in list.plugins() {
                let config = plugin_config(plugin, &context, capability_args, prev.as_ref())?;
                let stdout = exec(executor, plugin, CniCommand::Add, config, env).await?;
                prev = Some(decode(plugin, &stdout)?);
            }
            prev.ok_or_else(|| CniError::InvalidConfig("plugin list has no plugins".to_string()))
        }
    }
}

/// DEL the delegate; plugin lists are torn down last plugin first
pub async fn del(
    executor: &dyn PluginExecutor,
    conf: &NetworkConfig,
    env: &RuntimeEnv,
    capability_args: &Map<String, Value>,
    prev_result: Option<&CniResult>,
) -> Result<(), CniError> {
    match conf {
        NetworkConfig::Single(plugin) => {
            let config =
                plugin_config(plugin, &single_context(plugin), capability_args, prev_result)?;
            exec(executor, plugin, CniCommand::Del, config, env).await?;
        }
        NetworkConfig::List(list) => {
            let context = ListContext {
                name: list.name(),
                cni_version: list.cni_version(),
            };
            for plugin in list.plugins().iter().rev() {
                let config = plugin_config(plugin, &context, capability_args, prev_result)?;
                exec(executor, plugin, CniCommand::Del, config, env).await?;
            }
        }
    }
    Ok(())
}

/// CHECK the delegate against its cached result
pub async fn check(
    executor: &dyn PluginExecutor,
    conf: &NetworkConfig,
    env: &RuntimeEnv,
    capability_args: &Map<String, Value>,
    prev_result: Option<&CniResult>,
) -> Result<(), CniError> {
    let version = conf.cni_version().unwrap_or_default();
    if !supports_check(version) {
        return Err(CniError::CheckUnsupported {
            version: version.to_string(),
        });
    }
    match conf {
        NetworkConfig::Single(plugin) => {
            let config =
                plugin_config(plugin, &single_context(plugin), capability_args, prev_result)?;
            exec(executor, plugin, CniCommand::Check, config, env).await?;
        }
        NetworkConfig::List(list) => {
            if list.disable_check() {
                debug!("CHECK disabled for plugin list {:?}", list.name());
                return Ok(());
            }
            let context = ListContext {
                name: list.name(),
                cni_version: list.cni_version(),
            };
            for plugin in list.plugins() {
                let config = plugin_config(plugin, &context, capability_args, prev_result)?;
                exec(executor, plugin, CniCommand::Check, config, env).await?;
            }
        }
    }
    Ok(())
}
