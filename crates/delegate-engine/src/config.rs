//! Meta-plugin configuration
//!
//! The configuration the runtime hands the meta-plugin on stdin. It is
//! accepted either as a single plugin configuration or as a plugin list
//! whose first plugin is the meta-plugin.

use crate::delegate::DelegateConfig;
use crate::error::EngineError;
use crds::{BandwidthEntry, PortMapEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CONF_DIR: &str = "/etc/cni/net.d";
pub const DEFAULT_CNI_DIR: &str = "/var/lib/cni/multinet";
pub const DEFAULT_BIN_DIR: &str = "/opt/cni/bin";
pub const DEFAULT_MULTUS_NAMESPACE: &str = "kube-system";
pub const DEFAULT_READINESS_TIMEOUT_SECONDS: u64 = 45;

fn default_conf_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CONF_DIR)
}

fn default_cni_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CNI_DIR)
}

fn default_bin_dir() -> PathBuf {
    PathBuf::from(DEFAULT_BIN_DIR)
}

fn default_multus_namespace() -> String {
    DEFAULT_MULTUS_NAMESPACE.to_string()
}

fn default_system_namespaces() -> Vec<String> {
    vec![DEFAULT_MULTUS_NAMESPACE.to_string()]
}

fn default_readiness_timeout() -> u64 {
    DEFAULT_READINESS_TIMEOUT_SECONDS
}

/// Meta-plugin configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetConf {
    #[serde(default)]
    pub cni_version: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub plugin_type: String,

    /// Kubeconfig used to reach the API server; no cluster access without it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,

    /// Directory searched for CNI configuration files
    #[serde(default = "default_conf_dir")]
    pub conf_dir: PathBuf,

    /// Directory holding per-container delegate caches
    #[serde(default = "default_cni_dir")]
    pub cni_dir: PathBuf,

    /// Directory of plugin binaries, searched after `CNI_PATH`
    #[serde(default = "default_bin_dir")]
    pub bin_dir: PathBuf,

    /// Network every pod is attached to first, as `[namespace/]name`, a
    /// directory or a file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_network: Option<String>,

    /// Networks attached to every pod after the cluster network
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_networks: Vec<String>,

    /// Inline delegate configurations, used when no cluster network is set
    #[serde(rename = "delegates", default, skip_serializing_if = "Vec::is_empty")]
    pub raw_delegates: Vec<Value>,

    #[serde(default)]
    pub namespace_isolation: bool,

    /// Comma-separated namespaces any pod may reference
    #[serde(rename = "globalNamespaces", default, skip_serializing_if = "String::is_empty")]
    pub raw_non_isolated_namespaces: String,

    #[serde(skip)]
    pub non_isolated_namespaces: Vec<String>,

    /// Namespace of the cluster and default networks
    #[serde(default = "default_multus_namespace")]
    pub multus_namespace: String,

    /// Namespaces whose pods get the cluster network only
    #[serde(default = "default_system_namespaces")]
    pub system_namespaces: Vec<String>,

    /// File that must exist before ADD proceeds
    #[serde(
        rename = "readinessindicatorfile",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub readiness_indicator_file: Option<PathBuf>,

    #[serde(default = "default_readiness_timeout")]
    pub readiness_timeout_seconds: u64,

    /// Upper bound on attaching the whole chain; delegates still running
    /// when it passes are abandoned and the chain rolled back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_seconds: Option<u64>,

    #[serde(flatten)]
    pub logging: LoggingConfig,

    /// Capability arguments from the runtime, handed to the master delegate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_config: Option<RuntimeConfig>,

    #[serde(skip)]
    pub delegates: Vec<DelegateConfig>,
}

/// Logging options carried inline in the configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// `panic`, `error`, `warning`, `info`, `verbose` or `debug`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,

    /// File logs are appended to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_to_stderr: Option<bool>,
}

impl LoggingConfig {
    /// Tracing filter directive for the configured level
    pub fn filter_directive(&self) -> &'static str {
        match self.log_level.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("debug") => "debug",
            Some("verbose") | Some("info") => "info",
            Some("warning") | Some("warn") => "warn",
            _ => "error",
        }
    }

    pub fn to_stderr(&self) -> bool {
        self.log_to_stderr.unwrap_or(true)
    }
}

/// Runtime-supplied capability arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_mappings: Vec<PortMapEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<BandwidthEntry>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,

    #[serde(rename = "infinibandGUID", default, skip_serializing_if = "Option::is_none")]
    pub infiniband_guid: Option<String>,

    #[serde(rename = "deviceID", default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

impl NetConf {
    /// Parse and validate the configuration read from stdin
    pub fn load(bytes: &[u8]) -> Result<Self, EngineError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::Parse(format!("failed to parse network configuration: {e}")))?;
        let value = unwrap_plugin_list(value)?;
        let mut conf: NetConf = serde_json::from_value(value)
            .map_err(|e| EngineError::Config(format!("invalid network configuration: {e}")))?;

        let has_cluster_network = conf.cluster_network.as_deref().is_some_and(|n| !n.is_empty());
        if !has_cluster_network {
            conf.cluster_network = None;
            if conf.raw_delegates.is_empty() {
                return Err(EngineError::Config(
                    "at least one delegate or a clusterNetwork must be specified".to_string(),
                ));
            }
        }

        conf.non_isolated_namespaces = parse_namespace_list(&conf.raw_non_isolated_namespaces);
        if !conf.non_isolated_namespaces.contains(&conf.multus_namespace) {
            conf.non_isolated_namespaces.push(conf.multus_namespace.clone());
        }

        if !has_cluster_network {
            conf.delegates = conf
                .raw_delegates
                .iter()
                .enumerate()
                .map(|(i, raw)| {
                    let bytes = serde_json::to_vec(raw)?;
                    DelegateConfig::from_bytes(&bytes, &format!("delegate-{i}"))
                })
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(master) = conf.delegates.first_mut() {
                master.master_plugin = true;
            }
        }
        Ok(conf)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_secs(self.readiness_timeout_seconds)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_seconds.map(Duration::from_secs)
    }

    pub fn is_system_namespace(&self, namespace: &str) -> bool {
        self.system_namespaces.iter().any(|ns| ns == namespace)
    }
}

/// `{"cniVersion", "name", "plugins": [meta, ...]}` becomes the first plugin,
/// with the list's name and version
fn unwrap_plugin_list(value: Value) -> Result<Value, EngineError> {
    let Value::Object(mut outer) = value else {
        return Err(EngineError::Parse(
            "network configuration must be a JSON object".to_string(),
        ));
    };
    let Some(plugins) = outer.remove("plugins") else {
        return Ok(Value::Object(outer));
    };
    let Some(Value::Object(mut first)) = plugins.as_array().and_then(|p| p.first()).cloned()
    else {
        return Err(EngineError::Config(
            "plugin list must start with the meta-plugin configuration".to_string(),
        ));
    };
    for key in ["name", "cniVersion"] {
        if let Some(v) = outer.remove(key) {
            first.insert(key.to_string(), v);
        }
    }
    Ok(Value::Object(first))
}

/// Split a comma-separated list, defaulting to `["default"]`
fn parse_namespace_list(raw: &str) -> Vec<String> {
    let namespaces: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|ns| !ns.is_empty())
        .map(String::from)
        .collect();
    if namespaces.is_empty() {
        vec!["default".to_string()]
    } else {
        namespaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let conf = NetConf::load(
            br#"{"cniVersion":"0.3.1","name":"multinet","type":"multinet","clusterNetwork":"flannel"}"#,
        )
        .unwrap();
        assert_eq!(conf.conf_dir, PathBuf::from(DEFAULT_CONF_DIR));
        assert_eq!(conf.cni_dir, PathBuf::from(DEFAULT_CNI_DIR));
        assert_eq!(conf.bin_dir, PathBuf::from(DEFAULT_BIN_DIR));
        assert_eq!(conf.multus_namespace, "kube-system");
        assert_eq!(conf.system_namespaces, ["kube-system"]);
        assert_eq!(conf.non_isolated_namespaces, ["default", "kube-system"]);
        assert_eq!(conf.readiness_timeout(), Duration::from_secs(45));
        assert_eq!(conf.command_timeout(), None);
        assert!(!conf.namespace_isolation);
        assert!(conf.delegates.is_empty());
        assert_eq!(conf.logging.filter_directive(), "error");
        assert!(conf.logging.to_stderr());
    }

    #[test]
    fn test_requires_delegates_or_cluster_network() {
        let err = NetConf::load(br#"{"cniVersion":"0.3.1","name":"m","type":"multinet"}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        let err = NetConf::load(br#"{"name":"m","type":"multinet","clusterNetwork":""}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
        assert!(matches!(NetConf::load(b"not json"), Err(EngineError::Parse(_))));
    }

    #[test]
    fn test_inline_delegates_first_is_master() {
        let conf = NetConf::load(
            br#"{
                "cniVersion": "0.4.0", "name": "m", "type": "multinet",
                "delegates": [
                    {"cniVersion": "0.4.0", "name": "flannel-net", "type": "flannel"},
                    {"cniVersion": "0.4.0", "type": "macvlan", "master": "eth1"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(conf.delegates.len(), 2);
        assert!(conf.delegates[0].master_plugin);
        assert_eq!(conf.delegates[0].name, "flannel-net");
        assert!(!conf.delegates[1].master_plugin);
        assert_eq!(conf.delegates[1].name, "delegate-1");
    }

    #[test]
    fn test_inline_delegate_without_type_rejected() {
        let err = NetConf::load(br#"{"type":"multinet","delegates":[{"name":"x"}]}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_plugin_list_wrapper() {
        let conf = NetConf::load(
            br#"{
                "cniVersion": "1.0.0", "name": "multinet-cni-network",
                "plugins": [{
                    "type": "multinet", "clusterNetwork": "kube-system/cilium",
                    "namespaceIsolation": true, "globalNamespaces": "shared, infra",
                    "logLevel": "verbose", "logToStderr": false,
                    "runtimeConfig": {"portMappings": [{"hostPort": 8080, "containerPort": 80}]}
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(conf.cni_version, "1.0.0");
        assert_eq!(conf.name, "multinet-cni-network");
        assert_eq!(conf.cluster_network.as_deref(), Some("kube-system/cilium"));
        assert!(conf.namespace_isolation);
        assert_eq!(conf.non_isolated_namespaces, ["shared", "infra", "kube-system"]);
        assert_eq!(conf.logging.filter_directive(), "info");
        assert!(!conf.logging.to_stderr());
        assert_eq!(conf.runtime_config.unwrap().port_mappings[0].host_port, 8080);
    }

    #[test]
    fn test_empty_plugin_list_rejected() {
        let err = NetConf::load(br#"{"name":"m","plugins":[]}"#).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
