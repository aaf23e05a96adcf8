//! Runtime arguments
//!
//! What the container runtime passes besides the configuration: the
//! `CNI_*` environment and the Kubernetes pod identity carried in
//! `CNI_ARGS`.

use crate::config::RuntimeConfig;
use crate::delegate::DelegateConfig;
use crate::error::EngineError;
use crate::resources::PodIdentity;
use cni_client::RuntimeEnv;
use serde_json::{Map, Value};

/// Arguments of one meta-plugin invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdArgs {
    pub container_id: String,
    pub netns: String,
    pub ifname: String,
    /// Raw `CNI_ARGS`
    pub args: String,
}

impl CmdArgs {
    pub fn new(container_id: &str, netns: &str, ifname: &str, args: &str) -> Self {
        Self {
            container_id: container_id.to_string(),
            netns: netns.to_string(),
            ifname: ifname.to_string(),
            args: args.to_string(),
        }
    }

    /// Environment for a delegate attached as `ifname`
    ///
    /// `CNI_ARGS` is passed through, with `IgnoreUnknown=true` first so
    /// plugins tolerate the Kubernetes keys.
    pub fn delegate_env(&self, ifname: &str) -> Result<RuntimeEnv, EngineError> {
        let mut env = RuntimeEnv::new(&self.container_id, &self.netns, ifname);
        env.args.push(("IgnoreUnknown".to_string(), "true".to_string()));
        for (k, v) in parse_cni_args(&self.args)? {
            if k != "IgnoreUnknown" {
                env.args.push((k, v));
            }
        }
        Ok(env)
    }
}

/// Pod identity from `CNI_ARGS`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct K8sArgs {
    pub pod_namespace: String,
    pub pod_name: String,
    pub infra_container_id: String,
    pub pod_uid: String,
}

impl K8sArgs {
    /// Extract the `K8S_POD_*` keys; other keys are ignored
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let mut args = K8sArgs::default();
        for (k, v) in parse_cni_args(raw)? {
            match k.as_str() {
                "K8S_POD_NAMESPACE" => args.pod_namespace = v,
                "K8S_POD_NAME" => args.pod_name = v,
                "K8S_POD_INFRA_CONTAINER_ID" => args.infra_container_id = v,
                "K8S_POD_UID" => args.pod_uid = v,
                _ => {}
            }
        }
        Ok(args)
    }

    /// Whether the runtime told us which pod this is
    pub fn has_pod(&self) -> bool {
        !self.pod_namespace.is_empty() && !self.pod_name.is_empty()
    }

    pub fn identity(&self) -> PodIdentity {
        PodIdentity {
            namespace: self.pod_namespace.clone(),
            name: self.pod_name.clone(),
            uid: self.pod_uid.clone(),
        }
    }
}

/// Split `K1=V1;K2=V2`
pub fn parse_cni_args(raw: &str) -> Result<Vec<(String, String)>, EngineError> {
    raw.split(';')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
            _ => Err(EngineError::Parse(format!(
                "invalid CNI_ARGS pair {pair:?}"
            ))),
        })
        .collect()
}

/// Capability arguments for a delegate
///
/// The master delegate starts from the runtime's own capability arguments;
/// requests made by the pod for this attachment take precedence.
pub fn capability_args(
    delegate: &DelegateConfig,
    runtime: Option<&RuntimeConfig>,
) -> Result<Map<String, Value>, EngineError> {
    let mut caps = Map::new();
    if delegate.master_plugin {
        if let Some(Value::Object(runtime)) = runtime.map(serde_json::to_value).transpose()? {
            caps = runtime;
        }
    }

    if !delegate.port_mappings_request.is_empty() {
        caps.insert(
            "portMappings".to_string(),
            serde_json::to_value(&delegate.port_mappings_request)?,
        );
    }
    if let Some(bandwidth) = &delegate.bandwidth_request {
        caps.insert("bandwidth".to_string(), serde_json::to_value(bandwidth)?);
    }
    if !delegate.ip_request.is_empty() {
        caps.insert("ips".to_string(), serde_json::to_value(&delegate.ip_request)?);
    }
    if let Some(mac) = &delegate.mac_request {
        caps.insert("mac".to_string(), Value::String(mac.clone()));
    }
    if let Some(guid) = &delegate.infiniband_guid_request {
        caps.insert("infinibandGUID".to_string(), Value::String(guid.clone()));
    }
    if let Some(device_id) = &delegate.device_id {
        caps.insert("deviceID".to_string(), Value::String(device_id.clone()));
    }
    Ok(caps)
}
