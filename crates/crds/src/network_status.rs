//! Network status wire type
//!
//! The per-attachment outcome serialized into the
//! `k8s.v1.cni.cncf.io/network-status` pod annotation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of one attached network.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkStatus {
    /// Network name
    pub name: String,

    /// Interface name inside the pod
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interface: String,

    /// Assigned addresses, without prefix length
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ips: Vec<String>,

    /// Interface MAC address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mac: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    /// Whether this attachment owns the pod's default route
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,

    #[serde(default, skip_serializing_if = "DnsStatus::is_empty")]
    pub dns: DnsStatus,

    /// Device information reported by device-aware plugins
    #[serde(rename = "device-info", default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<Value>,

    /// Gateways of the default route, when `default` is set
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateway: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nameservers: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl DnsStatus {
    pub fn is_empty(&self) -> bool {
        self.nameservers.is_empty()
            && self.domain.is_empty()
            && self.search.is_empty()
            && self.options.is_empty()
    }
}

/// Parse the network-status annotation value.
pub fn parse_network_status(raw: &str) -> Result<Vec<NetworkStatus>, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
}

/// Serialize statuses into the annotation value.
pub fn format_network_status(statuses: &[NetworkStatus]) -> Result<String, serde_json::Error> {
    serde_json::to_string(statuses)
}
