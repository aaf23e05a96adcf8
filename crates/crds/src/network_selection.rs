//! Network selection wire type
//!
//! One element of the JSON form of the `k8s.v1.cni.cncf.io/networks` pod
//! annotation. Field names follow the Network Plumbing WG annotation format, which
//! mixes camelCase and kebab-case keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;

/// One requested network attachment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkSelectionElement {
    /// Name of the NetworkAttachmentDefinition
    pub name: String,

    /// Namespace of the NetworkAttachmentDefinition (empty means the pod's namespace)
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,

    /// Static IP (or CIDR) requests
    #[serde(rename = "ips", default, skip_serializing_if = "Vec::is_empty")]
    pub ip_request: Vec<String>,

    /// Requested MAC address
    #[serde(rename = "mac", default, skip_serializing_if = "String::is_empty")]
    pub mac_request: String,

    /// Requested InfiniBand GUID
    #[serde(rename = "infiniband-guid", default, skip_serializing_if = "String::is_empty")]
    pub infiniband_guid_request: String,

    /// Requested interface name inside the pod
    #[serde(rename = "interface", default, skip_serializing_if = "String::is_empty")]
    pub interface_request: String,

    /// Older spelling of `interface`, honoured when `interface` is empty
    #[serde(rename = "interfaceRequest", default, skip_serializing_if = "String::is_empty")]
    pub deprecated_interface_request: String,

    /// Port mappings handed to plugins with the `portMappings` capability
    #[serde(rename = "portMappings", default, skip_serializing_if = "Vec::is_empty")]
    pub port_mappings_request: Vec<PortMapEntry>,

    /// Bandwidth limits handed to plugins with the `bandwidth` capability
    #[serde(rename = "bandwidth", default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_request: Option<BandwidthEntry>,

    /// Free-form arguments injected into each plugin's `args.cni`
    #[serde(rename = "cni-args", default, skip_serializing_if = "Option::is_none")]
    pub cni_args: Option<Map<String, Value>>,

    /// Gateways this attachment should own the default route through
    #[serde(rename = "default-route", default, skip_serializing_if = "Option::is_none")]
    pub gateway_request: Option<Vec<IpAddr>>,
}

impl NetworkSelectionElement {
    /// Shorthand for a bare `namespace/name@ifname` selection
    pub fn new(namespace: &str, name: &str, interface: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
            interface_request: interface.unwrap_or_default().to_string(),
            ..Default::default()
        }
    }
}

/// Port mapping request (`portMappings` capability).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortMapEntry {
    pub host_port: i32,
    pub container_port: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(rename = "hostIP", default, skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
}

/// Bandwidth limit request (`bandwidth` capability).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BandwidthEntry {
    #[serde(default)]
    pub ingress_rate: i64,
    #[serde(default)]
    pub ingress_burst: i64,
    #[serde(default)]
    pub egress_rate: i64,
    #[serde(default)]
    pub egress_burst: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_element() {
        let raw = r#"{
            "name": "macvlan-conf",
            "namespace": "testns",
            "ips": ["10.1.1.11/24"],
            "mac": "c2:b0:57:49:47:f1",
            "interface": "eth7",
            "portMappings": [{"hostPort": 8080, "containerPort": 80, "protocol": "tcp"}],
            "cni-args": {"foo": "bar"},
            "default-route": ["10.1.1.1"]
        }"#;
        let element: NetworkSelectionElement = serde_json::from_str(raw).unwrap();
        assert_eq!(element.name, "macvlan-conf");
        assert_eq!(element.interface_request, "eth7");
        assert_eq!(element.port_mappings_request[0].container_port, 80);
        assert_eq!(
            element.gateway_request,
            Some(vec!["10.1.1.1".parse::<IpAddr>().unwrap()])
        );
        assert_eq!(element.cni_args.unwrap()["foo"], "bar");
    }

    #[test]
    fn test_minimal_element_defaults() {
        let element: NetworkSelectionElement = serde_json::from_str(r#"{"name":"net1"}"#).unwrap();
        assert!(element.namespace.is_empty());
        assert!(element.gateway_request.is_none());
        assert_eq!(serde_json::to_string(&element).unwrap(), r#"{"name":"net1"}"#);
    }
}
