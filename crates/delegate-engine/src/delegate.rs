//! Delegate configurations
//!
//! A delegate is one CNI network the meta-plugin invokes on behalf of the
//! runtime: either a single plugin configuration or a plugin list. Both are
//! kept as JSON maps so keys this crate does not understand reach the plugin
//! untouched.

use crate::error::EngineError;
use crate::gateway::RoutePolicy;
use crds::{BandwidthEntry, NetworkSelectionElement, PortMapEntry};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::net::IpAddr;

/// One plugin configuration object.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginConf(Map<String, Value>);

impl PluginConf {
    /// Wrap a configuration map; `type` must be a non-empty string
    pub fn from_map(map: Map<String, Value>) -> Result<Self, EngineError> {
        match map.get("type") {
            Some(Value::String(t)) if !t.is_empty() => Ok(Self(map)),
            _ => Err(EngineError::Config(
                "plugin configuration has no \"type\"".to_string(),
            )),
        }
    }

    pub fn plugin_type(&self) -> &str {
        self.str_field("type").unwrap_or_default()
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    pub fn cni_version(&self) -> Option<&str> {
        self.str_field("cniVersion")
    }

    /// Capabilities the plugin declares as enabled
    pub fn capabilities(&self) -> impl Iterator<Item = &str> {
        self.0
            .get("capabilities")
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|caps| caps.iter())
            .filter(|(_, enabled)| enabled.as_bool() == Some(true))
            .map(|(cap, _)| cap.as_str())
    }

    pub fn device_id(&self) -> Option<&str> {
        self.str_field("deviceID")
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.0.insert(key.to_string(), value);
    }

    /// Merge `args` into the plugin's `args.cni` object
    pub fn merge_cni_args(&mut self, args: &Map<String, Value>) {
        let outer = self
            .0
            .entry("args")
            .or_insert_with(|| Value::Object(Map::new()));
        if !outer.is_object() {
            *outer = Value::Object(Map::new());
        }
        if let Some(outer) = outer.as_object_mut() {
            let cni = outer
                .entry("cni")
                .or_insert_with(|| Value::Object(Map::new()));
            if !cni.is_object() {
                *cni = Value::Object(Map::new());
            }
            if let Some(cni) = cni.as_object_mut() {
                for (k, v) in args {
                    cni.insert(k.clone(), v.clone());
                }
            }
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

/// A plugin list: list-level keys plus the ordered plugins.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginList {
    header: Map<String, Value>,
    plugins: Vec<PluginConf>,
}

impl PluginList {
    pub fn name(&self) -> Option<&str> {
        self.header.get("name").and_then(Value::as_str)
    }

    pub fn cni_version(&self) -> Option<&str> {
        self.header.get("cniVersion").and_then(Value::as_str)
    }

    /// `disableCheck: true` turns CHECK into a no-op for the whole list
    pub fn disable_check(&self) -> bool {
        self.header.get("disableCheck").and_then(Value::as_bool) == Some(true)
    }

    pub fn plugins(&self) -> &[PluginConf] {
        &self.plugins
    }
}

/// Configuration of one delegate network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum NetworkConfig {
    Single(PluginConf),
    List(PluginList),
}

impl NetworkConfig {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EngineError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| EngineError::Config(format!("delegate configuration is not JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Objects with a `plugins` key are plugin lists, anything else a single plugin
    pub fn from_value(value: Value) -> Result<Self, EngineError> {
        let Value::Object(mut map) = value else {
            return Err(EngineError::Config(
                "delegate configuration must be a JSON object".to_string(),
            ));
        };
        let Some(plugins) = map.remove("plugins") else {
            return PluginConf::from_map(map).map(NetworkConfig::Single);
        };
        let Value::Array(plugins) = plugins else {
            return Err(EngineError::Config(
                "\"plugins\" must be an array".to_string(),
            ));
        };
        if plugins.is_empty() {
            return Err(EngineError::Config(
                "plugin list has no plugins".to_string(),
            ));
        }
        let plugins = plugins
            .into_iter()
            .map(|p| match p {
                Value::Object(m) => PluginConf::from_map(m),
                _ => Err(EngineError::Config(
                    "plugin list entries must be objects".to_string(),
                )),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NetworkConfig::List(PluginList {
            header: map,
            plugins,
        }))
    }

    pub fn to_value(&self) -> Value {
        match self {
            NetworkConfig::Single(plugin) => Value::Object(plugin.0.clone()),
            NetworkConfig::List(list) => {
                let mut map = list.header.clone();
                map.insert(
                    "plugins".to_string(),
                    Value::Array(
                        list.plugins
                            .iter()
                            .map(|p| Value::Object(p.0.clone()))
                            .collect(),
                    ),
                );
                Value::Object(map)
            }
        }
    }

    /// Bytes handed to plugins
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.to_value())
    }

    pub fn is_plugin_list(&self) -> bool {
        matches!(self, NetworkConfig::List(_))
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            NetworkConfig::Single(plugin) => plugin.name(),
            NetworkConfig::List(list) => list.name(),
        }
    }

    pub fn cni_version(&self) -> Option<&str> {
        match self {
            NetworkConfig::Single(plugin) => plugin.cni_version(),
            NetworkConfig::List(list) => list.cni_version(),
        }
    }

    /// Plugin type, or the first plugin's type for a list
    pub fn plugin_type(&self) -> &str {
        match self {
            NetworkConfig::Single(plugin) => plugin.plugin_type(),
            NetworkConfig::List(list) => list
                .plugins
                .first()
                .map(PluginConf::plugin_type)
                .unwrap_or_default(),
        }
    }

    /// Device ID as the device plugin sees it: top level, or the first plugin of a list
    pub fn device_id(&self) -> Option<&str> {
        match self {
            NetworkConfig::Single(plugin) => plugin.device_id(),
            NetworkConfig::List(list) => list.plugins.first().and_then(PluginConf::device_id),
        }
    }

    pub fn set_device_id(&mut self, device_id: &str) {
        let target = match self {
            NetworkConfig::Single(plugin) => Some(plugin),
            NetworkConfig::List(list) => list.plugins.first_mut(),
        };
        if let Some(plugin) = target {
            plugin.set("deviceID", Value::String(device_id.to_string()));
        }
    }

    /// Merge `args` into `args.cni` of every plugin
    pub fn inject_cni_args(&mut self, args: &Map<String, Value>) {
        match self {
            NetworkConfig::Single(plugin) => plugin.merge_cni_args(args),
            NetworkConfig::List(list) => {
                for plugin in &mut list.plugins {
                    plugin.merge_cni_args(args);
                }
            }
        }
    }

    pub fn set_name_if_missing(&mut self, name: &str) {
        let map = match self {
            NetworkConfig::Single(plugin) => &mut plugin.0,
            NetworkConfig::List(list) => &mut list.header,
        };
        if map.get("name").and_then(Value::as_str).is_none_or(str::is_empty) {
            map.insert("name".to_string(), Value::String(name.to_string()));
        }
    }
}

impl TryFrom<Value> for NetworkConfig {
    type Error = EngineError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        NetworkConfig::from_value(value)
    }
}

impl From<NetworkConfig> for Value {
    fn from(conf: NetworkConfig) -> Self {
        conf.to_value()
    }
}

/// A delegate network plus the per-attachment requests made for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegateConfig {
    /// Network name reported in the network-status annotation
    pub name: String,

    pub conf: NetworkConfig,

    /// The delegate that owns the runtime's interface and result
    #[serde(default)]
    pub master_plugin: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ifname_request: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_request: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_request: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infiniband_guid_request: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub port_mappings_request: Vec<PortMapEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_request: Option<BandwidthEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_request: Option<Vec<IpAddr>>,

    /// Device assigned from the pod's device-plugin resources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,

    #[serde(default)]
    pub route_policy: RoutePolicy,
}

impl DelegateConfig {
    pub fn new(name: impl Into<String>, conf: NetworkConfig) -> Self {
        Self {
            name: name.into(),
            conf,
            master_plugin: false,
            ifname_request: None,
            mac_request: None,
            ip_request: Vec::new(),
            infiniband_guid_request: None,
            port_mappings_request: Vec::new(),
            bandwidth_request: None,
            gateway_request: None,
            device_id: None,
            resource_name: None,
            route_policy: RoutePolicy::default(),
        }
    }

    /// Parse raw configuration bytes, naming the delegate after the
    /// configuration or `fallback_name`
    pub fn from_bytes(bytes: &[u8], fallback_name: &str) -> Result<Self, EngineError> {
        let mut conf = NetworkConfig::from_slice(bytes)?;
        conf.set_name_if_missing(fallback_name);
        let name = conf.name().unwrap_or(fallback_name).to_string();
        Ok(Self::new(name, conf))
    }

    /// Configuration bytes handed to the plugin
    pub fn raw_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        self.conf.to_bytes()
    }

    pub fn plugin_type(&self) -> &str {
        self.conf.plugin_type()
    }

    pub fn is_plugin_list(&self) -> bool {
        self.conf.is_plugin_list()
    }

    /// Copy the overrides of a selection element onto the delegate
    ///
    /// Only values the selection actually sets are copied; empty fields leave
    /// the delegate's existing requests alone.
    pub fn apply_selection(&mut self, selection: &NetworkSelectionElement) {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());

        if let Some(ifname) = non_empty(&selection.interface_request)
            .or_else(|| non_empty(&selection.deprecated_interface_request))
        {
            self.ifname_request = Some(ifname);
        }
        if let Some(mac) = non_empty(&selection.mac_request) {
            self.mac_request = Some(mac);
        }
        if let Some(guid) = non_empty(&selection.infiniband_guid_request) {
            self.infiniband_guid_request = Some(guid);
        }
        if !selection.ip_request.is_empty() {
            self.ip_request = selection.ip_request.clone();
        }
        if !selection.port_mappings_request.is_empty() {
            self.port_mappings_request = selection.port_mappings_request.clone();
        }
        if let Some(bandwidth) = &selection.bandwidth_request {
            self.bandwidth_request = Some(bandwidth.clone());
        }
        if let Some(gateways) = &selection.gateway_request {
            self.gateway_request = Some(gateways.clone());
        }
        if let Some(args) = &selection.cni_args {
            self.conf.inject_cni_args(args);
        }
    }

    /// Record an assigned device and write it into the configuration
    pub fn assign_device(&mut self, device_id: &str) {
        self.device_id = Some(device_id.to_string());
        self.conf.set_device_id(device_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CONFLIST: &str = r#"{
        "cniVersion": "0.4.0",
        "name": "sriov-net",
        "plugins": [
            {"type": "sriov", "vlan": 100, "ipam": {"type": "host-local", "subnet": "10.56.217.0/24"}},
            {"type": "tuning", "capabilities": {"mac": true}},
            {"type": "portmap", "capabilities": {"portMappings": true, "bandwidth": false}}
        ]
    }"#;

    #[test]
    fn test_single_requires_type() {
        assert!(NetworkConfig::from_slice(br#"{"name":"x"}"#).is_err());
        assert!(NetworkConfig::from_slice(br#"{"name":"x","type":""}"#).is_err());
        assert!(NetworkConfig::from_slice(b"[1]").is_err());
        let conf = NetworkConfig::from_slice(br#"{"name":"x","type":"bridge"}"#).unwrap();
        assert!(!conf.is_plugin_list());
        assert_eq!(conf.plugin_type(), "bridge");
    }

    #[test]
    fn test_plugin_list_rejects_empty_and_untyped() {
        assert!(NetworkConfig::from_slice(br#"{"name":"x","plugins":[]}"#).is_err());
        assert!(NetworkConfig::from_slice(br#"{"name":"x","plugins":[{"mtu":1}]}"#).is_err());
        assert!(NetworkConfig::from_slice(br#"{"name":"x","plugins":{}}"#).is_err());
    }

    #[test]
    fn test_device_id_lands_on_first_plugin_of_list() {
        let mut conf = NetworkConfig::from_slice(CONFLIST.as_bytes()).unwrap();
        conf.set_device_id("0000:03:02.3");

        let value = conf.to_value();
        assert_eq!(value["cniVersion"], "0.4.0");
        assert_eq!(value["name"], "sriov-net");
        let plugins = value["plugins"].as_array().unwrap();
        let types: Vec<_> = plugins.iter().map(|p| p["type"].as_str().unwrap()).collect();
        assert_eq!(types, ["sriov", "tuning", "portmap"]);
        assert_eq!(plugins[0]["deviceID"], "0000:03:02.3");
        assert_eq!(plugins[0]["vlan"], 100);
        assert!(plugins[1].get("deviceID").is_none());
        assert_eq!(conf.device_id(), Some("0000:03:02.3"));
    }

    #[test]
    fn test_capabilities_only_enabled() {
        let NetworkConfig::List(list) = NetworkConfig::from_slice(CONFLIST.as_bytes()).unwrap()
        else {
            panic!("expected plugin list");
        };
        let caps: Vec<_> = list.plugins()[2].capabilities().collect();
        assert_eq!(caps, ["portMappings"]);
        assert_eq!(list.plugins()[0].capabilities().count(), 0);
    }

    #[test]
    fn test_cni_args_merge_into_every_plugin() {
        let mut conf = NetworkConfig::from_slice(CONFLIST.as_bytes()).unwrap();
        let args = json!({"foo": "bar"});
        conf.inject_cni_args(args.as_object().unwrap());
        let value = conf.to_value();
        for plugin in value["plugins"].as_array().unwrap() {
            assert_eq!(plugin["args"]["cni"]["foo"], "bar");
        }
    }

    #[test]
    fn test_serde_round_trip_keeps_unknown_keys() {
        let mut delegate = DelegateConfig::from_bytes(CONFLIST.as_bytes(), "fallback").unwrap();
        delegate.assign_device("0000:03:02.3");
        delegate.ifname_request = Some("net5".to_string());

        let encoded = serde_json::to_string(&delegate).unwrap();
        let decoded: DelegateConfig = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, delegate);
        assert_eq!(decoded.name, "sriov-net");
        assert_eq!(decoded.conf.to_value()["plugins"][0]["ipam"]["type"], "host-local");
    }

    #[test]
    fn test_name_injected_when_missing() {
        let delegate = DelegateConfig::from_bytes(br#"{"type":"macvlan"}"#, "macvlan-conf").unwrap();
        assert_eq!(delegate.name, "macvlan-conf");
        assert_eq!(delegate.conf.name(), Some("macvlan-conf"));
    }

    #[test]
    fn test_apply_selection_prefers_interface_over_deprecated() {
        let mut delegate = DelegateConfig::from_bytes(br#"{"type":"macvlan"}"#, "m").unwrap();
        let mut sel = NetworkSelectionElement::new("default", "m", None);
        sel.deprecated_interface_request = "old0".to_string();
        delegate.apply_selection(&sel);
        assert_eq!(delegate.ifname_request.as_deref(), Some("old0"));

        sel.interface_request = "new0".to_string();
        sel.mac_request = "c2:b0:57:49:47:f1".to_string();
        delegate.apply_selection(&sel);
        assert_eq!(delegate.ifname_request.as_deref(), Some("new0"));
        assert_eq!(delegate.mac_request.as_deref(), Some("c2:b0:57:49:47:f1"));
    }

    #[test]
    fn test_apply_selection_keeps_existing_requests_when_unset() {
        let mut delegate = DelegateConfig::from_bytes(br#"{"type":"macvlan"}"#, "m").unwrap();
        delegate.ifname_request = Some("net7".to_string());
        delegate.mac_request = Some("c2:b0:57:49:47:f1".to_string());
        delegate.ip_request = vec!["10.1.1.7/24".to_string()];
        delegate.gateway_request = Some(vec!["10.1.1.1".parse().unwrap()]);

        delegate.apply_selection(&NetworkSelectionElement::new("default", "m", None));
        assert_eq!(delegate.ifname_request.as_deref(), Some("net7"));
        assert_eq!(delegate.mac_request.as_deref(), Some("c2:b0:57:49:47:f1"));
        assert_eq!(delegate.ip_request, ["10.1.1.7/24"]);
        assert_eq!(delegate.gateway_request.as_ref().map(Vec::len), Some(1));
        assert!(delegate.bandwidth_request.is_none());

        let mut sel = NetworkSelectionElement::new("default", "m", None);
        sel.ip_request = vec!["10.1.1.8/24".to_string()];
        delegate.apply_selection(&sel);
        assert_eq!(delegate.ip_request, ["10.1.1.8/24"]);
        assert_eq!(delegate.ifname_request.as_deref(), Some("net7"));
    }
}
