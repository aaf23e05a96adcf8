//! Network status reporting
//!
//! Builds the `k8s.v1.cni.cncf.io/network-status` entries from delegate
//! results.

use crate::delegate::DelegateConfig;
use cni_client::CniResult;
use crds::{DnsStatus, NetworkStatus};
use serde_json::json;

/// Status entry for one attached delegate
///
/// Addresses and MAC are taken from the result's sandbox interface (or,
/// without one, from every address in the result). `is_default` marks the
/// delegate that owns the pod's default route; its gateways are listed.
pub fn network_status(
    delegate: &DelegateConfig,
    ifname: &str,
    result: &CniResult,
    is_default: bool,
) -> NetworkStatus {
    let sandbox = result.sandbox_interface();
    let sandbox_index = sandbox.map(|(i, _)| i);
    let on_sandbox = |iface: Option<usize>| match (sandbox_index, iface) {
        (Some(s), Some(i)) => s == i,
        _ => true,
    };

    let ips = result
        .ips
        .iter()
        .filter(|ip| on_sandbox(ip.interface))
        .map(|ip| ip.address.ip().to_string())
        .collect();

    let gateway = if is_default {
        let mut gateways: Vec<String> = result
            .ips
            .iter()
            .filter(|ip| on_sandbox(ip.interface))
            .filter_map(|ip| ip.gateway)
            .chain(result.default_routes().filter_map(|r| r.gw))
            .map(|gw| gw.to_string())
            .collect();
        let mut seen = std::collections::HashSet::new();
        gateways.retain(|gw| seen.insert(gw.clone()));
        gateways
    } else {
        Vec::new()
    };

    let device_info = delegate.device_id.as_ref().map(|id| {
        json!({
            "type": "pci",
            "version": "1.1.0",
            "pci": {"pci-address": id},
        })
    });

    NetworkStatus {
        name: delegate.name.clone(),
        interface: sandbox
            .map(|(_, iface)| iface.name.clone())
            .unwrap_or_else(|| ifname.to_string()),
        ips,
        mac: sandbox.map(|(_, iface)| iface.mac.clone()).unwrap_or_default(),
        mtu: sandbox.and_then(|(_, iface)| iface.mtu),
        default: is_default,
        dns: DnsStatus {
            nameservers: result.dns.nameservers.clone(),
            domain: result.dns.domain.clone(),
            search: result.dns.search.clone(),
            options: result.dns.options.clone(),
        },
        device_info,
        gateway,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::NetworkConfig;

    const RESULT: &str = r#"{
        "cniVersion": "1.0.0",
        "interfaces": [
            {"name": "cni0", "mac": "00:11:22:33:44:55"},
            {"name": "net1", "mac": "0a:58:0a:01:01:0b", "mtu": 1400, "sandbox": "/var/run/netns/c1"}
        ],
        "ips": [
            {"interface": 1, "address": "10.1.1.11/24", "gateway": "10.1.1.1"},
            {"interface": 0, "address": "10.1.1.1/24"}
        ],
        "routes": [{"dst": "0.0.0.0/0", "gw": "10.1.1.1"}],
        "dns": {"nameservers": ["10.96.0.10"]}
    }"#;

    fn delegate() -> DelegateConfig {
        let conf = NetworkConfig::from_slice(br#"{"type":"macvlan"}"#).unwrap();
        DelegateConfig::new("macvlan-conf", conf)
    }

    #[test]
    fn test_status_from_sandbox_interface() {
        let result = CniResult::from_slice(RESULT.as_bytes()).unwrap();
        let status = network_status(&delegate(), "net1", &result, false);
        assert_eq!(status.name, "macvlan-conf");
        assert_eq!(status.interface, "net1");
        assert_eq!(status.ips, ["10.1.1.11"]);
        assert_eq!(status.mac, "0a:58:0a:01:01:0b");
        assert_eq!(status.mtu, Some(1400));
        assert!(!status.default);
        assert!(status.gateway.is_empty());
        assert_eq!(status.dns.nameservers, ["10.96.0.10"]);
        assert!(status.device_info.is_none());
    }

    #[test]
    fn test_default_status_lists_gateways_once() {
        let result = CniResult::from_slice(RESULT.as_bytes()).unwrap();
        let status = network_status(&delegate(), "net1", &result, true);
        assert!(status.default);
        assert_eq!(status.gateway, ["10.1.1.1"]);
    }

    #[test]
    fn test_without_sandbox_interface() {
        let result = CniResult::from_slice(
            br#"{"cniVersion":"0.3.1","ips":[{"version":"4","address":"192.168.5.9/24"}]}"#,
        )
        .unwrap();
        let mut d = delegate();
        d.device_id = Some("0000:03:02.3".to_string());
        let status = network_status(&d, "net2", &result, false);
        assert_eq!(status.interface, "net2");
        assert_eq!(status.ips, ["192.168.5.9"]);
        assert_eq!(status.device_info.unwrap()["pci"]["pci-address"], "0000:03:02.3");
    }
}
