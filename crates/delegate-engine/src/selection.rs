//! Network selection resolver
//!
//! Parses the `k8s.v1.cni.cncf.io/networks` pod annotation. Two forms are
//! accepted: a JSON list of selection elements, or a comma-separated list of
//! `[namespace/]name[@ifname]` entries.

use crate::error::EngineError;
use crds::{NETWORKS_ANNOTATION, NetworkSelectionElement};
use ipnetwork::IpNetwork;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::str::FromStr;

/// Longest interface name the kernel accepts
const MAX_IFNAME_LEN: usize = 15;

/// The pod's network selection annotation, if set and not blank
pub fn networks_annotation(annotations: Option<&BTreeMap<String, String>>) -> Option<&str> {
    annotations?
        .get(NETWORKS_ANNOTATION)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Resolve a network selection annotation into ordered selection elements
///
/// Elements without a namespace get `default_namespace`. Order of the
/// annotation is preserved.
pub fn resolve(
    raw: &str,
    default_namespace: &str,
) -> Result<Vec<NetworkSelectionElement>, EngineError> {
    let raw = raw.trim();
    let mut elements = if is_json_form(raw) {
        serde_json::from_str::<Vec<NetworkSelectionElement>>(raw).map_err(|e| {
            EngineError::Parse(format!("failed to parse network selection JSON: {e}"))
        })?
    } else {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(parse_shorthand)
            .collect::<Result<Vec<_>, _>>()?
    };

    for element in &mut elements {
        if element.namespace.is_empty() {
            element.namespace = default_namespace.to_string();
        }
        validate(element)?;
    }
    Ok(elements)
}

fn is_json_form(raw: &str) -> bool {
    raw.contains(['[', '{', '"'])
}

/// `[namespace/]name[@ifname]`
fn parse_shorthand(item: &str) -> Result<NetworkSelectionElement, EngineError> {
    let (namespace, rest) = match item.split_once('/') {
        Some((ns, rest)) => {
            if rest.contains('/') {
                return Err(EngineError::Parse(format!(
                    "invalid network reference {item:?}: more than one '/'"
                )));
            }
            (ns, rest)
        }
        None => ("", item),
    };
    let (name, interface) = match rest.split_once('@') {
        Some((name, ifname)) => {
            if ifname.contains('@') {
                return Err(EngineError::Parse(format!(
                    "invalid network reference {item:?}: more than one '@'"
                )));
            }
            (name, Some(ifname))
        }
        None => (rest, None),
    };
    if interface == Some("") {
        return Err(EngineError::Parse(format!(
            "invalid network reference {item:?}: empty interface name"
        )));
    }
    Ok(NetworkSelectionElement::new(namespace, name, interface))
}

fn validate(element: &NetworkSelectionElement) -> Result<(), EngineError> {
    if element.name.is_empty() {
        return Err(EngineError::Parse(
            "network selection element has an empty name".to_string(),
        ));
    }
    for (what, value) in [("name", &element.name), ("namespace", &element.namespace)] {
        if !is_dns1123_label(value) {
            return Err(EngineError::Parse(format!(
                "network {what} {value:?} must consist of lower case alphanumeric characters or '-', and start and end with an alphanumeric character"
            )));
        }
    }

    for ifname in [
        &element.interface_request,
        &element.deprecated_interface_request,
    ] {
        if !ifname.is_empty() {
            validate_interface_name(ifname)?;
        }
    }

    if !element.mac_request.is_empty() {
        macaddr::MacAddr::from_str(&element.mac_request).map_err(|e| {
            EngineError::Parse(format!("invalid MAC address {:?}: {e}", element.mac_request))
        })?;
    }
    if !element.infiniband_guid_request.is_empty() {
        macaddr::MacAddr8::from_str(&element.infiniband_guid_request).map_err(|e| {
            EngineError::Parse(format!(
                "invalid InfiniBand GUID {:?}: {e}",
                element.infiniband_guid_request
            ))
        })?;
    }
    for ip in &element.ip_request {
        validate_ip_request(ip)?;
    }
    Ok(())
}

fn is_dns1123_label(s: &str) -> bool {
    let alnum = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    let bytes = s.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(&first), Some(&last)) => {
            alnum(first) && alnum(last) && bytes.iter().all(|&b| alnum(b) || b == b'-')
        }
        _ => false,
    }
}

/// Interface names are at most 15 bytes with no `/` or whitespace
pub fn validate_interface_name(ifname: &str) -> Result<(), EngineError> {
    if ifname.is_empty() || ifname.len() > MAX_IFNAME_LEN {
        return Err(EngineError::Parse(format!(
            "interface name {ifname:?} must be 1 to {MAX_IFNAME_LEN} characters"
        )));
    }
    if ifname == "." || ifname == ".." {
        return Err(EngineError::Parse(format!(
            "interface name {ifname:?} is reserved"
        )));
    }
    if ifname.contains(|c: char| c == '/' || c == ':' || c.is_whitespace()) {
        return Err(EngineError::Parse(format!(
            "interface name {ifname:?} contains an invalid character"
        )));
    }
    Ok(())
}

/// An address, or an address with prefix length
fn validate_ip_request(ip: &str) -> Result<(), EngineError> {
    let valid = if ip.contains('/') {
        IpNetwork::from_str(ip).is_ok()
    } else {
        IpAddr::from_str(ip).is_ok()
    };
    if valid {
        Ok(())
    } else {
        Err(EngineError::Parse(format!(
            "invalid IP address request {ip:?}"
        )))
    }
}
