//! NetworkAttachmentDefinition CRD
//!
//! A named, namespaced CNI configuration that pods reference through the
//! `k8s.v1.cni.cncf.io/networks` annotation.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::annotations::RESOURCE_NAME_ANNOTATION;

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "k8s.cni.cncf.io",
    version = "v1",
    kind = "NetworkAttachmentDefinition",
    plural = "network-attachment-definitions",
    shortname = "net-attach-def",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkAttachmentDefinitionSpec {
    /// CNI configuration (single plugin or plugin list) as a JSON string.
    ///
    /// Empty means "look the network up by name in the CNI config directory".
    #[serde(default)]
    pub config: String,
}

impl NetworkAttachmentDefinition {
    /// Device-plugin resource backing this network, if any.
    pub fn resource_name(&self) -> Option<&str> {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(RESOURCE_NAME_ANNOTATION))
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Raw CNI config bytes, `None` when the spec carries no config.
    pub fn config_bytes(&self) -> Option<&[u8]> {
        let config = self.spec.config.trim();
        (!config.is_empty()).then_some(config.as_bytes())
    }
}
