//! Kubernetes API client
//!
//! Thin wrapper over `kube::Client` scoped to the objects the delegate
//! engine touches.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crds::NetworkAttachmentDefinition;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use serde_json::json;
use std::path::Path;
use tracing::debug;

/// Kubernetes-backed cluster client
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Wrap an existing client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from a kubeconfig file, or infer in-cluster / default
    /// configuration when no path is given.
    pub async fn from_kubeconfig(path: Option<&Path>) -> Result<Self, ClusterError> {
        let config = match path {
            Some(path) => {
                debug!("Loading kubeconfig from {}", path.display());
                let kubeconfig = Kubeconfig::read_from(path)?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?
            }
            None => Config::infer().await?,
        };
        let client = Client::try_from(config)?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        debug!("Fetching pod {}/{}", namespace, name);
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await?
            .ok_or_else(|| ClusterError::NotFound(format!("pod {namespace}/{name}")))
    }

    async fn get_network_attachment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<NetworkAttachmentDefinition, ClusterError> {
        debug!("Fetching NetworkAttachmentDefinition {}/{}", namespace, name);
        let api: Api<NetworkAttachmentDefinition> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await?.ok_or_else(|| {
            ClusterError::NotFound(format!("network-attachment-definition {namespace}/{name}"))
        })
    }

    async fn set_pod_annotation(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: Option<&str>,
    ) -> Result<(), ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        if api.get_opt(name).await?.is_none() {
            return Err(ClusterError::NotFound(format!("pod {namespace}/{name}")));
        }

        // a null value removes the key under merge-patch semantics
        let patch = json!({
            "metadata": {
                "annotations": { key: value }
            }
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!("Updated annotation {} on pod {}/{}", key, namespace, name);
        Ok(())
    }
}
