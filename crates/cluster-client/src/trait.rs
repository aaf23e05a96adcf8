//! ClusterClient trait for mocking
//!
//! The concrete `KubeClusterClient` implements this trait, and tests use the
//! in-memory `MockClusterClient`.

use crate::error::ClusterError;
use crds::NetworkAttachmentDefinition;
use k8s_openapi::api::core::v1::Pod;

/// Kubernetes operations used by the delegate engine.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    /// Fetch a pod; `ClusterError::NotFound` when it does not exist
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError>;

    /// Fetch a NetworkAttachmentDefinition; `ClusterError::NotFound` when it does not exist
    async fn get_network_attachment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<NetworkAttachmentDefinition, ClusterError>;

    /// Set (or, with `None`, remove) one annotation on a pod
    async fn set_pod_annotation(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        value: Option<&str>,
    ) -> Result<(), ClusterError>;
}
