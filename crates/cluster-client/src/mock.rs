//! Mock ClusterClient for unit testing
//!
//! Stores pods and NetworkAttachmentDefinitions in memory and applies
//! annotation updates to the stored pods.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crds::{NetworkAttachmentDefinition, NetworkAttachmentDefinitionSpec};
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Key = (String, String);

/// Mock cluster client for testing
#[derive(Clone, Default)]
pub struct MockClusterClient {
    pods: Arc<Mutex<HashMap<Key, Pod>>>,
    attachments: Arc<Mutex<HashMap<Key, NetworkAttachmentDefinition>>>,
    // Counter of NetworkAttachmentDefinition lookups, found or not
    attachment_lookups: Arc<Mutex<usize>>,
    fail_annotation_updates: Arc<Mutex<bool>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

impl MockClusterClient {
    /// Create a new, empty mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pod with the given UID and annotations (for test setup)
    pub fn add_pod(&self, namespace: &str, name: &str, uid: &str, annotations: &[(&str, &str)]) {
        let annotations: BTreeMap<String, String> = annotations
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                uid: Some(uid.to_string()),
                annotations: Some(annotations),
                ..Default::default()
            },
            ..Default::default()
        };
        lock(&self.pods).insert(key(namespace, name), pod);
    }

    /// Add a NetworkAttachmentDefinition (for test setup)
    pub fn add_network_attachment(
        &self,
        namespace: &str,
        name: &str,
        config: &str,
        resource_name: Option<&str>,
    ) {
        let annotations = resource_name.map(|r| {
            BTreeMap::from([(crds::RESOURCE_NAME_ANNOTATION.to_string(), r.to_string())])
        });
        let nad = NetworkAttachmentDefinition {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                annotations,
                ..Default::default()
            },
            spec: NetworkAttachmentDefinitionSpec {
                config: config.to_string(),
            },
        };
        lock(&self.attachments).insert(key(namespace, name), nad);
    }

    /// Make every annotation update fail (for test setup)
    pub fn fail_annotation_updates(&self) {
        *lock(&self.fail_annotation_updates) = true;
    }

    /// Current value of a pod annotation
    pub fn pod_annotation(&self, namespace: &str, name: &str, annotation: &str) -> Option<String> {
        lock(&self.pods)
            .get(&key(namespace, name))
            .and_then(|p| p.metadata.annotations.as_ref())
            .and_then(|a| a.get(annotation).cloned())
    }

    /// Number of NetworkAttachmentDefinition lookups so far
    pub fn attachment_lookups(&self) -> usize {
        *lock(&self.attachment_lookups)
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod, ClusterError> {
        lock(&self.pods)
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("pod {namespace}/{name}")))
    }

    async fn get_network_attachment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<NetworkAttachmentDefinition, ClusterError> {
        *lock(&self.attachment_lookups) += 1;
        lock(&self.attachments)
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| {
                ClusterError::NotFound(format!("network-attachment-definition {namespace}/{name}"))
            })
    }

    async fn set_pod_annotation(
        &self,
        namespace: &str,
        name: &str,
        annotation: &str,
        value: Option<&str>,
    ) -> Result<(), ClusterError> {
        if *lock(&self.fail_annotation_updates) {
            return Err(ClusterError::NotFound(format!(
                "pod {namespace}/{name} rejected annotation update"
            )));
        }
        let mut pods = lock(&self.pods);
        let pod = pods
            .get_mut(&key(namespace, name))
            .ok_or_else(|| ClusterError::NotFound(format!("pod {namespace}/{name}")))?;
        let annotations = pod.metadata.annotations.get_or_insert_with(BTreeMap::new);
        match value {
            Some(v) => annotations.insert(annotation.to_string(), v.to_string()),
            None => annotations.remove(annotation),
        };
        Ok(())
    }
}
