//! Device resources assigned to a pod
//!
//! Networks backed by a device-plugin resource receive one device ID each
//! from the pod's allocation. Allocations come from the kubelet checkpoint
//! file; each resource keeps a cursor so consecutive networks on the same
//! resource get distinct devices.

use crate::error::ResourceError;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Kubelet's device-plugin checkpoint
pub const DEFAULT_CHECKPOINT_PATH: &str =
    "/var/lib/kubelet/device-plugins/kubelet_internal_checkpoint";

/// Devices of one resource allocated to a pod, plus the next free index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceInfo {
    pub device_ids: Vec<String>,
    pub index: usize,
}

impl ResourceInfo {
    pub fn new(device_ids: Vec<String>) -> Self {
        Self {
            device_ids,
            index: 0,
        }
    }

    /// Hand out the next unused device
    pub fn next_device(&mut self) -> Option<String> {
        let id = self.device_ids.get(self.index)?.clone();
        self.index += 1;
        Some(id)
    }
}

/// Per-invocation resource map
///
/// Starts out pending; the first network that needs a device triggers a
/// fetch from the provider, later networks reuse the fetched map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMap {
    entries: Option<HashMap<String, ResourceInfo>>,
}

impl ResourceMap {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: HashMap<String, ResourceInfo>) -> Self {
        Self {
            entries: Some(entries),
        }
    }

    pub fn is_fetched(&self) -> bool {
        self.entries.is_some()
    }

    pub fn get(&self, resource: &str) -> Option<&ResourceInfo> {
        self.entries.as_ref()?.get(resource)
    }

    /// Next device of `resource`, `None` when unknown or exhausted
    pub fn next_device(&mut self, resource: &str) -> Option<String> {
        self.entries.as_mut()?.get_mut(resource)?.next_device()
    }
}

/// Identity of the pod whose allocation is looked up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodIdentity {
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

/// Source of device allocations.
#[async_trait::async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Devices allocated to the pod, keyed by resource name
    async fn get_pod_resource_map(
        &self,
        pod: &PodIdentity,
    ) -> Result<HashMap<String, ResourceInfo>, ResourceError>;
}

/// Reads allocations from the kubelet checkpoint file.
#[derive(Debug)]
pub struct CheckpointResourceProvider {
    path: PathBuf,
    // serialises checkpoint reads across concurrent invocations
    lock: Mutex<()>,
}

#[derive(Debug, Deserialize)]
struct Checkpoint {
    #[serde(rename = "Data")]
    data: CheckpointData,
}

#[derive(Debug, Deserialize)]
struct CheckpointData {
    #[serde(rename = "PodDeviceEntries", default)]
    entries: Vec<PodDevicesEntry>,
}

#[derive(Debug, Deserialize)]
struct PodDevicesEntry {
    #[serde(rename = "PodUID")]
    pod_uid: String,
    #[serde(rename = "ResourceName")]
    resource_name: String,
    #[serde(rename = "DeviceIDs")]
    device_ids: DeviceIds,
}

/// Older kubelets write a flat list, newer ones group devices by NUMA node
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DeviceIds {
    Flat(Vec<String>),
    ByNuma(BTreeMap<String, Vec<String>>),
}

impl DeviceIds {
    fn into_vec(self) -> Vec<String> {
        match self {
            DeviceIds::Flat(ids) => ids,
            DeviceIds::ByNuma(nodes) => nodes.into_values().flatten().collect(),
        }
    }
}

impl CheckpointResourceProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for CheckpointResourceProvider {
    fn default() -> Self {
        Self::new(DEFAULT_CHECKPOINT_PATH)
    }
}

#[async_trait::async_trait]
impl ResourceProvider for CheckpointResourceProvider {
    async fn get_pod_resource_map(
        &self,
        pod: &PodIdentity,
    ) -> Result<HashMap<String, ResourceInfo>, ResourceError> {
        if pod.uid.is_empty() {
            return Err(ResourceError::MissingUid(format!(
                "{}/{}",
                pod.namespace, pod.name
            )));
        }

        let raw = {
            let _guard = self.lock.lock().await;
            tokio::fs::read(&self.path)
                .await
                .map_err(|source| ResourceError::Read {
                    path: self.path.clone(),
                    source,
                })?
        };
        let checkpoint: Checkpoint =
            serde_json::from_slice(&raw).map_err(|source| ResourceError::Decode {
                path: self.path.clone(),
                source,
            })?;

        let mut resources: HashMap<String, ResourceInfo> = HashMap::new();
        for entry in checkpoint.data.entries {
            if entry.pod_uid != pod.uid {
                continue;
            }
            resources
                .entry(entry.resource_name)
                .or_default()
                .device_ids
                .extend(entry.device_ids.into_vec());
        }
        debug!(
            "Pod {}/{} has {} device resource(s) in {}",
            pod.namespace,
            pod.name,
            resources.len(),
            self.path.display()
        );
        Ok(resources)
    }
}

/// Fixed allocations, for nodes without device plugins and for tests.
#[derive(Debug, Clone, Default)]
pub struct StaticResourceProvider {
    resources: HashMap<String, Vec<String>>,
}

impl StaticResourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource(mut self, resource: &str, device_ids: &[&str]) -> Self {
        self.resources.insert(
            resource.to_string(),
            device_ids.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

#[async_trait::async_trait]
impl ResourceProvider for StaticResourceProvider {
    async fn get_pod_resource_map(
        &self,
        _pod: &PodIdentity,
    ) -> Result<HashMap<String, ResourceInfo>, ResourceError> {
        Ok(self
            .resources
            .iter()
            .map(|(name, ids)| (name.clone(), ResourceInfo::new(ids.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHECKPOINT: &str = r#"{
        "Data": {
            "PodDeviceEntries": [
                {"PodUID": "uid-1", "ContainerName": "app", "ResourceName": "intel.com/sriov", "DeviceIDs": {"0": ["0000:03:02.3"], "1": ["0000:03:02.4"]}},
                {"PodUID": "uid-1", "ContainerName": "sidecar", "ResourceName": "intel.com/sriov", "DeviceIDs": ["0000:03:02.5"]},
                {"PodUID": "uid-2", "ContainerName": "app", "ResourceName": "intel.com/sriov", "DeviceIDs": ["0000:03:02.6"]}
            ],
            "RegisteredDevices": {}
        },
        "Checksum": 1234
    }"#;

    fn pod(uid: &str) -> PodIdentity {
        PodIdentity {
            namespace: "default".to_string(),
            name: "web".to_string(),
            uid: uid.to_string(),
        }
    }

    #[test]
    fn test_cursor_hands_out_distinct_devices() {
        let mut map = ResourceMap::from_entries(HashMap::from([(
            "intel.com/sriov".to_string(),
            ResourceInfo::new(vec!["a".to_string(), "b".to_string()]),
        )]));
        assert_eq!(map.next_device("intel.com/sriov").as_deref(), Some("a"));
        assert_eq!(map.next_device("intel.com/sriov").as_deref(), Some("b"));
        assert_eq!(map.next_device("intel.com/sriov"), None);
        assert_eq!(map.next_device("other"), None);
        assert_eq!(map.get("intel.com/sriov").unwrap().index, 2);
    }

    #[test]
    fn test_pending_map_has_no_devices() {
        let mut map = ResourceMap::pending();
        assert!(!map.is_fetched());
        assert_eq!(map.next_device("intel.com/sriov"), None);
    }

    #[tokio::test]
    async fn test_checkpoint_merges_entries_for_pod() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kubelet_internal_checkpoint");
        std::fs::write(&path, CHECKPOINT).unwrap();
        let provider = CheckpointResourceProvider::new(&path);

        let map = provider.get_pod_resource_map(&pod("uid-1")).await.unwrap();
        assert_eq!(
            map["intel.com/sriov"].device_ids,
            ["0000:03:02.3", "0000:03:02.4", "0000:03:02.5"]
        );

        let map = provider.get_pod_resource_map(&pod("uid-3")).await.unwrap();
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_checkpoint_errors() {
        let dir = tempfile::tempdir().unwrap();
        let provider = CheckpointResourceProvider::new(dir.path().join("missing"));
        assert!(matches!(
            provider.get_pod_resource_map(&pod("uid-1")).await,
            Err(ResourceError::Read { .. })
        ));
        assert!(matches!(
            provider.get_pod_resource_map(&pod("")).await,
            Err(ResourceError::MissingUid(_))
        ));
    }
}
