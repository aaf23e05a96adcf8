//! Delegate loader
//!
//! Turns a network reference into a delegate configuration. Sources are
//! tried in a fixed order:
//!
//! 1. the NetworkAttachmentDefinition `namespace/name` in the registry
//! 2. a file in the configuration directory whose network name matches
//! 3. the reference as a directory: its first configuration file
//! 4. the reference as an absolute path to a configuration file
//!
//! The first source that yields a configuration wins.

use crate::confdir::{self, ConfigFile};
use crate::delegate::DelegateConfig;
use crate::error::EngineError;
use crate::resources::{PodIdentity, ResourceMap, ResourceProvider};
use cluster_client::ClusterClientTrait;
use crds::{NetworkReference, NetworkSelectionElement};
use std::path::Path;
use tracing::{debug, info};

/// Where a delegate configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// NetworkAttachmentDefinition with an inline config
    Registry,
    /// NetworkAttachmentDefinition with an empty config, resolved by name
    RegistryByName,
    NamedFile,
    Directory,
    File,
}

/// Raw configuration plus what the registry said about it
#[derive(Debug, Clone)]
struct LoadedConfig {
    source: ConfigSource,
    bytes: Vec<u8>,
    resource_name: Option<String>,
}

/// Delegate loader for one invocation.
pub struct DelegateLoader<'a> {
    cluster: Option<&'a dyn ClusterClientTrait>,
    resources: &'a dyn ResourceProvider,
    conf_dir: &'a Path,
    /// Plugin type of the meta-plugin itself, never loaded as a delegate
    self_type: &'a str,
}

impl<'a> DelegateLoader<'a> {
    pub fn new(
        cluster: Option<&'a dyn ClusterClientTrait>,
        resources: &'a dyn ResourceProvider,
        conf_dir: &'a Path,
        self_type: &'a str,
    ) -> Self {
        Self {
            cluster,
            resources,
            conf_dir,
            self_type,
        }
    }

    /// Load the delegate for a selection element
    ///
    /// The resource map is threaded through: it is fetched on first need and
    /// its cursors advance for every device handed out.
    pub async fn load(
        &self,
        selection: &NetworkSelectionElement,
        pod: &PodIdentity,
        mut resources: ResourceMap,
    ) -> Result<(DelegateConfig, ResourceMap), EngineError> {
        let reference = NetworkReference::new(&selection.namespace, &selection.name);
        let loaded = self.resolve(&reference).await?;
        let mut delegate = DelegateConfig::from_bytes(&loaded.bytes, &selection.name)?;
        // status reports the name the pod asked for; paths keep the config's name
        if is_object_name(&selection.name) {
            delegate.name = selection.name.clone();
        }
        delegate.resource_name = loaded.resource_name;

        if let Some(resource) = delegate.resource_name.clone() {
            if !resources.is_fetched() {
                resources = ResourceMap::from_entries(self.resources.get_pod_resource_map(pod).await?);
            }
            match resources.next_device(&resource) {
                Some(device_id) => {
                    debug!("Network {} gets device {} of {}", reference, device_id, resource);
                    delegate.assign_device(&device_id);
                }
                None => debug!("No device of {} left for network {}", resource, reference),
            }
        }

        delegate.apply_selection(selection);
        info!(
            "Loaded network {} (type {}) from {:?}",
            reference,
            delegate.plugin_type(),
            loaded.source
        );
        Ok((delegate, resources))
    }

    /// Load a network named in the meta-plugin configuration (cluster or
    /// default network), looked up in `namespace` unless it carries its own
    pub async fn load_reference(
        &self,
        raw: &str,
        namespace: &str,
        pod: &PodIdentity,
        resources: ResourceMap,
    ) -> Result<(DelegateConfig, ResourceMap), EngineError> {
        let selection = match raw.split_once('/') {
            // absolute paths are files or directories, not namespaced names
            Some((ns, name)) if !raw.starts_with('/') => NetworkSelectionElement::new(ns, name, None),
            _ => NetworkSelectionElement::new(namespace, raw, None),
        };
        self.load(&selection, pod, resources).await
    }

    async fn resolve(&self, reference: &NetworkReference) -> Result<LoadedConfig, EngineError> {
        if let Some(cluster) = self.cluster {
            if is_object_name(&reference.name) {
                match cluster
                    .get_network_attachment(&reference.namespace, &reference.name)
                    .await
                {
                    Ok(nad) => {
                        let resource_name = nad.resource_name().map(String::from);
                        if let Some(bytes) = nad.config_bytes() {
                            return Ok(LoadedConfig {
                                source: ConfigSource::Registry,
                                bytes: bytes.to_vec(),
                                resource_name,
                            });
                        }
                        let file = confdir::find_by_network_name(
                            self.conf_dir,
                            &reference.name,
                            self.self_type,
                        )
                        .await?
                        .ok_or_else(|| EngineError::NotFound {
                            reference: reference.to_string(),
                            reason: format!(
                                "attachment has no config and no file in {} names the network",
                                self.conf_dir.display()
                            ),
                        })?;
                        return Ok(loaded(ConfigSource::RegistryByName, file, resource_name));
                    }
                    Err(e) if e.is_not_found() => {
                        debug!("No attachment {}, trying configuration files", reference);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        if let Some(file) =
            confdir::find_by_network_name(self.conf_dir, &reference.name, self.self_type).await?
        {
            return Ok(loaded(ConfigSource::NamedFile, file, None));
        }

        let path = Path::new(&reference.name);
        if path.is_dir() {
            if let Some(file) = confdir::first_config(path, self.self_type).await? {
                return Ok(loaded(ConfigSource::Directory, file, None));
            }
        } else if path.is_absolute() && path.is_file() && confdir::is_config_file(path) {
            let file = confdir::read_config_file(path).await?;
            return Ok(loaded(ConfigSource::File, file, None));
        }

        Err(EngineError::NotFound {
            reference: reference.to_string(),
            reason: "no attachment, configuration file or directory matches".to_string(),
        })
    }
}

fn loaded(source: ConfigSource, file: ConfigFile, resource_name: Option<String>) -> LoadedConfig {
    LoadedConfig {
        source,
        bytes: file.bytes,
        resource_name,
    }
}

/// Paths never name registry objects
fn is_object_name(name: &str) -> bool {
    !name.contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::StaticResourceProvider;
    use cluster_client::MockClusterClient;

    fn pod() -> PodIdentity {
        PodIdentity {
            namespace: "default".to_string(),
            name: "web".to_string(),
            uid: "uid-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_registry_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("10-net1.conf"), r#"{"name":"net1","type":"bridge"}"#).unwrap();
        let cluster = MockClusterClient::new();
        cluster.add_network_attachment("default", "net1", r#"{"cniVersion":"0.3.1","type":"macvlan"}"#, None);
        let provider = StaticResourceProvider::new();
        let loader = DelegateLoader::new(Some(&cluster), &provider, dir.path(), "multinet");

        let sel = NetworkSelectionElement::new("default", "net1", Some("eth7"));
        let (delegate, _) = loader.load(&sel, &pod(), ResourceMap::pending()).await.unwrap();
        assert_eq!(delegate.plugin_type(), "macvlan");
        assert_eq!(delegate.name, "net1");
        assert_eq!(delegate.conf.name(), Some("net1"));
        assert_eq!(delegate.ifname_request.as_deref(), Some("eth7"));
        assert!(!delegate.master_plugin);
    }

    #[tokio::test]
    async fn test_empty_attachment_config_resolves_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("10-net1.conf"), r#"{"name":"net1","type":"bridge"}"#).unwrap();
        let cluster = MockClusterClient::new();
        cluster.add_network_attachment("default", "net1", "", None);
        let provider = StaticResourceProvider::new();
        let loader = DelegateLoader::new(Some(&cluster), &provider, dir.path(), "multinet");

        let sel = NetworkSelectionElement::new("default", "net1", None);
        let (delegate, _) = loader.load(&sel, &pod(), ResourceMap::pending()).await.unwrap();
        assert_eq!(delegate.plugin_type(), "bridge");

        let sel = NetworkSelectionElement::new("default", "net2", None);
        cluster.add_network_attachment("default", "net2", "  ", None);
        let err = loader.load(&sel, &pod(), ResourceMap::pending()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_attachment_falls_back_to_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("10-flannel.conflist"), r#"{"name":"flannel","plugins":[{"type":"flannel"}]}"#).unwrap();
        let cluster = MockClusterClient::new();
        let provider = StaticResourceProvider::new();
        let loader = DelegateLoader::new(Some(&cluster), &provider, dir.path(), "multinet");

        let (delegate, _) = loader
            .load_reference("flannel", "kube-system", &pod(), ResourceMap::pending())
            .await
            .unwrap();
        assert!(delegate.is_plugin_list());
        assert_eq!(cluster.attachment_lookups(), 1);
    }

    #[tokio::test]
    async fn test_directory_and_absolute_file_references() {
        let confs = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("05-calico.conflist"), r#"{"name":"k8s-pod-network","plugins":[{"type":"calico"}]}"#).unwrap();
        let provider = StaticResourceProvider::new();
        let loader = DelegateLoader::new(None, &provider, confs.path(), "multinet");

        let reference = dir.path().to_str().unwrap();
        let (delegate, _) = loader
            .load_reference(reference, "kube-system", &pod(), ResourceMap::pending())
            .await
            .unwrap();
        assert_eq!(delegate.plugin_type(), "calico");

        let file = dir.path().join("05-calico.conflist");
        let (delegate, _) = loader
            .load_reference(file.to_str().unwrap(), "kube-system", &pod(), ResourceMap::pending())
            .await
            .unwrap();
        assert_eq!(delegate.conf.name(), Some("k8s-pod-network"));
    }

    #[tokio::test]
    async fn test_not_found_anywhere() {
        let confs = tempfile::tempdir().unwrap();
        let cluster = MockClusterClient::new();
        let provider = StaticResourceProvider::new();
        let loader = DelegateLoader::new(Some(&cluster), &provider, confs.path(), "multinet");
        let sel = NetworkSelectionElement::new("default", "ghost", None);
        let err = loader.load(&sel, &pod(), ResourceMap::pending()).await.unwrap_err();
        match err {
            EngineError::NotFound { reference, .. } => assert_eq!(reference, "default/ghost"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_device_ids_advance_per_network() {
        let confs = tempfile::tempdir().unwrap();
        let cluster = MockClusterClient::new();
        let sriov = r#"{"cniVersion":"0.4.0","name":"sriov","plugins":[{"type":"sriov"},{"type":"tuning"}]}"#;
        cluster.add_network_attachment("default", "sriov-a", sriov, Some("intel.com/sriov"));
        cluster.add_network_attachment("default", "sriov-b", sriov, Some("intel.com/sriov"));
        let provider = StaticResourceProvider::new().with_resource("intel.com/sriov", &["0000:03:02.3", "0000:03:02.4"]);
        let loader = DelegateLoader::new(Some(&cluster), &provider, confs.path(), "multinet");

        let (first, resources) = loader
            .load(&NetworkSelectionElement::new("default", "sriov-a", None), &pod(), ResourceMap::pending())
            .await
            .unwrap();
        let (second, resources) = loader
            .load(&NetworkSelectionElement::new("default", "sriov-b", None), &pod(), resources)
            .await
            .unwrap();
        assert_eq!(first.device_id.as_deref(), Some("0000:03:02.3"));
        assert_eq!(second.device_id.as_deref(), Some("0000:03:02.4"));
        assert_eq!(second.conf.to_value()["plugins"][0]["deviceID"], "0000:03:02.4");
        assert_eq!(resources.get("intel.com/sriov").unwrap().index, 2);
    }

    #[tokio::test]
    async fn test_exhausted_resource_leaves_later_network_without_device() {
        let confs = tempfile::tempdir().unwrap();
        let cluster = MockClusterClient::new();
        cluster.add_network_attachment("default", "net1", r#"{"cniVersion":"0.3.1","type":"mynet"}"#, Some("foo"));
        cluster.add_network_attachment("default", "net2", r#"{"cniVersion":"0.3.1","type":"mynet2"}"#, Some("foo"));
        let provider = StaticResourceProvider::new().with_resource("foo", &["dev0"]);
        let loader = DelegateLoader::new(Some(&cluster), &provider, confs.path(), "multinet");

        let (first, resources) = loader
            .load(&NetworkSelectionElement::new("default", "net1", None), &pod(), ResourceMap::pending())
            .await
            .unwrap();
        assert_eq!(first.device_id.as_deref(), Some("dev0"));
        assert_eq!(resources.get("foo").unwrap().index, 1);

        let (second, resources) = loader
            .load(&NetworkSelectionElement::new("default", "net2", None), &pod(), resources)
            .await
            .unwrap();
        assert_eq!(second.device_id, None);
        assert!(second.conf.device_id().is_none());
        assert_eq!(resources.get("foo").unwrap().index, 1);
    }
}
