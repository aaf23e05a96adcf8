//! Per-container delegate cache
//!
//! After a successful ADD the chain (delegates, interface names and results)
//! is written to `<cniDir>/<containerID>`. DEL and CHECK replay the cached
//! chain instead of resolving the pod's networks again.

use crate::delegate::DelegateConfig;
use crate::error::EngineError;
use cni_client::CniResult;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One delegate of an attached chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainLink {
    pub delegate: DelegateConfig,
    pub ifname: String,
    /// ADD result, once the delegate is attached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CniResult>,
}

impl ChainLink {
    pub fn new(delegate: DelegateConfig, ifname: impl Into<String>) -> Self {
        Self {
            delegate,
            ifname: ifname.into(),
            result: None,
        }
    }
}

/// Chain recorded for a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedChain {
    pub container_id: String,
    pub links: Vec<ChainLink>,
}

/// Cache directory handle.
#[derive(Debug, Clone)]
pub struct DelegateCache {
    dir: PathBuf,
}

impl DelegateCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, container_id: &str) -> Result<PathBuf, EngineError> {
        if container_id.is_empty()
            || container_id.contains(['/', '\\'])
            || container_id.starts_with('.')
        {
            return Err(EngineError::Parse(format!(
                "invalid container ID {container_id:?}"
            )));
        }
        Ok(self.dir.join(container_id))
    }

    /// Record a chain, replacing any earlier record
    pub async fn save(&self, chain: &CachedChain) -> Result<(), EngineError> {
        let path = self.path(&chain.container_id)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| EngineError::io(&self.dir, e))?;
        let bytes = serde_json::to_vec(chain)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| EngineError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| EngineError::io(&path, e))?;
        debug!("Cached {} delegate(s) in {}", chain.links.len(), path.display());
        Ok(())
    }

    /// Chain recorded for `container_id`, if any
    pub async fn load(&self, container_id: &str) -> Result<Option<CachedChain>, EngineError> {
        let path = self.path(container_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(EngineError::io(&path, e)),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Forget the chain; removing a missing record is not an error
    pub async fn remove(&self, container_id: &str) -> Result<(), EngineError> {
        let path = self.path(container_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::io(&path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::NetworkConfig;

    fn chain(container_id: &str) -> CachedChain {
        let conf = NetworkConfig::from_slice(
            br#"{"cniVersion":"0.4.0","name":"sriov","plugins":[{"type":"sriov","vlan":7},{"type":"tuning"}]}"#,
        )
        .unwrap();
        let mut link = ChainLink::new(DelegateConfig::new("sriov", conf), "net1");
        link.result = Some(CniResult {
            cni_version: "0.4.0".to_string(),
            ..Default::default()
        });
        CachedChain {
            container_id: container_id.to_string(),
            links: vec![link],
        }
    }

    #[tokio::test]
    async fn test_save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DelegateCache::new(dir.path().join("multinet"));
        assert!(cache.load("abc").await.unwrap().is_none());

        let saved = chain("abc");
        cache.save(&saved).await.unwrap();
        assert_eq!(cache.load("abc").await.unwrap(), Some(saved));

        cache.remove("abc").await.unwrap();
        assert!(cache.load("abc").await.unwrap().is_none());
        cache.remove("abc").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DelegateCache::new(dir.path());
        assert!(cache.save(&chain("../etc")).await.is_err());
        assert!(cache.load("a/b").await.is_err());
        assert!(cache.remove("").await.is_err());
    }
}
