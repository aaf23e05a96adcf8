//! Delegate Engine
//!
//! Core of the multinet CNI meta-plugin. For every pod it resolves the
//! networks to attach (cluster network, default networks and the networks
//! selected by the pod's annotation), loads their CNI configurations, and
//! invokes the delegate plugins through a [`cni_client::PluginExecutor`].
//!
//! # Example
//!
//! ```no_run
//! use cni_client::ExecPluginExecutor;
//! use delegate_engine::{CheckpointResourceProvider, CmdArgs, DelegateEngine, NetConf};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), delegate_engine::EngineError> {
//! let conf = NetConf::load(br#"{"cniVersion":"1.0.0","name":"multinet","type":"multinet","clusterNetwork":"flannel"}"#)?;
//! let executor = Arc::new(ExecPluginExecutor::new(vec![conf.bin_dir.clone()]));
//! let engine = DelegateEngine::new(conf, executor, Arc::new(CheckpointResourceProvider::default()));
//! let args = CmdArgs::new("abc123", "/var/run/netns/abc123", "eth0", "K8S_POD_NAMESPACE=default;K8S_POD_NAME=web");
//! let outcome = engine.cmd_add(&args).await?;
//! println!("{}", serde_json::to_string(&outcome.result)?);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod confdir;
pub mod config;
pub mod delegate;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod invoke;
pub mod isolation;
pub mod loader;
pub mod logging;
pub mod readiness;
pub mod resources;
pub mod runtime;
pub mod selection;
pub mod status;
pub mod traversal;

pub use cache::{CachedChain, ChainLink, DelegateCache};
pub use config::{LoggingConfig, NetConf, RuntimeConfig};
pub use delegate::{DelegateConfig, NetworkConfig, PluginConf, PluginList};
pub use engine::{AddOutcome, DelegateEngine, Execution, Phase, SUPPORTED_VERSIONS, version_info};
pub use error::{EngineError, ResourceError};
pub use gateway::{RoutePolicy, apply_gateway_policy};
pub use isolation::NamespaceIsolation;
pub use loader::DelegateLoader;
pub use resources::{
    CheckpointResourceProvider, PodIdentity, ResourceInfo, ResourceMap, ResourceProvider,
    StaticResourceProvider,
};
pub use runtime::{CmdArgs, K8sArgs};
