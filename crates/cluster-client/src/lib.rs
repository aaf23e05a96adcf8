//! Cluster API Client
//!
//! The narrow slice of the Kubernetes API the delegate engine needs: reading
//! pods and NetworkAttachmentDefinitions, and writing pod annotations.

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterError;
#[cfg(feature = "test-util")]
pub use mock::MockClusterClient;
