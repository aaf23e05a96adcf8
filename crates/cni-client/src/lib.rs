//! CNI Plugin Client
//!
//! Executes CNI plugins using the standard exec protocol: the plugin binary is
//! looked up on a search path, `CNI_*` variables describe the operation, the
//! network configuration is written to stdin and the result is read from
//! stdout.
//!
//! # Example
//!
//! ```no_run
//! use cni_client::{CniCommand, CniResult, ExecPluginExecutor, PluginExecutor, RuntimeEnv};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = ExecPluginExecutor::new(vec!["/opt/cni/bin".into()]);
//! let env = RuntimeEnv::new("abc123", "/var/run/netns/abc123", "eth0");
//! let config = br#"{"cniVersion":"1.0.0","name":"lo","type":"loopback"}"#;
//! let stdout = executor.exec_plugin("loopback", CniCommand::Add, config, &env).await?;
//! let result = CniResult::from_slice(&stdout)?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod executor_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::ExecPluginExecutor;
pub use error::CniError;
pub use models::*;
pub use executor_trait::PluginExecutor;
#[cfg(feature = "test-util")]
pub use mock::{MockPluginExecutor, RecordedCall};
