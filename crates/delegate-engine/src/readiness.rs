//! Readiness gate
//!
//! ADD waits for the cluster network's indicator file before doing anything.

use crate::error::EngineError;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Wait until `path` exists, polling every `interval`, for at most `timeout`
pub async fn wait_for_indicator(
    path: &Path,
    timeout: Duration,
    interval: Duration,
) -> Result<(), EngineError> {
    let poll = async {
        loop {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return;
            }
            debug!("Waiting for readiness indicator {}", path.display());
            tokio::time::sleep(interval).await;
        }
    };
    tokio::time::timeout(timeout, poll).await.map_err(|_| {
        warn!(
            "Readiness indicator {} missing after {:?}",
            path.display(),
            timeout
        );
        EngineError::NotReady {
            path: path.to_path_buf(),
            timeout,
        }
    })
}
