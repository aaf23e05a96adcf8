//! Namespace isolation
//!
//! With isolation enabled a pod may only reference attachments in its own
//! namespace or in one of the global namespaces.

use crate::error::EngineError;
use tracing::warn;

/// Cross-namespace reference policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceIsolation {
    enabled: bool,
    global_namespaces: Vec<String>,
}

impl NamespaceIsolation {
    pub fn new(enabled: bool, global_namespaces: Vec<String>) -> Self {
        Self {
            enabled,
            global_namespaces,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn global_namespaces(&self) -> &[String] {
        &self.global_namespaces
    }

    /// Whether `pod_namespace` may reference a network in `target_namespace`
    pub fn is_authorized(&self, pod_namespace: &str, target_namespace: &str) -> bool {
        !self.enabled || authorize(pod_namespace, target_namespace, &self.global_namespaces)
    }

    /// Like `is_authorized`, as an error naming both namespaces
    pub fn check(&self, pod_namespace: &str, target_namespace: &str) -> Result<(), EngineError> {
        if self.is_authorized(pod_namespace, target_namespace) {
            return Ok(());
        }
        warn!(
            "Pod namespace {} may not reference networks in namespace {}",
            pod_namespace, target_namespace
        );
        Err(EngineError::Authorization {
            pod_namespace: pod_namespace.to_string(),
            target_namespace: target_namespace.to_string(),
        })
    }
}

/// Same namespace, or a target listed in `allowed`
pub fn authorize(pod_namespace: &str, target_namespace: &str, allowed: &[String]) -> bool {
    pod_namespace == target_namespace || allowed.iter().any(|ns| ns == target_namespace)
}
