//! Namespaced references to network attachments.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A `namespace/name` pointer to a NetworkAttachmentDefinition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkReference {
    /// Namespace of the referenced attachment
    pub namespace: String,

    /// Name of the referenced attachment
    pub name: String,
}

impl NetworkReference {
    /// Create a reference from its parts
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NetworkReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
