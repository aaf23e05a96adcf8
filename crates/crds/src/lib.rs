//! multinet CRD Definitions
//!
//! Kubernetes types shared by the multinet crates: the
//! NetworkAttachmentDefinition custom resource and the JSON shapes carried in
//! pod annotations.

pub mod annotations;
pub mod network_attachment;
pub mod network_selection;
pub mod network_status;
pub mod references;

pub use annotations::*;
pub use network_attachment::*;
pub use network_selection::*;
pub use network_status::*;
pub use references::*;
