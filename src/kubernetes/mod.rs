//! Container-orchestrator backed resources driven through `kubectl`.

pub mod manifest;
pub mod vm;

pub use manifest::{ManifestBuilder, Pod};
pub use vm::{ContainerVmProvisioner, KubectlClient};
