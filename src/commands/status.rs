use anyhow::{Context, Result};
use benchforge::core::lifecycle::{Readiness, ResourceLifecycle};
use benchforge::core::registry::ProvisionerRegistry;
use benchforge::core::resource::{ResourceHandle, ResourceKind, ResourceSpec};

pub(super) fn handle_status(registry: &ProvisionerRegistry, name: &str) -> Result<()> {
    let controller = registry
        .get(ResourceKind::ContainerVm)
        .context("No container VM provisioner registered")?;
    let handle =
        ResourceHandle::attach(ResourceSpec::builder(ResourceKind::ContainerVm, name).build());

    match controller.backend().check_ready(&handle)? {
        Readiness::Ready => println!("{name}: running"),
        Readiness::NotReady(status) => println!("{name}: not ready ({status})"),
        Readiness::Failed(reason) => println!("{name}: failed ({reason})"),
    }
    Ok(())
}
