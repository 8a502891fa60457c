use anyhow::Result;
use benchforge::core::registry::ProvisionerRegistry;
use benchforge::core::resource::{ResourceHandle, ResourceKind, ResourceSpec};

pub(super) fn handle_down(registry: &ProvisionerRegistry, name: &str) -> Result<()> {
    let spec = ResourceSpec::builder(ResourceKind::ContainerVm, name).build();
    let mut handle = ResourceHandle::attach(spec);
    registry.delete(&mut handle)?;
    println!("{name} deleted.");
    Ok(())
}
