use anyhow::Result;
use benchforge::core::registry::ProvisionerRegistry;
use benchforge::core::resource::{ResourceHandle, ResourceSpec};

pub(super) fn handle_up(registry: &ProvisionerRegistry, spec: ResourceSpec) -> Result<()> {
    let mut handle = ResourceHandle::new(spec);
    registry.provision(&mut handle)?;
    println!("{}", serde_json::to_string_pretty(handle.metadata())?);
    Ok(())
}
