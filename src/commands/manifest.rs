use anyhow::Result;
use benchforge::core::resource::ResourceSpec;
use benchforge::kubernetes::ManifestBuilder;

pub(super) fn handle_manifest(spec: &ResourceSpec) -> Result<()> {
    let pod = ManifestBuilder::new().build(spec)?;
    println!("{}", pod.to_json()?);
    Ok(())
}
