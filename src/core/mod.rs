pub mod command;
pub mod error;
pub mod lifecycle;
pub mod registry;
pub mod resource;

use std::path::PathBuf;

pub type Metadata = std::collections::BTreeMap<String, String>;

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Failed to get config directory"))
        .map(|p| p.join("benchforge"))
}

/// Derive a resource name that is unique per call.
///
/// Names are lowercase so they stay valid Kubernetes object names.
pub fn unique_name(prefix: &str) -> String {
    let prefix = prefix.trim().trim_end_matches('-').to_lowercase();
    let suffix = &uuid::Uuid::new_v4().simple().to_string()[..8];
    if prefix.is_empty() {
        format!("pkb-{suffix}")
    } else {
        format!("{prefix}-{suffix}")
    }
}
