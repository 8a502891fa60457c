//! Pod manifests for container-backed virtual machines.

use crate::core::resource::ResourceSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const GPU_RESOURCE_KEY: &str = "nvidia.com/gpu";

/// Label carrying the resource name on every object we create.
pub const NAME_LABEL: &str = "pkb";

/// Keeps CUDA development containers alive and usable through `sudo`.
pub const CUDA_BOOTSTRAP_SCRIPT: &str = "apt-get update && apt-get install -y sudo && sed -i '/env_reset/d' /etc/sudoers && sed -i '/secure_path/d' /etc/sudoers && sudo ldconfig && tail -f /dev/null";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pod {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    pub dns_policy: String,
    pub volumes: Vec<Volume>,
    pub containers: Vec<Container>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub name: String,
    pub image: String,
    pub volume_mounts: Vec<VolumeMount>,
    pub security_context: SecurityContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

/// `privileged` is always written out, as `null` when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    pub privileged: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    pub limits: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<HostPathSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<EmptyDirSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPathSource {
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyDirSource {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

impl Pod {
    /// Attach a volume and mount it into the single container.
    pub fn attach_volume(&mut self, volume: Volume, mount_path: impl Into<String>) {
        let mount = VolumeMount {
            name: volume.name.clone(),
            mount_path: mount_path.into(),
        };
        self.spec.volumes.push(volume);
        if let Some(container) = self.spec.containers.first_mut() {
            container.volume_mounts.push(mount);
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Whether `image` is an NVIDIA CUDA development image.
pub fn is_cuda_devel_image(image: &str) -> bool {
    image
        .strip_prefix("nvidia/cuda:")
        .is_some_and(|tag| tag.contains("devel"))
}

/// Translates a [`ResourceSpec`] into a single-container [`Pod`].
///
/// Pure and deterministic: equal specs produce equal manifests.
#[derive(Debug, Clone, Default)]
pub struct ManifestBuilder;

impl ManifestBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, spec: &ResourceSpec) -> anyhow::Result<Pod> {
        let image = spec
            .image
            .as_deref()
            .filter(|i| !i.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("Resource '{}' has no container image", spec.name))?;

        let command = is_cuda_devel_image(image).then(|| {
            vec![
                "bash".to_string(),
                "-c".to_string(),
                CUDA_BOOTSTRAP_SCRIPT.to_string(),
            ]
        });

        let resources = (spec.gpu_count > 0).then(|| ResourceRequirements {
            limits: BTreeMap::from([(GPU_RESOURCE_KEY.to_string(), spec.gpu_count.to_string())]),
        });

        Ok(Pod {
            api_version: "v1".to_string(),
            kind: "Pod".to_string(),
            metadata: ObjectMeta {
                name: spec.name.clone(),
                labels: BTreeMap::from([(NAME_LABEL.to_string(), spec.name.clone())]),
            },
            spec: PodSpec {
                dns_policy: "ClusterFirst".to_string(),
                volumes: vec![],
                containers: vec![Container {
                    name: spec.name.clone(),
                    image: image.to_string(),
                    volume_mounts: vec![],
                    security_context: SecurityContext::default(),
                    command,
                    resources,
                }],
            },
        })
    }
}
