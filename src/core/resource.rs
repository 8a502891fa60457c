use super::Metadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResourceKind {
    ContainerVm,
    DataWarehouseCluster,
}

/// Immutable description of a requested resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub kind: ResourceKind,
    pub name: String,
    pub image: Option<String>,
    pub machine_type: Option<String>,
    pub gpu_count: u32,
    pub gpu_type: Option<String>,
    pub zone: Option<String>,
    pub node_count: Option<u32>,
    pub node_type: Option<String>,
}

impl ResourceSpec {
    pub fn builder(kind: ResourceKind, name: impl Into<String>) -> ResourceSpecBuilder {
        ResourceSpecBuilder::new(kind, name)
    }
}

pub struct ResourceSpecBuilder {
    spec: ResourceSpec,
}

impl ResourceSpecBuilder {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            spec: ResourceSpec {
                kind,
                name: name.into(),
                image: None,
                machine_type: None,
                gpu_count: 0,
                gpu_type: None,
                zone: None,
                node_count: None,
                node_type: None,
            },
        }
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.spec.image = Some(image.into());
        self
    }

    pub fn machine_type(mut self, machine_type: impl Into<String>) -> Self {
        self.spec.machine_type = Some(machine_type.into());
        self
    }

    pub fn gpus(mut self, count: u32, gpu_type: Option<String>) -> Self {
        self.spec.gpu_count = count;
        self.spec.gpu_type = gpu_type;
        self
    }

    pub fn zone(mut self, zone: impl Into<String>) -> Self {
        self.spec.zone = Some(zone.into());
        self
    }

    pub fn nodes(mut self, count: u32, node_type: impl Into<String>) -> Self {
        self.spec.node_count = Some(count);
        self.spec.node_type = Some(node_type.into());
        self
    }

    pub fn build(self) -> ResourceSpec {
        self.spec
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Display, EnumIter, Serialize, Deserialize)]
pub enum LifecycleState {
    #[strum(to_string = "Pending")]
    Pending,
    #[strum(to_string = "Creating")]
    Creating,
    #[strum(to_string = "WaitingReady")]
    WaitingReady,
    #[strum(to_string = "Ready")]
    Ready,
    #[strum(to_string = "InUse")]
    InUse,
    #[strum(to_string = "Deleting")]
    Deleting,
    #[strum(to_string = "Deleted")]
    Deleted,
    #[strum(to_string = "Failed")]
    Failed,
}

impl LifecycleState {
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Pending, Creating)
                | (Pending, Deleted)
                | (Creating, WaitingReady)
                | (Creating, Failed)
                | (WaitingReady, Ready)
                | (WaitingReady, Failed)
                | (WaitingReady, Deleting)
                | (Ready, InUse)
                | (Ready, Deleting)
                | (InUse, Ready)
                | (InUse, Deleting)
                | (Failed, Deleting)
                | (Deleting, Deleted)
                | (Deleting, Failed)
        )
    }

    /// Whether workloads may run against a resource in this state.
    pub fn is_usable(self) -> bool {
        matches!(self, LifecycleState::Ready | LifecycleState::InUse)
    }
}

/// Tracks one live resource instance.
///
/// The lifecycle fields are only changed through
/// [`LifecycleController`](super::lifecycle::LifecycleController).
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    spec: ResourceSpec,
    state: LifecycleState,
    created_at: Option<DateTime<Utc>>,
    last_polled_at: Option<DateTime<Utc>>,
    metadata: Metadata,
}

impl ResourceHandle {
    pub fn new(spec: ResourceSpec) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("resource_type".into(), spec.kind.to_string());
        metadata.insert("resource_name".into(), spec.name.clone());
        if let Some(node_type) = &spec.node_type {
            metadata.insert("node_type".into(), node_type.clone());
        }
        if let Some(node_count) = spec.node_count {
            metadata.insert("node_count".into(), node_count.to_string());
        }

        Self {
            spec,
            state: LifecycleState::Pending,
            created_at: None,
            last_polled_at: None,
            metadata,
        }
    }

    /// Handle for a resource created outside this process, e.g. by an earlier
    /// `up`. Its readiness is unknown until polled.
    pub fn attach(spec: ResourceSpec) -> Self {
        let mut handle = Self::new(spec);
        handle.state = LifecycleState::WaitingReady;
        handle
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.spec.kind
    }

    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn last_polled_at(&self) -> Option<DateTime<Utc>> {
        self.last_polled_at
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub(crate) fn set_state(&mut self, state: LifecycleState) {
        self.state = state;
    }

    pub(crate) fn mark_created(&mut self) {
        self.created_at = Some(Utc::now());
    }

    pub(crate) fn mark_polled(&mut self) {
        self.last_polled_at = Some(Utc::now());
    }

    pub(crate) fn extend_metadata(&mut self, extra: Metadata) {
        self.metadata.extend(extra);
    }
}
