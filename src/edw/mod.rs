//! Provisioned data-warehouse clusters and the benchmark queries run on them.

pub mod driver;
pub mod runner;

use crate::config::EdwConfig;
use crate::core::command::CommandRunner;
use crate::core::error::ProvisionError;
use crate::core::lifecycle::{Readiness, ResourceLifecycle};
use crate::core::resource::{ResourceHandle, ResourceKind, ResourceSpec};
use crate::core::Metadata;

pub use driver::{ExecutionMode, QueryExecutionDriver, QueryReport, QueryResult, QueryTask};
pub use runner::CommandQueryRunner;

use std::sync::Arc;

pub const DEFAULT_NUMBER_OF_NODES: u32 = 2;

/// Cloud provider hosting a warehouse service type.
pub fn provider_for_service_type(service_type: &str) -> Option<&'static str> {
    match service_type {
        "redshift" => Some("aws"),
        _ => None,
    }
}

/// Settings used only when the cluster is restored from a snapshot.
#[derive(Clone, PartialEq, Eq)]
pub struct SnapshotRestore {
    pub snapshot: String,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl SnapshotRestore {
    pub fn from_config(config: &EdwConfig) -> Option<Self> {
        config.cluster_snapshot.as_ref().map(|snapshot| Self {
            snapshot: snapshot.clone(),
            database: config.cluster_db.clone(),
            user: config.cluster_user.clone(),
            password: config.cluster_password.clone(),
        })
    }
}

impl std::fmt::Debug for SnapshotRestore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotRestore")
            .field("snapshot", &self.snapshot)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// What a query runner needs to reach a ready cluster.
#[derive(Clone, PartialEq, Eq)]
pub struct ClusterConnection {
    pub cluster_identifier: String,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for ClusterConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterConnection")
            .field("cluster_identifier", &self.cluster_identifier)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A data-warehouse service on top of a provider-specific backend.
///
/// The backend does the actual provisioning; this layer adds the
/// warehouse reporting metadata and snapshot connection settings.
pub struct EdwService {
    service_type: String,
    backend: Box<dyn ResourceLifecycle>,
    snapshot: Option<SnapshotRestore>,
}

impl EdwService {
    pub fn new(service_type: impl Into<String>, backend: Box<dyn ResourceLifecycle>) -> Self {
        Self {
            service_type: service_type.into(),
            backend,
            snapshot: None,
        }
    }

    /// Service of the configured type, restoring from the configured
    /// snapshot if there is one.
    pub fn from_config(config: &EdwConfig, backend: Box<dyn ResourceLifecycle>) -> Self {
        Self::new(config.service_type.clone(), backend)
            .with_snapshot(SnapshotRestore::from_config(config))
    }

    pub fn with_snapshot(mut self, snapshot: Option<SnapshotRestore>) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn service_type(&self) -> &str {
        &self.service_type
    }

    pub fn provider(&self) -> Option<&'static str> {
        provider_for_service_type(&self.service_type)
    }

    pub fn snapshot(&self) -> Option<&SnapshotRestore> {
        self.snapshot.as_ref()
    }

    pub fn connection(&self, handle: &ResourceHandle) -> Result<ClusterConnection, ProvisionError> {
        if !handle.state().is_usable() {
            return Err(ProvisionError::NotReady {
                name: handle.name().to_string(),
                state: handle.state(),
            });
        }
        let snapshot = self.snapshot.as_ref();
        Ok(ClusterConnection {
            cluster_identifier: handle.name().to_string(),
            database: snapshot.and_then(|s| s.database.clone()),
            user: snapshot.and_then(|s| s.user.clone()),
            password: snapshot.and_then(|s| s.password.clone()),
        })
    }

    /// Query driver for a ready cluster that runs each query through the
    /// configured SQL client.
    pub fn query_driver(
        &self,
        handle: &ResourceHandle,
        config: &EdwConfig,
        commands: Arc<dyn CommandRunner>,
    ) -> Result<QueryExecutionDriver, ProvisionError> {
        let connection = self.connection(handle)?;
        let runner = CommandQueryRunner::from_config(config, connection, commands);
        Ok(QueryExecutionDriver::from_config(Arc::new(runner), config))
    }
}

impl ResourceLifecycle for EdwService {
    fn kind(&self) -> ResourceKind {
        ResourceKind::DataWarehouseCluster
    }

    fn create(&self, spec: &ResourceSpec) -> anyhow::Result<()> {
        if let Some(snapshot) = &self.snapshot {
            tracing::info!(
                "Restoring {} cluster '{}' from snapshot {}",
                self.service_type,
                spec.name,
                snapshot.snapshot
            );
        }
        self.backend.create(spec)
    }

    fn check_ready(&self, handle: &ResourceHandle) -> anyhow::Result<Readiness> {
        self.backend.check_ready(handle)
    }

    fn delete(&self, handle: &ResourceHandle) -> anyhow::Result<()> {
        self.backend.delete(handle)
    }

    fn metadata(&self, spec: &ResourceSpec) -> Metadata {
        let mut metadata = self.backend.metadata(spec);
        metadata.insert("edw_service_type".into(), self.service_type.clone());
        metadata.insert("edw_cluster_identifier".into(), spec.name.clone());
        metadata.insert(
            "edw_cluster_node_type".into(),
            spec.node_type.clone().unwrap_or_else(|| "unspecified".into()),
        );
        metadata.insert(
            "edw_cluster_node_count".into(),
            spec.node_count.unwrap_or(DEFAULT_NUMBER_OF_NODES).to_string(),
        );
        if let Some(provider) = self.provider() {
            metadata.insert("cloud".into(), provider.to_string());
        }
        if let Some(snapshot) = &self.snapshot {
            metadata.insert("edw_cluster_snapshot".into(), snapshot.snapshot.clone());
        }
        metadata
    }
}
