use super::error::ProvisionError;
use super::lifecycle::{LifecycleController, PollPolicy, ResourceLifecycle};
use super::resource::{ResourceHandle, ResourceKind};
use std::collections::HashMap;

pub type DynController = LifecycleController<Box<dyn ResourceLifecycle>>;

/// Lifecycle controllers keyed by the resource kind they manage.
#[derive(Default)]
pub struct ProvisionerRegistry {
    controllers: HashMap<ResourceKind, DynController>,
}

impl ProvisionerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend, replacing any previous one for the same kind.
    pub fn register(&mut self, backend: Box<dyn ResourceLifecycle>, policy: PollPolicy) {
        let kind = backend.kind();
        if self
            .controllers
            .insert(kind, LifecycleController::new(backend, policy))
            .is_some()
        {
            tracing::warn!("Replacing registered provisioner for {}", kind);
        }
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&DynController> {
        self.controllers.get(&kind)
    }

    pub fn kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<_> = self.controllers.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn provision(&self, handle: &mut ResourceHandle) -> anyhow::Result<()> {
        Ok(self.controller(handle.kind())?.provision(handle)?)
    }

    pub fn delete(&self, handle: &mut ResourceHandle) -> anyhow::Result<()> {
        Ok(self.controller(handle.kind())?.delete(handle)?)
    }

    fn controller(&self, kind: ResourceKind) -> anyhow::Result<&DynController> {
        self.get(kind)
            .ok_or_else(|| anyhow::anyhow!("No provisioner registered for {kind}"))
    }
}

impl std::fmt::Debug for ProvisionerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionerRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Unwraps a [`ProvisionError`] out of an error returned by the registry.
pub fn provision_error(err: &anyhow::Error) -> Option<&ProvisionError> {
    err.downcast_ref::<ProvisionError>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lifecycle::Readiness;
    use crate::core::resource::{LifecycleState, ResourceSpec};

    struct AlwaysReady(ResourceKind);

    impl ResourceLifecycle for AlwaysReady {
        fn kind(&self) -> ResourceKind {
            self.0
        }

        fn create(&self, _spec: &ResourceSpec) -> anyhow::Result<()> {
            Ok(())
        }

        fn check_ready(&self, _handle: &ResourceHandle) -> anyhow::Result<Readiness> {
            Ok(Readiness::Ready)
        }

        fn delete(&self, _handle: &ResourceHandle) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_dispatch_by_kind() {
        let mut registry = ProvisionerRegistry::new();
        registry.register(
            Box::new(AlwaysReady(ResourceKind::ContainerVm)),
            PollPolicy::default(),
        );

        let mut handle =
            ResourceHandle::new(ResourceSpec::builder(ResourceKind::ContainerVm, "vm").build());
        registry.provision(&mut handle).unwrap();
        assert_eq!(handle.state(), LifecycleState::Ready);
        registry.delete(&mut handle).unwrap();
        assert_eq!(handle.state(), LifecycleState::Deleted);
        assert_eq!(registry.kinds(), vec![ResourceKind::ContainerVm]);
    }

    #[test]
    fn test_unregistered_kind() {
        let registry = ProvisionerRegistry::new();
        let mut handle = ResourceHandle::new(
            ResourceSpec::builder(ResourceKind::DataWarehouseCluster, "edw").build(),
        );
        let err = registry.provision(&mut handle).unwrap_err();
        assert!(err.to_string().contains("data_warehouse_cluster"));
        assert!(provision_error(&err).is_none());
        assert_eq!(handle.state(), LifecycleState::Pending);
    }

    #[test]
    fn test_provision_error_is_downcastable() {
        struct Broken;
        impl ResourceLifecycle for Broken {
            fn kind(&self) -> ResourceKind {
                ResourceKind::ContainerVm
            }
            fn create(&self, _spec: &ResourceSpec) -> anyhow::Result<()> {
                anyhow::bail!("nope")
            }
            fn check_ready(&self, _handle: &ResourceHandle) -> anyhow::Result<Readiness> {
                unreachable!()
            }
            fn delete(&self, _handle: &ResourceHandle) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let mut registry = ProvisionerRegistry::new();
        registry.register(Box::new(Broken), PollPolicy::default());
        let mut handle =
            ResourceHandle::new(ResourceSpec::builder(ResourceKind::ContainerVm, "vm").build());

        let err = registry.provision(&mut handle).unwrap_err();
        assert!(matches!(
            provision_error(&err),
            Some(ProvisionError::CreateFailure { .. })
        ));
    }
}
