//! Uniform create → poll → delete lifecycle shared by every resource kind.
//!
//! A resource kind only supplies the three hooks of [`ResourceLifecycle`];
//! [`LifecycleController`] owns state transitions, readiness polling, the
//! timeout and the poll-error budget.

use super::error::ProvisionError;
use super::resource::{LifecycleState, ResourceHandle, ResourceKind, ResourceSpec};
use super::Metadata;
use std::time::{Duration, Instant};

/// Outcome of a single readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Still coming up; the string is the last observed status.
    NotReady(String),
    /// Terminal bad state. Polling stops immediately.
    Failed(String),
}

/// Kind-specific hooks driven by [`LifecycleController`].
pub trait ResourceLifecycle: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Issue the create request. Called exactly once per handle.
    fn create(&self, spec: &ResourceSpec) -> anyhow::Result<()>;

    /// Probe readiness. `Err` means the probe itself failed and may be retried.
    fn check_ready(&self, handle: &ResourceHandle) -> anyhow::Result<Readiness>;

    /// Remove the resource. Deleting an absent resource must succeed.
    fn delete(&self, handle: &ResourceHandle) -> anyhow::Result<()>;

    /// Extra reporting metadata merged into the handle once it is ready.
    fn metadata(&self, _spec: &ResourceSpec) -> Metadata {
        Metadata::new()
    }
}

impl<T: ResourceLifecycle + ?Sized> ResourceLifecycle for Box<T> {
    fn kind(&self) -> ResourceKind {
        (**self).kind()
    }

    fn create(&self, spec: &ResourceSpec) -> anyhow::Result<()> {
        (**self).create(spec)
    }

    fn check_ready(&self, handle: &ResourceHandle) -> anyhow::Result<Readiness> {
        (**self).check_ready(handle)
    }

    fn delete(&self, handle: &ResourceHandle) -> anyhow::Result<()> {
        (**self).delete(handle)
    }

    fn metadata(&self, spec: &ResourceSpec) -> Metadata {
        (**self).metadata(spec)
    }
}

#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Overall deadline for `wait_until_ready`.
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Consecutive probe errors tolerated before giving up.
    pub max_poll_errors: u32,
    /// Issue a best-effort delete when `provision` fails after the create
    /// request went through.
    pub cleanup_on_failure: bool,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(10),
            max_poll_errors: 3,
            cleanup_on_failure: false,
        }
    }
}

pub struct LifecycleController<R> {
    backend: R,
    policy: PollPolicy,
}

impl<R: ResourceLifecycle> LifecycleController<R> {
    pub fn new(backend: R, policy: PollPolicy) -> Self {
        Self { backend, policy }
    }

    pub fn backend(&self) -> &R {
        &self.backend
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Issue the create request and move the handle to `WaitingReady`.
    ///
    /// On failure the handle ends in `Failed`; no partial resource is assumed
    /// to exist, but [`delete`](Self::delete) may still be used to clean up.
    pub fn create(&self, handle: &mut ResourceHandle) -> Result<(), ProvisionError> {
        transition(handle, LifecycleState::Creating)?;
        tracing::info!("Creating {} '{}'", handle.kind(), handle.name());

        match self.backend.create(handle.spec()) {
            Ok(()) => {
                handle.mark_created();
                transition(handle, LifecycleState::WaitingReady)
            }
            Err(source) => {
                handle.set_state(LifecycleState::Failed);
                Err(ProvisionError::CreateFailure {
                    kind: handle.kind(),
                    name: handle.name().to_string(),
                    source,
                })
            }
        }
    }

    /// Poll readiness until it succeeds, fails terminally, or the policy
    /// timeout elapses.
    ///
    /// The timeout aborts only the waiting. A probe already in flight runs to
    /// completion, and the resource is left for the caller to delete.
    pub fn wait_until_ready(&self, handle: &mut ResourceHandle) -> Result<(), ProvisionError> {
        match handle.state() {
            LifecycleState::Ready | LifecycleState::InUse => return Ok(()),
            LifecycleState::WaitingReady => {}
            other => {
                return Err(ProvisionError::InvalidTransition {
                    name: handle.name().to_string(),
                    from: other,
                    to: LifecycleState::Ready,
                })
            }
        }

        let start = Instant::now();
        // A timeout too large to represent means waiting without a deadline.
        let deadline = start.checked_add(self.policy.timeout);
        let mut consecutive_errors = 0u32;
        let mut last_status = String::from("unknown");

        loop {
            handle.mark_polled();
            match self.backend.check_ready(handle) {
                Ok(Readiness::Ready) => {
                    let extra = self.backend.metadata(handle.spec());
                    handle.extend_metadata(extra);
                    transition(handle, LifecycleState::Ready)?;
                    tracing::info!(
                        "{} '{}' is ready after {:?}",
                        handle.kind(),
                        handle.name(),
                        start.elapsed()
                    );
                    return Ok(());
                }
                Ok(Readiness::NotReady(status)) => {
                    tracing::debug!("'{}' not ready yet: {}", handle.name(), status);
                    consecutive_errors = 0;
                    last_status = status;
                }
                Ok(Readiness::Failed(reason)) => {
                    handle.set_state(LifecycleState::Failed);
                    return Err(ProvisionError::ReadinessFailure {
                        name: handle.name().to_string(),
                        reason,
                    });
                }
                Err(e) => {
                    consecutive_errors += 1;
                    if consecutive_errors > self.policy.max_poll_errors {
                        handle.set_state(LifecycleState::Failed);
                        return Err(ProvisionError::ReadinessFailure {
                            name: handle.name().to_string(),
                            reason: format!(
                                "readiness check failed {consecutive_errors} times in a row: {e:#}"
                            ),
                        });
                    }
                    tracing::warn!(
                        "Readiness check for '{}' failed (attempt {}/{}): {:#}",
                        handle.name(),
                        consecutive_errors,
                        self.policy.max_poll_errors + 1,
                        e
                    );
                }
            }

            let now = Instant::now();
            let Some(deadline) = deadline else {
                std::thread::sleep(self.policy.poll_interval);
                continue;
            };
            if now >= deadline {
                handle.set_state(LifecycleState::Failed);
                return Err(ProvisionError::ReadinessTimeout {
                    name: handle.name().to_string(),
                    timeout: self.policy.timeout,
                    elapsed: now - start,
                    last_status,
                });
            }
            std::thread::sleep(self.policy.poll_interval.min(deadline - now));
        }
    }

    /// Create the resource and wait for it to become ready.
    pub fn provision(&self, handle: &mut ResourceHandle) -> Result<(), ProvisionError> {
        self.create(handle)?;
        let result = self.wait_until_ready(handle);
        if let Err(ref e) = result {
            if self.policy.cleanup_on_failure {
                tracing::warn!("Cleaning up '{}' after failed provisioning: {}", handle.name(), e);
                if let Err(cleanup) = self.delete(handle) {
                    tracing::warn!("Cleanup of '{}' failed: {}", handle.name(), cleanup);
                }
            }
        }
        result
    }

    /// Mark a ready resource as in use by a workload.
    pub fn acquire(&self, handle: &mut ResourceHandle) -> Result<(), ProvisionError> {
        transition(handle, LifecycleState::InUse)
    }

    pub fn release(&self, handle: &mut ResourceHandle) -> Result<(), ProvisionError> {
        transition(handle, LifecycleState::Ready)
    }

    /// Delete the resource.
    ///
    /// Attempted from any state, including `Failed`. Failures are returned
    /// once and never retried here.
    pub fn delete(&self, handle: &mut ResourceHandle) -> Result<(), ProvisionError> {
        match handle.state() {
            LifecycleState::Deleted => return Ok(()),
            // Nothing was ever submitted.
            LifecycleState::Pending => return transition(handle, LifecycleState::Deleted),
            _ => {}
        }

        handle.set_state(LifecycleState::Deleting);
        tracing::info!("Deleting {} '{}'", handle.kind(), handle.name());

        match self.backend.delete(handle) {
            Ok(()) => transition(handle, LifecycleState::Deleted),
            Err(source) => {
                handle.set_state(LifecycleState::Failed);
                Err(ProvisionError::DeleteFailure {
                    kind: handle.kind(),
                    name: handle.name().to_string(),
                    source,
                })
            }
        }
    }
}

fn transition(handle: &mut ResourceHandle, next: LifecycleState) -> Result<(), ProvisionError> {
    let current = handle.state();
    if !current.can_transition_to(next) {
        return Err(ProvisionError::InvalidTransition {
            name: handle.name().to_string(),
            from: current,
            to: next,
        });
    }
    tracing::debug!("'{}': {} -> {}", handle.name(), current, next);
    handle.set_state(next);
    Ok(())
}
