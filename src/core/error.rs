use super::resource::{LifecycleState, ResourceKind};
use std::time::Duration;
use thiserror::Error;

/// Longest stderr excerpt carried inside an error.
pub const STDERR_EXCERPT_LEN: usize = 512;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to create {kind} '{name}': {source:#}")]
    CreateFailure {
        kind: ResourceKind,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("'{name}' not ready after {elapsed:?} (timeout {timeout:?}, last status: {last_status})")]
    ReadinessTimeout {
        name: String,
        timeout: Duration,
        elapsed: Duration,
        last_status: String,
    },

    #[error("'{name}' failed to become ready: {reason}")]
    ReadinessFailure { name: String, reason: String },

    #[error("failed to delete {kind} '{name}': {source:#}")]
    DeleteFailure {
        kind: ResourceKind,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("'{name}' cannot move from {from} to {to}")]
    InvalidTransition {
        name: String,
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("'{name}' is not ready (state: {state})")]
    NotReady { name: String, state: LifecycleState },
}

/// A control-plane command that exited unsuccessfully.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("command `{command}` exited with status {exit_code}: {stderr}")]
pub struct CommandError {
    pub command: String,
    pub exit_code: i32,
    pub stderr: String,
}

impl CommandError {
    pub fn new(command: String, exit_code: i32, stderr: &str) -> Self {
        Self {
            command,
            exit_code,
            stderr: excerpt(stderr.trim(), STDERR_EXCERPT_LEN),
        }
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_truncates_stderr() {
        let long = "x".repeat(STDERR_EXCERPT_LEN + 100);
        let err = CommandError::new("kubectl get pod a".into(), 1, &long);
        assert_eq!(err.stderr.len(), STDERR_EXCERPT_LEN + 3);
        assert!(err.stderr.ends_with("..."));
    }

    #[test]
    fn test_command_error_display() {
        let err = CommandError::new("kubectl delete pod a".into(), 2, "  forbidden\n");
        assert_eq!(
            err.to_string(),
            "command `kubectl delete pod a` exited with status 2: forbidden"
        );
    }

    #[test]
    fn test_create_failure_keeps_context() {
        let err = ProvisionError::CreateFailure {
            kind: ResourceKind::ContainerVm,
            name: "vm-1".into(),
            source: anyhow::Error::new(CommandError::new("kubectl create".into(), 1, "boom"))
                .context("submitting pod manifest"),
        };
        let msg = err.to_string();
        assert!(msg.contains("container_vm 'vm-1'"));
        assert!(msg.contains("submitting pod manifest"));
        assert!(msg.contains("boom"));
    }
}
