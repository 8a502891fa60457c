use super::manifest::ManifestBuilder;
use crate::core::command::{execute_with_payload, CommandInvocation, CommandRunner};
use crate::core::lifecycle::{Readiness, ResourceLifecycle};
use crate::core::resource::{ResourceHandle, ResourceKind, ResourceSpec};
use crate::core::Metadata;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Waiting reasons after which a pod will not become ready on its own.
const FATAL_WAITING_REASONS: &[&str] = &[
    "CrashLoopBackOff",
    "ErrImagePull",
    "ImagePullBackOff",
    "InvalidImageName",
    "CreateContainerConfigError",
    "CreateContainerError",
];

/// Builds and runs `kubectl` invocations.
#[derive(Clone)]
pub struct KubectlClient {
    kubectl: String,
    kubeconfig: Option<PathBuf>,
    runner: Arc<dyn CommandRunner>,
}

impl KubectlClient {
    pub fn new(
        kubectl: impl Into<String>,
        kubeconfig: Option<PathBuf>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            kubectl: kubectl.into(),
            kubeconfig,
            runner,
        }
    }

    /// `<kubectl> [--kubeconfig=<path>] <args...>`
    pub fn argv<I, S>(&self, args: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = vec![self.kubectl.clone()];
        if let Some(kubeconfig) = &self.kubeconfig {
            argv.push(format!("--kubeconfig={}", kubeconfig.display()));
        }
        argv.extend(args.into_iter().map(Into::into));
        argv
    }

    pub fn create_from_manifest(&self, manifest: &str) -> Result<CommandInvocation> {
        execute_with_payload(self.runner.as_ref(), &self.argv(["create", "-f"]), manifest)
    }

    pub fn get_pod(&self, name: &str) -> Result<CommandInvocation> {
        self.runner.run(&self.argv(["get", "pod", name, "-o", "json"]))
    }

    pub fn delete_pod(&self, name: &str) -> Result<CommandInvocation> {
        self.runner
            .run(&self.argv(["delete", "pod", name, "--ignore-not-found=true"]))
    }
}

impl std::fmt::Debug for KubectlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubectlClient")
            .field("kubectl", &self.kubectl)
            .field("kubeconfig", &self.kubeconfig)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct PodDocument {
    #[serde(default)]
    status: PodStatus,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodStatus {
    phase: Option<String>,
    #[serde(default)]
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerStatus {
    #[serde(default)]
    state: ContainerState,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerState {
    waiting: Option<ContainerWaiting>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainerWaiting {
    reason: Option<String>,
}

/// Map `kubectl get pod -o json` output to a readiness verdict.
pub fn parse_pod_readiness(json: &str) -> Result<Readiness> {
    let pod: PodDocument = serde_json::from_str(json).context("Failed to parse pod status")?;

    if let Some(reason) = pod
        .status
        .container_statuses
        .iter()
        .filter_map(|s| s.state.waiting.as_ref()?.reason.as_deref())
        .find(|reason| FATAL_WAITING_REASONS.contains(reason))
    {
        return Ok(Readiness::Failed(reason.to_string()));
    }

    Ok(match pod.status.phase.as_deref() {
        Some("Running") => Readiness::Ready,
        Some(phase @ ("Failed" | "Succeeded")) => {
            Readiness::Failed(format!("pod exited with phase {phase}"))
        }
        Some(phase) => Readiness::NotReady(phase.to_string()),
        None => Readiness::NotReady("Unknown".to_string()),
    })
}

/// A virtual machine realized as a single scheduled pod.
#[derive(Debug, Clone)]
pub struct ContainerVmProvisioner {
    kubectl: KubectlClient,
    builder: ManifestBuilder,
}

impl ContainerVmProvisioner {
    pub fn new(kubectl: KubectlClient) -> Self {
        Self {
            kubectl,
            builder: ManifestBuilder::new(),
        }
    }

    pub fn kubectl(&self) -> &KubectlClient {
        &self.kubectl
    }
}

impl ResourceLifecycle for ContainerVmProvisioner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::ContainerVm
    }

    fn create(&self, spec: &ResourceSpec) -> Result<()> {
        let manifest = self
            .builder
            .build(spec)?
            .to_json()
            .context("Failed to serialize pod manifest")?;
        tracing::debug!("Pod manifest for '{}':\n{}", spec.name, manifest);

        self.kubectl
            .create_from_manifest(&manifest)?
            .ensure_success()
            .context("Failed to submit pod manifest")?;
        Ok(())
    }

    fn check_ready(&self, handle: &ResourceHandle) -> Result<Readiness> {
        let invocation = self
            .kubectl
            .get_pod(handle.name())?
            .ensure_success()
            .context("Failed to query pod status")?;
        parse_pod_readiness(&invocation.stdout)
    }

    fn delete(&self, handle: &ResourceHandle) -> Result<()> {
        let invocation = self.kubectl.delete_pod(handle.name())?;
        if invocation.success() || invocation.stderr.contains("NotFound") {
            return Ok(());
        }
        invocation
            .ensure_success()
            .context("Failed to delete pod")?;
        Ok(())
    }

    fn metadata(&self, spec: &ResourceSpec) -> Metadata {
        let mut metadata = Metadata::new();
        if let Some(image) = &spec.image {
            metadata.insert("image".into(), image.clone());
        }
        metadata.insert("gpu_count".into(), spec.gpu_count.to_string());
        if let Some(gpu_type) = &spec.gpu_type {
            metadata.insert("gpu_type".into(), gpu_type.clone());
        }
        if let Some(machine_type) = &spec.machine_type {
            metadata.insert("machine_type".into(), machine_type.clone());
        }
        if let Some(zone) = &spec.zone {
            metadata.insert("zone".into(), zone.clone());
        }
        metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::MockCommandRunner;
    use crate::core::error::ProvisionError;
    use crate::core::lifecycle::{LifecycleController, PollPolicy};
    use crate::core::resource::LifecycleState;
    use serde_json::Value;
    use std::sync::Mutex;
    use std::time::Duration;

    const KUBECTL: &str = "fake_kubectl_path";
    const KUBECONFIG: &str = "fake_kubeconfig_path";

    fn invocation(argv: &[String], stdout: &str, stderr: &str, exit_code: i32) -> CommandInvocation {
        CommandInvocation {
            argv: argv.to_vec(),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
        }
    }

    fn provisioner(runner: MockCommandRunner) -> ContainerVmProvisioner {
        ContainerVmProvisioner::new(KubectlClient::new(
            KUBECTL,
            Some(PathBuf::from(KUBECONFIG)),
            Arc::new(runner),
        ))
    }

    fn spec(gpus: u32) -> ResourceSpec {
        ResourceSpec::builder(ResourceKind::ContainerVm, "fake_name")
            .image("test_image")
            .machine_type("test_machine_type")
            .zone("test_zone")
            .gpus(gpus, (gpus > 0).then(|| "k80".to_string()))
            .build()
    }

    fn pod_json(phase: &str, waiting_reason: Option<&str>) -> String {
        let statuses = match waiting_reason {
            Some(reason) => format!(r#"[{{"state": {{"waiting": {{"reason": "{reason}"}}}}}}]"#),
            None => "[]".to_string(),
        };
        format!(r#"{{"kind": "Pod", "status": {{"phase": "{phase}", "containerStatuses": {statuses}}}}}"#)
    }

    #[test]
    fn test_create_issues_single_kubectl_create() {
        let manifests = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = manifests.clone();
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(1).returning(move |argv| {
            sink.lock()
                .unwrap()
                .push(std::fs::read_to_string(argv.last().unwrap()).unwrap());
            Ok(invocation(argv, "pod/fake_name created", "", 0))
        });
        let vm = provisioner(runner);

        vm.create(&spec(0)).unwrap();

        let manifests = manifests.lock().unwrap();
        assert_eq!(manifests.len(), 1);
        let manifest: Value = serde_json::from_str(&manifests[0]).unwrap();
        assert_eq!(manifest["metadata"]["name"], "fake_name");
        assert!(manifest["spec"]["containers"][0].get("resources").is_none());
    }

    #[test]
    fn test_create_command_line() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|argv| {
                argv[..4].join(" ")
                    == format!("{KUBECTL} --kubeconfig={KUBECONFIG} create -f")
                    && argv.len() == 5
            })
            .times(1)
            .returning(|argv| Ok(invocation(argv, "", "", 0)));

        provisioner(runner).create(&spec(2)).unwrap();
    }

    #[test]
    fn test_create_failure_carries_stderr() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(1)
            .returning(|argv| Ok(invocation(argv, "", "pods \"fake_name\" already exists", 1)));

        let err = provisioner(runner).create(&spec(0)).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("already exists"));
        assert!(msg.contains("status 1"));
    }

    #[test]
    fn test_argv_without_kubeconfig() {
        let client = KubectlClient::new("kubectl", None, Arc::new(MockCommandRunner::new()));
        assert_eq!(client.argv(["get", "pods"]), vec!["kubectl", "get", "pods"]);
    }

    #[test]
    fn test_parse_pod_readiness() {
        assert_eq!(
            parse_pod_readiness(&pod_json("Running", None)).unwrap(),
            Readiness::Ready
        );
        assert_eq!(
            parse_pod_readiness(&pod_json("Pending", None)).unwrap(),
            Readiness::NotReady("Pending".into())
        );
        assert_eq!(
            parse_pod_readiness(&pod_json("Pending", Some("ContainerCreating"))).unwrap(),
            Readiness::NotReady("Pending".into())
        );
        assert_eq!(
            parse_pod_readiness(&pod_json("Running", Some("CrashLoopBackOff"))).unwrap(),
            Readiness::Failed("CrashLoopBackOff".into())
        );
        assert!(matches!(
            parse_pod_readiness(&pod_json("Failed", None)).unwrap(),
            Readiness::Failed(_)
        ));
        assert_eq!(
            parse_pod_readiness(r#"{"kind": "Pod"}"#).unwrap(),
            Readiness::NotReady("Unknown".into())
        );
        assert!(parse_pod_readiness("not json").is_err());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|argv| argv.contains(&"--ignore-not-found=true".to_string()))
            .times(1)
            .returning(|argv| {
                Ok(invocation(
                    argv,
                    "",
                    "Error from server (NotFound): pods \"fake_name\" not found",
                    1,
                ))
            });
        let vm = provisioner(runner);
        let handle = ResourceHandle::new(spec(0));

        vm.delete(&handle).unwrap();
    }

    #[test]
    fn test_delete_failure() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(1)
            .returning(|argv| Ok(invocation(argv, "", "Error from server (Forbidden)", 1)));
        let vm = provisioner(runner);

        assert!(vm.delete(&ResourceHandle::new(spec(0))).is_err());
    }

    #[test]
    fn test_full_lifecycle_through_controller() {
        let polls = Arc::new(Mutex::new(0u32));
        let counter = polls.clone();
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(move |argv| {
            let verb = argv[2].as_str();
            match verb {
                "create" => Ok(invocation(argv, "pod/fake_name created", "", 0)),
                "get" => {
                    let mut n = counter.lock().unwrap();
                    *n += 1;
                    let phase = if *n < 3 { "Pending" } else { "Running" };
                    Ok(invocation(argv, &pod_json(phase, None), "", 0))
                }
                "delete" => Ok(invocation(argv, "pod \"fake_name\" deleted", "", 0)),
                other => panic!("unexpected verb {other}"),
            }
        });
        let controller = LifecycleController::new(
            provisioner(runner),
            PollPolicy {
                timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(5),
                ..PollPolicy::default()
            },
        );
        let mut handle = ResourceHandle::new(spec(2));

        controller.provision(&mut handle).unwrap();
        assert_eq!(handle.state(), LifecycleState::Ready);
        assert_eq!(*polls.lock().unwrap(), 3);
        assert_eq!(handle.metadata()["gpu_count"], "2");
        assert_eq!(handle.metadata()["gpu_type"], "k80");
        assert_eq!(handle.metadata()["resource_type"], "container_vm");

        controller.delete(&mut handle).unwrap();
        assert_eq!(handle.state(), LifecycleState::Deleted);
    }

    #[test]
    fn test_crash_loop_is_readiness_failure() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|argv| match argv[2].as_str() {
            "create" => Ok(invocation(argv, "", "", 0)),
            _ => Ok(invocation(
                argv,
                &pod_json("Running", Some("CrashLoopBackOff")),
                "",
                0,
            )),
        });
        let controller = LifecycleController::new(
            provisioner(runner),
            PollPolicy {
                timeout: Duration::from_secs(5),
                poll_interval: Duration::from_millis(5),
                ..PollPolicy::default()
            },
        );
        let mut handle = ResourceHandle::new(spec(0));

        let err = controller.provision(&mut handle).unwrap_err();
        assert!(matches!(err, ProvisionError::ReadinessFailure { .. }));
        assert_eq!(handle.state(), LifecycleState::Failed);
    }
}
