use crate::core::get_config_dir;
use crate::core::lifecycle::PollPolicy;
use crate::edw::driver::{ExecutionMode, DEFAULT_CONCURRENCY};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "BENCHFORGE";

#[derive(Deserialize, Debug, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub kubernetes: KubernetesConfig,
    #[serde(default)]
    pub edw: EdwConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct KubernetesConfig {
    /// Path or name of the kubectl binary
    #[serde(default = "default_kubectl")]
    pub kubectl: String,
    /// Passed as `--kubeconfig=<path>` when set
    #[serde(default)]
    pub kubeconfig: Option<String>,
    #[serde(default = "default_boot_timeout_secs")]
    pub boot_timeout_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Consecutive readiness probe errors tolerated
    #[serde(default = "default_max_poll_errors")]
    pub max_poll_errors: u32,
    /// Delete a resource that failed to become ready
    #[serde(default)]
    pub cleanup_on_failure: bool,
}

impl KubernetesConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            timeout: Duration::from_secs(self.boot_timeout_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_poll_errors: self.max_poll_errors,
            cleanup_on_failure: self.cleanup_on_failure,
        }
    }
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            kubectl: default_kubectl(),
            kubeconfig: None,
            boot_timeout_secs: default_boot_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            max_poll_errors: default_max_poll_errors(),
            cleanup_on_failure: false,
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct EdwConfig {
    #[serde(default = "default_service_type")]
    pub service_type: String,
    /// Snapshot to restore the cluster from. The db/user/password settings
    /// below only apply when this is set.
    #[serde(default)]
    pub cluster_snapshot: Option<String>,
    #[serde(default)]
    pub cluster_db: Option<String>,
    #[serde(default)]
    pub cluster_user: Option<String>,
    #[serde(default)]
    pub cluster_password: Option<String>,
    /// Worker pool size in concurrent mode
    #[serde(default = "default_cluster_concurrency")]
    pub cluster_concurrency: usize,
    #[serde(default)]
    pub query_execution_mode: ExecutionMode,
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,
    /// SQL client argv; `{cluster}`, `{database}` and `{user}` are substituted
    #[serde(default)]
    pub client_command: Vec<String>,
}

impl EdwConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_secs.map(Duration::from_secs)
    }
}

impl std::fmt::Debug for EdwConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdwConfig")
            .field("service_type", &self.service_type)
            .field("cluster_snapshot", &self.cluster_snapshot)
            .field("cluster_db", &self.cluster_db)
            .field("cluster_user", &self.cluster_user)
            .field("cluster_password", &self.cluster_password.as_ref().map(|_| "***"))
            .field("cluster_concurrency", &self.cluster_concurrency)
            .field("query_execution_mode", &self.query_execution_mode)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("client_command", &self.client_command)
            .finish()
    }
}

impl Default for EdwConfig {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            cluster_snapshot: None,
            cluster_db: None,
            cluster_user: None,
            cluster_password: None,
            cluster_concurrency: default_cluster_concurrency(),
            query_execution_mode: ExecutionMode::default(),
            query_timeout_secs: None,
            client_command: Vec::new(),
        }
    }
}

fn default_kubectl() -> String {
    "kubectl".to_string()
}

fn default_boot_timeout_secs() -> u64 {
    600
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_max_poll_errors() -> u32 {
    3
}

fn default_service_type() -> String {
    "redshift".to_string()
}

fn default_cluster_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

pub fn load_config(config_path: Option<&PathBuf>) -> Result<Config, config::ConfigError> {
    let mut config_vec = vec![];

    // User-provided config file
    if let Some(config_path) = config_path {
        if config_path.exists() {
            config_vec.push(config_path.clone());
        } else {
            tracing::warn!("Config file {config_path:?} not found.");
        }
    }

    // Default config file
    if let Ok(default_config_path) = get_config_dir().map(|d| d.join("benchforge.toml")) {
        if default_config_path.exists() {
            config_vec.push(default_config_path);
        }
    }

    build_config(&config_vec, config::Environment::with_prefix(ENV_PREFIX))
}

// Keys contain underscores, so nesting uses a double underscore:
// BENCHFORGE__EDW__CLUSTER_CONCURRENCY=8
fn build_config(
    files: &[PathBuf],
    env: config::Environment,
) -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder();
    let settings = files.iter().fold(settings, |s, path| {
        s.add_source(config::File::from(path.as_path()))
    });

    settings
        .add_source(
            env.separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("edw.client_command"),
        )
        .build()?
        .try_deserialize()
}
