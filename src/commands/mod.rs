use crate::cli::{BenchForge, Commands};
use benchforge::config::{load_config, Config};
use benchforge::core::command::SystemCommandRunner;
use benchforge::core::registry::ProvisionerRegistry;
use benchforge::kubernetes::{ContainerVmProvisioner, KubectlClient};
use clap::CommandFactory;
use std::path::PathBuf;
use std::sync::Arc;

mod down;
mod manifest;
mod status;
mod up;

pub fn handle_commands(config_path: &Option<PathBuf>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Manifest(vm) => manifest::handle_manifest(&vm.to_spec()),
        Commands::Up { vm, timeout } => {
            let mut config = load_config(config_path.as_ref())?;
            if let Some(secs) = timeout {
                config.kubernetes.boot_timeout_secs = secs;
            }
            up::handle_up(&build_registry(&config), vm.to_spec())
        }
        Commands::Down { name } => {
            let config = load_config(config_path.as_ref())?;
            down::handle_down(&build_registry(&config), &name)
        }
        Commands::Status { name } => {
            let config = load_config(config_path.as_ref())?;
            status::handle_status(&build_registry(&config), &name)
        }
        Commands::Completion { shell } => {
            let mut cmd = BenchForge::command();
            clap_complete::generate(shell, &mut cmd, "benchforge", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn build_registry(config: &Config) -> ProvisionerRegistry {
    let kubectl = KubectlClient::new(
        &config.kubernetes.kubectl,
        config.kubernetes.kubeconfig.as_ref().map(PathBuf::from),
        Arc::new(SystemCommandRunner),
    );
    let mut registry = ProvisionerRegistry::new();
    registry.register(
        Box::new(ContainerVmProvisioner::new(kubectl)),
        config.kubernetes.poll_policy(),
    );
    registry
}
