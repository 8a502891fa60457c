use benchforge::core::resource::{ResourceKind, ResourceSpec};
use benchforge::core::unique_name;
use clap::{Args, Parser};
use clap_complete::Shell;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "benchforge",
    author,
    version,
    about = "Provision ephemeral benchmark resources and tear them down"
)]
pub struct BenchForge {
    #[command(subcommand)]
    pub command: Commands,

    /// The configuration file to use
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,
}

#[derive(Debug, Parser)]
pub enum Commands {
    /// Print the pod manifest for a container VM without submitting it
    Manifest(VmArgs),

    /// Create a container VM and wait until it is running
    Up {
        #[command(flatten)]
        vm: VmArgs,

        /// Seconds to wait for the pod to run (overrides the config file)
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Delete a container VM
    Down {
        /// Pod name printed by `up`
        name: String,
    },

    /// Check whether a container VM is running
    Status {
        /// Pod name printed by `up`
        name: String,
    },

    /// Generate shell completion scripts
    Completion {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Args)]
pub struct VmArgs {
    /// Pod name (generated when omitted)
    #[arg(long)]
    pub name: Option<String>,

    /// Container image
    #[arg(long)]
    pub image: String,

    /// Number of GPUs to request
    #[arg(long, default_value_t = 0)]
    pub gpus: u32,

    /// GPU model, recorded in the resource metadata
    #[arg(long)]
    pub gpu_type: Option<String>,

    #[arg(long)]
    pub machine_type: Option<String>,

    #[arg(long)]
    pub zone: Option<String>,
}

impl VmArgs {
    pub fn to_spec(&self) -> ResourceSpec {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| unique_name("pkb"));
        let mut builder = ResourceSpec::builder(ResourceKind::ContainerVm, name)
            .image(&self.image)
            .gpus(self.gpus, self.gpu_type.clone());
        if let Some(machine_type) = &self.machine_type {
            builder = builder.machine_type(machine_type);
        }
        if let Some(zone) = &self.zone {
            builder = builder.zone(zone);
        }
        builder.build()
    }
}
