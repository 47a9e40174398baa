use std::path::PathBuf;

use chrono::NaiveDateTime;
use clap::{Args, Parser, Subcommand};

use milex::bundle::job::Scalar;
use milex::bundle::ordered::OrderedMap;
use milex::bundle::DATE_FORMAT;
use milex::config::MachineSelection;
use milex::dependency::MissingDependencyPolicy;

#[derive(Parser, Debug)]
#[command(name = "milex", version, about = "Schedule bundles of interdependent jobs on SLURM")]
pub struct Cli {
    /// Machine configuration file [default: ~/.milexconfig]
    #[arg(long, global = true, env = "MILEX_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Save a new, empty bundle
    Init {
        /// Name of the bundle
        bundle: String,
    },
    /// Save a job in a bundle, and optionally submit the bundle
    Schedule(ScheduleArgs),
    /// Submit every job of a bundle in dependency order
    Submit(SubmitArgs),
}

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// Command the job runs
    pub script: String,

    /// Bundle to save the job in [default: the script name]
    #[arg(long)]
    pub bundle: Option<String>,

    /// Name of the job [default: the script name]
    #[arg(long)]
    pub name: Option<String>,

    /// Add the job to the latest version of the bundle instead of saving a new version
    #[arg(long)]
    pub append: bool,

    /// Submit the bundle once the job is saved
    #[arg(long)]
    pub submit: bool,

    /// Jobs of the bundle that must finish successfully before this one starts
    #[arg(long, num_args = 1..)]
    pub dependencies: Vec<String>,

    /// Shell commands to run before the script
    #[arg(long, num_args = 1..)]
    pub pre_commands: Vec<String>,

    /// Script arguments as a JSON object, e.g. '{"epochs": 10, "verbose": true}'
    #[arg(long, value_name = "JSON")]
    pub args: Option<String>,

    #[command(flatten)]
    pub slurm: SlurmArgs,

    #[command(flatten)]
    pub machine: MachineArgs,

    /// What to do with dependencies on jobs outside the bundle
    #[arg(long, value_enum, default_value_t)]
    pub missing_dependencies: MissingDependencyPolicy,
}

/// SLURM resources of a scheduled job
#[derive(Args, Debug)]
pub struct SlurmArgs {
    /// Array job configuration (e.g. 1-10)
    #[arg(long)]
    pub array: Option<String>,

    /// Number of tasks to run
    #[arg(long)]
    pub tasks: Option<u32>,

    /// Number of CPUs per task
    #[arg(long)]
    pub cpus_per_task: Option<u32>,

    /// Generic resource specification (e.g. gpu:1)
    #[arg(long)]
    pub gres: Option<String>,

    /// Memory per node
    #[arg(long)]
    pub mem: Option<String>,

    /// Maximum time for the job to run (e.g. 01:00:00)
    #[arg(long)]
    pub time: String,
}

impl SlurmArgs {
    /// Resource entries in a fixed order; unset ones are kept as null
    pub fn resources(&self) -> OrderedMap<Option<Scalar>> {
        let text = |value: &Option<String>| value.as_deref().map(Scalar::from);
        let count = |value: Option<u32>| value.map(|n| Scalar::from(i64::from(n)));

        let mut resources = OrderedMap::new();
        resources.push("array", text(&self.array));
        resources.push("tasks", count(self.tasks));
        resources.push("cpus_per_task", count(self.cpus_per_task));
        resources.push("gres", text(&self.gres));
        resources.push("mem", text(&self.mem));
        resources.push("time", Some(Scalar::from(self.time.as_str())));
        resources
    }
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Name of the bundle
    pub bundle: String,

    /// Submit the bundle version nearest this date (YYYYMMDDHHMMSS) [default: latest]
    #[arg(long, value_parser = parse_date)]
    pub date: Option<NaiveDateTime>,

    /// Write the scripts without submitting them
    #[arg(long)]
    pub dry_run: bool,

    /// What to do with dependencies on jobs outside the bundle
    #[arg(long, value_enum, default_value_t)]
    pub missing_dependencies: MissingDependencyPolicy,

    #[command(flatten)]
    pub machine: MachineArgs,
}

/// Pick the target machine, or adjust the configured one
#[derive(Args, Debug, Default)]
pub struct MachineArgs {
    /// Machine from the configuration file (e.g. local, cluster)
    #[arg(long)]
    pub machine: Option<String>,

    /// Hostname of an unconfigured remote machine
    #[arg(long)]
    pub hostname: Option<String>,

    /// Username for SSH login
    #[arg(long)]
    pub username: Option<String>,

    /// Path to the SSH private key
    #[arg(long)]
    pub key_path: Option<PathBuf>,

    /// Base milex directory on the machine
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// Command activating the environment on the machine
    #[arg(long)]
    pub env_command: Option<String>,

    /// SLURM account to charge
    #[arg(long)]
    pub slurm_account: Option<String>,
}

impl From<MachineArgs> for MachineSelection {
    fn from(args: MachineArgs) -> Self {
        MachineSelection {
            machine: args.machine,
            hostname: args.hostname,
            username: args.username,
            key_path: args.key_path,
            path: args.path,
            env_command: args.env_command,
            slurm_account: args.slurm_account,
        }
    }
}

fn parse_date(value: &str) -> Result<NaiveDateTime, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, DATE_FORMAT)
}
