//! Machine configuration
//!
//! The configuration file (`~/.milexconfig` by default) is a JSON object of machine name ->
//! machine settings. It is read once and the selected [`Machine`] is handed to the store, the
//! script generator and the orchestrator.
//!
//! ```json
//! {
//!     "local": {"path": "/home/me/milex", "env_command": "source venv/bin/activate"},
//!     "cluster": {"hostname": "login.cluster.org", "username": "me", "key_path": "~/.ssh/id_rsa",
//!                 "path": "/scratch/me/milex", "slurm_account": "def-me"}
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{MilexError, Result};

/// Name of the machine that owns the local workspace
pub const LOCAL: &str = "local";

/// Settings of one machine, as written in the configuration file
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MachineConfig {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub env_command: Option<String>,
    #[serde(default)]
    pub slurm_account: Option<String>,
}

/// SSH coordinates of a remote machine
#[derive(Debug, Clone, PartialEq)]
pub struct Remote {
    pub hostname: String,
    pub username: Option<String>,
    pub key_path: Option<PathBuf>,
}

impl Remote {
    /// `user@host`, or just `host` when no username is configured
    pub fn destination(&self) -> String {
        match &self.username {
            Some(user) => format!("{user}@{}", self.hostname),
            None => self.hostname.clone(),
        }
    }
}

/// A validated machine: where scripts run and how they're prepared
#[derive(Debug, Clone, PartialEq)]
pub struct Machine {
    pub name: String,
    /// Base milex directory on the machine, exported as `$MILEX` in every script
    pub path: PathBuf,
    pub env_command: Option<String>,
    pub slurm_account: Option<String>,
    /// None for a machine that submits with a local `sbatch`
    pub remote: Option<Remote>,
}

impl Machine {
    /// A local machine with only a base path
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Machine { name: LOCAL.to_string(), path: path.into(), env_command: None, slurm_account: None, remote: None }
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Directory holding submission scripts and scheduler output on this machine
    pub fn script_dir(&self) -> PathBuf {
        self.path.join("slurm")
    }
}

impl MachineConfig {
    fn validate(&self, name: &str) -> Result<Machine> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| MilexError::MissingSetting { machine: name.to_string(), setting: "path" })?;
        let remote = self.hostname.as_ref().map(|hostname| Remote {
            hostname: hostname.clone(),
            username: self.username.clone(),
            key_path: self.key_path.as_deref().map(expand_home),
        });
        Ok(Machine {
            name: name.to_string(),
            path,
            env_command: self.env_command.clone().filter(|s| !s.is_empty()),
            slurm_account: self.slurm_account.clone().filter(|s| !s.is_empty()),
            remote,
        })
    }
}

/// Command line choices that pick or adjust the target machine
#[derive(Debug, Clone, Default)]
pub struct MachineSelection {
    /// A machine named in the configuration file
    pub machine: Option<String>,
    /// Build an ad-hoc remote machine instead
    pub hostname: Option<String>,
    pub username: Option<String>,
    pub key_path: Option<PathBuf>,
    /// Overrides applied to whichever machine is selected
    pub path: Option<PathBuf>,
    pub env_command: Option<String>,
    pub slurm_account: Option<String>,
}

/// Local directory layout: `jobs/` for bundles, `slurm/` for generated scripts
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Workspace { root: root.into() }
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join("jobs")
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join("slurm")
    }
}

/// All configured machines
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Config {
    machines: BTreeMap<String, MachineConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Reading configuration {}", path.display());
        let text = fs::read_to_string(path)
            .map_err(|source| MilexError::ConfigRead { path: path.to_path_buf(), source })?;
        serde_json::from_str(&text).map_err(|source| MilexError::ConfigParse { path: path.to_path_buf(), source })
    }

    pub fn with_machine(mut self, name: impl Into<String>, machine: MachineConfig) -> Self {
        self.machines.insert(name.into(), machine);
        self
    }

    /// The local workspace, rooted at the `local` machine's path
    pub fn workspace(&self) -> Result<Workspace> {
        let local = self.machine(LOCAL)?;
        Ok(Workspace::new(local.path))
    }

    /// A machine from the configuration file, by name
    pub fn machine(&self, name: &str) -> Result<Machine> {
        self.machines
            .get(name)
            .ok_or_else(|| MilexError::UnknownMachine(name.to_string()))?
            .validate(name)
    }

    /// Resolve the target machine: named machine, else ad-hoc remote, else `local`
    ///
    /// `path`, `env_command` and `slurm_account` from the selection override the configured
    /// values.
    pub fn select(&self, selection: &MachineSelection) -> Result<Machine> {
        let (name, mut settings) = match (&selection.machine, &selection.hostname) {
            (Some(name), _) => (
                name.clone(),
                self.machines.get(name).cloned().ok_or_else(|| MilexError::UnknownMachine(name.clone()))?,
            ),
            (None, Some(hostname)) => (
                hostname.clone(),
                MachineConfig {
                    hostname: Some(hostname.clone()),
                    username: selection.username.clone(),
                    key_path: selection.key_path.clone(),
                    ..MachineConfig::default()
                },
            ),
            (None, None) => (
                LOCAL.to_string(),
                self.machines.get(LOCAL).cloned().ok_or_else(|| MilexError::UnknownMachine(LOCAL.to_string()))?,
            ),
        };

        if let Some(path) = &selection.path {
            settings.path = Some(path.clone());
        }
        if let Some(env_command) = &selection.env_command {
            settings.env_command = Some(env_command.clone());
        }
        if let Some(account) = &selection.slurm_account {
            settings.slurm_account = Some(account.clone());
        }

        settings.validate(&name)
    }
}

/// `~/.milexconfig`
pub fn default_config_path() -> PathBuf {
    expand_home(Path::new("~/.milexconfig"))
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
