use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use std::sync::OnceLock;

use log::{debug, info};
use regex::Regex;

use crate::config::{Machine, Remote};
use crate::error::{MilexError, Result};

/// Submits scripts to a workload manager and moves files onto its machine
///
/// Calls block until the scheduler answers; there is no timeout or retry.
pub trait Executor {
    /// Submit a script, returning the scheduler-assigned job ID
    fn submit(&mut self, script: &Path) -> Result<String>;

    /// Copy a local file to `remote` on the target machine
    fn transfer(&mut self, local: &Path, remote: &Path) -> Result<()>;
}

impl<E: Executor + ?Sized> Executor for Box<E> {
    fn submit(&mut self, script: &Path) -> Result<String> {
        (**self).submit(script)
    }

    fn transfer(&mut self, local: &Path, remote: &Path) -> Result<()> {
        (**self).transfer(local, remote)
    }
}

/// Pick the executor for a machine: SSH if it has a hostname, local `sbatch` otherwise
pub fn for_machine(machine: &Machine) -> Box<dyn Executor> {
    match &machine.remote {
        Some(remote) => Box::new(SshExecutor::new(remote.clone())),
        None => Box::new(LocalExecutor::default()),
    }
}

/// Runs `sbatch` on this machine
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    sbatch: String,
}

impl LocalExecutor {
    /// Use a specific sbatch binary instead of the one on `PATH`
    pub fn with_sbatch(sbatch: impl Into<String>) -> Self {
        LocalExecutor { sbatch: sbatch.into() }
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        LocalExecutor::with_sbatch("sbatch")
    }
}

impl Executor for LocalExecutor {
    fn submit(&mut self, script: &Path) -> Result<String> {
        let mut sbatch = Command::new(&self.sbatch);
        let cmd = sbatch.arg(script);
        info!("Running sbatch process");
        let output = run(cmd)?;
        parse_job_id(&String::from_utf8_lossy(&output.stdout))
    }

    fn transfer(&mut self, local: &Path, remote: &Path) -> Result<()> {
        if local != remote {
            fs::copy(local, remote).map_err(MilexError::io(remote))?;
        }
        Ok(())
    }
}

/// Runs `sbatch` on a remote machine through the `ssh` and `scp` clients
#[derive(Debug, Clone)]
pub struct SshExecutor {
    remote: Remote,
}

impl SshExecutor {
    pub fn new(remote: Remote) -> Self {
        SshExecutor { remote }
    }

    fn identity_args(&self) -> Vec<String> {
        match &self.remote.key_path {
            Some(key) => vec!["-i".to_string(), key.display().to_string()],
            None => vec![],
        }
    }
}

impl Executor for SshExecutor {
    fn submit(&mut self, script: &Path) -> Result<String> {
        let mut ssh = Command::new("ssh");
        let cmd = ssh
            .args(self.identity_args())
            .arg(self.remote.destination())
            .arg(remote_sbatch(script));
        info!("Running sbatch on {}", self.remote.hostname);
        let output = run(cmd)?;
        parse_job_id(&String::from_utf8_lossy(&output.stdout))
    }

    fn transfer(&mut self, local: &Path, remote: &Path) -> Result<()> {
        let mut scp = Command::new("scp");
        let cmd = scp
            .args(self.identity_args())
            .arg(local)
            .arg(format!("{}:{}", self.remote.destination(), remote.display()));
        info!("Copying {} to {}", local.display(), self.remote.hostname);
        run(cmd)?;
        Ok(())
    }
}

/// `sbatch '<script>'` for the remote shell, with embedded single quotes escaped
fn remote_sbatch(script: &Path) -> String {
    let path = script.display().to_string().replace('\'', "'\\''");
    format!("sbatch '{path}'")
}

/// Run a command to completion; a non-zero exit is an error carrying stderr
fn run(cmd: &mut Command) -> Result<Output> {
    debug!("{:?}", cmd);
    let program = cmd.get_program().to_string_lossy().into_owned();
    let output = cmd.output().map_err(|source| MilexError::Spawn { program, source })?;
    match output.status.success() {
        true => Ok(output),
        false => Err(MilexError::CommandFailed {
            command: format!("{:?}", cmd),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }),
    }
}

/// Extract the job ID from sbatch's `Submitted batch job <id>` response
pub fn parse_job_id(response: &str) -> Result<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"Submitted batch job (\d+)").expect("valid regex"));
    pattern
        .captures(response)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| MilexError::UnparsableResponse(response.to_string()))
}
