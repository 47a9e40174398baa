//! Drive a bundle from disk to the scheduler
//!
//! A run moves through these states:
//!
//! ```text
//! Loading -> Resolving -> Generating -> Submitting -> Done
//!    \___________\______________\____________\______-> Failed
//! ```
//!
//! - Loading: read the bundle version nearest to the requested date
//! - Resolving: build the dependency graph and the submission order; duplicate names and cycles
//!   stop the run here, before any script exists
//! - Generating: render every script in memory, then write them all; one bad job stops the run
//!   with no script written
//! - Submitting: submit jobs one at a time in order. Each returned job ID is added to the
//!   dependency directive of the job's direct dependents, which are always later in the order
//!   and so not yet submitted
//!
//! A failed submission stops the run. Jobs already submitted stay submitted; nothing is
//! cancelled or rolled back.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use log::{error, info, warn};

use crate::bundle::Bundle;
use crate::config::Machine;
use crate::dependency::{inject_dependencies, resolve, MissingDependencyPolicy, Resolution};
use crate::error::{MilexError, Result};
use crate::slurm::{Executor, ScriptGenerator};
use crate::store::BundleStore;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Loading,
    Resolving,
    Generating,
    Submitting,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "IDLE"),
            RunState::Loading => write!(f, "LOADING"),
            RunState::Resolving => write!(f, "RESOLVING"),
            RunState::Generating => write!(f, "GENERATING"),
            RunState::Submitting => write!(f, "SUBMITTING"),
            RunState::Done => write!(f, "DONE"),
            RunState::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Pick the bundle version nearest this date; latest if None
    pub date: Option<NaiveDateTime>,
    pub missing_dependencies: MissingDependencyPolicy,
    /// Stop after writing scripts
    pub dry_run: bool,
}

/// A job accepted by the scheduler during this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub job: String,
    pub job_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub bundle: String,
    pub timestamp: NaiveDateTime,
    /// Local scripts, in submission order
    pub scripts: Vec<PathBuf>,
    /// Empty for a dry run
    pub submitted: Vec<Submission>,
}

/// Runs bundles against one target machine
pub struct Orchestrator<'a, E: Executor> {
    store: &'a BundleStore,
    machine: &'a Machine,
    scripts_dir: PathBuf,
    executor: E,
    state: RunState,
    submitted: Vec<Submission>,
}

impl<'a, E: Executor> Orchestrator<'a, E> {
    /// `scripts_dir` is the local directory generated scripts are written to
    pub fn new(store: &'a BundleStore, machine: &'a Machine, scripts_dir: impl Into<PathBuf>, executor: E) -> Self {
        Orchestrator {
            store,
            machine,
            scripts_dir: scripts_dir.into(),
            executor,
            state: RunState::Idle,
            submitted: Vec::new(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Jobs submitted by the latest run, including a failed one
    pub fn submitted(&self) -> &[Submission] {
        &self.submitted
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Load, resolve, generate and submit the bundle `name`
    pub fn run(&mut self, name: &str, options: &RunOptions) -> Result<RunReport> {
        self.submitted.clear();
        match self.drive(name, options) {
            Ok(report) => {
                self.enter(RunState::Done);
                Ok(report)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    fn drive(&mut self, name: &str, options: &RunOptions) -> Result<RunReport> {
        self.enter(RunState::Loading);
        let bundle = self.store.load(name, options.date)?;

        self.enter(RunState::Resolving);
        let resolution = resolve(&bundle, options.missing_dependencies)?;

        self.enter(RunState::Generating);
        let scripts = self.generate(&bundle)?;
        let mut report = RunReport {
            bundle: bundle.name.clone(),
            timestamp: bundle.timestamp,
            scripts: resolution.order.iter().filter_map(|job| scripts.get(job).cloned()).collect(),
            submitted: Vec::new(),
        };
        if options.dry_run {
            info!("Dry run, not submitting {} scripts", scripts.len());
            return Ok(report);
        }

        self.enter(RunState::Submitting);
        self.submit_all(&resolution, &scripts)?;
        report.submitted = self.submitted.clone();
        Ok(report)
    }

    /// Render every job first so a bad job leaves no scripts behind, then write them all
    fn generate(&self, bundle: &Bundle) -> Result<HashMap<String, PathBuf>> {
        let generator = ScriptGenerator::new(self.machine, &self.scripts_dir)?;
        let mut rendered = Vec::with_capacity(bundle.jobs.len());
        for (name, job) in bundle.jobs.iter() {
            rendered.push((name, generator.render(job)?));
        }

        let mut scripts = HashMap::with_capacity(rendered.len());
        for (name, content) in rendered {
            let path = generator.write_rendered(name, bundle.timestamp, &content)?;
            scripts.insert(name.to_string(), path);
        }
        Ok(scripts)
    }

    fn submit_all(&mut self, resolution: &Resolution, scripts: &HashMap<String, PathBuf>) -> Result<()> {
        for name in &resolution.order {
            let Some(script) = scripts.get(name) else { continue };
            let job_id = self.submit(script)?;
            info!("Submitted job {name} with ID {job_id} on {}", self.machine.name);
            self.submitted.push(Submission { job: name.clone(), job_id: job_id.clone() });

            for dependent in resolution.graph.dependents_of(name) {
                if let Some(dependent_script) = scripts.get(dependent) {
                    inject_dependencies(dependent_script, std::slice::from_ref(&job_id))?;
                }
            }
        }
        Ok(())
    }

    /// Submit one local script, copying it to the target machine first if that machine is remote
    fn submit(&mut self, script: &Path) -> Result<String> {
        if !self.machine.is_remote() {
            return self.executor.submit(script);
        }
        let file_name = script.file_name().ok_or_else(|| MilexError::Io {
            path: script.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "script path has no file name"),
        })?;
        let remote = self.machine.script_dir().join(file_name);
        self.executor.transfer(script, &remote)?;
        self.executor.submit(&remote)
    }

    fn enter(&mut self, state: RunState) {
        info!("{} -> {}", self.state, state);
        self.state = state;
    }

    fn fail(&mut self, err: &MilexError) {
        error!("Run failed during {}: {}", self.state, err);
        if !self.submitted.is_empty() {
            let jobs: Vec<String> =
                self.submitted.iter().map(|s| format!("{} ({})", s.job, s.job_id)).collect();
            warn!("Already submitted and left running: {}", jobs.join(", "));
        }
        self.enter(RunState::Failed);
    }
}
