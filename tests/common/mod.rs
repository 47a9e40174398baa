#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Once;

use chrono::{NaiveDate, NaiveDateTime};
use tempfile::TempDir;

use milex::config::{Machine, Workspace};
use milex::error::{MilexError, Result};
use milex::slurm::Executor;
use milex::store::BundleStore;

static INIT: Once = Once::new();

/// Initialise logging for tests; output shows for failing tests only
///
/// Enable levels with e.g. `RUST_LOG=debug cargo test`
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .is_test(true)
            .try_init();
    });
}

pub fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(hour, minute, second).unwrap()
}

/// A local workspace in a temporary directory
pub struct TestWorkspace {
    _dir: TempDir,
    pub workspace: Workspace,
    pub store: BundleStore,
}

impl TestWorkspace {
    pub fn new() -> Self {
        init_logging();
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        let store = BundleStore::new(workspace.jobs_dir()).unwrap();
        TestWorkspace { _dir: dir, workspace, store }
    }

    /// A local machine rooted at the workspace
    pub fn local_machine(&self) -> Machine {
        Machine::local(self.workspace.root.clone())
    }

    /// Generated scripts, sorted by file name
    pub fn scripts(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.workspace.scripts_dir()) else { return Vec::new() };
        let mut scripts: Vec<PathBuf> = entries.map(|entry| entry.unwrap().path()).collect();
        scripts.sort();
        scripts
    }
}

/// One call to [`FakeExecutor::submit`], with the script as it was when submitted
#[derive(Debug, Clone)]
pub struct SubmitCall {
    pub script: PathBuf,
    pub content: String,
    pub job_id: String,
}

/// Records submissions and hands out increasing job IDs starting at 1000
///
/// Transferred files are kept in memory, keyed by remote path, so remote submissions can be
/// inspected without a second filesystem.
#[derive(Debug, Default)]
pub struct FakeExecutor {
    pub submissions: Vec<SubmitCall>,
    pub transfers: Vec<(PathBuf, PathBuf)>,
    remote_files: HashMap<PathBuf, String>,
    /// Fail the submission with this index (0-based)
    fail_at: Option<usize>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        FakeExecutor::default()
    }

    pub fn failing_at(index: usize) -> Self {
        FakeExecutor { fail_at: Some(index), ..FakeExecutor::default() }
    }

    /// Job names in submission order, read from each script's `--job-name` directive
    pub fn submitted_jobs(&self) -> Vec<String> {
        self.submissions.iter().map(|call| job_name(&call.content)).collect()
    }

    pub fn content_of(&self, job: &str) -> &str {
        &self
            .submissions
            .iter()
            .find(|call| job_name(&call.content) == job)
            .unwrap_or_else(|| panic!("{job} was not submitted"))
            .content
    }
}

impl Executor for FakeExecutor {
    fn submit(&mut self, script: &Path) -> Result<String> {
        if self.fail_at == Some(self.submissions.len()) {
            return Err(MilexError::CommandFailed {
                command: format!("sbatch {}", script.display()),
                status: "exit status: 1".to_string(),
                stderr: "sbatch: error: Batch job submission failed".to_string(),
            });
        }

        let content = match self.remote_files.get(script) {
            Some(content) => content.clone(),
            None => fs::read_to_string(script).map_err(|source| MilexError::Io { path: script.into(), source })?,
        };
        let job_id = (1000 + self.submissions.len()).to_string();
        self.submissions.push(SubmitCall { script: script.to_path_buf(), content, job_id: job_id.clone() });
        Ok(job_id)
    }

    fn transfer(&mut self, local: &Path, remote: &Path) -> Result<()> {
        let content = fs::read_to_string(local).map_err(|source| MilexError::Io { path: local.into(), source })?;
        self.remote_files.insert(remote.to_path_buf(), content);
        self.transfers.push((local.to_path_buf(), remote.to_path_buf()));
        Ok(())
    }
}

fn job_name(script: &str) -> String {
    script
        .lines()
        .find_map(|line| line.strip_prefix("#SBATCH --job-name="))
        .unwrap_or_default()
        .to_string()
}
