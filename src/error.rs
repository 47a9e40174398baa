//! Crate-wide error type
//!
//! Every failure belongs to one of four categories (see [`ErrorKind`]). All of them are fatal
//! for an orchestration run; none are retried.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse error taxonomy used for reporting
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing settings, detected before any side effect
    Configuration,
    /// Malformed dependency graph, detected before any script is written
    Structural,
    /// Bundle files missing, unreadable or invalid
    Persistence,
    /// Submission or transfer failed
    Execution,
}

#[derive(Error, Debug)]
pub enum MilexError {
    #[error("job '{job}' has no 'script' entry")]
    MissingScript { job: String },

    #[error("machine '{machine}' is missing required setting '{setting}'")]
    MissingSetting { machine: String, setting: &'static str },

    #[error("no configuration found for machine '{0}'")]
    UnknownMachine(String),

    #[error("can't read configuration file {path}: {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("can't parse configuration file {path}: {source}")]
    ConfigParse { path: PathBuf, source: serde_json::Error },

    #[error("duplicate job name '{0}' in bundle")]
    DuplicateJob(String),

    #[error("dependency cycle detected involving: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    #[error("job '{job}' depends on '{dependency}' which is not part of the bundle")]
    UnknownDependency { job: String, dependency: String },

    #[error("no bundle named '{name}' found in {dir}")]
    BundleNotFound { name: String, dir: PathBuf },

    #[error("malformed bundle {path}: {reason}")]
    MalformedBundle { path: PathBuf, reason: String },

    #[error("bundle schema is invalid: {0}")]
    Schema(String),

    #[error("can't run '{program}': {source}")]
    Spawn { program: String, source: io::Error },

    #[error("'{command}' exited with {status}: {stderr}")]
    CommandFailed { command: String, status: String, stderr: String },

    #[error("unable to capture job ID from sbatch output: {0:?}")]
    UnparsableResponse(String),

    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("template error: {0}")]
    Template(#[from] tinytemplate::error::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MilexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MilexError::MissingScript { .. }
            | MilexError::MissingSetting { .. }
            | MilexError::UnknownMachine(_)
            | MilexError::ConfigRead { .. }
            | MilexError::ConfigParse { .. }
            | MilexError::Template(_) => ErrorKind::Configuration,
            MilexError::DuplicateJob(_)
            | MilexError::DependencyCycle(_)
            | MilexError::UnknownDependency { .. } => ErrorKind::Structural,
            MilexError::BundleNotFound { .. }
            | MilexError::MalformedBundle { .. }
            | MilexError::Schema(_)
            | MilexError::Io { .. }
            | MilexError::Json(_) => ErrorKind::Persistence,
            MilexError::Spawn { .. }
            | MilexError::CommandFailed { .. }
            | MilexError::UnparsableResponse(_) => ErrorKind::Execution,
        }
    }

    /// Attach a path to a bare IO error
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> MilexError {
        let path = path.into();
        move |source| MilexError::Io { path, source }
    }
}

pub type Result<T> = std::result::Result<T, MilexError>;
