//! Schedule bundles of interdependent jobs on SLURM
//!
//! A bundle is a versioned JSON document of named jobs. Running a bundle loads it from the
//! [`store`], orders its jobs with the [`dependency`] resolver, renders one sbatch script per job
//! with [`slurm::ScriptGenerator`] and submits them one at a time through an
//! [`slurm::Executor`]. Each scheduler job ID is written into the scripts of the jobs that wait
//! on it before they are submitted. [`orchestrator::Orchestrator`] drives the whole run.

pub mod bundle;
pub mod config;
pub mod dependency;
pub mod error;
pub mod orchestrator;
pub mod slurm;
pub mod store;

pub use error::{ErrorKind, MilexError, Result};
