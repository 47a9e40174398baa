//! Render jobs into SLURM submission scripts and submit them

/// Render job scripts from the header template and the job's arguments
pub mod script;

/// Submit scripts with sbatch, locally or over SSH
pub mod executor;

pub use executor::{Executor, LocalExecutor, SshExecutor};
pub use script::ScriptGenerator;
