use std::fs;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use log::info;
use serde::Serialize;
use tinytemplate::TinyTemplate;

use crate::bundle::job::{ArgValue, Job, Scalar};
use crate::config::Machine;
use crate::error::{MilexError, Result};
use crate::store::VersionedStore;

/// Renders jobs into sbatch submission scripts for one target machine
///
/// A script is made of two parts, written in this order:
/// - the header: shebang, `#SBATCH` directives, `$MILEX` export, environment activation and
///   pre-commands (rendered from `data/templates/header.txt`)
/// - the main command: the job's script followed by its arguments, one per line, joined with
///   line continuations
///
/// Rendering is deterministic: the same job and machine always give the same bytes.
pub struct ScriptGenerator<'m> {
    machine: &'m Machine,
    scripts: VersionedStore,
    templates: TinyTemplate<'static>,
}

/// Rendering context for the header
#[derive(Serialize)]
struct HeaderContext {
    account: Option<String>,
    output: String,
    name: String,
    directives: Vec<Directive>,
    path: String,
    env_command: Option<String>,
    pre_commands: Vec<String>,
}

/// One `#SBATCH --key=value` resource line
#[derive(Serialize)]
struct Directive {
    key: String,
    value: String,
}

impl<'m> ScriptGenerator<'m> {
    /// `scripts_dir` is the local directory scripts are written to
    pub fn new(machine: &'m Machine, scripts_dir: impl Into<PathBuf>) -> Result<Self> {
        /// included header template
        static HEADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/data/templates/header.txt"));
        let mut templates = TinyTemplate::new();
        // shell scripts, not HTML
        templates.set_default_formatter(&tinytemplate::format_unescaped);
        templates.add_template("header", HEADER)?;

        Ok(ScriptGenerator { machine, scripts: VersionedStore::new(scripts_dir, "sh"), templates })
    }

    /// Local path of the script for a job of a bundle stamped `timestamp`
    pub fn path_for(&self, job_name: &str, timestamp: NaiveDateTime) -> PathBuf {
        self.scripts.path_for(job_name, timestamp)
    }

    /// Script file name, identical locally and on a remote machine
    pub fn file_name(&self, job_name: &str, timestamp: NaiveDateTime) -> String {
        self.scripts.file_name(job_name, timestamp)
    }

    /// Render the complete script text for a job
    ///
    /// Fails if the job has no script to run.
    pub fn render(&self, job: &Job) -> Result<String> {
        let script = job
            .script
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| MilexError::MissingScript { job: job.name.clone() })?;

        let mut content = self.render_header(job)?;
        content.push_str(&render_command(script, job));
        Ok(content)
    }

    /// Render and write a job's script, replacing any previous version for the same timestamp
    pub fn write(&self, job: &Job, timestamp: NaiveDateTime) -> Result<PathBuf> {
        let content = self.render(job)?;
        self.write_rendered(&job.name, timestamp, &content)
    }

    pub(crate) fn write_rendered(&self, job_name: &str, timestamp: NaiveDateTime, content: &str) -> Result<PathBuf> {
        let dir = self.scripts.dir();
        fs::create_dir_all(dir).map_err(MilexError::io(dir))?;
        let path = self.path_for(job_name, timestamp);
        fs::write(&path, content).map_err(MilexError::io(&path))?;
        info!("Saved script for job {} to {}", job_name, path.display());
        Ok(path)
    }

    fn render_header(&self, job: &Job) -> Result<String> {
        let directives = job
            .resources
            .iter()
            .filter_map(|(key, value)| {
                value.as_ref().map(|value| Directive { key: key.replace('_', "-"), value: value.to_string() })
            })
            .collect();

        let context = HeaderContext {
            account: self.machine.slurm_account.clone(),
            output: self.machine.script_dir().join("%x-%j.out").display().to_string(),
            name: job.name.clone(),
            directives,
            path: self.machine.path.display().to_string(),
            env_command: self.machine.env_command.clone(),
            pre_commands: job.pre_commands.clone().unwrap_or_default(),
        };

        Ok(self.templates.render("header", &context)?)
    }
}

/// Main command line and its arguments
///
/// Every line but the last ends with ` \` so the shell reads a single command.
fn render_command(script: &str, job: &Job) -> String {
    let mut lines = vec![script.to_string()];
    for (key, value) in job.args.iter() {
        lines.extend(argument_lines(key, value));
    }
    let mut command = lines.join(" \\\n");
    command.push('\n');
    command
}

fn argument_lines(key: &str, value: &ArgValue) -> Vec<String> {
    match value {
        ArgValue::Null | ArgValue::Flag(false) => vec![],
        ArgValue::Flag(true) => vec![format!("  --{key}")],
        ArgValue::Number(n) => vec![format!("  --{key}={n}")],
        ArgValue::Text(s) => vec![format!("  --{key}={s}")],
        ArgValue::List(items) if items.iter().all(Scalar::is_numeric) => {
            let values: Vec<String> = items.iter().map(Scalar::to_string).collect();
            match values.is_empty() {
                true => vec![format!("  --{key}")],
                false => vec![format!("  --{key} {}", values.join(" "))],
            }
        }
        ArgValue::List(items) => std::iter::once(format!("  --{key}"))
            .chain(items.iter().map(|item| format!("    {item}")))
            .collect(),
    }
}
