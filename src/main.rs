mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::info;

use milex::bundle::job::{ArgValue, Job};
use milex::bundle::ordered::OrderedMap;
use milex::config::{default_config_path, Config, MachineSelection, Workspace};
use milex::orchestrator::{Orchestrator, RunOptions};
use milex::slurm::executor;
use milex::store::BundleStore;

use crate::cli::{Cli, Commands, ScheduleArgs};

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("milex {} starting", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = Config::load(&config_path)?;
    let workspace = config.workspace().context("The configuration needs a 'local' machine with a path")?;
    let store = BundleStore::new(workspace.jobs_dir())?;

    match cli.command {
        Commands::Init { bundle } => {
            store.save(&bundle, Vec::new()).with_context(|| format!("Saving bundle {bundle}"))?;
        }
        Commands::Schedule(args) => schedule(&config, &workspace, &store, args)?,
        Commands::Submit(args) => {
            let options = RunOptions {
                date: args.date,
                missing_dependencies: args.missing_dependencies,
                dry_run: args.dry_run,
            };
            submit(&config, &workspace, &store, &args.bundle, args.machine.into(), &options)?;
        }
    }

    Ok(())
}

fn schedule(config: &Config, workspace: &Workspace, store: &BundleStore, args: ScheduleArgs) -> Result<()> {
    let script_args: OrderedMap<ArgValue> = match &args.args {
        Some(json) => serde_json::from_str(json).context("--args must be a JSON object of scalars or lists")?,
        None => OrderedMap::new(),
    };

    let bundle = args.bundle.clone().unwrap_or_else(|| args.script.clone());
    let mut job = Job::new(args.name.clone().unwrap_or_else(|| args.script.clone()), args.script.clone());
    job.args = script_args;
    job.resources = args.slurm.resources();
    if !args.dependencies.is_empty() {
        job = job.depends_on(args.dependencies);
    }
    for command in args.pre_commands {
        job = job.pre_command(command);
    }

    let saved = match args.append {
        true => store.append(&bundle, vec![job]),
        false => store.save(&bundle, vec![job]),
    };
    saved.with_context(|| format!("Saving job in bundle {bundle}"))?;

    if args.submit {
        let options = RunOptions { missing_dependencies: args.missing_dependencies, ..RunOptions::default() };
        submit(config, workspace, store, &bundle, args.machine.into(), &options)?;
    }
    Ok(())
}

fn submit(
    config: &Config,
    workspace: &Workspace,
    store: &BundleStore,
    bundle: &str,
    selection: MachineSelection,
    options: &RunOptions,
) -> Result<()> {
    let machine = config.select(&selection)?;
    info!("Submitting bundle {bundle} to machine {}", machine.name);

    let mut orchestrator = Orchestrator::new(store, &machine, workspace.scripts_dir(), executor::for_machine(&machine));
    let report = orchestrator.run(bundle, options).with_context(|| format!("Running bundle {bundle}"))?;

    for submission in &report.submitted {
        println!("{}\t{}", submission.job, submission.job_id);
    }
    Ok(())
}
