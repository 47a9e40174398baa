mod common;

use std::fs;
use std::path::PathBuf;

use milex::bundle::job::Job;
use milex::config::{Machine, Remote};
use milex::dependency::MissingDependencyPolicy;
use milex::error::ErrorKind;
use milex::orchestrator::{Orchestrator, RunOptions, RunState, Submission};

use crate::common::{at, FakeExecutor, TestWorkspace};

fn abc() -> Vec<Job> {
    vec![
        Job::new("JobC", "run_job_c").depends_on(["JobA", "JobB"]),
        Job::new("JobA", "run_job_a").arg("p", "v"),
        Job::new("JobB", "run_job_b").depends_on(["JobA"]),
    ]
}

#[test]
fn upstream_ids_reach_dependents_before_they_are_submitted() {
    let ws = TestWorkspace::new();
    ws.store.save_at("abc", abc(), at(12, 0, 0)).unwrap();
    let machine = ws.local_machine();

    let mut orchestrator = Orchestrator::new(&ws.store, &machine, ws.workspace.scripts_dir(), FakeExecutor::new());
    let report = orchestrator.run("abc", &RunOptions::default()).unwrap();

    assert_eq!(orchestrator.state(), RunState::Done);
    let executor = orchestrator.executor();
    assert_eq!(executor.submitted_jobs(), vec!["JobA", "JobB", "JobC"]);

    assert!(!executor.content_of("JobA").contains("--dependency"));
    assert_eq!(executor.content_of("JobB").lines().nth(1), Some("#SBATCH --dependency=afterok:1000"));
    assert_eq!(executor.content_of("JobC").lines().nth(1), Some("#SBATCH --dependency=afterok:1000:1001"));

    let expected = |job: &str, id: &str| Submission { job: job.to_string(), job_id: id.to_string() };
    assert_eq!(report.submitted, vec![expected("JobA", "1000"), expected("JobB", "1001"), expected("JobC", "1002")]);
    assert_eq!(orchestrator.submitted(), report.submitted.as_slice());
    assert_eq!(report.scripts[0], ws.workspace.scripts_dir().join("JobA_20240301120000.sh"));
}

#[test]
fn generated_script_for_a_single_job() {
    let ws = TestWorkspace::new();
    let job = Job::new("run_job_a", "run_job_a").arg("p", "v").resource("time", "01:00:00");
    ws.store.save_at("single", vec![job], at(8, 30, 0)).unwrap();
    let machine = Machine { env_command: Some("source e".into()), ..Machine::local("/m") };

    let mut orchestrator = Orchestrator::new(&ws.store, &machine, ws.workspace.scripts_dir(), FakeExecutor::new());
    orchestrator.run("single", &RunOptions::default()).unwrap();

    let script = orchestrator.executor().content_of("run_job_a");
    assert!(script.starts_with("#!/bin/bash\n"));
    assert!(script.contains("#SBATCH --time=01:00:00\n"));
    assert!(script.contains("export MILEX=\"/m\"\n"));
    assert!(script.contains("\nsource e\n"));
    assert!(script.ends_with("run_job_a \\\n  --p=v\n"));
}

#[test]
fn cycle_stops_the_run_before_any_script_exists() {
    let ws = TestWorkspace::new();
    let jobs = vec![
        Job::new("free", "f"),
        Job::new("x", "x").depends_on(["y"]),
        Job::new("y", "y").depends_on(["x"]),
    ];
    ws.store.save_at("cyclic", jobs, at(9, 0, 0)).unwrap();
    let machine = ws.local_machine();

    let mut orchestrator = Orchestrator::new(&ws.store, &machine, ws.workspace.scripts_dir(), FakeExecutor::new());
    let err = orchestrator.run("cyclic", &RunOptions::default()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Structural);
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert!(ws.scripts().is_empty());
    assert!(orchestrator.executor().submissions.is_empty());
}

#[test]
fn duplicate_job_names_stop_the_run() {
    let ws = TestWorkspace::new();
    let jobs_dir = ws.workspace.jobs_dir();
    fs::create_dir_all(&jobs_dir).unwrap();
    fs::write(
        jobs_dir.join("dup_20240301090000.json"),
        r#"{"JobA": {"script": "a"}, "JobA": {"script": "b"}}"#,
    )
    .unwrap();
    let machine = ws.local_machine();

    let mut orchestrator = Orchestrator::new(&ws.store, &machine, ws.workspace.scripts_dir(), FakeExecutor::new());
    let err = orchestrator.run("dup", &RunOptions::default()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Structural);
    assert!(ws.scripts().is_empty());
}

#[test]
fn job_without_script_leaves_no_partial_scripts() {
    let ws = TestWorkspace::new();
    let jobs_dir = ws.workspace.jobs_dir();
    fs::create_dir_all(&jobs_dir).unwrap();
    fs::write(
        jobs_dir.join("partial_20240301090000.json"),
        r#"{"JobA": {"script": "run_job_a"}, "JobB": {"args": {"p": "v"}, "dependencies": ["JobA"]}}"#,
    )
    .unwrap();
    let machine = ws.local_machine();

    let mut orchestrator = Orchestrator::new(&ws.store, &machine, ws.workspace.scripts_dir(), FakeExecutor::new());
    let err = orchestrator.run("partial", &RunOptions::default()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert!(ws.scripts().is_empty());
    assert!(orchestrator.executor().submissions.is_empty());
}

#[test]
fn null_or_empty_script_is_a_configuration_error() {
    let ws = TestWorkspace::new();
    let jobs_dir = ws.workspace.jobs_dir();
    fs::create_dir_all(&jobs_dir).unwrap();
    fs::write(jobs_dir.join("null_20240301090000.json"), r#"{"A": {"script": null}}"#).unwrap();
    fs::write(jobs_dir.join("empty_20240301090000.json"), r#"{"A": {"script": ""}}"#).unwrap();
    let machine = ws.local_machine();

    for name in ["null", "empty"] {
        let mut orchestrator =
            Orchestrator::new(&ws.store, &machine, ws.workspace.scripts_dir(), FakeExecutor::new());
        let err = orchestrator.run(name, &RunOptions::default()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Configuration, "{name}: {err}");
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert!(orchestrator.executor().submissions.is_empty());
    }
    assert!(ws.scripts().is_empty());
}

#[test]
fn failed_submission_stops_remaining_jobs() {
    let ws = TestWorkspace::new();
    let jobs = vec![
        Job::new("A", "a"),
        Job::new("B", "b").depends_on(["A"]),
        Job::new("C", "c").depends_on(["B"]),
    ];
    ws.store.save_at("chain", jobs, at(10, 0, 0)).unwrap();
    let machine = ws.local_machine();

    let mut orchestrator =
        Orchestrator::new(&ws.store, &machine, ws.workspace.scripts_dir(), FakeExecutor::failing_at(1));
    let err = orchestrator.run("chain", &RunOptions::default()).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Execution);
    assert_eq!(orchestrator.state(), RunState::Failed);
    assert_eq!(orchestrator.submitted(), [Submission { job: "A".into(), job_id: "1000".into() }]);
    assert_eq!(orchestrator.executor().submitted_jobs(), vec!["A"]);

    let scripts = ws.workspace.scripts_dir();
    let b = fs::read_to_string(scripts.join("B_20240301100000.sh")).unwrap();
    let c = fs::read_to_string(scripts.join("C_20240301100000.sh")).unwrap();
    assert!(b.contains("#SBATCH --dependency=afterok:1000\n"));
    assert!(!c.contains("--dependency"));
}

#[test]
fn remote_machine_gets_scripts_copied_before_submission() {
    let ws = TestWorkspace::new();
    let jobs = vec![Job::new("A", "a"), Job::new("B", "b").depends_on(["A"])];
    ws.store.save_at("remote", jobs, at(11, 0, 0)).unwrap();
    let machine = Machine {
        name: "cluster".into(),
        slurm_account: Some("def-me".into()),
        remote: Some(Remote { hostname: "login.example.org".into(), username: Some("me".into()), key_path: None }),
        ..Machine::local("/scratch/me/milex")
    };

    let mut orchestrator = Orchestrator::new(&ws.store, &machine, ws.workspace.scripts_dir(), FakeExecutor::new());
    orchestrator.run("remote", &RunOptions::default()).unwrap();

    let executor = orchestrator.executor();
    let remote_a = PathBuf::from("/scratch/me/milex/slurm/A_20240301110000.sh");
    let remote_b = PathBuf::from("/scratch/me/milex/slurm/B_20240301110000.sh");
    assert_eq!(
        executor.transfers,
        vec![
            (ws.workspace.scripts_dir().join("A_20240301110000.sh"), remote_a.clone()),
            (ws.workspace.scripts_dir().join("B_20240301110000.sh"), remote_b.clone()),
        ]
    );
    let submitted: Vec<&PathBuf> = executor.submissions.iter().map(|call| &call.script).collect();
    assert_eq!(submitted, vec![&remote_a, &remote_b]);

    let b = executor.content_of("B");
    assert!(b.contains("#SBATCH --dependency=afterok:1000\n"));
    assert!(b.contains("#SBATCH --account=def-me\n"));
    assert!(b.contains("#SBATCH --output=/scratch/me/milex/slurm/%x-%j.out\n"));
    assert!(b.contains("export MILEX=\"/scratch/me/milex\"\n"));
}

#[test]
fn dry_run_writes_scripts_without_submitting() {
    let ws = TestWorkspace::new();
    ws.store.save_at("abc", abc(), at(12, 0, 0)).unwrap();
    let machine = ws.local_machine();
    let options = RunOptions { dry_run: true, ..RunOptions::default() };

    let mut orchestrator = Orchestrator::new(&ws.store, &machine, ws.workspace.scripts_dir(), FakeExecutor::new());
    let report = orchestrator.run("abc", &options).unwrap();

    assert_eq!(orchestrator.state(), RunState::Done);
    assert!(report.submitted.is_empty());
    assert!(orchestrator.executor().submissions.is_empty());
    assert_eq!(ws.scripts().len(), 3);
    let order: Vec<String> = report
        .scripts
        .iter()
        .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(order, vec!["JobA_20240301120000.sh", "JobB_20240301120000.sh", "JobC_20240301120000.sh"]);
}

#[test]
fn dependencies_outside_the_bundle_follow_the_policy() {
    let ws = TestWorkspace::new();
    let jobs = vec![Job::new("B", "b").depends_on(["elsewhere"]), Job::new("C", "c")];
    ws.store.save_at("open", jobs, at(13, 0, 0)).unwrap();
    let machine = ws.local_machine();

    let mut orchestrator = Orchestrator::new(&ws.store, &machine, ws.workspace.scripts_dir(), FakeExecutor::new());
    orchestrator.run("open", &RunOptions::default()).unwrap();
    assert_eq!(orchestrator.executor().submitted_jobs(), vec!["B", "C"]);
    assert!(!orchestrator.executor().content_of("B").contains("--dependency"));

    let strict = RunOptions { missing_dependencies: MissingDependencyPolicy::Error, ..RunOptions::default() };
    let mut orchestrator = Orchestrator::new(&ws.store, &machine, ws.workspace.scripts_dir(), FakeExecutor::new());
    let err = orchestrator.run("open", &strict).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Structural);
    assert!(orchestrator.executor().submissions.is_empty());
}

#[test]
fn runs_the_version_nearest_the_requested_date() {
    let ws = TestWorkspace::new();
    ws.store.save_at("versions", vec![Job::new("early", "e")], at(1, 0, 0)).unwrap();
    ws.store.save_at("versions", vec![Job::new("late", "l")], at(5, 0, 0)).unwrap();
    let machine = ws.local_machine();

    let options = RunOptions { date: Some(at(2, 0, 0)), ..RunOptions::default() };
    let mut orchestrator = Orchestrator::new(&ws.store, &machine, ws.workspace.scripts_dir(), FakeExecutor::new());
    let report = orchestrator.run("versions", &options).unwrap();
    assert_eq!(report.timestamp, at(1, 0, 0));
    assert_eq!(orchestrator.executor().submitted_jobs(), vec!["early"]);

    let mut orchestrator = Orchestrator::new(&ws.store, &machine, ws.workspace.scripts_dir(), FakeExecutor::new());
    orchestrator.run("versions", &RunOptions::default()).unwrap();
    assert_eq!(orchestrator.executor().submitted_jobs(), vec!["late"]);
}

#[test]
fn unknown_bundle_is_a_persistence_error() {
    let ws = TestWorkspace::new();
    let machine = ws.local_machine();

    let mut orchestrator = Orchestrator::new(&ws.store, &machine, ws.workspace.scripts_dir(), FakeExecutor::new());
    let err = orchestrator.run("missing", &RunOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(orchestrator.state(), RunState::Failed);
}
