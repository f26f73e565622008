use arcbatch_jobs::{BatchJob, JobError};
use arcbatch_runner::{
    cli::{run, run_job, CommandError, JobArgs, RunArgs},
    config::ConfigErrors,
    executors::{ExecutorError, LocalExecutor},
};
use assert_matches::assert_matches;
use std::{
    cell::RefCell,
    fs,
    io::Write,
    path::{Path, PathBuf},
    rc::Rc,
};

/// remembers every unit handed to it
struct Units(Rc<RefCell<Vec<PathBuf>>>);

impl BatchJob for Units {
    fn initialize(&mut self, _out: &mut dyn Write) -> Result<(), JobError> {
        Ok(())
    }

    fn process(&mut self, unit: &Path, out: &mut dyn Write) -> Result<bool, JobError> {
        self.0.borrow_mut().push(unit.to_path_buf());
        writeln!(out, "{}", unit.display()).map_err(JobError::Output)?;
        Ok(true)
    }

    fn finish(&mut self, _out: &mut dyn Write) -> Result<(), JobError> {
        Ok(())
    }
}

fn units() -> (Box<dyn BatchJob>, Rc<RefCell<Vec<PathBuf>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    (Box::new(Units(seen.clone())), seen)
}

/// `a.log`, `b.log`, `sub/c.log` and two files not matching `.*\.log`
fn data_tree() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    for file in ["a.log", "b.log", "sub/c.log", "notes.txt", "a.log.bak"] {
        fs::write(dir.path().join(file), "content").unwrap();
    }
    dir
}

fn log_args(root: &Path, recurse: bool) -> RunArgs {
    RunArgs {
        directories: Some(root.display().to_string()),
        recurse,
        pattern: Some(r".*\.log".into()),
        ..Default::default()
    }
}

#[test]
fn flat_walk_skips_sub_directories() {
    let data = data_tree();
    let (job, seen) = units();

    let report = run_job(&log_args(data.path(), false), job).unwrap();

    assert_eq!(
        *seen.borrow(),
        [data.path().join("a.log"), data.path().join("b.log")]
    );
    assert_eq!(report.processed, 2);
    assert_eq!(report.skipped_directories, [data.path().join("sub")]);
}

#[test]
fn recursive_walk_reaches_every_file() {
    let data = data_tree();
    let (job, seen) = units();

    let report = run_job(&log_args(data.path(), true), job).unwrap();

    assert_eq!(
        *seen.borrow(),
        [
            data.path().join("a.log"),
            data.path().join("b.log"),
            data.path().join("sub").join("c.log")
        ]
    );
    assert!(report.skipped_directories.is_empty());
}

#[test]
fn non_matching_names_never_reach_the_job() {
    let data = data_tree();
    let (job, seen) = units();

    run_job(&log_args(data.path(), true), job).unwrap();

    assert!(seen.borrow().iter().all(|unit| unit.extension().unwrap() == "log"));
}

#[test]
fn several_directories_share_one_output() {
    let first = data_tree();
    let second = data_tree();
    let results = tempfile::tempdir().unwrap();
    let output = results.path().join("out.txt");
    let (job, _) = units();

    let args = RunArgs {
        directories: Some(format!("{}#{}", first.path().display(), second.path().display())),
        output: Some(output.clone()),
        ..log_args(first.path(), false)
    };
    let report = run_job(&args, job).unwrap();

    assert_eq!(report.processed, 4);
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        format!(
            "{}\n{}\n{}\n{}\n",
            first.path().join("a.log").display(),
            first.path().join("b.log").display(),
            second.path().join("a.log").display(),
            second.path().join("b.log").display()
        )
    );
}

#[test]
fn missing_end_script_is_ignored() {
    let data = data_tree();
    let (job, _) = units();

    let args = RunArgs {
        after_run: Some(data.path().join("absent.sh")),
        ..log_args(data.path(), false)
    };

    assert_eq!(run_job(&args, job).unwrap().processed, 2);
}

#[test]
fn inaccessible_directory_fails_before_the_job_runs() {
    let data = data_tree();
    let (job, seen) = units();

    let args = log_args(&data.path().join("absent"), false);

    assert_matches!(
        run_job(&args, job),
        Err(CommandError::Usage(ConfigErrors::DirectoryNotAccessible(_)))
    );
    assert!(seen.borrow().is_empty());
}

#[test]
fn engine_is_initialized_once() {
    let mut executor = LocalExecutor::new();
    executor
        .initialize(units().0, None, None, Default::default(), false)
        .unwrap();

    assert_matches!(
        executor.initialize(units().0, None, None, Default::default(), false),
        Err(ExecutorError::Config(ConfigErrors::AlreadyInitialized))
    );

    // a finished session can be followed by a new one
    executor.shutdown().unwrap();
    executor
        .initialize(units().0, None, None, Default::default(), false)
        .unwrap();
}

#[cfg(unix)]
#[test]
fn external_job_and_end_script() {
    use std::os::unix::fs::PermissionsExt;

    let data = data_tree();
    let tools = tempfile::tempdir().unwrap();
    let job = tools.path().join("basename.sh");
    let end_script = tools.path().join("send.sh");
    let marker = tools.path().join("sent");
    let output = tools.path().join("out.txt");

    fs::write(&job, "#!/bin/sh\necho \"unit $(basename \"$1\")\"\n").unwrap();
    fs::set_permissions(&job, fs::Permissions::from_mode(0o755)).unwrap();
    fs::write(&end_script, format!("touch {}\n", marker.display())).unwrap();

    let args = RunArgs {
        job: JobArgs {
            standalone: Some(job),
            ..Default::default()
        },
        after_run: Some(end_script),
        output: Some(output.clone()),
        ..log_args(data.path(), false)
    };
    let report = run(&args).unwrap();

    assert_eq!(report.processed, 2);
    assert_eq!(fs::read_to_string(&output).unwrap(), "unit a.log\nunit b.log\n");
    assert!(marker.exists());
}
