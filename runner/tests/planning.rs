use arcbatch_jobs::JobSpec;
use arcbatch_runner::{
    cli::{plan, Cli, Commands, CommandError, JobArgs, PlanArgs},
    config::{ConfigErrors, MachineConfig, MachineSettings, Settings},
    distributed::{machine::MachineDescriptor, Deployment, Distributor},
};
use assert_matches::assert_matches;
use clap::Parser;
use std::{
    fs,
    path::{Path, PathBuf},
};

struct Fixture {
    dir: tempfile::TempDir,
    package: PathBuf,
    job: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let package = dir.path().join("arcbatch");
        let job = dir.path().join("mimesize");
        fs::write(&package, "").unwrap();
        fs::write(&job, "").unwrap();

        Self { dir, package, job }
    }

    fn scripts(&self) -> PathBuf {
        self.dir.path().join("scripts")
    }

    fn settings(&self, body: &str) -> PathBuf {
        let path = self.dir.path().join("batch.yaml");
        fs::write(
            &path,
            format!(
                "settings:\n  script-dir: {}\n  local-os: linux\n  host: coordinator\n{body}",
                self.scripts().display()
            ),
        )
        .unwrap();
        path
    }

    fn plan_args(&self, settings: PathBuf) -> PlanArgs {
        PlanArgs {
            settings: Some(settings),
            batch_package: Some(self.package.clone()),
            job: JobArgs {
                standalone: Some(self.job.clone()),
                ..Default::default()
            },
        }
    }
}

const NODES: &str = "\
machines:
  - name: node1
    directories: [/srv/arcs]
    install-dir: /home/batch/run
  - name: winbox
    os: windows
    directories: ['D:\\arcs']
    install-dir: 'C:\\batch'
    settings:
      output-file: /results/win.txt
";

#[test]
fn nothing_to_run_creates_nothing() {
    let fixture = Fixture::new();
    let settings = fixture.settings("");

    assert_matches!(
        plan(&fixture.plan_args(settings)),
        Err(CommandError::Usage(ConfigErrors::NothingToRun))
    );
    assert!(!fixture.scripts().exists());
}

#[test]
fn machine_without_result_files_gets_empty_send_script() {
    let fixture = Fixture::new();
    let settings = fixture.settings(NODES);

    let report = plan(&fixture.plan_args(settings)).unwrap();

    let send = fixture.scripts().join("node1").join("send.sh");
    assert!(send.is_file());
    assert_eq!(fs::read_to_string(send).unwrap(), "");
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("node1"));

    let windows_send = fs::read_to_string(fixture.scripts().join("winbox").join("send.bat")).unwrap();
    assert!(windows_send.contains("win.txt"));
}

#[test]
fn regenerated_scripts_are_identical() {
    let fixture = Fixture::new();
    let settings = fixture.settings(&format!(
        "directories: [{}]\n{NODES}",
        fixture.dir.path().display()
    ));

    let mut distributor = Distributor::new();
    distributor
        .initialize(
            &settings,
            &fixture.package,
            JobSpec::Standalone {
                path: fixture.job.clone(),
            },
        )
        .unwrap();

    let first = distributor.create_scripts().unwrap();
    let contents: Vec<Vec<u8>> = first.written.iter().map(|path| fs::read(path).unwrap()).collect();
    let second = distributor.create_scripts().unwrap();

    assert_eq!(first.written, second.written);
    for (path, before) in second.written.iter().zip(contents) {
        assert_eq!(fs::read(path).unwrap(), before, "{path:?} changed");
    }
    assert!(fixture.scripts().join("start.sh").is_file());
    assert!(fixture.scripts().join("install.sh").is_file());
    assert!(fixture.scripts().join("startall.sh").is_file());
}

#[test]
fn distributor_is_initialized_once() {
    let fixture = Fixture::new();
    let settings = fixture.settings(NODES);
    let job = JobSpec::Standalone {
        path: fixture.job.clone(),
    };

    let mut distributor = Distributor::new();
    distributor
        .initialize(&settings, &fixture.package, job.clone())
        .unwrap();

    assert_matches!(
        distributor.initialize(&settings, &fixture.package, job),
        Err(ConfigErrors::AlreadyInitialized)
    );
}

fn reparse(program_args: &[String]) -> Cli {
    Cli::try_parse_from(
        std::iter::once("arcbatch".to_string()).chain(program_args.iter().cloned()),
    )
    .unwrap()
}

#[test]
fn start_arguments_parse_back() {
    let global = Settings {
        output_file: Some("/results/out.txt".into()),
        error_file: Some("/results/err.txt".into()),
        pattern: Some(r".*\.w?arc(\.gz)?".into()),
        subdir: Some(true),
        ..Default::default()
    };
    let config = MachineConfig {
        name: "node1".into(),
        os: None,
        directories: vec!["/srv/a".into(), "/srv/b c".into()],
        machine_user_name: Some("batch".into()),
        install_dir: Some("/home/batch/run".into()),
        settings: MachineSettings::default(),
    };
    let machine = MachineDescriptor::resolve(&config, &global, Some("coordinator")).unwrap();
    let deployment = Deployment {
        package: "/opt/arcbatch".into(),
        job: JobSpec::Packaged {
            archive: "/opt/jobs.pkg".into(),
            entry: "mimesize".into(),
        },
    };

    let invocation = machine.run_command(&deployment).into_invocation();
    let Commands::Run(args) = reparse(&invocation.args).command else {
        panic!("start script does not call run");
    };

    assert_eq!(args.pattern().unwrap(), machine.pattern);
    assert!(args.recurse);
    assert_eq!(args.output.as_deref(), Some(Path::new("out.txt")));
    assert_eq!(args.error.as_deref(), Some(Path::new("err.txt")));
    assert_eq!(
        args.directories.as_deref().map(arcbatch_runner::distributed::util::split_directories),
        Some(vec![PathBuf::from("/srv/a"), PathBuf::from("/srv/b c")])
    );
    assert_eq!(args.job.package.as_deref(), Some(Path::new("/home/batch/run/jobs.pkg")));
    assert_eq!(args.job.entry.as_deref(), Some("mimesize"));
    assert_eq!(args.after_run.as_deref(), Some(Path::new("/home/batch/run/send.sh")));
}

#[test]
fn match_all_pattern_is_not_passed() {
    let config = MachineConfig {
        name: "node1".into(),
        os: None,
        directories: vec!["/srv/a".into()],
        machine_user_name: None,
        install_dir: None,
        settings: MachineSettings::default(),
    };
    let machine = MachineDescriptor::resolve(&config, &Settings::default(), Some("h")).unwrap();
    let deployment = Deployment {
        package: "/opt/arcbatch".into(),
        job: JobSpec::Standalone {
            path: "/opt/mimesize".into(),
        },
    };

    let invocation = machine.run_command(&deployment).into_invocation();
    let Commands::Run(args) = reparse(&invocation.args).command else {
        panic!("start script does not call run");
    };

    assert!(!invocation.args.iter().any(|arg| arg.starts_with("-P")));
    assert!(args.pattern().unwrap().is_match_all());
    assert!(!args.recurse);
    assert_eq!(args.output, None);
}

#[test]
fn leading_equals_values_parse_back() {
    let global = Settings {
        output_file: Some("/results/=out".into()),
        error_file: Some("=err".into()),
        pattern: Some("=.*".into()),
        ..Default::default()
    };
    let config = MachineConfig {
        name: "node1".into(),
        os: None,
        directories: vec!["=srv".into()],
        machine_user_name: None,
        install_dir: Some("/home/batch/run".into()),
        settings: MachineSettings::default(),
    };
    let machine = MachineDescriptor::resolve(&config, &global, Some("h")).unwrap();
    let deployment = Deployment {
        package: "/opt/arcbatch".into(),
        job: JobSpec::Standalone {
            path: "/opt/mimesize".into(),
        },
    };

    let invocation = machine.run_command(&deployment).into_invocation();
    let Commands::Run(args) = reparse(&invocation.args).command else {
        panic!("start script does not call run");
    };

    assert_eq!(args.pattern.as_deref(), Some("=.*"));
    assert_eq!(args.output.as_deref(), Some(Path::new("=out")));
    assert_eq!(args.error.as_deref(), Some(Path::new("=err")));
    assert_eq!(args.directories.as_deref(), Some("=srv"));
}

#[test]
fn machine_named_like_the_script_directory_is_rejected() {
    let fixture = Fixture::new();
    let settings = fixture.settings(&format!(
        "directories: [{}]\nmachines:\n  - name: '.'\n    directories: [/srv]\n",
        fixture.dir.path().display()
    ));

    assert_matches!(
        plan(&fixture.plan_args(settings)),
        Err(CommandError::Usage(ConfigErrors::InvalidMachineName(_)))
    );
    assert!(!fixture.scripts().exists());
}
