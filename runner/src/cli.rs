use crate::{
    collector::FilePattern,
    config::ConfigErrors,
    distributed::{
        machine::OperatingSystem, util::split_directories, DistributionError, Distributor,
        ScriptReport,
    },
    executors::{ExecutorError, LocalExecutor, RunReport},
};
use arcbatch_jobs::{BatchJob, JobSpec};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// exit code of handled usage errors with `--strict-exit`
pub const STRICT_USAGE_EXIT: i32 = 2;

#[derive(Error, Debug)]
pub enum CommandError {
    /// wrong or missing options, reported with the usage summary
    #[error(transparent)]
    Usage(#[from] ConfigErrors),
    #[error(transparent)]
    Execution(#[from] ExecutorError),
    #[error(transparent)]
    Distribution(#[from] DistributionError),
}

/// Apply a batch job to directory trees, locally or on several machines
#[derive(Parser, Debug)]
#[command(name = "arcbatch", author, version, about)]
pub struct Cli {
    /// exit with code 2 instead of 0 when the options are wrong
    #[arg(long, global = true)]
    pub strict_exit: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Write the scripts installing and starting a job on the configured machines
    Plan(PlanArgs),
    /// Process directories of this machine with a job
    Run(RunArgs),
}

/// The job to apply, either standalone or from a job package
#[derive(Args, Debug, Default, Clone, PartialEq, Eq)]
pub struct JobArgs {
    /// standalone job executable
    #[arg(short = 'C', value_name = "JOB")]
    pub standalone: Option<PathBuf>,
    /// job package holding several jobs
    #[arg(short = 'J', value_name = "PACKAGE")]
    pub package: Option<PathBuf>,
    /// name of the job inside the package
    #[arg(short = 'N', value_name = "NAME")]
    pub entry: Option<String>,
}

impl JobArgs {
    fn given(&self) -> usize {
        [
            self.standalone.is_some(),
            self.package.is_some(),
            self.entry.is_some(),
        ]
        .into_iter()
        .filter(|given| *given)
        .count()
    }

    pub fn resolve(&self) -> Result<JobSpec, ConfigErrors> {
        JobSpec::resolve(
            self.standalone.clone(),
            self.package.clone(),
            self.entry.clone(),
        )
        .map_err(|error| {
            error!("No proper batch job found: {error}");
            error.into()
        })
    }
}

#[derive(Args, Debug, Default, Clone, PartialEq, Eq)]
pub struct PlanArgs {
    /// batch configuration file
    #[arg(short = 'S', value_name = "SETTINGS")]
    pub settings: Option<PathBuf>,
    /// the arcbatch binary shipped to every machine
    #[arg(short = 'Z', value_name = "PACKAGE")]
    pub batch_package: Option<PathBuf>,
    #[command(flatten)]
    pub job: JobArgs,
}

impl PlanArgs {
    const REQUIRED: usize = 3;

    fn given(&self) -> usize {
        self.job.given()
            + usize::from(self.settings.is_some())
            + usize::from(self.batch_package.is_some())
    }
}

#[derive(Args, Debug, Default, Clone, PartialEq, Eq)]
pub struct RunArgs {
    #[command(flatten)]
    pub job: JobArgs,
    /// directories to process, separated by '#'
    #[arg(short = 'D', value_name = "DIRS")]
    pub directories: Option<String>,
    /// script run after all directories were processed
    #[arg(short = 'B', value_name = "SCRIPT")]
    pub after_run: Option<PathBuf>,
    #[arg(short = 'O', value_name = "FILE")]
    pub output: Option<PathBuf>,
    #[arg(short = 'E', value_name = "FILE")]
    pub error: Option<PathBuf>,
    /// descend into sub directories
    #[arg(short = 'R')]
    pub recurse: bool,
    /// regular expression the whole file name has to match
    #[arg(short = 'P', value_name = "PATTERN")]
    pub pattern: Option<String>,
}

impl RunArgs {
    const REQUIRED: usize = 2;

    fn given(&self) -> usize {
        self.job.given()
            + [
                self.directories.is_some(),
                self.after_run.is_some(),
                self.output.is_some(),
                self.error.is_some(),
                self.recurse,
                self.pattern.is_some(),
            ]
            .into_iter()
            .filter(|given| *given)
            .count()
    }

    pub fn pattern(&self) -> Result<FilePattern, ConfigErrors> {
        match self.pattern.as_deref().filter(|pattern| !pattern.is_empty()) {
            Some(pattern) => Ok(FilePattern::new(pattern)?),
            None => Ok(FilePattern::default()),
        }
    }

    /// `-D` split into directories, "." when none are given
    pub fn directories(&self) -> Result<Vec<PathBuf>, ConfigErrors> {
        let mut directories = self
            .directories
            .as_deref()
            .map(split_directories)
            .unwrap_or_default();

        if directories.is_empty() {
            warn!("No directory defined, using: .");
            directories.push(PathBuf::from("."));
        }

        for dir in &directories {
            if !dir.is_dir() {
                error!(path = ?dir, "The following directory is not accessible");
                return Err(ConfigErrors::DirectoryNotAccessible(dir.clone()));
            }
        }

        Ok(directories)
    }

    fn after_run_script(&self) -> Option<&Path> {
        let script = self.after_run.as_deref()?;
        if script.is_file() {
            Some(script)
        } else {
            warn!(path = ?script, "End-script file does not exist.");
            None
        }
    }
}

fn check_count(given: usize, required: usize) -> Result<(), ConfigErrors> {
    if given < required {
        error!(given, required, "Not enough arguments");
        return Err(ConfigErrors::NotEnoughArguments { given, required });
    }
    Ok(())
}

impl Cli {
    pub fn execute(&self) -> Result<(), CommandError> {
        match &self.command {
            Commands::Plan(args) => plan(args).map(drop),
            Commands::Run(args) => run(args).map(drop),
        }
    }
}

/// Check the options, then generate every script of the configured plan
pub fn plan(args: &PlanArgs) -> Result<ScriptReport, CommandError> {
    check_count(args.given(), PlanArgs::REQUIRED)?;

    let settings = args
        .settings
        .as_deref()
        .ok_or(ConfigErrors::MissingOption('S'))?;
    let package = args
        .batch_package
        .as_deref()
        .ok_or(ConfigErrors::MissingOption('Z'))?;
    let job = args.job.resolve()?;

    let mut distributor = Distributor::new();
    distributor.initialize(settings, package, job)?;

    Ok(distributor.create_scripts()?)
}

/// Check the options and run the selected job over the directories
pub fn run(args: &RunArgs) -> Result<RunReport, CommandError> {
    check_count(args.given(), RunArgs::REQUIRED)?;

    let job = args.job.resolve()?.into_job();
    run_job(args, Box::new(job))
}

/// Same as [`run`] with an already built job, the job options are ignored
pub fn run_job(args: &RunArgs, job: Box<dyn BatchJob>) -> Result<RunReport, CommandError> {
    let pattern = args.pattern()?;
    let directories = args.directories()?;
    let after_run = args.after_run_script();

    let mut executor = LocalExecutor::new();
    executor.initialize(
        job,
        args.output.as_deref(),
        args.error.as_deref(),
        pattern,
        args.recurse,
    )?;

    for dir in &directories {
        let outcome = executor.process(dir)?;
        debug!(path = ?dir, outcome = ?outcome, "Processed directory");
    }

    let report = executor.shutdown()?;

    if let Some(script) = after_run {
        run_after_script(script);
    }

    Ok(report)
}

fn run_after_script(script: &Path) {
    let mut command = OperatingSystem::current().strategy().hook_command(script);

    match command.status() {
        Ok(status) if status.success() => info!(path = ?script, "Finished end-script"),
        Ok(status) => warn!(path = ?script, "End-script exited with {status}"),
        Err(error) => warn!(path = ?script, "Cannot run end-script: {error}"),
    }
}

/// exit code of a handled usage error
pub fn usage_exit_code(strict: bool) -> i32 {
    if strict {
        STRICT_USAGE_EXIT
    } else {
        0
    }
}
