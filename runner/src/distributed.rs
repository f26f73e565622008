/*
 * Distribution of a batch run over several machines:
 * 1. Resolve the configuration -> local directories + one descriptor per machine
 * 2. Per machine write start/send scripts into `<script-dir>/<machine>/`
 * 3. Write the aggregate install script, copying package, job and scripts to every machine
 * 4. Write the aggregate start-all script, starting the local run and every machine
 *
 * The machines run on their own afterwards, results come back through the send scripts.
 */

pub mod linux;
pub mod machine;
pub mod script;
pub mod util;
pub mod windows;

use crate::config::{BatchConfig, ConfigErrors, ResolvedConfig};
use arcbatch_jobs::{JobSpec, JobSpecError};
use machine::{job_arguments, RunCommand};
use script::{Dialect, Line, Script};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use util::{display_name, ensure_directory};

const DASHES: &str = "-------------------------------------";

#[derive(Error, Debug)]
pub enum DistributionError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error("Cannot write script {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Cannot create script directory for machine {machine}")]
    MachineDirectory {
        machine: String,
        #[source]
        source: io::Error,
    },
}

/// The files shipped to every machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    /// the `arcbatch` binary itself
    pub package: PathBuf,
    pub job: JobSpec,
}

impl Deployment {
    pub fn package_name(&self) -> String {
        display_name(&self.package)
    }

    pub fn artifact_name(&self) -> String {
        display_name(self.job.artifact())
    }
}

/// Outcome of a script generation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScriptReport {
    pub written: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
struct Plan {
    config: ResolvedConfig,
    deployment: Deployment,
    directories: Vec<PathBuf>,
    script_dir: PathBuf,
}

/// Turns a batch configuration into the scripts installing and starting a
/// job on every configured machine.
#[derive(Debug, Default)]
pub struct Distributor {
    initialized: bool,
    plan: Option<Plan>,
}

impl Distributor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(
        &mut self,
        config_file: &Path,
        package: &Path,
        job: JobSpec,
    ) -> Result<(), ConfigErrors> {
        if self.initialized {
            error!("This instance is being initialised more than once. This is not allowed");
            return Err(ConfigErrors::AlreadyInitialized);
        }

        let config = BatchConfig::load(config_file)?;
        self.initialize_with(config, package, job)
    }

    /// Same as [`Distributor::initialize`] with an already loaded
    /// configuration. Only one initialization is allowed per instance, a
    /// failed one included.
    pub fn initialize_with(
        &mut self,
        config: BatchConfig,
        package: &Path,
        job: JobSpec,
    ) -> Result<(), ConfigErrors> {
        if self.initialized {
            error!("This instance is being initialised more than once. This is not allowed");
            return Err(ConfigErrors::AlreadyInitialized);
        }
        self.initialized = true;

        if !package.is_file() {
            error!(path = ?package, "BatchPack file does not exist.");
            return Err(ConfigErrors::PackageNotFound(package.to_path_buf()));
        }

        // nothing is created before the configuration passed
        let config = config.resolve()?;

        let package = fs::canonicalize(package)
            .map_err(|_| ConfigErrors::PackageNotFound(package.to_path_buf()))?;
        let artifact = fs::canonicalize(job.artifact())
            .map_err(|_| JobSpecError::ArtifactNotFound(job.artifact().to_path_buf()))?;
        let directories = config
            .directories
            .iter()
            .map(|dir| fs::canonicalize(dir).unwrap_or_else(|_| dir.clone()))
            .collect();
        let script_dir =
            ensure_directory(&config.script_dir).map_err(|source| ConfigErrors::ScriptDirectory {
                path: config.script_dir.clone(),
                source,
            })?;

        debug!(script_dir = ?script_dir, machines = config.machines.len(), "Initialized distribution");

        self.plan = Some(Plan {
            deployment: Deployment {
                package,
                job: job.relocate(artifact),
            },
            directories,
            script_dir,
            config,
        });

        Ok(())
    }

    /// (Re)write every script of the plan
    pub fn create_scripts(&self) -> Result<ScriptReport, DistributionError> {
        let plan = self.plan.as_ref().ok_or(ConfigErrors::NotInitialized)?;
        let coordinator = plan.config.local_os.strategy();
        let extension = coordinator.extension();
        let mut report = ScriptReport::default();

        let local_start = plan.script_dir.join(format!("start.{extension}"));
        if !plan.directories.is_empty() {
            let run = RunCommand {
                program: plan.deployment.package.display().to_string(),
                job: job_arguments(
                    &plan.deployment.job,
                    plan.deployment.job.artifact().display().to_string(),
                ),
                directories: plan
                    .directories
                    .iter()
                    .map(|dir| dir.display().to_string())
                    .collect(),
                after_run: None,
                output_file: plan.config.output_file.clone(),
                error_file: plan.config.error_file.clone(),
                recurse: plan.config.recurse,
                pattern: &plan.config.pattern,
            }
            .into_invocation();

            write_script(
                &local_start,
                &Script::new().run(run),
                coordinator.dialect(),
                &mut report,
            )?;
        }

        for machine in &plan.config.machines {
            let strategy = machine.strategy();
            let machine_dir = plan.script_dir.join(&machine.name);
            fs::create_dir_all(&machine_dir).map_err(|source| {
                DistributionError::MachineDirectory {
                    machine: machine.name.clone(),
                    source,
                }
            })?;

            write_script(
                &machine_dir.join(format!("start.{}", strategy.extension())),
                &strategy.start_script(machine, &plan.deployment),
                strategy.dialect(),
                &mut report,
            )?;

            if machine.result_files().next().is_none() {
                let warning = format!(
                    "No result file created, thus no file to send back, for machine: {}. Empty send script created.",
                    machine.name
                );
                warn!(machine = machine.name, "{warning}");
                report.warnings.push(warning);
            }
            write_script(
                &machine_dir.join(format!("send.{}", strategy.extension())),
                &strategy.send_script(machine),
                strategy.dialect(),
                &mut report,
            )?;
        }

        let mut install = Script::new().echo(DASHES);
        for machine in &plan.config.machines {
            install.extend(machine.strategy().install_steps(
                machine,
                &plan.deployment,
                &plan.script_dir.join(&machine.name),
            ));
            install.push(Line::Echo(DASHES.to_string()));
        }
        write_script(
            &plan.script_dir.join(format!("install.{extension}")),
            &install,
            coordinator.dialect(),
            &mut report,
        )?;

        let mut start_all = Script::new();
        if !plan.directories.is_empty() {
            start_all = start_all
                .echo("Starting local.")
                .run(coordinator.launch_local(&local_start));
        }
        for machine in &plan.config.machines {
            start_all.push(Line::Echo(format!("Starting machine: {}", machine.name)));
            start_all.push(machine.strategy().remote_start(machine));
        }
        write_script(
            &plan.script_dir.join(format!("startall.{extension}")),
            &start_all,
            coordinator.dialect(),
            &mut report,
        )?;

        info!(
            script_dir = ?plan.script_dir,
            scripts = report.written.len(),
            "Created scripts"
        );

        Ok(report)
    }
}

fn write_script(
    path: &Path,
    script: &Script,
    dialect: Dialect,
    report: &mut ScriptReport,
) -> Result<(), DistributionError> {
    let write_error = |source| DistributionError::Write {
        path: path.to_path_buf(),
        source,
    };

    fs::write(path, script.render(dialect)).map_err(write_error)?;
    if dialect == Dialect::Shell {
        make_executable(path).map_err(write_error)?;
    }

    debug!(path = ?path, lines = script.lines().len(), "Wrote script");
    report.written.push(path.to_path_buf());

    Ok(())
}

#[cfg(unix)]
fn make_executable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o764))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> io::Result<()> {
    Ok(())
}
