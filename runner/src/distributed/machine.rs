use super::{
    linux::Linux,
    script::{Dialect, Invocation, Line, Script},
    util::{file_name_from_path, DIRECTORY_SEPARATOR},
    windows::Windows,
    Deployment,
};
use crate::{
    collector::FilePattern,
    config::{ConfigErrors, MachineConfig, Settings},
};
use arcbatch_jobs::JobSpec;
use itertools::Itertools;
use std::{
    path::{Component, Path},
    process::Command,
    str::FromStr,
};

/// Operating system of a machine, selects the script strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperatingSystem {
    #[default]
    Linux,
    Windows,
}

static LINUX: Linux = Linux;
static WINDOWS: Windows = Windows;

impl OperatingSystem {
    /// the system this binary runs on
    pub fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Linux
        }
    }

    pub fn strategy(self) -> &'static dyn ScriptStrategy {
        match self {
            Self::Linux => &LINUX,
            Self::Windows => &WINDOWS,
        }
    }
}

impl FromStr for OperatingSystem {
    type Err = ConfigErrors;

    fn from_str(os: &str) -> Result<Self, Self::Err> {
        match os.to_lowercase().as_str() {
            "linux" => Ok(Self::Linux),
            "windows" => Ok(Self::Windows),
            _ => Err(ConfigErrors::UnsupportedOs(os.to_string())),
        }
    }
}

/// Script generation for one operating system. Every operation is a pure
/// function of its inputs.
pub trait ScriptStrategy: Sync {
    fn dialect(&self) -> Dialect;

    /// path separator on the machine
    fn separator(&self) -> char;

    fn extension(&self) -> &'static str {
        self.dialect().extension()
    }

    /// script run on the machine to process its directories
    fn start_script(&self, machine: &MachineDescriptor, deployment: &Deployment) -> Script;

    /// script run on the machine after processing to ship the results home
    fn send_script(&self, machine: &MachineDescriptor) -> Script;

    /// Steps run on the coordinator to install everything on the machine.
    /// `machine_dir` holds the generated scripts of the machine.
    fn install_steps(
        &self,
        machine: &MachineDescriptor,
        deployment: &Deployment,
        machine_dir: &Path,
    ) -> Vec<Line>;

    /// call run on the coordinator to start the installed start script
    fn remote_start(&self, machine: &MachineDescriptor) -> Invocation;

    /// call launching a start script of this system in the background
    fn launch_local(&self, start_script: &Path) -> Invocation;

    /// command running an after-run script on this system
    fn hook_command(&self, script: &Path) -> Command;

    fn remote_path(&self, dir: &str, file: &str) -> String {
        format!("{dir}{}{file}", self.separator())
    }
}

/// One remote target with all settings resolved for it
#[derive(Debug, Clone, PartialEq)]
pub struct MachineDescriptor {
    pub name: String,
    pub os: OperatingSystem,
    /// `user@machine` or the bare machine name
    pub login: String,
    pub install_dir: String,
    pub host: String,
    pub host_username: Option<String>,
    pub directories: Vec<String>,
    pub pattern: FilePattern,
    pub recurse: bool,
    pub output_file: Option<String>,
    pub error_file: Option<String>,
}

impl MachineDescriptor {
    /// Resolve a machine entry against the global settings. `fallback_host`
    /// is used when no host is configured for the machine.
    pub fn resolve(
        config: &MachineConfig,
        global: &Settings,
        fallback_host: Option<&str>,
    ) -> Result<Self, ConfigErrors> {
        if !is_directory_name(&config.name) {
            return Err(ConfigErrors::InvalidMachineName(config.name.clone()));
        }

        let os = match config.os.as_deref() {
            Some(os) => os.parse()?,
            None => OperatingSystem::Linux,
        };

        if config.directories.is_empty() {
            return Err(ConfigErrors::MachineWithoutDirectories(config.name.clone()));
        }
        if let Some(directory) = config
            .directories
            .iter()
            .find(|directory| directory.contains(DIRECTORY_SEPARATOR))
        {
            return Err(ConfigErrors::ReservedSeparator(directory.clone()));
        }

        let settings = global.overlay(&config.settings);
        let login = match config.machine_user_name.as_deref().filter(|user| !user.is_empty()) {
            Some(user) => format!("{user}@{}", config.name),
            None => config.name.clone(),
        };

        Ok(Self {
            name: config.name.clone(),
            os,
            login,
            install_dir: config
                .install_dir
                .clone()
                .filter(|dir| !dir.is_empty())
                .unwrap_or_else(|| ".".to_string()),
            host: settings
                .host
                .clone()
                .or_else(|| fallback_host.map(str::to_string))
                .unwrap_or_default(),
            host_username: settings.host_username.clone().filter(|user| !user.is_empty()),
            directories: config.directories.clone(),
            pattern: settings.pattern()?,
            recurse: settings.subdir.unwrap_or(false),
            output_file: settings.output_file().map(str::to_string),
            error_file: settings.error_file().map(str::to_string),
        })
    }

    pub fn strategy(&self) -> &'static dyn ScriptStrategy {
        self.os.strategy()
    }

    /// login used by the machine to reach the coordinator
    pub fn host_login(&self) -> String {
        match &self.host_username {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    /// configured result files, output first
    pub fn result_files(&self) -> impl Iterator<Item = &str> {
        self.output_file
            .as_deref()
            .into_iter()
            .chain(self.error_file.as_deref())
    }

    /// start invocation processing this machine's directories
    pub fn run_command(&self, deployment: &Deployment) -> RunCommand<'_> {
        let strategy = self.strategy();

        RunCommand {
            program: strategy.remote_path(&self.install_dir, &deployment.package_name()),
            job: job_arguments(
                &deployment.job,
                strategy.remote_path(&self.install_dir, &deployment.artifact_name()),
            ),
            directories: self.directories.clone(),
            after_run: Some(strategy.remote_path(
                &self.install_dir,
                &format!("send.{}", strategy.extension()),
            )),
            output_file: self
                .output_file
                .as_deref()
                .map(|file| file_name_from_path(file).to_string()),
            error_file: self
                .error_file
                .as_deref()
                .map(|file| file_name_from_path(file).to_string()),
            recurse: self.recurse,
            pattern: &self.pattern,
        }
    }
}

/// a name usable as exactly one directory below the script directory
fn is_directory_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }

    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// Short option with its value attached. The parser drops one leading `=`
/// of an attached value, so values starting with `=` get an extra one.
pub fn attached(flag: char, value: &str) -> String {
    if value.starts_with('=') {
        format!("-{flag}={value}")
    } else {
        format!("-{flag}{value}")
    }
}

/// `-C<artifact>` or `-J<artifact> -N<entry>`
pub fn job_arguments(job: &JobSpec, artifact: String) -> Vec<String> {
    match job.entry() {
        None => vec![attached('C', &artifact)],
        Some(entry) => vec![attached('J', &artifact), attached('N', entry)],
    }
}

/// Arguments of a `run` call, in the order the start scripts use them
#[derive(Debug, Clone)]
pub struct RunCommand<'a> {
    pub program: String,
    pub job: Vec<String>,
    pub directories: Vec<String>,
    pub after_run: Option<String>,
    pub output_file: Option<String>,
    pub error_file: Option<String>,
    pub recurse: bool,
    pub pattern: &'a FilePattern,
}

impl RunCommand<'_> {
    pub fn into_invocation(self) -> Invocation {
        let mut args = vec!["run".to_string()];

        args.extend(self.job);
        args.push(attached(
            'D',
            &self.directories.iter().join(&DIRECTORY_SEPARATOR.to_string()),
        ));
        if let Some(script) = self.after_run {
            args.push(attached('B', &script));
        }
        if let Some(file) = self.output_file {
            args.push(attached('O', &file));
        }
        if let Some(file) = self.error_file {
            args.push(attached('E', &file));
        }
        if self.recurse {
            args.push("-R".to_string());
        }
        if !self.pattern.is_match_all() {
            args.push(attached('P', self.pattern.as_str()));
        }

        Invocation::new(self.program).args(args)
    }
}
