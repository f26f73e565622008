use crate::{
    collector::{FilePattern, MATCH_ALL},
    distributed::{
        machine::{MachineDescriptor, OperatingSystem},
        util::{local_hostname, DIRECTORY_SEPARATOR},
    },
};
use arcbatch_jobs::JobSpecError;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("Error in loading the configuration file {path:?}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Configuration file could not be parsed")]
    Parse(#[from] serde_yaml::Error),
    #[error("Pattern is not a valid regular expression")]
    InvalidPattern(#[from] regex::Error),
    #[error(transparent)]
    Job(#[from] JobSpecError),
    #[error("Neither machines nor local directories have been defined.")]
    NothingToRun,
    #[error("The following directory does not exist: {0:?}")]
    DirectoryNotFound(PathBuf),
    #[error("The following directory is not accessible: {0:?}")]
    DirectoryNotAccessible(PathBuf),
    #[error("Path {0:?} contains the reserved directory separator '#'")]
    ReservedSeparator(String),
    #[error("The operating system is not supported: {0}")]
    UnsupportedOs(String),
    #[error("Machine {0:?} has no directories to process")]
    MachineWithoutDirectories(String),
    #[error("Machine name {0:?} cannot be used as a directory name")]
    InvalidMachineName(String),
    #[error("Machine {0:?} is defined more than once")]
    DuplicateMachine(String),
    #[error("BatchPack file does not exist: {0:?}")]
    PackageNotFound(PathBuf),
    #[error("Cannot create script directory {path:?}")]
    ScriptDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to determine the host name")]
    Hostname(#[from] nix::Error),
    #[error("This instance is being initialised more than once. This is not allowed")]
    AlreadyInitialized,
    #[error("Not initialised yet")]
    NotInitialized,
    #[error("Not enough arguments given, {given} of at least {required}")]
    NotEnoughArguments { given: usize, required: usize },
    #[error("Error in arguments: missing option -{0}")]
    MissingOption(char),
}

/// Settings that apply to every machine, each machine may override them.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct Settings {
    #[serde(alias = "outputFile")]
    pub output_file: Option<String>,
    #[serde(alias = "errorFile")]
    pub error_file: Option<String>,
    pub pattern: Option<String>,
    pub subdir: Option<bool>,
    #[serde(alias = "scriptDir")]
    pub script_dir: Option<PathBuf>,
    pub host: Option<String>,
    #[serde(alias = "hostUsername")]
    pub host_username: Option<String>,
    #[serde(alias = "localOs")]
    pub local_os: Option<String>,
}

/// The part of the settings a single machine may override
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct MachineSettings {
    #[serde(alias = "outputFile")]
    pub output_file: Option<String>,
    #[serde(alias = "errorFile")]
    pub error_file: Option<String>,
    pub pattern: Option<String>,
    pub subdir: Option<bool>,
    pub host: Option<String>,
    #[serde(alias = "hostUsername")]
    pub host_username: Option<String>,
}

impl Settings {
    /// values set in `overrides` win over the ones of `self`
    pub fn overlay(&self, overrides: &MachineSettings) -> Settings {
        Settings {
            output_file: overrides.output_file.clone().or_else(|| self.output_file.clone()),
            error_file: overrides.error_file.clone().or_else(|| self.error_file.clone()),
            pattern: overrides.pattern.clone().or_else(|| self.pattern.clone()),
            subdir: overrides.subdir.or(self.subdir),
            script_dir: self.script_dir.clone(),
            host: overrides.host.clone().or_else(|| self.host.clone()),
            host_username: overrides
                .host_username
                .clone()
                .or_else(|| self.host_username.clone()),
            local_os: self.local_os.clone(),
        }
    }

    /// empty strings count as not configured
    pub fn output_file(&self) -> Option<&str> {
        self.output_file.as_deref().filter(|file| !file.is_empty())
    }

    pub fn error_file(&self) -> Option<&str> {
        self.error_file.as_deref().filter(|file| !file.is_empty())
    }

    pub fn pattern(&self) -> Result<FilePattern, regex::Error> {
        match self.pattern.as_deref().filter(|pattern| !pattern.is_empty()) {
            Some(pattern) => FilePattern::new(pattern),
            None => Ok(FilePattern::default()),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct MachineConfig {
    pub name: String,
    pub os: Option<String>,
    // paths on the machine, kept as written since they may use another OS' syntax
    #[serde(default, alias = "directory")]
    pub directories: Vec<String>,
    #[serde(alias = "machineUserName")]
    pub machine_user_name: Option<String>,
    #[serde(alias = "installDir")]
    pub install_dir: Option<String>,
    #[serde(default)]
    pub settings: MachineSettings,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    #[serde(default)]
    pub settings: Settings,
    // directories processed on the planning host itself
    #[serde(default, alias = "directory")]
    pub directories: Vec<PathBuf>,
    #[serde(default, alias = "machine")]
    pub machines: Vec<MachineConfig>,
}

/// Fully checked configuration, ready for script generation
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub output_file: Option<String>,
    pub error_file: Option<String>,
    pub pattern: FilePattern,
    pub recurse: bool,
    pub script_dir: PathBuf,
    pub local_os: OperatingSystem,
    pub directories: Vec<PathBuf>,
    pub machines: Vec<MachineDescriptor>,
}

impl BatchConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let content = fs::read_to_string(path).map_err(|source| ConfigErrors::ConfigFile {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_yaml::from_str(&content)?)
    }

    /// Check and resolve the whole configuration. Every problem is logged
    /// before failing with the first one, nothing is created on disk.
    pub fn resolve(&self) -> Result<ResolvedConfig, ConfigErrors> {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut problems = Vec::new();

        let pattern = match self.settings.pattern() {
            Ok(pattern) => {
                if self.settings.pattern.is_none() {
                    warn!("No pattern defined. The default is used: '{MATCH_ALL}'");
                }
                pattern
            }
            Err(error) => {
                error!("settings.pattern is not a valid regular expression: {error}");
                problems.push(ConfigErrors::from(error));
                FilePattern::default()
            }
        };

        let local_os = match self.settings.local_os.as_deref() {
            Some(os) => os.parse().unwrap_or_else(|error: ConfigErrors| {
                error!("settings.local-os: {error}");
                problems.push(error);
                OperatingSystem::current()
            }),
            None => OperatingSystem::current(),
        };

        if self.directories.is_empty() {
            warn!("No directories defined.");
        }
        for directory in &self.directories {
            if directory.to_string_lossy().contains(DIRECTORY_SEPARATOR) {
                error!(path = ?directory, "Directory contains the reserved separator '#'");
                problems.push(ConfigErrors::ReservedSeparator(
                    directory.to_string_lossy().into_owned(),
                ));
            } else if !directory.is_dir() {
                error!(path = ?directory, "The following directory does not exist");
                problems.push(ConfigErrors::DirectoryNotFound(directory.clone()));
            }
        }

        if self.machines.is_empty() {
            warn!("No machines defined.");
        }

        // only ask the system when some machine actually needs it
        let needs_hostname = self.machines.iter().any(|machine| {
            self.settings.overlay(&machine.settings).host.is_none()
        });
        let hostname = if needs_hostname {
            match local_hostname() {
                Ok(hostname) => {
                    warn!("No host defined, results are sent back to {hostname}");
                    Some(hostname)
                }
                Err(error) => {
                    problems.push(error);
                    None
                }
            }
        } else {
            None
        };

        let mut machines = Vec::with_capacity(self.machines.len());
        let mut names = HashSet::new();
        for machine in &self.machines {
            // every machine owns `<script-dir>/<name>/`
            if !names.insert(machine.name.as_str()) {
                error!(machine = machine.name, "Machine is defined more than once");
                problems.push(ConfigErrors::DuplicateMachine(machine.name.clone()));
                continue;
            }

            match MachineDescriptor::resolve(machine, &self.settings, hostname.as_deref()) {
                Ok(descriptor) => machines.push(descriptor),
                Err(error) => {
                    error!(machine = machine.name, "Invalid machine: {error}");
                    problems.push(error);
                }
            }
        }

        if self.directories.is_empty() && self.machines.is_empty() {
            error!("Neither machines nor local directories have been defined.");
            problems.push(ConfigErrors::NothingToRun);
        }

        if !problems.is_empty() {
            return Err(problems.swap_remove(0));
        }

        Ok(ResolvedConfig {
            output_file: self.settings.output_file().map(str::to_string),
            error_file: self.settings.error_file().map(str::to_string),
            pattern,
            recurse: self.settings.subdir.unwrap_or(false),
            script_dir: self
                .settings
                .script_dir
                .clone()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| PathBuf::from(".")),
            local_os,
            directories: self.directories.clone(),
            machines,
        })
    }
}
