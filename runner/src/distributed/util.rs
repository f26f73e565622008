use crate::config::ConfigErrors;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::error;

/// joins the directories handed to a single run
pub const DIRECTORY_SEPARATOR: char = '#';

/// last component of a path written with either `/` or `\` separators
pub fn file_name_from_path(path: &str) -> &str {
    if path.contains('/') {
        path.rsplit('/').next().unwrap_or(path)
    } else if path.contains('\\') {
        path.rsplit('\\').next().unwrap_or(path)
    } else {
        path
    }
}

/// split a `-D` value into its directories, empty parts are dropped
pub fn split_directories(joined: &str) -> Vec<PathBuf> {
    joined
        .split(DIRECTORY_SEPARATOR)
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

pub fn local_hostname() -> Result<String, ConfigErrors> {
    match nix::unistd::gethostname() {
        Ok(hostname) => Ok(hostname.to_string_lossy().into_owned()),
        Err(error) => {
            error!(error = ?error, "Failed to retrieve hostname of the planning host: {error}");

            Err(ConfigErrors::Hostname(error))
        }
    }
}

/// create `dir` if needed and return its absolute path
pub fn ensure_directory(dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    fs::canonicalize(dir)
}

/// file name of a local path as a string
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name_from_path(&path.to_string_lossy()).to_string())
}
