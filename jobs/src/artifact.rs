use crate::ExecJob;
use std::{
    ffi::OsStr,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobSpecError {
    #[error("Both a standalone job and a job package were given, only one is allowed")]
    Ambiguous,
    #[error("No proper batch job found")]
    Missing,
    #[error("No job name defined for job package {0:?}")]
    MissingEntry(PathBuf),
    #[error("Job name {0:?} given without a job package")]
    EntryWithoutPackage(String),
    #[error("Cannot load batch job file {0:?}")]
    ArtifactNotFound(PathBuf),
}

/// Identifies the job a run should apply, either a standalone executable or
/// a named job inside a job package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSpec {
    Standalone { path: PathBuf },
    Packaged { archive: PathBuf, entry: String },
}

/// treat empty option values like missing ones
fn present<T: AsRef<OsStr>>(value: Option<T>) -> Option<T> {
    value.filter(|value| !value.as_ref().is_empty())
}

impl JobSpec {
    /// Resolve the job from the three job related options. Exactly one of
    /// `standalone` or `archive` + `entry` must be given and the referenced
    /// file has to exist.
    pub fn resolve(
        standalone: Option<PathBuf>,
        archive: Option<PathBuf>,
        entry: Option<String>,
    ) -> Result<Self, JobSpecError> {
        let spec = match (present(standalone), present(archive), present(entry)) {
            (Some(_), Some(_), _) => return Err(JobSpecError::Ambiguous),
            (Some(_), None, Some(entry)) => return Err(JobSpecError::EntryWithoutPackage(entry)),
            (Some(path), None, None) => Self::Standalone { path },
            (None, Some(archive), Some(entry)) => Self::Packaged { archive, entry },
            (None, Some(archive), None) => return Err(JobSpecError::MissingEntry(archive)),
            (None, None, Some(entry)) => return Err(JobSpecError::EntryWithoutPackage(entry)),
            (None, None, None) => return Err(JobSpecError::Missing),
        };

        if !spec.artifact().exists() {
            return Err(JobSpecError::ArtifactNotFound(spec.artifact().to_path_buf()));
        }

        Ok(spec)
    }

    /// the file that has to be shipped to a target for this job
    pub fn artifact(&self) -> &Path {
        match self {
            Self::Standalone { path } => path,
            Self::Packaged { archive, .. } => archive,
        }
    }

    pub fn entry(&self) -> Option<&str> {
        match self {
            Self::Standalone { .. } => None,
            Self::Packaged { entry, .. } => Some(entry),
        }
    }

    /// Same job with the artifact path replaced, used when the artifact is
    /// addressed from another location (e.g. an install directory).
    pub fn relocate(&self, artifact: PathBuf) -> Self {
        match self {
            Self::Standalone { .. } => Self::Standalone { path: artifact },
            Self::Packaged { entry, .. } => Self::Packaged {
                archive: artifact,
                entry: entry.clone(),
            },
        }
    }

    /// build the job that runs the artifact as an external process per unit
    pub fn into_job(self) -> ExecJob {
        match self {
            Self::Standalone { path } => ExecJob::new(path),
            Self::Packaged { archive, entry } => ExecJob::new(archive).arg(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::fs::File;

    fn artifact() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.bin");
        File::create(&path).unwrap();
        (dir, path)
    }

    #[test]
    fn standalone_only() {
        let (_dir, path) = artifact();

        assert_eq!(
            JobSpec::resolve(Some(path.clone()), None, None),
            Ok(JobSpec::Standalone { path })
        );
    }

    #[test]
    fn package_with_entry() {
        let (_dir, path) = artifact();

        let spec = JobSpec::resolve(None, Some(path.clone()), Some("mimesize".into())).unwrap();
        assert_eq!(spec.artifact(), path.as_path());
        assert_eq!(spec.entry(), Some("mimesize"));
    }

    #[test]
    fn both_forms_are_rejected() {
        let (_dir, path) = artifact();

        assert_matches!(
            JobSpec::resolve(Some(path.clone()), Some(path), Some("mimesize".into())),
            Err(JobSpecError::Ambiguous)
        );
    }

    #[test]
    fn neither_form_is_rejected() {
        assert_matches!(JobSpec::resolve(None, None, None), Err(JobSpecError::Missing));
        assert_matches!(
            JobSpec::resolve(Some(PathBuf::new()), None, Some(String::new())),
            Err(JobSpecError::Missing)
        );
    }

    #[test]
    fn incomplete_package_is_rejected() {
        let (_dir, path) = artifact();

        assert_matches!(
            JobSpec::resolve(None, Some(path), None),
            Err(JobSpecError::MissingEntry(_))
        );
        assert_matches!(
            JobSpec::resolve(None, None, Some("mimesize".into())),
            Err(JobSpecError::EntryWithoutPackage(_))
        );
    }

    #[test]
    fn missing_artifact_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.bin");

        assert_matches!(
            JobSpec::resolve(Some(path), None, None),
            Err(JobSpecError::ArtifactNotFound(_))
        );
    }

    #[test]
    fn relocate_keeps_entry() {
        let spec = JobSpec::Packaged {
            archive: "/opt/jobs.pkg".into(),
            entry: "urls".into(),
        };

        assert_eq!(
            spec.relocate("/home/batch/jobs.pkg".into()),
            JobSpec::Packaged {
                archive: "/home/batch/jobs.pkg".into(),
                entry: "urls".into()
            }
        );
    }
}
