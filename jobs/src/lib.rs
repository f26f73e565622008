//! The contract every batch job implements.
//!
//! A job is driven through a fixed lifecycle by the runner: `initialize` once,
//! `process` for every unit that passed the file-name filter, and `finish`
//! once after all requested directories were walked. All output a job
//! produces goes to the sink handed to it, never to stdout directly.

pub mod exec;
pub mod record;
mod artifact;

pub use exec::ExecJob;
pub use record::{ArchiveFormat, ArchiveRecord, RecordBatch, RecordHeader, RecordJob, RecordSource};
pub use artifact::{JobSpec, JobSpecError};

use std::{
    borrow::Cow,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Failed to write job output")]
    Output(#[source] io::Error),
    #[error("Failed to spawn job process {program:?}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to read unit {path:?}")]
    Unit {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Archive record could not be read: {0}")]
    Record(String),
    #[error("{0}")]
    Failed(String),
}

/// A job applied to every matching file below the requested directories.
pub trait BatchJob {
    /// called once before the first unit, resets all per-session state
    fn initialize(&mut self, out: &mut dyn Write) -> Result<(), JobError>;

    /// process a single unit, `Ok(false)` marks the unit as rejected without
    /// stopping the run
    fn process(&mut self, unit: &Path, out: &mut dyn Write) -> Result<bool, JobError>;

    /// called once after the last unit of the whole run
    fn finish(&mut self, out: &mut dyn Write) -> Result<(), JobError>;

    /// Optional pass over the concatenated results of several runs, e.g. to
    /// re-sort or summarize them. Returns `Ok(false)` when the job has no
    /// post-processing step.
    fn post_process(
        &mut self,
        _input: &mut dyn BufRead,
        _output: &mut dyn Write,
    ) -> Result<bool, JobError> {
        Ok(false)
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(std::any::type_name::<Self>())
    }
}

impl<J: BatchJob + ?Sized> BatchJob for Box<J> {
    fn initialize(&mut self, out: &mut dyn Write) -> Result<(), JobError> {
        (**self).initialize(out)
    }

    fn process(&mut self, unit: &Path, out: &mut dyn Write) -> Result<bool, JobError> {
        (**self).process(unit, out)
    }

    fn finish(&mut self, out: &mut dyn Write) -> Result<(), JobError> {
        (**self).finish(out)
    }

    fn post_process(
        &mut self,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> Result<bool, JobError> {
        (**self).post_process(input, output)
    }

    fn name(&self) -> Cow<'_, str> {
        (**self).name()
    }
}
