pub mod local;

pub use local::{LocalExecutor, RunReport, WalkOutcome};

use crate::config::ConfigErrors;
use arcbatch_jobs::JobError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error("A batch job is trying to be processed, but the executor has not been initialised.")]
    NotInitialized,
    #[error("Cannot write to the {stream} stream")]
    Stream {
        stream: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("Batch job failed to initialise")]
    JobInitialize(#[source] JobError),
    #[error("Problems during finalise of processing batch jobs.")]
    Finalize(#[source] JobError),
}
