//! Archive record jobs.
//!
//! Decoding ARC/WARC containers is left to an external reader exposed through
//! [`RecordSource`]. [`RecordBatch`] pairs such a reader with a [`RecordJob`]
//! so the runner can treat every archive file as a single unit.

use crate::{BatchJob, JobError};
use std::{
    borrow::Cow,
    fmt,
    io::{BufRead, Read, Write},
    path::{Path, PathBuf},
};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Arc,
    Warc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub url: Option<String>,
    pub mime_type: Option<String>,
    pub length: u64,
    /// archive file the record was read from
    pub archive_file: PathBuf,
}

pub struct ArchiveRecord {
    pub header: RecordHeader,
    pub format: ArchiveFormat,
    content: Box<dyn Read>,
}

impl ArchiveRecord {
    pub fn new(header: RecordHeader, format: ArchiveFormat, content: impl Read + 'static) -> Self {
        Self {
            header,
            format,
            content: Box::new(content),
        }
    }

    pub fn content(&mut self) -> &mut dyn Read {
        self.content.as_mut()
    }
}

impl fmt::Debug for ArchiveRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveRecord")
            .field("header", &self.header)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

pub type Records<'a> = Box<dyn Iterator<Item = Result<ArchiveRecord, JobError>> + 'a>;

/// Reader for archive containers.
pub trait RecordSource {
    fn records<'a>(&'a self, archive: &Path) -> Result<Records<'a>, JobError>;
}

/// A job working on decoded archive records instead of whole files.
pub trait RecordJob {
    fn initialize(&mut self, out: &mut dyn Write) -> Result<(), JobError>;

    fn process_record(
        &mut self,
        record: &mut ArchiveRecord,
        out: &mut dyn Write,
    ) -> Result<(), JobError>;

    fn finish(&mut self, out: &mut dyn Write) -> Result<(), JobError>;

    fn post_process(
        &mut self,
        _input: &mut dyn BufRead,
        _output: &mut dyn Write,
    ) -> Result<bool, JobError> {
        Ok(false)
    }
}

/// Adapter running a [`RecordJob`] over every record of each archive file.
#[derive(Debug)]
pub struct RecordBatch<J, S> {
    job: J,
    source: S,
    records: u64,
    failed_records: u64,
}

impl<J: RecordJob, S: RecordSource> RecordBatch<J, S> {
    pub fn new(job: J, source: S) -> Self {
        Self {
            job,
            source,
            records: 0,
            failed_records: 0,
        }
    }

    pub fn job(&self) -> &J {
        &self.job
    }

    /// number of records handed to the job in this session
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn failed_records(&self) -> u64 {
        self.failed_records
    }
}

impl<J: RecordJob, S: RecordSource> BatchJob for RecordBatch<J, S> {
    fn initialize(&mut self, out: &mut dyn Write) -> Result<(), JobError> {
        self.records = 0;
        self.failed_records = 0;
        self.job.initialize(out)
    }

    /// A broken record never stops the remaining records of the file, but
    /// the file as a whole is reported as not fully processed.
    fn process(&mut self, unit: &Path, out: &mut dyn Write) -> Result<bool, JobError> {
        let mut complete = true;

        for (index, record) in self.source.records(unit)?.enumerate() {
            let outcome = record.and_then(|mut record| {
                self.records += 1;
                self.job.process_record(&mut record, out)
            });

            if let Err(error) = outcome {
                self.failed_records += 1;
                complete = false;
                warn!(archive = ?unit, record = index, "Failed to process record: {error}");
            }
        }

        Ok(complete)
    }

    fn finish(&mut self, out: &mut dyn Write) -> Result<(), JobError> {
        self.job.finish(out)
    }

    fn post_process(
        &mut self,
        input: &mut dyn BufRead,
        output: &mut dyn Write,
    ) -> Result<bool, JobError> {
        self.job.post_process(input, output)
    }

    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(std::any::type_name::<J>())
    }
}
