use super::ExecutorError;
use crate::{
    collector::{Collected, Collector, FilePattern},
    config::ConfigErrors,
};
use arcbatch_jobs::BatchJob;
use std::{
    any::Any,
    error::Error,
    fs::File,
    io::{self, BufWriter, Write},
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, instrument, warn};

/// How the walk of a single root directory ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    Completed,
    /// the root could not be read at all
    Unreadable,
    /// more was written than space was available, the rest of the root was skipped
    DiskFull,
}

/// Counters of a whole session, over all processed roots
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// units the job accepted
    pub processed: u64,
    /// units the job returned `false` for
    pub rejected: u64,
    /// units the job failed or panicked on
    pub failed: u64,
    pub skipped_directories: Vec<PathBuf>,
    pub filesystem_errors: u64,
    pub exhausted_roots: Vec<PathBuf>,
}

enum Target {
    File(BufWriter<File>),
    Stdout(io::Stdout),
    Stderr(io::Stderr),
}

/// Output or error stream of a session. Only bytes going to a file count
/// against the free space.
struct SessionStream {
    name: &'static str,
    target: Target,
    written: u64,
}

impl SessionStream {
    fn open(name: &'static str, path: Option<&Path>, fallback: Target) -> Self {
        let target = match path {
            Some(path) => match File::create(path) {
                Ok(file) => Target::File(BufWriter::new(file)),
                Err(error) => {
                    warn!(path = ?path, "Cannot use {name} file. {error}");
                    fallback
                }
            },
            None => fallback,
        };

        Self {
            name,
            target,
            written: 0,
        }
    }

    fn counted(&self) -> u64 {
        match self.target {
            Target::File(_) => self.written,
            Target::Stdout(_) | Target::Stderr(_) => 0,
        }
    }

    fn failure(&self) -> impl FnOnce(io::Error) -> ExecutorError {
        let stream = self.name;
        move |source| ExecutorError::Stream { stream, source }
    }
}

impl Write for SessionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = match &mut self.target {
            Target::File(file) => file.write(buf)?,
            Target::Stdout(stdout) => stdout.write(buf)?,
            Target::Stderr(stderr) => stderr.write(buf)?,
        };
        self.written += written as u64;

        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.target {
            Target::File(file) => file.flush(),
            Target::Stdout(stdout) => stdout.flush(),
            Target::Stderr(stderr) => stderr.flush(),
        }
    }
}

/// free bytes on the filesystem holding `dir`
fn free_space(dir: &Path) -> u64 {
    match nix::sys::statvfs::statvfs(dir) {
        Ok(stat) => (stat.blocks_available() as u64).saturating_mul(stat.fragment_size() as u64),
        Err(error) => {
            warn!(path = ?dir, "Failed to determine free space, not limiting output: {error}");
            u64::MAX
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}

fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();

    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}

struct Session {
    job: Box<dyn BatchJob>,
    out: SessionStream,
    err: SessionStream,
    pattern: FilePattern,
    recurse: bool,
    free_space: u64,
    report: RunReport,
}

impl Session {
    fn process(&mut self, root: &Path) -> Result<WalkOutcome, ExecutorError> {
        if !root.is_dir() {
            self.report.filesystem_errors += 1;
            error!(path = ?root, "Problems during processing of directory");
            writeln!(
                self.err,
                "Problems during processing of directory: {}",
                root.display()
            )
            .map_err(self.err.failure())?;

            return Ok(WalkOutcome::Unreadable);
        }

        for entry in Collector::new(root, self.pattern.clone(), self.recurse) {
            if self.disk_full()? {
                self.report.exhausted_roots.push(root.to_path_buf());
                return Ok(WalkOutcome::DiskFull);
            }

            match entry {
                Collected::Unit(path) => self.process_unit(&path, root)?,
                Collected::SkippedDirectory(path) => {
                    warn!(path = ?path, "Cannot process the file, since it is a directory");
                    self.report.skipped_directories.push(path);
                }
                Collected::Error(walk_error) => {
                    self.report.filesystem_errors += 1;
                    write!(
                        self.err,
                        "Problems during processing of directory: {}\n{walk_error}\n",
                        root.display()
                    )
                    .map_err(self.err.failure())?;
                }
            }
        }

        Ok(WalkOutcome::Completed)
    }

    fn process_unit(&mut self, path: &Path, root: &Path) -> Result<(), ExecutorError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.job.process(path, &mut self.out)
        }));

        let cause = match outcome {
            Ok(Ok(true)) => {
                self.report.processed += 1;
                return Ok(());
            }
            Ok(Ok(false)) => {
                self.report.rejected += 1;
                debug!(path = ?path, "Unit was not processed by the job");
                return Ok(());
            }
            Ok(Err(job_error)) => error_chain(&job_error),
            Err(payload) => panic_message(payload.as_ref()),
        };

        self.report.failed += 1;
        warn!(path = ?path, "Failed to process unit: {cause}");
        write!(
            self.err,
            "The following file has given the error message below: {}\n{cause}\nRoot directory: {}\n",
            path.display(),
            root.display()
        )
        .map_err(self.err.failure())
    }

    /// compare the bytes written so far with the free space snapshot
    fn disk_full(&mut self) -> Result<bool, ExecutorError> {
        let used = self.out.counted() + self.err.counted();
        if used <= self.free_space {
            return Ok(false);
        }

        error!(free = self.free_space, used, "The temporary area has been filled up.");
        write!(
            self.err,
            "The temporary area has been filled up.\nFree size: {}\nSize used: {used}\n",
            self.free_space
        )
        .map_err(self.err.failure())?;

        Ok(true)
    }
}

/// Runs a batch job over directory trees of the local machine.
///
/// The executor has to be initialized once with the job and its streams, can
/// then process any number of root directories and is finished by
/// [`LocalExecutor::shutdown`]. Problems with single units or directories are
/// written to the error stream and never stop the run.
#[derive(Default)]
pub struct LocalExecutor {
    session: Option<Session>,
    space_budget: Option<u64>,
}

impl LocalExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// never allow more than `bytes` to be written, regardless of free space
    pub fn with_space_budget(mut self, bytes: u64) -> Self {
        self.space_budget = Some(bytes);
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    /// report of the running session
    pub fn report(&self) -> Option<&RunReport> {
        self.session.as_ref().map(|session| &session.report)
    }

    /// Open the streams and initialize the job. Files that cannot be used
    /// fall back to stdout and stderr.
    pub fn initialize(
        &mut self,
        mut job: Box<dyn BatchJob>,
        output: Option<&Path>,
        error: Option<&Path>,
        pattern: FilePattern,
        recurse: bool,
    ) -> Result<(), ExecutorError> {
        if self.session.is_some() {
            error!("This instance is being initialised more than once. This is not allowed");
            return Err(ConfigErrors::AlreadyInitialized.into());
        }

        let mut out = SessionStream::open("output", output, Target::Stdout(io::stdout()));
        let err = SessionStream::open("error", error, Target::Stderr(io::stderr()));

        let space_root = output
            .and_then(Path::parent)
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let free_space = match self.space_budget {
            Some(budget) => budget.min(free_space(space_root)),
            None => free_space(space_root),
        };

        job.initialize(&mut out).map_err(ExecutorError::JobInitialize)?;

        debug!(job = %job.name(), free_space, pattern = pattern.as_str(), recurse, "Initialized executor");

        self.session = Some(Session {
            job,
            out,
            err,
            pattern,
            recurse,
            free_space,
            report: RunReport::default(),
        });

        Ok(())
    }

    /// walk `root` and hand every matching file to the job
    #[instrument(skip(self), level = "info")]
    pub fn process(&mut self, root: &Path) -> Result<WalkOutcome, ExecutorError> {
        let session = self.session.as_mut().ok_or_else(|| {
            error!("A batch job is trying to be processed, but the executor has not been initialised.");
            ExecutorError::NotInitialized
        })?;

        session.process(root)
    }

    /// finish the job, flush the streams and hand back the session report
    pub fn shutdown(&mut self) -> Result<RunReport, ExecutorError> {
        let mut session = self.session.take().ok_or(ExecutorError::NotInitialized)?;

        let finished = session.job.finish(&mut session.out);
        session.out.flush().map_err(session.out.failure())?;
        session.err.flush().map_err(session.err.failure())?;
        finished.map_err(ExecutorError::Finalize)?;

        let report = session.report;
        info!(
            processed = report.processed,
            rejected = report.rejected,
            failed = report.failed,
            skipped_directories = report.skipped_directories.len(),
            filesystem_errors = report.filesystem_errors,
            exhausted_roots = report.exhausted_roots.len(),
            "Done with processing"
        );

        Ok(report)
    }
}
