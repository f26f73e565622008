use crate::{BatchJob, JobError};
use std::{
    borrow::Cow,
    ffi::OsString,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
};
use tracing::{debug, info};

/// Job backed by an external program, spawned once per unit with the unit
/// path as last argument. Whatever the program prints on stdout becomes the
/// output of the unit, a non-zero exit status rejects the unit.
#[derive(Debug, Clone)]
pub struct ExecJob {
    program: PathBuf,
    args: Vec<OsString>,
    // per session counters, reset on initialize
    invocations: u64,
    rejected: u64,
}

impl ExecJob {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            invocations: 0,
            rejected: 0,
        }
    }

    /// append a fixed argument placed before the unit path
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

impl BatchJob for ExecJob {
    fn initialize(&mut self, _out: &mut dyn Write) -> Result<(), JobError> {
        self.invocations = 0;
        self.rejected = 0;

        debug!(program = ?self.program, args = ?self.args, "Initialized external job");
        Ok(())
    }

    fn process(&mut self, unit: &Path, out: &mut dyn Write) -> Result<bool, JobError> {
        self.invocations += 1;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(unit)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| JobError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        out.write_all(&output.stdout).map_err(JobError::Output)?;

        if output.status.success() {
            Ok(true)
        } else {
            self.rejected += 1;
            debug!(
                unit = ?unit,
                status = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "External job rejected unit"
            );

            Ok(false)
        }
    }

    fn finish(&mut self, _out: &mut dyn Write) -> Result<(), JobError> {
        info!(
            program = ?self.program,
            invocations = self.invocations,
            rejected = self.rejected,
            "External job finished"
        );

        Ok(())
    }

    fn name(&self) -> Cow<'_, str> {
        self.program.to_string_lossy()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::fs;

    fn shell(script: &str) -> ExecJob {
        // `sh -c script unit` binds the unit path to $0
        ExecJob::new("sh").arg("-c").arg(script)
    }

    #[test]
    fn stdout_is_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let unit = dir.path().join("a.log");
        fs::write(&unit, "line one\n").unwrap();

        let mut job = shell("cat \"$0\"");
        let mut out = Vec::new();

        job.initialize(&mut out).unwrap();
        assert!(job.process(&unit, &mut out).unwrap());
        job.finish(&mut out).unwrap();

        assert_eq!(out, b"line one\n");
        assert_eq!(job.invocations(), 1);
    }

    #[test]
    fn failing_program_rejects_unit() {
        let mut job = shell("echo partial; exit 3");
        let mut out = Vec::new();

        job.initialize(&mut out).unwrap();
        assert!(!job.process(Path::new("/nonexistent"), &mut out).unwrap());
        assert_eq!(out, b"partial\n");
        assert_eq!(job.rejected(), 1);
    }

    #[test]
    fn counters_reset_per_session() {
        let mut job = shell("exit 1");
        let mut out = Vec::new();

        job.initialize(&mut out).unwrap();
        job.process(Path::new("x"), &mut out).unwrap();
        job.process(Path::new("y"), &mut out).unwrap();
        assert_eq!(job.invocations(), 2);

        job.initialize(&mut out).unwrap();
        assert_eq!(job.invocations(), 0);
        assert_eq!(job.rejected(), 0);
    }

    #[test]
    fn missing_program_is_an_error() {
        let mut job = ExecJob::new("/definitely/not/here");
        let mut out = Vec::new();

        assert_matches!(
            job.process(Path::new("unit"), &mut out),
            Err(JobError::Spawn { .. })
        );
    }
}
