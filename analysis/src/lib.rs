//! Folding of result files written by batch runs into summary tables.
//!
//! Every machine of a distributed run ships its output file back to the host
//! as `<output>_<machine>`. The aggregations below read such files line by
//! line and merge them into a single table per job type.

mod identification;

pub use identification::{Tables, DROID_TABLES, JHOVE_SIZE_TABLES, JHOVE_TABLES};

use clap::ValueEnum;
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    fs::File,
    io::{self, BufRead},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("Failed to read result lines")]
    Read(#[from] io::Error),
    #[error("The output file at '{}' already exists.", .0.display())]
    OutputExists(PathBuf),
    #[error("Cannot create the output file at '{}'", .0.display())]
    Create(PathBuf, #[source] io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    #[error("missing field separator")]
    MissingSeparator,
    #[error("no numeric value")]
    MissingValue,
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("expected {expected} fields separated by '##', found {found}")]
    FieldCount { expected: usize, found: usize },
    #[error("value of {0:?} does not fit the table anymore")]
    Overflow(String),
}

/// Values a [`Tally`] can accumulate without wrapping around
pub trait Amount: Copy + Default {
    fn checked_sum(self, other: Self) -> Option<Self>;
}

impl Amount for u64 {
    fn checked_sum(self, other: Self) -> Option<Self> {
        self.checked_add(other)
    }
}

impl Amount for i64 {
    fn checked_sum(self, other: Self) -> Option<Self> {
        self.checked_add(other)
    }
}

/// Named, key ordered table of accumulated values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally<V> {
    name: String,
    entries: BTreeMap<String, V>,
}

impl<V: Amount> Tally<V> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    /// add `value` to the entry of `key`, an overflowing sum leaves the entry unchanged
    pub fn add(&mut self, key: impl Into<String>, value: V) -> Result<(), LineError> {
        let key = key.into();
        let current = self.entries.get(&key).copied().unwrap_or_default();

        match current.checked_sum(value) {
            Some(sum) => {
                self.entries.insert(key, sum);
                Ok(())
            }
            None => Err(LineError::Overflow(key)),
        }
    }

    /// replace every entry by the single `key`
    pub fn reset(&mut self, key: impl Into<String>, value: V) {
        self.entries.clear();
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).copied()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Display> Display for Tally<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}; ", self.name)?;
        for (key, value) in &self.entries {
            writeln!(f, "{key};{value}")?;
        }

        Ok(())
    }
}

/// Result line formats that can be folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Aggregation {
    /// one mimetype per line, counted case-insensitively
    Mimetypes,
    /// `mimetype##size` lines, counted and summed per mimetype
    MimeSize,
    /// deduplication report lines (`Total handled: 12 ...`)
    Dedup,
    /// `classification##hits##format##version##mimetype##date` identification lines
    Droid,
    /// `valid##wellformed##format##version##module##mimetype##date` validation lines
    Jhove,
    /// `valid##wellformed##module##jhove-mimetype##heritrix-mimetype##size##date`
    JhoveSize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Summary {
    Mimetypes(Tally<u64>),
    MimeSize { counts: Tally<u64>, sizes: Tally<u64> },
    Dedup(Tally<i64>),
    Droid(Tables),
    Jhove(Tables),
    JhoveSize(Tables),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FoldStats {
    pub lines: u64,
    pub bad_lines: u64,
}

const DEDUP_LABELS: [&str; 4] = [
    "Total handled",
    "Duplicates found",
    "Bytes total",
    "Bytes discarded",
];

/// `mimetype##size`: mimetype is the first field, size the last one
fn parse_mime_size(line: &str) -> Result<(String, u64), LineError> {
    let mut fields = line.split('#');
    let mimetype = fields.next().unwrap_or_default().to_lowercase();
    let size = fields.last().ok_or(LineError::MissingSeparator)?;

    size.trim()
        .parse()
        .map(|size| (mimetype, size))
        .map_err(|_| LineError::InvalidNumber(size.to_string()))
}

/// `<label>: <number> ...` for the known dedup labels, `None` for other lines
fn parse_dedup(line: &str) -> Option<Result<(&'static str, i64), LineError>> {
    let (label, value) = line.split_once(':')?;
    if value.contains(':') {
        return None;
    }
    let label = DEDUP_LABELS
        .iter()
        .find(|known| label.contains(*known))?;

    let parsed = match value.split(' ').find(|token| !token.is_empty()) {
        Some(token) => token
            .parse()
            .map(|number| (*label, number))
            .map_err(|_| LineError::InvalidNumber(token.to_string())),
        None => Err(LineError::MissingValue),
    };

    Some(parsed)
}

impl Summary {
    pub fn new(kind: Aggregation) -> Self {
        match kind {
            Aggregation::Mimetypes => Self::Mimetypes(Tally::new("mimetypes")),
            Aggregation::MimeSize => Self::MimeSize {
                counts: Tally::new("mimetypes"),
                sizes: Tally::new("mimetype-size"),
            },
            Aggregation::Dedup => Self::Dedup(Tally::new("Total count")),
            Aggregation::Droid => Self::Droid(Tables::new(&DROID_TABLES)),
            Aggregation::Jhove => Self::Jhove(Tables::new(&JHOVE_TABLES)),
            Aggregation::JhoveSize => Self::JhoveSize(Tables::new(&JHOVE_SIZE_TABLES)),
        }
    }

    /// fold all lines of `reader` into this summary, bad lines are skipped
    pub fn fold(&mut self, reader: impl BufRead) -> Result<FoldStats, AggregateError> {
        let mut stats = FoldStats::default();

        for line in reader.lines() {
            let line = line?;
            stats.lines += 1;

            let outcome = match self {
                Self::Mimetypes(counts) => counts.add(line.to_lowercase(), 1),
                Self::MimeSize { counts, sizes } => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    parse_mime_size(trimmed).and_then(|(mimetype, size)| {
                        sizes.add(mimetype.clone(), size)?;
                        counts.add(mimetype, 1)
                    })
                }
                Self::Dedup(totals) => match parse_dedup(&line) {
                    Some(parsed) => parsed.and_then(|(label, number)| totals.add(label, number)),
                    None => {
                        debug!(line = line, "Ignored line");
                        Ok(())
                    }
                },
                Self::Droid(tables) => identification::fold_droid(tables, &line),
                Self::Jhove(tables) => identification::fold_jhove(tables, &line),
                Self::JhoveSize(tables) => identification::fold_jhove_size(tables, &line),
            };

            if let Err(error) = outcome {
                stats.bad_lines += 1;
                warn!("Bad line: '{line}' gave error: {error}");
            }
        }

        Ok(stats)
    }
}

/// create the summary file, an existing file is never overwritten
pub fn create_output(path: &Path) -> Result<File, AggregateError> {
    File::options()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|error| match error.kind() {
            io::ErrorKind::AlreadyExists => AggregateError::OutputExists(path.to_path_buf()),
            _ => AggregateError::Create(path.to_path_buf(), error),
        })
}

impl Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mimetypes(counts) => write!(f, "{counts}"),
            Self::MimeSize { counts, sizes } => write!(f, "{counts}\n\n\n{sizes}"),
            Self::Dedup(totals) => write!(f, "{totals}"),
            Self::Droid(tables) | Self::Jhove(tables) | Self::JhoveSize(tables) => {
                write!(f, "{tables}")
            }
        }
    }
}
