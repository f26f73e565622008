use ignore::{Walk, WalkBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    ffi::OsStr,
    fmt,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};
use tracing_unwrap::ResultExt;

/// source of the pattern accepting every file name
pub const MATCH_ALL: &str = ".*";

static MATCH_ALL_PATTERN: Lazy<FilePattern> =
    Lazy::new(|| FilePattern::new(MATCH_ALL).unwrap_or_log());

/// Regular expression that has to match a whole file name, not only a part
/// of it.
#[derive(Clone)]
pub struct FilePattern {
    source: String,
    regex: Regex,
}

impl FilePattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: source.to_string(),
            regex: Regex::new(&format!("^(?:{source})$"))?,
        })
    }

    /// the pattern as it was configured
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_match_all(&self) -> bool {
        self.source == MATCH_ALL
    }

    /// names that are not valid unicode are matched lossy
    pub fn is_match(&self, file_name: &OsStr) -> bool {
        self.regex.is_match(&file_name.to_string_lossy())
    }
}

impl Default for FilePattern {
    fn default() -> Self {
        MATCH_ALL_PATTERN.clone()
    }
}

impl PartialEq for FilePattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for FilePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FilePattern").field(&self.source).finish()
    }
}

/// Entries found below a root directory
#[derive(Debug)]
pub enum Collected {
    /// a file whose name matched the pattern
    Unit(PathBuf),
    /// a directory that was not descended into
    SkippedDirectory(PathBuf),
    /// a directory or file that could not be read
    Error(ignore::Error),
}

/// Walks a single root directory in file name order and yields the files to
/// process. Without recursion only the direct children of the root are
/// looked at and every sub directory is reported once.
pub struct Collector {
    walker: Walk,
    pattern: FilePattern,
    recurse: bool,
}

impl Collector {
    pub fn new(root: &Path, pattern: FilePattern, recurse: bool) -> Self {
        let mut builder = WalkBuilder::new(root);

        // every file counts, hidden or ignored ones included
        builder
            .standard_filters(false)
            .follow_links(true)
            .sort_by_file_name(|a, b| a.cmp(b))
            .max_depth(if recurse { None } else { Some(1) });

        debug!(root = ?root, pattern = pattern.as_str(), recurse, "Collecting units");

        Self {
            walker: builder.build(),
            pattern,
            recurse,
        }
    }
}

impl Iterator for Collector {
    type Item = Collected;

    fn next(&mut self) -> Option<Self::Item> {
        for entry in self.walker.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    warn!("Failed to read directory entry: {error}");
                    return Some(Collected::Error(error));
                }
            };

            // the root itself
            if entry.depth() == 0 {
                continue;
            }

            let is_dir = entry.file_type().map_or(false, |kind| kind.is_dir());
            if is_dir {
                if !self.recurse {
                    return Some(Collected::SkippedDirectory(entry.into_path()));
                }
            } else if self.pattern.is_match(entry.file_name()) {
                return Some(Collected::Unit(entry.into_path()));
            }
        }

        None
    }
}
