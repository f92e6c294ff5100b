//! Bulk readers for the catalog and activity-log sources.
//!
//! Readers discover files through a [`SourcePattern`], decode them in
//! parallel and return records in a deterministic order (sorted file path,
//! then line number). Per-record faults are absorbed here: corrupt lines
//! degrade to all-null records and activity records missing a required field
//! are handled per [`MissingRequiredPolicy`]. Only structural faults (a
//! missing source root, an unreadable file) surface as errors.

pub mod pattern;

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

pub use pattern::{PatternError, SourcePattern};

use crate::records::{ActivityRecord, CatalogRecord, ParsedLine, SourceRecord, parse_line};

/// Result alias for source reads.
pub type SourceResult<T> = Result<T, SourceError>;

/// Structural faults while reading a source.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SourceError {
    /// The literal prefix of a source pattern does not exist.
    #[snafu(display("Source path not found or not accessible: {path}"))]
    SourceMissing {
        /// Absolute path that was looked up.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A directory under the source root could not be listed.
    #[snafu(display("Failed to list source files under {path}: {source}"))]
    Walk {
        /// Directory being walked.
        path: String,
        /// Underlying walk error.
        source: walkdir::Error,
    },

    /// A matched file could not be read.
    #[snafu(display("Failed to read source file {path}: {source}"))]
    ReadFile {
        /// File that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// What to do with an activity record whose `userId` or `ts` is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingRequiredPolicy {
    /// Remove the record before any stage sees it.
    #[default]
    Drop,
    /// Remove the record and keep its raw line in the quarantine output.
    Quarantine,
    /// Keep the record with the missing field as null.
    Null,
}

impl std::str::FromStr for MissingRequiredPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(MissingRequiredPolicy::Drop),
            "quarantine" => Ok(MissingRequiredPolicy::Quarantine),
            "null" => Ok(MissingRequiredPolicy::Null),
            other => Err(format!(
                "unknown missing-required policy '{other}' (expected drop, quarantine or null)"
            )),
        }
    }
}

/// Counters describing one source read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReadStats {
    /// Files matched by the pattern.
    pub files: usize,
    /// Non-blank lines seen.
    pub lines: usize,
    /// Lines that were not JSON objects.
    pub corrupt_lines: usize,
    /// Records missing `userId` or `ts` (activity only).
    pub missing_required: usize,
    /// Records handed to the transform stages.
    pub records: usize,
}

impl ReadStats {
    fn merge(&mut self, other: &ReadStats) {
        self.files += other.files;
        self.lines += other.lines;
        self.corrupt_lines += other.corrupt_lines;
        self.missing_required += other.missing_required;
        self.records += other.records;
    }
}

/// A record withheld from the pipeline because a required field is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuarantinedRecord {
    /// Source file the line came from.
    pub file: PathBuf,
    /// 1-based line number within the file.
    pub line: usize,
    /// Required fields that were missing.
    pub missing: Vec<&'static str>,
    /// The raw line as read.
    pub raw: String,
}

/// Records read from one source.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch<R> {
    /// Records in file/line order.
    pub records: Vec<R>,
    /// Read counters.
    pub stats: ReadStats,
    /// Records set aside under [`MissingRequiredPolicy::Quarantine`].
    pub quarantined: Vec<QuarantinedRecord>,
}

enum Verdict<R> {
    Keep(R),
    Drop,
    Quarantine(Vec<&'static str>),
}

fn read_file<R, F>(path: &Path, classify: &F) -> SourceResult<SourceBatch<R>>
where
    R: SourceRecord,
    F: Fn(R) -> Verdict<R> + Sync,
{
    let bytes = std::fs::read(path).context(ReadFileSnafu {
        path: path.display().to_string(),
    })?;
    let text = String::from_utf8_lossy(&bytes);

    let mut batch = SourceBatch {
        records: Vec::new(),
        stats: ReadStats {
            files: 1,
            ..ReadStats::default()
        },
        quarantined: Vec::new(),
    };

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        batch.stats.lines += 1;

        let record = match parse_line::<R>(line) {
            ParsedLine::Record(r) => r,
            ParsedLine::Corrupt(r) => {
                batch.stats.corrupt_lines += 1;
                warn!(
                    "Corrupt {} record at {}:{}; fields set to null",
                    R::SOURCE,
                    path.display(),
                    idx + 1
                );
                r
            }
        };

        match classify(record) {
            Verdict::Keep(r) => batch.records.push(r),
            Verdict::Drop => {}
            Verdict::Quarantine(missing) => batch.quarantined.push(QuarantinedRecord {
                file: path.to_path_buf(),
                line: idx + 1,
                missing,
                raw: line.to_string(),
            }),
        }
    }

    batch.stats.records = batch.records.len();
    debug!(
        "Read {} {} records from {}",
        batch.stats.records,
        R::SOURCE,
        path.display()
    );
    Ok(batch)
}

fn read_source<R, F>(
    input_root: &Path,
    pattern: &SourcePattern,
    classify: F,
) -> SourceResult<SourceBatch<R>>
where
    R: SourceRecord,
    F: Fn(R) -> Verdict<R> + Sync,
{
    let files = pattern.discover(input_root)?;
    info!(
        "Reading {} source: {} files match '{}' under {}",
        R::SOURCE,
        files.len(),
        pattern,
        input_root.display()
    );

    let per_file = files
        .par_iter()
        .map(|f| read_file(f, &classify))
        .collect::<SourceResult<Vec<_>>>()?;

    let mut out = SourceBatch {
        records: Vec::new(),
        stats: ReadStats::default(),
        quarantined: Vec::new(),
    };
    for batch in per_file {
        out.stats.merge(&batch.stats);
        out.records.extend(batch.records);
        out.quarantined.extend(batch.quarantined);
    }
    Ok(out)
}

/// Read every catalog document matching `pattern` under `input_root`.
pub fn read_catalog(
    input_root: &Path,
    pattern: &SourcePattern,
) -> SourceResult<SourceBatch<CatalogRecord>> {
    read_source(input_root, pattern, Verdict::Keep)
}

/// Read every activity-log record matching `pattern` under `input_root`,
/// applying `policy` to records missing `userId` or `ts`.
pub fn read_activity(
    input_root: &Path,
    pattern: &SourcePattern,
    policy: MissingRequiredPolicy,
) -> SourceResult<SourceBatch<ActivityRecord>> {
    let mut batch = read_source(input_root, pattern, |rec: ActivityRecord| {
        let missing = rec.missing_required();
        if missing.is_empty() {
            return Verdict::Keep(rec);
        }
        match policy {
            MissingRequiredPolicy::Drop => Verdict::Drop,
            MissingRequiredPolicy::Quarantine => Verdict::Quarantine(missing),
            MissingRequiredPolicy::Null => Verdict::Keep(rec),
        }
    })?;

    // Recount from the records themselves so all three policies report alike.
    let kept_missing = batch
        .records
        .iter()
        .filter(|r| !r.missing_required().is_empty())
        .count();
    let withheld = batch.stats.lines - batch.stats.records - batch.quarantined.len();
    batch.stats.missing_required = kept_missing + withheld + batch.quarantined.len();

    if batch.stats.missing_required > 0 {
        warn!(
            "{} activity records are missing userId or ts (policy: {policy:?})",
            batch.stats.missing_required
        );
    }
    Ok(batch)
}
