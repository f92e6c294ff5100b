//! Glob-style source patterns.
//!
//! A pattern is a `/`-separated path relative to the input root, for example
//! `song_data/*/*/*/*` or `log_data/2018/*/*.json`. Leading segments without
//! wildcards form a literal prefix directory; every later segment matches
//! exactly one path component. `*` matches any run of characters inside a
//! component and `?` exactly one. When the last segment matches a directory,
//! every file beneath it is read, so `log_data/*` picks up
//! `log_data/2018/11/events.json`. A trailing `**` is accepted and means the
//! same for the preceding segments.
//!
//! Names starting with `.` or `_` are hidden (checksum files, `_SUCCESS`
//! markers, editor droppings) and never match.

use std::{
    fmt,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

use regex::Regex;
use snafu::prelude::*;
use walkdir::WalkDir;

use crate::source::{SourceMissingSnafu, SourceResult, WalkSnafu};

/// Errors raised while parsing a source pattern.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PatternError {
    /// The pattern had no path segments.
    #[snafu(display("source pattern is empty"))]
    EmptyPattern,

    /// Patterns are relative to the input root.
    #[snafu(display("source pattern '{pattern}' must be relative to the input root"))]
    AbsolutePattern {
        /// The offending pattern.
        pattern: String,
    },

    /// `..` would escape the input root.
    #[snafu(display("source pattern '{pattern}' must not contain '..'"))]
    ParentSegment {
        /// The offending pattern.
        pattern: String,
    },

    /// `**` is only supported as the final segment.
    #[snafu(display("'**' must be the last segment of source pattern '{pattern}'"))]
    RecursiveNotLast {
        /// The offending pattern.
        pattern: String,
    },

    /// A wildcard segment could not be compiled.
    #[snafu(display("invalid segment '{segment}' in source pattern: {source}"))]
    InvalidSegment {
        /// The segment that failed to compile.
        segment: String,
        /// Underlying regex error.
        source: regex::Error,
    },
}

#[derive(Debug, Clone)]
enum SegmentMatcher {
    Any,
    Glob(Regex),
}

impl SegmentMatcher {
    fn compile(segment: &str) -> Result<Self, PatternError> {
        if segment == "*" {
            return Ok(SegmentMatcher::Any);
        }

        let mut re = String::with_capacity(segment.len() + 8);
        re.push('^');
        for c in segment.chars() {
            match c {
                '*' => re.push_str(".*"),
                '?' => re.push('.'),
                other => re.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
            }
        }
        re.push('$');

        Regex::new(&re)
            .map(SegmentMatcher::Glob)
            .context(InvalidSegmentSnafu {
                segment: segment.to_string(),
            })
    }

    fn matches(&self, name: &str) -> bool {
        match self {
            SegmentMatcher::Any => true,
            SegmentMatcher::Glob(re) => re.is_match(name),
        }
    }
}

fn has_wildcard(segment: &str) -> bool {
    segment.contains(['*', '?'])
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_')
}

/// A parsed source pattern.
#[derive(Debug, Clone)]
pub struct SourcePattern {
    raw: String,
    prefix: PathBuf,
    matchers: Vec<SegmentMatcher>,
    recursive: bool,
}

impl SourcePattern {
    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// List the regular files under `input_root` that match this pattern,
    /// sorted by path.
    ///
    /// # Errors
    ///
    /// Fails with `SourceMissing` when the literal prefix directory does not
    /// exist and with `Walk` when a directory cannot be listed. A pattern
    /// that matches nothing yields an empty list.
    pub fn discover(&self, input_root: &Path) -> SourceResult<Vec<PathBuf>> {
        let base = input_root.join(&self.prefix);
        let meta = std::fs::metadata(&base).context(SourceMissingSnafu {
            path: base.display().to_string(),
        })?;

        if meta.is_file() {
            // Fully literal pattern naming a single file.
            return Ok(if self.matchers.is_empty() && !self.recursive {
                vec![base]
            } else {
                Vec::new()
            });
        }

        let depth = self.matchers.len();
        let walker = WalkDir::new(&base).follow_links(true).min_depth(depth.max(1));

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.context(WalkSnafu {
                path: base.display().to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(rel) = entry.path().strip_prefix(&base) else {
                continue;
            };
            if self.matches_relative(rel) {
                files.push(entry.into_path());
            }
        }

        files.sort();
        Ok(files)
    }

    fn matches_relative(&self, rel: &Path) -> bool {
        let names: Vec<&str> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();

        if names.iter().any(|n| is_hidden(n)) {
            return false;
        }

        // Files deeper than the pattern sit under a matched directory.
        let depth_ok = if self.recursive {
            names.len() > self.matchers.len()
        } else {
            names.len() >= self.matchers.len().max(1)
        };

        depth_ok
            && self
                .matchers
                .iter()
                .zip(names.iter())
                .all(|(m, name)| m.matches(name))
    }
}

impl FromStr for SourcePattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        ensure!(
            !raw.starts_with('/'),
            AbsolutePatternSnafu {
                pattern: raw.to_string()
            }
        );

        let segments: Vec<&str> = raw
            .split('/')
            .filter(|seg| !seg.is_empty() && *seg != ".")
            .collect();
        ensure!(!segments.is_empty(), EmptyPatternSnafu);
        ensure!(
            !segments.contains(&".."),
            ParentSegmentSnafu {
                pattern: raw.to_string()
            }
        );

        let mut prefix = PathBuf::new();
        let mut matchers = Vec::new();
        let mut recursive = false;

        for (idx, seg) in segments.iter().enumerate() {
            if *seg == "**" {
                ensure!(
                    idx + 1 == segments.len(),
                    RecursiveNotLastSnafu {
                        pattern: raw.to_string()
                    }
                );
                recursive = true;
            } else if matchers.is_empty() && !has_wildcard(seg) {
                prefix.push(seg);
            } else {
                matchers.push(SegmentMatcher::compile(seg)?);
            }
        }

        Ok(SourcePattern {
            raw: raw.to_string(),
            prefix,
            matchers,
            recursive,
        })
    }
}

impl fmt::Display for SourcePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
