//! Local storage roots and the filesystem primitives the sink commits with.
//!
//! A [`StorageLocation`] is the input or output root of a run. Paths below
//! it are always relative; [`join_local`] resolves them. Single files are
//! written with [`write_atomic`]; whole table trees are swapped with
//! [`rename`] and cleaned up with [`CleanupGuard`].
//!
//! Object-store URIs are rejected when the location is parsed, so a
//! misconfigured run fails before reading anything.

mod error;

pub use error::StorageError;

use std::{
    io,
    path::{Path, PathBuf},
};

use snafu::prelude::*;
use tokio::{fs, io::AsyncWriteExt};

use crate::storage::error::{EmptyLocationSnafu, IoSnafu, UnsupportedSchemeSnafu};

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// A storage root: where a run reads its sources from or writes its tables to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StorageLocation {
    /// A root on the local filesystem.
    Local(PathBuf),
}

impl StorageLocation {
    /// A local filesystem root.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        StorageLocation::Local(root.into())
    }

    /// Parse a user-facing location string.
    ///
    /// Plain paths and `file://` URIs map to [`StorageLocation::Local`]; any
    /// other `<scheme>://` prefix fails with `UnsupportedScheme`.
    pub fn parse(spec: &str) -> StorageResult<Self> {
        let trimmed = spec.trim();
        ensure!(!trimmed.is_empty(), EmptyLocationSnafu);

        match trimmed.split_once("://") {
            Some(("file", rest)) => Ok(StorageLocation::Local(PathBuf::from(rest))),
            Some((scheme, _)) => UnsupportedSchemeSnafu {
                spec: trimmed.to_string(),
                scheme: scheme.to_string(),
            }
            .fail(),
            None => Ok(StorageLocation::Local(PathBuf::from(trimmed))),
        }
    }

    /// The local root directory.
    pub fn root(&self) -> &Path {
        match self {
            StorageLocation::Local(root) => root,
        }
    }
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.root().display())
    }
}

fn at(path: &Path) -> IoSnafu<String> {
    IoSnafu {
        path: path.display().to_string(),
    }
}

fn absent_is_ok(result: io::Result<()>, path: &Path) -> StorageResult<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other.context(at(path)),
    }
}

/// Resolve a root-relative path to a local path.
pub(crate) fn join_local(location: &StorageLocation, rel: &Path) -> PathBuf {
    location.root().join(rel)
}

pub(crate) async fn create_dir_all(abs: &Path) -> StorageResult<()> {
    fs::create_dir_all(abs).await.context(at(abs))
}

/// Whether `abs` exists; only `NotFound` counts as absent.
pub(crate) async fn exists(abs: &Path) -> StorageResult<bool> {
    match fs::metadata(abs).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).context(at(abs)),
    }
}

/// Remove a directory tree; a missing tree is not an error.
pub(crate) async fn remove_dir_all_if_exists(abs: &Path) -> StorageResult<()> {
    absent_is_ok(fs::remove_dir_all(abs).await, abs)
}

/// Remove a single file; a missing file is not an error.
pub(crate) async fn remove_file_if_exists(abs: &Path) -> StorageResult<()> {
    absent_is_ok(fs::remove_file(abs).await, abs)
}

pub(crate) async fn rename(from: &Path, to: &Path) -> StorageResult<()> {
    fs::rename(from, to).await.context(IoSnafu {
        path: format!("{} -> {}", from.display(), to.display()),
    })
}

/// Removes a temporary file or directory tree on drop unless disarmed.
///
/// Armed on every write that is published by a later rename; disarmed once
/// the rename succeeded.
#[derive(Debug)]
pub(crate) struct CleanupGuard {
    path: PathBuf,
    tree: bool,
    armed: bool,
}

impl CleanupGuard {
    /// Guard a single temporary file.
    pub(crate) fn file(path: PathBuf) -> Self {
        Self {
            path,
            tree: false,
            armed: true,
        }
    }

    /// Guard a temporary directory and everything below it.
    pub(crate) fn tree(path: PathBuf) -> Self {
        Self {
            path,
            tree: true,
            armed: true,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Runs on an error path; a second failure here is not reported.
        let _ = if self.tree {
            std::fs::remove_dir_all(&self.path)
        } else {
            std::fs::remove_file(&self.path)
        };
    }
}

/// Write `contents` to `rel_path` below `location`, replacing any file there.
///
/// The bytes go to a `.tmp` sibling first, are synced, and are renamed over
/// the target, so the target is never seen half written.
///
/// # Errors
///
/// `StorageError::Io` when a filesystem step fails. The temporary file is
/// removed on every error path.
pub async fn write_atomic(
    location: &StorageLocation,
    rel_path: &Path,
    contents: &[u8],
) -> StorageResult<()> {
    let abs = join_local(location, rel_path);
    if let Some(parent) = abs.parent() {
        create_dir_all(parent).await?;
    }

    let tmp_path = abs.with_extension("tmp");
    let mut guard = CleanupGuard::file(tmp_path.clone());

    let mut file = fs::File::create(&tmp_path).await.context(at(&tmp_path))?;
    file.write_all(contents).await.context(at(&tmp_path))?;
    file.sync_all().await.context(at(&tmp_path))?;
    drop(file);

    fs::rename(&tmp_path, &abs).await.context(at(&abs))?;
    guard.disarm();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn parse_accepts_plain_and_file_paths() -> TestResult {
        assert_eq!(
            StorageLocation::parse("  out/tables ")?,
            StorageLocation::local("out/tables")
        );
        assert_eq!(
            StorageLocation::parse("file:///data/out")?,
            StorageLocation::local("/data/out")
        );
        Ok(())
    }

    #[test]
    fn parse_rejects_object_store_uris() {
        let err = StorageLocation::parse("s3a://sparkify-warehouse/")
            .expect_err("object store scheme must be rejected");
        match err {
            StorageError::UnsupportedScheme { scheme, .. } => assert_eq!(scheme, "s3a"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn parse_rejects_empty() {
        let err = StorageLocation::parse("   ").expect_err("empty location");
        assert!(matches!(err, StorageError::EmptyLocation));
    }

    #[tokio::test]
    async fn write_atomic_creates_parent_directories() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StorageLocation::local(tmp.path());

        let rel_path = Path::new("_quarantine/activity_records.jsonl");
        write_atomic(&location, rel_path, b"{}\n").await?;

        let read_back = tokio::fs::read_to_string(tmp.path().join(rel_path)).await?;
        assert_eq!(read_back, "{}\n");
        Ok(())
    }

    #[tokio::test]
    async fn write_atomic_overwrites_and_leaves_no_tmp_file() -> TestResult {
        let tmp = TempDir::new()?;
        let location = StorageLocation::local(tmp.path());
        let rel_path = Path::new("_manifest.json");

        write_atomic(&location, rel_path, b"original").await?;
        write_atomic(&location, rel_path, b"updated").await?;

        let read_back = tokio::fs::read_to_string(tmp.path().join(rel_path)).await?;
        assert_eq!(read_back, "updated");
        assert!(!tmp.path().join("_manifest.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn remove_file_if_exists_ignores_missing() -> TestResult {
        let tmp = TempDir::new()?;
        let manifest = tmp.path().join("_manifest.json");
        remove_file_if_exists(&manifest).await?;

        std::fs::write(&manifest, "{}")?;
        remove_file_if_exists(&manifest).await?;
        assert!(!manifest.exists());
        Ok(())
    }

    #[test]
    fn armed_tree_guard_removes_directory() -> TestResult {
        let tmp = TempDir::new()?;
        let staging = tmp.path().join(".songs_table.parquet.staging");
        std::fs::create_dir_all(staging.join("year=2018"))?;
        std::fs::write(staging.join("year=2018/part-00000.parquet"), b"PAR1")?;

        drop(CleanupGuard::tree(staging.clone()));
        assert!(!staging.exists());
        Ok(())
    }

    #[test]
    fn disarmed_guard_keeps_its_path() -> TestResult {
        let tmp = TempDir::new()?;
        let file = tmp.path().join("_manifest.tmp");
        std::fs::write(&file, b"{}")?;

        let mut guard = CleanupGuard::file(file.clone());
        guard.disarm();
        drop(guard);
        assert!(file.exists());

        drop(CleanupGuard::file(file.clone()));
        assert!(!file.exists());
        Ok(())
    }

    #[tokio::test]
    async fn remove_dir_all_if_exists_ignores_missing() -> TestResult {
        let tmp = TempDir::new()?;
        let missing = tmp.path().join("never-created");
        remove_dir_all_if_exists(&missing).await?;

        let present = tmp.path().join("staged/year=2018");
        create_dir_all(&present).await?;
        remove_dir_all_if_exists(&tmp.path().join("staged")).await?;
        assert!(!exists(&tmp.path().join("staged")).await?);
        Ok(())
    }
}
