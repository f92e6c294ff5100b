//! Partitioned Parquet sink with staged, swap-in commits.
//!
//! A table is written in two steps:
//!
//! 1. [`ParquetSink::stage`] encodes the rows and writes every partition file
//!    into a hidden staging directory next to the table.
//! 2. [`StagedTable::commit`] swaps the staging directory into place with
//!    renames: the previous table is moved aside, the staged one is moved in,
//!    and the previous one is deleted.
//!
//! Readers of `<name>/<name>.parquet` therefore see either the previous
//! table or the complete new one. Dropping a [`StagedTable`] without
//! committing deletes the staging directory and leaves the previous table
//! untouched. See [`layout`] for the directory structure.

pub mod encode;
pub mod layout;

pub use encode::{START_TIME_TZ, TableRow};

use std::{collections::BTreeMap, path::PathBuf};

use arrow::{error::ArrowError, record_batch::RecordBatch};
use log::{debug, info, warn};
use parquet::{
    arrow::ArrowWriter, basic::Compression, errors::ParquetError,
    file::properties::WriterProperties,
};
use serde::Serialize;
use snafu::prelude::*;

use crate::{
    config::Credentials,
    storage::{self, CleanupGuard, StorageError, StorageLocation, join_local, write_atomic},
};

/// Errors raised while writing a table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SinkError {
    /// A filesystem step failed.
    #[snafu(display("Storage error while writing {table}: {source}"))]
    Storage {
        /// The table being written.
        table: String,
        /// Underlying storage error.
        source: StorageError,
    },

    /// Rows could not be assembled into an Arrow batch.
    #[snafu(display("Failed to encode {table} rows as Arrow: {source}"))]
    Encode {
        /// The table being written.
        table: String,
        /// Underlying Arrow error.
        source: ArrowError,
    },

    /// A batch could not be serialized as Parquet.
    #[snafu(display("Failed to write Parquet file {path} of {table}: {source}"))]
    Parquet {
        /// The table being written.
        table: String,
        /// Path of the file relative to the table directory.
        path: String,
        /// Underlying Parquet error.
        source: ParquetError,
    },
}

/// Result alias for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Logical name and partition columns of an output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name; also names its directory.
    pub name: &'static str,
    /// Partition columns, outermost first.
    pub partition_by: &'static [&'static str],
}

impl TableSpec {
    /// Song dimension.
    pub const SONGS: TableSpec = TableSpec {
        name: "songs_table",
        partition_by: &["year", "artist_id"],
    };
    /// Artist dimension.
    pub const ARTISTS: TableSpec = TableSpec {
        name: "artist_table",
        partition_by: &[],
    };
    /// User dimension.
    pub const USERS: TableSpec = TableSpec {
        name: "users_table",
        partition_by: &[],
    };
    /// Time dimension.
    pub const TIME: TableSpec = TableSpec {
        name: "time_table",
        partition_by: &["year", "month"],
    };
    /// Songplay fact table.
    pub const SONGPLAYS: TableSpec = TableSpec {
        name: "songplays_table",
        partition_by: &["year", "month"],
    };

    /// Every table a run produces, in write order.
    pub const ALL: [TableSpec; 5] = [
        TableSpec::SONGS,
        TableSpec::ARTISTS,
        TableSpec::USERS,
        TableSpec::TIME,
        TableSpec::SONGPLAYS,
    ];

    /// Table directory relative to the output root.
    pub fn rel_dir(&self) -> PathBuf {
        layout::table_dir(self.name)
    }
}

/// What a committed table holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    /// Table name.
    pub name: String,
    /// Rows written.
    pub rows: usize,
    /// Partition directories written (0 for unpartitioned tables).
    pub partitions: usize,
    /// Table directory relative to the output root.
    pub path: PathBuf,
}

/// Writes tables under an output root.
#[derive(Debug, Clone)]
pub struct ParquetSink {
    location: StorageLocation,
    props: WriterProperties,
}

impl ParquetSink {
    /// Create a sink writing under `location`.
    pub fn new(location: StorageLocation, credentials: Option<&Credentials>) -> Self {
        if let Some(creds) = credentials {
            debug!(
                "Credentials for access key {} supplied; the local backend does not use them",
                creds.access_key_id()
            );
        }
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        ParquetSink { location, props }
    }

    /// Write `rows` into a fresh staging directory for `spec`.
    ///
    /// Rows are grouped by partition value; within a partition they keep
    /// their input order. An empty input writes a single zero-row file so
    /// the committed table is still readable.
    ///
    /// # Errors
    ///
    /// Any encode or filesystem failure. The staging directory is removed on
    /// every error path.
    pub async fn stage<R: TableRow>(&self, spec: TableSpec, rows: &[R]) -> SinkResult<StagedTable> {
        let table = spec.name;
        let staging_abs = join_local(&self.location, &layout::staging_dir(table));

        storage::remove_dir_all_if_exists(&staging_abs)
            .await
            .context(StorageSnafu { table })?;
        storage::create_dir_all(&staging_abs)
            .await
            .context(StorageSnafu { table })?;
        let guard = CleanupGuard::tree(staging_abs.clone());
        let staging = StorageLocation::local(staging_abs);

        let mut groups: BTreeMap<Vec<Option<String>>, Vec<&R>> = BTreeMap::new();
        for row in rows {
            let key = spec
                .partition_by
                .iter()
                .map(|col| row.partition_value(col))
                .collect();
            groups.entry(key).or_default().push(row);
        }
        if groups.is_empty() {
            groups.insert(Vec::new(), Vec::new());
        }

        for (values, members) in &groups {
            let rel = layout::partition_dir(spec.partition_by, values).join(layout::PART_FILE);
            let batch = R::encode(members).context(EncodeSnafu { table })?;
            let bytes = self.to_parquet(&batch).context(ParquetSnafu {
                table,
                path: rel.display().to_string(),
            })?;

            write_atomic(&staging, &rel, &bytes)
                .await
                .context(StorageSnafu { table })?;
            debug!(
                "Staged {} rows of {table} into {}",
                batch.num_rows(),
                rel.display()
            );
        }

        let partitions = if spec.partition_by.is_empty() || rows.is_empty() {
            0
        } else {
            groups.len()
        };
        info!(
            "Staged {table}: {} rows in {partitions} partitions",
            rows.len()
        );

        Ok(StagedTable {
            spec,
            location: self.location.clone(),
            guard,
            rows: rows.len(),
            partitions,
        })
    }

    fn to_parquet(&self, batch: &RecordBatch) -> Result<Vec<u8>, ParquetError> {
        let mut writer =
            ArrowWriter::try_new(Vec::new(), batch.schema(), Some(self.props.clone()))?;
        writer.write(batch)?;
        writer.into_inner()
    }
}

/// A fully written table waiting to be swapped into place.
#[derive(Debug)]
pub struct StagedTable {
    spec: TableSpec,
    location: StorageLocation,
    guard: CleanupGuard,
    rows: usize,
    partitions: usize,
}

impl StagedTable {
    /// Rows staged.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Replace the committed table with the staged one.
    ///
    /// # Errors
    ///
    /// Fails when a rename fails. If the staged table cannot be moved in
    /// after the previous one was moved aside, the previous table is moved
    /// back before the error is returned.
    pub async fn commit(mut self) -> SinkResult<TableSummary> {
        let table = self.spec.name;
        let target = join_local(&self.location, &layout::table_dir(table));
        let replaced = join_local(&self.location, &layout::replaced_dir(table));

        storage::remove_dir_all_if_exists(&replaced)
            .await
            .context(StorageSnafu { table })?;

        let had_previous = storage::exists(&target)
            .await
            .context(StorageSnafu { table })?;
        if had_previous {
            storage::rename(&target, &replaced)
                .await
                .context(StorageSnafu { table })?;
        }

        if let Err(e) = storage::rename(self.guard.path(), &target).await {
            if had_previous {
                if let Err(restore) = storage::rename(&replaced, &target).await {
                    warn!("Could not restore previous {table} after failed commit: {restore}");
                }
            }
            return Err(e).context(StorageSnafu { table });
        }
        self.guard.disarm();

        if had_previous {
            if let Err(e) = storage::remove_dir_all_if_exists(&replaced).await {
                warn!("Committed {table} but could not remove the previous copy: {e}");
            }
        }

        info!("Committed {table} ({} rows)", self.rows);
        Ok(TableSummary {
            name: table.to_string(),
            rows: self.rows,
            partitions: self.partitions,
            path: self.spec.rel_dir(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{activity::UserRow, catalog::SongRow};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::{fs::File, path::Path};
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn song(id: &str, artist_id: Option<&str>, year: Option<i32>) -> SongRow {
        SongRow {
            song_id: Some(id.to_string()),
            title: Some(format!("{id} title")),
            artist_id: artist_id.map(str::to_string),
            year,
            duration: Some(200.0),
        }
    }

    fn user(id: i32) -> UserRow {
        UserRow {
            user_id: id,
            first_name: Some("Ada".to_string()),
            last_name: None,
            gender: None,
            level: Some("free".to_string()),
        }
    }

    fn count_rows(path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?.build()?;
        let mut rows = 0;
        for batch in reader {
            rows += batch?.num_rows();
        }
        Ok(rows)
    }

    #[tokio::test]
    async fn partitioned_table_uses_hive_layout() -> TestResult {
        let tmp = TempDir::new()?;
        let sink = ParquetSink::new(StorageLocation::local(tmp.path()), None);

        let rows = vec![
            song("S1", Some("AR1"), Some(1999)),
            song("S2", Some("AR1"), Some(1999)),
            song("S3", Some("AR/2"), None),
        ];
        let summary = sink.stage(TableSpec::SONGS, &rows).await?.commit().await?;
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.partitions, 2);

        let table = tmp.path().join("songs_table/songs_table.parquet");
        assert_eq!(
            count_rows(&table.join("year=1999/artist_id=AR1").join(layout::PART_FILE))?,
            2
        );
        let default_dir = format!("year={}/artist_id=AR%2F2", layout::DEFAULT_PARTITION);
        assert_eq!(count_rows(&table.join(default_dir).join(layout::PART_FILE))?, 1);
        assert!(!tmp.path().join("songs_table/.songs_table.parquet.staging").exists());
        Ok(())
    }

    #[tokio::test]
    async fn commit_replaces_previous_contents() -> TestResult {
        let tmp = TempDir::new()?;
        let sink = ParquetSink::new(StorageLocation::local(tmp.path()), None);

        sink.stage(TableSpec::SONGS, &[song("S1", Some("AR1"), Some(1999))])
            .await?
            .commit()
            .await?;
        sink.stage(TableSpec::SONGS, &[song("S9", Some("AR9"), Some(2001))])
            .await?
            .commit()
            .await?;

        let table = tmp.path().join("songs_table/songs_table.parquet");
        assert!(!table.join("year=1999").exists());
        assert!(table.join("year=2001/artist_id=AR9").join(layout::PART_FILE).exists());
        assert!(!tmp.path().join("songs_table/.songs_table.parquet.replaced").exists());
        Ok(())
    }

    #[tokio::test]
    async fn dropped_staging_leaves_previous_table() -> TestResult {
        let tmp = TempDir::new()?;
        let sink = ParquetSink::new(StorageLocation::local(tmp.path()), None);

        sink.stage(TableSpec::USERS, &[user(1)]).await?.commit().await?;
        let staged = sink.stage(TableSpec::USERS, &[user(2), user(3)]).await?;
        assert_eq!(staged.rows(), 2);
        drop(staged);

        let table = tmp.path().join("users_table/users_table.parquet");
        assert_eq!(count_rows(&table.join(layout::PART_FILE))?, 1);
        assert!(!tmp.path().join("users_table/.users_table.parquet.staging").exists());
        Ok(())
    }

    #[tokio::test]
    async fn empty_table_writes_one_readable_file() -> TestResult {
        let tmp = TempDir::new()?;
        let sink = ParquetSink::new(StorageLocation::local(tmp.path()), None);

        let rows: Vec<SongRow> = Vec::new();
        let summary = sink.stage(TableSpec::SONGS, &rows).await?.commit().await?;
        assert_eq!((summary.rows, summary.partitions), (0, 0));

        let file = tmp
            .path()
            .join("songs_table/songs_table.parquet")
            .join(layout::PART_FILE);
        assert_eq!(count_rows(&file)?, 0);
        Ok(())
    }

    #[test]
    fn table_specs_have_distinct_paths() {
        let mut dirs: Vec<PathBuf> = TableSpec::ALL.iter().map(TableSpec::rel_dir).collect();
        dirs.sort();
        dirs.dedup();
        assert_eq!(dirs.len(), TableSpec::ALL.len());
    }
}
