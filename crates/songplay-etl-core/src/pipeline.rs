//! End-to-end run driver.
//!
//! A run reads both sources, derives the five tables, stages every table and
//! only then commits them, so a failure before the commit phase leaves all
//! previously committed tables as they were. The manifest and quarantine
//! output of an earlier run are removed before the first commit, and the
//! run report is written to `<output_root>/_manifest.json` after the last,
//! so a manifest on disk always describes the tables next to it.

use std::path::Path;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use snafu::prelude::*;

use crate::{
    config::PipelineConfig,
    records::{ActivityRecord, CatalogRecord},
    sink::{ParquetSink, SinkError, TableSpec, TableSummary},
    source::{
        MissingRequiredPolicy, QuarantinedRecord, ReadStats, SourceBatch, SourceError,
        SourcePattern, read_activity, read_catalog,
    },
    storage::{self, StorageError, StorageLocation, join_local, write_atomic},
    transform::{
        activity::{extract_users, filter_song_plays},
        catalog::{extract_artists, extract_songs},
        songplays::{CatalogIndex, compose_songplays},
        time::extract_time,
    },
};

/// Manifest file written at the output root after a successful run.
pub const MANIFEST_FILE: &str = "_manifest.json";
/// Quarantine output, relative to the output root.
pub const QUARANTINE_FILE: &str = "_quarantine/activity_records.jsonl";

/// Errors that abort a run.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PipelineError {
    /// A source could not be read.
    #[snafu(display("Failed to read the {which} source: {source}"))]
    Source {
        /// Which source failed.
        which: String,
        /// Underlying source error.
        source: SourceError,
    },

    /// A reader task panicked or was cancelled.
    #[snafu(display("Reader task for the {which} source did not complete: {source}"))]
    ReaderTask {
        /// Which source the task was reading.
        which: String,
        /// Underlying join error.
        source: tokio::task::JoinError,
    },

    /// A table could not be staged or committed.
    #[snafu(display("Failed to write output tables: {source}"))]
    Sink {
        /// Underlying sink error.
        source: SinkError,
    },

    /// A run artifact could not be written.
    #[snafu(display("Failed to write {path}: {source}"))]
    Artifact {
        /// Artifact path relative to the output root.
        path: String,
        /// Underlying storage error.
        source: StorageError,
    },

    /// A run artifact could not be serialized.
    #[snafu(display("Failed to serialize {path}: {source}"))]
    Serialize {
        /// Artifact path relative to the output root.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// Result alias for pipeline runs.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Summary of a completed run; serialized as the run manifest.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// When the run started.
    pub run_at: DateTime<Utc>,
    /// Input root as configured.
    pub input: String,
    /// Output root as configured.
    pub output: String,
    /// Session time zone used for calendar fields.
    pub session_time_zone: String,
    /// Catalog read counters (first read).
    pub catalog: ReadStats,
    /// Activity-log read counters.
    pub activity: ReadStats,
    /// Activity records that passed the playback filter.
    pub play_events: usize,
    /// Distinct catalog entries the songplay join was built from.
    pub catalog_entries: usize,
    /// Songplays matched to a catalog entry.
    pub matched_songplays: usize,
    /// Join keys matched by more than one distinct catalog entry.
    pub ambiguous_catalog_keys: usize,
    /// Activity records written to the quarantine output.
    pub quarantined: usize,
    /// Committed tables, in write order.
    pub tables: Vec<TableSummary>,
}

impl RunReport {
    /// Summary of the named table, if it was written.
    pub fn table(&self, name: &str) -> Option<&TableSummary> {
        self.tables.iter().find(|t| t.name == name)
    }
}

async fn read_catalog_blocking(
    input_root: &Path,
    pattern: &SourcePattern,
) -> PipelineResult<SourceBatch<CatalogRecord>> {
    let root = input_root.to_path_buf();
    let pattern = pattern.clone();
    tokio::task::spawn_blocking(move || read_catalog(&root, &pattern))
        .await
        .context(ReaderTaskSnafu { which: "catalog" })?
        .context(SourceSnafu { which: "catalog" })
}

async fn read_activity_blocking(
    input_root: &Path,
    pattern: &SourcePattern,
    policy: MissingRequiredPolicy,
) -> PipelineResult<SourceBatch<ActivityRecord>> {
    let root = input_root.to_path_buf();
    let pattern = pattern.clone();
    tokio::task::spawn_blocking(move || read_activity(&root, &pattern, policy))
        .await
        .context(ReaderTaskSnafu { which: "activity" })?
        .context(SourceSnafu { which: "activity" })
}

async fn clear_artifact(output: &StorageLocation, rel: &str) -> PipelineResult<()> {
    storage::remove_file_if_exists(&join_local(output, Path::new(rel)))
        .await
        .context(ArtifactSnafu { path: rel })
}

fn to_json_lines(records: &[QuarantinedRecord]) -> Result<Vec<u8>, serde_json::Error> {
    let mut out = Vec::new();
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.push(b'\n');
    }
    Ok(out)
}

/// Run the whole job described by `config`.
///
/// # Errors
///
/// Structural faults only: a missing or unreadable source, or a failure to
/// write output. Per-record faults are absorbed and counted in the report.
pub async fn run_pipeline(config: &PipelineConfig) -> PipelineResult<RunReport> {
    let run_at = Utc::now();
    let input_root = config.input.root();
    let tz = config.session_time_zone;
    info!(
        "Starting run: input {}, output {}, session time zone {tz}",
        config.input, config.output
    );

    info!("Reading song data");
    let catalog = read_catalog_blocking(input_root, &config.catalog_pattern).await?;
    let songs = extract_songs(&catalog.records);
    let artists = extract_artists(&catalog.records);
    info!(
        "Catalog: {} records -> {} songs, {} artists",
        catalog.records.len(),
        songs.len(),
        artists.len()
    );
    let catalog_stats = catalog.stats;
    drop(catalog);

    info!("Reading log data");
    let activity = read_activity_blocking(
        input_root,
        &config.activity_pattern,
        config.missing_required,
    )
    .await?;
    let activity_stats = activity.stats;
    let quarantined = activity.quarantined;
    let plays = filter_song_plays(activity.records);
    let users = extract_users(&plays);
    let time = extract_time(&plays, tz);
    info!(
        "Activity: {} records -> {} playbacks, {} users, {} distinct start times",
        activity_stats.records,
        plays.len(),
        users.len(),
        time.len()
    );

    info!("Reading song data for the songplay join");
    let join_catalog = read_catalog_blocking(input_root, &config.catalog_pattern).await?;
    let index = CatalogIndex::build(&join_catalog.records);
    drop(join_catalog);
    if index.ambiguous_keys() > 0 {
        warn!(
            "{} (title, artist, duration) keys match several catalog entries; the first is used",
            index.ambiguous_keys()
        );
    }
    let songplays = compose_songplays(&plays, &index, tz);
    let matched = songplays.iter().filter(|r| r.song_id.is_some()).count();
    info!(
        "Songplays: {} rows, {matched} matched to the catalog",
        songplays.len()
    );

    let sink = ParquetSink::new(config.output.clone(), config.credentials.as_ref());
    let staged = vec![
        sink.stage(TableSpec::SONGS, &songs).await.context(SinkSnafu)?,
        sink.stage(TableSpec::ARTISTS, &artists).await.context(SinkSnafu)?,
        sink.stage(TableSpec::USERS, &users).await.context(SinkSnafu)?,
        sink.stage(TableSpec::TIME, &time).await.context(SinkSnafu)?,
        sink.stage(TableSpec::SONGPLAYS, &songplays)
            .await
            .context(SinkSnafu)?,
    ];

    clear_artifact(&config.output, MANIFEST_FILE).await?;
    clear_artifact(&config.output, QUARANTINE_FILE).await?;

    let mut tables = Vec::with_capacity(staged.len());
    for table in staged {
        tables.push(table.commit().await.context(SinkSnafu)?);
    }

    if config.missing_required == MissingRequiredPolicy::Quarantine {
        let bytes = to_json_lines(&quarantined).context(SerializeSnafu {
            path: QUARANTINE_FILE,
        })?;
        write_atomic(&config.output, Path::new(QUARANTINE_FILE), &bytes)
            .await
            .context(ArtifactSnafu {
                path: QUARANTINE_FILE,
            })?;
        if !quarantined.is_empty() {
            warn!(
                "Quarantined {} activity records to {QUARANTINE_FILE}",
                quarantined.len()
            );
        }
    }

    let report = RunReport {
        run_at,
        input: config.input.to_string(),
        output: config.output.to_string(),
        session_time_zone: tz.to_string(),
        catalog: catalog_stats,
        activity: activity_stats,
        play_events: plays.len(),
        catalog_entries: index.entries(),
        matched_songplays: matched,
        ambiguous_catalog_keys: index.ambiguous_keys(),
        quarantined: quarantined.len(),
        tables,
    };

    let manifest = serde_json::to_vec_pretty(&report).context(SerializeSnafu {
        path: MANIFEST_FILE,
    })?;
    write_atomic(&config.output, Path::new(MANIFEST_FILE), &manifest)
        .await
        .context(ArtifactSnafu {
            path: MANIFEST_FILE,
        })?;

    info!("Run complete: {} tables written to {}", report.tables.len(), config.output);
    Ok(report)
}
