//! Core of a batch ETL job that turns a song catalog and a user-activity log
//! into a partitioned Parquet star schema.
//!
//! The crate is organized by stage:
//!
//! - Raw record types and per-field schema enforcement (`records` module).
//! - Glob-style source discovery and parallel JSON Lines reading
//!   (`source` module).
//! - Pure transform stages producing the song, artist, user and time
//!   dimensions and the songplay fact table (`transform` module).
//! - A Parquet sink with hive-style partitions and staged, swap-in commits
//!   (`sink` module) over local filesystem primitives (`storage` module).
//! - The run driver that wires the stages together and writes a run
//!   manifest (`pipeline` module), configured by an explicit
//!   `PipelineConfig` (`config` module).
//!
//! The command-line runner lives in the `songplay-etl-cli` crate and only
//! builds a `PipelineConfig` and calls `run_pipeline`.
#![deny(missing_docs)]
pub mod config;
pub mod pipeline;
pub mod records;
pub mod sink;
pub mod source;
pub mod storage;
pub mod transform;

pub use config::{Credentials, PipelineConfig};
pub use pipeline::{PipelineError, RunReport, run_pipeline};
