//! Pure transform stages from source records to star-schema rows.
//!
//! Nothing here performs I/O. Each stage takes whole record sets and returns
//! fresh row vectors:
//!
//! - [`catalog`]: song and artist dimensions,
//! - [`activity`]: the playback filter and the user dimension,
//! - [`time`]: timestamp conversion and the time dimension,
//! - [`songplays`]: the fact table joined against the catalog.

pub mod activity;
pub mod catalog;
pub mod dedup;
pub mod songplays;
pub mod time;
