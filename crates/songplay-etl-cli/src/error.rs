use std::path::PathBuf;

use snafu::Snafu;
use songplay_etl_core::{
    PipelineError,
    source::PatternError,
    storage::StorageError,
    transform::time::TimeZoneError,
};

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Failed to read config file {}", path.display()))]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to parse config file {}", path.display()))]
    ParseConfig {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("Failed to render the default configuration"))]
    RenderConfig { source: toml::ser::Error },

    #[snafu(display("Invalid {what} '{spec}'"))]
    InvalidLocation {
        what: String,
        spec: String,
        source: StorageError,
    },

    #[snafu(display("Invalid {what} '{pattern}'"))]
    InvalidPattern {
        what: String,
        pattern: String,
        source: PatternError,
    },

    #[snafu(display("Invalid session time zone"))]
    InvalidTimeZone { source: TimeZoneError },

    #[snafu(display(
        "Only one of AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY is set. \
         Provide both or neither."
    ))]
    IncompleteCredentials,

    #[snafu(display("Failed to open log file {}", path.display()))]
    OpenLogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to install the logger"))]
    InstallLogger { source: log::SetLoggerError },

    #[snafu(display("ETL run failed"))]
    Pipeline { source: PipelineError },
}
