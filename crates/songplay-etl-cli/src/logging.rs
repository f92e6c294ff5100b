use std::path::Path;

use log::LevelFilter;
use snafu::ResultExt;

use crate::error::{CliResult, InstallLoggerSnafu, OpenLogFileSnafu};

/// Route `log` records to stderr at `level` and, when `log_file` is given,
/// append them to that file at `file_level`.
pub fn setup_logging(
    level: LevelFilter,
    log_file: Option<&Path>,
    file_level: LevelFilter,
) -> CliResult<()> {
    let console = fern::Dispatch::new()
        .level(level)
        .chain(std::io::stderr());

    let mut root = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} {:<5} {}: {}",
                chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level.max(if log_file.is_some() { file_level } else { level }))
        .chain(console);

    if let Some(path) = log_file {
        let file = fern::log_file(path).context(OpenLogFileSnafu { path })?;
        root = root.chain(fern::Dispatch::new().level(file_level).chain(file));
    }

    root.apply().context(InstallLoggerSnafu)
}
