use std::io;

use snafu::{Backtrace, prelude::*};

/// Errors raised by the local storage backend.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// A filesystem call failed.
    #[snafu(display("I/O error at {path}: {source}"))]
    Io {
        /// Path, or `from -> to` pair, the call operated on.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
        /// Captured at the failing call.
        backtrace: Backtrace,
    },

    /// A location string was empty after trimming.
    #[snafu(display("Storage location is empty"))]
    EmptyLocation,

    /// The location names a backend this build cannot talk to.
    #[snafu(display(
        "Unsupported storage scheme '{scheme}' in {spec}; only local paths are supported"
    ))]
    UnsupportedScheme {
        /// The full location string as given.
        spec: String,
        /// The scheme prefix (for example `s3a`).
        scheme: String,
    },
}
