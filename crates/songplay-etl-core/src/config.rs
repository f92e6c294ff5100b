//! Run configuration passed explicitly into [`crate::pipeline::run_pipeline`].

use std::fmt;

use crate::{
    source::{MissingRequiredPolicy, PatternError, SourcePattern},
    storage::StorageLocation,
    transform::time::SessionTimeZone,
};

/// Default catalog pattern: three directory levels below `song_data`.
pub const DEFAULT_CATALOG_PATTERN: &str = "song_data/*/*/*/*";
/// Default activity-log pattern.
pub const DEFAULT_ACTIVITY_PATTERN: &str = "log_data/*";

/// Object-store credentials.
///
/// Carried to the sink for backends that authenticate; the local backend
/// does not use them. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
}

impl Credentials {
    /// Bundle an access key pair.
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Credentials {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    /// The access key id.
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secret = if self.secret_access_key.is_empty() {
            "<empty>"
        } else {
            "<redacted>"
        };
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &secret)
            .finish()
    }
}

/// Everything a pipeline run needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root the source patterns are resolved against.
    pub input: StorageLocation,
    /// Root the five tables are written under.
    pub output: StorageLocation,
    /// Pattern selecting catalog files.
    pub catalog_pattern: SourcePattern,
    /// Pattern selecting activity-log files.
    pub activity_pattern: SourcePattern,
    /// Handling of activity records missing `userId` or `ts`.
    pub missing_required: MissingRequiredPolicy,
    /// Zone in which calendar fields and time partitions are computed.
    pub session_time_zone: SessionTimeZone,
    /// Credentials for the output store, if any.
    pub credentials: Option<Credentials>,
}

impl PipelineConfig {
    /// A configuration with the default patterns and policies.
    pub fn new(input: StorageLocation, output: StorageLocation) -> Result<Self, PatternError> {
        Ok(PipelineConfig {
            input,
            output,
            catalog_pattern: DEFAULT_CATALOG_PATTERN.parse()?,
            activity_pattern: DEFAULT_ACTIVITY_PATTERN.parse()?,
            missing_required: MissingRequiredPolicy::default(),
            session_time_zone: SessionTimeZone::default(),
            credentials: None,
        })
    }
}
