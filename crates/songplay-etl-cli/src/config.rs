//! TOML configuration file.
//!
//! ```toml
//! [default]
//! AWS_ACCESS_KEY_ID = "..."
//! AWS_SECRET_ACCESS_KEY = "..."
//!
//! [paths]
//! input_root = "data/"
//! output_root = "out/"
//! catalog_pattern = "song_data/*/*/*/*"
//! activity_pattern = "log_data/*"
//!
//! [pipeline]
//! missing_required = "drop"
//! session_time_zone = "UTC"
//! ```
//!
//! Every key is optional. The `[default]` section keeps the layout of the
//! credential files the job has always been deployed with.

use std::path::Path;

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use songplay_etl_core::{
    Credentials, PipelineConfig,
    config::{DEFAULT_ACTIVITY_PATTERN, DEFAULT_CATALOG_PATTERN},
    source::{MissingRequiredPolicy, SourcePattern},
    storage::StorageLocation,
    transform::time::SessionTimeZone,
};

use crate::error::{
    CliResult, IncompleteCredentialsSnafu, InvalidLocationSnafu, InvalidPatternSnafu,
    InvalidTimeZoneSnafu, ParseConfigSnafu, ReadConfigSnafu, RenderConfigSnafu,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsSection {
    #[serde(rename = "AWS_ACCESS_KEY_ID", skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(rename = "AWS_SECRET_ACCESS_KEY", skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub input_root: String,
    pub output_root: String,
    pub catalog_pattern: String,
    pub activity_pattern: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        PathsSection {
            input_root: "data/".to_string(),
            output_root: "out/".to_string(),
            catalog_pattern: DEFAULT_CATALOG_PATTERN.to_string(),
            activity_pattern: DEFAULT_ACTIVITY_PATTERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub missing_required: MissingRequiredPolicy,
    pub session_time_zone: String,
}

impl Default for PipelineSection {
    fn default() -> Self {
        PipelineSection {
            missing_required: MissingRequiredPolicy::default(),
            session_time_zone: SessionTimeZone::default().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfigFile {
    pub default: CredentialsSection,
    pub paths: PathsSection,
    pub pipeline: PipelineSection,
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub input_root: Option<String>,
    pub output_root: Option<String>,
    pub missing_required: Option<MissingRequiredPolicy>,
    pub session_time_zone: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl EtlConfigFile {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> CliResult<Self> {
        let contents = std::fs::read_to_string(path).context(ReadConfigSnafu { path })?;
        toml::from_str(&contents).context(ParseConfigSnafu { path })
    }

    pub fn to_toml(&self) -> CliResult<String> {
        toml::to_string_pretty(self).context(RenderConfigSnafu)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        let Overrides {
            input_root,
            output_root,
            missing_required,
            session_time_zone,
            access_key_id,
            secret_access_key,
        } = overrides;

        if let Some(v) = input_root {
            self.paths.input_root = v;
        }
        if let Some(v) = output_root {
            self.paths.output_root = v;
        }
        if let Some(v) = missing_required {
            self.pipeline.missing_required = v;
        }
        if let Some(v) = session_time_zone {
            self.pipeline.session_time_zone = v;
        }
        if access_key_id.is_some() {
            self.default.access_key_id = access_key_id;
        }
        if secret_access_key.is_some() {
            self.default.secret_access_key = secret_access_key;
        }
    }

    pub fn to_pipeline_config(&self) -> CliResult<PipelineConfig> {
        let location = |what: &str, spec: &str| {
            StorageLocation::parse(spec).context(InvalidLocationSnafu { what, spec })
        };
        let pattern = |what: &str, raw: &str| {
            raw.parse::<SourcePattern>()
                .context(InvalidPatternSnafu { what, pattern: raw })
        };

        let credentials = match (&self.default.access_key_id, &self.default.secret_access_key) {
            (Some(id), Some(secret)) => Some(Credentials::new(id.clone(), secret.clone())),
            (None, None) => None,
            _ => return IncompleteCredentialsSnafu.fail(),
        };

        Ok(PipelineConfig {
            input: location("input root", &self.paths.input_root)?,
            output: location("output root", &self.paths.output_root)?,
            catalog_pattern: pattern("catalog pattern", &self.paths.catalog_pattern)?,
            activity_pattern: pattern("activity pattern", &self.paths.activity_pattern)?,
            missing_required: self.pipeline.missing_required,
            session_time_zone: self
                .pipeline
                .session_time_zone
                .parse()
                .context(InvalidTimeZoneSnafu)?,
            credentials,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn parses_full_file() -> TestResult {
        let cfg: EtlConfigFile = toml::from_str(
            r#"
            [default]
            AWS_ACCESS_KEY_ID = "AKIAEXAMPLE"
            AWS_SECRET_ACCESS_KEY = "secret"

            [paths]
            input_root = "/data/in"
            output_root = "file:///data/out"
            catalog_pattern = "song_data/*/*/*/*"
            activity_pattern = "log_data/*/*/*.json"

            [pipeline]
            missing_required = "quarantine"
            session_time_zone = "-03:00"
            "#,
        )?;

        let pipeline = cfg.to_pipeline_config()?;
        assert_eq!(pipeline.input, StorageLocation::local("/data/in"));
        assert_eq!(pipeline.output, StorageLocation::local("/data/out"));
        assert_eq!(pipeline.activity_pattern.as_str(), "log_data/*/*/*.json");
        assert_eq!(pipeline.missing_required, MissingRequiredPolicy::Quarantine);
        assert_eq!(pipeline.session_time_zone.to_string(), "-03:00");
        let creds = pipeline.credentials.ok_or("credentials missing")?;
        assert_eq!(creds.access_key_id(), "AKIAEXAMPLE");
        Ok(())
    }

    #[test]
    fn empty_file_uses_defaults() -> TestResult {
        let cfg: EtlConfigFile = toml::from_str("")?;
        assert_eq!(cfg, EtlConfigFile::default());

        let pipeline = cfg.to_pipeline_config()?;
        assert_eq!(pipeline.catalog_pattern.as_str(), DEFAULT_CATALOG_PATTERN);
        assert!(pipeline.credentials.is_none());
        Ok(())
    }

    #[test]
    fn default_config_round_trips_through_toml() -> TestResult {
        let rendered = EtlConfigFile::default().to_toml()?;
        assert!(rendered.contains("[paths]"));
        assert!(rendered.contains("missing_required = \"drop\""));
        let parsed: EtlConfigFile = toml::from_str(&rendered)?;
        assert_eq!(parsed, EtlConfigFile::default());
        Ok(())
    }

    #[test]
    fn overrides_win_over_file_values() -> TestResult {
        let mut cfg = EtlConfigFile::default();
        cfg.apply(Overrides {
            output_root: Some("elsewhere".to_string()),
            missing_required: Some(MissingRequiredPolicy::Null),
            ..Overrides::default()
        });
        assert_eq!(cfg.paths.output_root, "elsewhere");
        assert_eq!(cfg.paths.input_root, "data/");
        assert_eq!(cfg.pipeline.missing_required, MissingRequiredPolicy::Null);
        Ok(())
    }

    #[test]
    fn rejects_object_store_roots_and_half_credentials() {
        let mut cfg = EtlConfigFile::default();
        cfg.paths.output_root = "s3a://sparkify-warehouse/".to_string();
        assert!(matches!(
            cfg.to_pipeline_config(),
            Err(CliError::InvalidLocation { .. })
        ));

        let mut cfg = EtlConfigFile::default();
        cfg.default.access_key_id = Some("AKIAEXAMPLE".to_string());
        assert!(matches!(
            cfg.to_pipeline_config(),
            Err(CliError::IncompleteCredentials)
        ));
    }

    #[test]
    fn unknown_policy_is_a_parse_error() {
        let parsed: Result<EtlConfigFile, _> =
            toml::from_str("[pipeline]\nmissing_required = \"reject\"\n");
        assert!(parsed.is_err());
    }
}
