//! Run configuration for the pipeline.
//!
//! Connection parameters and paths come from the environment (the CLI can
//! override the paths); one `PipelineConfig` is built per run and passed
//! explicitly into the orchestrator; there is no global mutable state.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while building or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Object-store connection parameters.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Custom endpoint (host[:port]) for MinIO-style deployments; `None`
    /// uses the SDK's default AWS resolution.
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Whether to talk to the endpoint over TLS.
    pub secure: bool,
    pub region: String,
}

impl StoreConfig {
    /// Expands a bare `host:port` endpoint into a full URL using the
    /// configured security flag; endpoints that already carry a scheme are
    /// passed through.
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        if endpoint.contains("://") {
            endpoint.to_string()
        } else if self.secure {
            format!("https://{endpoint}")
        } else {
            format!("http://{endpoint}")
        }
    }
}

/// Configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root containing one subdirectory per machine.
    pub source_root: PathBuf,
    /// Root for extracted artifacts; removed and recreated each run.
    pub output_root: PathBuf,
    /// Fixed destination bucket for failure evidence.
    pub bucket: String,
    /// Marker file consumed by the downstream analyzer.
    pub signal_file: PathBuf,
    /// Name of residual scratch directories cleaned out of machine source
    /// dirs before a run.
    pub scratch_dir_name: String,

    /// External program that prepares a machine directory.
    pub prepare_command: String,
    /// External program that extracts logs for a machine.
    pub extract_command: String,
    /// External program that classifies an update from the two log files.
    pub classify_command: String,

    /// Object-store connection parameters.
    pub store: StoreConfig,
    /// PostgreSQL URL for the analytics counters; analytics are skipped
    /// with a warning when absent.
    pub database_url: Option<String>,

    /// Attempts per uploaded file, including the first.
    pub upload_max_attempts: u32,
    /// Fixed delay between upload attempts.
    pub upload_backoff: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("./machines"),
            output_root: PathBuf::from("./output"),
            bucket: "machine-log-analysis".to_string(),
            signal_file: PathBuf::from("NEEDS_MASTER"),
            scratch_dir_name: "required_files".to_string(),
            prepare_command: String::new(),
            extract_command: String::new(),
            classify_command: String::new(),
            store: StoreConfig {
                endpoint: None,
                access_key: None,
                secret_key: None,
                secure: true,
                region: "us-east-1".to_string(),
            },
            database_url: None,
            upload_max_attempts: 3,
            upload_backoff: Duration::from_secs(1),
        }
    }
}

impl PipelineConfig {
    /// Builds configuration from environment variables on top of defaults.
    ///
    /// # Environment Variables
    ///
    /// - `MINIO_ENDPOINT`, `MINIO_ACCESS_KEY`, `MINIO_SECRET_KEY`,
    ///   `MINIO_SECURE`: object-store connection
    /// - `DATABASE_URL`: PostgreSQL URL for analytics counters (optional)
    /// - `PIPELINE_SOURCE_ROOT`, `PIPELINE_OUTPUT_ROOT`: directory roots
    /// - `PIPELINE_BUCKET`: destination bucket
    /// - `PIPELINE_SIGNAL_FILE`: downstream trigger marker path
    /// - `PIPELINE_PREPARE_CMD`, `PIPELINE_EXTRACT_CMD`,
    ///   `PIPELINE_CLASSIFY_CMD`: external collaborator programs (required)
    /// - `PIPELINE_UPLOAD_MAX_ATTEMPTS`, `PIPELINE_UPLOAD_BACKOFF_SECS`:
    ///   upload retry policy
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PIPELINE_SOURCE_ROOT") {
            config.source_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("PIPELINE_OUTPUT_ROOT") {
            config.output_root = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("PIPELINE_BUCKET") {
            config.bucket = val;
        }
        if let Ok(val) = std::env::var("PIPELINE_SIGNAL_FILE") {
            config.signal_file = PathBuf::from(val);
        }

        config.prepare_command = std::env::var("PIPELINE_PREPARE_CMD")
            .map_err(|_| ConfigError::MissingEnvVar("PIPELINE_PREPARE_CMD".to_string()))?;
        config.extract_command = std::env::var("PIPELINE_EXTRACT_CMD")
            .map_err(|_| ConfigError::MissingEnvVar("PIPELINE_EXTRACT_CMD".to_string()))?;
        config.classify_command = std::env::var("PIPELINE_CLASSIFY_CMD")
            .map_err(|_| ConfigError::MissingEnvVar("PIPELINE_CLASSIFY_CMD".to_string()))?;

        config.store.endpoint = std::env::var("MINIO_ENDPOINT").ok();
        config.store.access_key = std::env::var("MINIO_ACCESS_KEY").ok();
        config.store.secret_key = std::env::var("MINIO_SECRET_KEY").ok();
        if let Ok(val) = std::env::var("MINIO_SECURE") {
            config.store.secure = parse_env_bool(&val, "MINIO_SECURE")?;
        }

        config.database_url = std::env::var("DATABASE_URL").ok();

        if let Ok(val) = std::env::var("PIPELINE_UPLOAD_MAX_ATTEMPTS") {
            config.upload_max_attempts = parse_env_value(&val, "PIPELINE_UPLOAD_MAX_ATTEMPTS")?;
        }
        if let Ok(val) = std::env::var("PIPELINE_UPLOAD_BACKOFF_SECS") {
            let secs: u64 = parse_env_value(&val, "PIPELINE_UPLOAD_BACKOFF_SECS")?;
            config.upload_backoff = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "bucket cannot be empty".to_string(),
            ));
        }
        if self.prepare_command.is_empty()
            || self.extract_command.is_empty()
            || self.classify_command.is_empty()
        {
            return Err(ConfigError::ValidationFailed(
                "prepare, extract and classify commands must all be set".to_string(),
            ));
        }
        if self.upload_max_attempts == 0 {
            return Err(ConfigError::ValidationFailed(
                "upload_max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.scratch_dir_name.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "scratch_dir_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The upload retry policy derived from this configuration.
    pub fn retry_policy(&self) -> crate::storage::RetryPolicy {
        crate::storage::RetryPolicy {
            max_attempts: self.upload_max_attempts,
            backoff: self.upload_backoff,
        }
    }
}

/// Parses an environment variable value, producing a typed error.
fn parse_env_value<T: std::str::FromStr>(val: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    val.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Parses a boolean environment variable ("true"/"1"/"t" case-insensitive).
fn parse_env_bool(val: &str, key: &str) -> Result<bool, ConfigError> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "t" | "yes" => Ok(true),
        "false" | "0" | "f" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got '{val}'"),
        }),
    }
}
