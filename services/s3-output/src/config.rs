use crate::credentials::CredentialConfig;
use crate::error::OutputError;
use serde::Deserialize;
use std::fmt;

/// Main configuration for the standalone output service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 output configuration
    pub output: S3OutputConfig,
    /// Batching of stdin records
    #[serde(default)]
    pub batch: BatchConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Prometheus exporter port, 0 disables the exporter
    #[serde(default)]
    pub metrics_port: u16,
}

/// Keys the plugin reads from the host, once, at initialization.
///
/// An empty string means the key is not set.
#[derive(Clone, Deserialize)]
pub struct S3OutputConfig {
    /// Static access key id
    #[serde(default)]
    pub access_key_id: String,
    /// Static secret access key
    #[serde(default)]
    pub secret_access_key: String,
    /// Shared credentials profile name
    #[serde(default)]
    pub credential: String,
    /// Target bucket
    #[serde(default)]
    pub bucket: String,
    /// Prefix for every object key
    #[serde(default)]
    pub s3_prefix: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Shared credentials file to read profiles from instead of the default
    #[serde(default)]
    pub credentials_file: Option<String>,
}

/// Batch limits for the stdin host
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// Flush after this many records
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

/// Key lookup exposed by the host pipeline
pub trait ConfigSource {
    /// Value for `key`, empty when unset
    fn config_key(&self, key: &str) -> String;
}

pub const KEY_ACCESS_KEY_ID: &str = "AccessKeyID";
pub const KEY_SECRET_ACCESS_KEY: &str = "SecretAccessKey";
pub const KEY_CREDENTIAL: &str = "Credential";
pub const KEY_BUCKET: &str = "Bucket";
pub const KEY_S3_PREFIX: &str = "S3Prefix";
pub const KEY_REGION: &str = "Region";
pub const KEY_ENDPOINT: &str = "Endpoint";
pub const KEY_FORCE_PATH_STYLE: &str = "ForcePathStyle";
pub const KEY_CREDENTIALS_FILE: &str = "CredentialsFile";

// Default value functions
fn default_service_name() -> String {
    "s3-output".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_max_records() -> usize {
    1000
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with_env(environment())
    }

    /// Load with an explicit environment layer on top of the config files
    pub fn load_with_env(env: config::Environment) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .set_default("service.name", "s3-output")?
            .set_default("service.log_level", "info")?
            .add_source(config::File::with_name("config/s3-output").required(false))
            .add_source(config::File::with_name("/etc/s3-output/config").required(false))
            .add_source(env)
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }
}

/// `S3_OUTPUT__OUTPUT__BUCKET` -> `output.bucket`
fn environment() -> config::Environment {
    config::Environment::with_prefix("S3_OUTPUT")
        .separator("__")
        .try_parsing(true)
}

impl S3OutputConfig {
    /// Read the plugin keys from a host config source
    pub fn from_source<S: ConfigSource + ?Sized>(source: &S) -> Self {
        Self {
            access_key_id: source.config_key(KEY_ACCESS_KEY_ID),
            secret_access_key: source.config_key(KEY_SECRET_ACCESS_KEY),
            credential: source.config_key(KEY_CREDENTIAL),
            bucket: source.config_key(KEY_BUCKET),
            s3_prefix: source.config_key(KEY_S3_PREFIX),
            region: source.config_key(KEY_REGION),
            endpoint_url: non_empty(source.config_key(KEY_ENDPOINT)),
            force_path_style: source
                .config_key(KEY_FORCE_PATH_STYLE)
                .eq_ignore_ascii_case("true"),
            credentials_file: non_empty(source.config_key(KEY_CREDENTIALS_FILE)),
        }
    }

    /// Credential strategy selected by this configuration
    pub fn credential_config(&self) -> Result<CredentialConfig, OutputError> {
        CredentialConfig::from_fields(
            &self.access_key_id,
            &self.secret_access_key,
            &self.credential,
        )
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<CredentialConfig, OutputError> {
        if self.bucket.is_empty() {
            return Err(OutputError::Configuration("Bucket is not set".to_string()));
        }

        if self.region.is_empty() {
            return Err(OutputError::Configuration("Region is not set".to_string()));
        }

        if matches!(self.endpoint_url.as_deref(), Some(url) if url.is_empty()) {
            return Err(OutputError::Configuration(
                "Endpoint must not be empty when set".to_string(),
            ));
        }

        self.credential_config()
    }

    /// Returns a masked version of the access key id for logging
    pub fn access_key_id_masked(&self) -> String {
        let visible: String = self.access_key_id.chars().take(4).collect();
        if visible.len() == self.access_key_id.len() {
            "*".repeat(self.access_key_id.chars().count())
        } else {
            format!("{visible}***")
        }
    }
}

impl fmt::Debug for S3OutputConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3OutputConfig")
            .field("access_key_id", &self.access_key_id_masked())
            .field("secret_access_key", &"<redacted>")
            .field("credential", &self.credential)
            .field("bucket", &self.bucket)
            .field("s3_prefix", &self.s3_prefix)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("force_path_style", &self.force_path_style)
            .field("credentials_file", &self.credentials_file)
            .finish()
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: 0,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_records: default_max_records(),
        }
    }
}
