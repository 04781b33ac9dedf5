//! Credential selection and resolution for the upload client.
//!
//! Exactly one strategy is active per plugin instance: a static key pair or a
//! named profile from the shared credentials file. The choice is validated
//! once at initialization and the resolved provider is reused for every
//! upload afterwards.

use crate::error::OutputError;
use async_trait::async_trait;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_runtime::env_config::file::{EnvConfigFileKind, EnvConfigFiles};
use aws_sdk_s3::config::{Credentials, ProvideCredentials, SharedCredentialsProvider};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

const STATIC_PROVIDER_NAME: &str = "S3OutputStatic";

/// Credential strategy for one plugin instance
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialConfig {
    /// Literal key pair; never expires
    Static {
        access_key_id: String,
        secret_access_key: String,
    },
    /// Named profile looked up in the shared credentials store
    SharedProfile { name: String },
}

impl CredentialConfig {
    /// Select the strategy from the raw configuration strings.
    ///
    /// Empty strings are unset. Setting both strategies, neither, or only
    /// half of the static pair is rejected.
    pub fn from_fields(
        access_key_id: &str,
        secret_access_key: &str,
        shared_profile: &str,
    ) -> Result<Self, OutputError> {
        let has_static = !access_key_id.is_empty() || !secret_access_key.is_empty();
        let has_profile = !shared_profile.is_empty();

        match (has_static, has_profile) {
            (true, true) => Err(OutputError::Configuration(
                "both static credentials (AccessKeyID/SecretAccessKey) and a shared \
                 profile (Credential) are set; configure exactly one"
                    .to_string(),
            )),
            (false, false) => Err(OutputError::Configuration(
                "no credentials configured; set AccessKeyID and SecretAccessKey, or Credential"
                    .to_string(),
            )),
            (false, true) => Ok(CredentialConfig::SharedProfile {
                name: shared_profile.to_string(),
            }),
            (true, false) if access_key_id.is_empty() => Err(OutputError::Configuration(
                "SecretAccessKey is set but AccessKeyID is empty".to_string(),
            )),
            (true, false) if secret_access_key.is_empty() => Err(OutputError::Configuration(
                "AccessKeyID is set but SecretAccessKey is empty".to_string(),
            )),
            (true, false) => Ok(CredentialConfig::Static {
                access_key_id: access_key_id.to_string(),
                secret_access_key: secret_access_key.to_string(),
            }),
        }
    }

    /// Strategy name for logs
    pub fn strategy(&self) -> &'static str {
        match self {
            CredentialConfig::Static { .. } => "static",
            CredentialConfig::SharedProfile { .. } => "shared_profile",
        }
    }
}

impl fmt::Debug for CredentialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialConfig::Static { .. } => f
                .debug_struct("Static")
                .field("access_key_id", &"<redacted>")
                .field("secret_access_key", &"<redacted>")
                .finish(),
            CredentialConfig::SharedProfile { name } => f
                .debug_struct("SharedProfile")
                .field("name", name)
                .finish(),
        }
    }
}

/// Turns a credential strategy into a provider handle for the upload client
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(
        &self,
        config: &CredentialConfig,
    ) -> Result<SharedCredentialsProvider, OutputError>;
}

/// Resolver backed by the AWS SDK credential types
#[derive(Debug, Clone, Default)]
pub struct AwsCredentialResolver {
    credentials_file: Option<PathBuf>,
}

impl AwsCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read shared profiles from this file instead of the default location
    pub fn with_credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.credentials_file = Some(path.into());
        self
    }

    fn profile_provider(&self, name: &str) -> ProfileFileCredentialsProvider {
        let builder = ProfileFileCredentialsProvider::builder().profile_name(name);

        match &self.credentials_file {
            Some(path) => builder
                .profile_files(
                    EnvConfigFiles::builder()
                        .with_file(EnvConfigFileKind::Credentials, path.clone())
                        .build(),
                )
                .build(),
            None => builder.build(),
        }
    }
}

#[async_trait]
impl CredentialResolver for AwsCredentialResolver {
    #[instrument(skip(self, config), fields(strategy = config.strategy()))]
    async fn resolve(
        &self,
        config: &CredentialConfig,
    ) -> Result<SharedCredentialsProvider, OutputError> {
        match config {
            CredentialConfig::Static {
                access_key_id,
                secret_access_key,
            } => {
                debug!("Using static credentials");
                Ok(SharedCredentialsProvider::new(Credentials::new(
                    access_key_id.clone(),
                    secret_access_key.clone(),
                    None,
                    None,
                    STATIC_PROVIDER_NAME,
                )))
            }
            CredentialConfig::SharedProfile { name } => {
                let provider = self.profile_provider(name);

                // Probe once so a missing profile fails initialization
                // instead of the first upload.
                provider.provide_credentials().await.map_err(|e| {
                    OutputError::Configuration(format!(
                        "shared credentials profile '{name}' is unusable: {e}"
                    ))
                })?;

                info!(profile = %name, "Resolved shared credentials profile");
                Ok(SharedCredentialsProvider::new(provider))
            }
        }
    }
}
