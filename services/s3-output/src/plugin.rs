//! The output plugin instance and its lifecycle.
//!
//! ```text
//! Uninitialized ──▶ Initializing ──▶ Ready ◀──┐
//!                        │             │  flush
//!                        ▼             ├──────┘
//!                     (error)          ▼
//!                                 ShuttingDown
//! ```
//!
//! A failed initialization never produces an instance, so nothing can flush
//! through a half-configured plugin. Each flush owns its buffer and only
//! reads the configuration snapshot, so concurrent flushes are safe.

use crate::batch::assemble;
use crate::config::{ConfigSource, S3OutputConfig};
use crate::credentials::{AwsCredentialResolver, CredentialResolver};
use crate::decoder::RecordDecoder;
use crate::error::{FlbStatus, OutputError};
use crate::object_key::generate_object_key;
use crate::s3_uploader::{ObjectUploader, S3Uploader};
use aws_sdk_s3::config::SharedCredentialsProvider;
use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Lifecycle state of a plugin instance.
///
/// `Uninitialized` and `Initializing` only exist before an instance does and
/// show up in initialization logs; `state()` reports `Ready` or
/// `ShuttingDown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Uninitialized,
    Initializing,
    Ready,
    ShuttingDown,
}

/// Outcome of a successful flush
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    /// Key of the uploaded object, `None` when the batch was empty
    pub object_key: Option<String>,
    /// Records folded into the payload
    pub records: usize,
    /// Payload size in bytes
    pub bytes: usize,
}

/// One configured S3 output
pub struct S3OutputPlugin {
    config: Arc<S3OutputConfig>,
    credential_strategy: &'static str,
    uploader: Arc<dyn ObjectUploader>,
    shutting_down: AtomicBool,
}

impl S3OutputPlugin {
    /// Initialize with the AWS credential resolver and the S3 uploader
    pub async fn initialize(config: S3OutputConfig) -> Result<Self, OutputError> {
        let resolver = match &config.credentials_file {
            Some(path) => AwsCredentialResolver::new().with_credentials_file(path),
            None => AwsCredentialResolver::new(),
        };
        Self::with_resolver(config, &resolver).await
    }

    /// Read the plugin keys from the host and initialize
    pub async fn initialize_from_source<S>(source: &S) -> Result<Self, OutputError>
    where
        S: ConfigSource + ?Sized,
    {
        Self::initialize(S3OutputConfig::from_source(source)).await
    }

    /// Initialize with a custom credential resolver and the S3 uploader
    pub async fn with_resolver<R>(config: S3OutputConfig, resolver: &R) -> Result<Self, OutputError>
    where
        R: CredentialResolver + ?Sized,
    {
        Self::with_uploader(config, resolver, |config, credentials| async move {
            let uploader = S3Uploader::new(&config, credentials).await?;
            Ok::<_, OutputError>(Arc::new(uploader) as Arc<dyn ObjectUploader>)
        })
        .await
    }

    /// Initialize with a custom credential resolver and uploader factory.
    ///
    /// Validation, credential resolution and uploader construction all happen
    /// here; any failure is reported as a configuration error.
    pub async fn with_uploader<R, F, Fut>(
        config: S3OutputConfig,
        resolver: &R,
        make_uploader: F,
    ) -> Result<Self, OutputError>
    where
        R: CredentialResolver + ?Sized,
        F: FnOnce(Arc<S3OutputConfig>, SharedCredentialsProvider) -> Fut,
        Fut: Future<Output = Result<Arc<dyn ObjectUploader>, OutputError>>,
    {
        debug!(state = ?PluginState::Initializing, "Initializing S3 output plugin");

        let result = Self::build(config, resolver, make_uploader).await;
        match &result {
            Ok(plugin) => info!(
                state = ?PluginState::Ready,
                bucket = %plugin.config.bucket,
                prefix = %plugin.config.s3_prefix,
                region = %plugin.config.region,
                credentials = plugin.credential_strategy,
                "S3 output plugin ready"
            ),
            Err(e) => error!(error = %e, "S3 output plugin initialization failed"),
        }
        result
    }

    async fn build<R, F, Fut>(
        config: S3OutputConfig,
        resolver: &R,
        make_uploader: F,
    ) -> Result<Self, OutputError>
    where
        R: CredentialResolver + ?Sized,
        F: FnOnce(Arc<S3OutputConfig>, SharedCredentialsProvider) -> Fut,
        Fut: Future<Output = Result<Arc<dyn ObjectUploader>, OutputError>>,
    {
        let credentials = config.validate()?;
        let provider = resolver.resolve(&credentials).await?;

        let config = Arc::new(config);
        let uploader = make_uploader(config.clone(), provider)
            .await
            .map_err(|e| match e {
                OutputError::Configuration(_) => e,
                other => OutputError::Configuration(other.to_string()),
            })?;

        Ok(Self {
            config,
            credential_strategy: credentials.strategy(),
            uploader,
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> PluginState {
        if self.shutting_down.load(Ordering::Acquire) {
            PluginState::ShuttingDown
        } else {
            PluginState::Ready
        }
    }

    /// Configuration snapshot taken at initialization
    pub fn config(&self) -> &S3OutputConfig {
        &self.config
    }

    /// Assemble one batch and upload it as a single object.
    ///
    /// Empty batches succeed without an upload. Encoding or upload failures
    /// fail the whole flush and leave nothing behind in the bucket.
    #[instrument(skip(self, decoder), fields(bucket = %self.config.bucket))]
    pub async fn flush<D>(&self, decoder: &mut D) -> Result<FlushReport, OutputError>
    where
        D: RecordDecoder + ?Sized,
    {
        if self.state() == PluginState::ShuttingDown {
            warn!("Flush rejected, plugin is shutting down");
            return Err(OutputError::ShuttingDown);
        }

        let batch = assemble(decoder).map_err(|e| {
            metrics::counter!("s3_output.flush_failures").increment(1);
            error!(error = %e, "Failed to assemble batch");
            e
        })?;

        if batch.is_empty() {
            debug!("Empty batch, skipping upload");
            return Ok(FlushReport {
                object_key: None,
                records: 0,
                bytes: 0,
            });
        }

        let now = Utc::now();
        let object_key = generate_object_key(&self.config.s3_prefix, now);
        let records = batch.count;
        let bytes = batch.payload.len();

        debug!(
            s3_key = %object_key,
            records,
            first_record_time = ?batch.first_record_time,
            last_record_time = ?batch.last_record_time,
            "Uploading batch"
        );

        let started = Instant::now();
        self.uploader
            .put(&object_key, now, batch.payload)
            .await
            .map_err(|e| {
                metrics::counter!("s3_output.flush_failures").increment(1);
                error!(s3_key = %object_key, error = %e, "Failed to upload batch");
                e
            })?;

        metrics::histogram!("s3_output.upload.duration_seconds")
            .record(started.elapsed().as_secs_f64());
        metrics::counter!("s3_output.flushes").increment(1);
        metrics::counter!("s3_output.records").increment(records as u64);
        metrics::counter!("s3_output.bytes_uploaded").increment(bytes as u64);

        info!(
            s3_key = %object_key,
            records,
            size_bytes = bytes,
            "Batch flushed"
        );

        Ok(FlushReport {
            object_key: Some(object_key),
            records,
            bytes,
        })
    }

    /// Flush and map the outcome to a host status code
    pub async fn flush_status<D>(&self, decoder: &mut D) -> FlbStatus
    where
        D: RecordDecoder + ?Sized,
    {
        FlbStatus::from_result(&self.flush(decoder).await)
    }

    /// Stop accepting flushes
    pub fn shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::AcqRel) {
            info!(state = ?PluginState::ShuttingDown, "S3 output plugin shutting down");
        }
    }
}
