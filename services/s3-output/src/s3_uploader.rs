use crate::config::S3OutputConfig;
use crate::error::OutputError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Builder as S3ConfigBuilder, SharedCredentialsProvider};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

const CONTENT_TYPE_NDJSON: &str = "application/x-ndjson";

/// Upload capability consumed by the plugin: one object per flush
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectUploader: Send + Sync {
    async fn put(
        &self,
        object_key: &str,
        timestamp: DateTime<Utc>,
        payload: Vec<u8>,
    ) -> Result<(), OutputError>;
}

/// S3 uploader for flushed log batches
pub struct S3Uploader {
    client: S3Client,
    bucket: String,
}

impl S3Uploader {
    /// Create a new S3 uploader using an already resolved credential provider
    pub async fn new(
        config: &S3OutputConfig,
        credentials: SharedCredentialsProvider,
    ) -> Result<Self, OutputError> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            endpoint = ?config.endpoint_url,
            "S3 uploader initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
        })
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectUploader for S3Uploader {
    /// Single-part upload of the whole payload
    #[instrument(skip(self, payload), fields(bucket = %self.bucket, size_bytes = payload.len()))]
    async fn put(
        &self,
        object_key: &str,
        timestamp: DateTime<Utc>,
        payload: Vec<u8>,
    ) -> Result<(), OutputError> {
        debug!(s3_key = %object_key, "Uploading batch to S3");

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(object_key)
            .body(ByteStream::from(payload))
            .content_type(CONTENT_TYPE_NDJSON)
            .metadata("timestamp", timestamp.to_rfc3339())
            .send()
            .await
            .map_err(|e| OutputError::Upload(DisplayErrorContext(&e).to_string()))?;

        debug!(s3_key = %object_key, "Batch uploaded to S3");
        Ok(())
    }
}
