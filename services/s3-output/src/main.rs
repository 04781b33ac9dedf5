use anyhow::{Context, Result};
use s3_output::{Config, DecodedRecord, EventTime, FlbStatus, Record, S3OutputPlugin};
use serde_json::Value as JsonValue;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load().context("Failed to load configuration")?;

    // Initialize logging
    init_tracing(&config.service.log_level);

    info!(
        service = %config.service.name,
        "Starting S3 output service"
    );

    if config.service.metrics_port != 0 {
        init_metrics(config.service.metrics_port)?;
    }

    let plugin = S3OutputPlugin::initialize(config.output.clone())
        .await
        .context("Failed to initialize S3 output plugin")?;

    let mut pending = PendingRecords::new(config.batch.max_records);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!(max_records = pending.max_records, "Reading records from stdin");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read from stdin")? {
                    Some(line) => {
                        if let Some(decoded) = decode_line(&line) {
                            if pending.push(decoded) {
                                pending.flush(&plugin, false).await;
                            }
                        }
                    }
                    None => {
                        info!("Input closed");
                        break;
                    }
                }
            }
            _ = &mut shutdown => break,
        }
    }

    pending.flush(&plugin, true).await;
    plugin.shutdown();

    info!("S3 output service stopped");

    Ok(())
}

/// Records read from stdin that have not been uploaded yet.
///
/// A flush is due every `max_records` new records. Batches the plugin asks
/// to retry stay buffered for the next flush, but at most
/// `2 * max_records` records are kept; the oldest beyond that are dropped.
struct PendingRecords {
    records: Vec<DecodedRecord>,
    max_records: usize,
    since_flush: usize,
}

impl PendingRecords {
    fn new(max_records: usize) -> Self {
        let max_records = max_records.max(1);
        Self {
            records: Vec::with_capacity(max_records),
            max_records,
            since_flush: 0,
        }
    }

    fn retain_limit(&self) -> usize {
        self.max_records.saturating_mul(2)
    }

    /// Buffer a record; returns true when a flush is due
    fn push(&mut self, record: DecodedRecord) -> bool {
        self.records.push(record);
        self.since_flush += 1;
        self.since_flush >= self.max_records
    }

    /// Flush everything buffered. On the final flush nothing is kept.
    async fn flush(&mut self, plugin: &S3OutputPlugin, closing: bool) -> FlbStatus {
        self.since_flush = 0;
        if self.records.is_empty() {
            return FlbStatus::Ok;
        }

        let mut batch = std::mem::take(&mut self.records);
        let status = plugin.flush_status(&mut batch.iter().cloned()).await;

        match status {
            FlbStatus::Ok => {}
            FlbStatus::Retry if closing => {
                warn!(records = batch.len(), "Flush failed during shutdown, dropping records");
            }
            FlbStatus::Retry => {
                let limit = self.retain_limit();
                if batch.len() > limit {
                    let dropped = batch.len() - limit;
                    batch.drain(..dropped);
                    warn!(
                        dropped,
                        retained = limit,
                        "Retry buffer full, dropping oldest records"
                    );
                }
                warn!(records = batch.len(), "Flush failed, keeping records for retry");
                self.records = batch;
            }
            FlbStatus::Error => {
                warn!(records = batch.len(), "Flush failed, dropping records");
            }
        }

        status
    }
}

/// Turn one stdin line into a record. Non-object lines are skipped.
fn decode_line(line: &str) -> Option<DecodedRecord> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<JsonValue>(line) {
        Ok(JsonValue::Object(map)) => {
            let timestamp = map
                .get("time")
                .or_else(|| map.get("timestamp"))
                .and_then(JsonValue::as_u64)
                .map(EventTime::EpochSeconds)
                .unwrap_or(EventTime::Unrecognized);
            Some(DecodedRecord::new(timestamp, Record::from(map)))
        }
        Ok(_) => {
            warn!("Skipping input line that is not a JSON object");
            None
        }
        Err(e) => {
            warn!(error = %e, "Skipping malformed input line");
            None
        }
    }
}

/// JSON logs filtered by `RUST_LOG`, falling back to the configured level
fn init_tracing(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().json())
        .init();
}

/// Filter for `service.log_level`. An unparsable level falls back to `info`.
fn log_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|e| {
        eprintln!("Invalid service.log_level {log_level:?} ({e}), using info");
        EnvFilter::new("info")
    })
}

/// Serve flush counters on `/metrics`
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .with_context(|| format!("Failed to start metrics exporter on port {port}"))?;

    metrics::describe_counter!("s3_output.flushes", "Batches uploaded to S3");
    metrics::describe_counter!("s3_output.flush_failures", "Flushes that uploaded nothing");
    metrics::describe_counter!("s3_output.records", "Records written to S3");
    metrics::describe_counter!("s3_output.bytes_uploaded", "Payload bytes written to S3");

    info!(port, "Prometheus metrics exporter started");

    Ok(())
}

/// Resolves on SIGINT or SIGTERM. A handler that cannot be installed never
/// fires; stdin EOF still ends the loop.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, draining pending records"),
        _ = terminate => info!("Received SIGTERM, draining pending records"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use aws_sdk_s3::config::{Credentials, SharedCredentialsProvider};
    use chrono::{DateTime, Utc};
    use s3_output::{CredentialConfig, CredentialResolver, ObjectUploader, OutputError, S3OutputConfig};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubResolver;

    #[async_trait]
    impl CredentialResolver for StubResolver {
        async fn resolve(
            &self,
            _config: &CredentialConfig,
        ) -> Result<SharedCredentialsProvider, OutputError> {
            Ok(SharedCredentialsProvider::new(Credentials::new(
                "AKID", "SECRET", None, None, "stub",
            )))
        }
    }

    /// Bucket that is always unreachable
    #[derive(Default)]
    struct UnreachableBucket {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl ObjectUploader for UnreachableBucket {
        async fn put(
            &self,
            _object_key: &str,
            _timestamp: DateTime<Utc>,
            _payload: Vec<u8>,
        ) -> Result<(), OutputError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(OutputError::Upload("connection refused".to_string()))
        }
    }

    async fn plugin_with(uploader: Arc<UnreachableBucket>) -> S3OutputPlugin {
        let config = S3OutputConfig {
            access_key_id: "exampleaccesskeyid".to_string(),
            secret_access_key: "examplesecretaccesskey".to_string(),
            credential: String::new(),
            bucket: "examplebucket".to_string(),
            s3_prefix: "exampleprefix".to_string(),
            region: "exampleregion".to_string(),
            endpoint_url: None,
            force_path_style: false,
            credentials_file: None,
        };
        S3OutputPlugin::with_uploader(config, &StubResolver, move |_, _| async move {
            Ok::<_, OutputError>(uploader as Arc<dyn ObjectUploader>)
        })
        .await
        .unwrap()
    }

    fn line(seq: usize) -> DecodedRecord {
        decode_line(&format!(r#"{{"seq": {seq}}}"#)).unwrap()
    }

    #[tokio::test]
    async fn test_failing_uploads_keep_flush_cadence_and_bounded_buffer() {
        let bucket = Arc::new(UnreachableBucket::default());
        let plugin = plugin_with(bucket.clone()).await;
        let mut pending = PendingRecords::new(2);

        for seq in 0..10 {
            if pending.push(line(seq)) {
                assert_eq!(pending.flush(&plugin, false).await, FlbStatus::Retry);
                assert!(pending.records.len() <= 4);
            }
        }

        // One attempt per two lines, not one per line
        assert_eq!(bucket.attempts.load(Ordering::SeqCst), 5);
        assert_eq!(pending.records.len(), 4);

        // Oldest records were the ones dropped
        assert_eq!(pending.records[0].record, line(6).record);
        assert_eq!(pending.records[3].record, line(9).record);
    }

    #[tokio::test]
    async fn test_closing_flush_drops_unsent_records() {
        let bucket = Arc::new(UnreachableBucket::default());
        let plugin = plugin_with(bucket.clone()).await;
        let mut pending = PendingRecords::new(5);

        for seq in 0..3 {
            assert!(!pending.push(line(seq)));
        }

        assert_eq!(pending.flush(&plugin, true).await, FlbStatus::Retry);
        assert!(pending.records.is_empty());
        assert_eq!(bucket.attempts.load(Ordering::SeqCst), 1);

        // Nothing left, so a second close uploads nothing
        assert_eq!(pending.flush(&plugin, true).await, FlbStatus::Ok);
        assert_eq!(bucket.attempts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_max_records_flushes_every_line() {
        let mut pending = PendingRecords::new(0);
        assert!(pending.push(line(0)));
    }

    #[test]
    fn test_log_filter_falls_back_to_info() {
        assert_eq!(log_filter("debug").to_string(), "debug");
        assert_eq!(log_filter("s3_output=verbose").to_string(), "info");
    }

    #[test]
    fn test_decode_line_with_epoch_time() {
        let decoded = decode_line(r#"{"time": 1552212672, "log": "started"}"#).unwrap();

        assert_eq!(decoded.timestamp, EventTime::EpochSeconds(1552212672));
        assert_eq!(decoded.record.len(), 2);
    }

    #[test]
    fn test_decode_line_without_time() {
        let decoded = decode_line(r#"{"log": "started", "time": "yesterday"}"#).unwrap();
        assert_eq!(decoded.timestamp, EventTime::Unrecognized);
    }

    #[test]
    fn test_decode_line_skips_non_objects() {
        assert!(decode_line("").is_none());
        assert!(decode_line("[1, 2]").is_none());
        assert!(decode_line("not json").is_none());
    }
}
