//! Folds the records of one flush call into a single NDJSON payload.

use crate::decoder::RecordDecoder;
use crate::error::OutputError;
use crate::record::normalize;
use chrono::{DateTime, Utc};
use tracing::{debug, trace};

/// Payload built from one flush call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledBatch {
    /// Newline-terminated JSON lines in arrival order
    pub payload: Vec<u8>,
    /// Number of records folded into the payload
    pub count: usize,
    /// Resolved timestamp of the first record
    pub first_record_time: Option<DateTime<Utc>>,
    /// Resolved timestamp of the last record
    pub last_record_time: Option<DateTime<Utc>>,
}

impl AssembledBatch {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Drain the decoder until the end sentinel or exhaustion.
///
/// A single unencodable record fails the whole batch; nothing partial is
/// returned.
pub fn assemble<D>(decoder: &mut D) -> Result<AssembledBatch, OutputError>
where
    D: RecordDecoder + ?Sized,
{
    let mut batch = AssembledBatch::default();

    while let Some(decoded) = decoder.next_record() {
        if decoded.is_end() {
            break;
        }

        let record_time = decoded.timestamp.resolve();
        let line = normalize(&decoded.record).map_err(|e| {
            debug!(
                record_index = batch.count,
                error = %e,
                "Rejecting batch with unencodable record"
            );
            e
        })?;

        trace!(
            record_index = batch.count,
            record_time = %record_time,
            line_bytes = line.len(),
            "Appending record to batch"
        );

        batch.payload.extend_from_slice(&line);
        batch.payload.push(b'\n');
        batch.count += 1;
        batch.first_record_time.get_or_insert(record_time);
        batch.last_record_time = Some(record_time);
    }

    Ok(batch)
}
