use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate the object key for one flush.
///
/// Format: {prefix}/{YYYY}/{MM}/{DD}/{HH}-{MMSS}{nanos}-{uuid}
///
/// - Date and hour partitions come from the flush clock (UTC), not from the
///   record timestamps
/// - The suffix combines the sub-hour time with a random UUID so two flushes
///   in the same hour never write the same key
pub fn generate_object_key(prefix: &str, now: DateTime<Utc>) -> String {
    let partition = now.format("%Y/%m/%d/%H").to_string();
    let token = format!("{}-{}", now.format("%M%S%9f"), Uuid::new_v4().simple());

    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        format!("{partition}-{token}")
    } else {
        format!("{prefix}/{partition}-{token}")
    }
}
