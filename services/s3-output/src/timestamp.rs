use chrono::{DateTime, TimeZone, Utc};

/// Timestamp attached to a record by the host decoder.
///
/// The host hands over one of three encodings: a structured event time with
/// sub-second precision, whole seconds since the Unix epoch, or a sentinel
/// (or anything unrecognized) meaning "use the current time".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    Structured(DateTime<Utc>),
    EpochSeconds(u64),
    Unrecognized,
}

impl EventTime {
    /// Resolve to a point in time, falling back to the wall clock
    pub fn resolve(&self) -> DateTime<Utc> {
        self.resolve_at(Utc::now())
    }

    /// Resolve with an explicit fallback clock value. Never fails.
    pub fn resolve_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            EventTime::Structured(time) => time,
            EventTime::EpochSeconds(secs) => i64::try_from(secs)
                .ok()
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .unwrap_or(now),
            EventTime::Unrecognized => now,
        }
    }
}

impl From<DateTime<Utc>> for EventTime {
    fn from(time: DateTime<Utc>) -> Self {
        EventTime::Structured(time)
    }
}

impl From<u64> for EventTime {
    fn from(secs: u64) -> Self {
        EventTime::EpochSeconds(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_structured_used_verbatim() {
        let ts = Utc
            .with_ymd_and_hms(2019, 3, 10, 10, 11, 12)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();

        assert_eq!(EventTime::Structured(ts).resolve(), ts);
    }

    #[test]
    fn test_epoch_seconds() {
        let ts = Utc.with_ymd_and_hms(2019, 3, 10, 10, 11, 12).unwrap();
        let secs = ts.timestamp() as u64;

        assert_eq!(EventTime::EpochSeconds(secs).resolve(), ts);
        assert_eq!(
            EventTime::from(0u64).resolve(),
            Utc.timestamp_opt(0, 0).unwrap()
        );
    }

    #[test]
    fn test_unrecognized_falls_back_to_now() {
        let before = Utc::now();
        let resolved = EventTime::Unrecognized.resolve();
        let after = Utc::now();

        assert!(resolved >= before);
        assert!(resolved <= after);
    }

    #[test]
    fn test_out_of_range_epoch_falls_back() {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap();
        assert_eq!(EventTime::EpochSeconds(u64::MAX).resolve_at(now), now);
    }
}
