use crate::record::Record;
use crate::timestamp::EventTime;

/// One entry yielded by the host decoder
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    /// Continuation code: non-negative when a record is present, negative at
    /// the end of the batch
    pub code: i32,
    pub timestamp: EventTime,
    pub record: Record,
}

impl DecodedRecord {
    pub fn new(timestamp: impl Into<EventTime>, record: Record) -> Self {
        Self {
            code: 0,
            timestamp: timestamp.into(),
            record,
        }
    }

    /// End-of-batch marker
    pub fn end() -> Self {
        Self {
            code: -1,
            timestamp: EventTime::Unrecognized,
            record: Record::new(),
        }
    }

    pub fn is_end(&self) -> bool {
        self.code < 0
    }
}

/// Pull-based source of records for one flush call.
///
/// The batch assembler only sees decoded records; the wire format the host
/// uses stays behind this trait.
pub trait RecordDecoder {
    /// Next record, or `None` once the host buffer is exhausted
    fn next_record(&mut self) -> Option<DecodedRecord>;
}

impl<I> RecordDecoder for I
where
    I: Iterator<Item = DecodedRecord>,
{
    fn next_record(&mut self) -> Option<DecodedRecord> {
        self.next()
    }
}
