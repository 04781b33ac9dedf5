//! S3 Output
//!
//! Log shipping output stage. The host pipeline hands over a batch of
//! schema-free log records per flush; this crate turns each record into a
//! JSON line, joins the lines into one payload and uploads it as a single
//! object under a time-partitioned key.
//!
//! ## Features
//!
//! - **Schema-free records**: any mix of scalars, strings, byte strings,
//!   arrays and nested maps is encoded to compact JSON
//! - **Three timestamp encodings**: structured event time, epoch seconds, or
//!   "now" for anything else
//! - **Hour partitioning**: `{prefix}/YYYY/MM/DD/HH-{unique}` keys that never
//!   collide within an hour
//! - **Explicit credentials**: a static key pair or a shared profile, chosen
//!   and validated once at initialization
//!
//! ## Architecture
//!
//! ```text
//!  Host decoder              Plugin instance                     S3 Bucket
//! ┌──────────────┐   ┌─────────────────────────────┐       ┌──────────────┐
//! │ (rc, ts,     │   │ Batch Assembler             │       │ {prefix}/    │
//! │  record) ... │──▶│  ├─ Timestamp Resolver      │       │   YYYY/MM/DD/│
//! └──────────────┘   │  └─ Record Normalizer       │       │   HH-{token} │
//!                    │ Object Key Generator        │──────▶│              │
//!                    │ Upload Client ◀─ Credential │       └──────────────┘
//!                    │               Resolver      │
//!                    └─────────────────────────────┘
//! ```

pub mod batch;
pub mod config;
pub mod credentials;
pub mod decoder;
pub mod error;
pub mod object_key;
pub mod plugin;
pub mod record;
pub mod s3_uploader;
pub mod timestamp;

pub use batch::{assemble, AssembledBatch};
pub use config::{BatchConfig, Config, ConfigSource, S3OutputConfig, ServiceConfig};
pub use credentials::{AwsCredentialResolver, CredentialConfig, CredentialResolver};
pub use decoder::{DecodedRecord, RecordDecoder};
pub use error::{FlbStatus, OutputError};
pub use object_key::generate_object_key;
pub use plugin::{FlushReport, PluginState, S3OutputPlugin};
pub use record::{normalize, Record, Value};
pub use s3_uploader::{ObjectUploader, S3Uploader};
pub use timestamp::EventTime;
