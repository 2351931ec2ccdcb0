use std::{collections::HashSet, fmt};

use serde::Serialize;
use solar_client::domain::ChargerReading;
use time::OffsetDateTime;

pub mod committer;
pub mod dedup;

pub use committer::{BatchCommitter, CommitterSettings};

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("existence query failed: {0}")]
    Query(String),
    #[error("insert failed: {0}")]
    Insert(String),
    #[error("device directory lookup failed: {0}")]
    Directory(String),
}

#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    /// The batch is structurally unusable; resubmitting it unchanged will fail again.
    #[error("malformed batch: {0}")]
    MalformedBatch(String),
    #[error("device '{0}' is not registered")]
    UnknownDevice(String),
    #[error("no usable rows in upload")]
    EmptyBatch,
    /// Storage could not be read or written. The whole batch may be retried.
    #[error("storage unavailable: {0}")]
    TransientStorage(#[from] StorageError),
}

impl IngestError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStorage(_))
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedBatch(_) => "malformed",
            Self::UnknownDevice(_) => "unknown_device",
            Self::EmptyBatch => "empty",
            Self::TransientStorage(_) => "storage",
        }
    }
}

/// Persisted readings, keyed by `(device_id, record_time)`.
#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    /// Normalized times already stored for `device_id` among `record_times`.
    async fn existing_record_times(
        &self,
        device_id: &str,
        record_times: &[OffsetDateTime],
    ) -> Result<HashSet<OffsetDateTime>, StorageError>;

    /// Insert all readings in one operation and return the rows written.
    /// Rows whose key already exists are skipped, not reported as errors.
    async fn insert_many(&self, readings: &[ChargerReading]) -> Result<Vec<ChargerReading>, StorageError>;
}

/// Registry of device identifiers that may upload CSV exports.
#[async_trait::async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn known_device_ids(&self) -> Result<HashSet<String>, StorageError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Received,
    Validated,
    Deduplicated,
    Committed,
    Rejected,
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Deduplicated => "deduplicated",
            Self::Committed => "committed",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Inserted,
    /// Every candidate was already stored. Still a success.
    NothingNew,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionResult {
    pub status: IngestStatus,
    pub device_id: String,
    /// Candidates that reached the committer.
    pub received_count: usize,
    /// CSV rows dropped for lacking a timestamp or PV voltage.
    pub skipped_rows: usize,
    pub duplicate_count: usize,
    pub inserted_count: usize,
    pub inserted_records: Vec<ChargerReading>,
}

impl IngestionResult {
    pub fn message(&self) -> &'static str {
        match self.status {
            IngestStatus::Inserted => "Solar charger data inserted successfully",
            IngestStatus::NothingNew => "No new records to insert. All entries already exist.",
        }
    }
}
