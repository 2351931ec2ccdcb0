use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
        Mutex,
    },
};

use solar_client::domain::ChargerReading;
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    pipeline::{ReadingStore, StorageError},
    transform::normalize,
};

/// `ReadingStore` held in process memory, with the same unique key and
/// conflict behavior as the Postgres table. Used by tests and local runs.
///
/// Failures can be switched on to exercise the transient-error path, and
/// `set_blind_reads` hides stored rows from the existence query to stand in
/// for a concurrent writer racing the same batch.
#[derive(Default)]
pub struct InMemoryReadingStore {
    rows: Mutex<Vec<ChargerReading>>,
    next_id: AtomicI64,
    existence_queries: AtomicUsize,
    insert_calls: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    blind_reads: AtomicBool,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn readings(&self) -> Vec<ChargerReading> {
        self.rows.lock().map(|rows| rows.clone()).unwrap_or_default()
    }

    pub fn existence_queries(&self) -> usize {
        self.existence_queries.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_blind_reads(&self, blind: bool) {
        self.blind_reads.store(blind, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn existing_record_times(
        &self,
        device_id: &str,
        record_times: &[OffsetDateTime],
    ) -> Result<HashSet<OffsetDateTime>, StorageError> {
        self.existence_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Query("in-memory store read failure".to_string()));
        }
        if self.blind_reads.load(Ordering::SeqCst) {
            return Ok(HashSet::new());
        }

        let wanted: HashSet<OffsetDateTime> = record_times.iter().copied().map(normalize).collect();
        let rows = self
            .rows
            .lock()
            .map_err(|_| StorageError::Query("in-memory store lock poisoned".to_string()))?;

        Ok(rows
            .iter()
            .filter(|r| r.device_id == device_id)
            .map(|r| normalize(r.record_time))
            .filter(|t| wanted.contains(t))
            .collect())
    }

    async fn insert_many(&self, readings: &[ChargerReading]) -> Result<Vec<ChargerReading>, StorageError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Insert("in-memory store write failure".to_string()));
        }

        let mut rows = self
            .rows
            .lock()
            .map_err(|_| StorageError::Insert("in-memory store lock poisoned".to_string()))?;

        let mut inserted = Vec::with_capacity(readings.len());
        for reading in readings {
            let key_taken = rows
                .iter()
                .any(|r| r.device_id == reading.device_id && r.record_time == reading.record_time);
            if key_taken {
                debug!(device_id = %reading.device_id, record_time = %reading.record_time, "skipping conflicting row");
                continue;
            }

            let mut row = reading.clone();
            row.id = Some(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
            rows.push(row.clone());
            inserted.push(row);
        }

        Ok(inserted)
    }
}
