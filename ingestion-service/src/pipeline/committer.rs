use std::{sync::Arc, time::Instant};

use serde_json::Value;
use solar_client::domain::ChargerReading;
use tracing::{debug, info, instrument, warn};

use crate::{
    clock::Clock,
    config::CsvTimestampPolicy,
    pipeline::{
        dedup, BatchStage, DeviceDirectory, IngestError, IngestStatus, IngestionResult, ReadingStore,
    },
    sources::{csv_upload, RawBatch, RawReading},
    transform::{candidate_from_raw, Candidate},
};

#[derive(Debug, Clone, Copy)]
pub struct CommitterSettings {
    /// Upper bound on readings in one device push.
    pub max_batch_records: usize,
    pub csv_timestamp_policy: CsvTimestampPolicy,
}

impl Default for CommitterSettings {
    fn default() -> Self {
        Self {
            max_batch_records: 5_000,
            csv_timestamp_policy: CsvTimestampPolicy::default(),
        }
    }
}

/// Runs one batch through validation, dedup and a single bulk insert.
///
/// Each call is independent; the only shared state is behind the store and
/// directory. A batch makes one existence query and at most one insert.
pub struct BatchCommitter {
    store: Arc<dyn ReadingStore>,
    directory: Arc<dyn DeviceDirectory>,
    clock: Arc<dyn Clock>,
    settings: CommitterSettings,
}

impl BatchCommitter {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        directory: Arc<dyn DeviceDirectory>,
        clock: Arc<dyn Clock>,
        settings: CommitterSettings,
    ) -> Self {
        Self {
            store,
            directory,
            clock,
            settings,
        }
    }

    /// Ingest a device push.
    #[instrument(skip_all, fields(path = "api", device_id = batch.device_id.as_deref().unwrap_or("")))]
    pub async fn ingest_batch(
        &self,
        batch: RawBatch,
        source_ip: Option<&str>,
    ) -> Result<IngestionResult, IngestError> {
        let started = Instant::now();
        let outcome = match structural_check(batch, self.settings.max_batch_records) {
            Ok((device_id, candidates)) => self.commit(&device_id, candidates, 0, source_ip).await,
            Err(e) => Err(e),
        };
        record_outcome("api", &outcome, started);
        outcome
    }

    /// Ingest an uploaded charger export. The device is named by the file.
    #[instrument(skip_all, fields(path = "csv", file_name = %file_name, bytes = file_bytes.len()))]
    pub async fn ingest_csv(
        &self,
        file_bytes: &[u8],
        file_name: &str,
        source_ip: Option<&str>,
    ) -> Result<IngestionResult, IngestError> {
        let started = Instant::now();
        let outcome = match csv_upload::adapt(
            file_bytes,
            file_name,
            self.directory.as_ref(),
            self.clock.as_ref(),
            self.settings.csv_timestamp_policy,
        )
        .await
        {
            Ok(batch) => {
                self.commit(&batch.device_id, batch.candidates, batch.skipped_rows, source_ip)
                    .await
            }
            Err(e) => Err(e),
        };
        record_outcome("csv", &outcome, started);
        outcome
    }

    async fn commit(
        &self,
        device_id: &str,
        candidates: Vec<Candidate>,
        skipped_rows: usize,
        source_ip: Option<&str>,
    ) -> Result<IngestionResult, IngestError> {
        let received_count = candidates.len();
        let resets: usize = candidates.iter().map(Candidate::reset_fields).sum();
        if resets > 0 {
            metrics::counter!("validation_field_reset_total").increment(resets as u64);
        }
        debug!(stage = %BatchStage::Validated, received_count, resets, "candidates validated");

        let novel = dedup::find_novel(self.store.as_ref(), device_id, candidates).await?;
        debug!(stage = %BatchStage::Deduplicated, novel = novel.len(), "existing readings filtered");

        if novel.is_empty() {
            return Ok(IngestionResult {
                status: IngestStatus::NothingNew,
                device_id: device_id.to_string(),
                received_count,
                skipped_rows,
                duplicate_count: received_count,
                inserted_count: 0,
                inserted_records: Vec::new(),
            });
        }

        let ingested_at = self.clock.now();
        let readings: Vec<ChargerReading> = novel
            .into_iter()
            .map(|c| c.into_reading(device_id, source_ip, ingested_at))
            .collect();

        let inserted = self.store.insert_many(&readings).await?;
        if inserted.len() < readings.len() {
            // Another batch stored some of these keys between our read and write.
            warn!(
                requested = readings.len(),
                written = inserted.len(),
                "concurrent ingest already stored some readings"
            );
        }

        let inserted_count = inserted.len();
        let status = if inserted_count == 0 {
            IngestStatus::NothingNew
        } else {
            IngestStatus::Inserted
        };

        Ok(IngestionResult {
            status,
            device_id: device_id.to_string(),
            received_count,
            skipped_rows,
            duplicate_count: received_count - inserted_count,
            inserted_count,
            inserted_records: inserted,
        })
    }
}

/// `Received → Validated`, or `Rejected` when the push is unusable.
fn structural_check(
    batch: RawBatch,
    max_batch_records: usize,
) -> Result<(String, Vec<Candidate>), IngestError> {
    let device_id = batch
        .device_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| IngestError::MalformedBatch("UID and data array are required".to_string()))?;

    let items = match batch.data {
        Some(Value::Array(items)) if !items.is_empty() => items,
        Some(Value::Array(_)) | None | Some(Value::Null) => {
            return Err(IngestError::MalformedBatch(
                "UID and data array are required".to_string(),
            ))
        }
        Some(_) => return Err(IngestError::MalformedBatch("data must be an array".to_string())),
    };

    if items.len() > max_batch_records {
        return Err(IngestError::MalformedBatch(format!(
            "batch of {} readings exceeds the limit of {max_batch_records}",
            items.len()
        )));
    }

    let candidates = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            let raw: RawReading = serde_json::from_value(item)
                .map_err(|e| IngestError::MalformedBatch(format!("data[{i}]: {e}")))?;
            candidate_from_raw(i, &raw)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((device_id, candidates))
}

fn record_outcome(path: &'static str, outcome: &Result<IngestionResult, IngestError>, started: Instant) {
    metrics::counter!("ingest_batches_total", "path" => path).increment(1);
    metrics::histogram!("ingest_batch_latency_seconds", "path" => path).record(started.elapsed().as_secs_f64());

    match outcome {
        Ok(result) => {
            metrics::counter!("ingest_readings_inserted_total").increment(result.inserted_count as u64);
            metrics::counter!("ingest_readings_duplicate_total").increment(result.duplicate_count as u64);
            info!(
                stage = %BatchStage::Committed,
                device_id = %result.device_id,
                received = result.received_count,
                inserted = result.inserted_count,
                duplicates = result.duplicate_count,
                skipped_rows = result.skipped_rows,
                "batch committed"
            );
        }
        Err(e) => {
            metrics::counter!("ingest_batches_rejected_total", "path" => path, "kind" => e.kind()).increment(1);
            if e.is_retryable() {
                warn!(error = %e, "batch failed on storage; safe to retry");
            } else {
                info!(stage = %BatchStage::Rejected, error = %e, "batch rejected");
            }
        }
    }
}
