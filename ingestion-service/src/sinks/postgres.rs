use std::collections::HashSet;

use solar_client::{db::charger_reading_queries, domain::ChargerReading};
use sqlx::postgres::PgPool;
use time::OffsetDateTime;

use crate::{
    pipeline::{ReadingStore, StorageError},
    transform::normalize,
};

/// `ReadingStore` over the `solar_charger` table.
#[derive(Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ReadingStore for PgReadingStore {
    async fn existing_record_times(
        &self,
        device_id: &str,
        record_times: &[OffsetDateTime],
    ) -> Result<HashSet<OffsetDateTime>, StorageError> {
        let rows = charger_reading_queries::existing_record_times(&self.pool, device_id, record_times)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, device_id, "existing record_time query failed");
                metrics::counter!("ingest_storage_errors_total", "op" => "query").increment(1);
                StorageError::Query(e.to_string())
            })?;

        Ok(rows.into_iter().map(normalize).collect())
    }

    async fn insert_many(&self, readings: &[ChargerReading]) -> Result<Vec<ChargerReading>, StorageError> {
        let inserted = charger_reading_queries::insert_readings(&self.pool, readings)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, rows = readings.len(), "solar_charger insert failed");
                metrics::counter!("ingest_storage_errors_total", "op" => "insert").increment(1);
                StorageError::Insert(e.to_string())
            })?;

        if inserted.len() < readings.len() {
            tracing::debug!(
                requested = readings.len(),
                written = inserted.len(),
                "insert skipped rows already present"
            );
        }

        Ok(inserted)
    }
}
