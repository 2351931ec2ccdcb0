use anyhow::{bail, Context, Result};
use solar_ingestion_service::{
    clock::SystemClock,
    config::AppConfig,
    directory::PgDeviceDirectory,
    observability,
    pipeline::{BatchCommitter, CommitterSettings},
    sinks::PgReadingStore,
};
use sqlx::postgres::PgPoolOptions;
use std::{env, path::Path, sync::Arc};

/// Import one charger export (`<UID>.csv`) from disk, exactly as an upload
/// through the API would be ingested.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing(observability::DEFAULT_DIRECTIVE);

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: import_csv <UID.csv>");
    }
    let file_path = Path::new(&args[1]);
    let file_name = file_path
        .file_name()
        .and_then(|n| n.to_str())
        .context("file path has no usable file name")?;
    let bytes = std::fs::read(file_path).with_context(|| format!("failed to read {}", file_path.display()))?;

    // Load configuration (can point INGESTION_CONFIG to an import-specific file).
    let cfg = AppConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    let committer = BatchCommitter::new(
        Arc::new(PgReadingStore::new(pool.clone())),
        Arc::new(PgDeviceDirectory::new(pool)),
        Arc::new(SystemClock),
        CommitterSettings {
            max_batch_records: cfg.api.max_batch_records,
            csv_timestamp_policy: cfg.csv.timestamp_policy,
        },
    );

    let result = committer.ingest_csv(&bytes, file_name, None).await?;
    tracing::info!(
        device_id = %result.device_id,
        inserted = result.inserted_count,
        duplicates = result.duplicate_count,
        skipped_rows = result.skipped_rows,
        "{}",
        result.message()
    );

    Ok(())
}
