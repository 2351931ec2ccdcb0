use std::sync::Arc;

use anyhow::Result;
use solar_ingestion_service::{
    clock::SystemClock,
    config::AppConfig,
    directory::PgDeviceDirectory,
    metrics_server, observability,
    pipeline::{BatchCommitter, CommitterSettings},
    sinks::PgReadingStore,
    sources::http_api,
};
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing(observability::DEFAULT_DIRECTIVE);

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect(&cfg.database.uri)
        .await?;

    if cfg.database.ensure_schema {
        solar_client::db::schema::ensure_schema(&pool).await?;
        tracing::info!("database schema ensured");
    }

    let committer = BatchCommitter::new(
        Arc::new(PgReadingStore::new(pool.clone())),
        Arc::new(PgDeviceDirectory::new(pool)),
        Arc::new(SystemClock),
        CommitterSettings {
            max_batch_records: cfg.api.max_batch_records,
            csv_timestamp_policy: cfg.csv.timestamp_policy,
        },
    );

    let app = http_api::router(Arc::new(committer), cfg.api.max_body_bytes);
    http_api::serve(&cfg.api.http_bind_addr, app).await
}
