use anyhow::Result;
use sqlx::PgPool;

const CREATE_DEVICES: &str = r#"
CREATE TABLE IF NOT EXISTS devices (
    uid        TEXT PRIMARY KEY,
    name       TEXT,
    created_at TIMESTAMPTZ DEFAULT now()
)
"#;

const CREATE_SOLAR_CHARGER: &str = r#"
CREATE TABLE IF NOT EXISTS solar_charger (
    id                 BIGSERIAL PRIMARY KEY,
    device_id          TEXT NOT NULL,
    location           TEXT NOT NULL,
    pv_voltage         DOUBLE PRECISION,
    pv_current         DOUBLE PRECISION,
    battery_voltage    DOUBLE PRECISION,
    battery_current    DOUBLE PRECISION,
    load_voltage       DOUBLE PRECISION,
    load_current       DOUBLE PRECISION,
    battery_energy_kwh DOUBLE PRECISION,
    pv_energy_kwh      DOUBLE PRECISION,
    temperature        DOUBLE PRECISION,
    record_time        TIMESTAMPTZ NOT NULL,
    ingested_at        TIMESTAMPTZ NOT NULL,
    source_ip          TEXT NOT NULL,
    CONSTRAINT solar_charger_device_record_time_key UNIQUE (device_id, record_time)
)
"#;

/// Create the tables the ingestion pipeline reads and writes, if missing.
///
/// The unique constraint on `(device_id, record_time)` backs up the
/// pipeline's existence check when two batches race.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(CREATE_DEVICES).execute(pool).await?;
    sqlx::query(CREATE_SOLAR_CHARGER).execute(pool).await?;
    Ok(())
}
