use anyhow::Result;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::domain::ChargerReading;

/// Return the `record_time` of every stored reading of `device_id` whose
/// time is one of `record_times`. One round-trip regardless of batch size.
pub async fn existing_record_times(
    pool: &PgPool,
    device_id: &str,
    record_times: &[OffsetDateTime],
) -> Result<Vec<OffsetDateTime>> {
    if record_times.is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<(OffsetDateTime,)> = sqlx::query_as(
        r#"
        SELECT record_time
        FROM solar_charger
        WHERE device_id = $1
          AND record_time = ANY($2)
        "#,
    )
    .bind(device_id)
    .bind(record_times)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(ts,)| ts).collect())
}

/// Single-statement bulk insert. Every column is bound as one array, so the
/// statement carries 14 parameters whatever the batch size; Postgres caps a
/// statement at 65,535.
pub const INSERT_READINGS_SQL: &str = r#"
INSERT INTO solar_charger (device_id, location, pv_voltage, pv_current, battery_voltage,
    battery_current, load_voltage, load_current, battery_energy_kwh, pv_energy_kwh, temperature,
    record_time, ingested_at, source_ip)
SELECT * FROM UNNEST(
    $1::text[], $2::text[],
    $3::float8[], $4::float8[], $5::float8[], $6::float8[], $7::float8[],
    $8::float8[], $9::float8[], $10::float8[], $11::float8[],
    $12::timestamptz[], $13::timestamptz[], $14::text[]
)
ON CONFLICT (device_id, record_time) DO NOTHING
RETURNING id, device_id, location, pv_voltage, pv_current, battery_voltage,
    battery_current, load_voltage, load_current, battery_energy_kwh, pv_energy_kwh, temperature,
    record_time, ingested_at, source_ip
"#;

/// `readings` split column-wise, in `INSERT_READINGS_SQL` parameter order.
#[derive(Debug, Default)]
pub struct ReadingColumns {
    pub device_id: Vec<String>,
    pub location: Vec<String>,
    pub pv_voltage: Vec<Option<f64>>,
    pub pv_current: Vec<Option<f64>>,
    pub battery_voltage: Vec<Option<f64>>,
    pub battery_current: Vec<Option<f64>>,
    pub load_voltage: Vec<Option<f64>>,
    pub load_current: Vec<Option<f64>>,
    pub battery_energy_kwh: Vec<Option<f64>>,
    pub pv_energy_kwh: Vec<Option<f64>>,
    pub temperature: Vec<Option<f64>>,
    pub record_time: Vec<OffsetDateTime>,
    pub ingested_at: Vec<OffsetDateTime>,
    pub source_ip: Vec<String>,
}

impl ReadingColumns {
    pub fn from_readings(readings: &[ChargerReading]) -> Self {
        let mut cols = Self::default();
        for r in readings {
            cols.device_id.push(r.device_id.clone());
            cols.location.push(r.location.clone());
            cols.pv_voltage.push(r.pv_voltage);
            cols.pv_current.push(r.pv_current);
            cols.battery_voltage.push(r.battery_voltage);
            cols.battery_current.push(r.battery_current);
            cols.load_voltage.push(r.load_voltage);
            cols.load_current.push(r.load_current);
            cols.battery_energy_kwh.push(r.battery_energy_kwh);
            cols.pv_energy_kwh.push(r.pv_energy_kwh);
            cols.temperature.push(r.temperature);
            cols.record_time.push(r.record_time);
            cols.ingested_at.push(r.ingested_at);
            cols.source_ip.push(r.source_ip.clone());
        }
        cols
    }

    pub fn len(&self) -> usize {
        self.device_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.device_id.is_empty()
    }
}

/// Insert `readings` as a single statement.
///
/// Rows that collide with an existing `(device_id, record_time)` are skipped
/// by the database; only the rows actually written are returned.
pub async fn insert_readings(pool: &PgPool, readings: &[ChargerReading]) -> Result<Vec<ChargerReading>> {
    if readings.is_empty() {
        return Ok(Vec::new());
    }

    let cols = ReadingColumns::from_readings(readings);
    let rows = sqlx::query_as::<_, ChargerReading>(INSERT_READINGS_SQL)
        .bind(cols.device_id)
        .bind(cols.location)
        .bind(cols.pv_voltage)
        .bind(cols.pv_current)
        .bind(cols.battery_voltage)
        .bind(cols.battery_current)
        .bind(cols.load_voltage)
        .bind(cols.load_current)
        .bind(cols.battery_energy_kwh)
        .bind(cols.pv_energy_kwh)
        .bind(cols.temperature)
        .bind(cols.record_time)
        .bind(cols.ingested_at)
        .bind(cols.source_ip)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
