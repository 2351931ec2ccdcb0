use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};

use crate::{
    clock::Clock,
    config::CsvTimestampPolicy,
    directory::is_registered,
    pipeline::{DeviceDirectory, IngestError},
    transform::{timestamp, value, Candidate},
};

/// Charger export columns, matched after trimming header whitespace.
pub const COL_DATE_TIME: &str = "Date & Time";
pub const COL_PV_VOLTAGE: &str = "PV Voltage";
pub const COL_PV_CURRENT: &str = "PV Current";
pub const COL_BAT_VOLTAGE: &str = "Bat Voltage";
pub const COL_BAT_CURRENT: &str = "Bat Current";
pub const COL_PV_KWH: &str = "KwH (till date)";

/// An uploaded export reduced to candidates for one device.
#[derive(Debug, Clone)]
pub struct CsvBatch {
    pub device_id: String,
    pub candidates: Vec<Candidate>,
    /// Rows dropped for lacking a timestamp or PV voltage.
    pub skipped_rows: usize,
    /// Rows stamped with processing time because `Date & Time` was unrecognised.
    pub fallback_rows: usize,
}

/// Result of [`parse_rows`].
#[derive(Debug, Clone, Default)]
pub struct ParsedRows {
    pub candidates: Vec<Candidate>,
    pub skipped_rows: usize,
    pub fallback_rows: usize,
}

/// Device identifier encoded in an export file name: `IND.RAJ.SHA001.csv`
/// names device `IND.RAJ.SHA001`. Leading directory components are stripped
/// (`uploads/IND.RAJ.SHA001.csv` names the same device), then only the `.csv`
/// extension is removed, so dots inside the identifier survive.
pub fn device_id_from_file_name(file_name: &str) -> Result<String, IngestError> {
    let base = Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name);

    let stem = base
        .len()
        .checked_sub(4)
        .filter(|&cut| base.is_char_boundary(cut) && base[cut..].eq_ignore_ascii_case(".csv"))
        .map(|cut| &base[..cut])
        .ok_or_else(|| IngestError::MalformedBatch(format!("'{file_name}' is not a .csv file")))?;

    let device_id = stem.trim();
    if device_id.is_empty() {
        return Err(IngestError::MalformedBatch(format!(
            "'{file_name}' does not name a device"
        )));
    }
    Ok(device_id.to_string())
}

/// Turn an uploaded export into candidates.
///
/// The device named by the file must be registered; that is checked before a
/// single row is read.
pub async fn adapt(
    file_bytes: &[u8],
    file_name: &str,
    directory: &dyn DeviceDirectory,
    clock: &dyn Clock,
    policy: CsvTimestampPolicy,
) -> Result<CsvBatch, IngestError> {
    let device_id = device_id_from_file_name(file_name)?;

    let known = directory.known_device_ids().await?;
    if !is_registered(&known, &device_id) {
        tracing::warn!(device_id = %device_id, file_name, "upload for unregistered device");
        return Err(IngestError::UnknownDevice(device_id));
    }

    let ParsedRows {
        candidates,
        skipped_rows,
        fallback_rows,
    } = parse_rows(file_bytes, clock, policy)?;
    if skipped_rows > 0 {
        metrics::counter!("csv_rows_skipped_total").increment(skipped_rows as u64);
        tracing::debug!(device_id = %device_id, skipped_rows, "dropped rows without timestamp or PV voltage");
    }
    if fallback_rows > 0 {
        metrics::counter!("csv_timestamp_fallback_total").increment(fallback_rows as u64);
    }
    if fallback_rows > 1 {
        // Processing-time stamps land on the same second and dedup keeps one.
        tracing::warn!(
            device_id = %device_id,
            fallback_rows,
            "rows stamped with processing time collapse onto one record_time"
        );
    }
    if candidates.is_empty() {
        return Err(IngestError::EmptyBatch);
    }

    Ok(CsvBatch {
        device_id,
        candidates,
        skipped_rows,
        fallback_rows,
    })
}

struct Columns {
    date_time: Option<usize>,
    pv_voltage: Option<usize>,
    pv_current: Option<usize>,
    bat_voltage: Option<usize>,
    bat_current: Option<usize>,
    pv_kwh: Option<usize>,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Self {
        let find = |name: &str| headers.iter().position(|h| h == name);
        Self {
            date_time: find(COL_DATE_TIME),
            pv_voltage: find(COL_PV_VOLTAGE),
            pv_current: find(COL_PV_CURRENT),
            bat_voltage: find(COL_BAT_VOLTAGE),
            bat_current: find(COL_BAT_CURRENT),
            pv_kwh: find(COL_PV_KWH),
        }
    }
}

fn cell(record: &StringRecord, idx: Option<usize>) -> Option<&str> {
    idx.and_then(|i| record.get(i))
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Parse the export body into candidates, counting rows dropped for lacking
/// `Date & Time` or `PV Voltage` and rows stamped with processing time.
pub fn parse_rows(
    file_bytes: &[u8],
    clock: &dyn Clock,
    policy: CsvTimestampPolicy,
) -> Result<ParsedRows, IngestError> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::Headers)
        .flexible(true)
        .from_reader(file_bytes);

    let headers = rdr
        .headers()
        .map_err(|e| IngestError::MalformedBatch(format!("failed to read CSV headers: {e}")))?
        .clone();
    let cols = Columns::locate(&headers);

    let mut parsed = ParsedRows::default();

    for (row, result) in rdr.records().enumerate() {
        let record = result
            .map_err(|e| IngestError::MalformedBatch(format!("CSV parsing error at row {}: {e}", row + 1)))?;

        let (Some(date_time), Some(_)) = (
            non_blank(cell(&record, cols.date_time)),
            non_blank(cell(&record, cols.pv_voltage)),
        ) else {
            parsed.skipped_rows += 1;
            continue;
        };

        let record_time = match timestamp::parse_csv_timestamp(date_time) {
            Some(ts) => ts,
            None => match policy {
                CsvTimestampPolicy::FallbackToNow => {
                    tracing::warn!(row = row + 1, value = date_time, "unrecognised CSV timestamp, using processing time");
                    parsed.fallback_rows += 1;
                    timestamp::normalize(clock.now())
                }
                CsvTimestampPolicy::RejectRow => {
                    return Err(IngestError::MalformedBatch(format!(
                        "row {}: '{date_time}' is not HH:MM:SS DD/MM/YYYY",
                        row + 1
                    )));
                }
            },
        };

        let bat_voltage = value::validate_text(cell(&record, cols.bat_voltage));
        let bat_current = value::validate_text(cell(&record, cols.bat_current));

        let mut candidate = Candidate::at(record_time);
        candidate.pv_voltage = value::validate_text(cell(&record, cols.pv_voltage));
        candidate.pv_current = value::validate_text(cell(&record, cols.pv_current));
        candidate.battery_voltage = bat_voltage;
        candidate.battery_current = bat_current;
        // Exports have no load sensor columns; load mirrors the battery side.
        candidate.load_voltage = bat_voltage;
        candidate.load_current = bat_current;
        candidate.pv_energy_kwh = value::validate_text(cell(&record, cols.pv_kwh));
        parsed.candidates.push(candidate);
    }

    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::FixedClock, directory::StaticDeviceDirectory, transform::Validated};
    use time::macros::datetime;

    const NOW: time::OffsetDateTime = datetime!(2025-05-05 05:05:05 UTC);

    const EXPORT: &str = "\
 Date & Time , PV Voltage ,PV Current,Bat Voltage,Bat Current,KwH (till date)
10:00:00 01/02/2024,18.5,2.1,12.7,1.4,120
10:00:30 01/02/2024,,2.0,12.7,1.3,120
,19.0,2.2,12.8,1.5,121
10:01:00 01/02/2024,45,2.3,12.9,1.6,121.5
";

    #[test]
    fn device_id_comes_from_the_file_name() {
        assert_eq!(device_id_from_file_name("IND.RAJ.SHA001.csv").unwrap(), "IND.RAJ.SHA001");
        assert_eq!(device_id_from_file_name("uploads/ IND.RAJ.SHA001 .CSV").unwrap(), "IND.RAJ.SHA001");
        assert_eq!(device_id_from_file_name("a/b/IND.RAJ.SHA001.csv").unwrap(), "IND.RAJ.SHA001");
        assert!(matches!(
            device_id_from_file_name("IND.RAJ.SHA001.xlsx"),
            Err(IngestError::MalformedBatch(_))
        ));
        assert!(matches!(device_id_from_file_name(".csv"), Err(IngestError::MalformedBatch(_))));
    }

    #[test]
    fn rows_without_time_or_pv_voltage_are_dropped() {
        let ParsedRows {
            candidates,
            skipped_rows,
            fallback_rows,
        } = parse_rows(EXPORT.as_bytes(), &FixedClock(NOW), CsvTimestampPolicy::FallbackToNow).unwrap();

        assert_eq!(skipped_rows, 2);
        assert_eq!(fallback_rows, 0);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].record_time, datetime!(2024-02-01 10:00:00 UTC));
        assert_eq!(candidates[1].record_time, datetime!(2024-02-01 10:01:00 UTC));
    }

    #[test]
    fn columns_map_with_load_aliased_to_battery() {
        let candidates = parse_rows(EXPORT.as_bytes(), &FixedClock(NOW), CsvTimestampPolicy::FallbackToNow)
            .unwrap()
            .candidates;
        let c = &candidates[0];

        assert_eq!(c.pv_voltage, Validated::Value(18.5));
        assert_eq!(c.pv_current, Validated::Value(2.1));
        assert_eq!(c.battery_voltage, Validated::Value(12.7));
        assert_eq!(c.load_voltage, Validated::Value(12.7));
        assert_eq!(c.battery_current, Validated::Value(1.4));
        assert_eq!(c.load_current, Validated::Value(1.4));
        // 120 kWh is above the sensor ceiling.
        assert_eq!(c.pv_energy_kwh, Validated::Reset);
        assert_eq!(c.battery_energy_kwh, Validated::Absent);
        assert_eq!(c.temperature, None);

        assert_eq!(candidates[1].pv_voltage, Validated::Reset);
    }

    #[test]
    fn unrecognised_timestamp_follows_the_policy() {
        let body = "Date & Time,PV Voltage\n2024-02-01 10:00,18\n";

        let parsed = parse_rows(body.as_bytes(), &FixedClock(NOW), CsvTimestampPolicy::FallbackToNow).unwrap();
        assert_eq!(parsed.candidates[0].record_time, NOW);
        assert_eq!(parsed.fallback_rows, 1);

        let err = parse_rows(body.as_bytes(), &FixedClock(NOW), CsvTimestampPolicy::RejectRow).unwrap_err();
        assert!(matches!(err, IngestError::MalformedBatch(ref m) if m.contains("row 1")));
    }

    #[tokio::test]
    async fn unregistered_device_is_rejected_before_rows_are_read() {
        let dir = StaticDeviceDirectory::new(["IND.RAJ.SHA002"]);
        // Invalid UTF-8 would fail row parsing if rows were read.
        let body: &[u8] = b"Date & Time,PV Voltage\n\xff\xfe,1\n";

        let err = adapt(body, "IND.RAJ.SHA001.csv", &dir, &FixedClock(NOW), CsvTimestampPolicy::FallbackToNow)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::UnknownDevice(ref id) if id == "IND.RAJ.SHA001"));
    }

    #[tokio::test]
    async fn registered_device_is_matched_case_insensitively() {
        let dir = StaticDeviceDirectory::new(["ind.raj.sha001"]);
        let batch = adapt(
            EXPORT.as_bytes(),
            "IND.RAJ.SHA001.csv",
            &dir,
            &FixedClock(NOW),
            CsvTimestampPolicy::FallbackToNow,
        )
        .await
        .unwrap();

        assert_eq!(batch.device_id, "IND.RAJ.SHA001");
        assert_eq!(batch.candidates.len(), 2);
        assert_eq!(batch.skipped_rows, 2);
        assert_eq!(batch.fallback_rows, 0);
    }

    #[tokio::test]
    async fn processing_time_fallbacks_are_counted() {
        let dir = StaticDeviceDirectory::new(["D1"]);
        let body = "Date & Time,PV Voltage
soon,18
later,19
10:00:00 01/02/2024,20
";

        let batch = adapt(body.as_bytes(), "D1.csv", &dir, &FixedClock(NOW), CsvTimestampPolicy::FallbackToNow)
            .await
            .unwrap();

        assert_eq!(batch.fallback_rows, 2);
        assert_eq!(batch.candidates.len(), 3);
        assert_eq!(batch.candidates[0].record_time, batch.candidates[1].record_time);
    }

    #[tokio::test]
    async fn export_with_no_usable_rows_is_an_empty_batch() {
        let dir = StaticDeviceDirectory::new(["D1"]);
        let body = "Date & Time,PV Voltage\n,12\n10:00:00 01/02/2024,\n";

        let err = adapt(body.as_bytes(), "D1.csv", &dir, &FixedClock(NOW), CsvTimestampPolicy::FallbackToNow)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::EmptyBatch));
    }
}
