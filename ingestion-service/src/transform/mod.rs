//! Per-field validation and timestamp normalization.
//!
//! Nothing in here fails a batch because of a bad sensor value: fields degrade
//! to `0` or `None` (see [`value`]). The only per-reading failure is a
//! missing or unparseable `RecordTime` on the API path.

pub mod timestamp;
pub mod value;

use solar_client::domain::{ChargerReading, NOT_SET_IP};
use time::OffsetDateTime;

use crate::{pipeline::IngestError, sources::RawReading};

pub use timestamp::normalize;
pub use value::{Validated, SENSOR_CEILING};

/// A validated, normalized reading that has not yet been checked against
/// storage or stamped with its device and ingestion time.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub record_time: OffsetDateTime,
    pub pv_voltage: Validated,
    pub pv_current: Validated,
    pub battery_voltage: Validated,
    pub battery_current: Validated,
    pub load_voltage: Validated,
    pub load_current: Validated,
    pub battery_energy_kwh: Validated,
    pub pv_energy_kwh: Validated,
    pub temperature: Option<f64>,
    pub source_ip: Option<String>,
}

impl Candidate {
    /// A candidate with only a time; every sensor field absent.
    pub fn at(record_time: OffsetDateTime) -> Self {
        Self {
            record_time: normalize(record_time),
            pv_voltage: Validated::Absent,
            pv_current: Validated::Absent,
            battery_voltage: Validated::Absent,
            battery_current: Validated::Absent,
            load_voltage: Validated::Absent,
            load_current: Validated::Absent,
            battery_energy_kwh: Validated::Absent,
            pv_energy_kwh: Validated::Absent,
            temperature: None,
            source_ip: None,
        }
    }

    /// Number of fields that were above the ceiling and got reset to zero.
    pub fn reset_fields(&self) -> usize {
        [
            self.pv_voltage,
            self.pv_current,
            self.battery_voltage,
            self.battery_current,
            self.load_voltage,
            self.load_current,
            self.battery_energy_kwh,
            self.pv_energy_kwh,
        ]
        .iter()
        .filter(|v| v.is_reset())
        .count()
    }

    /// Stamp the candidate for storage.
    ///
    /// The reading's own address wins over the request address; with neither,
    /// the `"Not Set"` sentinel is stored.
    pub fn into_reading(
        self,
        device_id: &str,
        request_ip: Option<&str>,
        ingested_at: OffsetDateTime,
    ) -> ChargerReading {
        let source_ip = self
            .source_ip
            .filter(|ip| !ip.trim().is_empty())
            .or_else(|| request_ip.filter(|ip| !ip.trim().is_empty()).map(str::to_string))
            .unwrap_or_else(|| NOT_SET_IP.to_string());

        ChargerReading {
            id: None,
            device_id: device_id.to_string(),
            location: device_id.to_string(),
            pv_voltage: self.pv_voltage.into_option(),
            pv_current: self.pv_current.into_option(),
            battery_voltage: self.battery_voltage.into_option(),
            battery_current: self.battery_current.into_option(),
            load_voltage: self.load_voltage.into_option(),
            load_current: self.load_current.into_option(),
            battery_energy_kwh: self.battery_energy_kwh.into_option(),
            pv_energy_kwh: self.pv_energy_kwh.into_option(),
            temperature: self.temperature,
            record_time: self.record_time,
            ingested_at,
            source_ip,
        }
    }
}

/// Validate one device-pushed reading. `index` is its position in the batch,
/// used only for the error message.
pub fn candidate_from_raw(index: usize, raw: &RawReading) -> Result<Candidate, IngestError> {
    let record_time = raw
        .record_time
        .as_ref()
        .and_then(timestamp::parse_record_time)
        .ok_or_else(|| {
            IngestError::MalformedBatch(format!(
                "data[{index}]: RecordTime is missing or not a valid timestamp"
            ))
        })?;

    Ok(Candidate {
        record_time,
        pv_voltage: value::validate_json(raw.pv_voltage.as_ref()),
        pv_current: value::validate_json(raw.pv_current.as_ref()),
        battery_voltage: value::validate_json(raw.battery_voltage.as_ref()),
        battery_current: value::validate_json(raw.battery_current.as_ref()),
        load_voltage: value::validate_json(raw.load_voltage.as_ref()),
        load_current: value::validate_json(raw.load_current.as_ref()),
        battery_energy_kwh: value::validate_json(raw.battery_energy_kwh.as_ref()),
        pv_energy_kwh: value::validate_json(raw.pv_energy_kwh.as_ref()),
        temperature: value::validate_temperature_json(raw.temperature.as_ref()),
        source_ip: raw.source_ip.clone(),
    })
}
