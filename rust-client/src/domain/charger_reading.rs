use time::OffsetDateTime;

/// Source address recorded when neither the reading nor the request carries one.
pub const NOT_SET_IP: &str = "Not Set";

/// One telemetry sample from one charger at one (whole-second) instant.
///
/// `(device_id, record_time)` is unique in storage. Rows are insert-only.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChargerReading {
    /// Storage-assigned id; `None` until the row has been written.
    #[cfg_attr(feature = "serde", serde(rename = "ID"))]
    pub id: Option<i64>,
    #[cfg_attr(feature = "serde", serde(rename = "UID"))]
    pub device_id: String,
    #[cfg_attr(feature = "serde", serde(rename = "Location"))]
    pub location: String,
    #[cfg_attr(feature = "serde", serde(rename = "PvVolt"))]
    pub pv_voltage: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "PvCur"))]
    pub pv_current: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "BatVoltage"))]
    pub battery_voltage: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "BatCurrent"))]
    pub battery_current: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "LoadVoltage"))]
    pub load_voltage: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "LoadCurrent"))]
    pub load_current: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "BatKWh"))]
    pub battery_energy_kwh: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "PVKWh"))]
    pub pv_energy_kwh: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "Temperature"))]
    pub temperature: Option<f64>,
    #[cfg_attr(feature = "serde", serde(rename = "RecordTime", with = "time::serde::rfc3339"))]
    pub record_time: OffsetDateTime,
    #[cfg_attr(feature = "serde", serde(rename = "Time", with = "time::serde::rfc3339"))]
    pub ingested_at: OffsetDateTime,
    #[cfg_attr(feature = "serde", serde(rename = "IP"))]
    pub source_ip: String,
}
