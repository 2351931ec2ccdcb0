use serde::Deserialize;
use serde_json::Value;

/// A device push as received: `{ "UID": "...", "data": [ ... ] }`.
///
/// `data` stays an untyped value so that a non-list payload can be reported
/// as a malformed batch rather than a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBatch {
    #[serde(rename = "UID", alias = "DeviceID", default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl RawBatch {
    pub fn new(device_id: impl Into<String>, data: Vec<Value>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            data: Some(Value::Array(data)),
        }
    }
}

/// One reading inside a device push. Sensor fields may be numbers or
/// numeric strings; anything else is treated as not reported.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReading {
    #[serde(rename = "PvVolt", default)]
    pub pv_voltage: Option<Value>,
    #[serde(rename = "PvCur", default)]
    pub pv_current: Option<Value>,
    #[serde(rename = "BatVoltage", default)]
    pub battery_voltage: Option<Value>,
    #[serde(rename = "BatCurrent", default)]
    pub battery_current: Option<Value>,
    #[serde(rename = "LoadVoltage", default)]
    pub load_voltage: Option<Value>,
    #[serde(rename = "LoadCurrent", default)]
    pub load_current: Option<Value>,
    #[serde(rename = "BatKWh", default)]
    pub battery_energy_kwh: Option<Value>,
    #[serde(rename = "PVKWh", default)]
    pub pv_energy_kwh: Option<Value>,
    #[serde(rename = "Temperature", default)]
    pub temperature: Option<Value>,
    #[serde(rename = "RecordTime", default)]
    pub record_time: Option<Value>,
    #[serde(rename = "IP", default)]
    pub source_ip: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_batch_accepts_uid_or_device_id() {
        let a: RawBatch = serde_json::from_value(json!({ "UID": "D1", "data": [] })).unwrap();
        let b: RawBatch = serde_json::from_value(json!({ "DeviceID": "D1", "data": [] })).unwrap();
        assert_eq!(a.device_id.as_deref(), Some("D1"));
        assert_eq!(b.device_id.as_deref(), Some("D1"));
    }

    #[test]
    fn raw_batch_keeps_non_list_data_for_the_committer_to_reject() {
        let b: RawBatch = serde_json::from_value(json!({ "UID": "D1", "data": "oops" })).unwrap();
        assert_eq!(b.data, Some(json!("oops")));

        let empty: RawBatch = serde_json::from_value(json!({})).unwrap();
        assert!(empty.device_id.is_none());
        assert!(empty.data.is_none());
    }
}
