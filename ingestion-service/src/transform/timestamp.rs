use serde_json::Value;
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Duration, OffsetDateTime,
    PrimitiveDateTime, UtcOffset,
};

/// Convert to UTC and drop sub-second precision.
///
/// This is the dedup granularity: it must be applied to candidate times and
/// to times read back from storage alike.
pub fn normalize(ts: OffsetDateTime) -> OffsetDateTime {
    let utc = ts.to_offset(UtcOffset::UTC);
    utc - Duration::nanoseconds(i64::from(utc.nanosecond()))
}

/// Parse a device-pushed `RecordTime`: an RFC 3339 string or epoch millis.
pub fn parse_record_time(raw: &Value) -> Option<OffsetDateTime> {
    let parsed = match raw {
        Value::String(s) => OffsetDateTime::parse(s.trim(), &Rfc3339).ok(),
        Value::Number(n) => {
            let millis = match n.as_i64() {
                Some(ms) => i128::from(ms),
                None => n.as_f64().filter(|v| v.is_finite())?.floor() as i128,
            };
            // Float casts saturate; the scale-up can still overflow i128.
            OffsetDateTime::from_unix_timestamp_nanos(millis.checked_mul(1_000_000)?).ok()
        }
        _ => None,
    };
    parsed.map(normalize)
}

/// Parse a CSV `Date & Time` cell (`HH:MM:SS DD/MM/YYYY`) as UTC. `None` when
/// the cell does not match the export format.
pub fn parse_csv_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let format = format_description!("[hour]:[minute]:[second] [day]/[month]/[year]");
    PrimitiveDateTime::parse(raw.trim(), format)
        .ok()
        .map(|dt| normalize(dt.assume_utc()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn normalize_truncates_to_the_containing_second() {
        assert_eq!(
            normalize(datetime!(2024-01-01 00:00:00.999 UTC)),
            datetime!(2024-01-01 00:00:00 UTC)
        );
        assert_eq!(
            normalize(datetime!(2024-01-01 05:30:10.250 +05:30)),
            datetime!(2024-01-01 00:00:10 UTC)
        );
    }

    #[test]
    fn millisecond_variants_share_a_record_time() {
        let a = parse_record_time(&json!("2024-01-01T00:00:00.500Z"));
        let b = parse_record_time(&json!("2024-01-01T00:00:00.900Z"));
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn record_time_accepts_epoch_millis() {
        assert_eq!(
            parse_record_time(&json!(1_704_067_200_500_i64)),
            Some(datetime!(2024-01-01 00:00:00 UTC))
        );
    }

    #[test]
    fn record_time_rejects_other_shapes() {
        assert_eq!(parse_record_time(&json!("yesterday")), None);
        assert_eq!(parse_record_time(&json!(null)), None);
        assert_eq!(parse_record_time(&json!({ "ts": 1 })), None);
    }

    #[test]
    fn record_time_rejects_out_of_range_epoch_millis() {
        assert_eq!(parse_record_time(&json!(1e33)), None);
        assert_eq!(parse_record_time(&json!(-1e33)), None);
        assert_eq!(parse_record_time(&json!(1e300)), None);
        assert_eq!(parse_record_time(&json!(i64::MAX)), None);
        assert_eq!(parse_record_time(&json!(i64::MIN)), None);
    }

    #[test]
    fn csv_timestamp_is_time_first_then_day_month_year() {
        assert_eq!(
            parse_csv_timestamp("13:45:09 02/03/2024"),
            Some(datetime!(2024-03-02 13:45:09 UTC))
        );
        assert_eq!(parse_csv_timestamp("2024-03-02 13:45:09"), None);
        assert_eq!(parse_csv_timestamp("13:45:09 31/02/2024"), None);
    }
}
