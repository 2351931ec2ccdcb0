use serde_json::Value;

/// Readings above this are treated as sensor or transmission garbage.
pub const SENSOR_CEILING: f64 = 30.0;

/// Outcome of validating one reported sensor field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Validated {
    /// Parsed and within the ceiling; kept as reported.
    Value(f64),
    /// Parsed but above the ceiling; stored as zero.
    Reset,
    /// Not reported or not a number; stored as `NULL`.
    Absent,
}

impl Validated {
    pub fn into_option(self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(v),
            Self::Reset => Some(0.0),
            Self::Absent => None,
        }
    }

    pub fn is_reset(self) -> bool {
        matches!(self, Self::Reset)
    }
}

/// Parse a text cell as a finite decimal. Blank or unparseable text is `None`.
pub fn parse_text(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a JSON scalar (number or numeric string).
pub fn parse_json(raw: Option<&Value>) -> Option<f64> {
    match raw? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_text(s),
        _ => None,
    }
}

/// Apply the sensor ceiling to an already-parsed value.
pub fn clamp(parsed: Option<f64>) -> Validated {
    match parsed {
        None => Validated::Absent,
        Some(v) if v <= SENSOR_CEILING => Validated::Value(v),
        Some(_) => Validated::Reset,
    }
}

pub fn validate_json(raw: Option<&Value>) -> Validated {
    clamp(parse_json(raw))
}

pub fn validate_text(raw: Option<&str>) -> Validated {
    clamp(raw.and_then(parse_text))
}

/// Temperature has no ceiling: any finite number is kept.
pub fn validate_temperature_json(raw: Option<&Value>) -> Option<f64> {
    parse_json(raw)
}
