/// Segment, SegmentRecord, Coefficients, SegmentError
/// core data structures for the rating curve engine
///
/// The serialized record shape exchanged with the admin editor also lives
/// here, since "is this row well formed" is really a question about the data
/// model rather than about curve ordering.
///
/// No I/O here: only types, parsing of the boundary record shape, and
/// field-level well-formedness checks.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Observation constants
// ---------------------------------------------------------------------------

/// Value written in place of a discharge that could not be computed.
pub const NODATA_VALUE: f64 = -999.9;

/// Quality index for a level observation that was missing or unusable.
pub const QUALITY_MISSING_LEVEL: i32 = 110;

/// Quality index for a level that has no rating (no segment covers it, or the
/// formula is undefined for that stage).
pub const QUALITY_NO_RATING: i32 = 120;

/// Column names of the serialized segment shape, in canonical order.
pub const SEGMENT_FIELDS: [&str; 8] = ["from", "to", "low_val", "up_val", "A", "B", "C", "K"];

// ---------------------------------------------------------------------------
// Segment types
// ---------------------------------------------------------------------------

/// Conversion coefficients of one calibration segment.
///
/// The engine treats them as opaque parameters handed to the configured
/// `RatingFormula`; no sign or magnitude constraint is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub k: f64,
}

/// One calibration interval of a rating curve.
///
/// Valid over the half-open window `[from, to)`, calibrated for stages
/// between `low_val` and `up_val`. Every numeric field is finite; the
/// `from < to` rule is checked by the validator, not here, so that an
/// inverted row can still be reported with its position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    low_val: f64,
    up_val: f64,
    coefficients: Coefficients,
}

impl Segment {
    /// Builds a segment, rejecting any non-finite stage bound or coefficient.
    pub fn new(
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        low_val: f64,
        up_val: f64,
        coefficients: Coefficients,
    ) -> Result<Self, SegmentError> {
        let numeric = [
            ("low_val", low_val),
            ("up_val", up_val),
            ("A", coefficients.a),
            ("B", coefficients.b),
            ("C", coefficients.c),
            ("K", coefficients.k),
        ];
        for (field, value) in numeric {
            if !value.is_finite() {
                return Err(SegmentError::NonFinite { field, value });
            }
        }

        Ok(Self {
            from,
            to,
            low_val,
            up_val,
            coefficients,
        })
    }

    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    pub fn to(&self) -> DateTime<Utc> {
        self.to
    }

    pub fn low_val(&self) -> f64 {
        self.low_val
    }

    pub fn up_val(&self) -> f64 {
        self.up_val
    }

    pub fn coefficients(&self) -> &Coefficients {
        &self.coefficients
    }

    /// `true` when `at` lies in `[from, to)`.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.from <= at && at < self.to
    }

    /// `true` when both segments describe the same validity window.
    pub fn same_interval(&self, other: &Segment) -> bool {
        self.from == other.from && self.to == other.to
    }

    /// `true` when `level` lies in the advisory stage band `[low_val, up_val)`.
    pub fn stage_in_band(&self, level: f64) -> bool {
        self.low_val <= level && level < self.up_val
    }
}

// ---------------------------------------------------------------------------
// Serialized record shape
// ---------------------------------------------------------------------------

/// A numeric cell as the editor sends it: a JSON number or text.
///
/// Any other JSON value lands in `Other` so that it is rejected for its own
/// row instead of failing deserialization of the whole list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericField {
    Number(f64),
    Text(String),
    Other(Value),
}

impl NumericField {
    fn parse(&self, field: &'static str) -> Result<f64, SegmentError> {
        match self {
            NumericField::Number(value) => Ok(*value),
            NumericField::Text(text) => {
                text.trim()
                    .parse::<f64>()
                    .map_err(|_| SegmentError::NotANumber {
                        field,
                        value: text.clone(),
                    })
            }
            NumericField::Other(value) => Err(SegmentError::NotANumber {
                field,
                value: value.to_string(),
            }),
        }
    }
}

impl From<f64> for NumericField {
    fn from(value: f64) -> Self {
        NumericField::Number(value)
    }
}

/// One segment as exchanged with the presentation layer.
///
/// Every field is optional at the serde level so that a missing column is
/// reported as a `SegmentError::MissingField` for its row rather than as an
/// opaque deserialization failure of the whole list. Unknown fields are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_val: Option<NumericField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low_val: Option<NumericField>,
    #[serde(rename = "A", default, skip_serializing_if = "Option::is_none")]
    pub a: Option<NumericField>,
    #[serde(rename = "B", default, skip_serializing_if = "Option::is_none")]
    pub b: Option<NumericField>,
    #[serde(rename = "C", default, skip_serializing_if = "Option::is_none")]
    pub c: Option<NumericField>,
    #[serde(rename = "K", default, skip_serializing_if = "Option::is_none")]
    pub k: Option<NumericField>,
}

impl SegmentRecord {
    /// Converts the record into a typed `Segment`.
    ///
    /// Fields are checked in the order `from, to, low_val, up_val, A, B, C, K`
    /// and the first problem is returned.
    pub fn to_segment(&self) -> Result<Segment, SegmentError> {
        let from = required_timestamp("from", self.from.as_deref())?;
        let to = required_timestamp("to", self.to.as_deref())?;
        let low_val = required_number("low_val", self.low_val.as_ref())?;
        let up_val = required_number("up_val", self.up_val.as_ref())?;
        let coefficients = Coefficients {
            a: required_number("A", self.a.as_ref())?,
            b: required_number("B", self.b.as_ref())?,
            c: required_number("C", self.c.as_ref())?,
            k: required_number("K", self.k.as_ref())?,
        };

        Segment::new(from, to, low_val, up_val, coefficients)
    }
}

impl From<&Segment> for SegmentRecord {
    fn from(segment: &Segment) -> Self {
        let coefficients = segment.coefficients();
        SegmentRecord {
            from: Some(format_timestamp(segment.from())),
            to: Some(format_timestamp(segment.to())),
            up_val: Some(segment.up_val().into()),
            low_val: Some(segment.low_val().into()),
            a: Some(coefficients.a.into()),
            b: Some(coefficients.b.into()),
            c: Some(coefficients.c.into()),
            k: Some(coefficients.k.into()),
        }
    }
}

/// Timestamp cells keep whatever JSON value arrived, as text; a number or
/// boolean then fails timestamp parsing for its row.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None => None,
        Some(Value::String(text)) => Some(text),
        Some(other) => Some(other.to_string()),
    })
}

fn required_timestamp(
    field: &'static str,
    raw: Option<&str>,
) -> Result<DateTime<Utc>, SegmentError> {
    let raw = raw.ok_or(SegmentError::MissingField(field))?;
    parse_timestamp(raw).ok_or_else(|| SegmentError::InvalidTimestamp {
        field,
        value: raw.to_string(),
    })
}

fn required_number(
    field: &'static str,
    raw: Option<&NumericField>,
) -> Result<f64, SegmentError> {
    raw.ok_or(SegmentError::MissingField(field))?.parse(field)
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Parses an ISO-8601 compatible timestamp into UTC.
///
/// Accepts RFC 3339 (`2020-06-01T00:00:00+02:00`, `...Z`), compact offsets
/// (`+0200`), space-separated date and time, and plain dates. Values without
/// an offset are read as UTC. Returns `None` for anything else, including an
/// empty string.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Formats a timestamp the way records and `.rcv` files carry it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339()
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Field-level problems that make a segment malformed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SegmentError {
    /// A required column was absent from the record.
    #[error("missing field '{0}'")]
    MissingField(&'static str),
    /// A numeric column held text that does not parse as a number.
    #[error("field '{field}' is not a number: '{value}'")]
    NotANumber { field: &'static str, value: String },
    /// A numeric column parsed but is NaN or infinite.
    #[error("field '{field}' must be a finite number, got {value}")]
    NonFinite { field: &'static str, value: f64 },
    /// A timestamp column could not be parsed.
    #[error("field '{field}' is not a valid timestamp: '{value}'")]
    InvalidTimestamp { field: &'static str, value: String },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
