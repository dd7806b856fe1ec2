use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of a report. The backend uses integer keys, but string keys are
/// accepted so a different backend can be pointed at the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportId {
    Int(i64),
    Text(String),
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportId::Int(v) => write!(f, "{}", v),
            ReportId::Text(v) => f.write_str(v),
        }
    }
}

/// Severity and priority arrive either as numbers or as labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Grade {
    Int(i64),
    Float(f64),
    Label(String),
    #[default]
    Unset,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grade::Int(v) => write!(f, "{}", v),
            Grade::Float(v) => write!(f, "{}", v),
            Grade::Label(v) => f.write_str(v),
            Grade::Unset => Ok(()),
        }
    }
}

/// A defect report as returned by `GET /reports`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: ReportId,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub severity: Grade,
    #[serde(default)]
    pub priority: Grade,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, deserialize_with = "string_or_null")]
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traffic_density: Option<String>,
}

impl Report {
    pub fn kind_label(&self) -> &str {
        self.kind.as_deref().unwrap_or("")
    }

    pub fn has_valid_coordinates(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// `lat, lon` rounded to four decimals.
    pub fn location_label(&self) -> String {
        format!("{}, {}", fixed4(self.latitude), fixed4(self.longitude))
    }

    /// Parses the timestamp into `tz`. Offset-less timestamps are taken as
    /// wall-clock time in `tz`; bare dates as UTC midnight.
    pub fn created_at<Tz: TimeZone>(&self, tz: &Tz) -> Option<DateTime<Tz>> {
        let raw = self.timestamp.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(tz));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return tz.from_local_datetime(&naive).earliest();
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
            return tz.from_local_datetime(&naive).earliest();
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc().with_timezone(tz))
    }

    pub fn timestamp_label<Tz>(&self, tz: &Tz, pattern: &str) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        match self.created_at(tz) {
            Some(dt) => dt.format(pattern).to_string(),
            None => "Invalid Date".to_string(),
        }
    }
}

/// Four decimals, with exact halfway values rounded away from zero and
/// negative zero printed without a sign.
fn fixed4(value: f64) -> String {
    let magnitude = value.abs();
    // A value sits exactly halfway between two 4-decimal neighbours only
    // when it is an odd multiple of 1/32.
    let scaled = magnitude * 32.0;
    let halfway = scaled.fract() == 0.0 && scaled % 2.0 == 1.0;
    let magnitude = if halfway {
        f64::from_bits(magnitude.to_bits() + 1)
    } else {
        magnitude
    };
    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{:.4}", sign, magnitude)
}

fn string_or_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

/// One detector hit, in the shape the backend's JSON submission path expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f64,
    pub bounding_box: BoundingBox,
}

/// Body of a successful submission. Every field is optional because the
/// dashboard does not depend on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub priority: Option<Grade>,
}
