//! Per-batch row normalization
//!
//! Two profiles:
//! - general traffic: provenance tags plus millisecond timestamp conversion
//! - attack traffic: calendar timestamp derived from a 30-second window index
//!
//! Transformation never fails on a bad row; unparsable timestamps become null
//! and the row is still submitted.

use crate::record::{FieldValue, RowBatch};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::str::FromStr;

/// Columns every general-traffic file must provide
pub const GENERAL_TRAFFIC_COLUMNS: [&str; 16] = [
    "sip",
    "sport",
    "dip",
    "dport",
    "proto",
    "first_timestamp",
    "total_time",
    "sni",
    "vpn",
    "dd",
    "default_vpn",
    "dn",
    "dns",
    "ds",
    "application",
    "traffic_type",
];

pub const PRIMARY_TIMESTAMP: &str = "first_timestamp";
pub const SOURCE_FILE: &str = "source_file";
pub const INGESTED_AT: &str = "ingested_at";
pub const WINDOW_ID: &str = "window_id";
pub const WINDOW_TIMESTAMP: &str = "timestamp";

/// Width of one attack-traffic time window
pub const WINDOW_DURATION_SECS: i64 = 30;

/// Transformation rules applied to each batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    GeneralTraffic,
    AttackTraffic,
}

impl Profile {
    /// Columns to read from each file, `None` for all of them
    pub fn allowlist(&self) -> Option<Vec<String>> {
        match self {
            Profile::GeneralTraffic => Some(
                GENERAL_TRAFFIC_COLUMNS
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
            ),
            Profile::AttackTraffic => None,
        }
    }

    /// Normalize every row of `batch`; `now` is the ingestion wall-clock time
    pub fn transform(&self, mut batch: RowBatch, now: DateTime<Utc>) -> RowBatch {
        match self {
            Profile::GeneralTraffic => {
                let source_file = batch.source_name();
                let ingested_at = now.to_rfc3339_opts(SecondsFormat::Micros, true);
                for row in &mut batch.rows {
                    row.set(SOURCE_FILE, source_file.clone());
                    row.set(INGESTED_AT, ingested_at.clone());
                    if let Some(value) = row.get(PRIMARY_TIMESTAMP) {
                        let converted = millis_to_calendar(&value);
                        row.set(PRIMARY_TIMESTAMP, converted);
                    }
                }
            }
            Profile::AttackTraffic => {
                for row in &mut batch.rows {
                    let timestamp = row
                        .get(WINDOW_ID)
                        .map(|id| window_to_calendar(&id))
                        .unwrap_or(FieldValue::Null);
                    row.set(WINDOW_TIMESTAMP, timestamp);
                }
            }
        }
        batch
    }
}

impl FromStr for Profile {
    type Err = crate::error::Error;

    fn from_str(value: &str) -> crate::error::Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "general" | "traffic" | "general-traffic" => Ok(Profile::GeneralTraffic),
            "attack" | "ddos" | "attack-traffic" => Ok(Profile::AttackTraffic),
            other => Err(crate::error::Error::Config(format!(
                "unknown ingestion profile '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::GeneralTraffic => f.write_str("general-traffic"),
            Profile::AttackTraffic => f.write_str("attack-traffic"),
        }
    }
}

fn seconds_to_calendar(secs: i64) -> FieldValue {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| FieldValue::Text(dt.to_rfc3339_opts(SecondsFormat::Secs, true)))
        .unwrap_or(FieldValue::Null)
}

/// Milliseconds since the epoch to a seconds-precision UTC timestamp
pub fn millis_to_calendar(value: &FieldValue) -> FieldValue {
    let millis = match value {
        FieldValue::Int(ms) => Some(ms.div_euclid(1000)),
        other => other.as_f64().map(|ms| (ms / 1000.0).floor() as i64),
    };
    millis.map(seconds_to_calendar).unwrap_or(FieldValue::Null)
}

/// Window index to the calendar time at which the window starts
pub fn window_to_calendar(value: &FieldValue) -> FieldValue {
    value
        .as_i64()
        .and_then(|id| id.checked_mul(WINDOW_DURATION_SECS))
        .map(seconds_to_calendar)
        .unwrap_or(FieldValue::Null)
}
