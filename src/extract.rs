//! Line-level extraction of measurement records from the tool's progress output.
//!
//! The tool prints one line per benchmarked file:
//!
//! ```text
//! Benchmarked <file>.jfr with <configuration> in <seconds>s, size: <bytes> bytes
//! ```
//!
//! Everything else (progress, logging, stack traces) is not a record. Numeric fields that match
//! the grammar but fail to parse (e.g. overflow) make the whole line a non-record.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::schema::MeasurementRecord;

static BENCHMARKED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"Benchmarked ([A-Za-z0-9_.\-]+\.jfr) with [\w\-]+ in (\d+(?:\.\d+)?(?:[eE][+\-]?\d+)?)s, size: (\d+) bytes",
    )
    .expect("static regex")
});

/// Signature shared by every acquisition strategy: one raw line in, at most one record out.
pub type LineExtractor = fn(&str) -> Option<MeasurementRecord>;

pub fn extract(line: &str) -> Option<MeasurementRecord> {
    let caps = BENCHMARKED.captures(line.trim_end_matches(['\r', '\n']))?;
    let duration_seconds: f64 = caps[2].parse().ok()?;
    if !duration_seconds.is_finite() {
        return None;
    }
    let size_bytes: u64 = caps[3].parse().ok()?;

    Some(MeasurementRecord {
        file: caps[1].to_string(),
        duration_seconds,
        size_bytes,
    })
}
