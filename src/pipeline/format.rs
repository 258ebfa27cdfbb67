//! Field formatting: raw record values → the exact text drawn on the page.
//!
//! Every function here is pure. The one time-dependent field, `signedAt`,
//! takes its instant as an argument; the caller obtains it from the
//! configured [`crate::clock::Clock`].
//!
//! "Nothing to print" is `Ok(None)`, never an empty string: an empty draw
//! call would still leave an invisible text object in the PDF.

use crate::config::TimeZonePolicy;
use crate::error::FormatError;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Formatter rules for one template profile.
#[derive(Debug, Clone)]
pub struct FieldFormatter {
    time_zone: TimeZonePolicy,
    signature_suffix: String,
    date_fields: Vec<String>,
}

impl FieldFormatter {
    pub fn new(
        time_zone: TimeZonePolicy,
        signature_suffix: impl Into<String>,
        date_fields: Vec<String>,
    ) -> Self {
        Self {
            time_zone,
            signature_suffix: signature_suffix.into(),
            date_fields,
        }
    }

    pub fn is_date_field(&self, key: &str) -> bool {
        self.date_fields.iter().any(|k| k == key)
    }

    /// Format a plain record field for `key`.
    ///
    /// Returns `Ok(None)` when the value is absent or blank.
    pub fn format_field(&self, key: &str, raw: Option<&str>) -> Result<Option<String>, FormatError> {
        let Some(raw) = raw.filter(|v| !v.trim().is_empty()) else {
            return Ok(None);
        };
        if self.is_date_field(key) {
            return self.format_date(key, raw).map(Some);
        }
        Ok(Some(raw.to_string()))
    }

    /// `DD/MM/YYYY` for a date-like value.
    ///
    /// Accepts RFC 3339 instants (shifted into the configured zone before the
    /// calendar day is taken), zone-less `YYYY-MM-DDTHH:MM:SS[.fff]`, and bare
    /// `YYYY-MM-DD` (both used as-is).
    pub fn format_date(&self, key: &str, raw: &str) -> Result<String, FormatError> {
        let date = self.parse_date(raw).ok_or_else(|| FormatError {
            key: key.to_string(),
            raw: raw.to_string(),
            reason: "expected an RFC 3339 timestamp or YYYY-MM-DD date".to_string(),
        })?;
        Ok(date.format("%d/%m/%Y").to_string())
    }

    fn parse_date(&self, raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
            let (wall, _) = self.time_zone.localize(instant.with_timezone(&Utc));
            return Some(wall.date());
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(naive.date());
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    }

    /// `DD Mon YYYY HH:MM:SS (TZ)` for the signing instant.
    pub fn format_signed_at(&self, now: DateTime<Utc>) -> String {
        let (wall, abbr) = self.time_zone.localize(now);
        let month = MONTHS[wall.month0() as usize];
        format!(
            "{} {} {} ({})",
            wall.format("%d"),
            month,
            wall.format("%Y %H:%M:%S"),
            abbr
        )
    }

    /// `Digitally signed by {name} ({suffix})`.
    ///
    /// Identity providers append directory tags to display names
    /// (`"Jane Doe [CONTRACTOR]"`); everything from the first `" ["` on is
    /// dropped.
    pub fn format_signed_by(&self, full_name: &str) -> Option<String> {
        let name = display_name(full_name);
        if name.is_empty() {
            return None;
        }
        Some(format!(
            "Digitally signed by {} ({})",
            name, self.signature_suffix
        ))
    }
}

/// Strip a bracketed directory suffix from a display name.
pub fn display_name(full_name: &str) -> &str {
    full_name
        .split(" [")
        .next()
        .unwrap_or(full_name)
        .trim()
}
