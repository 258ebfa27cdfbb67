//! Placement tables: where each field lands on the certificate page.
//!
//! Coordinates are anchor points in **top-left-origin** document space, the
//! way they were measured off the printed form. The overlay engine flips
//! them into PDF's bottom-left-origin space with `page_height - y`.
//!
//! Every certificate template revision has its own table. The revisions are
//! close cousins (a couple of rows nudged by a point or two), so rather than
//! duplicating the overlay logic per revision, a [`TemplateVersion`] selects
//! a table plus the handful of per-revision rules in [`TemplateProfile`].

use crate::error::CertificateError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// One anchor point on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Record field name, or one of the computed keys (see [`FieldKey`]).
    pub key: String,
    /// Horizontal offset from the left edge, in points.
    pub x: f32,
    /// Vertical offset from the **top** edge, in points.
    pub y: f32,
}

impl Placement {
    pub fn new(key: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            key: key.into(),
            x,
            y,
        }
    }
}

/// What a placement key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKey<'a> {
    /// Caller's username, drawn large under the signature box.
    Username,
    /// Caller's email address.
    Email,
    /// "Digitally signed by …" line.
    SignedBy,
    /// Signing timestamp.
    SignedAt,
    /// Exception checkbox (yes/no tick).
    Exception,
    /// A plain record field.
    Record(&'a str),
}

impl<'a> FieldKey<'a> {
    pub fn classify(key: &'a str) -> Self {
        match key {
            "username" => FieldKey::Username,
            "email" => FieldKey::Email,
            "signedBy" => FieldKey::SignedBy,
            "signedAt" => FieldKey::SignedAt,
            "exception" => FieldKey::Exception,
            other => FieldKey::Record(other),
        }
    }
}

/// An ordered, key-unique list of placements.
///
/// Construction is the only place uniqueness is checked; the table is never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacementTable {
    entries: Vec<Placement>,
}

impl PlacementTable {
    /// Build a table, rejecting duplicate keys.
    pub fn new(entries: Vec<Placement>) -> Result<Self, CertificateError> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.key.as_str()) {
                return Err(CertificateError::InvalidConfig(format!(
                    "placement key '{}' appears more than once",
                    entry.key
                )));
            }
        }
        Ok(Self { entries })
    }

    /// Parse a table from a JSON array of `{ "key", "x", "y" }` objects.
    pub fn from_json(json: &str) -> Result<Self, CertificateError> {
        let entries: Vec<Placement> = serde_json::from_str(json).map_err(|e| {
            CertificateError::InvalidConfig(format!("placement table is not valid JSON: {e}"))
        })?;
        Self::new(entries)
    }

    pub fn entries(&self) -> &[Placement] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&Placement> {
        self.entries.iter().find(|p| p.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ── Template revisions ───────────────────────────────────────────────────

/// Revision of the TV-FRM-58719 batch certificate template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateVersion {
    /// First revision. Username and email print whenever present.
    Rev1,
    /// Current revision. Username and email print only on signed requests. (default)
    #[default]
    Rev2,
}

impl fmt::Display for TemplateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateVersion::Rev1 => f.write_str("rev1"),
            TemplateVersion::Rev2 => f.write_str("rev2"),
        }
    }
}

impl FromStr for TemplateVersion {
    type Err = CertificateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rev1" | "1" => Ok(TemplateVersion::Rev1),
            "rev2" | "2" => Ok(TemplateVersion::Rev2),
            other => Err(CertificateError::InvalidConfig(format!(
                "unknown template version '{other}' (expected rev1 or rev2)"
            ))),
        }
    }
}

/// Everything that varies between template revisions.
#[derive(Debug, Clone)]
pub struct TemplateProfile {
    pub version: TemplateVersion,
    pub placements: PlacementTable,
    /// Font size for plain record fields.
    pub body_font_size: f32,
    /// Record fields rendered as `DD/MM/YYYY`.
    pub date_fields: Vec<String>,
    /// Whether `username` and `email` need the `sign` flag.
    pub self_fields_require_sign: bool,
}

/// Rows shared by every revision, in draw order, minus the two that moved.
const SHARED_HEAD: &[(&str, f32, f32)] = &[
    ("patientName", 210.0, 187.0),
    ("patientDOB", 210.0, 205.0),
    ("cquenceDIN", 210.0, 222.0),
    ("cquenceOrderId", 210.0, 239.0),
];

const SHARED_BATCH_ROW: &[(&str, f32, f32)] = &[
    ("batchNumber", 100.0, 315.0),
    ("coicBagId", 215.0, 315.0),
    ("totalVolume", 350.0, 315.0),
    ("productDose", 450.0, 315.0),
    ("expirationDate", 210.0, 335.0),
];

const SHARED_TAIL: &[(&str, f32, f32)] = &[
    ("pccNumber", 210.0, 382.0),
    ("nameAndAddress", 210.0, 420.0),
    ("marketAuthorizationNumber", 210.0, 435.0),
    ("country", 210.0, 452.0),
    ("exception", 419.0, 647.0),
    ("username", 260.0, 680.0),
    ("email", 350.0, 685.0),
    ("signedAt", 350.0, 695.0),
    ("signedBy", 350.0, 675.0),
];

const DATE_FIELDS: &[&str] = &["expirationDate", "patientDOB"];

impl TemplateVersion {
    /// Built-in placement rows for this revision.
    pub fn placements(self) -> Vec<Placement> {
        let (weight_y, ndc_y) = match self {
            TemplateVersion::Rev1 => (255.0, 365.0),
            TemplateVersion::Rev2 => (257.0, 366.0),
        };

        let rows = SHARED_HEAD
            .iter()
            .copied()
            .chain(std::iter::once(("patientWeight", 210.0, weight_y)))
            .chain(SHARED_BATCH_ROW.iter().copied())
            .chain(std::iter::once(("productNDC", 210.0, ndc_y)))
            .chain(SHARED_TAIL.iter().copied());

        rows.map(|(key, x, y)| Placement::new(key, x, y)).collect()
    }

    /// Full rendering profile for this revision.
    pub fn profile(self) -> TemplateProfile {
        let placements = PlacementTable {
            entries: self.placements(),
        };
        TemplateProfile {
            version: self,
            placements,
            body_font_size: 8.0,
            date_fields: DATE_FIELDS.iter().map(|s| s.to_string()).collect(),
            self_fields_require_sign: matches!(self, TemplateVersion::Rev2),
        }
    }
}
