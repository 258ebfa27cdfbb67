//! Configuration types for certificate generation.
//!
//! All deployment knobs live in [`CertificateConfig`], built via its
//! [`CertificateConfigBuilder`]. The config is constructed once at startup
//! and passed explicitly to [`crate::generate::CertificateService`]; nothing
//! in the library reads process-wide state on the request path.

use crate::clock::{Clock, SystemClock};
use crate::error::CertificateError;
use crate::pipeline::placement::{PlacementTable, TemplateProfile, TemplateVersion};
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Offset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Configuration for certificate generation.
///
/// Built via [`CertificateConfig::builder()`] or using
/// [`CertificateConfig::default()`].
///
/// # Example
/// ```rust
/// use certificate_overlay::{CertificateConfig, TemplateVersion, TimeZonePolicy};
///
/// let config = CertificateConfig::builder()
///     .template_version(TemplateVersion::Rev2)
///     .signature_suffix("WWID")
///     .time_zone(TimeZonePolicy::Utc)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct CertificateConfig {
    /// Path of the base certificate PDF. Default: `assets/TV-FRM-58719.pdf`.
    pub template_path: PathBuf,

    /// Path of the tick image drawn into the exception checkbox.
    /// Default: `assets/Tick_Image.png`.
    pub indicator_path: PathBuf,

    /// Template revision; selects the placement table and field rules. Default: Rev2.
    pub template_version: TemplateVersion,

    /// Custom placement table, replacing the revision's built-in one.
    pub placements: Option<PlacementTable>,

    /// Literal printed in parentheses after the signer's name. Default: `WWID`.
    pub signature_suffix: String,

    /// Override whether `username`/`email` need the `sign` flag.
    /// If None, the template revision decides.
    pub self_fields_require_sign: Option<bool>,

    /// Time zone used for dates and the signing timestamp. Default: UTC.
    pub time_zone: TimeZonePolicy,

    /// Source of "now" for the signing timestamp.
    pub clock: Arc<dyn Clock>,

    /// Batch number used when a request carries none.
    pub default_batch_number: Option<String>,

    /// Fixed fields merged over whatever the record service returns.
    pub override_fields: BTreeMap<String, String>,

    /// Base URL of the upstream record service. If None, only override
    /// fields are rendered.
    pub record_endpoint: Option<String>,

    /// Path appended to `record_endpoint`. Default: `batch/details`.
    pub record_path: String,

    /// Basic-auth username for the record service.
    pub service_username: Option<String>,

    /// Basic-auth password for the record service.
    pub service_password: Option<String>,

    /// Upstream request timeout in seconds. Default: 30.
    pub request_timeout_secs: u64,

    /// Explicit pdfium library file. If None, `./` then the system library.
    pub pdfium_library_path: Option<PathBuf>,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from("assets/TV-FRM-58719.pdf"),
            indicator_path: PathBuf::from("assets/Tick_Image.png"),
            template_version: TemplateVersion::default(),
            placements: None,
            signature_suffix: "WWID".to_string(),
            self_fields_require_sign: None,
            time_zone: TimeZonePolicy::default(),
            clock: Arc::new(SystemClock),
            default_batch_number: None,
            override_fields: BTreeMap::new(),
            record_endpoint: None,
            record_path: "batch/details".to_string(),
            service_username: None,
            service_password: None,
            request_timeout_secs: 30,
            pdfium_library_path: None,
        }
    }
}

impl fmt::Debug for CertificateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateConfig")
            .field("template_path", &self.template_path)
            .field("indicator_path", &self.indicator_path)
            .field("template_version", &self.template_version)
            .field("placements", &self.placements.as_ref().map(|t| t.len()))
            .field("signature_suffix", &self.signature_suffix)
            .field("self_fields_require_sign", &self.self_fields_require_sign)
            .field("time_zone", &self.time_zone)
            .field("clock", &"<dyn Clock>")
            .field("default_batch_number", &self.default_batch_number)
            .field("override_fields", &self.override_fields.keys().collect::<Vec<_>>())
            .field("record_endpoint", &self.record_endpoint)
            .field("record_path", &self.record_path)
            .field("service_username", &self.service_username)
            .field("service_password", &self.service_password.as_ref().map(|_| "***"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .finish()
    }
}

impl CertificateConfig {
    /// Create a new builder for `CertificateConfig`.
    pub fn builder() -> CertificateConfigBuilder {
        CertificateConfigBuilder {
            config: Self::default(),
        }
    }

    /// Resolve the rendering profile: the revision's defaults with this
    /// deployment's overrides applied.
    pub fn profile(&self) -> TemplateProfile {
        let mut profile = self.template_version.profile();
        if let Some(ref table) = self.placements {
            profile.placements = table.clone();
        }
        if let Some(gated) = self.self_fields_require_sign {
            profile.self_fields_require_sign = gated;
        }
        profile
    }
}

/// Builder for [`CertificateConfig`].
#[derive(Debug)]
pub struct CertificateConfigBuilder {
    config: CertificateConfig,
}

impl CertificateConfigBuilder {
    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.template_path = path.into();
        self
    }

    pub fn indicator_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.indicator_path = path.into();
        self
    }

    pub fn template_version(mut self, version: TemplateVersion) -> Self {
        self.config.template_version = version;
        self
    }

    pub fn placements(mut self, table: PlacementTable) -> Self {
        self.config.placements = Some(table);
        self
    }

    pub fn signature_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.signature_suffix = suffix.into();
        self
    }

    pub fn self_fields_require_sign(mut self, v: bool) -> Self {
        self.config.self_fields_require_sign = Some(v);
        self
    }

    pub fn time_zone(mut self, policy: TimeZonePolicy) -> Self {
        self.config.time_zone = policy;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.config.clock = clock;
        self
    }

    pub fn default_batch_number(mut self, batch: impl Into<String>) -> Self {
        self.config.default_batch_number = Some(batch.into());
        self
    }

    pub fn override_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.override_fields.insert(key.into(), value.into());
        self
    }

    pub fn override_fields(mut self, fields: BTreeMap<String, String>) -> Self {
        self.config.override_fields.extend(fields);
        self
    }

    pub fn record_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.record_endpoint = Some(url.into());
        self
    }

    pub fn record_path(mut self, path: impl Into<String>) -> Self {
        self.config.record_path = path.into();
        self
    }

    pub fn service_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.config.service_username = Some(username.into());
        self.config.service_password = Some(password.into());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<CertificateConfig, CertificateError> {
        let c = &self.config;

        let has_default_batch = c
            .default_batch_number
            .as_deref()
            .is_some_and(|b| !b.trim().is_empty());
        if c.record_endpoint.is_some() && !has_default_batch {
            return Err(CertificateError::InvalidConfig(
                "a record endpoint needs a default batch number for requests that omit one"
                    .into(),
            ));
        }

        if let Some(ref endpoint) = c.record_endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(CertificateError::InvalidConfig(format!(
                    "record endpoint must be an HTTP/HTTPS URL, got '{endpoint}'"
                )));
            }
        }

        match c.time_zone {
            TimeZonePolicy::Fixed { offset_seconds, .. } => {
                if FixedOffset::east_opt(offset_seconds).is_none() {
                    return Err(CertificateError::InvalidConfig(format!(
                        "time zone offset {offset_seconds}s is out of range"
                    )));
                }
            }
            TimeZonePolicy::Named(ref name) => {
                if name.parse::<Tz>().is_err() {
                    return Err(CertificateError::InvalidConfig(format!(
                        "unknown time zone '{name}'"
                    )));
                }
            }
            TimeZonePolicy::Utc | TimeZonePolicy::Local => {}
        }

        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which wall clock dates and the signing timestamp are shown in.
///
/// Date fields arrive as instants (`2024-10-14T06:13:05.105Z`); the printed
/// calendar day depends on the zone they are viewed from. `Utc` keeps output
/// identical across hosts, `Local` matches whatever zone the process runs in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeZonePolicy {
    /// Coordinated Universal Time, abbreviated `UTC`. (default)
    #[default]
    Utc,
    /// The process's local zone, looked up in the tz database so the
    /// abbreviation is a name (`EST`, `IST`) rather than an offset.
    Local,
    /// An IANA zone by name, e.g. `Asia/Kolkata`.
    Named(String),
    /// A fixed offset with a display abbreviation, e.g. `+05:30` / `IST`.
    Fixed {
        offset_seconds: i32,
        abbreviation: String,
    },
}

impl TimeZonePolicy {
    /// Wall-clock time and zone abbreviation for `instant` under this policy.
    ///
    /// The abbreviation keeps uppercase ASCII letters only. When the zone has
    /// no lettered name (some tz entries are bare offsets like `+04`) or the
    /// host zone cannot be determined, the offset is shown instead, as
    /// `UTC+05:30`.
    pub fn localize(&self, instant: DateTime<Utc>) -> (NaiveDateTime, String) {
        match self {
            TimeZonePolicy::Utc => (instant.naive_utc(), "UTC".to_string()),
            TimeZonePolicy::Local => {
                localize_host(instant, iana_time_zone::get_timezone().ok().as_deref())
            }
            TimeZonePolicy::Named(name) => match name.parse::<Tz>() {
                Ok(tz) => localize_in(instant, tz),
                Err(_) => localize_host(instant, None),
            },
            TimeZonePolicy::Fixed {
                offset_seconds,
                abbreviation,
            } => {
                let offset = FixedOffset::east_opt(*offset_seconds).unwrap_or_else(|| Utc.fix());
                let shifted = instant.with_timezone(&offset);
                let abbr = uppercase_letters(abbreviation);
                let abbr = if abbr.is_empty() {
                    format!("UTC{}", shifted.format("%:z"))
                } else {
                    abbr
                };
                (shifted.naive_local(), abbr)
            }
        }
    }
}

/// Local time for a host zone name; chrono's offset-only `Local` when the
/// name is missing or not in the tz database.
fn localize_host(instant: DateTime<Utc>, zone: Option<&str>) -> (NaiveDateTime, String) {
    if let Some(tz) = zone.and_then(|name| name.parse::<Tz>().ok()) {
        return localize_in(instant, tz);
    }
    let local = instant.with_timezone(&Local);
    (local.naive_local(), format!("UTC{}", local.format("%:z")))
}

fn localize_in(instant: DateTime<Utc>, tz: Tz) -> (NaiveDateTime, String) {
    let zoned = instant.with_timezone(&tz);
    let abbr = uppercase_letters(&zoned.format("%Z").to_string());
    let abbr = if abbr.is_empty() {
        format!("UTC{}", zoned.format("%:z"))
    } else {
        abbr
    };
    (zoned.naive_local(), abbr)
}

fn uppercase_letters(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_uppercase()).collect()
}

impl FromStr for TimeZonePolicy {
    type Err = CertificateError;

    /// Accepts `utc`, `local`, an IANA name (`Asia/Kolkata`), or
    /// `±HH:MM[=ABBR]` (e.g. `+05:30=IST`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "utc" | "z" => return Ok(TimeZonePolicy::Utc),
            "local" => return Ok(TimeZonePolicy::Local),
            _ => {}
        }
        if !s.starts_with(['+', '-']) {
            return s
                .parse::<Tz>()
                .map(|tz| TimeZonePolicy::Named(tz.name().to_string()))
                .map_err(|_| {
                    CertificateError::InvalidConfig(format!(
                        "time zone '{s}' is not utc, local, an IANA name, or an offset like +05:30=IST"
                    ))
                });
        }

        let (offset, abbreviation) = match s.split_once('=') {
            Some((o, a)) => (o.trim(), a.trim().to_string()),
            None => (s, String::new()),
        };
        let offset_seconds = parse_offset(offset).ok_or_else(|| {
            CertificateError::InvalidConfig(format!(
                "time zone '{s}' is not utc, local, or an offset like +05:30=IST"
            ))
        })?;
        if FixedOffset::east_opt(offset_seconds).is_none() {
            return Err(CertificateError::InvalidConfig(format!(
                "time zone offset '{offset}' is out of range"
            )));
        }
        Ok(TimeZonePolicy::Fixed {
            offset_seconds,
            abbreviation,
        })
    }
}

/// Parse `+05:30`, `-0500`, or `+9` into seconds east of UTC.
///
/// Hours must be 0..=23 and minutes 0..=59, digits only.
fn parse_offset(s: &str) -> Option<i32> {
    let (sign, rest) = if let Some(rest) = s.strip_prefix('+') {
        (1, rest)
    } else if let Some(rest) = s.strip_prefix('-') {
        (-1, rest)
    } else {
        return None;
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h, m),
        None if rest.len() == 4 => (rest.get(..2)?, rest.get(2..)?),
        None => (rest, "0"),
    };
    let digits = |part: &str| -> Option<i32> {
        if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        part.parse().ok()
    };
    let hours = digits(hours)?;
    let minutes = digits(minutes)?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn defaults() {
        let c = CertificateConfig::default();
        assert_eq!(c.template_version, TemplateVersion::Rev2);
        assert_eq!(c.signature_suffix, "WWID");
        assert_eq!(c.time_zone, TimeZonePolicy::Utc);
        assert_eq!(c.request_timeout_secs, 30);
        assert!(c.record_endpoint.is_none());
    }

    #[test]
    fn endpoint_without_default_batch_is_config_error() {
        let err = CertificateConfig::builder()
            .record_endpoint("https://cart.internal")
            .build()
            .unwrap_err();
        assert!(matches!(err, CertificateError::InvalidConfig(_)));

        let ok = CertificateConfig::builder()
            .record_endpoint("https://cart.internal")
            .default_batch_number("B114AF")
            .build();
        assert!(ok.is_ok());
    }

    #[test]
    fn endpoint_must_be_http() {
        let err = CertificateConfig::builder()
            .record_endpoint("ftp://cart.internal")
            .default_batch_number("B114AF")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("ftp://"));
    }

    #[test]
    fn out_of_range_offset_rejected() {
        let err = CertificateConfig::builder()
            .time_zone(TimeZonePolicy::Fixed {
                offset_seconds: 90_000,
                abbreviation: "XX".into(),
            })
            .build()
            .unwrap_err();
        assert!(matches!(err, CertificateError::InvalidConfig(_)));
    }

    #[test]
    fn unknown_named_zone_rejected() {
        let err = CertificateConfig::builder()
            .time_zone(TimeZonePolicy::Named("Atlantis/Capital".into()))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Atlantis/Capital"));
    }

    #[test]
    fn profile_applies_overrides() {
        let c = CertificateConfig::builder()
            .template_version(TemplateVersion::Rev1)
            .self_fields_require_sign(true)
            .build()
            .unwrap();
        let profile = c.profile();
        assert_eq!(profile.version, TemplateVersion::Rev1);
        assert!(profile.self_fields_require_sign);
    }

    #[test]
    fn debug_hides_password() {
        let c = CertificateConfig::builder()
            .service_credentials("svc", "hunter2")
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("***"));
    }

    #[test]
    fn parse_time_zone_policies() {
        assert_eq!("UTC".parse::<TimeZonePolicy>().unwrap(), TimeZonePolicy::Utc);
        assert_eq!("local".parse::<TimeZonePolicy>().unwrap(), TimeZonePolicy::Local);
        assert_eq!(
            "+05:30=IST".parse::<TimeZonePolicy>().unwrap(),
            TimeZonePolicy::Fixed {
                offset_seconds: 19_800,
                abbreviation: "IST".into()
            }
        );
        assert_eq!(
            "-0500=EST".parse::<TimeZonePolicy>().unwrap(),
            TimeZonePolicy::Fixed {
                offset_seconds: -18_000,
                abbreviation: "EST".into()
            }
        );
        assert!("mars".parse::<TimeZonePolicy>().is_err());
        assert!("+05:75".parse::<TimeZonePolicy>().is_err());
    }

    #[test]
    fn fixed_policy_shifts_wall_clock() {
        let instant = Utc.with_ymd_and_hms(2024, 10, 14, 20, 0, 0).unwrap();
        let policy = TimeZonePolicy::Fixed {
            offset_seconds: 19_800,
            abbreviation: "ist".into(),
        };
        let (wall, abbr) = policy.localize(instant);
        assert_eq!(wall.hour(), 1);
        assert_eq!(wall.minute(), 30);
        assert_eq!(abbr, "UTC+05:30", "lowercase abbreviation falls back to offset");
    }

    #[test]
    fn malformed_offsets_are_errors_not_panics() {
        for input in ["+1\u{e9}1", "+99999999", "+24:00", "-123", "+", "+ab:cd", "+1:5:0"] {
            let err = input.parse::<TimeZonePolicy>().unwrap_err();
            assert!(matches!(err, CertificateError::InvalidConfig(_)), "{input:?}");
        }
        assert_eq!(
            "+9".parse::<TimeZonePolicy>().unwrap(),
            TimeZonePolicy::Fixed {
                offset_seconds: 32_400,
                abbreviation: String::new()
            }
        );
    }

    #[test]
    fn parse_iana_zone_names() {
        assert_eq!(
            "Asia/Kolkata".parse::<TimeZonePolicy>().unwrap(),
            TimeZonePolicy::Named("Asia/Kolkata".into())
        );
        assert!("Mars/Olympus_Mons".parse::<TimeZonePolicy>().is_err());
    }

    #[test]
    fn host_zone_abbreviation_is_letters_only() {
        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap();

        let (wall, abbr) = localize_host(winter, Some("America/New_York"));
        assert_eq!((wall.hour(), abbr.as_str()), (7, "EST"));
        let (_, abbr) = localize_host(summer, Some("America/New_York"));
        assert_eq!(abbr, "EDT");

        let (wall, abbr) = localize_host(winter, Some("Asia/Kolkata"));
        assert_eq!((wall.hour(), wall.minute(), abbr.as_str()), (17, 30, "IST"));
    }

    #[test]
    fn unknown_host_zone_falls_back_to_offset() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let (_, abbr) = localize_host(instant, Some("Not/AZone"));
        assert!(abbr.starts_with("UTC"), "got {abbr}");
        let (_, abbr) = localize_host(instant, None);
        assert!(abbr.starts_with("UTC"), "got {abbr}");
    }

    #[test]
    fn local_policy_is_letters_or_offset() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let (_, abbr) = TimeZonePolicy::Local.localize(instant);
        let lettered = !abbr.is_empty() && abbr.chars().all(|c| c.is_ascii_uppercase());
        assert!(lettered || abbr.starts_with("UTC"), "got {abbr}");
    }

    #[test]
    fn named_policy_without_letters_shows_offset() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let (wall, abbr) = TimeZonePolicy::Named("Asia/Dubai".into()).localize(instant);
        assert_eq!(wall.hour(), 16);
        assert_eq!(abbr, "UTC+04:00");
    }

    #[test]
    fn utc_policy_is_identity() {
        let instant = Utc.with_ymd_and_hms(2024, 10, 14, 6, 13, 5).unwrap();
        let (wall, abbr) = TimeZonePolicy::Utc.localize(instant);
        assert_eq!(wall, instant.naive_utc());
        assert_eq!(abbr, "UTC");
    }
}
