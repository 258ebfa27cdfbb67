//! Request parsing: body flags, caller identity, and the per-request
//! [`RenderContext`] handed to the overlay engine.
//!
//! Clients are inconsistent about flag types: some send `"exception":
//! true`, others `"exception": "true"`. Both are normalised here, at the
//! boundary, into a tri-state `Option<bool>`; the overlay engine never sees
//! a string.

use crate::error::CertificateError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Body of a certificate request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRequest {
    /// `true` ticks the "yes" box, `false` the "no" box, absent/malformed neither.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub exception: Option<bool>,

    /// Whether the signature block is printed. Absent or malformed means `false`.
    #[serde(default, deserialize_with = "deserialize_sign")]
    pub sign: bool,

    /// Batch whose record is printed. Falls back to the configured default.
    #[serde(default)]
    pub batch_number: Option<String>,
}

impl CertificateRequest {
    /// Parse a JSON request body. An empty body is an all-defaults request.
    pub fn from_json(body: &[u8]) -> Result<Self, CertificateError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body).map_err(|e| CertificateError::InvalidRequest(e.to_string()))
    }

    /// The request's batch number, if non-blank.
    pub fn batch_number(&self) -> Option<&str> {
        self.batch_number
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }
}

/// Interpret a JSON value as a boolean flag.
///
/// Real booleans and the strings `"true"` / `"false"` (any case) are
/// accepted; everything else is "not given".
pub fn parse_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(parse_flag(&value))
}

fn deserialize_sign<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_flag(deserializer).map(|flag| flag.unwrap_or(false))
}

// ── Identity ─────────────────────────────────────────────────────────────

/// Who is asking, as established by the upstream auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub username: String,
    /// Display name, possibly with a bracketed directory tag.
    pub name: String,
    pub email: String,
}

impl CallerIdentity {
    /// Identity used when the request carries none.
    pub fn system() -> Self {
        Self {
            username: "system".to_string(),
            name: "system".to_string(),
            email: "example@email.com".to_string(),
        }
    }

    /// Map already-validated identity-provider claims onto a caller.
    ///
    /// `preferred_username` doubles as the email; the username is its local
    /// part. Missing claims become empty strings and are then not printed.
    pub fn from_claims(claims: &Value) -> Self {
        let claim = |name: &str| {
            claims
                .get(name)
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default()
                .to_string()
        };
        let preferred = claim("preferred_username");
        let username = preferred
            .split('@')
            .next()
            .unwrap_or_default()
            .to_string();

        Self {
            username,
            name: claim("name"),
            email: preferred,
        }
    }
}

/// Everything the overlay engine needs to know about the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub exception: Option<bool>,
    pub sign: bool,
}

impl RenderContext {
    pub fn new(caller: &CallerIdentity, request: &CertificateRequest) -> Self {
        Self {
            username: non_blank(&caller.username),
            full_name: non_blank(&caller.name),
            email: non_blank(&caller.email),
            exception: request.exception,
            sign: request.sign,
        }
    }
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn boolean_flags() {
        let req = CertificateRequest::from_json(br#"{"exception": true, "sign": true}"#).unwrap();
        assert_eq!(req.exception, Some(true));
        assert!(req.sign);
    }

    #[test]
    fn string_flags_are_normalised() {
        let req =
            CertificateRequest::from_json(br#"{"exception": "false", "sign": "TRUE"}"#).unwrap();
        assert_eq!(req.exception, Some(false));
        assert!(req.sign);
    }

    #[test]
    fn malformed_flags_are_absent() {
        let req =
            CertificateRequest::from_json(br#"{"exception": "maybe", "sign": 1}"#).unwrap();
        assert_eq!(req.exception, None);
        assert!(!req.sign);

        let req = CertificateRequest::from_json(br#"{"exception": null}"#).unwrap();
        assert_eq!(req.exception, None);
    }

    #[test]
    fn empty_body_is_default() {
        assert_eq!(
            CertificateRequest::from_json(b"  ").unwrap(),
            CertificateRequest::default()
        );
    }

    #[test]
    fn invalid_json_is_request_error() {
        let err = CertificateRequest::from_json(b"{nope").unwrap_err();
        assert!(matches!(err, CertificateError::InvalidRequest(_)));
    }

    #[test]
    fn batch_number_blank_is_none() {
        let req = CertificateRequest::from_json(br#"{"batchNumber": "  "}"#).unwrap();
        assert_eq!(req.batch_number(), None);
        let req = CertificateRequest::from_json(br#"{"batchNumber": " B114AF "}"#).unwrap();
        assert_eq!(req.batch_number(), Some("B114AF"));
    }

    #[test]
    fn identity_from_claims() {
        let caller = CallerIdentity::from_claims(&json!({
            "name": "  Jane Doe [CONTRACTOR] ",
            "preferred_username": "jdoe@example.com",
            "oid": "123",
        }));
        assert_eq!(caller.username, "jdoe");
        assert_eq!(caller.email, "jdoe@example.com");
        assert_eq!(caller.name, "Jane Doe [CONTRACTOR]");
    }

    #[test]
    fn identity_from_empty_claims() {
        let caller = CallerIdentity::from_claims(&json!({}));
        assert_eq!(caller.username, "");
        let ctx = RenderContext::new(&caller, &CertificateRequest::default());
        assert_eq!(ctx.username, None);
        assert_eq!(ctx.email, None);
    }

    #[test]
    fn context_carries_flags() {
        let req = CertificateRequest {
            exception: Some(false),
            sign: true,
            batch_number: None,
        };
        let ctx = RenderContext::new(&CallerIdentity::system(), &req);
        assert_eq!(ctx.username.as_deref(), Some("system"));
        assert_eq!(ctx.exception, Some(false));
        assert!(ctx.sign);
    }
}
