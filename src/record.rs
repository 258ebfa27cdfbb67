//! Certificate records and where they come from.
//!
//! A [`CertificateRecord`] is a flat `field → value` map. It is filled from
//! the upstream record service (keyed by batch number) and then overlaid with
//! the deployment's fixed fields. Once handed to the overlay engine it is
//! read-only.
//!
//! The upstream fetch is tolerant by contract: if the service is down or
//! answers with garbage, the render still happens using the override fields,
//! so [`RecordSource::fetch`] reports a [`RecordError`] rather than a fatal
//! [`crate::error::CertificateError`].

use crate::config::CertificateConfig;
use crate::error::{CertificateError, RecordError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A record whose fields are printed onto the certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateRecord {
    fields: BTreeMap<String, Option<String>>,
}

impl CertificateRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Option<String>) {
        self.fields.insert(key.into(), value);
    }

    /// Value for `key`, or None when the field is missing, null, or empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(|v| v.as_deref())
            .filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Lay deployment-fixed fields over this record. Overrides win.
    pub fn merge_overrides(&mut self, overrides: &BTreeMap<String, String>) {
        for (key, value) in overrides {
            self.fields.insert(key.clone(), Some(value.clone()));
        }
    }

    /// Build a record from a JSON object, or from `{ "data": { … } }`.
    ///
    /// Strings are kept, numbers and `true` are stringified. Falsy scalars
    /// (`null`, `0`, `false`) stay absent so nothing is printed for them.
    /// Arrays and nested objects have no printable form and are skipped.
    pub fn from_json_value(value: &Value) -> Result<Self, String> {
        let object = match value {
            Value::Object(map) => match map.get("data") {
                Some(Value::Object(inner)) => inner,
                _ => map,
            },
            other => return Err(format!("expected a JSON object, got {}", json_kind(other))),
        };

        let mut record = Self::new();
        for (key, value) in object {
            let text = match value {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) if n.as_f64() == Some(0.0) => None,
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(true) => Some("true".to_string()),
                Value::Bool(false) | Value::Null => None,
                Value::Array(_) | Value::Object(_) => {
                    warn!("Skipping non-scalar record field '{}'", key);
                    continue;
                }
            };
            record.insert(key.clone(), text);
        }
        Ok(record)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CertificateRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(k, Some(v.into()));
        }
        record
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Sources ──────────────────────────────────────────────────────────────

/// Fetches the record for a batch number.
pub trait RecordSource: Send + Sync {
    fn fetch(
        &self,
        batch_number: &str,
    ) -> impl Future<Output = Result<CertificateRecord, RecordError>> + Send;
}

/// Always returns the same record. Useful for fixtures and offline demos.
#[derive(Debug, Clone, Default)]
pub struct StaticRecordSource(pub CertificateRecord);

impl RecordSource for StaticRecordSource {
    async fn fetch(&self, _batch_number: &str) -> Result<CertificateRecord, RecordError> {
        Ok(self.0.clone())
    }
}

/// The upstream record service: `POST {endpoint}/{path}` with
/// `{ "batchNumber": … }` and optional basic auth.
#[derive(Debug, Clone)]
pub struct HttpRecordSource {
    client: reqwest::Client,
    url: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpRecordSource {
    /// Build a source from config. Returns `Ok(None)` when no endpoint is set.
    pub fn from_config(config: &CertificateConfig) -> Result<Option<Self>, CertificateError> {
        let Some(ref endpoint) = config.record_endpoint else {
            return Ok(None);
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CertificateError::InvalidConfig(format!("HTTP client: {e}")))?;

        Ok(Some(Self {
            client,
            url: join_url(endpoint, &config.record_path),
            username: config.service_username.clone(),
            password: config.service_password.clone(),
        }))
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RecordSource for HttpRecordSource {
    async fn fetch(&self, batch_number: &str) -> Result<CertificateRecord, RecordError> {
        info!("Fetching record for batch {} from {}", batch_number, self.url);

        let mut request = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "batchNumber": batch_number }));
        if let Some(ref user) = self.username {
            request = request.basic_auth(user, self.password.as_deref());
        }

        let response = request.send().await.map_err(|e| RecordError::Request {
            batch: batch_number.to_string(),
            detail: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(RecordError::Status {
                batch: batch_number.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body: Value = response.json().await.map_err(|e| RecordError::Decode {
            batch: batch_number.to_string(),
            detail: e.to_string(),
        })?;

        let record = CertificateRecord::from_json_value(&body).map_err(|detail| {
            RecordError::Decode {
                batch: batch_number.to_string(),
                detail,
            }
        })?;

        if record.is_empty() {
            warn!("Record service returned no fields for batch {}", batch_number);
            return Err(RecordError::Empty {
                batch: batch_number.to_string(),
            });
        }

        debug!("Record for batch {} has {} fields", batch_number, record.len());
        Ok(record)
    }
}

fn join_url(endpoint: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        return endpoint.trim_end_matches('/').to_string();
    }
    format!("{}/{}", endpoint.trim_end_matches('/'), path)
}
