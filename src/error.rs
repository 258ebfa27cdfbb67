//! Error types for the certificate-overlay library.
//!
//! Three error types reflect three distinct failure modes:
//!
//! * [`CertificateError`] — **Fatal**: the certificate cannot be produced
//!   (template missing or corrupt, a field value that cannot be formatted,
//!   pdfium failed to save). Rendering is all-or-nothing, so any of these
//!   aborts the request and surfaces as a single `500` response.
//!
//! * [`FormatError`] — a record field's raw value could not be turned into
//!   its display form (e.g. an unparsable date). Carried inside
//!   [`CertificateError::Format`] once it leaves the formatter.
//!
//! * [`RecordError`] — **Non-fatal**: the upstream record service failed or
//!   returned nothing usable. The render still goes ahead using the
//!   deployment's override fields.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the certificate-overlay library.
#[derive(Debug, Error)]
pub enum CertificateError {
    // ── Asset errors ──────────────────────────────────────────────────────
    /// The template document is missing, unreadable, or not a PDF.
    #[error("Failed to load certificate template{}: {detail}", display_path(.path))]
    TemplateLoad {
        path: Option<PathBuf>,
        detail: String,
    },

    /// The indicator image is missing or cannot be decoded.
    #[error("Failed to load indicator image{}: {detail}", display_path(.path))]
    AssetLoad {
        path: Option<PathBuf>,
        detail: String,
    },

    // ── Render errors ─────────────────────────────────────────────────────
    /// A record field could not be formatted for display.
    #[error(transparent)]
    Format(#[from] FormatError),

    /// pdfium rejected a draw call.
    #[error("Failed to draw field '{key}': {detail}")]
    DrawFailed { key: String, detail: String },

    /// The filled-in document could not be serialised.
    #[error("Failed to serialise certificate: {0}")]
    Serialization(String),

    // ── Request errors ────────────────────────────────────────────────────
    /// The request body could not be parsed.
    #[error("Invalid certificate request: {0}")]
    InvalidRequest(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or place the library next to the binary."
    )]
    PdfiumBindingFailed(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn display_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(p) => format!(" '{}'", p.display()),
        None => String::new(),
    }
}

/// A field value that cannot be converted to its display form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cannot format field '{key}' from value {raw:?}: {reason}")]
pub struct FormatError {
    /// Placement key of the offending field.
    pub key: String,
    /// The raw value as received in the record.
    pub raw: String,
    /// What went wrong.
    pub reason: String,
}

/// A non-fatal failure fetching the certificate record upstream.
///
/// The render continues with whatever override fields the deployment
/// configured, so this error is logged rather than returned to the caller.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum RecordError {
    /// The HTTP request never completed (connect error, timeout, TLS).
    #[error("Record request for batch '{batch}' failed: {detail}")]
    Request { batch: String, detail: String },

    /// The service answered with a non-success status.
    #[error("Record service returned HTTP {status} for batch '{batch}'")]
    Status { batch: String, status: u16 },

    /// The body was not a JSON object of fields.
    #[error("Record response for batch '{batch}' is not usable: {detail}")]
    Decode { batch: String, detail: String },

    /// The service answered with no fields at all.
    #[error("Record service returned no fields for batch '{batch}'")]
    Empty { batch: String },
}
