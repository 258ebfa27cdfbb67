//! Output types: draw plans, rendered certificates, and HTTP-shaped responses.

use crate::error::CertificateError;
use serde::{Deserialize, Serialize};

/// What a single draw call puts on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum DrawKind {
    Text { text: String, font_size: f32 },
    Image { width: f32, height: f32 },
}

/// One draw call, positioned in PDF (bottom-left-origin) space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawOp {
    /// Placement key that produced this draw.
    pub key: String,
    pub x: f32,
    pub y: f32,
    #[serde(flatten)]
    pub kind: DrawKind,
}

impl DrawOp {
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            DrawKind::Text { text, .. } => Some(text),
            DrawKind::Image { .. } => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self.kind, DrawKind::Image { .. })
    }
}

/// Summary of one render.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderStats {
    /// Batch number the record was fetched for, if any.
    pub batch_number: Option<String>,
    /// Height of the template's first page, in points.
    pub page_height: f32,
    /// Number of fields in the merged record.
    pub record_fields: usize,
    /// Whether the upstream fetch failed and only override fields were used.
    pub record_fetch_failed: bool,
    pub draw_count: usize,
    pub total_duration_ms: u64,
}

/// A filled-in certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateOutput {
    /// Serialised PDF.
    #[serde(skip)]
    pub pdf: Vec<u8>,
    /// Draw calls applied to the first page, in order.
    pub draws: Vec<DrawOp>,
    pub stats: RenderStats,
}

/// Status, content type and body for the certificate endpoint.
///
/// Success is `200 application/pdf`; any failure is `500` with
/// `{ "error": message }`. There is no partial success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl CertificateResponse {
    pub fn pdf(bytes: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: "application/pdf",
            body: bytes,
        }
    }

    pub fn error(err: &CertificateError) -> Self {
        let body = serde_json::json!({ "error": err.to_string() });
        Self {
            status: 500,
            content_type: "application/json",
            body: body.to_string().into_bytes(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}
