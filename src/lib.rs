//! # certificate-overlay
//!
//! Fill a fixed-layout PDF certificate template with data about a
//! manufacturing batch and, optionally, a digital-signature block.
//!
//! The template is a static PDF. This crate writes text and a small tick
//! image onto its first page at predetermined coordinates, formatting
//! dates and signature lines along the way, and returns the serialised
//! document. Rendering is all-or-nothing: any failure yields an error and
//! no partial PDF.
//!
//! ## Pipeline Overview
//!
//! ```text
//! request body + caller
//!  │
//!  ├─ 1. Request   parse flags (bool or "true"/"false"), pick batch number
//!  ├─ 2. Record    POST to the record service; on failure use overrides only
//!  ├─ 3. Plan      placement table × record × flags → ordered draw calls
//!  ├─ 4. Assemble  replay the plan onto page one via pdfium (spawn_blocking)
//!  └─ 5. Output    PDF bytes + draw list + stats, or a 500 error body
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use certificate_overlay::{CallerIdentity, CertificateConfig, CertificateRequest, CertificateService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CertificateConfig::builder()
//!         .template_path("assets/TV-FRM-58719.pdf")
//!         .override_field("country", "IN")
//!         .build()?;
//!     let service = CertificateService::from_config(config).await?;
//!
//!     let caller = CallerIdentity::system();
//!     let request = CertificateRequest { sign: true, exception: Some(true), ..Default::default() };
//!     let output = service.generate(&caller, &request).await?;
//!     std::fs::write("certificate.pdf", &output.pdf)?;
//!     eprintln!("{} draws in {}ms", output.stats.draw_count, output.stats.total_duration_ms);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `certgen` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! certificate-overlay = { version = "0.1", default-features = false }
//! ```
//!
//! ## Template Revisions
//!
//! | Revision | Placements | username/email need `sign` |
//! |----------|------------|----------------------------|
//! | `rev1`   | weight y=255, NDC y=365 | no  |
//! | `rev2`   | weight y=257, NDC y=366 | yes |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod clock;
pub mod config;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod record;
pub mod request;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CertificateConfig, CertificateConfigBuilder, TimeZonePolicy};
pub use error::{CertificateError, FormatError, RecordError};
pub use generate::{
    generate_certificate, generate_sync, generate_to_file, write_atomic, CertificateService,
    ResolvedRecord,
};
pub use output::{CertificateOutput, CertificateResponse, DrawKind, DrawOp, RenderStats};
pub use pipeline::assets::CertificateAssets;
pub use pipeline::format::FieldFormatter;
pub use pipeline::overlay::{OverlayEngine, PageCanvas};
pub use pipeline::placement::{Placement, PlacementTable, TemplateProfile, TemplateVersion};
pub use record::{CertificateRecord, HttpRecordSource, RecordSource, StaticRecordSource};
pub use request::{CallerIdentity, CertificateRequest, RenderContext};
