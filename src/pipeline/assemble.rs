//! PDF assembly: load the template into pdfium, overlay page one, save.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which keeps thread-local
//! state and blocks while it parses and serialises. The whole document
//! lifecycle runs on tokio's blocking pool so request-handling workers never
//! stall behind it.
//!
//! Every call builds a fresh `PdfDocument` from the shared template bytes;
//! pdfium documents are never shared between requests.

use crate::error::CertificateError;
use crate::output::DrawOp;
use crate::pipeline::assets::CertificateAssets;
use crate::pipeline::overlay::{OverlayEngine, PageCanvas};
use crate::record::CertificateRecord;
use crate::request::RenderContext;
use chrono::{DateTime, Utc};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything one render needs, owned so it can move onto the blocking pool.
#[derive(Debug, Clone)]
pub struct AssemblyJob {
    pub assets: CertificateAssets,
    pub engine: Arc<OverlayEngine>,
    pub record: CertificateRecord,
    pub context: RenderContext,
    pub now: DateTime<Utc>,
    pub pdfium_library_path: Option<PathBuf>,
}

/// The serialised certificate plus what was drawn on it.
#[derive(Debug, Clone)]
pub struct AssembledDocument {
    pub pdf: Vec<u8>,
    pub draws: Vec<DrawOp>,
    pub page_height: f32,
}

/// Render a certificate on tokio's blocking pool.
pub async fn assemble(job: AssemblyJob) -> Result<AssembledDocument, CertificateError> {
    tokio::task::spawn_blocking(move || assemble_blocking(&job))
        .await
        .map_err(|e| CertificateError::Internal(format!("Assembly task panicked: {}", e)))?
}

/// Blocking implementation of certificate assembly.
pub fn assemble_blocking(job: &AssemblyJob) -> Result<AssembledDocument, CertificateError> {
    let pdfium = bind_pdfium(job.pdfium_library_path.as_deref())?;

    let mut document = pdfium
        .load_pdf_from_byte_slice(job.assets.template(), None)
        .map_err(|e| CertificateError::TemplateLoad {
            path: None,
            detail: format!("{:?}", e),
        })?;

    let font = document.fonts_mut().helvetica();

    let (draws, page_height) = {
        let mut page = document
            .pages()
            .first()
            .map_err(|e| CertificateError::TemplateLoad {
                path: None,
                detail: format!("template has no first page: {:?}", e),
            })?;

        let mut canvas = PdfiumCanvas {
            page: &mut page,
            font,
            indicator: job.assets.indicator(),
        };
        let page_height = canvas.page_height();
        let draws = job
            .engine
            .overlay(&mut canvas, &job.record, &job.context, job.now)?;
        (draws, page_height)
    };

    let pdf = document
        .save_to_bytes()
        .map_err(|e| CertificateError::Serialization(format!("{:?}", e)))?;

    info!(
        "Assembled certificate: {} draws, {} bytes",
        draws.len(),
        pdf.len()
    );

    Ok(AssembledDocument {
        pdf,
        draws,
        page_height,
    })
}

/// Bind pdfium from an explicit library file, else from `./`, else the
/// system library search path.
pub fn bind_pdfium(library_path: Option<&Path>) -> Result<Pdfium, CertificateError> {
    let bindings = match library_path {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| CertificateError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// First page of a pdfium document, with the certificate font and tick image.
struct PdfiumCanvas<'a, 'p> {
    page: &'p mut PdfPage<'a>,
    font: PdfFontToken,
    indicator: &'p DynamicImage,
}

impl PageCanvas for PdfiumCanvas<'_, '_> {
    fn page_height(&self) -> f32 {
        self.page.height().value
    }

    fn draw_text(
        &mut self,
        text: &str,
        x: f32,
        y: f32,
        font_size: f32,
    ) -> Result<(), CertificateError> {
        debug!("pdfium text {:?} at ({}, {}) size {}", text, x, y, font_size);
        self.page
            .objects_mut()
            .create_text_object(
                PdfPoints::new(x),
                PdfPoints::new(y),
                text,
                self.font,
                PdfPoints::new(font_size),
            )
            .map(|_| ())
            .map_err(|e| CertificateError::DrawFailed {
                key: "text".to_string(),
                detail: format!("{:?}", e),
            })
    }

    fn draw_image(
        &mut self,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Result<(), CertificateError> {
        debug!("pdfium image at ({}, {}) {}x{}", x, y, width, height);
        self.page
            .objects_mut()
            .create_image_object(
                PdfPoints::new(x),
                PdfPoints::new(y),
                self.indicator,
                Some(PdfPoints::new(width)),
                Some(PdfPoints::new(height)),
            )
            .map(|_| ())
            .map_err(|e| CertificateError::DrawFailed {
                key: "image".to_string(),
                detail: format!("{:?}", e),
            })
    }
}
