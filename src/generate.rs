//! Certificate generation entry points.
//!
//! [`CertificateService`] is the long-lived form: it loads the template
//! assets once, holds the overlay engine and the record source, and serves
//! any number of concurrent requests. The free functions below are one-shot
//! conveniences for scripts and the CLI; they load assets on every call.

use crate::config::CertificateConfig;
use crate::error::CertificateError;
use crate::output::{CertificateOutput, CertificateResponse, DrawOp, RenderStats};
use crate::pipeline::assemble::{self, AssemblyJob};
use crate::pipeline::assets::CertificateAssets;
use crate::pipeline::overlay::OverlayEngine;
use crate::record::{CertificateRecord, HttpRecordSource, RecordSource};
use crate::request::{CallerIdentity, CertificateRequest, RenderContext};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// A record ready for the overlay engine, with where it came from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRecord {
    /// Fetched fields with the deployment overrides laid on top.
    pub record: CertificateRecord,
    /// Batch number the fetch used, if any.
    pub batch_number: Option<String>,
    /// Whether the upstream fetch failed and only overrides remain.
    pub fetch_failed: bool,
}

/// Serves certificate requests against one set of loaded assets.
pub struct CertificateService<S = HttpRecordSource> {
    config: CertificateConfig,
    assets: CertificateAssets,
    engine: Arc<OverlayEngine>,
    source: Option<S>,
}

impl CertificateService<HttpRecordSource> {
    /// Load assets from disk and wire up the HTTP record source (if an
    /// endpoint is configured).
    pub async fn from_config(config: CertificateConfig) -> Result<Self, CertificateError> {
        let assets = CertificateAssets::load(&config).await?;
        let source = HttpRecordSource::from_config(&config)?;
        Ok(Self::new(config, assets, source))
    }
}

impl<S: RecordSource> CertificateService<S> {
    pub fn new(config: CertificateConfig, assets: CertificateAssets, source: Option<S>) -> Self {
        let engine = Arc::new(OverlayEngine::from_config(&config));
        Self {
            config,
            assets,
            engine,
            source,
        }
    }

    pub fn config(&self) -> &CertificateConfig {
        &self.config
    }

    pub fn engine(&self) -> &OverlayEngine {
        &self.engine
    }

    /// Fetch the record for the request's batch and lay the override fields
    /// over it.
    ///
    /// Upstream failures are tolerated: the returned record then holds only
    /// the overrides, and `fetch_failed` is set.
    pub async fn resolve_record(&self, request: &CertificateRequest) -> ResolvedRecord {
        let batch = request
            .batch_number()
            .or_else(|| {
                self.config
                    .default_batch_number
                    .as_deref()
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
            })
            .map(str::to_string);

        let mut failed = false;
        let mut record = match &self.source {
            Some(source) => match source.fetch(batch.as_deref().unwrap_or_default()).await {
                Ok(record) => record,
                Err(e) => {
                    warn!("Rendering with override fields only: {}", e);
                    failed = true;
                    CertificateRecord::new()
                }
            },
            None => CertificateRecord::new(),
        };

        record.merge_overrides(&self.config.override_fields);
        ResolvedRecord {
            record,
            batch_number: batch,
            fetch_failed: failed,
        }
    }

    /// Produce a certificate for `caller`.
    pub async fn generate(
        &self,
        caller: &CallerIdentity,
        request: &CertificateRequest,
    ) -> Result<CertificateOutput, CertificateError> {
        let start = Instant::now();
        let ResolvedRecord {
            record,
            batch_number: batch,
            fetch_failed,
        } = self.resolve_record(request).await;
        info!(
            "Generating certificate for batch {} ({} fields, sign={}, exception={:?})",
            batch.as_deref().unwrap_or("<none>"),
            record.len(),
            request.sign,
            request.exception
        );

        let record_fields = record.len();
        let job = AssemblyJob {
            assets: self.assets.clone(),
            engine: Arc::clone(&self.engine),
            record,
            context: RenderContext::new(caller, request),
            now: self.config.clock.now(),
            pdfium_library_path: self.config.pdfium_library_path.clone(),
        };
        let document = assemble::assemble(job).await?;

        let stats = RenderStats {
            batch_number: batch,
            page_height: document.page_height,
            record_fields,
            record_fetch_failed: fetch_failed,
            draw_count: document.draws.len(),
            total_duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Certificate ready: {} draws, {} bytes, {}ms",
            stats.draw_count,
            document.pdf.len(),
            stats.total_duration_ms
        );

        Ok(CertificateOutput {
            pdf: document.pdf,
            draws: document.draws,
            stats,
        })
    }

    /// Resolve the record and compute the draw plan for a page of
    /// `page_height` points, without touching pdfium.
    pub async fn plan(
        &self,
        caller: &CallerIdentity,
        request: &CertificateRequest,
        page_height: f32,
    ) -> Result<(Vec<DrawOp>, RenderStats), CertificateError> {
        let start = Instant::now();
        let ResolvedRecord {
            record,
            batch_number: batch,
            fetch_failed,
        } = self.resolve_record(request).await;
        let context = RenderContext::new(caller, request);
        let draws = self
            .engine
            .plan(&record, &context, page_height, self.config.clock.now())?;

        let stats = RenderStats {
            batch_number: batch,
            page_height,
            record_fields: record.len(),
            record_fetch_failed: fetch_failed,
            draw_count: draws.len(),
            total_duration_ms: start.elapsed().as_millis() as u64,
        };
        Ok((draws, stats))
    }

    /// Handle a raw request body the way the HTTP endpoint does: `200` with
    /// the PDF, or `500` with `{ "error": … }`.
    pub async fn handle(&self, caller: Option<&CallerIdentity>, body: &[u8]) -> CertificateResponse {
        let system = CallerIdentity::system();
        let caller = caller.unwrap_or(&system);

        let result = match CertificateRequest::from_json(body) {
            Ok(request) => self.generate(caller, &request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(output) => CertificateResponse::pdf(output.pdf),
            Err(e) => {
                error!("Certificate generation failed: {}", e);
                CertificateResponse::error(&e)
            }
        }
    }
}

/// Generate one certificate, loading assets from the paths in `config`.
pub async fn generate_certificate(
    config: &CertificateConfig,
    caller: &CallerIdentity,
    request: &CertificateRequest,
) -> Result<CertificateOutput, CertificateError> {
    let service = CertificateService::from_config(config.clone()).await?;
    service.generate(caller, request).await
}

/// Generate a certificate and write it to `output_path`.
///
/// Writes atomically: the PDF goes to a temp file in the same directory
/// and is renamed into place, so readers never see a half-written file.
pub async fn generate_to_file(
    config: &CertificateConfig,
    caller: &CallerIdentity,
    request: &CertificateRequest,
    output_path: impl AsRef<Path>,
) -> Result<RenderStats, CertificateError> {
    let output = generate_certificate(config, caller, request).await?;
    write_atomic(output_path.as_ref(), &output.pdf).await?;
    Ok(output.stats)
}

/// Synchronous wrapper around [`generate_certificate`].
///
/// Creates a temporary tokio runtime internally.
pub fn generate_sync(
    config: &CertificateConfig,
    caller: &CallerIdentity,
    request: &CertificateRequest,
) -> Result<CertificateOutput, CertificateError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CertificateError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(generate_certificate(config, caller, request))
}

/// Write `bytes` to `path` via a temp file in the same directory.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CertificateError> {
    let path = path.to_path_buf();
    let bytes = bytes.to_vec();

    tokio::task::spawn_blocking(move || {
        let write_err = |source| CertificateError::OutputWriteFailed {
            path: path.clone(),
            source,
        };

        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(write_err)?;
        tmp.write_all(&bytes).map_err(write_err)?;
        tmp.persist(&path).map_err(|e| write_err(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| CertificateError::Internal(format!("Write task panicked: {}", e)))?
}
