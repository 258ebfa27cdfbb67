//! Template assets: the base PDF and the indicator tick image.
//!
//! Both are static deployment files, loaded once at startup and shared
//! read-only by every request. Each render gets its own pdfium document
//! built from the shared bytes, so nothing here is ever mutated.
//!
//! Validation happens up front: a template without a `%PDF` header or an
//! indicator that does not decode fails at load time with a precise error,
//! instead of surfacing later as an opaque pdfium failure on every request.

use crate::config::CertificateConfig;
use crate::error::CertificateError;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Immutable template assets shared across requests.
#[derive(Debug, Clone)]
pub struct CertificateAssets {
    template: Arc<[u8]>,
    indicator: Arc<DynamicImage>,
}

impl CertificateAssets {
    /// Build from in-memory bytes, validating both assets.
    pub fn from_bytes(template: Vec<u8>, indicator: &[u8]) -> Result<Self, CertificateError> {
        Self::validate_template(&template, None)?;
        let indicator = decode_indicator(indicator, None)?;
        Ok(Self {
            template: template.into(),
            indicator: Arc::new(indicator),
        })
    }

    /// Read both assets concurrently from the paths in `config`.
    pub async fn load(config: &CertificateConfig) -> Result<Self, CertificateError> {
        Self::load_from(&config.template_path, &config.indicator_path).await
    }

    pub async fn load_from(
        template_path: &Path,
        indicator_path: &Path,
    ) -> Result<Self, CertificateError> {
        let (template, indicator) = futures::try_join!(
            read_asset(template_path, |path, detail| CertificateError::TemplateLoad {
                path: Some(path),
                detail,
            }),
            read_asset(indicator_path, |path, detail| CertificateError::AssetLoad {
                path: Some(path),
                detail,
            }),
        )?;

        Self::validate_template(&template, Some(template_path))?;
        let decoded = decode_indicator(&indicator, Some(indicator_path))?;

        info!(
            "Loaded template {} ({} bytes) and indicator {} ({}x{})",
            template_path.display(),
            template.len(),
            indicator_path.display(),
            decoded.width(),
            decoded.height()
        );

        Ok(Self {
            template: template.into(),
            indicator: Arc::new(decoded),
        })
    }

    pub fn template(&self) -> &[u8] {
        &self.template
    }

    pub fn indicator(&self) -> &DynamicImage {
        &self.indicator
    }

    fn validate_template(bytes: &[u8], path: Option<&Path>) -> Result<(), CertificateError> {
        if bytes.len() < 4 || &bytes[..4] != b"%PDF" {
            let mut magic = [0u8; 4];
            let n = bytes.len().min(4);
            magic[..n].copy_from_slice(&bytes[..n]);
            return Err(CertificateError::TemplateLoad {
                path: path.map(Path::to_path_buf),
                detail: format!("not a PDF (first bytes: {magic:?})"),
            });
        }
        Ok(())
    }
}

async fn read_asset(
    path: &Path,
    on_error: impl FnOnce(PathBuf, String) -> CertificateError,
) -> Result<Vec<u8>, CertificateError> {
    debug!("Reading asset {}", path.display());
    tokio::fs::read(path)
        .await
        .map_err(|e| on_error(path.to_path_buf(), e.to_string()))
}

fn decode_indicator(bytes: &[u8], path: Option<&Path>) -> Result<DynamicImage, CertificateError> {
    image::load_from_memory(bytes).map_err(|e| CertificateError::AssetLoad {
        path: path.map(Path::to_path_buf),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn tick_png() -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([0, 128, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .expect("encode png");
        buf
    }

    #[test]
    fn accepts_valid_assets() {
        let assets = CertificateAssets::from_bytes(b"%PDF-1.7\n".to_vec(), &tick_png()).unwrap();
        assert!(assets.template().starts_with(b"%PDF"));
        assert_eq!(assets.indicator().width(), 4);
    }

    #[test]
    fn rejects_non_pdf_template() {
        let err = CertificateAssets::from_bytes(b"GIF89a".to_vec(), &tick_png()).unwrap_err();
        assert!(matches!(err, CertificateError::TemplateLoad { .. }));
    }

    #[test]
    fn rejects_short_template() {
        let err = CertificateAssets::from_bytes(b"%P".to_vec(), &tick_png()).unwrap_err();
        assert!(matches!(err, CertificateError::TemplateLoad { .. }));
    }

    #[test]
    fn rejects_undecodable_indicator() {
        let err = CertificateAssets::from_bytes(b"%PDF-1.7".to_vec(), b"not an image").unwrap_err();
        assert!(matches!(err, CertificateError::AssetLoad { .. }));
    }

    #[tokio::test]
    async fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.pdf");
        let tick = dir.path().join("tick.png");
        tokio::fs::write(&template, b"%PDF-1.4\n%%EOF").await.unwrap();
        tokio::fs::write(&tick, tick_png()).await.unwrap();

        let assets = CertificateAssets::load_from(&template, &tick).await.unwrap();
        assert_eq!(assets.template(), b"%PDF-1.4\n%%EOF");
    }

    #[tokio::test]
    async fn missing_template_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let tick = dir.path().join("tick.png");
        tokio::fs::write(&tick, tick_png()).await.unwrap();

        let err = CertificateAssets::load_from(&dir.path().join("absent.pdf"), &tick)
            .await
            .unwrap_err();
        match err {
            CertificateError::TemplateLoad { path, .. } => {
                assert!(path.unwrap().ends_with("absent.pdf"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_indicator_is_asset_error() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("template.pdf");
        tokio::fs::write(&template, b"%PDF-1.4").await.unwrap();

        let err = CertificateAssets::load_from(&template, &dir.path().join("absent.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, CertificateError::AssetLoad { .. }));
    }
}
