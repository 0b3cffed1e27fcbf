//! Document rasterization.
//!
//! Turns an uploaded document into an ordered list of page images suitable for
//! the extraction service.
//!
//! # Providers
//!
//! - [`ImageRasterizer`] - JPEG/PNG/WebP uploads pass through as a single page
//! - [`PdfRasterizer`] - pdfium-backed page rendering (feature `pdf`)
//! - [`DocumentRasterizer`] - sniffs the payload and dispatches to the above

mod bitmap;
#[cfg(feature = "pdf")]
mod pdf;

pub use bitmap::ImageRasterizer;
#[cfg(feature = "pdf")]
pub use pdf::PdfRasterizer;

use async_trait::async_trait;
use serde::Deserialize;

/// Default cap on rendered pages per document; later pages are ignored.
pub const DEFAULT_MAX_PAGES: usize = 10;

/// One rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// MIME type of `data` (e.g., "image/jpeg").
    pub mime_type: String,
    /// Encoded image bytes.
    pub data: Vec<u8>,
}

/// Rendering settings shared by the rasterizers.
#[derive(Debug, Clone, Deserialize)]
pub struct RasterizerConfig {
    /// Maximum number of pages rendered per document.
    #[serde(default = "RasterizerConfig::default_max_pages")]
    pub max_pages: usize,
    /// Render scale relative to the PDF's native size.
    #[serde(default = "RasterizerConfig::default_scale")]
    pub scale: f32,
    /// JPEG quality (1-100) of rendered pages.
    #[serde(default = "RasterizerConfig::default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Directory holding the pdfium shared library; system lookup otherwise.
    #[serde(default)]
    pub pdfium_library_dir: Option<String>,
}

impl RasterizerConfig {
    pub fn default_max_pages() -> usize {
        DEFAULT_MAX_PAGES
    }

    pub fn default_scale() -> f32 {
        1.4
    }

    pub fn default_jpeg_quality() -> u8 {
        80
    }
}

impl Default for RasterizerConfig {
    fn default() -> Self {
        Self {
            max_pages: Self::default_max_pages(),
            scale: Self::default_scale(),
            jpeg_quality: Self::default_jpeg_quality(),
            pdfium_library_dir: None,
        }
    }
}

/// Errors that can occur while rasterizing a document.
#[derive(Debug, thiserror::Error)]
pub enum RasterizeError {
    /// The payload is not a format this rasterizer handles.
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// The renderer could not load or render the document.
    #[error("Rendering failed: {0}")]
    Render(String),

    /// A rendered page could not be encoded.
    #[error("Image encoding failed: {0}")]
    Encode(String),

    /// The blocking render task did not complete.
    #[error("Render task failed: {0}")]
    Join(String),
}

/// Converts document bytes into ordered page images.
///
/// Implementations are side-effect free apart from bounded resource use and
/// return at most their configured page cap.
#[async_trait]
pub trait Rasterizer: Send + Sync + std::fmt::Debug {
    /// Render the document held in `bytes`.
    async fn rasterize(&self, bytes: &[u8]) -> Result<Vec<PageImage>, RasterizeError>;

    /// Render at most `max_pages` pages of the document.
    ///
    /// Renderers that produce pages one at a time override this to stop early.
    async fn rasterize_pages(
        &self,
        bytes: &[u8],
        max_pages: usize,
    ) -> Result<Vec<PageImage>, RasterizeError> {
        let mut pages = self.rasterize(bytes).await?;
        pages.truncate(max_pages);
        Ok(pages)
    }

    /// Get the provider name for logging and debugging.
    fn provider_name(&self) -> &'static str;
}

/// Dispatches PDFs to the PDF renderer and everything else to the image
/// passthrough.
#[derive(Debug)]
pub struct DocumentRasterizer {
    images: ImageRasterizer,
    #[cfg(feature = "pdf")]
    pdf: PdfRasterizer,
}

impl DocumentRasterizer {
    #[cfg(feature = "pdf")]
    pub fn new(config: RasterizerConfig) -> Self {
        Self {
            images: ImageRasterizer::new(),
            pdf: PdfRasterizer::new(config),
        }
    }

    #[cfg(not(feature = "pdf"))]
    pub fn new(_config: RasterizerConfig) -> Self {
        Self {
            images: ImageRasterizer::new(),
        }
    }
}

impl DocumentRasterizer {
    #[cfg(feature = "pdf")]
    async fn rasterize_pdf(
        &self,
        bytes: &[u8],
        max_pages: Option<usize>,
    ) -> Result<Vec<PageImage>, RasterizeError> {
        match max_pages {
            Some(limit) => self.pdf.rasterize_pages(bytes, limit).await,
            None => self.pdf.rasterize(bytes).await,
        }
    }

    #[cfg(not(feature = "pdf"))]
    #[allow(clippy::unused_async)]
    async fn rasterize_pdf(
        &self,
        _bytes: &[u8],
        _max_pages: Option<usize>,
    ) -> Result<Vec<PageImage>, RasterizeError> {
        Err(RasterizeError::UnsupportedFormat(
            "PDF support is not compiled in".to_string(),
        ))
    }
}

/// Whether the payload carries the PDF magic header.
pub fn is_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF")
}

#[async_trait]
impl Rasterizer for DocumentRasterizer {
    async fn rasterize(&self, bytes: &[u8]) -> Result<Vec<PageImage>, RasterizeError> {
        if is_pdf(bytes) {
            return self.rasterize_pdf(bytes, None).await;
        }
        self.images.rasterize(bytes).await
    }

    async fn rasterize_pages(
        &self,
        bytes: &[u8],
        max_pages: usize,
    ) -> Result<Vec<PageImage>, RasterizeError> {
        if is_pdf(bytes) {
            return self.rasterize_pdf(bytes, Some(max_pages)).await;
        }
        self.images.rasterize_pages(bytes, max_pages).await
    }

    fn provider_name(&self) -> &'static str {
        "document"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_magic() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(!is_pdf(b"\x89PNG\r\n\x1a\n"));
        assert!(!is_pdf(b""));
    }

    #[test]
    fn test_config_defaults() {
        let config = RasterizerConfig::default();
        assert_eq!(config.max_pages, 10);
        assert_eq!(config.jpeg_quality, 80);
    }

    #[tokio::test]
    async fn test_page_limit_applies_to_images() {
        let rasterizer = DocumentRasterizer::new(RasterizerConfig::default());
        let jpeg = b"\xFF\xD8\xFF\xE0\0\x10JFIF\0";

        assert_eq!(rasterizer.rasterize_pages(jpeg, 1).await.unwrap().len(), 1);
        assert!(rasterizer.rasterize_pages(jpeg, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_document_rasterizer_rejects_unknown_payload() {
        let rasterizer = DocumentRasterizer::new(RasterizerConfig::default());
        let result = rasterizer.rasterize(b"plain text, not a document").await;
        assert!(matches!(result, Err(RasterizeError::UnsupportedFormat(_))));
    }
}
