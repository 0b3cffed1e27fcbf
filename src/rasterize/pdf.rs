//! pdfium-backed PDF page rendering.
//!
//! pdfium is not async-safe, so every document is rendered inside
//! `spawn_blocking` with a fresh binding.

use std::io::Cursor;
use std::path::PathBuf;

use async_trait::async_trait;
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::{PageImage, RasterizeError, Rasterizer, RasterizerConfig};

/// Renders the first `max_pages` pages of a PDF to JPEG.
#[derive(Debug, Clone)]
pub struct PdfRasterizer {
    config: RasterizerConfig,
}

impl PdfRasterizer {
    pub fn new(config: RasterizerConfig) -> Self {
        Self { config }
    }

    fn bind(library_dir: Option<&PathBuf>) -> Result<Pdfium, RasterizeError> {
        let bindings = match library_dir {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
                .or_else(|_| Pdfium::bind_to_system_library()),
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| RasterizeError::Render(format!("Failed to initialize pdfium: {e}")))?;

        Ok(Pdfium::new(bindings))
    }

    fn render_blocking(
        bytes: &[u8],
        config: &RasterizerConfig,
        max_pages: usize,
    ) -> Result<Vec<PageImage>, RasterizeError> {
        let library_dir = config.pdfium_library_dir.as_ref().map(PathBuf::from);
        let pdfium = Self::bind(library_dir.as_ref())?;

        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| RasterizeError::Render(format!("Invalid PDF: {e}")))?;

        let page_count = document.pages().len() as usize;
        if page_count > config.max_pages {
            warn!(
                page_count,
                max_pages = config.max_pages,
                "PDF exceeds page cap; remaining pages ignored"
            );
        }

        let render_config = PdfRenderConfig::new().scale_page_by_factor(config.scale);
        let mut pages = Vec::with_capacity(page_count.min(max_pages));

        for (index, page) in document.pages().iter().take(max_pages).enumerate() {
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| RasterizeError::Render(format!("Failed to render page {index}: {e}")))?;

            let image = DynamicImage::ImageRgb8(bitmap.as_image().into_rgb8());
            pages.push(PageImage {
                mime_type: "image/jpeg".to_string(),
                data: encode_jpeg(&image, config.jpeg_quality)?,
            });
        }

        debug!(pages = pages.len(), "PDF rasterized");
        Ok(pages)
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, RasterizeError> {
    let mut buffer = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
    image
        .write_with_encoder(encoder)
        .map_err(|e| RasterizeError::Encode(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// Pages to render when a caller asks for `requested`; never above the cap.
fn page_budget(config: &RasterizerConfig, requested: usize) -> usize {
    requested.min(config.max_pages)
}

#[async_trait]
impl Rasterizer for PdfRasterizer {
    async fn rasterize(&self, bytes: &[u8]) -> Result<Vec<PageImage>, RasterizeError> {
        self.rasterize_pages(bytes, self.config.max_pages).await
    }

    async fn rasterize_pages(
        &self,
        bytes: &[u8],
        max_pages: usize,
    ) -> Result<Vec<PageImage>, RasterizeError> {
        let max_pages = page_budget(&self.config, max_pages);
        if max_pages == 0 {
            return Ok(Vec::new());
        }
        let bytes = bytes.to_vec();
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || Self::render_blocking(&bytes, &config, max_pages))
            .await
            .map_err(|e| RasterizeError::Join(e.to_string()))?
    }

    fn provider_name(&self) -> &'static str {
        "pdfium"
    }
}
