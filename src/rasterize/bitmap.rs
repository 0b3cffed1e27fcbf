//! Passthrough for uploads that already are images.

use async_trait::async_trait;
use image::ImageFormat;

use super::{PageImage, RasterizeError, Rasterizer};

/// Treats a JPEG, PNG or WebP upload as a single-page document.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageRasterizer;

impl ImageRasterizer {
    pub fn new() -> Self {
        Self
    }

    /// MIME type of a supported image payload.
    pub fn sniff_mime_type(bytes: &[u8]) -> Option<&'static str> {
        match image::guess_format(bytes).ok()? {
            ImageFormat::Jpeg => Some("image/jpeg"),
            ImageFormat::Png => Some("image/png"),
            ImageFormat::WebP => Some("image/webp"),
            _ => None,
        }
    }
}

#[async_trait]
impl Rasterizer for ImageRasterizer {
    async fn rasterize(&self, bytes: &[u8]) -> Result<Vec<PageImage>, RasterizeError> {
        let mime_type = Self::sniff_mime_type(bytes).ok_or_else(|| {
            RasterizeError::UnsupportedFormat("expected a PDF, JPEG, PNG or WebP file".to_string())
        })?;

        Ok(vec![PageImage {
            mime_type: mime_type.to_string(),
            data: bytes.to_vec(),
        }])
    }

    fn provider_name(&self) -> &'static str {
        "image"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG_HEADER: &[u8] = b"\xFF\xD8\xFF\xE0\0\x10JFIF\0";

    #[test]
    fn test_sniff_formats() {
        assert_eq!(ImageRasterizer::sniff_mime_type(PNG_HEADER), Some("image/png"));
        assert_eq!(ImageRasterizer::sniff_mime_type(JPEG_HEADER), Some("image/jpeg"));
        assert_eq!(ImageRasterizer::sniff_mime_type(b"GIF89a"), None);
    }

    #[tokio::test]
    async fn test_passthrough_single_page() {
        let pages = ImageRasterizer::new().rasterize(JPEG_HEADER).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].mime_type, "image/jpeg");
        assert_eq!(pages[0].data, JPEG_HEADER);
    }
}
