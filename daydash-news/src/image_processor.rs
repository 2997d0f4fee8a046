//! Story image processing
//!
//! Fetches a story's preview image, crops it to the dashboard's tile size
//! around its most interesting region and returns it as a JPEG data URI.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::NewsError;
use crate::http::{build_client, DEFAULT_MAX_REDIRECTS};
use crate::smartcrop::find_best_crop;
use crate::traits::ImageEncoder;

/// Prefix of every encoded image
pub const DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// JPEG quality used for encoded tiles
const JPEG_QUALITY: u8 = 75;

/// Default cap on a fetched image body
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// HTTP-backed image processor
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    client: Client,
    max_bytes: usize,
}

impl ImageProcessor {
    /// Create a processor with the given request timeout
    pub fn new(timeout: Duration) -> Result<Self, NewsError> {
        Ok(Self {
            client: build_client(timeout, DEFAULT_MAX_REDIRECTS)?,
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        })
    }

    /// Override the maximum accepted image size
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Fetch the raw image bytes, rejecting non-2xx responses and bodies
    /// larger than `max_bytes`
    async fn fetch(&self, image_url: &str) -> Result<Vec<u8>, NewsError> {
        let mut response = self.client.get(image_url).send().await.map_err(|e| {
            NewsError::RequestFailed(format!("Failed to fetch image {}: {}", image_url, e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NewsError::ApiError {
                status: status.as_u16(),
                message: format!("Expected a 2xx status fetching {}", image_url),
            });
        }

        let too_large = || NewsError::ImageTooLarge {
            limit: self.max_bytes,
        };
        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(too_large());
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            NewsError::RequestFailed(format!("Failed to read image {}: {}", image_url, e))
        })? {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(bytes)
    }

/// Fetch, crop, resize and encode an image
    #[instrument(skip(self))]
    pub async fn process(
        &self,
        image_url: &str,
        width: u32,
        height: u32,
    ) -> Result<String, NewsError> {
        let bytes = self.fetch(image_url).await?;
        debug!("Fetched {} image bytes", bytes.len());

        // Decoding and cropping are CPU bound
        tokio::task::spawn_blocking(move || crop_and_encode(&bytes, width, height))
            .await
            .map_err(|e| NewsError::ImageProcessing(format!("Image task failed: {}", e)))?
    }
}

#[async_trait]
impl ImageEncoder for ImageProcessor {
    async fn encode(&self, image_url: &str, width: u32, height: u32) -> Result<String, NewsError> {
        self.process(image_url, width, height).await
    }
}

/// Decode `bytes`, crop to the best `width` x `height` region and encode the
/// result as a JPEG data URI
pub fn crop_and_encode(bytes: &[u8], width: u32, height: u32) -> Result<String, NewsError> {
    let img = image::load_from_memory(bytes).map_err(|e| NewsError::ImageDecode(e.to_string()))?;

    let crop = find_best_crop(&img, width, height).ok_or_else(|| {
        NewsError::ImageProcessing(format!(
            "No crop found for {}x{} image at {}x{}",
            img.width(),
            img.height(),
            width,
            height
        ))
    })?;

    let mut cropped = img.crop_imm(crop.x, crop.y, crop.width, crop.height);
    if cropped.width() != width || cropped.height() != height {
        cropped = cropped.resize_exact(width, height, FilterType::Lanczos3);
    }

    let rgb = cropped.to_rgb8();
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| NewsError::ImageProcessing(format!("JPEG encode failed: {}", e)))?;

    Ok(format!("{}{}", DATA_URI_PREFIX, STANDARD.encode(&buffer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::testing::{response, serve, unsized_response};
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn processor() -> ImageProcessor {
        ImageProcessor::new(Duration::from_secs(5)).unwrap()
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn decode_data_uri(uri: &str) -> DynamicImage {
        let payload = uri.strip_prefix(DATA_URI_PREFIX).unwrap();
        let jpeg = STANDARD.decode(payload).unwrap();
        image::load_from_memory(&jpeg).unwrap()
    }

    #[test]
    fn test_output_has_exact_target_size() {
        let uri = crop_and_encode(&png_bytes(800, 600), 600, 300).unwrap();
        assert!(uri.starts_with(DATA_URI_PREFIX));

        let tile = decode_data_uri(&uri);
        assert_eq!((tile.width(), tile.height()), (600, 300));
    }

    #[test]
    fn test_small_source_is_upscaled() {
        let uri = crop_and_encode(&png_bytes(120, 90), 600, 300).unwrap();
        let tile = decode_data_uri(&uri);
        assert_eq!((tile.width(), tile.height()), (600, 300));
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let result = crop_and_encode(b"definitely not an image", 600, 300);
        assert!(matches!(result, Err(NewsError::ImageDecode(_))));
    }

    #[tokio::test]
    async fn test_fetch_404_is_api_error() {
        let addr = serve(vec![response("404 Not Found", &[], b"gone")]).await;

        let result = processor()
            .process(&format!("http://{}/img/missing.jpg", addr), 600, 300)
            .await;
        assert!(matches!(result, Err(NewsError::ApiError { status: 404, .. })));
    }

    #[tokio::test]
    async fn test_process_fetched_image() {
        let png = png_bytes(800, 600);
        let addr = serve(vec![response("200 OK", &[("Content-Type", "image/png")], &png)]).await;

        let uri = processor()
            .process(&format!("http://{}/img/a.png", addr), 600, 300)
            .await
            .unwrap();
        let tile = decode_data_uri(&uri);
        assert_eq!((tile.width(), tile.height()), (600, 300));
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_is_rejected() {
        let addr = serve(vec![response("200 OK", &[], &[0u8; 64])]).await;

        let result = processor()
            .with_max_bytes(16)
            .process(&format!("http://{}/img/big.jpg", addr), 600, 300)
            .await;
        assert!(matches!(result, Err(NewsError::ImageTooLarge { limit: 16 })));
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit_is_rejected() {
        let addr = serve(vec![unsized_response(&[0u8; 64])]).await;

        let result = processor()
            .with_max_bytes(16)
            .process(&format!("http://{}/img/big.jpg", addr), 600, 300)
            .await;
        assert!(matches!(result, Err(NewsError::ImageTooLarge { limit: 16 })));
    }
}
