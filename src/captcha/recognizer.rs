//! External text recognition for image challenges.
//!
//! Recognition is a black box: image in, best-guess text out, no correctness
//! guarantee. The pipeline only cares whether a non-empty string came back.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use image::ImageFormat;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::CaptchaError;

/// Black-box image-to-text recognition.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Recognize text in a PNG image. An empty string means nothing was read.
    async fn recognize(&self, image_png: &[u8]) -> Result<String, CaptchaError>;
}

/// Recognizer that never reads anything. Used when no OCR endpoint is
/// configured; image challenges are then reported as unresolved.
pub struct NullRecognizer;

#[async_trait]
impl TextRecognizer for NullRecognizer {
    async fn recognize(&self, _image_png: &[u8]) -> Result<String, CaptchaError> {
        Ok(String::new())
    }
}

#[derive(Serialize)]
struct OcrRequest {
    key: String,
    image: String,
}

#[derive(Deserialize)]
struct OcrResponse {
    text: Option<String>,
}

/// Recognizer backed by an external OCR HTTP endpoint.
pub struct HttpOcrRecognizer {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl HttpOcrRecognizer {
    pub fn new(endpoint: &str, api_key: &str) -> Result<Self, CaptchaError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CaptchaError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl TextRecognizer for HttpOcrRecognizer {
    async fn recognize(&self, image_png: &[u8]) -> Result<String, CaptchaError> {
        let request = OcrRequest {
            key: self.api_key.clone(),
            image: base64::engine::general_purpose::STANDARD.encode(image_png),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| CaptchaError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CaptchaError::RecognitionFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let body: OcrResponse = response
            .json()
            .await
            .map_err(|e| CaptchaError::InvalidResponse(e.to_string()))?;

        let text = body.text.unwrap_or_default().trim().to_string();
        debug!("OCR endpoint returned {:?}", text);
        Ok(text)
    }
}

/// Preprocess a challenge image for recognition: grayscale, then inverted
/// binary threshold so dark glyphs come out white on black.
pub fn binarize(image_bytes: &[u8]) -> Result<Vec<u8>, CaptchaError> {
    let img = image::load_from_memory(image_bytes)
        .map_err(|e| CaptchaError::DecodeError(e.to_string()))?;

    let mut gray = img.to_luma8();
    for pixel in gray.pixels_mut() {
        pixel.0[0] = if pixel.0[0] > 150 { 0 } else { 255 };
    }

    let mut out = Vec::new();
    image::DynamicImage::ImageLuma8(gray)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .map_err(|e| CaptchaError::DecodeError(e.to_string()))?;

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_png() -> Vec<u8> {
        let mut img = image::GrayImage::new(2, 2);
        img.put_pixel(0, 0, image::Luma([10]));
        img.put_pixel(1, 0, image::Luma([200]));
        img.put_pixel(0, 1, image::Luma([151]));
        img.put_pixel(1, 1, image::Luma([150]));

        let mut out = Vec::new();
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn binarize_inverts_around_the_threshold() {
        let out = binarize(&sample_png()).unwrap();
        let img = image::load_from_memory(&out).unwrap().to_luma8();

        assert_eq!(img.get_pixel(0, 0).0[0], 255); // dark -> white
        assert_eq!(img.get_pixel(1, 0).0[0], 0); // light -> black
        assert_eq!(img.get_pixel(0, 1).0[0], 0);
        assert_eq!(img.get_pixel(1, 1).0[0], 255); // threshold is exclusive
    }

    #[test]
    fn binarize_rejects_garbage() {
        assert!(binarize(b"not an image").is_err());
    }

    #[tokio::test]
    async fn null_recognizer_reads_nothing() {
        let text = NullRecognizer.recognize(&sample_png()).await.unwrap();
        assert!(text.is_empty());
    }
}
