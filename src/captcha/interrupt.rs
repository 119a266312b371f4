//! Challenge detection and one-shot resolution.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::browser::PageDriver;
use crate::stats::RunStats;

use super::{CaptchaError, ChallengeGate, TextRecognizer};

/// Scan for known challenge markers: checkbox-style widgets, challenge
/// iframes/divs, and challenge images.
const DETECT_SCRIPT: &str = r#"
(() => {
    if (document.querySelector('.recaptcha-checkbox-border')
        || document.querySelector("input[type='checkbox'][id*='captcha']")
        || document.querySelector("input[type='checkbox'][name*='captcha']")) {
        return { kind: 'checkbox' };
    }
    const img = document.querySelector("img[src*='captcha'], img[src*='CAPTCHA']");
    if (img) {
        return { kind: 'image', src: img.getAttribute('src') };
    }
    if (document.querySelector("iframe[src*='captcha'], iframe[src*='recaptcha'], div[class*='captcha'], div[class*='recaptcha']")) {
        return { kind: 'frame' };
    }
    return { kind: 'none' };
})()
"#;

const CLICK_CHECKBOX_SCRIPT: &str = r#"
(() => {
    const box = document.querySelector('.recaptcha-checkbox-border')
        || document.querySelector("input[type='checkbox'][id*='captcha']")
        || document.querySelector("input[type='checkbox'][name*='captcha']");
    if (!box) return false;
    box.click();
    return true;
})()
"#;

/// What the detection scan found.
#[derive(Debug, PartialEq, Eq)]
enum Challenge {
    Absent,
    Checkbox,
    Image(String),
    Frame,
}

/// Challenge interrupt handler.
///
/// Resolution is attempted once per detection, no retry loop. Unresolved
/// challenges are reported, not raised; the caller's flow continues and may
/// then legitimately yield empty results.
pub struct CaptchaInterrupt {
    recognizer: Arc<dyn TextRecognizer>,
    client: Client,
    stats: Arc<RunStats>,
    post_action_wait: Duration,
}

impl CaptchaInterrupt {
    pub fn new(
        recognizer: Arc<dyn TextRecognizer>,
        stats: Arc<RunStats>,
    ) -> Result<Self, CaptchaError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CaptchaError::NetworkError(e.to_string()))?;

        Ok(Self {
            recognizer,
            client,
            stats,
            post_action_wait: Duration::from_secs(2),
        })
    }

    /// Override the fixed wait after a clearing action (tests use zero).
    pub fn with_post_action_wait(mut self, wait: Duration) -> Self {
        self.post_action_wait = wait;
        self
    }

    /// Detect and attempt to clear a blocking challenge.
    ///
    /// `true` means absent or believed cleared, `false` means detected but
    /// unresolved.
    pub async fn try_clear(&self, driver: &dyn PageDriver) -> bool {
        let challenge = match self.detect(driver).await {
            Ok(challenge) => challenge,
            Err(e) => {
                debug!("Challenge scan failed, assuming absent: {}", e);
                return true;
            }
        };

        match challenge {
            Challenge::Absent => true,
            Challenge::Checkbox => {
                self.stats.record_challenge_detected();
                match driver.eval(CLICK_CHECKBOX_SCRIPT).await {
                    Ok(Value::Bool(true)) => {
                        info!("Clicked checkbox challenge");
                        tokio::time::sleep(self.post_action_wait).await;
                        self.stats.record_challenge_cleared();
                        true
                    }
                    Ok(_) => false,
                    Err(e) => {
                        warn!("Checkbox challenge click failed: {}", e);
                        false
                    }
                }
            }
            Challenge::Image(src) => {
                self.stats.record_challenge_detected();
                let cleared = self.clear_image_challenge(driver, &src).await;
                if cleared {
                    self.stats.record_challenge_cleared();
                }
                cleared
            }
            Challenge::Frame => {
                self.stats.record_challenge_detected();
                info!("Challenge frame present, no clearing strategy applies");
                false
            }
        }
    }

    async fn detect(&self, driver: &dyn PageDriver) -> Result<Challenge, CaptchaError> {
        let value = driver
            .eval(DETECT_SCRIPT)
            .await
            .map_err(|e| CaptchaError::InvalidResponse(e.to_string()))?;

        let kind = value.get("kind").and_then(Value::as_str).unwrap_or("none");
        Ok(match kind {
            "checkbox" => Challenge::Checkbox,
            "image" => {
                let src = value
                    .get("src")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                if src.is_empty() {
                    Challenge::Absent
                } else {
                    Challenge::Image(src)
                }
            }
            "frame" => Challenge::Frame,
            _ => Challenge::Absent,
        })
    }

    /// Image challenge: fetch, binarize, recognize, and submit the text.
    /// Any decode/recognition failure is treated as "no text recognized".
    async fn clear_image_challenge(&self, driver: &dyn PageDriver, src: &str) -> bool {
        let image = match self.fetch_image(driver, src).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to fetch challenge image: {}", e);
                return false;
            }
        };

        let prepared = match super::binarize(&image) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to preprocess challenge image: {}", e);
                return false;
            }
        };

        let text = match self.recognizer.recognize(&prepared).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Recognition failed: {}", e);
                String::new()
            }
        };

        if text.is_empty() {
            debug!("No text recognized in challenge image");
            return false;
        }

        info!("Submitting recognized challenge text ({} chars)", text.len());
        let script = submit_text_script(&text);
        match driver.eval(&script).await {
            Ok(Value::Bool(true)) => {
                tokio::time::sleep(self.post_action_wait).await;
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("Challenge text submission failed: {}", e);
                false
            }
        }
    }

    /// Fetch challenge image bytes from an inline `data:` URI or over HTTP.
    /// Relative sources are resolved against the current page URL.
    async fn fetch_image(
        &self,
        driver: &dyn PageDriver,
        src: &str,
    ) -> Result<Vec<u8>, CaptchaError> {
        if src.starts_with("data:image") {
            let (_, data) = src
                .split_once(',')
                .ok_or_else(|| CaptchaError::DecodeError("malformed data URI".into()))?;
            return base64::engine::general_purpose::STANDARD
                .decode(data)
                .map_err(|e| CaptchaError::DecodeError(e.to_string()));
        }

        let absolute = if src.contains("://") {
            src.to_string()
        } else {
            let base = driver
                .current_url()
                .await
                .map_err(|e| CaptchaError::NetworkError(e.to_string()))?;
            url::Url::parse(&base)
                .and_then(|b| b.join(src))
                .map_err(|e| CaptchaError::DecodeError(e.to_string()))?
                .to_string()
        };

        let response = self
            .client
            .get(&absolute)
            .send()
            .await
            .map_err(|e| CaptchaError::NetworkError(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CaptchaError::NetworkError(e.to_string()))?;

        Ok(bytes.to_vec())
    }
}

/// Locate a plausible text input (name/id hints first, then the first text
/// input), type the recognized text, and submit.
fn submit_text_script(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    format!(
        r#"
(() => {{
    const input = document.querySelector("input[type='text'][name*='captcha']")
        || document.querySelector("input[type='text'][id*='captcha']")
        || document.querySelector("input[type='text']");
    if (!input) return false;
    input.value = "{escaped}";
    input.dispatchEvent(new Event('input', {{ bubbles: true }}));
    const form = input.form;
    const submit = (form && form.querySelector("button[type='submit'], input[type='submit']"))
        || document.querySelector("button[type='submit'], input[type='submit']");
    if (submit) {{
        submit.click();
    }} else if (form) {{
        form.submit();
    }}
    return true;
}})()
"#
    )
}

#[async_trait]
impl ChallengeGate for CaptchaInterrupt {
    async fn try_clear(&self, driver: &dyn PageDriver) -> bool {
        CaptchaInterrupt::try_clear(self, driver).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use serde_json::json;

    use crate::browser::testing::ScriptedDriver;
    use crate::captcha::NullRecognizer;

    use super::*;

    struct FixedRecognizer(&'static str);

    #[async_trait]
    impl TextRecognizer for FixedRecognizer {
        async fn recognize(&self, _image_png: &[u8]) -> Result<String, CaptchaError> {
            Ok(self.0.to_string())
        }
    }

    fn interrupt(recognizer: Arc<dyn TextRecognizer>) -> CaptchaInterrupt {
        CaptchaInterrupt::new(recognizer, Arc::new(RunStats::new()))
            .unwrap()
            .with_post_action_wait(Duration::ZERO)
    }

    fn png_data_uri() -> String {
        let img = image::GrayImage::from_pixel(2, 2, image::Luma([40]));
        let mut out = Vec::new();
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&out)
        )
    }

    #[tokio::test]
    async fn absent_challenge_reports_cleared_with_a_single_scan() {
        let driver = ScriptedDriver::new();
        let handler = interrupt(Arc::new(NullRecognizer));

        assert!(handler.try_clear(&driver).await);
        assert_eq!(driver.eval_count(), 1);
    }

    #[tokio::test]
    async fn checkbox_challenge_is_clicked_and_treated_as_cleared() {
        let driver = ScriptedDriver::new();
        driver.respond("return { kind:", json!({ "kind": "checkbox" }));
        driver.respond("box.click()", json!(true));

        let handler = interrupt(Arc::new(NullRecognizer));
        assert!(handler.try_clear(&driver).await);
    }

    #[tokio::test]
    async fn frame_challenge_is_detected_but_unresolved() {
        let driver = ScriptedDriver::new();
        driver.respond("return { kind:", json!({ "kind": "frame" }));

        let handler = interrupt(Arc::new(NullRecognizer));
        assert!(!handler.try_clear(&driver).await);
    }

    #[tokio::test]
    async fn image_challenge_submits_recognized_text() {
        let driver = ScriptedDriver::new();
        driver.respond(
            "return { kind:",
            json!({ "kind": "image", "src": png_data_uri() }),
        );
        driver.respond("input.value =", json!(true));

        let handler = interrupt(Arc::new(FixedRecognizer("XK4P2")));
        assert!(handler.try_clear(&driver).await);
        assert_eq!(driver.evals_matching("XK4P2"), 1);
    }

    #[tokio::test]
    async fn empty_recognition_leaves_the_challenge_unresolved() {
        let driver = ScriptedDriver::new();
        driver.respond(
            "return { kind:",
            json!({ "kind": "image", "src": png_data_uri() }),
        );

        let handler = interrupt(Arc::new(NullRecognizer));
        assert!(!handler.try_clear(&driver).await);
        // no submission attempt was made
        assert_eq!(driver.evals_matching("input.value ="), 0);
    }

    #[tokio::test]
    async fn stats_track_detected_and_cleared_counts() {
        let driver = ScriptedDriver::new();
        driver.respond("return { kind:", json!({ "kind": "checkbox" }));
        driver.respond("box.click()", json!(true));

        let stats = Arc::new(RunStats::new());
        let handler = CaptchaInterrupt::new(Arc::new(NullRecognizer), stats.clone())
            .unwrap()
            .with_post_action_wait(Duration::ZERO);
        handler.try_clear(&driver).await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.challenges_detected, 1);
        assert_eq!(snapshot.challenges_cleared, 1);
    }

    #[test]
    fn data_uri_bytes_decode() {
        let uri = png_data_uri();
        let (_, data) = uri.split_once(',').unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data)
            .unwrap();
        assert!(image::load_from_memory(&bytes).is_ok());
    }
}
