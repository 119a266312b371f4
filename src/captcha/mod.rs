//! Challenge (CAPTCHA) detection and clearing.
//!
//! The remote site can interrupt any navigation with a challenge page, so the
//! handler is inserted behind [`ChallengeGate`] at every suspension point of
//! the pagination and activity loops rather than invoked once.

mod interrupt;
mod recognizer;

use async_trait::async_trait;
use thiserror::Error;

use crate::browser::PageDriver;

pub use interrupt::CaptchaInterrupt;
pub use recognizer::{binarize, HttpOcrRecognizer, NullRecognizer, TextRecognizer};

/// Challenge-handling errors
#[derive(Error, Debug)]
pub enum CaptchaError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Image decode error: {0}")]
    DecodeError(String),

    #[error("Recognition failed: {0}")]
    RecognitionFailed(String),
}

/// Cross-cutting challenge gate.
///
/// Returns `true` when no challenge is present or the handler believes it was
/// cleared, `false` when one was detected but not resolved. Implementations
/// never error; flow continues either way.
#[async_trait]
pub trait ChallengeGate: Send + Sync {
    async fn try_clear(&self, driver: &dyn PageDriver) -> bool;
}

/// Gate that never detects anything (tests, or challenge handling disabled).
pub struct NoChallenge;

#[async_trait]
impl ChallengeGate for NoChallenge {
    async fn try_clear(&self, _driver: &dyn PageDriver) -> bool {
        true
    }
}
