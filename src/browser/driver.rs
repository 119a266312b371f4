//! Page-driver capability seam.
//!
//! Everything the pipeline needs from a controllable browser page is behind
//! this trait, so the harvesting and activity components can be exercised in
//! tests without a real Chrome process.

use async_trait::async_trait;
use serde_json::Value;

use super::BrowserError;

/// A controllable browser page.
///
/// DOM lookups run as JavaScript through [`eval`](PageDriver::eval) and
/// return JSON, the way the production session drives Chrome over CDP.
/// The remaining methods cover the operations the pipeline performs between
/// evaluations: navigation, scrolling, height probing and cookie writes.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate the page to `url` and wait for the load to settle.
    async fn navigate(&self, url: &str) -> Result<(), BrowserError>;

    /// URL the page is currently on.
    async fn current_url(&self) -> Result<String, BrowserError>;

    /// Evaluate a JavaScript expression and return its JSON value.
    async fn eval(&self, script: &str) -> Result<Value, BrowserError>;

    /// Scroll to the bottom of the document.
    async fn scroll_to_bottom(&self) -> Result<(), BrowserError>;

    /// Scroll back to the top of the document.
    async fn scroll_to_top(&self) -> Result<(), BrowserError>;

    /// Current document height in pixels.
    async fn document_height(&self) -> Result<f64, BrowserError>;

    /// Set a cookie on the current page's domain.
    async fn set_cookie(&self, name: &str, value: &str) -> Result<(), BrowserError>;
}
