//! Pagination across successive result pages.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::browser::PageDriver;
use crate::captcha::ChallengeGate;
use crate::pacing::{Pace, Pacing};

use super::AdExtractor;

/// Next-page controls tried in order: fixed id, ARIA label, link text.
const NEXT_PAGE_STRATEGIES: [&str; 3] = [
    r#"
(() => {
    const next = document.getElementById('pnnext');
    if (!next) return false;
    next.click();
    return true;
})()
"#,
    r#"
(() => {
    const next = document.querySelector("a[aria-label='Next']");
    if (!next) return false;
    next.click();
    return true;
})()
"#,
    r#"
(() => {
    for (const a of document.querySelectorAll('a')) {
        const span = a.querySelector('span');
        if (span && span.textContent.trim() === 'Next') {
            a.click();
            return true;
        }
    }
    return false;
})()
"#,
];

/// Harvesting state for one keyword: current page counter and the
/// accumulated URL set. Created at keyword-loop start, dropped when the
/// keyword's harvesting completes.
#[derive(Debug)]
pub struct SearchSession {
    pub keyword: String,
    pub page: u32,
    pub urls: BTreeSet<String>,
}

impl SearchSession {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            page: 0,
            urls: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    Scrolling,
    Extracting,
    Advancing,
    Done,
}

/// Drives the [`AdExtractor`] across successive result pages until the page
/// cap is hit or no next-page control is found.
pub struct PaginationWalker<'a> {
    driver: &'a dyn PageDriver,
    extractor: &'a AdExtractor,
    gate: &'a dyn ChallengeGate,
    pacing: &'a dyn Pacing,
    max_pages: u32,
    scroll_batches: u32,
}

impl<'a> PaginationWalker<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        extractor: &'a AdExtractor,
        gate: &'a dyn ChallengeGate,
        pacing: &'a dyn Pacing,
        max_pages: u32,
        scroll_batches: u32,
    ) -> Self {
        Self {
            driver,
            extractor,
            gate,
            pacing,
            max_pages,
            scroll_batches,
        }
    }

    /// Walk pages for the session's keyword, accumulating sponsored URLs
    /// into the session. An empty page does not stop the walk; only the page
    /// cap or a missing next-page control does.
    pub async fn walk(&self, session: &mut SearchSession) {
        let mut state = WalkState::Scrolling;

        loop {
            state = match state {
                WalkState::Scrolling => {
                    self.scroll_for_ads().await;
                    WalkState::Extracting
                }
                WalkState::Extracting => {
                    let urls = self.extractor.extract(self.driver).await;
                    session.page += 1;
                    info!(
                        "'{}' page {}: {} sponsored URLs found",
                        session.keyword,
                        session.page,
                        urls.len()
                    );
                    session.urls.extend(urls);
                    WalkState::Advancing
                }
                WalkState::Advancing => {
                    if session.page >= self.max_pages {
                        WalkState::Done
                    } else if self.advance().await {
                        // a new page is a fresh chance for the server to
                        // interpose a challenge
                        self.gate.try_clear(self.driver).await;
                        WalkState::Scrolling
                    } else {
                        debug!("'{}': no next-page control found", session.keyword);
                        WalkState::Done
                    }
                }
                WalkState::Done => break,
            };
        }
    }

    /// Scroll the results page to the bottom in batches so lazy-loaded ad
    /// blocks render. Stops early once the document height is observed
    /// unchanged across two consecutive reads.
    async fn scroll_for_ads(&self) {
        let mut last_height = match self.driver.document_height().await {
            Ok(height) => height,
            Err(e) => {
                debug!("Could not read document height: {}", e);
                return;
            }
        };

        for _ in 0..self.scroll_batches {
            if let Err(e) = self.driver.scroll_to_bottom().await {
                debug!("Scroll failed: {}", e);
                return;
            }
            self.pacing.wait(Pace::ScrollPause).await;

            match self.driver.document_height().await {
                Ok(new_height) => {
                    if (new_height - last_height).abs() < f64::EPSILON {
                        break;
                    }
                    last_height = new_height;
                }
                Err(e) => {
                    debug!("Could not read document height: {}", e);
                    return;
                }
            }
        }
    }

    /// Try each next-page strategy in order; true when one clicked.
    async fn advance(&self) -> bool {
        for script in &NEXT_PAGE_STRATEGIES {
            match self.driver.eval(script).await {
                Ok(value) if value.as_bool() == Some(true) => {
                    self.pacing.wait(Pace::PageLoad).await;
                    return true;
                }
                Ok(_) => continue,
                Err(e) => {
                    debug!("Next-page strategy failed: {}", e);
                    continue;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::browser::testing::ScriptedDriver;
    use crate::captcha::NoChallenge;
    use crate::pacing::NoDelay;

    use super::*;

    fn walker<'a>(
        driver: &'a ScriptedDriver,
        extractor: &'a AdExtractor,
        max_pages: u32,
    ) -> PaginationWalker<'a> {
        PaginationWalker::new(driver, extractor, &NoChallenge, &NoDelay, max_pages, 3)
    }

    #[tokio::test]
    async fn walk_halts_at_the_page_cap_even_when_next_keeps_succeeding() {
        let driver = ScriptedDriver::new();
        driver.heights(vec![100.0]);
        driver.respond("pnnext", json!(true));
        driver.respond(
            "'tads'",
            json!({ "containers": 1, "hrefs": ["https://shop-a.example/landing"] }),
        );

        let extractor = AdExtractor::new("google.com");
        let mut session = SearchSession::new("blue widgets");
        walker(&driver, &extractor, 3).walk(&mut session).await;

        assert_eq!(session.page, 3);
        // exactly three extraction passes ran
        assert_eq!(driver.evals_matching("'tads'"), 3);
    }

    #[tokio::test]
    async fn scrolling_stops_once_the_height_plateaus() {
        let driver = ScriptedDriver::new();
        driver.heights(vec![100.0, 150.0, 150.0]);

        let extractor = AdExtractor::new("google.com");
        let mut session = SearchSession::new("kw");
        walker(&driver, &extractor, 1).walk(&mut session).await;

        assert_eq!(
            driver
                .scroll_bottom_calls
                .load(std::sync::atomic::Ordering::Relaxed),
            2
        );
    }

    #[tokio::test]
    async fn walk_stops_when_no_next_page_control_is_found() {
        let driver = ScriptedDriver::new();
        driver.heights(vec![100.0]);
        // no next-page strategy responds: all evaluate to null

        let extractor = AdExtractor::new("google.com");
        let mut session = SearchSession::new("kw");
        walker(&driver, &extractor, 5).walk(&mut session).await;

        assert_eq!(session.page, 1);
    }

    #[tokio::test]
    async fn empty_pages_do_not_short_circuit_the_walk() {
        let driver = ScriptedDriver::new();
        driver.heights(vec![100.0]);
        driver.respond("pnnext", json!(true));
        // no ad strategy matches anywhere

        let extractor = AdExtractor::new("google.com");
        let mut session = SearchSession::new("kw");
        walker(&driver, &extractor, 3).walk(&mut session).await;

        assert_eq!(session.page, 3);
        assert!(session.urls.is_empty());
    }

    #[tokio::test]
    async fn accumulated_urls_union_across_pages() {
        let driver = ScriptedDriver::new();
        driver.heights(vec![100.0]);
        driver.respond("pnnext", json!(true));
        driver.respond_seq(
            "'tads'",
            vec![
                json!({ "containers": 1, "hrefs": ["https://a.example/", "https://b.example/"] }),
                json!({ "containers": 1, "hrefs": ["https://b.example/", "https://c.example/"] }),
            ],
        );

        let extractor = AdExtractor::new("google.com");
        let mut session = SearchSession::new("kw");
        walker(&driver, &extractor, 2).walk(&mut session).await;

        assert_eq!(session.urls.len(), 3);
    }
}
