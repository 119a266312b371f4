//! Pipeline orchestration.
//!
//! One browser session drives one sequential control flow: keyword loop ->
//! pagination loop -> activity loop. A single item's failure never aborts
//! the whole run; the session is released on every exit path.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use crate::activity::{ActivitySimulator, FormScanner};
use crate::browser::{BrowserSession, BrowserSessionConfig, PageDriver};
use crate::captcha::{CaptchaInterrupt, HttpOcrRecognizer, NullRecognizer, TextRecognizer};
use crate::harvest::{AdExtractor, PaginationWalker, SearchSession};
use crate::pacing::{HumanPacing, Pace, Pacing};
use crate::proxy::ProxyEndpoint;
use crate::report;
use crate::stats::{RunStats, RunSummary};
use crate::AppConfig;

/// Accept regional consent dialogs that would otherwise cover the results.
const DISMISS_CONSENT_SCRIPT: &str = r#"
(() => {
    const labels = ['I agree', 'Accept all'];
    for (const button of document.querySelectorAll('button')) {
        const text = (button.textContent || '').trim();
        if (labels.some((l) => text.includes(l))) {
            button.click();
            return true;
        }
    }
    return false;
})()
"#;

/// The assembled pipeline: configuration, pacing, challenge gate and run
/// counters threaded through every component call.
pub struct Pipeline {
    config: AppConfig,
    stats: Arc<RunStats>,
    gate: CaptchaInterrupt,
    pacing: HumanPacing,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Result<Self> {
        let stats = Arc::new(RunStats::new());

        let recognizer: Arc<dyn TextRecognizer> = match &config.ocr_endpoint {
            Some(endpoint) => {
                info!("Image challenges go to OCR endpoint {}", endpoint);
                Arc::new(HttpOcrRecognizer::new(endpoint, &config.ocr_api_key)?)
            }
            None => Arc::new(NullRecognizer),
        };
        let gate = CaptchaInterrupt::new(recognizer, stats.clone())?;
        let pacing = HumanPacing::new(&config);

        Ok(Self {
            config,
            stats,
            gate,
            pacing,
        })
    }

    pub fn stats(&self) -> Arc<RunStats> {
        self.stats.clone()
    }

    fn session_config(&self) -> Result<BrowserSessionConfig> {
        let proxy = match &self.config.proxy {
            Some(raw) => Some(ProxyEndpoint::parse(raw)?),
            None => None,
        };

        Ok(BrowserSessionConfig::default()
            .headless(self.config.headless)
            .chrome_path(self.config.chrome_path.clone())
            .user_data_dir(self.config.user_data_dir.clone())
            .proxy(proxy))
    }

    /// Run the full harvest: collect sponsored URLs per keyword, persist
    /// them, then visit everything with rotated activity.
    pub async fn run_harvest(&self) -> Result<RunSummary> {
        let keywords = report::read_keywords(Path::new(&self.config.keywords_csv))?;
        if keywords.is_empty() {
            bail!("No keywords to process");
        }

        let extractor = AdExtractor::new(self.config.engine_domain.clone());
        let mut results: Vec<(String, BTreeSet<String>)> = Vec::new();

        if self.config.session_per_keyword {
            for keyword in &keywords {
                self.stats.record_keyword();
                let session = match BrowserSession::launch(self.session_config()?).await {
                    Ok(session) => session,
                    Err(e) => {
                        error!("Could not open a session for '{}': {}", keyword, e);
                        self.stats.record_keyword_failure();
                        continue;
                    }
                };

                let outcome = self.harvest_keyword(&session, &extractor, keyword).await;
                let _ = session.close().await;

                match outcome {
                    Ok(urls) => results.push((keyword.clone(), urls)),
                    Err(e) => {
                        warn!("Error with keyword '{}': {}", keyword, e);
                        self.stats.record_keyword_failure();
                    }
                }
                self.pacing.wait(Pace::BetweenKeywords).await;
            }

            let session = BrowserSession::launch(self.session_config()?).await?;
            let outcome = self.finish_harvest(&session, results).await;
            let _ = session.close().await;
            outcome
        } else {
            let session = BrowserSession::launch(self.session_config()?).await?;
            let outcome = async {
                for keyword in &keywords {
                    self.stats.record_keyword();
                    info!("Scraping sponsored ads for: {}", keyword);
                    match self.harvest_keyword(&session, &extractor, keyword).await {
                        Ok(urls) => {
                            info!("'{}': {} unique sponsored URLs", keyword, urls.len());
                            results.push((keyword.clone(), urls));
                        }
                        Err(e) => {
                            warn!("Error with keyword '{}': {}", keyword, e);
                            self.stats.record_keyword_failure();
                        }
                    }
                    self.pacing.wait(Pace::BetweenKeywords).await;
                }
                self.finish_harvest(&session, results).await
            }
            .await;
            let _ = session.close().await;
            outcome
        }
    }

    /// Harvest one keyword: open the results page, clear challenges, dismiss
    /// consent, then walk the pages.
    async fn harvest_keyword(
        &self,
        driver: &dyn PageDriver,
        extractor: &AdExtractor,
        keyword: &str,
    ) -> Result<BTreeSet<String>> {
        driver.navigate(&self.config.search_url(keyword)).await?;
        self.gate.try_clear(driver).await;
        self.dismiss_consent(driver).await;

        let mut search = SearchSession::new(keyword);
        let walker = PaginationWalker::new(
            driver,
            extractor,
            &self.gate,
            &self.pacing,
            self.config.max_pages_per_keyword,
            self.config.serp_scroll_batches,
        );
        walker.walk(&mut search).await;

        self.stats.record_pages(search.page as u64);
        self.stats.record_urls(search.urls.len() as u64);
        Ok(search.urls)
    }

    async fn dismiss_consent(&self, driver: &dyn PageDriver) {
        match driver.eval(DISMISS_CONSENT_SCRIPT).await {
            Ok(value) if value.as_bool() == Some(true) => {
                info!("Clicked consent button");
                self.pacing.wait(Pace::PageLoad).await;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Consent dismissal failed: {}", e);
            }
        }
    }

    /// Persist harvested URLs, then run the activity phase over them.
    ///
    /// A write failure for the sponsored results aborts the run (the data
    /// would otherwise be silently lost); a write failure for the activity
    /// log does not undo already-completed visits.
    async fn finish_harvest(
        &self,
        driver: &dyn PageDriver,
        results: Vec<(String, BTreeSet<String>)>,
    ) -> Result<RunSummary> {
        report::write_sponsored_results(
            Path::new(&self.config.sponsored_results_csv),
            &results,
        )
        .context("Sponsored results could not be persisted")?;

        let all_urls: Vec<String> = results
            .iter()
            .flat_map(|(_, urls)| urls.iter().cloned())
            .collect();

        let simulator = ActivitySimulator::new(
            driver,
            &self.gate,
            &self.pacing,
            self.config.activity_rotation.clone(),
            self.stats.clone(),
        );
        let records = simulator.simulate(&all_urls).await;

        if let Err(e) =
            report::write_activity_log(Path::new(&self.config.activity_log_csv), &records)
        {
            error!("Activity log not persisted (visits already done): {}", e);
        }

        let summary = self.stats.snapshot();
        info!("Harvest finished: {}", summary);
        Ok(summary)
    }

    /// Scan a URL list for lead-generation contact forms.
    pub async fn run_form_scan(&self) -> Result<RunSummary> {
        let urls = report::read_urls(Path::new(&self.config.urls_csv))?;
        if urls.is_empty() {
            bail!("No URLs to check");
        }

        let session = BrowserSession::launch(self.session_config()?).await?;
        let outcome = async {
            let scanner =
                FormScanner::new(&session, &self.gate, &self.pacing, self.stats.clone());
            let pages = scanner.scan(&urls).await;

            report::write_form_pages(Path::new(&self.config.form_pages_csv), &pages)
                .context("Form pages could not be persisted")?;

            let summary = self.stats.snapshot();
            info!("Form scan finished: {}", summary);
            Ok(summary)
        }
        .await;
        let _ = session.close().await;
        outcome
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::browser::testing::ScriptedDriver;

    use super::*;

    fn pipeline() -> Pipeline {
        let mut config = AppConfig::default();
        // zero every pacing range so tests do not sleep
        config.scroll_pause_min_ms = 0;
        config.scroll_pause_max_ms = 0;
        config.settle_min_ms = 0;
        config.settle_max_ms = 0;
        config.dwell_min_secs = 0;
        config.dwell_max_secs = 0;
        Pipeline::new(config).unwrap()
    }

    #[tokio::test]
    async fn harvest_keyword_collects_urls_from_the_results_page() {
        let driver = ScriptedDriver::new();
        driver.heights(vec![100.0]);
        driver.respond(
            "'tads'",
            json!({ "containers": 1, "hrefs": [
                "https://shop-a.example/landing",
                "https://www.google.com/aclk",
            ] }),
        );

        let pipeline = pipeline();
        let extractor = AdExtractor::new("google.com");
        let urls = pipeline
            .harvest_keyword(&driver, &extractor, "blue widgets")
            .await
            .unwrap();

        assert_eq!(
            urls.into_iter().collect::<Vec<_>>(),
            vec!["https://shop-a.example/landing".to_string()]
        );
        // the search URL was opened first
        assert_eq!(
            driver.navigations.lock().unwrap()[0],
            "https://www.google.com/search?q=blue%20widgets"
        );
        assert_eq!(pipeline.stats().snapshot().urls_collected, 1);
    }

    #[tokio::test]
    async fn harvest_keyword_propagates_navigation_failure() {
        let driver = ScriptedDriver::new();
        driver.fail_navigation("https://www.google.com/search?q=kw");

        let pipeline = pipeline();
        let extractor = AdExtractor::new("google.com");
        assert!(pipeline
            .harvest_keyword(&driver, &extractor, "kw")
            .await
            .is_err());
    }
}
