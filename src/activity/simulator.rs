//! Human-like activity on harvested URLs.
//!
//! Each unique URL is visited once and gets exactly one activity from a
//! fixed rotation. The rotation is deterministic by visit index, not random:
//! the same index always selects the same activity kind.

use std::sync::Arc;

use rand::Rng;
use serde_json::Value;
use tracing::{info, warn};

use crate::browser::PageDriver;
use crate::captcha::ChallengeGate;
use crate::pacing::{Pace, Pacing};
use crate::stats::RunStats;

use super::forms::FILL_FORM_SCRIPT;

/// One simulated interaction kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Scroll,
    Click,
    Dwell,
    Form,
}

impl std::fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActivityKind::Scroll => "scroll",
            ActivityKind::Click => "click",
            ActivityKind::Dwell => "dwell",
            ActivityKind::Form => "form",
        };
        f.write_str(name)
    }
}

/// Outcome of one visited URL. Append-only; one record per unique URL.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub url: String,
    pub kind: ActivityKind,
    pub outcomes: Vec<String>,
}

impl ActivityRecord {
    /// The activity column as persisted: outcome tags joined by commas.
    pub fn activity_column(&self) -> String {
        self.outcomes.join(", ")
    }
}

/// Pick a random clickable element, scroll it into view and click it.
const CLICK_RANDOM_SCRIPT: &str = r#"
(() => {
    const elements = Array.from(document.querySelectorAll(
        "a, button, input[type='button'], input[type='submit']"
    ));
    if (elements.length === 0) return { clicked: false, total: 0 };
    const el = elements[Math.floor(Math.random() * elements.length)];
    el.scrollIntoView({ block: 'center' });
    el.click();
    return { clicked: true, total: elements.length };
})()
"#;

/// Visits URLs and rotates through interaction behaviors.
pub struct ActivitySimulator<'a> {
    driver: &'a dyn PageDriver,
    gate: &'a dyn ChallengeGate,
    pacing: &'a dyn Pacing,
    rotation: Vec<ActivityKind>,
    stats: Arc<RunStats>,
}

impl<'a> ActivitySimulator<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        gate: &'a dyn ChallengeGate,
        pacing: &'a dyn Pacing,
        rotation: Vec<ActivityKind>,
        stats: Arc<RunStats>,
    ) -> Self {
        let rotation = if rotation.is_empty() {
            vec![ActivityKind::Scroll, ActivityKind::Click, ActivityKind::Dwell]
        } else {
            rotation
        };
        Self {
            driver,
            gate,
            pacing,
            rotation,
            stats,
        }
    }

    /// Visit each distinct URL once, preserving first-seen order, and emit
    /// one record per visit. Per-URL failures are recorded and the loop
    /// continues; this method never errors.
    pub async fn simulate(&self, urls: &[String]) -> Vec<ActivityRecord> {
        let unique = dedupe_preserving_order(urls);
        info!(
            "Visiting {} unique sponsored URLs with cookies + rotated activity",
            unique.len()
        );

        let mut records = Vec::with_capacity(unique.len());
        for (i, url) in unique.iter().enumerate() {
            let index = i + 1;
            // 1-based modulo, as the rotation has always been indexed
            let kind = self.rotation[index % self.rotation.len()];
            info!("({}/{}) {} -> {}", index, unique.len(), url, kind);

            self.stats.record_visit();
            let outcomes = self.visit(url, kind).await;
            records.push(ActivityRecord {
                url: url.clone(),
                kind,
                outcomes,
            });
        }
        records
    }

    async fn visit(&self, url: &str, kind: ActivityKind) -> Vec<String> {
        let mut outcomes = Vec::new();

        if let Err(e) = self.driver.navigate(url).await {
            warn!("Visit failed: {} | {}", url, e);
            self.stats.record_visit_failure();
            outcomes.push("visit failed".to_string());
            return outcomes;
        }

        self.gate.try_clear(self.driver).await;
        self.pacing.wait(Pace::Settle).await;
        self.set_fake_cookies().await;
        self.perform(kind, &mut outcomes).await;

        outcomes
    }

    /// Add a couple of benign cookies to the current domain. Best-effort; a
    /// failure is logged and the visit carries on.
    async fn set_fake_cookies(&self) {
        let session_id = rand::thread_rng().gen_range(100_000..=999_999).to_string();
        for (name, value) in [
            ("session_id", session_id.as_str()),
            ("visited_before", "true"),
        ] {
            if let Err(e) = self.driver.set_cookie(name, value).await {
                warn!("Failed to set cookie {}: {}", name, e);
                return;
            }
        }
    }

    async fn perform(&self, kind: ActivityKind, outcomes: &mut Vec<String>) {
        match kind {
            ActivityKind::Scroll => {
                let scrolled = async {
                    self.driver.scroll_to_bottom().await?;
                    self.pacing.wait(Pace::PreAction).await;
                    self.driver.scroll_to_top().await
                }
                .await;
                match scrolled {
                    Ok(()) => outcomes.push("scrolled".to_string()),
                    Err(e) => {
                        warn!("Scroll activity failed: {}", e);
                        outcomes.push("scroll failed".to_string());
                    }
                }
            }
            ActivityKind::Click => {
                self.pacing.wait(Pace::PreAction).await;
                match self.driver.eval(CLICK_RANDOM_SCRIPT).await {
                    Ok(value) if value.get("clicked").and_then(Value::as_bool) == Some(true) => {
                        outcomes.push("clicked element".to_string());
                    }
                    Ok(_) => outcomes.push("no elements to click".to_string()),
                    Err(e) => {
                        // an intercepted or stale click is an outcome, not an abort
                        warn!("Click activity failed: {}", e);
                        outcomes.push("click failed".to_string());
                    }
                }
            }
            ActivityKind::Dwell => {
                let waited = self.pacing.wait(Pace::Dwell).await;
                outcomes.push(format!("dwelled {:.1}s", waited.as_secs_f64()));
            }
            ActivityKind::Form => {
                self.pacing.wait(Pace::PreAction).await;
                match self.driver.eval(FILL_FORM_SCRIPT).await {
                    Ok(value) => {
                        let found = value.get("found").and_then(Value::as_bool) == Some(true);
                        let submitted =
                            value.get("submitted").and_then(Value::as_bool) == Some(true);
                        let tag = if !found {
                            "form not found"
                        } else if submitted {
                            "form submitted"
                        } else {
                            "form found, not submitted"
                        };
                        outcomes.push(tag.to_string());
                    }
                    Err(e) => {
                        warn!("Form activity failed: {}", e);
                        outcomes.push("form fill failed".to_string());
                    }
                }
            }
        }
    }
}

/// First-seen-order deduplication.
fn dedupe_preserving_order(urls: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();
    for url in urls {
        if seen.insert(url.as_str()) {
            unique.push(url.clone());
        }
    }
    unique
}
