//! Sponsored-result extraction from a rendered results page.
//!
//! Container location is an ordered fallback chain, each tier a single
//! JavaScript query evaluated on the live page. The first tier that matches
//! at least one container wins; "not found" is a normal outcome, never an
//! exception.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::debug;

use crate::browser::PageDriver;

/// One container-location strategy. The script reports how many containers
/// matched alongside every anchor href found inside them.
pub struct AdStrategy {
    pub name: &'static str,
    pub script: &'static str,
}

/// Tier 1: known fixed container ids used for top/bottom ad blocks.
const BY_KNOWN_IDS: AdStrategy = AdStrategy {
    name: "known-ids",
    script: r#"
(() => {
    const containers = ['tads', 'bottomads']
        .map((id) => document.getElementById(id))
        .filter(Boolean);
    const hrefs = [];
    for (const c of containers) {
        for (const a of c.querySelectorAll('a[href]')) hrefs.push(a.href);
    }
    return { containers: containers.length, hrefs };
})()
"#,
};

/// Tier 2: ARIA-labelled ad regions.
const BY_ARIA_LABEL: AdStrategy = AdStrategy {
    name: "aria-label",
    script: r#"
(() => {
    const containers = Array.from(document.querySelectorAll("div[aria-label='Ads']"));
    const hrefs = [];
    for (const c of containers) {
        for (const a of c.querySelectorAll('a[href]')) hrefs.push(a.href);
    }
    return { containers: containers.length, hrefs };
})()
"#,
};

/// Tier 3: class-name substring heuristics.
const BY_CLASS_HEURISTIC: AdStrategy = AdStrategy {
    name: "class-heuristic",
    script: r#"
(() => {
    const containers = Array.from(document.querySelectorAll("div[class*='ads'], div[class*='ad']"));
    const hrefs = [];
    for (const c of containers) {
        for (const a of c.querySelectorAll('a[href]')) hrefs.push(a.href);
    }
    return { containers: containers.length, hrefs };
})()
"#,
};

/// Tier 4, last resort: elements whose text is exactly the ad label, walked
/// up to the nearest ancestor block.
const BY_LABEL_TEXT: AdStrategy = AdStrategy {
    name: "label-text",
    script: r#"
(() => {
    const labels = Array.from(document.querySelectorAll('span, div')).filter((el) => {
        const text = (el.textContent || '').trim();
        return text === 'Sponsored' || text === 'Ad' || text === 'Ads';
    });
    const blocks = [];
    for (const label of labels) {
        const block = label.closest('div');
        if (block && !blocks.includes(block)) blocks.push(block);
    }
    const hrefs = [];
    for (const b of blocks) {
        for (const a of b.querySelectorAll('a[href]')) hrefs.push(a.href);
    }
    return { containers: blocks.length, hrefs };
})()
"#,
};

const STRATEGIES: [AdStrategy; 4] = [
    BY_KNOWN_IDS,
    BY_ARIA_LABEL,
    BY_CLASS_HEURISTIC,
    BY_LABEL_TEXT,
];

/// Extracts outbound sponsored URLs from the current page.
pub struct AdExtractor {
    engine_domain: String,
}

impl AdExtractor {
    pub fn new(engine_domain: impl Into<String>) -> Self {
        Self {
            engine_domain: engine_domain.into(),
        }
    }

    /// Run the strategy chain and return the deduplicated outbound URLs.
    ///
    /// A strategy that errors counts as "no match" and falls through to the
    /// next tier. Returns an empty set when nothing matches; never errors.
    pub async fn extract(&self, driver: &dyn PageDriver) -> BTreeSet<String> {
        for strategy in &STRATEGIES {
            let value = match driver.eval(strategy.script).await {
                Ok(value) => value,
                Err(e) => {
                    debug!("Ad strategy '{}' failed: {}", strategy.name, e);
                    continue;
                }
            };

            let containers = value
                .get("containers")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if containers == 0 {
                continue;
            }

            let urls: BTreeSet<String> = value
                .get("hrefs")
                .and_then(Value::as_array)
                .map(|hrefs| {
                    hrefs
                        .iter()
                        .filter_map(Value::as_str)
                        .filter(|href| self.keeps(href))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();

            debug!(
                "Ad strategy '{}' matched {} containers, {} outbound URLs",
                strategy.name,
                containers,
                urls.len()
            );
            return urls;
        }

        BTreeSet::new()
    }

    /// Keep only outbound links: anything on the engine's own host (or a
    /// subdomain of it), and anything unparseable, is dropped.
    fn keeps(&self, href: &str) -> bool {
        let Ok(url) = url::Url::parse(href) else {
            return false;
        };
        let Some(host) = url.host_str() else {
            return false;
        };
        host != self.engine_domain && !host.ends_with(&format!(".{}", self.engine_domain))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::browser::testing::ScriptedDriver;

    use super::*;

    #[tokio::test]
    async fn first_matching_strategy_short_circuits_the_chain() {
        let driver = ScriptedDriver::new();
        driver.respond("getElementById", json!({ "containers": 0, "hrefs": [] }));
        driver.respond("aria-label='Ads'", json!({ "containers": 0, "hrefs": [] }));
        driver.respond(
            "class*='ads'",
            json!({ "containers": 1, "hrefs": ["https://shop.example/landing"] }),
        );

        let extractor = AdExtractor::new("google.com");
        let urls = extractor.extract(&driver).await;

        assert_eq!(urls.len(), 1);
        // the fallback tier behind the match is never queried
        assert_eq!(driver.evals_matching("Sponsored"), 0);
        assert_eq!(driver.eval_count(), 3);
    }

    #[tokio::test]
    async fn engine_host_links_are_dropped() {
        let driver = ScriptedDriver::new();
        driver.respond(
            "getElementById",
            json!({ "containers": 2, "hrefs": [
                "https://www.google.com/aclk?sa=x",
                "https://google.com/search?q=again",
                "https://ads.google.com/home",
                "https://shop-a.example/landing",
                "https://notgoogle.com/page",
                "/relative/path",
            ] }),
        );

        let extractor = AdExtractor::new("google.com");
        let urls = extractor.extract(&driver).await;

        assert_eq!(
            urls.into_iter().collect::<Vec<_>>(),
            vec![
                "https://notgoogle.com/page".to_string(),
                "https://shop-a.example/landing".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn a_failing_strategy_falls_through_to_the_next_tier() {
        let driver = ScriptedDriver::new();
        driver.respond_err("getElementById");
        driver.respond(
            "aria-label='Ads'",
            json!({ "containers": 1, "hrefs": ["https://shop-b.example/"] }),
        );

        let extractor = AdExtractor::new("google.com");
        let urls = extractor.extract(&driver).await;

        assert_eq!(urls.len(), 1);
    }

    #[tokio::test]
    async fn no_match_anywhere_returns_an_empty_set() {
        let driver = ScriptedDriver::new();

        let extractor = AdExtractor::new("google.com");
        let urls = extractor.extract(&driver).await;

        assert!(urls.is_empty());
        // every tier was tried
        assert_eq!(driver.eval_count(), 4);
    }

    #[tokio::test]
    async fn a_matching_container_with_only_engine_links_still_wins_the_chain() {
        let driver = ScriptedDriver::new();
        driver.respond(
            "getElementById",
            json!({ "containers": 1, "hrefs": ["https://www.google.com/aclk"] }),
        );

        let extractor = AdExtractor::new("google.com");
        let urls = extractor.extract(&driver).await;

        assert!(urls.is_empty());
        assert_eq!(driver.eval_count(), 1);
    }
}
