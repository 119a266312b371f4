//! Lock-free run statistics using atomic operations.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one pipeline run
#[derive(Debug, Default)]
pub struct RunStats {
    pub keywords_total: AtomicU64,
    pub keywords_failed: AtomicU64,
    pub pages_walked: AtomicU64,
    pub urls_collected: AtomicU64,
    pub visits: AtomicU64,
    pub visit_failures: AtomicU64,
    pub challenges_detected: AtomicU64,
    pub challenges_cleared: AtomicU64,
    pub forms_found: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_keyword(&self) {
        self.keywords_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_keyword_failure(&self) {
        self.keywords_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pages(&self, count: u64) {
        self.pages_walked.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_urls(&self, count: u64) {
        self.urls_collected.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_visit(&self) {
        self.visits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_visit_failure(&self) {
        self.visit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_challenge_detected(&self) {
        self.challenges_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_challenge_cleared(&self) {
        self.challenges_cleared.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_form_found(&self) {
        self.forms_found.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot for reporting
    pub fn snapshot(&self) -> RunSummary {
        RunSummary {
            keywords_total: self.keywords_total.load(Ordering::Relaxed),
            keywords_failed: self.keywords_failed.load(Ordering::Relaxed),
            pages_walked: self.pages_walked.load(Ordering::Relaxed),
            urls_collected: self.urls_collected.load(Ordering::Relaxed),
            visits: self.visits.load(Ordering::Relaxed),
            visit_failures: self.visit_failures.load(Ordering::Relaxed),
            challenges_detected: self.challenges_detected.load(Ordering::Relaxed),
            challenges_cleared: self.challenges_cleared.load(Ordering::Relaxed),
            forms_found: self.forms_found.load(Ordering::Relaxed),
        }
    }
}

/// Serializable snapshot of a run
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub keywords_total: u64,
    pub keywords_failed: u64,
    pub pages_walked: u64,
    pub urls_collected: u64,
    pub visits: u64,
    pub visit_failures: u64,
    pub challenges_detected: u64,
    pub challenges_cleared: u64,
    pub forms_found: u64,
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} keywords ok, {} pages, {} URLs, {}/{} visits ok, {}/{} challenges cleared",
            self.keywords_total - self.keywords_failed,
            self.keywords_total,
            self.pages_walked,
            self.urls_collected,
            self.visits - self.visit_failures,
            self.visits,
            self.challenges_cleared,
            self.challenges_detected,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_into_the_snapshot() {
        let stats = RunStats::new();
        stats.record_keyword();
        stats.record_keyword();
        stats.record_keyword_failure();
        stats.record_pages(3);
        stats.record_urls(7);
        stats.record_visit();
        stats.record_visit_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.keywords_total, 2);
        assert_eq!(snapshot.keywords_failed, 1);
        assert_eq!(snapshot.pages_walked, 3);
        assert_eq!(snapshot.urls_collected, 7);
        assert_eq!(snapshot.visits, 1);
        assert_eq!(snapshot.visit_failures, 1);
    }

    #[test]
    fn summary_renders_success_ratios() {
        let stats = RunStats::new();
        stats.record_keyword();
        let text = stats.snapshot().to_string();
        assert!(text.contains("1/1 keywords ok"));
    }
}
