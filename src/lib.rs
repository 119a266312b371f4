//! serp-harvester
//!
//! A keyword-driven crawl pipeline: search keywords, harvest sponsored-result
//! URLs from the rendered results pages, then visit the collected URLs while
//! simulating human browsing activity. Results are persisted to flat CSV files.

pub mod activity;
pub mod browser;
pub mod captcha;
pub mod harvest;
pub mod pacing;
pub mod pipeline;
pub mod proxy;
pub mod report;
pub mod stats;

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use activity::ActivityKind;

/// Application configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// Search engine host; links back to this domain are never harvested
    #[serde(default = "default_engine_domain")]
    pub engine_domain: String,

    /// Safety cap for pagination depth per keyword
    pub max_pages_per_keyword: u32,
    /// How many times to scroll the results page to load lazy content
    pub serp_scroll_batches: u32,

    /// Pause between result-page scrolls (milliseconds)
    pub scroll_pause_min_ms: u64,
    pub scroll_pause_max_ms: u64,
    /// Settle wait after navigating to a harvested URL (milliseconds)
    pub settle_min_ms: u64,
    pub settle_max_ms: u64,
    /// Dwell activity bounds (seconds)
    pub dwell_min_secs: u64,
    pub dwell_max_secs: u64,

    /// Ordered activity list cycled per visited URL
    pub activity_rotation: Vec<ActivityKind>,

    /// Browser session configuration
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub user_data_dir: Option<String>,
    /// Proxy endpoint, `host:port:user:pass` or URL form; bound at session creation
    pub proxy: Option<String>,
    /// Launch a fresh browser session (and profile) for every keyword
    #[serde(default)]
    pub session_per_keyword: bool,

    /// External OCR endpoint for image challenges (absent = no recognition)
    #[serde(default)]
    pub ocr_endpoint: Option<String>,
    #[serde(default)]
    pub ocr_api_key: String,

    /// Input/output file paths
    pub keywords_csv: String,
    pub sponsored_results_csv: String,
    pub activity_log_csv: String,
    pub urls_csv: String,
    pub form_pages_csv: String,
}

fn default_engine_domain() -> String {
    "google.com".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine_domain: default_engine_domain(),
            max_pages_per_keyword: 5,
            serp_scroll_batches: 3,
            scroll_pause_min_ms: 1000,
            scroll_pause_max_ms: 2000,
            settle_min_ms: 2000,
            settle_max_ms: 4000,
            dwell_min_secs: 4,
            dwell_max_secs: 10,
            activity_rotation: vec![
                ActivityKind::Scroll,
                ActivityKind::Click,
                ActivityKind::Dwell,
            ],
            headless: false,
            chrome_path: None,
            user_data_dir: None,
            proxy: None,
            session_per_keyword: false,
            ocr_endpoint: None,
            ocr_api_key: String::new(),
            keywords_csv: "keywords.csv".to_string(),
            sponsored_results_csv: "sponsored_results.csv".to_string(),
            activity_log_csv: "activity_log.csv".to_string(),
            urls_csv: "urls.csv".to_string(),
            form_pages_csv: "form_pages.csv".to_string(),
        }
    }
}

impl AppConfig {
    /// Load config from a JSON file, falling back to defaults when the file
    /// is missing or unreadable.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => {
                        info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        warn!("Failed to parse config file: {}", e);
                    }
                },
                Err(e) => {
                    warn!("Failed to read config file: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Save config to a JSON file (best-effort).
    pub fn save(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    error!("Failed to create config directory: {}", e);
                    return;
                }
            }
        }

        match serde_json::to_string_pretty(self) {
            Ok(content) => {
                if let Err(e) = std::fs::write(path, content) {
                    error!("Failed to save config: {}", e);
                } else {
                    info!("Config saved to {:?}", path);
                }
            }
            Err(e) => {
                error!("Failed to serialize config: {}", e);
            }
        }
    }

    /// Build the search-results URL for a query, percent-encoded.
    pub fn search_url(&self, query: &str) -> String {
        format!(
            "https://www.{}/search?q={}",
            self.engine_domain,
            urlencoding::encode(query)
        )
    }
}

/// Get log directory path (shared across modules)
pub fn log_dir() -> PathBuf {
    PathBuf::from("logs")
}

/// Initialize logging: console layer filtered by `RUST_LOG` (default INFO)
/// plus a daily-rolling file layer under `logs/`.
pub fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    let log_dir = log_dir();
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "serp-harvester.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .init();

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_json() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_pages_per_keyword, 5);
        assert_eq!(back.activity_rotation, config.activity_rotation);
        assert_eq!(back.engine_domain, "google.com");
    }

    #[test]
    fn search_url_percent_encodes_the_query() {
        let config = AppConfig::default();
        let url = config.search_url("plumber near me");
        assert_eq!(url, "https://www.google.com/search?q=plumber%20near%20me");
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/config.json"));
        assert_eq!(config.serp_scroll_batches, 3);
    }
}
