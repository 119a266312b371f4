//! Browser session management
//!
//! Handles launching and controlling a Chrome/Chromium instance over CDP and
//! exposes it to the pipeline through the [`PageDriver`] trait.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig, HeadlessMode};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetCookiesParams};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::proxy::ProxyEndpoint;

use super::{BrowserError, PageDriver};

/// Find a Chrome/Chromium executable on the system
fn find_chrome() -> Option<PathBuf> {
    let candidates: Vec<PathBuf> = if cfg!(target_os = "windows") {
        let mut paths = vec![
            PathBuf::from(r"C:\Program Files\Google\Chrome\Application\chrome.exe"),
            PathBuf::from(r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe"),
        ];
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            paths.push(PathBuf::from(format!(
                r"{}\Google\Chrome\Application\chrome.exe",
                local
            )));
        }
        paths
    } else if cfg!(target_os = "macos") {
        vec![PathBuf::from(
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        )]
    } else {
        vec![
            PathBuf::from("/usr/bin/google-chrome"),
            PathBuf::from("/usr/bin/google-chrome-stable"),
            PathBuf::from("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium-browser"),
        ]
    };

    candidates.into_iter().find(|p| p.exists())
}

/// Configuration for a browser session
#[derive(Debug, Clone)]
pub struct BrowserSessionConfig {
    /// Path to Chrome/Chromium executable
    pub chrome_path: Option<String>,
    /// Run in headless mode
    pub headless: bool,
    /// User data directory; a per-session temp dir is created when unset
    pub user_data_dir: Option<String>,
    /// Proxy endpoint bound at launch
    pub proxy: Option<ProxyEndpoint>,
    /// Per-operation timeout in seconds
    pub timeout_secs: u64,
    /// Window width
    pub window_width: u32,
    /// Window height
    pub window_height: u32,
}

impl Default for BrowserSessionConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: false,
            user_data_dir: None,
            proxy: None,
            timeout_secs: 60,
            window_width: 1920,
            window_height: 1080,
        }
    }
}

impl BrowserSessionConfig {
    /// Set headless mode
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set proxy endpoint
    pub fn proxy(mut self, proxy: Option<ProxyEndpoint>) -> Self {
        self.proxy = proxy;
        self
    }

    /// Set Chrome path
    pub fn chrome_path(mut self, path: Option<String>) -> Self {
        self.chrome_path = path;
        self
    }

    /// Set user data directory
    pub fn user_data_dir(mut self, dir: Option<String>) -> Self {
        self.user_data_dir = dir;
        self
    }

    /// Resolve the profile directory, creating a unique one when unset.
    fn resolve_user_data_dir(&self) -> PathBuf {
        match &self.user_data_dir {
            Some(dir) => PathBuf::from(dir),
            None => std::env::temp_dir()
                .join("serp-harvester")
                .join("browser_data")
                .join(uuid::Uuid::new_v4().to_string()),
        }
    }
}

/// A browser session for automation
pub struct BrowserSession {
    /// Unique session ID
    pub id: String,
    /// The browser instance
    browser: Arc<RwLock<Option<Browser>>>,
    /// Current active page
    page: Arc<RwLock<Option<Page>>>,
    /// Whether session is alive
    alive: Arc<AtomicBool>,
    /// Session configuration
    config: BrowserSessionConfig,
}

impl BrowserSession {
    /// Launch a new browser session with the given config
    pub async fn launch(config: BrowserSessionConfig) -> Result<Self, BrowserError> {
        let session_id = format!("session-{}", uuid::Uuid::new_v4());

        info!(
            "Launching browser session {} (headless: {})",
            session_id, config.headless
        );

        if config.chrome_path.is_none() && find_chrome().is_none() {
            return Err(BrowserError::LaunchFailed(
                "Chrome/Chromium not found on this system".to_string(),
            ));
        }

        let mut builder = BrowserConfig::builder();

        if config.headless {
            builder = builder.headless_mode(HeadlessMode::True);
        } else {
            builder = builder.with_head();
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        } else if let Some(chrome_path) = find_chrome() {
            debug!("Auto-detected Chrome at: {}", chrome_path.display());
            builder = builder.chrome_executable(chrome_path);
        }

        let user_data_dir = config.resolve_user_data_dir();
        std::fs::create_dir_all(&user_data_dir)?;
        builder = builder.user_data_dir(&user_data_dir);

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-default-browser-check")
            .arg("--disable-notifications")
            .arg("--disable-session-crashed-bubble")
            .arg("--ignore-certificate-errors")
            // Required when running as root (e.g., in Docker or on a VPS)
            .arg("--no-sandbox");

        if let Some(ref proxy) = config.proxy {
            let server = proxy.chrome_arg();
            info!("Session {} using proxy server: {}", session_id, server);
            if proxy.has_credentials() {
                // Modern Chrome ignores inline credentials in --proxy-server;
                // an authenticating forwarder has to sit in front of it.
                warn!(
                    "Proxy credentials present for {} but Chrome takes no inline auth",
                    proxy.host
                );
            }
            builder = builder.arg(format!("--proxy-server={}", server));
        }

        builder = builder.window_size(config.window_width, config.window_height);

        let browser_config = builder
            .build()
            .map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // Drain CDP events in the background; when the handler ends, Chrome
        // has disconnected or crashed.
        let session_id_clone = session_id.clone();
        let alive_flag = Arc::new(AtomicBool::new(true));
        let alive_for_handler = alive_flag.clone();
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Session {} browser event: {:?}", session_id_clone, event);
            }
            warn!(
                "Session {} Chrome disconnected (event handler ended)",
                session_id_clone
            );
            alive_for_handler.store(false, Ordering::Relaxed);
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        info!("Browser session {} created", session_id);

        Ok(Self {
            id: session_id,
            browser: Arc::new(RwLock::new(Some(browser))),
            page: Arc::new(RwLock::new(Some(page))),
            alive: alive_flag,
            config,
        })
    }

    /// Check if the session is alive
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Close the browser session: graceful close first, then force kill so
    /// no Chrome child processes are left behind.
    pub async fn close(&self) -> Result<(), BrowserError> {
        self.alive.store(false, Ordering::Relaxed);

        {
            let mut page = self.page.write().await;
            if let Some(p) = page.take() {
                let _ = p.close().await;
            }
        }

        {
            let mut browser = self.browser.write().await;
            if let Some(mut b) = browser.take() {
                let _ = b.close().await;
                tokio::time::sleep(Duration::from_millis(500)).await;
                let _ = b.kill().await;
            }
        }

        info!("Browser session {} closed", self.id);
        Ok(())
    }

    /// Evaluate JavaScript on the page with the session timeout applied.
    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or_else(|| BrowserError::ConnectionLost("No active page".into()))?;

        let result = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            page.evaluate(script),
        )
        .await
        .map_err(|_| {
            BrowserError::Timeout(format!(
                "JavaScript execution timed out after {}s",
                self.config.timeout_secs
            ))
        })?
        .map_err(|e| BrowserError::JavaScriptError(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(Value::Null))
    }
}

#[async_trait]
impl PageDriver for BrowserSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or_else(|| BrowserError::ConnectionLost("No active page".into()))?;

        debug!("Session {} navigating to: {}", self.id, url);

        tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            page.goto(url),
        )
        .await
        .map_err(|_| BrowserError::Timeout("Navigation timeout".into()))?
        .map_err(|e| BrowserError::NavigationFailed(e.to_string()))?;

        // Best-effort: bounded wait for the load event; slow pages fall
        // through to the caller's settle pacing.
        let _ = tokio::time::timeout(
            Duration::from_secs(self.config.timeout_secs),
            page.wait_for_navigation(),
        )
        .await;

        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or_else(|| BrowserError::ConnectionLost("No active page".into()))?;

        page.url()
            .await
            .map_err(|e| BrowserError::ConnectionLost(e.to_string()))?
            .ok_or_else(|| BrowserError::ConnectionLost("No URL".into()))
    }

    async fn eval(&self, script: &str) -> Result<Value, BrowserError> {
        self.evaluate(script).await
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.evaluate(
            "(() => { window.scrollTo(0, document.body.scrollHeight); return true; })()",
        )
        .await?;
        Ok(())
    }

    async fn scroll_to_top(&self) -> Result<(), BrowserError> {
        self.evaluate("(() => { window.scrollTo(0, 0); return true; })()")
            .await?;
        Ok(())
    }

    async fn document_height(&self) -> Result<f64, BrowserError> {
        let value = self.evaluate("document.body.scrollHeight").await?;
        value
            .as_f64()
            .ok_or_else(|| BrowserError::JavaScriptError("Height is not a number".into()))
    }

    async fn set_cookie(&self, name: &str, value: &str) -> Result<(), BrowserError> {
        let url = self.current_url().await?;

        let cookie = CookieParam::builder()
            .name(name)
            .value(value)
            .url(url)
            .build()
            .map_err(BrowserError::CookieError)?;

        let page = self.page.read().await;
        let page = page
            .as_ref()
            .ok_or_else(|| BrowserError::ConnectionLost("No active page".into()))?;

        page.execute(SetCookiesParams::new(vec![cookie]))
            .await
            .map_err(|e| BrowserError::CookieError(e.to_string()))?;

        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.alive.store(false, Ordering::Relaxed);
    }
}
