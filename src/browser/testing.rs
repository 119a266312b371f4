//! Scripted in-memory page driver for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{BrowserError, PageDriver};

/// A [`PageDriver`] whose responses are scripted up front.
///
/// `eval` responses are keyed by a substring marker matched against the
/// incoming script; the first configured marker that matches wins. Scripts
/// with no matching marker evaluate to `null`. Every call is recorded so
/// tests can assert on which queries ran and in what order.
#[derive(Default)]
pub struct ScriptedDriver {
    responses: Mutex<Vec<(String, VecDeque<Value>)>>,
    error_markers: Mutex<Vec<String>>,
    heights: Mutex<VecDeque<f64>>,
    last_height: Mutex<f64>,
    pub scripts: Mutex<Vec<String>>,
    pub navigations: Mutex<Vec<String>>,
    fail_navigation_to: Mutex<Vec<String>>,
    pub scroll_bottom_calls: AtomicUsize,
    pub scroll_top_calls: AtomicUsize,
    pub cookies: Mutex<Vec<(String, String)>>,
    pub fail_cookies: bool,
    current_url: Mutex<String>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer scripts containing `marker` with `value`.
    pub fn respond(&self, marker: &str, value: Value) {
        let mut responses = self.responses.lock().unwrap();
        match responses.iter_mut().find(|(m, _)| m == marker) {
            Some((_, queue)) => queue.push_back(value),
            None => responses.push((marker.to_string(), VecDeque::from([value]))),
        }
    }

    /// Queue several answers for scripts containing `marker`; the last one
    /// keeps repeating once the queue drains.
    pub fn respond_seq(&self, marker: &str, values: Vec<Value>) {
        for value in values {
            self.respond(marker, value);
        }
    }

    /// Queue document heights returned by `document_height`, in order. The
    /// last height keeps repeating.
    pub fn heights(&self, values: Vec<f64>) {
        let mut heights = self.heights.lock().unwrap();
        heights.extend(values);
    }

    /// Make `eval` fail for scripts containing `marker`.
    pub fn respond_err(&self, marker: &str) {
        self.error_markers.lock().unwrap().push(marker.to_string());
    }

    /// Make `navigate` fail for this exact URL.
    pub fn fail_navigation(&self, url: &str) {
        self.fail_navigation_to.lock().unwrap().push(url.to_string());
    }

    pub fn eval_count(&self) -> usize {
        self.scripts.lock().unwrap().len()
    }

    /// Number of recorded eval scripts containing `marker`.
    pub fn evals_matching(&self, marker: &str) -> usize {
        self.scripts
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.contains(marker))
            .count()
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        self.navigations.lock().unwrap().push(url.to_string());
        if self
            .fail_navigation_to
            .lock()
            .unwrap()
            .iter()
            .any(|u| u == url)
        {
            return Err(BrowserError::NavigationFailed(format!(
                "scripted failure for {url}"
            )));
        }
        *self.current_url.lock().unwrap() = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.current_url.lock().unwrap().clone())
    }

    async fn eval(&self, script: &str) -> Result<Value, BrowserError> {
        self.scripts.lock().unwrap().push(script.to_string());

        if let Some(marker) = self
            .error_markers
            .lock()
            .unwrap()
            .iter()
            .find(|m| script.contains(m.as_str()))
        {
            return Err(BrowserError::JavaScriptError(format!(
                "scripted failure for '{marker}'"
            )));
        }

        let mut responses = self.responses.lock().unwrap();
        for (marker, queue) in responses.iter_mut() {
            if script.contains(marker.as_str()) {
                let value = if queue.len() > 1 {
                    queue.pop_front().unwrap_or(Value::Null)
                } else {
                    queue.front().cloned().unwrap_or(Value::Null)
                };
                return Ok(value);
            }
        }
        Ok(Value::Null)
    }

    async fn scroll_to_bottom(&self) -> Result<(), BrowserError> {
        self.scroll_bottom_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn scroll_to_top(&self) -> Result<(), BrowserError> {
        self.scroll_top_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn document_height(&self) -> Result<f64, BrowserError> {
        let mut heights = self.heights.lock().unwrap();
        let value = if heights.len() > 1 {
            heights.pop_front().unwrap()
        } else if let Some(&last) = heights.front() {
            last
        } else {
            *self.last_height.lock().unwrap()
        };
        *self.last_height.lock().unwrap() = value;
        Ok(value)
    }

    async fn set_cookie(&self, name: &str, value: &str) -> Result<(), BrowserError> {
        if self.fail_cookies {
            return Err(BrowserError::CookieError("scripted cookie failure".into()));
        }
        self.cookies
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string()));
        Ok(())
    }
}
