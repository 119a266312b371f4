//! Contact-form detection and filling.
//!
//! The target form must carry all four field categories at once: a name
//! field, a phone field, an email field and a message field, recognized by
//! substring match against each field's name/placeholder/id. Categorization
//! happens here in Rust; the page only reports raw field descriptors.

use std::sync::Arc;

use tracing::{info, warn};

use crate::browser::{BrowserError, PageDriver};
use crate::captcha::ChallengeGate;
use crate::pacing::{Pace, Pacing};
use crate::stats::RunStats;

/// Fill the first form on the page with placeholder values and try to
/// submit it.
pub const FILL_FORM_SCRIPT: &str = r#"
(() => {
    const form = document.querySelector('form');
    if (!form) return { found: false, submitted: false };
    for (const input of form.querySelectorAll("input[type='text'], input[type='email']")) {
        input.value = 'test@example.com';
        input.dispatchEvent(new Event('input', { bubbles: true }));
    }
    for (const area of form.querySelectorAll('textarea')) {
        area.value = 'Hi, I would like to know more about your services.';
        area.dispatchEvent(new Event('input', { bubbles: true }));
    }
    const submit = form.querySelector("input[type='submit'], button[type='submit'], button");
    if (submit) {
        submit.click();
        return { found: true, submitted: true };
    }
    return { found: true, submitted: false };
})()
"#;

/// Report every form on the page as a list of field descriptors
/// (`name placeholder id` per input/textarea).
const DESCRIBE_FORMS_SCRIPT: &str = r#"
(() => {
    const forms = [];
    for (const form of document.querySelectorAll('form')) {
        const fields = [];
        for (const field of form.querySelectorAll('input, textarea')) {
            const name = field.getAttribute('name') || '';
            const placeholder = field.getAttribute('placeholder') || '';
            const id = field.getAttribute('id') || '';
            fields.push(name + ' ' + placeholder + ' ' + id);
        }
        forms.push(fields);
    }
    return forms;
})()
"#;

/// Anchors whose visible text suggests a contact page.
const CANDIDATE_LINKS_SCRIPT: &str = r#"
(() => {
    const keywords = ['contact', 'get in touch', 'reach us', 'connect', 'support', 'help'];
    const out = [];
    for (const a of document.querySelectorAll('a[href]')) {
        const text = (a.innerText || a.textContent || '').trim().toLowerCase();
        if (keywords.some((k) => text.includes(k))) out.push(a.href);
    }
    return out;
})()
"#;

/// Field list reported for a matched target form.
pub const TARGET_FIELDS: &str = "Name, Phone, Email, Message";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldCategory {
    Name,
    Phone,
    Email,
    Message,
}

/// First matching category wins, in the fixed order name, phone, email,
/// message.
fn categorize(descriptor: &str) -> Option<FieldCategory> {
    let text = descriptor.to_lowercase();
    let matches = |terms: &[&str]| terms.iter().any(|t| text.contains(t));

    if matches(&["name", "full name", "fullname"]) {
        Some(FieldCategory::Name)
    } else if matches(&["phone", "mobile", "number"]) {
        Some(FieldCategory::Phone)
    } else if matches(&["email", "mail"]) {
        Some(FieldCategory::Email)
    } else if matches(&["message", "comment", "query"]) {
        Some(FieldCategory::Message)
    } else {
        None
    }
}

/// True when any reported form carries all four target categories.
pub fn has_target_form(forms: &[Vec<String>]) -> bool {
    forms.iter().any(|fields| {
        let mut name = false;
        let mut phone = false;
        let mut email = false;
        let mut message = false;
        for descriptor in fields {
            match categorize(descriptor) {
                Some(FieldCategory::Name) => name = true,
                Some(FieldCategory::Phone) => phone = true,
                Some(FieldCategory::Email) => email = true,
                Some(FieldCategory::Message) => message = true,
                None => {}
            }
        }
        name && phone && email && message
    })
}

/// A page where the target form was found
#[derive(Debug, Clone)]
pub struct FormPage {
    pub url: String,
    pub fields: String,
}

/// Scans URLs for lead-generation contact forms.
pub struct FormScanner<'a> {
    driver: &'a dyn PageDriver,
    gate: &'a dyn ChallengeGate,
    pacing: &'a dyn Pacing,
    stats: Arc<RunStats>,
}

impl<'a> FormScanner<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        gate: &'a dyn ChallengeGate,
        pacing: &'a dyn Pacing,
        stats: Arc<RunStats>,
    ) -> Self {
        Self {
            driver,
            gate,
            pacing,
            stats,
        }
    }

    /// Check each URL (and its contact-looking links) for the target form.
    /// Per-URL failures are logged and skipped.
    pub async fn scan(&self, urls: &[String]) -> Vec<FormPage> {
        let mut found = Vec::new();

        for (i, url) in urls.iter().enumerate() {
            info!("({}/{}) Checking {}", i + 1, urls.len(), url);
            match self.check_site(url).await {
                Ok(Some(page)) => {
                    self.stats.record_form_found();
                    info!("Form found at {}", page.url);
                    found.push(page);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Error processing {}: {}", url, e);
                }
            }
        }

        found
    }

    /// Check the landing page first, then candidate contact links, stopping
    /// at the first page carrying the target form.
    async fn check_site(&self, url: &str) -> Result<Option<FormPage>, BrowserError> {
        if let Some(page) = self.visit_and_check(url).await? {
            return Ok(Some(page));
        }

        let candidates = self
            .driver
            .eval(CANDIDATE_LINKS_SCRIPT)
            .await
            .ok()
            .and_then(|value| serde_json::from_value::<Vec<String>>(value).ok())
            .unwrap_or_default();

        for href in candidates {
            match self.visit_and_check(&href).await {
                Ok(Some(page)) => return Ok(Some(page)),
                Ok(None) => {}
                Err(e) => {
                    warn!("Error checking {}: {}", href, e);
                }
            }
        }

        Ok(None)
    }

    async fn visit_and_check(&self, url: &str) -> Result<Option<FormPage>, BrowserError> {
        self.driver.navigate(url).await?;
        self.gate.try_clear(self.driver).await;
        self.pacing.wait(Pace::Settle).await;

        if let Err(e) = self.driver.set_cookie("visited_before", "true").await {
            warn!("Failed to set cookie: {}", e);
        }

        // look alive while we inspect the page
        let _ = self.driver.scroll_to_bottom().await;
        self.pacing.wait(Pace::PreAction).await;
        let _ = self.driver.scroll_to_top().await;

        let forms = self
            .driver
            .eval(DESCRIBE_FORMS_SCRIPT)
            .await
            .ok()
            .and_then(|value| serde_json::from_value::<Vec<Vec<String>>>(value).ok())
            .unwrap_or_default();

        if has_target_form(&forms) {
            let url = self.driver.current_url().await.unwrap_or_else(|_| url.to_string());
            Ok(Some(FormPage {
                url,
                fields: TARGET_FIELDS.to_string(),
            }))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::browser::testing::ScriptedDriver;
    use crate::captcha::NoChallenge;
    use crate::pacing::NoDelay;

    use super::*;

    fn form(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn all_four_categories_are_required() {
        let complete = form(&[
            "name  your-name",
            "phone  phone-input",
            "email  email-input",
            "message  message-box",
        ]);
        assert!(has_target_form(&[complete]));

        let missing_phone = form(&["name  ", "email  ", "message  "]);
        assert!(!has_target_form(&[missing_phone]));
    }

    #[test]
    fn categories_match_on_placeholder_and_id_too() {
        let by_placeholder = form(&[
            "  Your full name ",
            "  Mobile number ",
            "  you@example.com email ",
            "  Leave a comment ",
        ]);
        assert!(has_target_form(&[by_placeholder]));
    }

    #[test]
    fn a_field_counts_for_one_category_only() {
        // "name" wins over "phone" for a descriptor carrying both terms, so
        // this form has no phone field
        let ambiguous = form(&["name phone", "email  ", "message  "]);
        assert!(!has_target_form(&[ambiguous]));
    }

    #[test]
    fn any_form_on_the_page_may_match() {
        let newsletter = form(&["email  "]);
        let contact = form(&["name  ", "phone  ", "email  ", "message  "]);
        assert!(has_target_form(&[newsletter, contact]));
        assert!(!has_target_form(&[]));
    }

    #[tokio::test]
    async fn scan_records_the_landing_page_when_it_has_the_form() {
        let driver = ScriptedDriver::new();
        driver.respond(
            "getAttribute('placeholder')",
            json!([["name  ", "phone  ", "email  ", "message  "]]),
        );

        let stats = Arc::new(RunStats::new());
        let scanner = FormScanner::new(&driver, &NoChallenge, &NoDelay, stats.clone());
        let pages = scanner.scan(&[String::from("https://biz.example/")]).await;

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].url, "https://biz.example/");
        assert_eq!(pages[0].fields, TARGET_FIELDS);
        assert_eq!(stats.snapshot().forms_found, 1);
    }

    #[tokio::test]
    async fn scan_follows_candidate_links_when_the_landing_page_has_none() {
        let driver = ScriptedDriver::new();
        // landing page: no forms; candidate page: complete form
        driver.respond_seq(
            "getAttribute('placeholder')",
            vec![
                json!([]),
                json!([["name  ", "phone  ", "email  ", "message  "]]),
            ],
        );
        driver.respond(
            "get in touch",
            json!(["https://biz.example/contact"]),
        );

        let scanner = FormScanner::new(
            &driver,
            &NoChallenge,
            &NoDelay,
            Arc::new(RunStats::new()),
        );
        let pages = scanner.scan(&[String::from("https://biz.example/")]).await;

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].url, "https://biz.example/contact");
    }

    #[tokio::test]
    async fn scan_skips_sites_that_fail_to_load() {
        let driver = ScriptedDriver::new();
        driver.fail_navigation("https://dead.example/");
        driver.respond(
            "getAttribute('placeholder')",
            json!([["name  ", "phone  ", "email  ", "message  "]]),
        );

        let scanner = FormScanner::new(
            &driver,
            &NoChallenge,
            &NoDelay,
            Arc::new(RunStats::new()),
        );
        let pages = scanner
            .scan(&[
                String::from("https://dead.example/"),
                String::from("https://ok.example/"),
            ])
            .await;

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].url, "https://ok.example/");
    }
}
