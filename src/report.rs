//! Flat-file inputs and outputs.
//!
//! Keywords and URL lists come in as delimited tabular files; harvested
//! results, activity logs and form hits go out the same way.

use std::collections::BTreeSet;
use std::collections::HashSet;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use crate::activity::{ActivityRecord, FormPage};

/// Read keywords from a file with a `keyword`/`Keyword`/`KW` column.
/// Blank and whitespace-only values are skipped.
pub fn read_keywords(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Keywords file not found: {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let column = headers
        .iter()
        .position(|h| matches!(h.trim(), "keyword" | "Keyword" | "KW"))
        .ok_or_else(|| anyhow!("No keyword column in {}", path.display()))?;

    let mut keywords = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping malformed row: {}", e);
                continue;
            }
        };
        if let Some(value) = record.get(column) {
            let value = value.trim();
            if !value.is_empty() {
                keywords.push(value.to_string());
            }
        }
    }

    info!("Loaded {} keywords from {}", keywords.len(), path.display());
    Ok(keywords)
}

/// Read URLs from a file with a `url` column (any case); when the header is
/// missing the first column is used. Scheme-less entries get `https://`,
/// duplicates are dropped keeping first-seen order.
pub fn read_urls(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("URL file not found: {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let column = headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("url"))
        .unwrap_or(0);

    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping malformed row: {}", e);
                continue;
            }
        };
        let Some(raw) = record.get(column) else {
            continue;
        };
        let Some(url) = normalize_url(raw) else {
            continue;
        };
        if seen.insert(url.clone()) {
            urls.push(url);
        }
    }

    info!("Loaded {} URLs from {}", urls.len(), path.display());
    Ok(urls)
}

fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        Some(raw.to_string())
    } else {
        Some(format!("https://{raw}"))
    }
}

/// Write the sponsored-results file: one row per (keyword, URL) pair, URLs
/// sorted lexicographically within a keyword.
pub fn write_sponsored_results(
    path: &Path,
    results: &[(String, BTreeSet<String>)],
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Cannot write {}", path.display()))?;

    writer.write_record(["Keyword", "Sponsored URL"])?;
    let mut total = 0usize;
    for (keyword, urls) in results {
        for url in urls {
            writer.write_record([keyword.as_str(), url.as_str()])?;
            total += 1;
        }
    }
    writer.flush()?;

    info!("Saved {} URLs -> {}", total, path.display());
    Ok(())
}

/// Write the activity log: one row per visited URL, the activity column a
/// comma-joined list of outcome tags.
pub fn write_activity_log(path: &Path, records: &[ActivityRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Cannot write {}", path.display()))?;

    writer.write_record(["URL", "Activity"])?;
    for record in records {
        writer.write_record([record.url.as_str(), record.activity_column().as_str()])?;
    }
    writer.flush()?;

    info!("Saved {} activity logs -> {}", records.len(), path.display());
    Ok(())
}

/// Write pages where the target form was found.
pub fn write_form_pages(path: &Path, pages: &[FormPage]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Cannot write {}", path.display()))?;

    writer.write_record(["form_url", "form_fields"])?;
    for page in pages {
        writer.write_record([page.url.as_str(), page.fields.as_str()])?;
    }
    writer.flush()?;

    info!("Saved {} form pages -> {}", pages.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::activity::ActivityKind;

    use super::*;

    fn temp_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("serp-harvester-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn keywords_accept_header_case_variants_and_skip_blanks() {
        for header in ["keyword", "Keyword", "KW"] {
            let path = temp_file("keywords.csv");
            std::fs::write(
                &path,
                format!("{header}\nblue widgets\n   \n\n  red widgets \n"),
            )
            .unwrap();

            let keywords = read_keywords(&path).unwrap();
            assert_eq!(keywords, vec!["blue widgets", "red widgets"]);
        }
    }

    #[test]
    fn keywords_require_a_recognized_column() {
        let path = temp_file("keywords.csv");
        std::fs::write(&path, "term\nblue widgets\n").unwrap();
        assert!(read_keywords(&path).is_err());
    }

    #[test]
    fn urls_are_normalized_and_deduplicated() {
        let path = temp_file("urls.csv");
        std::fs::write(
            &path,
            "URL\nexample.com\nhttps://example.com\nhttp://other.example/x\nexample.com\n",
        )
        .unwrap();

        let urls = read_urls(&path).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://example.com",
                "http://other.example/x",
            ]
        );
    }

    #[test]
    fn sponsored_results_are_sorted_within_a_keyword() {
        let path = temp_file("sponsored_results.csv");
        let urls: BTreeSet<String> = ["https://z.example/", "https://a.example/"]
            .into_iter()
            .map(String::from)
            .collect();
        write_sponsored_results(&path, &[("kw".to_string(), urls)]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "Keyword,Sponsored URL");
        assert_eq!(lines[1], "kw,https://a.example/");
        assert_eq!(lines[2], "kw,https://z.example/");
    }

    #[test]
    fn activity_log_joins_outcome_tags() {
        let path = temp_file("activity_log.csv");
        let records = vec![ActivityRecord {
            url: "https://a.example/".to_string(),
            kind: ActivityKind::Scroll,
            outcomes: vec!["scrolled".to_string(), "dwelled 4.0s".to_string()],
        }];
        write_activity_log(&path, &records).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("URL,Activity\n"));
        assert!(content.contains("https://a.example/,\"scrolled, dwelled 4.0s\""));
    }

    #[test]
    fn form_pages_use_the_documented_header() {
        let path = temp_file("form_pages.csv");
        let pages = vec![FormPage {
            url: "https://biz.example/contact".to_string(),
            fields: crate::activity::TARGET_FIELDS.to_string(),
        }];
        write_form_pages(&path, &pages).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("form_url,form_fields\n"));
    }
}
