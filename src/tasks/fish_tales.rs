//! FishTales: scrape a list of shop websites into a contact-details report.
//!
//! Each site is fetched independently with its own timeout; blocked or
//! unreachable sites are counted as per-site failures and skipped. The
//! report holds one row per successfully scraped site.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use regex_lite::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::engine::job::JobType;
use crate::error::{EngineError, TaskError};
use crate::report::CsvReport;

use super::{parse_params, ScrapeTask, SiteFetcher, TaskContext, TaskReport};

#[derive(Debug, Deserialize)]
struct FishTalesParams {
    /// Shop website URLs to scrape.
    sites: Vec<String>,
}

/// Contact details pulled from one shop site.
#[derive(Debug)]
struct ShopRecord {
    url: String,
    title: String,
    emails: Vec<String>,
    phones: Vec<String>,
}

pub struct FishTalesTask {
    fetcher: Arc<dyn SiteFetcher>,
    max_sites: usize,
    email_re: Regex,
    phone_re: Regex,
}

impl FishTalesTask {
    pub fn new(fetcher: Arc<dyn SiteFetcher>, max_sites: usize) -> Self {
        Self {
            fetcher,
            max_sites,
            // Deliberately loose; candidates are deduped, not validated.
            email_re: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap(),
            phone_re: Regex::new(r"\(?\d{3}\)?[-. ]\d{3}[-. ]\d{4}").unwrap(),
        }
    }

    fn extract(&self, url: &Url, body: &str) -> ShopRecord {
        let document = Html::parse_document(body);
        let title_selector = Selector::parse("title").unwrap();
        let title = document
            .select(&title_selector)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        let mut emails: Vec<String> = self
            .email_re
            .find_iter(body)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        emails.sort();
        emails.dedup();

        let mut phones: Vec<String> = self
            .phone_re
            .find_iter(body)
            .map(|m| m.as_str().to_string())
            .collect();
        phones.sort();
        phones.dedup();

        ShopRecord {
            url: url.to_string(),
            title,
            emails,
            phones,
        }
    }
}

#[async_trait]
impl ScrapeTask for FishTalesTask {
    fn job_type(&self) -> JobType {
        JobType::FishTales
    }

    fn validate(&self, params: &serde_json::Value) -> Result<(), EngineError> {
        let params: FishTalesParams = parse_params(params)?;
        if params.sites.is_empty() {
            return Err(EngineError::Validation("sites must not be empty".into()));
        }
        if params.sites.len() > self.max_sites {
            return Err(EngineError::Validation(format!(
                "too many sites: {} (limit {})",
                params.sites.len(),
                self.max_sites
            )));
        }
        for site in &params.sites {
            Url::parse(site)
                .map_err(|e| EngineError::Validation(format!("invalid site URL '{site}': {e}")))?;
        }
        Ok(())
    }

    async fn run(&self, params: serde_json::Value, ctx: TaskContext) -> Result<TaskReport, TaskError> {
        let params: FishTalesParams =
            parse_params(&params).map_err(|e| TaskError::fatal(e.to_string()))?;

        ctx.progress
            .job_started(self.job_type().as_str(), Some(params.sites.len() as u64));

        let mut report = CsvReport::new(
            format!("fish_tales_{}", ctx.job_id),
            &["url", "title", "emails", "phones"],
        );

        for site in &params.sites {
            // Safe checkpoint between sites.
            if ctx.cancel.is_cancelled() {
                return Err(TaskError::Cancelled);
            }

            // Validated at creation; re-parse defensively for direct callers.
            let url = match Url::parse(site) {
                Ok(url) => url,
                Err(e) => {
                    ctx.progress.site_failed(site, &format!("invalid URL: {e}"), 0);
                    continue;
                }
            };

            let start = Instant::now();
            match self.fetcher.fetch(&url).await {
                Ok(page) => {
                    let record = self.extract(&page.final_url, &page.body);
                    let detail = (!record.title.is_empty()).then(|| record.title.clone());
                    report.push_row(vec![
                        record.url,
                        record.title,
                        record.emails.join("; "),
                        record.phones.join("; "),
                    ]);
                    ctx.progress
                        .site_scraped(site, detail, start.elapsed().as_millis() as u64);
                }
                Err(e) => {
                    ctx.progress
                        .site_failed(site, &e.to_string(), start.elapsed().as_millis() as u64);
                }
            }
        }

        let file = report
            .write_to(&ctx.out_dir)
            .map_err(|e| TaskError::fatal(format!("failed to write report: {e}")))?;

        info!(
            job_id = %ctx.job_id,
            succeeded = ctx.progress.sites_succeeded(),
            failed = ctx.progress.sites_failed(),
            "fish_tales report written to {}",
            file.path.display()
        );

        Ok(TaskReport { files: vec![file] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> FishTalesTask {
        struct NoFetch;
        #[async_trait]
        impl SiteFetcher for NoFetch {
            async fn fetch(
                &self,
                _url: &Url,
            ) -> Result<crate::tasks::FetchedPage, crate::tasks::FetchError> {
                unreachable!("validation tests never fetch")
            }
        }
        FishTalesTask::new(Arc::new(NoFetch), 5)
    }

    #[test]
    fn validate_rejects_empty_and_oversized_and_bad_urls() {
        let task = task();
        assert!(task.validate(&serde_json::json!({"sites": []})).is_err());
        assert!(task
            .validate(&serde_json::json!({"sites": ["not a url"]}))
            .is_err());
        let too_many: Vec<String> = (0..6).map(|i| format!("https://s{i}.example")).collect();
        assert!(task.validate(&serde_json::json!({"sites": too_many})).is_err());
        assert!(task
            .validate(&serde_json::json!({"sites": ["https://bigskyanglers.example"]}))
            .is_ok());
    }

    #[test]
    fn extracts_title_emails_and_phones() {
        let task = task();
        let url = Url::parse("https://shop.example").unwrap();
        let body = r#"<html><head><title>Henry's Fork Anglers</title></head>
            <body>Call (406) 555-0198 or write info@henrysfork.example.
            Also INFO@henrysfork.example repeats.</body></html>"#;
        let record = task.extract(&url, body);
        assert_eq!(record.title, "Henry's Fork Anglers");
        assert_eq!(record.emails, vec!["info@henrysfork.example"]);
        assert_eq!(record.phones, vec!["(406) 555-0198"]);
    }
}
