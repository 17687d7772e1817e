//! SiteScout: crawl seed pages and report fly-fishing-related outbound
//! sites worth scraping later.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::engine::job::JobType;
use crate::error::{EngineError, TaskError};
use crate::report::CsvReport;

use super::{parse_params, ScrapeTask, SiteFetcher, TaskContext, TaskReport};

/// Keywords that mark an anchor as fly-fishing related. Each hit in the
/// link text or URL counts toward the candidate's score.
const KEYWORDS: &[&str] = &[
    "fly", "fishing", "angler", "tackle", "rod", "reel", "guide", "outfitter", "creel", "hatch",
];

const DEFAULT_MAX_SITES: usize = 50;

#[derive(Debug, Deserialize)]
struct SiteScoutParams {
    /// Pages to harvest outbound links from.
    seeds: Vec<String>,
    /// Cap on reported candidate sites.
    max_sites: Option<usize>,
}

/// A discovered candidate site.
#[derive(Debug, Clone, PartialEq)]
struct Candidate {
    url: Url,
    anchor_text: String,
    score: usize,
}

pub struct SiteScoutTask {
    fetcher: Arc<dyn SiteFetcher>,
    max_seeds: usize,
}

impl SiteScoutTask {
    pub fn new(fetcher: Arc<dyn SiteFetcher>, max_seeds: usize) -> Self {
        Self { fetcher, max_seeds }
    }
}

/// Pull scored candidate links out of one page. Only http(s) links that
/// leave the seed's host and match at least one keyword qualify.
fn collect_candidates(body: &str, base: &Url) -> Vec<Candidate> {
    let document = Html::parse_document(body);
    let selector = Selector::parse("a[href]").unwrap();

    let mut candidates = Vec::new();
    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(url) = base.join(href) else {
            continue;
        };
        if url.scheme() != "http" && url.scheme() != "https" {
            continue;
        }
        if url.host_str() == base.host_str() {
            continue;
        }

        let anchor_text = anchor.text().collect::<String>().trim().to_string();
        let haystack = format!("{} {}", anchor_text.to_lowercase(), url.as_str().to_lowercase());
        let score = KEYWORDS.iter().filter(|k| haystack.contains(*k)).count();
        if score > 0 {
            candidates.push(Candidate {
                url,
                anchor_text,
                score,
            });
        }
    }
    candidates
}

#[async_trait]
impl ScrapeTask for SiteScoutTask {
    fn job_type(&self) -> JobType {
        JobType::SiteScout
    }

    fn validate(&self, params: &serde_json::Value) -> Result<(), EngineError> {
        let params: SiteScoutParams = parse_params(params)?;
        if params.seeds.is_empty() {
            return Err(EngineError::Validation("seeds must not be empty".into()));
        }
        if params.seeds.len() > self.max_seeds {
            return Err(EngineError::Validation(format!(
                "too many seeds: {} (limit {})",
                params.seeds.len(),
                self.max_seeds
            )));
        }
        for seed in &params.seeds {
            Url::parse(seed)
                .map_err(|e| EngineError::Validation(format!("invalid seed URL '{seed}': {e}")))?;
        }
        if params.max_sites == Some(0) {
            return Err(EngineError::Validation("max_sites must be positive".into()));
        }
        Ok(())
    }

    async fn run(&self, params: serde_json::Value, ctx: TaskContext) -> Result<TaskReport, TaskError> {
        let params: SiteScoutParams =
            parse_params(&params).map_err(|e| TaskError::fatal(e.to_string()))?;
        let max_sites = params.max_sites.unwrap_or(DEFAULT_MAX_SITES);

        ctx.progress
            .job_started(self.job_type().as_str(), Some(params.seeds.len() as u64));

        let mut seen_hosts: HashSet<String> = HashSet::new();
        let mut discovered: Vec<Candidate> = Vec::new();

        for seed in &params.seeds {
            if ctx.cancel.is_cancelled() {
                return Err(TaskError::Cancelled);
            }

            let base = match Url::parse(seed) {
                Ok(url) => url,
                Err(e) => {
                    ctx.progress.site_failed(seed, &format!("invalid URL: {e}"), 0);
                    continue;
                }
            };

            let start = Instant::now();
            match self.fetcher.fetch(&base).await {
                Ok(page) => {
                    let mut found = 0usize;
                    for candidate in collect_candidates(&page.body, &page.final_url) {
                        let Some(host) = candidate.url.host_str() else {
                            continue;
                        };
                        // One candidate per host keeps the report readable.
                        if seen_hosts.insert(host.to_string()) {
                            discovered.push(candidate);
                            found += 1;
                        }
                    }
                    ctx.progress.site_scraped(
                        seed,
                        Some(format!("{found} new candidate sites")),
                        start.elapsed().as_millis() as u64,
                    );
                }
                Err(e) => {
                    ctx.progress
                        .site_failed(seed, &e.to_string(), start.elapsed().as_millis() as u64);
                }
            }
        }

        discovered.sort_by(|a, b| b.score.cmp(&a.score));
        discovered.truncate(max_sites);

        let mut report = CsvReport::new(
            format!("site_scout_{}", ctx.job_id),
            &["url", "anchor_text", "score"],
        );
        for candidate in &discovered {
            report.push_row(vec![
                candidate.url.to_string(),
                candidate.anchor_text.clone(),
                candidate.score.to_string(),
            ]);
        }

        let file = report
            .write_to(&ctx.out_dir)
            .map_err(|e| TaskError::fatal(format!("failed to write report: {e}")))?;

        info!(
            job_id = %ctx.job_id,
            candidates = discovered.len(),
            "site_scout report written to {}",
            file.path.display()
        );

        Ok(TaskReport { files: vec![file] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_scored_offsite_links_only() {
        let base = Url::parse("https://forum.example/threads/mt").unwrap();
        let body = r#"<html><body>
            <a href="https://bigskyanglers.example/shop">Big Sky fly fishing shop</a>
            <a href="/local/path">fly fishing on this site</a>
            <a href="https://news.example/story">unrelated news</a>
            <a href="mailto:someone@example.com">fly fishing email</a>
            <a href="https://tackle.example">tackle and rods</a>
        </body></html>"#;

        let candidates = collect_candidates(body, &base);
        let urls: Vec<String> = candidates.iter().map(|c| c.url.to_string()).collect();
        assert_eq!(
            urls,
            vec![
                "https://bigskyanglers.example/shop".to_string(),
                "https://tackle.example/".to_string(),
            ]
        );
        // "Big Sky fly fishing shop" + url hits "fly" and "fishing".
        assert!(candidates[0].score >= 2);
    }

    #[test]
    fn validate_rejects_bad_seeds() {
        struct NoFetch;
        #[async_trait]
        impl SiteFetcher for NoFetch {
            async fn fetch(
                &self,
                _url: &Url,
            ) -> Result<crate::tasks::FetchedPage, crate::tasks::FetchError> {
                unreachable!()
            }
        }
        let task = SiteScoutTask::new(Arc::new(NoFetch), 3);
        assert!(task.validate(&serde_json::json!({"seeds": []})).is_err());
        assert!(task
            .validate(&serde_json::json!({"seeds": ["https://a.example"], "max_sites": 0}))
            .is_err());
        assert!(task
            .validate(&serde_json::json!({"seeds": ["https://a.example"]}))
            .is_ok());
    }
}
