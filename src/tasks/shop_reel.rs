//! ShopReel: pull shop listings near a point from a places directory and
//! write them out as a CSV report.
//!
//! The directory lookup is an external collaborator behind the
//! `PlacesDirectory` trait; the HTTP implementation targets a configurable
//! endpoint and knows nothing about any particular provider's wire shape
//! beyond the minimal listing fields.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::engine::job::JobType;
use crate::error::{EngineError, TaskError};
use crate::report::CsvReport;

use super::{parse_params, ScrapeTask, TaskContext, TaskReport};

/// Most listings a single shop_reel job may request.
const MAX_RESULTS_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
struct ShopReelParams {
    query: String,
    lat: f64,
    lng: f64,
    max_results: usize,
}

/// One directory listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopListing {
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("directory returned status {0}")]
    Status(u16),
}

/// Narrow interface to the external places directory.
#[async_trait]
pub trait PlacesDirectory: Send + Sync {
    async fn search(
        &self,
        query: &str,
        lat: f64,
        lng: f64,
        max_results: usize,
    ) -> Result<Vec<ShopListing>, DirectoryError>;
}

/// HTTP directory client: `GET <endpoint>?query=&lat=&lng=&limit=` returning
/// a JSON array of listings.
pub struct HttpPlacesDirectory {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpPlacesDirectory {
    pub fn new(endpoint: Url, user_agent: &str, timeout: Duration) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl PlacesDirectory for HttpPlacesDirectory {
    async fn search(
        &self,
        query: &str,
        lat: f64,
        lng: f64,
        max_results: usize,
    ) -> Result<Vec<ShopListing>, DirectoryError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("query", query)])
            .query(&[("lat", lat), ("lng", lng)])
            .query(&[("limit", max_results as u64)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DirectoryError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}

pub struct ShopReelTask {
    /// `None` when no directory endpoint is configured; jobs then fail
    /// fatally with a clear reason instead of pretending to search.
    directory: Option<Arc<dyn PlacesDirectory>>,
}

impl ShopReelTask {
    pub fn new(directory: Option<Arc<dyn PlacesDirectory>>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl ScrapeTask for ShopReelTask {
    fn job_type(&self) -> JobType {
        JobType::ShopReel
    }

    fn validate(&self, params: &serde_json::Value) -> Result<(), EngineError> {
        let params: ShopReelParams = parse_params(params)?;
        if params.query.trim().is_empty() {
            return Err(EngineError::Validation("query must not be empty".into()));
        }
        if !(-90.0..=90.0).contains(&params.lat) {
            return Err(EngineError::Validation(format!(
                "lat out of range: {}",
                params.lat
            )));
        }
        if !(-180.0..=180.0).contains(&params.lng) {
            return Err(EngineError::Validation(format!(
                "lng out of range: {}",
                params.lng
            )));
        }
        if params.max_results == 0 || params.max_results > MAX_RESULTS_LIMIT {
            return Err(EngineError::Validation(format!(
                "max_results must be 1..={MAX_RESULTS_LIMIT}"
            )));
        }
        Ok(())
    }

    async fn run(&self, params: serde_json::Value, ctx: TaskContext) -> Result<TaskReport, TaskError> {
        let params: ShopReelParams =
            parse_params(&params).map_err(|e| TaskError::fatal(e.to_string()))?;

        let directory = self
            .directory
            .as_ref()
            .ok_or_else(|| TaskError::fatal("no places directory endpoint configured"))?;

        ctx.progress.job_started(self.job_type().as_str(), None);
        ctx.progress.message(format!(
            "searching '{}' near ({}, {})",
            params.query, params.lat, params.lng
        ));

        if ctx.cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        // A directory failure is fatal: there is nothing to partially scrape.
        let listings = directory
            .search(&params.query, params.lat, params.lng, params.max_results)
            .await
            .map_err(|e| TaskError::fatal(e.to_string()))?;

        let mut report = CsvReport::new(
            format!("shop_reel_{}", ctx.job_id),
            &["name", "address", "website", "phone", "rating"],
        );

        for listing in &listings {
            if ctx.cancel.is_cancelled() {
                return Err(TaskError::Cancelled);
            }
            report.push_row(vec![
                listing.name.clone(),
                listing.address.clone(),
                listing.website.clone().unwrap_or_default(),
                listing.phone.clone().unwrap_or_default(),
                listing.rating.map(|r| r.to_string()).unwrap_or_default(),
            ]);
            ctx.progress.site_scraped(
                listing.website.as_deref().unwrap_or(&listing.name),
                Some(listing.name.clone()),
                0,
            );
        }

        let file = report
            .write_to(&ctx.out_dir)
            .map_err(|e| TaskError::fatal(format!("failed to write report: {e}")))?;

        info!(
            job_id = %ctx.job_id,
            listings = listings.len(),
            "shop_reel report written to {}",
            file.path.display()
        );

        Ok(TaskReport { files: vec![file] })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_checks_query_coordinates_and_limit() {
        let task = ShopReelTask::new(None);
        let good = serde_json::json!({
            "query": "fly fishing shops", "lat": 44.57, "lng": -111.17, "max_results": 5
        });
        assert!(task.validate(&good).is_ok());

        assert!(task
            .validate(&serde_json::json!({"query": "  ", "lat": 0.0, "lng": 0.0, "max_results": 5}))
            .is_err());
        assert!(task
            .validate(&serde_json::json!({"query": "q", "lat": 91.0, "lng": 0.0, "max_results": 5}))
            .is_err());
        assert!(task
            .validate(&serde_json::json!({"query": "q", "lat": 0.0, "lng": -200.0, "max_results": 5}))
            .is_err());
        assert!(task
            .validate(&serde_json::json!({"query": "q", "lat": 0.0, "lng": 0.0, "max_results": 0}))
            .is_err());
        // Malformed blob is a validation error, not a panic.
        assert!(task.validate(&serde_json::json!({"query": "q"})).is_err());
    }

    #[tokio::test]
    async fn http_directory_decodes_listings() {
        use wiremock::matchers::{method, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("query", "fly fishing shops"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "Big Sky Anglers", "address": "39 Madison Ave", "website": "https://bsa.example", "rating": 4.9}
            ])))
            .mount(&server)
            .await;

        let directory = HttpPlacesDirectory::new(
            Url::parse(&server.uri()).unwrap(),
            "test-agent",
            Duration::from_secs(2),
        )
        .unwrap();
        let listings = directory
            .search("fly fishing shops", 44.57, -111.17, 5)
            .await
            .unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].name, "Big Sky Anglers");
        assert_eq!(listings[0].phone, None);
    }
}
