use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde_json::json;

use crate::client::state::FilterSelection;
use crate::error::{AppError, AppResult};
use crate::models::{FilterOptions, ScholarPage, ScholarRecord};

/// Thin client over the scholar REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        let base_url = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("invalid API URL {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!("{base_url} cannot be used as an API base")));
        }
        Ok(Self { http, base_url })
    }

    /// Appends path segments to the base URL, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config(format!("{} cannot be used as an API base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn health(&self) -> AppResult<bool> {
        let response = self.http.get(self.url(&["api", "health"])?).send().await?;
        Ok(response.status().is_success())
    }

    pub async fn list(&self, filters: &FilterSelection) -> AppResult<ScholarPage> {
        let page = self
            .http
            .get(self.url(&["api", "scholars"])?)
            .query(&filters.to_query_pairs())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(page)
    }

    pub async fn filter_options(&self) -> AppResult<FilterOptions> {
        let options = self
            .http
            .get(self.url(&["api", "scholars", "filters"])?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(options)
    }

    pub async fn get(&self, id: &str) -> AppResult<ScholarRecord> {
        let response = self
            .http
            .get(self.url(&["api", "scholars", id])?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(id.to_string()));
        }
        Ok(response.error_for_status()?.json().await?)
    }

    pub async fn batch(&self, ids: &[String]) -> AppResult<Vec<ScholarRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let records = self
            .http
            .post(self.url(&["api", "scholars", "batch"])?)
            .json(&json!({ "ids": ids }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths_onto_the_base_url() {
        let client = ApiClient::new("http://localhost:3001/").unwrap();
        assert_eq!(
            client.url(&["api", "health"]).unwrap().as_str(),
            "http://localhost:3001/api/health"
        );

        let prefixed = ApiClient::new("http://localhost:3001/browser/").unwrap();
        assert_eq!(
            prefixed.url(&["api", "scholars"]).unwrap().as_str(),
            "http://localhost:3001/browser/api/scholars"
        );
    }

    #[test]
    fn ids_are_encoded_as_one_path_segment() {
        let client = ApiClient::new("http://localhost:3001").unwrap();
        assert_eq!(
            client.url(&["api", "scholars", "a b/c"]).unwrap().as_str(),
            "http://localhost:3001/api/scholars/a%20b%2Fc"
        );
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(ApiClient::new("not a url").is_err());
        assert!(ApiClient::new("mailto:someone@example.com").is_err());
    }
}
