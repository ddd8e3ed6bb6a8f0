use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use serde_json::Value;

use crate::config::AppConfig;
use crate::errors::AppResult;

/// Seam for the address lookup backend. An empty vector means the service
/// answered but had no suggestion for the query.
#[async_trait]
pub trait AddressLookup: Send + Sync {
    async fn lookup(&self, query: &str) -> AppResult<Vec<Value>>;
}

#[derive(Clone)]
pub struct LookupService {
    inner: Arc<dyn AddressLookup>,
}

impl LookupService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            inner: Arc::new(AlsClient::new(config)),
        }
    }

    #[cfg(test)]
    pub fn from_lookup(lookup: Arc<dyn AddressLookup>) -> Self {
        Self { inner: lookup }
    }

    pub async fn lookup(&self, query: &str) -> AppResult<Vec<Value>> {
        self.inner.lookup(query).await
    }
}

/// HTTP client for the government address lookup service.
struct AlsClient {
    http: reqwest::Client,
    endpoint: String,
    suggestion_limit: u32,
}

impl AlsClient {
    fn new(config: &AppConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("lookup http client");
        Self {
            http,
            endpoint: config.lookup_endpoint.clone(),
            suggestion_limit: config.suggestion_limit,
        }
    }
}

#[async_trait]
impl AddressLookup for AlsClient {
    async fn lookup(&self, query: &str) -> AppResult<Vec<Value>> {
        let limit = self.suggestion_limit.to_string();
        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("q", query), ("n", limit.as_str())])
            .header(ACCEPT, "application/json")
            .header(ACCEPT_LANGUAGE, "en,zh-Hant")
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        match body.get("SuggestedAddress") {
            Some(Value::Array(items)) => Ok(items.clone()),
            _ => Ok(Vec::new()),
        }
    }
}
