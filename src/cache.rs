//! Downstream cache boundaries: CDN edge cache purge and UD cache flush.

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use tracing::{error, info};

use crate::error::{CourierError, Result};

/// Environment variable overriding where CDN purge URLs are rooted.
pub const CDN_ROOT_URL_VAR: &str = "CDN_ROOT_URL";

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait CdnClient: Send + Sync {
    /// Purge the given absolute URLs from the CDN edge cache.
    async fn purge_by_url(&self, urls: Vec<String>) -> Result<()>;
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait UdCacheClient: Send + Sync {
    async fn flush_repo(&self, repo_id: &str) -> Result<()>;
    async fn flush_product(&self, product_id: i64) -> Result<()>;
}

/// HTTP client for a CDN purge API: posts the URL batch to a single
/// purge endpoint.
pub struct HttpCdnClient {
    purge_url: String,
    http: reqwest::Client,
}

impl HttpCdnClient {
    pub fn new(purge_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| CourierError::CacheFlush(format!("building cdn client: {e}")))?;
        Ok(HttpCdnClient {
            purge_url: purge_url.to_string(),
            http,
        })
    }
}

#[async_trait]
impl CdnClient for HttpCdnClient {
    async fn purge_by_url(&self, urls: Vec<String>) -> Result<()> {
        info!(count = urls.len(), "purging CDN urls");
        let body = serde_json::json!({ "urls": urls });
        self.http
            .post(&self.purge_url)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CourierError::CacheFlush(format!("cdn purge: {e}")))?;
        Ok(())
    }
}

/// HTTP client for the UD cache flush API.
///
/// Yes, an HTTP GET is what flushes the cache; that is simply how the
/// service's API works.
pub struct HttpUdCacheClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpUdCacheClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| CourierError::CacheFlush(format!("building ud client: {e}")))?;
        Ok(HttpUdCacheClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn flush_object(&self, object_type: &str, object_id: &str) -> Result<()> {
        let url = format!(
            "{}/internal/rcm/flush-cache/{}/{}",
            self.base_url, object_type, object_id
        );
        info!(object_type, object_id, "Invalidating");

        let result = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                error!(object_type, object_id, error = %e, "Invalidating failed");
                Err(CourierError::CacheFlush(format!(
                    "{object_type} {object_id}: {e}"
                )))
            }
        }
    }
}

#[async_trait]
impl UdCacheClient for HttpUdCacheClient {
    async fn flush_repo(&self, repo_id: &str) -> Result<()> {
        self.flush_object("repo", repo_id).await
    }

    async fn flush_product(&self, product_id: i64) -> Result<()> {
        self.flush_object("eng-product", &product_id.to_string())
            .await
    }
}
