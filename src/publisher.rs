//! Repository publishing with ordered cache flushing.
//!
//! Publishing a set of repositories is a strict sequence: the publish of
//! every repository completes first, then registered flush listeners run,
//! then CDN cache purging, then the `cdn_published` stamp on freshly
//! exposed units, and only once the stamp has settled the UD cache flush.
//! Later steps never start while an earlier step is still in flight.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::try_join_all;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use tracing::{debug, info, warn};

use crate::cache::{CdnClient, UdCacheClient, CDN_ROOT_URL_VAR};
use crate::client::CatalogClient;
use crate::criteria::{Criteria, FieldValue};
use crate::error::Result;
use crate::unit::{PublishOptions, Repository, Unit, UnitType};

/// A hook invoked after repositories have been published, before any
/// cache flushing starts. Listeners are scoped to one [`Publisher`]; there
/// is no process-global registry.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait FlushListener: Send + Sync {
    async fn on_publish(&self, repos: &[Repository]) -> Result<()>;
}

pub struct Publisher {
    client: Arc<dyn CatalogClient>,
    cdn: Option<Arc<dyn CdnClient>>,
    ud: Option<Arc<dyn UdCacheClient>>,
    cdn_root_url: Option<String>,
    listeners: Vec<Arc<dyn FlushListener>>,
}

impl Publisher {
    pub fn new(
        client: Arc<dyn CatalogClient>,
        cdn: Option<Arc<dyn CdnClient>>,
        ud: Option<Arc<dyn UdCacheClient>>,
        cdn_root_url: Option<String>,
    ) -> Self {
        // The environment wins over configuration, so operators can
        // redirect purges without touching config.
        let cdn_root_url = std::env::var(CDN_ROOT_URL_VAR).ok().or(cdn_root_url);
        Publisher {
            client,
            cdn,
            ud,
            cdn_root_url,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn FlushListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Publish every repository, then flush the caches in front of them.
    pub async fn publish_with_cache_flush(
        &self,
        repos: Vec<Repository>,
        options: PublishOptions,
    ) -> Result<()> {
        if repos.is_empty() {
            debug!("nothing to publish");
            return Ok(());
        }

        info!(count = repos.len(), "publishing repositories");
        try_join_all(
            repos
                .iter()
                .map(|repo| self.client.publish(&repo.id, options.clone())),
        )
        .await?;

        for listener in &self.listeners {
            listener.on_publish(&repos).await?;
        }

        self.flush_cdn(&repos).await?;
        self.set_cdn_published(&repos).await?;
        self.flush_ud(&repos).await?;
        Ok(())
    }

    /// Purge the CDN cache entries in front of the published repositories.
    async fn flush_cdn(&self, repos: &[Repository]) -> Result<()> {
        let (cdn, root) = match (&self.cdn, &self.cdn_root_url) {
            (Some(cdn), Some(root)) => (cdn, root),
            _ => {
                debug!("CDN cache flush not configured, skipping");
                return Ok(());
            }
        };

        let mut urls = Vec::new();
        let mut seen = BTreeSet::new();
        for repo in repos {
            let mut paths = Vec::new();
            if let Some(relative_url) = &repo.relative_url {
                paths.push(relative_url.clone());
            }
            paths.extend(repo.mutable_urls.iter().cloned());
            for path in paths {
                let url = format!(
                    "{}/{}",
                    root.trim_end_matches('/'),
                    path.trim_start_matches('/')
                );
                if seen.insert(url.clone()) {
                    urls.push(url);
                }
            }
        }

        if urls.is_empty() {
            debug!("no CDN urls to flush");
            return Ok(());
        }
        info!(count = urls.len(), "flushing CDN cache");
        cdn.purge_by_url(urls).await
    }

    /// Stamp freshly exposed units with the time they became reachable
    /// through the CDN. Only runs once the CDN purge has settled, so the
    /// stamp never precedes actual visibility.
    async fn set_cdn_published(&self, repos: &[Repository]) -> Result<()> {
        let criteria = Criteria::and(vec![
            Criteria::or(vec![
                Criteria::with_unit_type(UnitType::Rpm),
                Criteria::with_unit_type(UnitType::File),
            ]),
            Criteria::with_field("cdn_published", FieldValue::Null),
        ]);

        let mut units: Vec<Unit> = Vec::new();
        let mut seen = BTreeSet::new();
        for repo in repos {
            for unit in self
                .client
                .search_repo_content(&repo.id, criteria.clone())
                .await?
            {
                if unit.supports_cdn_published() && seen.insert(unit.display_name()) {
                    units.push(unit);
                }
            }
        }

        if units.is_empty() {
            return Ok(());
        }
        let now = Utc::now();
        info!(count = units.len(), "setting cdn_published on units");
        try_join_all(
            units
                .iter()
                .map(|unit| self.client.update_content(unit.with_cdn_published(now))),
        )
        .await?;
        Ok(())
    }

    /// Flush the UD (Unified Downloads) cache for published repositories.
    /// A repository without an eng product id is not exposed through UD
    /// and is skipped.
    async fn flush_ud(&self, repos: &[Repository]) -> Result<()> {
        let ud = match &self.ud {
            Some(ud) => ud,
            None => {
                debug!("UD cache flush not configured, skipping");
                return Ok(());
            }
        };

        let mut products = BTreeSet::new();
        for repo in repos {
            let product_id = match repo.eng_product_id {
                Some(id) => id,
                None => {
                    warn!(repo = %repo.id, "no eng product id, skipping UD cache flush");
                    continue;
                }
            };
            ud.flush_repo(&repo.id).await?;
            products.insert(product_id);
        }
        for product_id in products {
            ud.flush_product(product_id).await?;
        }
        Ok(())
    }
}
