//! Publish phase: publish every touched repository and flush caches.
//!
//! This is a barrier: every item must have settled before any repository
//! is published, so a single publish covers the whole run. Items are
//! drained first, then the affected repositories are resolved and handed
//! to the publisher in one call.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::client::CatalogClient;
use crate::criteria::Criteria;
use crate::error::{CourierError, Result};
use crate::items::{ItemState, PushItem};
use crate::publisher::Publisher;
use crate::push::phase::{ItemReceiver, Phase, RecordSender};
use crate::unit::PublishOptions;

pub struct Publish {
    pub client: Arc<dyn CatalogClient>,
    pub publisher: Arc<Publisher>,
    pub options: PublishOptions,
    /// Drain and record without publishing anything (--skip publish).
    pub skip: bool,
    pub rx: ItemReceiver,
    pub records: RecordSender,
}

#[async_trait]
impl Phase for Publish {
    const NAME: &'static str = "publish";

    async fn run(mut self) -> Result<()> {
        let mut items: Vec<PushItem> = Vec::new();
        let mut repo_ids = BTreeSet::new();
        while let Some(item) = self.rx.recv().await? {
            if item.state.present_in_pulp() {
                repo_ids.extend(item.publish_repos());
            }
            items.push(item);
        }

        if self.skip {
            info!(count = items.len(), "publish skipped by request");
            self.records.send(&items);
            return Ok(());
        }

        if !repo_ids.is_empty() {
            let ids: Vec<String> = repo_ids.iter().cloned().collect();
            let repos = self
                .client
                .search_repository(Criteria::with_id(ids.clone()))
                .await?;
            if repos.len() != ids.len() {
                let found: BTreeSet<&str> = repos.iter().map(|r| r.id.as_str()).collect();
                let missing: Vec<&str> = ids
                    .iter()
                    .map(|id| id.as_str())
                    .filter(|id| !found.contains(id))
                    .collect();
                return Err(CourierError::NotFound {
                    kind: "repository",
                    name: missing.join(", "),
                });
            }
            self.publisher
                .publish_with_cache_flush(repos, self.options)
                .await?;
        }

        let pushed: Vec<PushItem> = items
            .into_iter()
            .map(|item| {
                if item.state.present_in_pulp() {
                    item.with_state(ItemState::Pushed)
                } else {
                    item
                }
            })
            .collect();
        self.records.send(&pushed);
        info!(count = pushed.len(), "push complete");
        Ok(())
    }
}
