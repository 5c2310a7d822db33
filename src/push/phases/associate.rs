//! Associate phase: ensure every item is a member of its destination
//! repositories.
//!
//! Content already present somewhere in the catalog is copied by criteria
//! from a repo holding it into each missing destination. RPM association
//! is held back until the upstream stream closes: by then every upload
//! (including modulemd streams) has completed, so an RPM can never become
//! repo member before the module that references it.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, info};

use crate::client::CatalogClient;
use crate::error::{CourierError, Result};
use crate::items::{ItemState, ItemVariant, PushItem};
use crate::push::phase::{ItemReceiver, ItemSender, Phase, RecordSender};

pub struct Associate {
    pub client: Arc<dyn CatalogClient>,
    pub rx: ItemReceiver,
    pub tx: ItemSender,
    pub records: RecordSender,
}

#[async_trait]
impl Phase for Associate {
    const NAME: &'static str = "associate";

    async fn run(mut self) -> Result<()> {
        let mut deferred_rpms = Vec::new();

        while let Some(item) = self.rx.recv().await? {
            if !needs_association(&item) {
                self.tx.send(item).await?;
            } else if item.variant == ItemVariant::Rpm {
                deferred_rpms.push(item);
            } else {
                let out = associate(self.client.clone(), item).await?;
                self.records.send_one(&out);
                self.tx.send(out).await?;
            }
        }

        if !deferred_rpms.is_empty() {
            debug!(count = deferred_rpms.len(), "associating deferred RPMs");
        }
        let mut in_flight: FuturesUnordered<_> = deferred_rpms
            .into_iter()
            .map(|item| associate(self.client.clone(), item))
            .collect();
        while let Some(done) = in_flight.next().await {
            let out = done?;
            self.records.send_one(&out);
            self.tx.send(out).await?;
        }
        Ok(())
    }
}

fn needs_association(item: &PushItem) -> bool {
    matches!(item.state, ItemState::Uploaded | ItemState::Exists)
}

async fn associate(client: Arc<dyn CatalogClient>, item: PushItem) -> Result<PushItem> {
    let criteria = item.criteria().ok_or_else(|| {
        CourierError::Invalid(format!("cannot associate {} by criteria", item.source.name))
    })?;

    let (from_repo, missing): (String, Vec<String>) = match (&item.state, &item.unit) {
        (ItemState::Uploaded, _) => (item.upload_repo_id()?, item.source.dest.clone()),
        (ItemState::Exists, Some(unit)) => {
            let memberships = unit.repository_memberships();
            let from = memberships.first().cloned().ok_or_else(|| {
                CourierError::Invalid(format!(
                    "{} exists but is in no repository",
                    item.source.name
                ))
            })?;
            let missing = item
                .source
                .dest
                .iter()
                .filter(|dest| !memberships.contains(dest))
                .cloned()
                .collect();
            (from, missing)
        }
        _ => {
            return Err(CourierError::Invalid(format!(
                "{} is not in an associable state",
                item.source.name
            )))
        }
    };

    for dest in &missing {
        info!(item = %item.source.name, from = %from_repo, to = %dest, "associating");
        client
            .copy_content(&from_repo, dest, criteria.clone())
            .await?;
    }
    Ok(item.with_state(ItemState::InRepos))
}
