//! Update phase: refresh stale mutable fields on existing units.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::client::CatalogClient;
use crate::error::{CourierError, Result};
use crate::items::ItemState;
use crate::push::phase::{for_each_concurrent, ItemReceiver, ItemSender, Phase, RecordSender};

const CONCURRENCY: usize = 4;

pub struct Update {
    pub client: Arc<dyn CatalogClient>,
    pub rx: ItemReceiver,
    pub tx: ItemSender,
    pub records: RecordSender,
}

#[async_trait]
impl Phase for Update {
    const NAME: &'static str = "update";

    async fn run(mut self) -> Result<()> {
        let client = self.client.clone();
        let records = self.records.clone();
        for_each_concurrent(&mut self.rx, &self.tx, CONCURRENCY, move |item| {
            let client = client.clone();
            let records = records.clone();
            async move {
                if item.state != ItemState::NeedsUpdate {
                    return Ok(item);
                }
                let desired = item.unit_for_update().ok_or_else(|| {
                    CourierError::Invalid(format!("nothing to update for {}", item.source.name))
                })?;
                info!(item = %item.source.name, "updating unit fields");
                let stored = client.update_content(desired).await?;
                let out = item.with_unit(Some(stored));
                records.send_one(&out);
                Ok(out)
            }
        })
        .await
    }
}
