//! Query phase: locate each item's existing unit in the catalog.
//!
//! Items are searched in batches: the per-item criteria of one batch are
//! OR-ed into a single search, then results are matched back to items
//! locally. Direct-upload items have no criteria and pass through
//! untouched.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::client::CatalogClient;
use crate::criteria::Criteria;
use crate::error::Result;
use crate::push::phase::{ItemReceiver, ItemSender, Phase, RecordSender};

const BATCH_SIZE: usize = 100;

pub struct QueryPulp {
    pub client: Arc<dyn CatalogClient>,
    pub rx: ItemReceiver,
    pub tx: ItemSender,
    pub records: RecordSender,
}

#[async_trait]
impl Phase for QueryPulp {
    const NAME: &'static str = "query-pulp";

    async fn run(mut self) -> Result<()> {
        loop {
            let batch = self.rx.recv_batch(BATCH_SIZE).await?;
            if batch.is_empty() {
                return Ok(());
            }

            let criteria: Vec<Criteria> =
                batch.iter().filter_map(|item| item.criteria()).collect();
            let units = if criteria.is_empty() {
                Vec::new()
            } else {
                debug!(batch = batch.len(), "searching for existing units");
                self.client.search_content(Criteria::or(criteria)).await?
            };

            for item in batch {
                let out = if item.criteria().is_some() {
                    let matched = item.match_unit(&units);
                    let out = item.with_unit(matched);
                    self.records.send_one(&out);
                    out
                } else {
                    item
                };
                self.tx.send(out).await?;
            }
        }
    }
}
