//! First phase: discover push items from the content source.
//!
//! Destinations may mix repository ids with absolute paths (other delivery
//! mechanisms consume the paths); only repository ids survive here. An
//! item left with no destination at all is skipped with a warning, except
//! under pre-push where supported types fall back to their staging
//! location.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{CourierError, Result};
use crate::items::{ItemState, PushItem};
use crate::push::context::ProgressInfo;
use crate::push::phase::{ItemSender, Phase, RecordSender};
use crate::source::PushSource;
use tracing::{info, warn};

pub struct LoadItems {
    pub source: Arc<dyn PushSource>,
    pub allow_unsigned: bool,
    pub pre_push: bool,
    pub progress: Arc<ProgressInfo>,
    pub tx: ItemSender,
    pub records: RecordSender,
}

#[async_trait]
impl Phase for LoadItems {
    const NAME: &'static str = "load-items";

    async fn run(self) -> Result<()> {
        let descriptors = self.source.items().await?;
        info!(
            source = %self.source.url(),
            count = descriptors.len(),
            "discovered push items"
        );

        let mut items = Vec::new();
        let mut invalid = Vec::new();
        let mut unsigned = Vec::new();
        for mut descriptor in descriptors {
            // There is no input channel; count discoveries explicitly.
            self.progress.incr_in();

            // Destinations can mix repo ids with absolute paths consumed
            // by other delivery mechanisms; only repo ids matter here.
            descriptor.dest.retain(|dest| !dest.contains('/'));

            let name = descriptor.name.clone();
            let item = match PushItem::for_source(descriptor) {
                Some(item) => item,
                None => {
                    warn!(item = %name, "unsupported content, skipping");
                    continue;
                }
            };
            if item.source.dest.is_empty() && !(self.pre_push && item.can_pre_push()) {
                warn!(item = %name, "item has no destination, skipping");
                continue;
            }
            if let Err(err) = item.validate() {
                warn!(item = %name, %err, "skipping item");
                invalid.push(item.with_state(ItemState::Invalid));
                continue;
            }
            if item.supports_signing() && !item.is_signed() && !self.allow_unsigned {
                unsigned.push(item.source.name.clone());
            }
            items.push(item);
        }
        self.records.send(&invalid);

        // Signature policy is checked over the whole item set before
        // anything is queued, so a rejected run touches nothing.
        if !unsigned.is_empty() {
            unsigned.sort();
            return Err(CourierError::Config(format!(
                "unsigned RPMs are not permitted: {}",
                unsigned.join(", ")
            )));
        }

        self.records.send(&items);
        self.tx.send_all(items).await
    }
}
