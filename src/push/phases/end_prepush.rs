//! Terminal phase for pre-push runs.
//!
//! A pre-push stages content bytes without touching repository membership
//! or publishing anything, so nothing reaches a final state here; items
//! are simply drained and their last known state reported.

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;
use crate::push::phase::{ItemReceiver, Phase, RecordSender};

pub struct EndPrePush {
    pub rx: ItemReceiver,
    pub records: RecordSender,
}

#[async_trait]
impl Phase for EndPrePush {
    const NAME: &'static str = "end-pre-push";

    async fn run(mut self) -> Result<()> {
        let mut count = 0usize;
        while let Some(item) = self.rx.recv().await? {
            self.records.send_one(&item);
            count += 1;
        }
        info!(count, "pre-push complete, content staged only");
        Ok(())
    }
}
