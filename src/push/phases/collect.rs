//! Collect phase: stream item outcome records to the collector.
//!
//! Runs alongside every other phase on its own channel. Within one batch,
//! records describing the same item are collapsed to the most recent one.
//! Collector failures are logged and swallowed; the outcome ledger never
//! fails a push.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

use crate::collector::{Collector, PushItemRecord};
use crate::error::Result;
use crate::push::phase::Phase;

pub struct Collect {
    pub collector: Arc<dyn Collector>,
    pub rx: UnboundedReceiver<Vec<PushItemRecord>>,
}

#[async_trait]
impl Phase for Collect {
    const NAME: &'static str = "collect";

    async fn run(mut self) -> Result<()> {
        while let Some(batch) = self.rx.recv().await {
            let batch = dedup_keep_last(batch);
            if let Err(err) = self.collector.update_push_items(batch).await {
                warn!(%err, "failed to record push item outcomes");
            }
        }
        Ok(())
    }
}

fn dedup_keep_last(batch: Vec<PushItemRecord>) -> Vec<PushItemRecord> {
    let mut seen = HashSet::new();
    let mut out: Vec<PushItemRecord> = batch
        .into_iter()
        .rev()
        .filter(|record| {
            seen.insert((
                record.filename.clone(),
                record.dest.clone(),
                record.src.clone(),
            ))
        })
        .collect();
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(filename: &str, state: &str) -> PushItemRecord {
        PushItemRecord {
            origin: "staged".to_string(),
            state: state.to_string(),
            filename: filename.to_string(),
            checksums: None,
            signing_key: None,
            src: None,
            dest: Some(vec!["repo".to_string()]),
            build: None,
        }
    }

    #[test]
    fn keeps_the_most_recent_record_per_item() {
        let batch = vec![
            record("a", "PENDING"),
            record("b", "PENDING"),
            record("a", "PUSHED"),
        ];
        let out = dedup_keep_last(batch);
        assert_eq!(out.len(), 2);
        assert_eq!((out[0].filename.as_str(), out[0].state.as_str()), ("b", "PENDING"));
        assert_eq!((out[1].filename.as_str(), out[1].state.as_str()), ("a", "PUSHED"));
    }
}
