//! Checksum phase: ensure every item carries a sha256 sum.

use async_trait::async_trait;

use crate::error::{CourierError, Result};
use crate::push::phase::{for_each_concurrent, ItemReceiver, ItemSender, Phase};

/// Parallel file reads; checksumming is I/O bound.
const CONCURRENCY: usize = 4;

pub struct LoadChecksums {
    pub rx: ItemReceiver,
    pub tx: ItemSender,
}

#[async_trait]
impl Phase for LoadChecksums {
    const NAME: &'static str = "load-checksums";

    async fn run(mut self) -> Result<()> {
        for_each_concurrent(&mut self.rx, &self.tx, CONCURRENCY, |item| async move {
            if !item.blocking_checksums() {
                return Ok(item);
            }
            tokio::task::spawn_blocking(move || item.load_checksums())
                .await
                .map_err(|e| CourierError::Invalid(format!("checksum task failed: {e}")))?
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::PushItem;
    use crate::push::context::Context;
    use crate::push::phase::item_channel;
    use crate::source::{SourceItem, SourceItemKind};
    use std::sync::Arc;

    #[tokio::test]
    async fn fills_missing_checksums() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("some-iso");
        std::fs::write(&path, b"hello").unwrap();

        let item = PushItem::for_source(SourceItem {
            name: "some-iso".to_string(),
            kind: SourceItemKind::File,
            src: Some(path),
            dest: vec!["repo".to_string()],
            sha256sum: None,
            md5sum: None,
            signing_key: None,
            size: None,
            build: None,
            origin: "staged".to_string(),
        })
        .unwrap();

        let ctx = Arc::new(Context::new());
        let (tx_in, rx_in) = item_channel(&ctx);
        let (tx_out, mut rx_out) = item_channel(&ctx);
        tx_in.send(item).await.unwrap();
        drop(tx_in);

        LoadChecksums {
            rx: rx_in,
            tx: tx_out,
        }
        .run()
        .await
        .unwrap();

        let out = rx_out.recv().await.unwrap().unwrap();
        assert_eq!(
            out.source.sha256sum.as_deref(),
            Some("2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824")
        );
    }
}
