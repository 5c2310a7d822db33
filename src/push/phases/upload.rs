//! Upload phase: get missing content bytes into the catalog.
//!
//! Non-direct types (RPMs, files) are uploaded once per distinct content
//! key; duplicate items within one run share a single in-flight upload.
//! Direct types (modulemd streams, advisories) are uploaded into every
//! destination repository individually and need no later association.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;
use tracing::info;

use crate::client::{CatalogClient, FileUploadSpec};
use crate::error::{CourierError, Result};
use crate::items::{erratum, file, rpm, ItemState, ItemVariant, PushItem};
use crate::push::phase::{for_each_concurrent, ItemReceiver, ItemSender, Phase, RecordSender};

const CONCURRENCY: usize = 4;

/// Errors crossing a shared future must be Clone; carry the message.
type SharedUpload = Shared<BoxFuture<'static, std::result::Result<(), String>>>;

pub struct Upload {
    pub client: Arc<dyn CatalogClient>,
    pub pre_push: bool,
    pub rx: ItemReceiver,
    pub tx: ItemSender,
    pub records: RecordSender,
}

#[async_trait]
impl Phase for Upload {
    const NAME: &'static str = "upload";

    async fn run(mut self) -> Result<()> {
        let in_flight: Arc<Mutex<HashMap<String, SharedUpload>>> = Arc::default();
        let client = self.client.clone();
        let records = self.records.clone();
        let pre_push = self.pre_push;

        for_each_concurrent(&mut self.rx, &self.tx, CONCURRENCY, move |item| {
            let client = client.clone();
            let records = records.clone();
            let in_flight = in_flight.clone();
            async move {
                let before = item.state;
                let out = process(client, in_flight, pre_push, item).await?;
                if out.state != before {
                    records.send_one(&out);
                }
                Ok(out)
            }
        })
        .await
    }
}

async fn process(
    client: Arc<dyn CatalogClient>,
    in_flight: Arc<Mutex<HashMap<String, SharedUpload>>>,
    pre_push: bool,
    item: PushItem,
) -> Result<PushItem> {
    if pre_push && !item.can_pre_push() {
        return Ok(item.with_state(ItemState::Skipped));
    }
    if item.state != ItemState::Pending {
        // Already in the catalog; membership is the associate phase's job.
        return Ok(item);
    }
    if item.direct_upload() {
        return upload_direct(client, item).await;
    }

    let key = item.upload_key().ok_or_else(|| {
        CourierError::Invalid(format!("no checksum known for {}", item.source.name))
    })?;
    let upload = {
        let mut map = in_flight.lock().await;
        match map.get(&key) {
            Some(upload) => upload.clone(),
            None => {
                let upload = upload_once(client, item.clone()).boxed().shared();
                map.insert(key, upload.clone());
                upload
            }
        }
    };
    upload.await.map_err(CourierError::Remote)?;
    Ok(item.with_state(ItemState::Uploaded))
}

async fn upload_once(
    client: Arc<dyn CatalogClient>,
    item: PushItem,
) -> std::result::Result<(), String> {
    let result: Result<()> = async {
        let src = item.source.src.as_deref().ok_or_else(|| {
            CourierError::Invalid(format!("no source file for {}", item.source.name))
        })?;
        let repo_id = item.upload_repo_id()?;
        info!(item = %item.source.name, repo = %repo_id, "uploading");
        match item.variant {
            ItemVariant::Rpm => {
                let cdn_path = rpm::cdn_path(&item.source)?;
                client.upload_rpm(&repo_id, src, &cdn_path).await?;
            }
            ItemVariant::File => {
                let spec = FileUploadSpec {
                    relative_url: item.source.name.clone(),
                    cdn_path: file::cdn_path(&item.source),
                    ..FileUploadSpec::default()
                };
                client.upload_file(&repo_id, src, spec).await?;
            }
            _ => {
                return Err(CourierError::Invalid(format!(
                    "{} content is not byte-uploadable",
                    item.variant.name()
                )))
            }
        }
        Ok(())
    }
    .await;
    result.map_err(|e| e.to_string())
}

async fn upload_direct(client: Arc<dyn CatalogClient>, item: PushItem) -> Result<PushItem> {
    let src = item.source.src.clone().ok_or_else(|| {
        CourierError::Invalid(format!("no source file for {}", item.source.name))
    })?;
    match item.variant {
        ItemVariant::Modulemd => {
            for dest in &item.source.dest {
                info!(item = %item.source.name, repo = %dest, "uploading modulemd stream");
                client.upload_modulemd(dest, &src).await?;
            }
        }
        ItemVariant::Erratum => {
            let advisory = tokio::task::spawn_blocking(move || erratum::load(&src))
                .await
                .map_err(|e| CourierError::Invalid(format!("advisory load failed: {e}")))??;
            for dest in &item.source.dest {
                info!(advisory = %advisory.id, repo = %dest, "uploading advisory");
                client.upload_erratum(dest, &advisory).await?;
            }
        }
        _ => {
            return Err(CourierError::Invalid(format!(
                "{} content is not direct-uploadable",
                item.variant.name()
            )))
        }
    }
    Ok(item.with_uploaded_repos(item.source.dest.clone()))
}
