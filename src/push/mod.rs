//! The push pipeline.
//!
//! A push runs as a chain of concurrently executing phases connected by
//! bounded item channels: items are discovered, checksummed, matched
//! against the catalog, uploaded, updated, associated into their
//! destination repositories, and finally published in one barrier. A
//! collect phase listens on a side channel and records item outcomes
//! throughout.
//!
//! A pre-push run stops after the upload phase: content bytes are staged
//! but no repository membership changes and nothing is published.

pub mod context;
pub mod phase;
pub mod phases;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::client::CatalogClient;
use crate::collector::Collector;
use crate::error::{CourierError, Result};
use crate::publisher::Publisher;
use crate::source::PushSource;
use crate::unit::PublishOptions;

use context::Context;
use phase::{item_channel, start, unbounded_item_channel, Phase, RecordSender};
use phases::{
    Associate, Collect, EndPrePush, LoadChecksums, LoadItems, Publish, QueryPulp, Update, Upload,
};

const PROGRESS_INTERVAL_VAR: &str = "COURIER_PROGRESS_INTERVAL";

fn progress_interval() -> Duration {
    let secs = std::env::var(PROGRESS_INTERVAL_VAR)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(300);
    Duration::from_secs(secs)
}

#[derive(Debug, Clone, Default)]
pub struct PushConfig {
    /// Permit RPMs without an embedded signature.
    pub allow_unsigned: bool,
    /// Stage content bytes only; no membership changes, no publish.
    pub pre_push: bool,
    /// Run the full pipeline but leave repositories unpublished.
    pub skip_publish: bool,
    pub publish: PublishOptions,
}

/// Run one push end to end. Returns the first fatal phase error, if any.
pub async fn push(
    source: Arc<dyn PushSource>,
    client: Arc<dyn CatalogClient>,
    publisher: Arc<Publisher>,
    collector: Arc<dyn Collector>,
    config: PushConfig,
) -> Result<()> {
    info!(source = %source.url(), pre_push = config.pre_push, "starting push");
    let ctx = Arc::new(Context::new());
    let (records, record_rx) = RecordSender::channel();

    let load_progress = ctx.progress(LoadItems::NAME);
    let sums_progress = ctx.progress(LoadChecksums::NAME);
    let query_progress = ctx.progress(QueryPulp::NAME);
    let upload_progress = ctx.progress(Upload::NAME);

    // Discovery output is unbounded: item totals should be known as early
    // as possible, regardless of downstream backpressure.
    let (loaded_tx, loaded_rx) = unbounded_item_channel(&ctx);
    let loaded_tx = loaded_tx.counted(load_progress.clone());
    let loaded_rx = loaded_rx.counted(sums_progress.clone());
    let (summed_tx, summed_rx) = item_channel(&ctx);
    let summed_tx = summed_tx.counted(sums_progress);
    let summed_rx = summed_rx.counted(query_progress.clone());
    let (queried_tx, queried_rx) = item_channel(&ctx);
    let queried_tx = queried_tx.counted(query_progress);
    let queried_rx = queried_rx.counted(upload_progress.clone());
    let (uploaded_tx, uploaded_rx) = item_channel(&ctx);
    let uploaded_tx = uploaded_tx.counted(upload_progress);

    let mut handles = vec![
        start(
            LoadItems {
                source,
                allow_unsigned: config.allow_unsigned,
                pre_push: config.pre_push,
                progress: load_progress,
                tx: loaded_tx,
                records: records.clone(),
            },
            ctx.clone(),
        ),
        start(
            LoadChecksums {
                rx: loaded_rx,
                tx: summed_tx,
            },
            ctx.clone(),
        ),
        start(
            QueryPulp {
                client: client.clone(),
                rx: summed_rx,
                tx: queried_tx,
                records: records.clone(),
            },
            ctx.clone(),
        ),
        start(
            Upload {
                client: client.clone(),
                pre_push: config.pre_push,
                rx: queried_rx,
                tx: uploaded_tx,
                records: records.clone(),
            },
            ctx.clone(),
        ),
    ];

    if config.pre_push {
        handles.push(start(
            EndPrePush {
                rx: uploaded_rx.counted(ctx.progress(EndPrePush::NAME)),
                records: records.clone(),
            },
            ctx.clone(),
        ));
    } else {
        let update_progress = ctx.progress(Update::NAME);
        let associate_progress = ctx.progress(Associate::NAME);
        let (updated_tx, updated_rx) = item_channel(&ctx);
        let updated_tx = updated_tx.counted(update_progress.clone());
        let updated_rx = updated_rx.counted(associate_progress.clone());
        let (associated_tx, associated_rx) = item_channel(&ctx);
        let associated_tx = associated_tx.counted(associate_progress);
        let associated_rx = associated_rx.counted(ctx.progress(Publish::NAME));
        handles.push(start(
            Update {
                client: client.clone(),
                rx: uploaded_rx.counted(update_progress),
                tx: updated_tx,
                records: records.clone(),
            },
            ctx.clone(),
        ));
        handles.push(start(
            Associate {
                client: client.clone(),
                rx: updated_rx,
                tx: associated_tx,
                records: records.clone(),
            },
            ctx.clone(),
        ));
        handles.push(start(
            Publish {
                client,
                publisher,
                options: config.publish,
                skip: config.skip_publish,
                rx: associated_rx,
                records: records.clone(),
            },
            ctx.clone(),
        ));
    }

    handles.push(start(
        Collect {
            collector,
            rx: record_rx,
        },
        ctx.clone(),
    ));
    // Only the phases hold record senders now; collect terminates with them.
    drop(records);

    let progress_logger = {
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(progress_interval());
            // The first tick fires immediately; progress is all zeroes then.
            tick.tick().await;
            loop {
                tick.tick().await;
                ctx.log_progress();
            }
        })
    };

    for handle in handles {
        if let Err(err) = handle.await {
            error!(%err, "phase task panicked");
            ctx.set_error("join", &CourierError::Remote(err.to_string()));
        }
    }
    progress_logger.abort();
    ctx.log_progress();

    match ctx.error_detail() {
        Some(detail) => Err(CourierError::Pipeline(detail)),
        None => Ok(()),
    }
}
