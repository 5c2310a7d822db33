//! Phase plumbing for the push pipeline.
//!
//! Each phase is a task connected to its neighbours by item channels.
//! Channel wrappers race every send/recv against the run-wide error flag,
//! so a fatal error in any phase unblocks the rest. A closed channel is
//! the end-of-stream signal; there is no in-band sentinel.
//!
//! All channels are bounded except the discovery phase's output: item
//! totals should be known as early as possible, so discovery never sees
//! backpressure from later phases.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::collector::PushItemRecord;
use crate::error::{CourierError, Result};
use crate::items::PushItem;

use super::context::{Context, ProgressInfo};

/// Depth of the inter-phase item queues.
pub const QUEUE_SIZE: usize = 100;

#[async_trait]
pub trait Phase: Send + 'static {
    const NAME: &'static str;

    async fn run(self) -> Result<()>;
}

/// Spawn a phase, routing its terminal result into the shared context.
pub fn start<P: Phase>(phase: P, ctx: Arc<Context>) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!(phase = P::NAME, "phase starting");
        match phase.run().await {
            Ok(()) => info!(phase = P::NAME, "phase done"),
            Err(err) if err.is_interrupted() => {
                debug!(phase = P::NAME, %err, "phase interrupted")
            }
            Err(err) => {
                error!(phase = P::NAME, %err, "phase failed");
                ctx.set_error(P::NAME, &err);
            }
        }
    })
}

pub fn item_channel(ctx: &Arc<Context>) -> (ItemSender, ItemReceiver) {
    let (tx, rx) = mpsc::channel(QUEUE_SIZE);
    (
        ItemSender {
            tx: ItemTx::Bounded(tx),
            ctx: ctx.clone(),
            progress: None,
        },
        ItemReceiver {
            rx: ItemRx::Bounded(rx),
            ctx: ctx.clone(),
            progress: None,
        },
    )
}

/// Channel without a depth limit, for the discovery phase's output.
pub fn unbounded_item_channel(ctx: &Arc<Context>) -> (ItemSender, ItemReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ItemSender {
            tx: ItemTx::Unbounded(tx),
            ctx: ctx.clone(),
            progress: None,
        },
        ItemReceiver {
            rx: ItemRx::Unbounded(rx),
            ctx: ctx.clone(),
            progress: None,
        },
    )
}

#[derive(Clone)]
enum ItemTx {
    Bounded(mpsc::Sender<PushItem>),
    Unbounded(mpsc::UnboundedSender<PushItem>),
}

enum ItemRx {
    Bounded(mpsc::Receiver<PushItem>),
    Unbounded(mpsc::UnboundedReceiver<PushItem>),
}

#[derive(Clone)]
pub struct ItemSender {
    tx: ItemTx,
    ctx: Arc<Context>,
    progress: Option<Arc<ProgressInfo>>,
}

impl ItemSender {
    /// Count every sent item as emitted by the producing phase.
    pub fn counted(mut self, progress: Arc<ProgressInfo>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn send(&self, item: PushItem) -> Result<()> {
        match &self.tx {
            ItemTx::Bounded(tx) => {
                tokio::select! {
                    _ = self.ctx.interrupted() => {
                        return Err(CourierError::Interrupted("sending item downstream".into()));
                    }
                    sent = tx.send(item) => sent.map_err(|_| {
                        CourierError::Interrupted("downstream phase stopped receiving".into())
                    })?,
                }
            }
            ItemTx::Unbounded(tx) => {
                if self.ctx.has_error() {
                    return Err(CourierError::Interrupted("sending item downstream".into()));
                }
                tx.send(item).map_err(|_| {
                    CourierError::Interrupted("downstream phase stopped receiving".into())
                })?;
            }
        }
        if let Some(progress) = &self.progress {
            progress.incr_out();
        }
        Ok(())
    }

    pub async fn send_all(&self, items: Vec<PushItem>) -> Result<()> {
        for item in items {
            self.send(item).await?;
        }
        Ok(())
    }
}

pub struct ItemReceiver {
    rx: ItemRx,
    ctx: Arc<Context>,
    progress: Option<Arc<ProgressInfo>>,
}

impl ItemReceiver {
    /// Count every received item as read by the consuming phase.
    pub fn counted(mut self, progress: Arc<ProgressInfo>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Next item, or None at end-of-stream.
    pub async fn recv(&mut self) -> Result<Option<PushItem>> {
        let ctx = self.ctx.clone();
        let item = match &mut self.rx {
            ItemRx::Bounded(rx) => {
                tokio::select! {
                    _ = ctx.interrupted() => {
                        return Err(CourierError::Interrupted(
                            "receiving item from upstream".into(),
                        ));
                    }
                    item = rx.recv() => item,
                }
            }
            ItemRx::Unbounded(rx) => {
                tokio::select! {
                    _ = ctx.interrupted() => {
                        return Err(CourierError::Interrupted(
                            "receiving item from upstream".into(),
                        ));
                    }
                    item = rx.recv() => item,
                }
            }
        };
        if item.is_some() {
            if let Some(progress) = &self.progress {
                progress.incr_in();
            }
        }
        Ok(item)
    }

    fn try_recv(&mut self) -> Option<PushItem> {
        let item = match &mut self.rx {
            ItemRx::Bounded(rx) => rx.try_recv().ok(),
            ItemRx::Unbounded(rx) => rx.try_recv().ok(),
        };
        if item.is_some() {
            if let Some(progress) = &self.progress {
                progress.incr_in();
            }
        }
        item
    }

    /// Up to `max` items: waits for the first, then drains whatever is
    /// already queued. Empty result means end-of-stream.
    pub async fn recv_batch(&mut self, max: usize) -> Result<Vec<PushItem>> {
        let mut batch = Vec::new();
        match self.recv().await? {
            None => return Ok(batch),
            Some(item) => batch.push(item),
        }
        while batch.len() < max {
            match self.try_recv() {
                Some(item) => batch.push(item),
                None => break,
            }
        }
        Ok(batch)
    }
}

/// Run `work` over every incoming item with bounded concurrency, sending
/// each produced item downstream as it completes. Completion order is not
/// arrival order.
pub async fn for_each_concurrent<F, Fut>(
    rx: &mut ItemReceiver,
    tx: &ItemSender,
    limit: usize,
    work: F,
) -> Result<()>
where
    F: Fn(PushItem) -> Fut,
    Fut: Future<Output = Result<PushItem>>,
{
    let mut in_flight = FuturesUnordered::new();
    let mut upstream_open = true;

    while upstream_open || !in_flight.is_empty() {
        tokio::select! {
            item = rx.recv(), if upstream_open && in_flight.len() < limit => {
                match item? {
                    Some(item) => in_flight.push(work(item)),
                    None => upstream_open = false,
                }
            }
            done = in_flight.next(), if !in_flight.is_empty() => {
                if let Some(done) = done {
                    tx.send(done?).await?;
                }
            }
        }
    }
    Ok(())
}

/// Handle for reporting item state to the collect phase. Senders are
/// cheap to clone; the channel is unbounded so reporting never applies
/// backpressure to the pipeline itself.
#[derive(Clone)]
pub struct RecordSender {
    tx: mpsc::UnboundedSender<Vec<PushItemRecord>>,
}

impl RecordSender {
    pub fn channel() -> (RecordSender, mpsc::UnboundedReceiver<Vec<PushItemRecord>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (RecordSender { tx }, rx)
    }

    /// Report current state of the given items. A closed collect phase is
    /// not an error; records are best-effort.
    pub fn send(&self, items: &[PushItem]) {
        if items.is_empty() {
            return;
        }
        let records = items.iter().map(|item| item.record()).collect();
        let _ = self.tx.send(records);
    }

    pub fn send_one(&self, item: &PushItem) {
        self.send(std::slice::from_ref(item));
    }
}
