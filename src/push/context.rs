//! Shared state for one push run.
//!
//! The context carries the run-wide error flag and per-phase progress
//! counters. Any phase hitting a fatal error records it here; every other
//! phase observes the flag through [`Context::interrupted`] and winds down
//! instead of working through the remaining items.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::info;

use crate::error::CourierError;

/// Received/emitted item counts for one phase.
pub struct ProgressInfo {
    name: &'static str,
    in_count: AtomicUsize,
    out_count: AtomicUsize,
}

impl ProgressInfo {
    fn new(name: &'static str) -> Self {
        ProgressInfo {
            name,
            in_count: AtomicUsize::new(0),
            out_count: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn incr_in(&self) {
        self.in_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_out(&self) {
        self.out_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn in_count(&self) -> usize {
        self.in_count.load(Ordering::Relaxed)
    }

    pub fn out_count(&self) -> usize {
        self.out_count.load(Ordering::Relaxed)
    }

    /// Items read from the input and not yet written downstream.
    pub fn in_progress(&self) -> usize {
        self.in_count().saturating_sub(self.out_count())
    }
}

pub struct Context {
    error_tx: watch::Sender<bool>,
    error_rx: watch::Receiver<bool>,
    error_detail: Mutex<Option<String>>,
    progress: Mutex<Vec<Arc<ProgressInfo>>>,
}

impl Context {
    pub fn new() -> Self {
        let (error_tx, error_rx) = watch::channel(false);
        Context {
            error_tx,
            error_rx,
            error_detail: Mutex::new(None),
            progress: Mutex::new(Vec::new()),
        }
    }

    /// The progress counters for the named phase, registering them on
    /// first use. Counters are listed in registration order, which the
    /// pipeline wiring makes the phase order.
    pub fn progress(&self, name: &'static str) -> Arc<ProgressInfo> {
        let mut infos = match self.progress.lock() {
            Ok(infos) => infos,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(found) = infos.iter().find(|info| info.name == name) {
            return found.clone();
        }
        let info = Arc::new(ProgressInfo::new(name));
        infos.push(info.clone());
        info
    }

    /// Log one structured progress line per phase.
    pub fn log_progress(&self) {
        let infos = match self.progress.lock() {
            Ok(infos) => infos.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for info in infos {
            info!(
                phase = info.name(),
                received = info.in_count(),
                sent = info.out_count(),
                in_progress = info.in_progress(),
                "progress"
            );
        }
    }

    /// Record a fatal error. The first error wins; later ones are logged
    /// by the reporting phase wrapper and otherwise dropped.
    pub fn set_error(&self, phase: &str, error: &CourierError) {
        if let Ok(mut detail) = self.error_detail.lock() {
            if detail.is_none() {
                *detail = Some(format!("{phase}: {error}"));
            }
        }
        let _ = self.error_tx.send(true);
    }

    pub fn has_error(&self) -> bool {
        *self.error_rx.borrow()
    }

    /// The first recorded fatal error, if any.
    pub fn error_detail(&self) -> Option<String> {
        self.error_detail.lock().ok().and_then(|d| d.clone())
    }

    /// Resolves once any phase has flagged a fatal error. Phases race this
    /// against their channel operations so an error anywhere stops the
    /// whole pipeline promptly.
    pub async fn interrupted(&self) {
        let mut rx = self.error_rx.clone();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                // Sender dropped without an error: never resolve.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}
