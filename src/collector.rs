//! Push-item ledger boundary.
//!
//! Whenever a workflow finalizes the outcome of one piece of content
//! (pushed, deleted, skipped...), it records a [`PushItemRecord`] through
//! the [`Collector`] trait. Recording is best-effort bookkeeping: failures
//! are logged and isolated, never content-safety-critical.

use std::collections::BTreeMap;

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::unit::Unit;

/// Outcome record for one push item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushItemRecord {
    pub origin: String,
    pub state: String,
    pub filename: String,
    pub checksums: Option<BTreeMap<String, String>>,
    pub signing_key: Option<String>,
    pub src: Option<String>,
    pub dest: Option<Vec<String>>,
    pub build: Option<String>,
}

impl PushItemRecord {
    /// Record for a unit affected by a delete. `dest` and `src` are not
    /// recorded for deletions.
    ///
    /// Note: after a delete the server only reliably returns the fields
    /// making up the unit key, and the recorded signing_key is always None
    /// even when the removed RPM had one. We preserve that behavior.
    pub fn for_deleted_unit(unit: &Unit) -> PushItemRecord {
        let (filename, checksums) = match unit {
            Unit::Rpm(u) => {
                let mut sums = BTreeMap::new();
                if let Some(sha256) = &u.sha256sum {
                    sums.insert("sha256".to_string(), sha256.clone());
                }
                let sums = if sums.is_empty() { None } else { Some(sums) };
                (u.canonical_filename(), sums)
            }
            Unit::File(u) => {
                let mut sums = BTreeMap::new();
                if let Some(sha256) = &u.sha256sum {
                    sums.insert("sha256".to_string(), sha256.clone());
                }
                let sums = if sums.is_empty() { None } else { Some(sums) };
                (u.path.clone(), sums)
            }
            Unit::Modulemd(u) => (u.nsvca(), None),
            Unit::Erratum(u) => (u.id.clone(), None),
        };

        PushItemRecord {
            origin: "pulp".to_string(),
            state: "DELETED".to_string(),
            filename,
            checksums,
            signing_key: None,
            src: None,
            dest: None,
            build: None,
        }
    }
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Collector: Send + Sync {
    /// Record a batch of outcome records.
    async fn update_push_items(&self, items: Vec<PushItemRecord>) -> Result<()>;
}

/// Default collector: logs each record. Used when no external ledger is
/// wired in.
pub struct LoggingCollector;

#[async_trait]
impl Collector for LoggingCollector {
    async fn update_push_items(&self, items: Vec<PushItemRecord>) -> Result<()> {
        for item in items {
            info!(
                filename = %item.filename,
                state = %item.state,
                dest = ?item.dest,
                "push item"
            );
        }
        Ok(())
    }
}
