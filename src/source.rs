//! Content-discovery boundary.
//!
//! A [`PushSource`] emits a sequence of [`SourceItem`] descriptors: one per
//! piece of content requested for push. Real sources (staging directories,
//! advisory feeds, ...) live behind this trait; tests plug in mocks.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::{CourierError, Result};

/// The shape of a discovered descriptor, deciding which push item variant
/// will handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceItemKind {
    Rpm,
    File,
    Modulemd,
    Erratum,
    /// Anything this tool does not handle; skipped with a log message.
    Unsupported,
}

/// One push-item descriptor as emitted by a content source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceItem {
    pub name: String,
    pub kind: SourceItemKind,
    /// Path of the underlying bytes, where the source provides one.
    pub src: Option<PathBuf>,
    /// Requested destinations. May mix repository ids and filesystem paths;
    /// only repository ids are relevant for this tool.
    pub dest: Vec<String>,
    pub sha256sum: Option<String>,
    pub md5sum: Option<String>,
    pub signing_key: Option<String>,
    pub size: Option<u64>,
    pub build: Option<String>,
    pub origin: String,
}

impl SourceItem {
    /// Checksums keyed by algorithm, in the shape outcome records expect.
    pub fn checksums(&self) -> Option<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        if let Some(sha256) = &self.sha256sum {
            out.insert("sha256".to_string(), sha256.clone());
        }
        if let Some(md5) = &self.md5sum {
            out.insert("md5".to_string(), md5.clone());
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait PushSource: Send + Sync {
    /// Yield all items this source provides.
    async fn items(&self) -> Result<Vec<SourceItem>>;

    /// Human-readable identifier for log messages.
    fn url(&self) -> String;
}

/// A source reading a staged directory layout: one subdirectory per
/// destination repository, containing the files destined for it.
///
/// Item kinds are inferred from the filename: `.rpm` files are RPMs,
/// modulemd YAML streams are recognised by a `modulemd` prefix, everything
/// else is treated as a generic file.
pub struct StagedSource {
    root: PathBuf,
}

impl StagedSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StagedSource { root: root.into() }
    }

    fn kind_for(name: &str) -> SourceItemKind {
        if name.ends_with(".rpm") {
            SourceItemKind::Rpm
        } else if name.starts_with("modulemd") && (name.ends_with(".yaml") || name.ends_with(".yml"))
        {
            SourceItemKind::Modulemd
        } else if name.ends_with(".json") {
            // Staged advisories are JSON documents named after the advisory.
            SourceItemKind::Erratum
        } else {
            SourceItemKind::File
        }
    }

    fn read_dir_sorted(path: &Path) -> Result<Vec<std::fs::DirEntry>> {
        let mut entries = std::fs::read_dir(path)?.collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.file_name());
        Ok(entries)
    }
}

#[async_trait]
impl PushSource for StagedSource {
    async fn items(&self) -> Result<Vec<SourceItem>> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let mut out = Vec::new();
            for repo_entry in StagedSource::read_dir_sorted(&root)? {
                if !repo_entry.file_type()?.is_dir() {
                    continue;
                }
                let repo_id = repo_entry.file_name().to_string_lossy().to_string();
                for file_entry in StagedSource::read_dir_sorted(&repo_entry.path())? {
                    if !file_entry.file_type()?.is_file() {
                        continue;
                    }
                    let name = file_entry.file_name().to_string_lossy().to_string();
                    let metadata = file_entry.metadata()?;
                    out.push(SourceItem {
                        kind: StagedSource::kind_for(&name),
                        name,
                        src: Some(file_entry.path()),
                        dest: vec![repo_id.clone()],
                        sha256sum: None,
                        md5sum: None,
                        signing_key: None,
                        size: Some(metadata.len()),
                        build: None,
                        origin: "staged".to_string(),
                    });
                }
            }
            Ok(out)
        })
        .await
        .map_err(|e| CourierError::Remote(format!("source task panicked: {e}")))?
    }

    fn url(&self) -> String {
        format!("staged:{}", self.root.display())
    }
}

/// Resolve a `--source` URL to a concrete source.
///
/// Only the `staged:` scheme is built in; other schemes belong to external
/// source libraries plugged in through [`PushSource`].
pub fn source_for_url(url: &str) -> Result<Box<dyn PushSource>> {
    match url.split_once(':') {
        Some(("staged", path)) => Ok(Box::new(StagedSource::new(path))),
        _ => Err(CourierError::Config(format!(
            "unsupported source url: {url}"
        ))),
    }
}
