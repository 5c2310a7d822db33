//! Polymorphic push item model.
//!
//! A [`PushItem`] wraps a source-provided descriptor together with
//! everything the pipeline learns about it: its content-type variant, its
//! lifecycle state, and the matching remote unit once known. Items are
//! never mutated in place; each phase replaces an item with an enriched
//! copy and hands ownership downstream.
//!
//! Per-type logic (criteria, unit matching, upload destinations) lives in
//! the sibling modules and is dispatched over the closed [`ItemVariant`]
//! set.

pub mod erratum;
pub mod file;
pub mod modulemd;
pub mod rpm;

use serde::{Deserialize, Serialize};

use crate::collector::PushItemRecord;
use crate::criteria::Criteria;
use crate::error::{CourierError, Result};
use crate::source::{SourceItem, SourceItemKind};
use crate::unit::Unit;

/// Lifecycle state of a push item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    /// Not yet known to exist in the catalog.
    Pending,
    /// Bytes uploaded this run, membership not yet ensured.
    Uploaded,
    /// Exists in the catalog but not in every destination repo.
    Exists,
    /// Exists with stale mutable fields, regardless of membership.
    NeedsUpdate,
    /// Exists in every destination repo.
    InRepos,
    Invalid,
    Skipped,
    /// Fully pushed and published.
    Pushed,
    Deleted,
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemState::Pending => "PENDING",
            ItemState::Uploaded => "UPLOADED",
            ItemState::Exists => "EXISTS",
            ItemState::NeedsUpdate => "EXISTS",
            ItemState::InRepos => "EXISTS",
            ItemState::Invalid => "INVALID",
            ItemState::Skipped => "SKIPPED",
            ItemState::Pushed => "PUSHED",
            ItemState::Deleted => "DELETED",
        }
    }

    /// True if this state means the item's content is in the catalog.
    pub fn present_in_pulp(&self) -> bool {
        matches!(
            self,
            ItemState::Uploaded
                | ItemState::Exists
                | ItemState::NeedsUpdate
                | ItemState::InRepos
                | ItemState::Pushed
        )
    }
}

/// The closed set of content-type variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemVariant {
    Rpm,
    File,
    Modulemd,
    Erratum,
}

impl ItemVariant {
    pub fn name(&self) -> &'static str {
        match self {
            ItemVariant::Rpm => "rpm",
            ItemVariant::File => "file",
            ItemVariant::Modulemd => "modulemd",
            ItemVariant::Erratum => "erratum",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PushItem {
    pub source: SourceItem,
    pub variant: ItemVariant,
    pub state: ItemState,
    /// The matching remote unit, once a catalog query has run.
    pub unit: Option<Unit>,
    /// For direct-upload variants: repos we have uploaded into this run.
    pub uploaded_repos: Vec<String>,
}

impl PushItem {
    /// Map a discovered descriptor to its variant. Returns None for
    /// descriptor shapes this tool does not handle.
    pub fn for_source(source: SourceItem) -> Option<PushItem> {
        let variant = match source.kind {
            SourceItemKind::Rpm => ItemVariant::Rpm,
            SourceItemKind::File => ItemVariant::File,
            SourceItemKind::Modulemd => ItemVariant::Modulemd,
            SourceItemKind::Erratum => ItemVariant::Erratum,
            SourceItemKind::Unsupported => return None,
        };
        Some(PushItem {
            source,
            variant,
            state: ItemState::Pending,
            unit: None,
            uploaded_repos: Vec::new(),
        })
    }

    // -- capability flags ---------------------------------------------------

    /// Whether content of this type can be signed at all.
    pub fn supports_signing(&self) -> bool {
        self.variant == ItemVariant::Rpm
    }

    pub fn is_signed(&self) -> bool {
        self.source
            .signing_key
            .as_deref()
            .map(|k| !k.is_empty())
            .unwrap_or(false)
    }

    /// Whether this type can be staged without any explicit destination
    /// (pre-push), via its type-specific default upload location.
    pub fn can_pre_push(&self) -> bool {
        self.variant == ItemVariant::Rpm
    }

    /// Whether uploads of this type need a dedicated per-run context
    /// rather than one shared across the whole run.
    pub fn multi_upload_context(&self) -> bool {
        self.variant == ItemVariant::Rpm
    }

    /// Direct-upload types are uploaded into every destination repo
    /// individually; there is no way to check whether their content
    /// already exists, and no separate associate step.
    pub fn direct_upload(&self) -> bool {
        matches!(self.variant, ItemVariant::Modulemd | ItemVariant::Erratum)
    }

    // -- per-type logic -----------------------------------------------------

    /// Search criteria locating this item's equivalent in the catalog, or
    /// None for direct-upload types.
    pub fn criteria(&self) -> Option<Criteria> {
        match self.variant {
            ItemVariant::Rpm => rpm::criteria(&self.source),
            ItemVariant::File => file::criteria(&self.source),
            _ => None,
        }
    }

    /// Pick the matching unit for this item out of a search result.
    pub fn match_unit(&self, units: &[Unit]) -> Option<Unit> {
        match self.variant {
            ItemVariant::Rpm => rpm::match_unit(&self.source, units),
            ItemVariant::File => file::match_unit(&self.source, units),
            _ => None,
        }
    }

    /// A key identifying reusable uploads: any prior upload with the same
    /// key within one run can stand in for this item's upload.
    pub fn upload_key(&self) -> Option<String> {
        match self.variant {
            ItemVariant::Rpm => self.source.sha256sum.clone(),
            ItemVariant::File => self
                .source
                .sha256sum
                .as_ref()
                .map(|sum| format!("{}:{}", self.source.name, sum)),
            _ => None,
        }
    }

    /// The repository this item's bytes are uploaded into (non-direct
    /// types only).
    pub fn upload_repo_id(&self) -> Result<String> {
        match self.variant {
            ItemVariant::Rpm => rpm::upload_repo_id(&self.source),
            ItemVariant::File => self.source.dest.first().cloned().ok_or_else(|| {
                CourierError::Config(format!("no destination for {}", self.source.name))
            }),
            _ => Err(CourierError::Config(format!(
                "{} content has no single upload repo",
                self.variant.name()
            ))),
        }
    }

    /// Desired CDN path for this item, where the type has one.
    pub fn cdn_path(&self) -> Result<Option<String>> {
        match self.variant {
            ItemVariant::Rpm => rpm::cdn_path(&self.source).map(Some),
            ItemVariant::File => Ok(file::cdn_path(&self.source)),
            _ => Ok(None),
        }
    }

    /// Whether any mutable field we control diverges between the desired
    /// and stored state.
    pub fn needs_update(&self) -> bool {
        match (&self.unit, self.variant) {
            (Some(Unit::Rpm(unit)), ItemVariant::Rpm) => {
                rpm::cdn_path(&self.source).ok().as_deref() != unit.cdn_path.as_deref()
            }
            (Some(Unit::File(unit)), ItemVariant::File) => file::needs_update(&self.source, unit),
            _ => false,
        }
    }

    /// The stored unit with desired values applied to the mutable fields
    /// this tool controls.
    pub fn unit_for_update(&self) -> Option<Unit> {
        match (&self.unit, self.variant) {
            (Some(Unit::Rpm(unit)), ItemVariant::Rpm) => {
                let mut out = unit.clone();
                out.cdn_path = rpm::cdn_path(&self.source).ok();
                Some(Unit::Rpm(out))
            }
            (Some(Unit::File(unit)), ItemVariant::File) => {
                Some(Unit::File(file::unit_for_update(&self.source, unit)))
            }
            _ => None,
        }
    }

    // -- state transitions --------------------------------------------------

    /// Attach (or clear) the matched remote unit and recompute state.
    pub fn with_unit(&self, unit: Option<Unit>) -> PushItem {
        let mut out = self.clone();
        out.unit = unit;
        out.state = out.computed_state();
        out
    }

    fn computed_state(&self) -> ItemState {
        let unit = match &self.unit {
            None => return ItemState::Pending,
            Some(unit) => unit,
        };
        let memberships = unit.repository_memberships();
        let in_all = self
            .source
            .dest
            .iter()
            .all(|dest| memberships.contains(dest));
        // Field divergence is checked before membership: an update rewrites
        // the stored unit, and missing memberships are reconciled afterwards
        // by association.
        if self.needs_update() {
            ItemState::NeedsUpdate
        } else if !in_all {
            ItemState::Exists
        } else {
            ItemState::InRepos
        }
    }

    pub fn with_state(&self, state: ItemState) -> PushItem {
        let mut out = self.clone();
        out.state = state;
        out
    }

    /// Mark a direct-upload item as uploaded to the given repos; such items
    /// are considered fully in place once the uploads succeed.
    pub fn with_uploaded_repos(&self, repos: Vec<String>) -> PushItem {
        let mut out = self.clone();
        out.uploaded_repos = repos;
        out.state = ItemState::InRepos;
        out
    }

    // -- checksums ----------------------------------------------------------

    /// True when loading checksums would read the underlying file.
    pub fn blocking_checksums(&self) -> bool {
        self.source.sha256sum.is_none() && self.source.src.is_some()
    }

    /// Ensure the item carries a sha256 checksum, computing it from the
    /// underlying bytes if the source omitted it. Blocking; callers run it
    /// in a blocking task.
    pub fn load_checksums(&self) -> Result<PushItem> {
        if self.source.sha256sum.is_some() {
            return Ok(self.clone());
        }
        let src = match &self.source.src {
            Some(src) => src,
            None => return Ok(self.clone()),
        };

        use sha2::{Digest, Sha256};
        let mut file = std::fs::File::open(src)?;
        let mut hasher = Sha256::new();
        let size = std::io::copy(&mut file, &mut hasher)?;

        let mut out = self.clone();
        out.source.sha256sum = Some(format!("{:x}", hasher.finalize()));
        out.source.size = Some(size);
        Ok(out)
    }

    // -- reporting ----------------------------------------------------------

    /// Repositories to publish once this item is fully associated.
    pub fn publish_repos(&self) -> Vec<String> {
        if self.direct_upload() && !self.uploaded_repos.is_empty() {
            self.uploaded_repos.clone()
        } else {
            self.source.dest.clone()
        }
    }

    /// Outcome record reflecting this item's current state.
    pub fn record(&self) -> PushItemRecord {
        PushItemRecord {
            origin: self.source.origin.clone(),
            state: self.state.as_str().to_string(),
            filename: self.source.name.clone(),
            checksums: self.source.checksums(),
            signing_key: self.source.signing_key.clone(),
            src: self
                .source
                .src
                .as_ref()
                .map(|p| p.display().to_string()),
            dest: Some(self.source.dest.clone()),
            build: self.source.build.clone(),
        }
    }

    /// Check the descriptor for shapes a push could never complete, such
    /// as an RPM filename the catalog cannot derive name/version/release
    /// from. Callers record such items as INVALID rather than failing the
    /// whole run.
    pub fn validate(&self) -> Result<()> {
        match self.variant {
            ItemVariant::Rpm => rpm::nvr(&self.source.name).map(|_| ()),
            _ => Ok(()),
        }
    }
}
