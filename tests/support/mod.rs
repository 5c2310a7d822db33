//! Shared fakes for integration tests: a stateful in-memory catalog, cache
//! clients and a recording collector, all appending to one event log so
//! tests can assert cross-service call ordering.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use pulp_courier::cache::{CdnClient, UdCacheClient};
use pulp_courier::client::{CatalogClient, FileUploadSpec};
use pulp_courier::collector::{Collector, PushItemRecord};
use pulp_courier::criteria::{Criteria, FieldValue};
use pulp_courier::error::{CourierError, Result};
use pulp_courier::unit::{
    FileUnit, PublishOptions, Repository, RpmUnit, TaskRecord, Unit, UploadReport,
};

#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<String>>>,
}

impl EventLog {
    pub fn new() -> Self {
        EventLog::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.into());
        }
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Index of the first event starting with `prefix`; panics if absent.
    pub fn index_of(&self, prefix: &str) -> usize {
        let events = self.snapshot();
        events
            .iter()
            .position(|e| e.starts_with(prefix))
            .unwrap_or_else(|| panic!("no event starting with {prefix:?} in {events:?}"))
    }

    pub fn count_of(&self, prefix: &str) -> usize {
        self.snapshot()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

struct CatalogState {
    units: Vec<Unit>,
    repos: Vec<Repository>,
}

/// In-memory catalog implementing the full client trait against local
/// state, so workflows can be exercised end to end without a server.
pub struct FakeCatalog {
    state: Mutex<CatalogState>,
    events: EventLog,
}

impl FakeCatalog {
    pub fn new(events: EventLog) -> Self {
        FakeCatalog {
            state: Mutex::new(CatalogState {
                units: Vec::new(),
                repos: Vec::new(),
            }),
            events,
        }
    }

    pub fn insert_repo(&self, repo: Repository) {
        self.lock().repos.push(repo);
    }

    pub fn insert_unit(&self, unit: Unit) {
        self.lock().units.push(unit);
    }

    pub fn units(&self) -> Vec<Unit> {
        self.lock().units.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sha256_of(path: &std::path::Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }

    fn add_membership(unit: &mut Unit, repo_id: &str) {
        let memberships = match unit {
            Unit::Rpm(u) => &mut u.repository_memberships,
            Unit::File(u) => &mut u.repository_memberships,
            Unit::Modulemd(u) => &mut u.repository_memberships,
            Unit::Erratum(u) => &mut u.repository_memberships,
        };
        if !memberships.iter().any(|m| m == repo_id) {
            memberships.push(repo_id.to_string());
        }
    }

    fn remove_membership(unit: &mut Unit, repo_id: &str) {
        let memberships = match unit {
            Unit::Rpm(u) => &mut u.repository_memberships,
            Unit::File(u) => &mut u.repository_memberships,
            Unit::Modulemd(u) => &mut u.repository_memberships,
            Unit::Erratum(u) => &mut u.repository_memberships,
        };
        memberships.retain(|m| m != repo_id);
    }

    fn task(units: Vec<Unit>) -> TaskRecord {
        TaskRecord {
            id: uuid::Uuid::new_v4().to_string(),
            units,
        }
    }
}

fn repo_matches(criteria: &Criteria, repo: &Repository) -> bool {
    match criteria {
        Criteria::And(inner) => inner.iter().all(|c| repo_matches(c, repo)),
        Criteria::Or(inner) => inner.iter().any(|c| repo_matches(c, repo)),
        Criteria::FieldEq { field, value } => {
            field == "id" && *value == FieldValue::Text(repo.id.clone())
        }
        Criteria::FieldIn { field, values } => {
            field == "id" && values.contains(&FieldValue::Text(repo.id.clone()))
        }
        Criteria::UnitTypeIs(_) => false,
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn search_content(&self, criteria: Criteria) -> Result<Vec<Unit>> {
        Ok(self
            .lock()
            .units
            .iter()
            .filter(|unit| criteria.matches_unit(unit))
            .cloned()
            .collect())
    }

    async fn search_repo_content(&self, repo_id: &str, criteria: Criteria) -> Result<Vec<Unit>> {
        Ok(self
            .lock()
            .units
            .iter()
            .filter(|unit| {
                unit.repository_memberships().iter().any(|m| m == repo_id)
                    && criteria.matches_unit(unit)
            })
            .cloned()
            .collect())
    }

    async fn search_repository(&self, criteria: Criteria) -> Result<Vec<Repository>> {
        Ok(self
            .lock()
            .repos
            .iter()
            .filter(|repo| repo_matches(&criteria, repo))
            .cloned()
            .collect())
    }

    async fn remove_content(&self, repo_id: &str, criteria: Criteria) -> Result<TaskRecord> {
        let mut state = self.lock();
        let mut removed = Vec::new();
        for unit in state.units.iter_mut() {
            let member = unit.repository_memberships().iter().any(|m| m == repo_id);
            if member && criteria.matches_unit(unit) {
                FakeCatalog::remove_membership(unit, repo_id);
                removed.push(unit.clone());
            }
        }
        let mut names: Vec<String> = removed.iter().map(|u| u.display_name()).collect();
        names.sort();
        self.events
            .push(format!("remove:{repo_id}:{}", names.join(",")));
        Ok(FakeCatalog::task(removed))
    }

    async fn copy_content(
        &self,
        from_repo_id: &str,
        to_repo_id: &str,
        criteria: Criteria,
    ) -> Result<TaskRecord> {
        let mut state = self.lock();
        let mut copied = Vec::new();
        for unit in state.units.iter_mut() {
            let member = unit
                .repository_memberships()
                .iter()
                .any(|m| m == from_repo_id);
            if member && criteria.matches_unit(unit) {
                FakeCatalog::add_membership(unit, to_repo_id);
                copied.push(unit.clone());
            }
        }
        let mut names: Vec<String> = copied.iter().map(|u| u.display_name()).collect();
        names.sort();
        self.events
            .push(format!("copy:{from_repo_id}:{to_repo_id}:{}", names.join(",")));
        Ok(FakeCatalog::task(copied))
    }

    async fn publish(&self, repo_id: &str, _options: PublishOptions) -> Result<Repository> {
        self.events.push(format!("publish:{repo_id}"));
        self.lock()
            .repos
            .iter()
            .find(|repo| repo.id == repo_id)
            .cloned()
            .ok_or(CourierError::NotFound {
                kind: "repository",
                name: repo_id.to_string(),
            })
    }

    async fn upload_rpm(
        &self,
        repo_id: &str,
        src: &std::path::Path,
        cdn_path: &str,
    ) -> Result<UploadReport> {
        let filename = src
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| CourierError::Invalid("rpm upload without filename".into()))?;
        let sha256 = FakeCatalog::sha256_of(src)?;
        let (name, version, release) = pulp_courier::items::rpm::nvr(&filename)?;
        let arch = filename
            .strip_suffix(".rpm")
            .and_then(|stem| stem.rsplit_once('.'))
            .map(|(_, arch)| arch.to_string())
            .unwrap_or_default();

        self.events.push(format!("upload_rpm:{repo_id}:{filename}"));
        let mut state = self.lock();
        match state.units.iter_mut().find(|unit| match unit {
            Unit::Rpm(u) => u.filename == filename && u.sha256sum.as_deref() == Some(&sha256),
            _ => false,
        }) {
            Some(unit) => FakeCatalog::add_membership(unit, repo_id),
            None => state.units.push(Unit::Rpm(RpmUnit {
                name,
                version,
                release,
                arch,
                filename,
                sha256sum: Some(sha256),
                md5sum: None,
                signing_key: None,
                cdn_path: Some(cdn_path.to_string()),
                cdn_published: None,
                repository_memberships: vec![repo_id.to_string()],
            })),
        }
        Ok(UploadReport {
            repo_id: repo_id.to_string(),
        })
    }

    async fn upload_file(
        &self,
        repo_id: &str,
        src: &std::path::Path,
        spec: FileUploadSpec,
    ) -> Result<UploadReport> {
        let sha256 = FakeCatalog::sha256_of(src)?;
        let size = std::fs::metadata(src)?.len();
        self.events
            .push(format!("upload_file:{repo_id}:{}", spec.relative_url));
        let mut state = self.lock();
        match state.units.iter_mut().find(|unit| match unit {
            Unit::File(u) => {
                u.path == spec.relative_url && u.sha256sum.as_deref() == Some(&sha256)
            }
            _ => false,
        }) {
            Some(unit) => FakeCatalog::add_membership(unit, repo_id),
            None => state.units.push(Unit::File(FileUnit {
                path: spec.relative_url.clone(),
                size: Some(size),
                sha256sum: Some(sha256),
                description: spec.description.clone(),
                version: spec.version.clone(),
                display_order: spec.display_order,
                cdn_path: spec.cdn_path.clone(),
                cdn_published: spec.cdn_published,
                repository_memberships: vec![repo_id.to_string()],
            })),
        }
        Ok(UploadReport {
            repo_id: repo_id.to_string(),
        })
    }

    async fn upload_modulemd(
        &self,
        repo_id: &str,
        src: &std::path::Path,
    ) -> Result<UploadReport> {
        let filename = src
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.events
            .push(format!("upload_modulemd:{repo_id}:{filename}"));
        Ok(UploadReport {
            repo_id: repo_id.to_string(),
        })
    }

    async fn upload_erratum(
        &self,
        repo_id: &str,
        erratum: &pulp_courier::unit::ErratumUnit,
    ) -> Result<UploadReport> {
        self.events
            .push(format!("upload_erratum:{repo_id}:{}", erratum.id));
        let mut state = self.lock();
        match state.units.iter_mut().find(|unit| match unit {
            Unit::Erratum(u) => u.id == erratum.id,
            _ => false,
        }) {
            Some(unit) => FakeCatalog::add_membership(unit, repo_id),
            None => {
                let mut stored = erratum.clone();
                stored.repository_memberships = vec![repo_id.to_string()];
                state.units.push(Unit::Erratum(stored));
            }
        }
        Ok(UploadReport {
            repo_id: repo_id.to_string(),
        })
    }

    async fn update_content(&self, unit: Unit) -> Result<Unit> {
        self.events.push(format!("update:{}", unit.display_name()));
        let mut state = self.lock();
        let name = unit.display_name();
        let unit_type = unit.unit_type();
        match state
            .units
            .iter_mut()
            .find(|stored| stored.unit_type() == unit_type && stored.display_name() == name)
        {
            Some(stored) => {
                *stored = unit.clone();
                Ok(unit)
            }
            None => Err(CourierError::NotFound {
                kind: "unit",
                name,
            }),
        }
    }
}

pub struct FakeCdn {
    events: EventLog,
}

impl FakeCdn {
    pub fn new(events: EventLog) -> Self {
        FakeCdn { events }
    }
}

#[async_trait]
impl CdnClient for FakeCdn {
    async fn purge_by_url(&self, urls: Vec<String>) -> Result<()> {
        for url in urls {
            self.events.push(format!("cdn:{url}"));
        }
        Ok(())
    }
}

pub struct FakeUd {
    events: EventLog,
}

impl FakeUd {
    pub fn new(events: EventLog) -> Self {
        FakeUd { events }
    }
}

#[async_trait]
impl UdCacheClient for FakeUd {
    async fn flush_repo(&self, repo_id: &str) -> Result<()> {
        self.events.push(format!("ud-repo:{repo_id}"));
        Ok(())
    }

    async fn flush_product(&self, product_id: i64) -> Result<()> {
        self.events.push(format!("ud-product:{product_id}"));
        Ok(())
    }
}

/// Collector remembering every record batch it was handed.
#[derive(Default)]
pub struct RecordingCollector {
    batches: Mutex<Vec<Vec<PushItemRecord>>>,
}

impl RecordingCollector {
    pub fn new() -> Self {
        RecordingCollector::default()
    }

    pub fn all(&self) -> Vec<PushItemRecord> {
        self.batches
            .lock()
            .map(|batches| batches.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// The last recorded state for a given filename.
    pub fn latest_state(&self, filename: &str) -> Option<String> {
        self.all()
            .iter()
            .rev()
            .find(|record| record.filename == filename)
            .map(|record| record.state.clone())
    }

    pub fn record_for(&self, filename: &str) -> Option<PushItemRecord> {
        self.all()
            .iter()
            .rev()
            .find(|record| record.filename == filename)
            .cloned()
    }
}

#[async_trait]
impl Collector for RecordingCollector {
    async fn update_push_items(&self, items: Vec<PushItemRecord>) -> Result<()> {
        if let Ok(mut batches) = self.batches.lock() {
            batches.push(items);
        }
        Ok(())
    }
}

/// Repository value with only the fields a test cares about.
pub fn repo(id: &str, relative_url: Option<&str>, eng_product_id: Option<i64>) -> Repository {
    Repository {
        id: id.to_string(),
        relative_url: relative_url.map(|u| u.to_string()),
        mutable_urls: Vec::new(),
        eng_product_id,
    }
}
