//! Deletion workflows.
//!
//! Removes named content (RPMs, files, module streams) or whole advisories
//! from a set of repositories, records the affected units, and republishes
//! every repository that actually lost content.
//!
//! Requested names are classified strictly by shape: `.rpm` names are
//! RPMs, NSVCA coordinates are module streams, anything else without a
//! colon is a generic file. Names that look like a coordinate but do not
//! parse as one are refused up front.
//!
//! Within one repository removals are ordered: RPMs first (including the
//! artifacts of any module being removed), then module units, then files.
//! A module artifact must never outlive its module's membership removal
//! going the wrong way around, or clients could resolve a module whose
//! artifacts are already gone.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{info, warn};

use crate::client::CatalogClient;
use crate::collector::{Collector, PushItemRecord};
use crate::criteria::{Criteria, FieldValue};
use crate::error::{CourierError, Result};
use crate::items::modulemd;
use crate::publisher::Publisher;
use crate::unit::{ModulemdUnit, PublishOptions, Repository, Unit, UnitType};

#[derive(Debug, Clone, Default)]
pub struct DeleteRequest {
    pub repo_ids: Vec<String>,
    /// RPM filenames, file paths and module coordinates, mixed.
    pub names: Vec<String>,
    pub advisory_ids: Vec<String>,
    /// When non-empty, only RPMs signed with one of these keys are removed.
    pub signing_keys: Vec<String>,
    /// Permit RPM deletion without any signing-key filter.
    pub allow_unsigned: bool,
    pub publish: PublishOptions,
}

#[derive(Debug)]
struct Classified {
    rpms: Vec<String>,
    files: Vec<String>,
    modules: Vec<String>,
}

fn classify(names: &[String]) -> Result<Classified> {
    let mut out = Classified {
        rpms: Vec::new(),
        files: Vec::new(),
        modules: Vec::new(),
    };
    let mut rejected = Vec::new();
    for name in names {
        if name.ends_with(".rpm") {
            out.rpms.push(name.clone());
        } else if modulemd::is_module_coordinate(name) {
            out.modules.push(name.clone());
        } else if name.contains(':') {
            rejected.push(name.clone());
        } else {
            out.files.push(name.clone());
        }
    }
    if !rejected.is_empty() {
        rejected.sort();
        return Err(CourierError::Invalid(format!(
            "not deletable content: {}",
            rejected.join(", ")
        )));
    }
    Ok(out)
}

/// One repository together with the units removed from it.
struct ClearedRepo {
    repo: Repository,
    units: Vec<Unit>,
}

pub struct DeleteEngine {
    client: Arc<dyn CatalogClient>,
    publisher: Arc<Publisher>,
    collector: Arc<dyn Collector>,
}

impl DeleteEngine {
    pub fn new(
        client: Arc<dyn CatalogClient>,
        publisher: Arc<Publisher>,
        collector: Arc<dyn Collector>,
    ) -> Self {
        DeleteEngine {
            client,
            publisher,
            collector,
        }
    }

    pub async fn delete(&self, request: DeleteRequest) -> Result<()> {
        if request.repo_ids.is_empty() {
            return Err(CourierError::Invalid(
                "at least one repository must be given".into(),
            ));
        }
        if request.names.is_empty() && request.advisory_ids.is_empty() {
            return Err(CourierError::Invalid(
                "nothing requested for deletion".into(),
            ));
        }
        // Removing RPMs without any key filter is a large blast radius;
        // it must be asked for explicitly.
        if request.signing_keys.is_empty() && !request.allow_unsigned {
            let wants_rpms = !request.advisory_ids.is_empty()
                || request.names.iter().any(|name| name.ends_with(".rpm"));
            if wants_rpms {
                return Err(CourierError::Config(
                    "deleting RPMs requires --signing-key or --allow-unsigned".into(),
                ));
            }
        }

        let repos = self.resolve_repos(&request.repo_ids).await?;

        let mut cleared: Vec<ClearedRepo> = Vec::new();
        if !request.names.is_empty() {
            cleared.extend(self.delete_named(&repos, &request).await?);
        }
        for advisory_id in &request.advisory_ids {
            cleared.extend(
                self.delete_advisory(&repos, advisory_id, &request.signing_keys)
                    .await?,
            );
        }

        self.record_cleared(&cleared).await;

        // Publish only repositories that actually lost content.
        let mut publish_repos = Vec::new();
        let mut seen = BTreeSet::new();
        for cleared_repo in &cleared {
            if !cleared_repo.units.is_empty() && seen.insert(cleared_repo.repo.id.clone()) {
                publish_repos.push(cleared_repo.repo.clone());
            }
        }
        self.publisher
            .publish_with_cache_flush(publish_repos, request.publish)
            .await
    }

    async fn resolve_repos(&self, repo_ids: &[String]) -> Result<Vec<Repository>> {
        let repos = self
            .client
            .search_repository(Criteria::with_id(repo_ids.to_vec()))
            .await?;
        let found: BTreeSet<&str> = repos.iter().map(|r| r.id.as_str()).collect();
        let missing: Vec<&str> = repo_ids
            .iter()
            .map(|id| id.as_str())
            .filter(|id| !found.contains(id))
            .collect();
        if !missing.is_empty() {
            return Err(CourierError::NotFound {
                kind: "repository",
                name: missing.join(", "),
            });
        }
        Ok(repos)
    }

    async fn delete_named(
        &self,
        repos: &[Repository],
        request: &DeleteRequest,
    ) -> Result<Vec<ClearedRepo>> {
        let classified = classify(&request.names)?;
        let mut found_names: BTreeSet<String> = BTreeSet::new();

        let rpm_units = if classified.rpms.is_empty() {
            Vec::new()
        } else {
            let mut terms = vec![
                Criteria::with_unit_type(UnitType::Rpm),
                name_list("filename", &classified.rpms),
            ];
            if !request.signing_keys.is_empty() {
                terms.push(name_list("signing_key", &request.signing_keys));
            }
            self.client.search_content(Criteria::and(terms)).await?
        };
        for unit in &rpm_units {
            if let Unit::Rpm(rpm) = unit {
                found_names.insert(rpm.filename.clone());
            }
        }

        let file_units = if classified.files.is_empty() {
            Vec::new()
        } else {
            self.client
                .search_content(Criteria::and(vec![
                    Criteria::with_unit_type(UnitType::File),
                    name_list("path", &classified.files),
                ]))
                .await?
        };
        for unit in &file_units {
            if let Unit::File(file) = unit {
                found_names.insert(file.path.clone());
            }
        }

        let mut module_units: Vec<ModulemdUnit> = Vec::new();
        for coordinate in &classified.modules {
            let units = self
                .client
                .search_content(modulemd::nsvca_criteria(coordinate)?)
                .await?;
            if !units.is_empty() {
                found_names.insert(coordinate.clone());
            }
            module_units.extend(units.into_iter().filter_map(|unit| match unit {
                Unit::Modulemd(module) => Some(module),
                _ => None,
            }));
        }

        // Requested-but-absent names are reported, not fatal.
        let mut missing: Vec<&String> = request
            .names
            .iter()
            .filter(|name| !found_names.contains(*name))
            .collect();
        missing.sort();
        for name in missing {
            warn!(name = %name, "nothing found to delete");
        }

        // A module stream is only deleted when it is a member of every
        // requested repository; a partial removal would leave it
        // resolvable with missing artifacts elsewhere.
        let repo_ids: BTreeSet<&str> = repos.iter().map(|r| r.id.as_str()).collect();
        module_units.retain(|module| {
            let everywhere = repo_ids
                .iter()
                .all(|id| module.repository_memberships.iter().any(|m| m == id));
            if !everywhere {
                warn!(
                    module = %module.nsvca(),
                    "module is not in all requested repos, skipping"
                );
            }
            everywhere
        });

        let mut cleared = Vec::new();
        for repo in repos {
            let mut task_ids = Vec::new();
            let rpm_names: Vec<String> = rpm_units
                .iter()
                .filter(|unit| unit.repository_memberships().contains(&repo.id))
                .filter_map(|unit| match unit {
                    Unit::Rpm(rpm) => Some(rpm.filename.clone()),
                    _ => None,
                })
                .collect();
            let artifact_names: Vec<String> = module_units
                .iter()
                .flat_map(|module| module.artifacts_filenames.iter().cloned())
                .collect();
            let file_names: Vec<String> = file_units
                .iter()
                .filter(|unit| unit.repository_memberships().contains(&repo.id))
                .filter_map(|unit| match unit {
                    Unit::File(file) => Some(file.path.clone()),
                    _ => None,
                })
                .collect();

            let mut units = Vec::new();

            // RPM removal covers both the requested RPMs and the artifacts
            // of modules about to be removed; artifacts go regardless of
            // signing key.
            let mut rpm_terms = Vec::new();
            if !rpm_names.is_empty() {
                rpm_terms.push(name_list("filename", &rpm_names));
            }
            if !artifact_names.is_empty() {
                rpm_terms.push(name_list("filename", &artifact_names));
            }
            if !rpm_terms.is_empty() {
                let criteria = Criteria::and(vec![
                    Criteria::with_unit_type(UnitType::Rpm),
                    Criteria::or(rpm_terms),
                ]);
                let task = self.client.remove_content(&repo.id, criteria).await?;
                task_ids.push(task.id);
                units.extend(task.units);
            }

            if !module_units.is_empty() {
                let criteria = Criteria::or(
                    module_units.iter().map(module_criteria).collect(),
                );
                let task = self.client.remove_content(&repo.id, criteria).await?;
                task_ids.push(task.id);
                units.extend(task.units);
            }

            if !file_names.is_empty() {
                let criteria = Criteria::and(vec![
                    Criteria::with_unit_type(UnitType::File),
                    name_list("path", &file_names),
                ]);
                let task = self.client.remove_content(&repo.id, criteria).await?;
                task_ids.push(task.id);
                units.extend(task.units);
            }

            if units.is_empty() {
                warn!(repo = %repo.id, "no requested content found in repo");
            } else {
                info!(
                    repo = %repo.id,
                    removed = %removal_summary(&units),
                    tasks = ?task_ids,
                    "removed units"
                );
            }
            cleared.push(ClearedRepo {
                repo: repo.clone(),
                units,
            });
        }
        Ok(cleared)
    }

    async fn delete_advisory(
        &self,
        repos: &[Repository],
        advisory_id: &str,
        signing_keys: &[String],
    ) -> Result<Vec<ClearedRepo>> {
        let units = self
            .client
            .search_content(Criteria::and(vec![
                Criteria::with_unit_type(UnitType::Erratum),
                Criteria::with_field("id", advisory_id),
            ]))
            .await?;
        let erratum = units
            .iter()
            .find_map(|unit| match unit {
                Unit::Erratum(e) => Some(e),
                _ => None,
            })
            .ok_or_else(|| CourierError::NotFound {
                kind: "advisory",
                name: advisory_id.to_string(),
            })?;

        let mut package_names: BTreeSet<String> = BTreeSet::new();
        let mut modules: Vec<&crate::unit::ErratumModule> = Vec::new();
        for collection in &erratum.pkglist {
            for package in &collection.packages {
                package_names.insert(package.filename.clone());
            }
            if let Some(module) = &collection.module {
                modules.push(module);
            }
        }
        let package_names: Vec<String> = package_names.into_iter().collect();

        let mut cleared = Vec::new();
        for repo in repos {
            // The advisory's own membership is authoritative for where its
            // content can be removed from.
            if !erratum.repository_memberships.iter().any(|m| m == &repo.id) {
                warn!(
                    advisory = %advisory_id,
                    repo = %repo.id,
                    "advisory is not present in repo"
                );
                continue;
            }
            let mut task_ids = Vec::new();
            let mut units = Vec::new();

            if !package_names.is_empty() {
                let mut terms = vec![
                    Criteria::with_unit_type(UnitType::Rpm),
                    name_list("filename", &package_names),
                ];
                if !signing_keys.is_empty() {
                    terms.push(name_list("signing_key", signing_keys));
                }
                let task = self
                    .client
                    .remove_content(&repo.id, Criteria::and(terms))
                    .await?;
                task_ids.push(task.id);
                units.extend(task.units);
            }

            // Module streams listed by the advisory go after their
            // artifact RPMs.
            if !modules.is_empty() {
                let criteria = Criteria::or(
                    modules
                        .iter()
                        .map(|module| {
                            nsvca_fields_criteria(
                                &module.name,
                                &module.stream,
                                module.version,
                                &module.context,
                                &module.arch,
                            )
                        })
                        .collect(),
                );
                let task = self.client.remove_content(&repo.id, criteria).await?;
                task_ids.push(task.id);
                units.extend(task.units);
            }

            // The advisory itself goes only after its packages.
            let criteria = Criteria::and(vec![
                Criteria::with_unit_type(UnitType::Erratum),
                Criteria::with_field("id", advisory_id),
            ]);
            let task = self.client.remove_content(&repo.id, criteria).await?;
            task_ids.push(task.id);
            units.extend(task.units);

            if units.is_empty() {
                warn!(repo = %repo.id, advisory = %advisory_id, "advisory content not in repo");
            } else {
                info!(
                    repo = %repo.id,
                    advisory = %advisory_id,
                    removed = %removal_summary(&units),
                    tasks = ?task_ids,
                    "removed advisory content"
                );
            }
            cleared.push(ClearedRepo {
                repo: repo.clone(),
                units,
            });
        }
        Ok(cleared)
    }

    /// Record one DELETED outcome per distinct removed unit. Collector
    /// failures do not fail the deletion.
    async fn record_cleared(&self, cleared: &[ClearedRepo]) {
        let mut records: BTreeMap<String, PushItemRecord> = BTreeMap::new();
        for cleared_repo in cleared {
            for unit in &cleared_repo.units {
                let record = PushItemRecord::for_deleted_unit(unit);
                records.entry(record.filename.clone()).or_insert(record);
            }
        }
        if records.is_empty() {
            return;
        }
        let records: Vec<PushItemRecord> = records.into_values().collect();
        if let Err(err) = self.collector.update_push_items(records).await {
            warn!(%err, "failed to record deleted units");
        }
    }
}

/// Short `count type` breakdown of removed units, e.g. `2 rpm, 1 modulemd`.
fn removal_summary(units: &[Unit]) -> String {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for unit in units {
        *counts.entry(unit.unit_type().content_type_id()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(type_id, count)| format!("{count} {type_id}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn name_list(field: &str, names: &[String]) -> Criteria {
    Criteria::with_field_in(
        field,
        names
            .iter()
            .map(|name| FieldValue::from(name.as_str()))
            .collect(),
    )
}

fn module_criteria(module: &ModulemdUnit) -> Criteria {
    nsvca_fields_criteria(
        &module.name,
        &module.stream,
        module.version,
        &module.context,
        &module.arch,
    )
}

fn nsvca_fields_criteria(
    name: &str,
    stream: &str,
    version: i64,
    context: &str,
    arch: &str,
) -> Criteria {
    Criteria::and(vec![
        Criteria::with_unit_type(UnitType::Modulemd),
        Criteria::with_field("name", name),
        Criteria::with_field("stream", stream),
        Criteria::with_field("version", version),
        Criteria::with_field("context", context),
        Criteria::with_field("arch", arch),
    ])
}
