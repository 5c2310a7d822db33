//! Data model for content stored in the catalog service.
//!
//! These are plain-data mirrors of the server-side representations: a
//! [`Unit`] is one stored piece of content, a [`Repository`] one repo, and a
//! [`TaskRecord`] the server's record of a completed mutation job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::criteria::FieldValue;

/// The closed set of content types handled by this tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    Rpm,
    File,
    Modulemd,
    Erratum,
}

impl UnitType {
    /// The server's content type id, as it appears in task summaries.
    pub fn content_type_id(&self) -> &'static str {
        match self {
            UnitType::Rpm => "rpm",
            UnitType::File => "iso",
            UnitType::Modulemd => "modulemd",
            UnitType::Erratum => "erratum",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpmUnit {
    pub name: String,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub filename: String,
    pub sha256sum: Option<String>,
    pub md5sum: Option<String>,
    pub signing_key: Option<String>,
    pub cdn_path: Option<String>,
    pub cdn_published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repository_memberships: Vec<String>,
}

impl RpmUnit {
    /// Canonical `name-version-release.arch.rpm` filename rebuilt from unit
    /// fields. This is what outcome records carry, and can differ from the
    /// stored `filename` field (e.g. `_` vs `.` before the arch).
    pub fn canonical_filename(&self) -> String {
        format!(
            "{}-{}-{}.{}.rpm",
            self.name, self.version, self.release, self.arch
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUnit {
    pub path: String,
    pub size: Option<u64>,
    pub sha256sum: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    pub display_order: Option<f64>,
    pub cdn_path: Option<String>,
    pub cdn_published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repository_memberships: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModulemdUnit {
    pub name: String,
    pub stream: String,
    pub version: i64,
    pub context: String,
    pub arch: String,
    /// Filenames of the RPM artifacts belonging to this module.
    #[serde(default)]
    pub artifacts_filenames: Vec<String>,
    #[serde(default)]
    pub repository_memberships: Vec<String>,
}

impl ModulemdUnit {
    /// N:S:V:C:A coordinate. The format is kept even if some part of the
    /// data is missing, so e.g. a missing context yields `N:S:V::A` and the
    /// arch part can't be misinterpreted as context.
    pub fn nsvca(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.name, self.stream, self.version, self.context, self.arch
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErratumPackage {
    pub filename: String,
    pub sha256sum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErratumModule {
    pub name: String,
    pub stream: String,
    pub version: i64,
    pub context: String,
    pub arch: String,
}

impl ErratumModule {
    pub fn nsvca(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.name, self.stream, self.version, self.context, self.arch
        )
    }
}

/// One collection in an advisory's package list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErratumPackageCollection {
    #[serde(default)]
    pub packages: Vec<ErratumPackage>,
    pub module: Option<ErratumModule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErratumUnit {
    pub id: String,
    #[serde(default)]
    pub pkglist: Vec<ErratumPackageCollection>,
    #[serde(default)]
    pub repository_memberships: Vec<String>,
}

/// One stored content unit of any supported type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Unit {
    Rpm(RpmUnit),
    File(FileUnit),
    Modulemd(ModulemdUnit),
    Erratum(ErratumUnit),
}

impl Unit {
    pub fn unit_type(&self) -> UnitType {
        match self {
            Unit::Rpm(_) => UnitType::Rpm,
            Unit::File(_) => UnitType::File,
            Unit::Modulemd(_) => UnitType::Modulemd,
            Unit::Erratum(_) => UnitType::Erratum,
        }
    }

    pub fn content_type_id(&self) -> &'static str {
        self.unit_type().content_type_id()
    }

    /// A human-readable identifier, used for sorting and log messages.
    pub fn display_name(&self) -> String {
        match self {
            Unit::Rpm(u) => u.filename.clone(),
            Unit::File(u) => u.path.clone(),
            Unit::Modulemd(u) => u.nsvca(),
            Unit::Erratum(u) => u.id.clone(),
        }
    }

    pub fn repository_memberships(&self) -> &[String] {
        match self {
            Unit::Rpm(u) => &u.repository_memberships,
            Unit::File(u) => &u.repository_memberships,
            Unit::Modulemd(u) => &u.repository_memberships,
            Unit::Erratum(u) => &u.repository_memberships,
        }
    }

    pub fn cdn_published(&self) -> Option<DateTime<Utc>> {
        match self {
            Unit::Rpm(u) => u.cdn_published,
            Unit::File(u) => u.cdn_published,
            _ => None,
        }
    }

    /// True for unit types carrying a cdn_published field.
    pub fn supports_cdn_published(&self) -> bool {
        matches!(self, Unit::Rpm(_) | Unit::File(_))
    }

    pub fn with_cdn_published(&self, when: DateTime<Utc>) -> Unit {
        let mut out = self.clone();
        match &mut out {
            Unit::Rpm(u) => u.cdn_published = Some(when),
            Unit::File(u) => u.cdn_published = Some(when),
            _ => {}
        }
        out
    }

    /// Look up a queryable field by name, for criteria evaluation.
    pub fn field_value(&self, field: &str) -> Option<FieldValue> {
        match (self, field) {
            (Unit::Rpm(u), "filename") => Some(u.filename.as_str().into()),
            (Unit::Rpm(u), "name") => Some(u.name.as_str().into()),
            (Unit::Rpm(u), "sha256sum") => Some(u.sha256sum.clone().into()),
            (Unit::Rpm(u), "signing_key") => Some(u.signing_key.clone().into()),
            (Unit::Rpm(u), "cdn_published") => Some(published_value(u.cdn_published)),
            (Unit::File(u), "path") => Some(u.path.as_str().into()),
            (Unit::File(u), "sha256sum") => Some(u.sha256sum.clone().into()),
            (Unit::File(u), "cdn_published") => Some(published_value(u.cdn_published)),
            (Unit::Modulemd(u), "name") => Some(u.name.as_str().into()),
            (Unit::Modulemd(u), "stream") => Some(u.stream.as_str().into()),
            (Unit::Modulemd(u), "version") => Some(u.version.into()),
            (Unit::Modulemd(u), "context") => Some(u.context.as_str().into()),
            (Unit::Modulemd(u), "arch") => Some(u.arch.as_str().into()),
            (Unit::Erratum(u), "id") => Some(u.id.as_str().into()),
            _ => None,
        }
    }
}

fn published_value(when: Option<DateTime<Utc>>) -> FieldValue {
    match when {
        Some(when) => FieldValue::Text(when.to_rfc3339()),
        None => FieldValue::Null,
    }
}

/// A repository known to the catalog service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub relative_url: Option<String>,
    /// Repo-relative URLs whose content changes on publish (e.g. repodata).
    #[serde(default)]
    pub mutable_urls: Vec<String>,
    /// Engineering product id, required for UD cache flushes.
    pub eng_product_id: Option<i64>,
}

/// The server's record of one completed mutation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    #[serde(default)]
    pub units: Vec<Unit>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishOptions {
    /// Publish even if the server thinks nothing has changed.
    pub force: bool,
    /// Attempt to delete remote content no longer in the repo.
    pub clean: bool,
}

/// Result of uploading one piece of content into a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadReport {
    pub repo_id: String,
}
