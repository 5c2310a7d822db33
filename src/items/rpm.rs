//! RPM-specific item logic.

use crate::criteria::Criteria;
use crate::error::{CourierError, Result};
use crate::source::SourceItem;
use crate::unit::{Unit, UnitType};

/// Parse `(name, version, release)` out of an RPM filename of the form
/// `name-version-release.arch.rpm`. Name may itself contain dashes, so the
/// filename is consumed from the right.
pub fn nvr(filename: &str) -> Result<(String, String, String)> {
    let invalid = || CourierError::Invalid(format!("invalid RPM filename: {filename}"));

    let stem = filename.strip_suffix(".rpm").ok_or_else(invalid)?;
    let (nvr, _arch) = stem.rsplit_once('.').ok_or_else(invalid)?;
    let (nv, release) = nvr.rsplit_once('-').ok_or_else(invalid)?;
    let (name, version) = nv.rsplit_once('-').ok_or_else(invalid)?;
    if name.is_empty() || version.is_empty() || release.is_empty() {
        return Err(invalid());
    }
    Ok((name.to_string(), version.to_string(), release.to_string()))
}

/// Path under which this RPM is exposed at the CDN origin. Unsigned RPMs
/// land under a literal "none" key segment.
pub fn cdn_path(source: &SourceItem) -> Result<String> {
    let (name, version, release) = nvr(&source.name)?;
    let key = source
        .signing_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .map(|k| k.to_lowercase())
        .unwrap_or_else(|| "none".to_string());
    Ok(format!(
        "/content/origin/rpms/{name}/{version}/{release}/{key}/{filename}",
        filename = source.name
    ))
}

/// RPM uploads are spread over shared staging repos sharded by the leading
/// byte of the checksum, so one run's uploads do not all pile into a
/// single repo.
pub fn upload_repo_id(source: &SourceItem) -> Result<String> {
    let sum = source.sha256sum.as_deref().ok_or_else(|| {
        CourierError::Invalid(format!("no sha256sum known for {}", source.name))
    })?;
    if sum.len() < 2 {
        return Err(CourierError::Invalid(format!(
            "malformed sha256sum for {}",
            source.name
        )));
    }
    Ok(format!("all-rpm-content-{}", &sum[..2]))
}

pub fn criteria(source: &SourceItem) -> Option<Criteria> {
    let sum = source.sha256sum.as_deref()?;
    Some(Criteria::and(vec![
        Criteria::with_unit_type(UnitType::Rpm),
        Criteria::with_field("sha256sum", sum),
    ]))
}

pub fn match_unit(source: &SourceItem, units: &[Unit]) -> Option<Unit> {
    units
        .iter()
        .find(|unit| match unit {
            Unit::Rpm(rpm) => {
                rpm.filename == source.name
                    && rpm.sha256sum.as_deref() == source.sha256sum.as_deref()
            }
            _ => false,
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceItemKind;
    use std::path::PathBuf;

    fn source(name: &str, sha256: Option<&str>, key: Option<&str>) -> SourceItem {
        SourceItem {
            name: name.to_string(),
            kind: SourceItemKind::Rpm,
            src: Some(PathBuf::from("/staged").join(name)),
            dest: vec!["repo".to_string()],
            sha256sum: sha256.map(|s| s.to_string()),
            md5sum: None,
            signing_key: key.map(|k| k.to_string()),
            size: None,
            build: None,
            origin: "staged".to_string(),
        }
    }

    #[test]
    fn nvr_handles_dashes_in_name() {
        let (name, version, release) = nvr("gcc-c++-11.2.1-9.el9.x86_64.rpm").unwrap();
        assert_eq!(name, "gcc-c++");
        assert_eq!(version, "11.2.1");
        assert_eq!(release, "9.el9");
    }

    #[test]
    fn nvr_rejects_malformed_names() {
        assert!(nvr("bash.rpm").is_err());
        assert!(nvr("bash-1.23-1.x86_64").is_err());
        assert!(nvr("").is_err());
    }

    #[test]
    fn cdn_path_uses_key_or_none() {
        let signed = source("bash-1.23-1.test8.x86_64.rpm", None, Some("ABCDEF"));
        assert_eq!(
            cdn_path(&signed).unwrap(),
            "/content/origin/rpms/bash/1.23/1.test8/abcdef/bash-1.23-1.test8.x86_64.rpm"
        );

        let unsigned = source("bash-1.23-1.test8.x86_64.rpm", None, None);
        assert_eq!(
            cdn_path(&unsigned).unwrap(),
            "/content/origin/rpms/bash/1.23/1.test8/none/bash-1.23-1.test8.x86_64.rpm"
        );
    }

    #[test]
    fn upload_repo_is_sharded_by_checksum() {
        let sum = format!("ab{}", "0".repeat(62));
        let item = source("bash-1.23-1.x86_64.rpm", Some(&sum), None);
        assert_eq!(upload_repo_id(&item).unwrap(), "all-rpm-content-ab");

        assert!(upload_repo_id(&source("bash-1.23-1.x86_64.rpm", None, None)).is_err());
    }
}
