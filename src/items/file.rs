//! Generic-file item logic.

use crate::criteria::Criteria;
use crate::source::SourceItem;
use crate::unit::{FileUnit, Unit, UnitType};

/// Path under which this file is exposed at the CDN origin, addressed by
/// checksum. None until the checksum is known.
pub fn cdn_path(source: &SourceItem) -> Option<String> {
    let sum = source.sha256sum.as_deref()?;
    if sum.len() < 2 {
        return None;
    }
    Some(format!(
        "/content/origin/files/sha256/{shard}/{sum}/{name}",
        shard = &sum[..2],
        name = source.name
    ))
}

pub fn criteria(source: &SourceItem) -> Option<Criteria> {
    let sum = source.sha256sum.as_deref()?;
    Some(Criteria::and(vec![
        Criteria::with_unit_type(UnitType::File),
        Criteria::with_field("path", source.name.as_str()),
        Criteria::with_field("sha256sum", sum),
    ]))
}

pub fn match_unit(source: &SourceItem, units: &[Unit]) -> Option<Unit> {
    units
        .iter()
        .find(|unit| match unit {
            Unit::File(file) => {
                file.path == source.name
                    && file.sha256sum.as_deref() == source.sha256sum.as_deref()
            }
            _ => false,
        })
        .cloned()
}

pub fn needs_update(source: &SourceItem, unit: &FileUnit) -> bool {
    cdn_path(source).as_deref() != unit.cdn_path.as_deref()
}

pub fn unit_for_update(source: &SourceItem, unit: &FileUnit) -> FileUnit {
    let mut out = unit.clone();
    out.cdn_path = cdn_path(source);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceItemKind;

    fn source(name: &str, sha256: Option<&str>) -> SourceItem {
        SourceItem {
            name: name.to_string(),
            kind: SourceItemKind::File,
            src: None,
            dest: vec!["repo".to_string()],
            sha256sum: sha256.map(|s| s.to_string()),
            md5sum: None,
            signing_key: None,
            size: None,
            build: None,
            origin: "staged".to_string(),
        }
    }

    #[test]
    fn cdn_path_is_checksum_addressed() {
        let sum = format!("d8{}", "e".repeat(62));
        assert_eq!(
            cdn_path(&source("some-iso", Some(&sum))).unwrap(),
            format!("/content/origin/files/sha256/d8/{sum}/some-iso")
        );
        assert!(cdn_path(&source("some-iso", None)).is_none());
    }

    #[test]
    fn criteria_requires_checksum() {
        assert!(criteria(&source("some-iso", None)).is_none());
        let sum = "a".repeat(64);
        assert!(criteria(&source("some-iso", Some(&sum))).is_some());
    }
}
