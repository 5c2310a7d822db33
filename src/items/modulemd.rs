//! Modulemd naming helpers.
//!
//! Modules are addressed by their NSVCA coordinate, `name:stream:version`
//! with optional `:context:arch` suffixes. These helpers recognise and
//! decompose such coordinates; they are also used when classifying
//! deletion requests.

use std::sync::OnceLock;

use regex::Regex;

use crate::criteria::Criteria;
use crate::error::{CourierError, Result};
use crate::unit::UnitType;

fn coordinate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[-.+\w]+:[-.+\w]+:\d+(:[-.+\w]+){0,2}$")
            .unwrap_or_else(|e| panic!("invalid NSVCA pattern: {e}"))
    })
}

/// Whether a name is a well-formed NSVCA module coordinate.
pub fn is_module_coordinate(name: &str) -> bool {
    coordinate_regex().is_match(name)
}

/// Search criteria matching the module unit a coordinate names. Parts the
/// coordinate omits (context, arch) are left unconstrained.
pub fn nsvca_criteria(coordinate: &str) -> Result<Criteria> {
    if !is_module_coordinate(coordinate) {
        return Err(CourierError::Invalid(format!(
            "not a module coordinate: {coordinate}"
        )));
    }
    let parts: Vec<&str> = coordinate.split(':').collect();
    let version: i64 = parts[2]
        .parse()
        .map_err(|_| CourierError::Invalid(format!("bad module version in {coordinate}")))?;

    let mut terms = vec![
        Criteria::with_unit_type(UnitType::Modulemd),
        Criteria::with_field("name", parts[0]),
        Criteria::with_field("stream", parts[1]),
        Criteria::with_field("version", version),
    ];
    if let Some(context) = parts.get(3) {
        terms.push(Criteria::with_field("context", *context));
    }
    if let Some(arch) = parts.get(4) {
        terms.push(Criteria::with_field("arch", *arch));
    }
    Ok(Criteria::and(terms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_coordinates() {
        assert!(is_module_coordinate("squid:4:820181213135307"));
        assert!(is_module_coordinate(
            "squid:4:820181213135307:deadbeef:x86_64"
        ));
        assert!(!is_module_coordinate("bash-1.23-1.test8.x86_64.rpm"));
        assert!(!is_module_coordinate("some:thing"));
        assert!(!is_module_coordinate("squid:4:notanumber"));
    }

    #[test]
    fn criteria_covers_present_parts_only() {
        let partial = nsvca_criteria("squid:4:820181213135307").unwrap();
        let full = nsvca_criteria("squid:4:820181213135307:deadbeef:x86_64").unwrap();
        // Partial coordinates leave context and arch unconstrained.
        assert_ne!(partial, full);
        assert!(nsvca_criteria("not-a-module").is_err());
    }
}
