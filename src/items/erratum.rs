//! Erratum (advisory) item logic.
//!
//! Advisories are staged as JSON documents and uploaded wholesale; there
//! is no byte-level content to checksum or associate.

use std::path::Path;

use crate::error::{CourierError, Result};
use crate::unit::ErratumUnit;

/// Parse a staged advisory document. Blocking; callers run it in a
/// blocking task.
pub fn load(src: &Path) -> Result<ErratumUnit> {
    let bytes = std::fs::read(src)?;
    serde_json::from_slice(&bytes).map_err(|e| {
        CourierError::Invalid(format!("malformed advisory {}: {e}", src.display()))
    })
}
