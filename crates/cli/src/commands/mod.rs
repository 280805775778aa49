mod check;
mod clean;

pub(crate) use check::cmd_check;
pub(crate) use clean::cmd_clean;

use std::fs;
use std::path::Path;

use fieldprune_core::Document;

/// Read a document JSON dump.
pub(crate) fn load_document(path: &Path) -> Result<Document, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("error reading {}: {}", path.display(), e))?;
    serde_json::from_str(&text).map_err(|e| format!("invalid document {}: {}", path.display(), e))
}
