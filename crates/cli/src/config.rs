//! Config file loading.
//!
//! A config file is TOML with a single `[clean]` table whose keys mirror
//! [`CleanOptions`]:
//!
//! ```toml
//! [clean]
//! pinned = ["score"]
//! verify_postconditions = true
//! ```
//!
//! Command-line flags are applied on top: `--pin` adds to `pinned` and
//! `--verify` turns postcondition checking on.

use std::fs;
use std::path::Path;

use fieldprune_core::CleanOptions;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    clean: CleanOptions,
}

pub(crate) fn load_options(
    path: Option<&Path>,
    pins: &[String],
    verify: bool,
) -> Result<CleanOptions, String> {
    let mut options = match path {
        Some(path) => read_config(path)?,
        None => CleanOptions::default(),
    };
    for pin in pins {
        options = options.pin(pin.as_str());
    }
    if verify {
        options = options.verify_postconditions(true);
    }
    debug!(
        pinned = options.pinned.len(),
        verify = options.verify_postconditions,
        "options loaded"
    );
    Ok(options)
}

fn read_config(path: &Path) -> Result<CleanOptions, String> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("error reading config {}: {}", path.display(), e))?;
    parse_config(&text).map_err(|e| format!("invalid config {}: {}", path.display(), e))
}

fn parse_config(text: &str) -> Result<CleanOptions, toml::de::Error> {
    let file: ConfigFile = toml::from_str(text)?;
    Ok(file.clean)
}
