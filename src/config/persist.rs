//! Flat-file persistence for the configuration store.
//!
//! Layout is two comma-separated lines: keys on the first, values on the
//! second, matched by position.

use crate::config::store::parse_value;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Load the persisted configuration.
///
/// A missing or empty file yields an empty map. Entries whose value is not a
/// non-negative integer, or keys with no value, are skipped.
pub fn load(path: &Path) -> Result<HashMap<String, u64>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no config file, starting empty");
            return Ok(HashMap::new());
        }
        Err(e) => return Err(e.into()),
    };
    Ok(parse(&content))
}

/// Parse the two-line layout. Never fails; bad entries are dropped.
pub fn parse(content: &str) -> HashMap<String, u64> {
    let mut lines = content.lines();
    let keys = split_line(lines.next().unwrap_or_default());
    let values = split_line(lines.next().unwrap_or_default());

    let mut config = HashMap::new();
    for (i, key) in keys.into_iter().enumerate() {
        if key.is_empty() {
            continue;
        }
        match values.get(i).and_then(|raw| parse_value(raw)) {
            Some(value) => {
                config.insert(key, value);
            }
            None => warn!(key = %key, "skipping config entry without a valid value"),
        }
    }
    config
}

/// Write the whole snapshot, replacing the file atomically.
pub fn save(path: &Path, snapshot: &BTreeMap<String, u64>) -> Result<()> {
    for key in snapshot.keys() {
        if key.contains([',', '\n', '\r']) {
            return Err(Error::Persist {
                path: path.display().to_string(),
                reason: format!("key {key:?} cannot be stored in the flat layout"),
            });
        }
    }

    let keys: Vec<&str> = snapshot.keys().map(String::as_str).collect();
    let values: Vec<String> = snapshot.values().map(u64::to_string).collect();
    let content = format!("{}\n{}\n", keys.join(","), values.join(","));

    // Each save stages into its own file so concurrent saves never share one.
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_extension(format!("tmp.{}.{seq}", std::process::id()));
    std::fs::write(&tmp, content)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(e.into());
    }
    debug!(path = %path.display(), entries = snapshot.len(), "config saved");
    Ok(())
}

fn split_line(line: &str) -> Vec<String> {
    if line.trim().is_empty() {
        return Vec::new();
    }
    line.split(',').map(|field| field.trim().to_string()).collect()
}
