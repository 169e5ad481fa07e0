//! Scripts compiled into the binary
//!
//! `bundled-resource:` locations are read from this process-wide catalog.
//! Applications fill it at startup, usually through [`bundle_script!`](crate::bundle_script)
//! which embeds the file with `include_str!`.

use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// location path -> (file name -> contents)
type Catalog = BTreeMap<String, BTreeMap<String, String>>;

static CATALOG: Lazy<Mutex<Catalog>> = Lazy::new(|| Mutex::new(BTreeMap::new()));

fn normalize(location: &str) -> String {
    location.trim_matches('/').to_string()
}

/// Add a script to `location`, replacing any script registered under the same name
///
/// # Arguments
///
/// * `location` - Resource path as used in `bundled-resource:<path>`; surrounding `/` are ignored
/// * `file_name` - Script file name, e.g. `V1__create_accounts.sql`
/// * `contents` - Script text
pub fn register(location: &str, file_name: impl Into<String>, contents: impl Into<String>) {
    let file_name = file_name.into();
    match CATALOG.lock() {
        Ok(mut catalog) => {
            let previous = catalog
                .entry(normalize(location))
                .or_default()
                .insert(file_name.clone(), contents.into());
            if previous.is_some() {
                log::debug!("Replaced bundled script {}/{}", location, file_name);
            }
        }
        Err(e) => log::error!("Bundled script catalog is poisoned, dropping {}: {}", file_name, e),
    }
}

/// Add a script under the last path segment of `path`
pub fn register_file(location: &str, path: &str, contents: impl Into<String>) {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    register(location, file_name, contents);
}

/// All scripts of `location` as `(file name, contents)`, ordered by file name
pub fn scripts_in(location: &str) -> Vec<(String, String)> {
    CATALOG
        .lock()
        .ok()
        .and_then(|catalog| {
            catalog.get(&normalize(location)).map(|scripts| {
                scripts
                    .iter()
                    .map(|(name, contents)| (name.clone(), contents.clone()))
                    .collect()
            })
        })
        .unwrap_or_default()
}

/// Locations that currently hold at least one script
pub fn locations() -> Vec<String> {
    CATALOG
        .lock()
        .map(|catalog| catalog.keys().cloned().collect())
        .unwrap_or_default()
}
