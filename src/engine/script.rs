//! Script discovery and parsing
//!
//! Scripts are named `V<version>__<description>.sql`. Version parts are separated
//! by `.` or `_` and compared numerically, so `V1_10` sorts after `V1_9`.
//! Underscores in the description read as spaces.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::engine::checksum::calculate_checksum;
use crate::engine::{resources, EngineError};
use crate::location::{Location, LocationKind};

static SCRIPT_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^V(\d+(?:[._]\d+)*)__(.+)\.sql$").expect("script name pattern is valid")
});

/// Numeric script version; trailing zero parts are insignificant (`1.0` == `1`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(Vec<u64>);

impl Version {
    /// Parse `1`, `1.2`, `2_0_1`; `None` for anything else
    pub fn parse(text: &str) -> Option<Self> {
        let mut parts = text
            .split(['.', '_'])
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        while parts.len() > 1 && parts.last() == Some(&0) {
            parts.pop();
        }
        Some(Version(parts))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        f.write_str(&parts.join("."))
    }
}

/// A script found in one of the configured locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScript {
    pub version: Version,
    pub description: String,
    /// File name, e.g. `V1__create_users.sql`
    pub script: String,
    /// Identifier of the location the script came from
    pub location: String,
    pub contents: String,
    pub checksum: String,
}

impl ResolvedScript {
    pub fn new(file_name: &str, location: &Location, contents: String) -> Option<Self> {
        let (version, description) = parse_script_name(file_name)?;
        let checksum = calculate_checksum(&contents);
        Some(Self {
            version,
            description,
            script: file_name.to_string(),
            location: location.identifier(),
            contents,
            checksum,
        })
    }
}

/// Split a script file name into version and description
pub fn parse_script_name(file_name: &str) -> Option<(Version, String)> {
    let caps = SCRIPT_NAME.captures(file_name)?;
    let version = Version::parse(caps.get(1)?.as_str())?;
    let description = caps.get(2)?.as_str().replace('_', " ");
    Some((version, description))
}

/// Only utf-8 is supported
pub fn check_encoding(encoding: &str) -> Result<(), EngineError> {
    match encoding.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => Ok(()),
        _ => Err(EngineError::UnsupportedEncoding(encoding.to_string())),
    }
}

/// Collect all scripts of `locations`, ordered by version
///
/// # Errors
///
/// Returns an error if the encoding is unsupported, a script is not valid
/// UTF-8, a directory cannot be read, or two scripts share a version.
pub fn resolve_scripts(locations: &[Location], encoding: &str) -> Result<Vec<ResolvedScript>, EngineError> {
    check_encoding(encoding)?;

    let mut scripts = Vec::new();
    for location in locations {
        let found = match location.kind() {
            LocationKind::Filesystem => read_directory(location, encoding)?,
            LocationKind::BundledResource => read_bundle(location),
        };
        log::debug!("Found {} script(s) in {}", found.len(), location);
        scripts.extend(found);
    }

    scripts.sort_by(|a, b| a.version.cmp(&b.version));

    for pair in scripts.windows(2) {
        if pair[0].version == pair[1].version {
            return Err(EngineError::DuplicateVersion {
                version: pair[0].version.to_string(),
                first: format!("{}/{}", pair[0].location, pair[0].script),
                second: format!("{}/{}", pair[1].location, pair[1].script),
            });
        }
    }

    Ok(scripts)
}

fn read_directory(location: &Location, encoding: &str) -> Result<Vec<ResolvedScript>, EngineError> {
    let dir = Path::new(location.path());
    if !dir.is_dir() {
        log::warn!("Skipping {}: directory does not exist", location);
        return Ok(Vec::new());
    }

    let unreadable = |e: std::io::Error| EngineError::LocationUnreadable {
        location: location.identifier(),
        reason: e.to_string(),
    };

    let mut scripts = Vec::new();
    for entry in fs::read_dir(dir).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if parse_script_name(file_name).is_none() {
            if file_name.ends_with(".sql") {
                log::warn!("Ignoring {}: name does not match V<version>__<description>.sql", path.display());
            }
            continue;
        }

        let bytes = fs::read(&path).map_err(unreadable)?;
        let contents = String::from_utf8(bytes).map_err(|_| EngineError::InvalidEncoding {
            script: path.display().to_string(),
            encoding: encoding.to_string(),
        })?;
        scripts.extend(ResolvedScript::new(file_name, location, contents));
    }
    Ok(scripts)
}

fn read_bundle(location: &Location) -> Vec<ResolvedScript> {
    let bundled = resources::scripts_in(location.path());
    if bundled.is_empty() {
        log::debug!("No bundled scripts registered for {}", location);
    }
    bundled
        .into_iter()
        .filter_map(|(file_name, contents)| {
            let script = ResolvedScript::new(&file_name, location, contents);
            if script.is_none() {
                log::warn!("Ignoring bundled {}: name does not match V<version>__<description>.sql", file_name);
            }
            script
        })
        .collect()
}
