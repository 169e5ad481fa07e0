//! Script locations
//!
//! A location names a directory of migration scripts together with where it
//! is read from: the filesystem, or resources bundled into the binary. Its
//! external form is the identifier `"<kind>:<path>"`.

use std::fmt;
use std::str::FromStr;

/// Conventional script directories registered before every migration
pub const DEFAULT_LOCATIONS: [&str; 4] = ["db/design", "db/scripts", "db/values", "db/trigger"];

/// Where the scripts of a location are read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationKind {
    Filesystem,
    BundledResource,
}

impl LocationKind {
    /// Map the adapter's `from_filesystem` flag to a kind
    pub fn from_filesystem(from_filesystem: bool) -> Self {
        if from_filesystem {
            LocationKind::Filesystem
        } else {
            LocationKind::BundledResource
        }
    }

    /// Identifier prefix, without the colon
    pub fn prefix(&self) -> &'static str {
        match self {
            LocationKind::Filesystem => "filesystem",
            LocationKind::BundledResource => "bundled-resource",
        }
    }
}

/// A script directory tagged with its source kind
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    kind: LocationKind,
    path: String,
}

impl Location {
    pub fn new(kind: LocationKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn kind(&self) -> LocationKind {
        self.kind
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The `"<kind>:<path>"` identifier
    pub fn identifier(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.prefix(), self.path)
    }
}

/// Error returned when parsing a location identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid location '{0}': expected 'filesystem:<path>' or 'bundled-resource:<path>'")]
pub struct ParseLocationError(String);

impl FromStr for Location {
    type Err = ParseLocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, path) = s
            .split_once(':')
            .ok_or_else(|| ParseLocationError(s.to_string()))?;
        let kind = match prefix {
            "filesystem" => LocationKind::Filesystem,
            "bundled-resource" => LocationKind::BundledResource,
            _ => return Err(ParseLocationError(s.to_string())),
        };
        if path.is_empty() {
            return Err(ParseLocationError(s.to_string()));
        }
        Ok(Location::new(kind, path))
    }
}

/// Ordered, duplicate-free list of script locations
///
/// Entries keep the position of their first insertion; adding an identifier
/// that is already present is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationRegistry {
    locations: Vec<Location>,
}

impl LocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `path` with the given kind unless the identifier is already present
    ///
    /// Returns `true` if the location was added.
    pub fn add_file_location(&mut self, path: &str, from_filesystem: bool) -> bool {
        self.add(Location::new(LocationKind::from_filesystem(from_filesystem), path))
    }

    /// Append a location unless it is already present
    pub fn add(&mut self, location: Location) -> bool {
        if self.locations.contains(&location) {
            return false;
        }
        self.locations.push(location);
        true
    }

    /// Register the four [`DEFAULT_LOCATIONS`] with the given kind
    pub fn add_default_locations(&mut self, from_filesystem: bool) {
        for path in DEFAULT_LOCATIONS {
            self.add_file_location(path, from_filesystem);
        }
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// All identifiers in registration order
    pub fn identifiers(&self) -> Vec<String> {
        self.locations.iter().map(Location::identifier).collect()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
