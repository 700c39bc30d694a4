//! Resource location resolution
//!
//! Schema sources refer to each other through `schemaLocation` values that
//! are relative to the referring document. Locations are kept as strings
//! throughout the crate; this module turns a relative reference plus a base
//! into the absolute key used by loaders and by the include bookkeeping.

use crate::error::Result;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// Resource location - can be a URL, file path, or string identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// URL (http, https, file, ...)
    Url(Url),
    /// String identifier (for in-memory resources)
    String(String),
}

impl Location {
    /// Create a location from a string (auto-detect type)
    pub fn from_str(s: &str) -> Self {
        if let Ok(url) = Url::parse(s) {
            // Single letters are Windows drive prefixes, not schemes
            if url.scheme().len() > 1 {
                return Location::Url(url);
            }
        }

        let path = PathBuf::from(s);
        if path.is_absolute() || s.starts_with('.') || path.exists() {
            return Location::Path(path);
        }

        Location::String(s.to_string())
    }

    /// Get the location as a string
    pub fn as_str(&self) -> String {
        match self {
            Location::Path(p) => p.to_string_lossy().replace('\\', "/"),
            Location::Url(u) => u.to_string(),
            Location::String(s) => s.clone(),
        }
    }

    /// Check if this is a remote location (non-file URL)
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(u) if u.scheme() != "file")
    }

    /// Check if this is a local file
    pub fn is_file(&self) -> bool {
        match self {
            Location::Path(_) => true,
            Location::Url(u) => u.scheme() == "file",
            Location::String(_) => false,
        }
    }

    /// Local file path, for paths and `file:` URLs
    pub fn to_file_path(&self) -> Option<PathBuf> {
        match self {
            Location::Path(p) => Some(p.clone()),
            Location::Url(u) if u.scheme() == "file" => u.to_file_path().ok(),
            _ => None,
        }
    }
}

/// Resolve `location` against the location of the referring document
///
/// Absolute URLs are returned unchanged. A URL base is joined with the URL
/// rules; any other base is treated as a path and the reference is joined to
/// its parent directory, with `.` and `..` segments folded lexically.
pub fn resolve_location(location: &str, base: Option<&str>) -> Result<String> {
    let location = location.trim();
    if let Location::Url(url) = Location::from_str(location) {
        return Ok(url.to_string());
    }

    let Some(base) = base else {
        return Ok(normalize_path(Path::new(location)));
    };

    if let Location::Url(base_url) = Location::from_str(base) {
        return Ok(base_url.join(location)?.to_string());
    }

    let relative = Path::new(location);
    if relative.is_absolute() {
        return Ok(normalize_path(relative));
    }

    let joined = match Path::new(base).parent() {
        Some(dir) => dir.join(relative),
        None => relative.to_path_buf(),
    };
    Ok(normalize_path(&joined))
}

fn normalize_path(path: &Path) -> String {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    let normalized: PathBuf = parts.iter().collect();
    normalized.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_from_url() {
        let loc = Location::from_str("http://example.com/schema.xsd");
        assert!(matches!(loc, Location::Url(_)));
        assert!(loc.is_remote());
    }

    #[test]
    fn test_location_from_path() {
        let loc = Location::from_str("/tmp/schema.xsd");
        assert!(matches!(loc, Location::Path(_)));
        assert!(loc.is_file());
        assert!(loc.to_file_path().is_some());
    }

    #[test]
    fn test_location_as_str() {
        let loc = Location::String("test".to_string());
        assert_eq!(loc.as_str(), "test");
    }

    #[test]
    fn test_resolve_relative_path() {
        let resolved = resolve_location("types.xsd", Some("schemas/main.xsd")).unwrap();
        assert_eq!(resolved, "schemas/types.xsd");

        let resolved = resolve_location("../common/a.xsd", Some("schemas/v1/main.xsd")).unwrap();
        assert_eq!(resolved, "schemas/common/a.xsd");

        let resolved = resolve_location("./b.xsd", Some("a.xsd")).unwrap();
        assert_eq!(resolved, "b.xsd");
    }

    #[test]
    fn test_resolve_against_url() {
        let resolved =
            resolve_location("b.xsd", Some("http://example.com/schemas/a.xsd")).unwrap();
        assert_eq!(resolved, "http://example.com/schemas/b.xsd");
    }

    #[test]
    fn test_resolve_without_base() {
        assert_eq!(resolve_location("a/./b.xsd", None).unwrap(), "a/b.xsd");
    }
}
