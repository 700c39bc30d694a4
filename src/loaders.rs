//! Resource loading utilities
//!
//! The compiler never touches the file system directly. Every schema source
//! it needs is fetched through a [`ResourceLoader`], and every failure of a
//! loader is surfaced as [`Error::Resource`].

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::locations::{resolve_location, Location};
use indexmap::IndexMap;
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// Synchronous source of schema bytes
pub trait ResourceLoader: Send + Sync + fmt::Debug {
    /// Fetch the resource at an absolute location
    fn fetch(&self, location: &str) -> Result<Vec<u8>>;

    /// Turn a reference found in `base` into an absolute location
    fn resolve(&self, location: &str, base: Option<&str>) -> Result<String> {
        resolve_location(location, base)
    }
}

/// Loader reading from the local file system
#[derive(Debug, Clone)]
pub struct FsLoader {
    /// Resource limits
    limits: Limits,
    /// Directory that relative top-level locations are resolved against
    base_dir: Option<PathBuf>,
}

impl FsLoader {
    /// Create a new loader with default settings
    pub fn new() -> Self {
        Self {
            limits: Limits::default(),
            base_dir: None,
        }
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the base directory for relative locations
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    fn file_path(&self, location: &str) -> Result<PathBuf> {
        let loc = Location::from_str(location);
        if loc.is_remote() {
            return Err(Error::Resource(format!(
                "Remote resources are not supported: {}",
                location
            )));
        }
        let path = match loc.to_file_path() {
            Some(path) => path,
            None => PathBuf::from(location),
        };
        Ok(match &self.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path,
        })
    }
}

impl Default for FsLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceLoader for FsLoader {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let path = self.file_path(location)?;

        let metadata = fs::metadata(&path).map_err(|e| {
            Error::Resource(format!("Failed to read file '{}': {}", path.display(), e))
        })?;
        self.limits.check_source_size(metadata.len() as usize)?;

        fs::read(&path).map_err(|e| {
            Error::Resource(format!("Failed to read file '{}': {}", path.display(), e))
        })
    }
}

/// Loader serving resources from memory
///
/// Locations are matched after resolution, so a source registered as
/// `"schemas/types.xsd"` is found from `"schemas/main.xsd"` via
/// `schemaLocation="types.xsd"`.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    resources: IndexMap<String, Vec<u8>>,
}

impl MemoryLoader {
    /// Create an empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource
    pub fn insert(&mut self, location: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.resources.insert(location.into(), content.into());
    }

    /// Register a resource, builder style
    pub fn with_resource(mut self, location: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(location, content);
        self
    }

    /// Number of registered resources
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Check if no resources are registered
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceLoader for MemoryLoader {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        self.resources
            .get(location)
            .cloned()
            .ok_or_else(|| Error::Resource(format!("Resource not found: {}", location)))
    }
}
