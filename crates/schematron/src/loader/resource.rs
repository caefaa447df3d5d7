//! Resource loaders for schema files.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::trace;

use crate::error::{MigrateError, Result};

/// Environment variable consulted when a [`FileResourceLoader`] has no base path.
pub const ENV_RESOURCE_PATH: &str = "SCHEMATRON_RESOURCE_PATH";

/// Loads non-code resources such as schema files by relative path.
pub trait ResourceLoader: Send + Sync {
    /// Raw bytes of the resource at `path`.
    fn bytes(&self, path: &str) -> Result<Vec<u8>>;

    /// The resource at `path` as UTF-8 text.
    fn string(&self, path: &str) -> Result<String> {
        let bytes = self.bytes(path)?;
        String::from_utf8(bytes).map_err(|e| MigrateError::Resource {
            path: path.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })
    }
}

/// Loads resources relative to a base directory.
#[derive(Debug, Clone, Default)]
pub struct FileResourceLoader {
    base_path: Option<PathBuf>,
    env_var: Option<String>,
}

impl FileResourceLoader {
    /// Loader rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: Some(base_path.into()),
            env_var: None,
        }
    }

    /// Loader rooted at the directory named by `SCHEMATRON_RESOURCE_PATH`.
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Read the base path from `var` instead of `SCHEMATRON_RESOURCE_PATH`.
    pub fn with_env_var(mut self, var: impl Into<String>) -> Self {
        self.env_var = Some(var.into());
        self
    }

    fn resolve_base(&self) -> Result<PathBuf> {
        if let Some(base) = &self.base_path {
            return Ok(base.clone());
        }
        let var = self.env_var.as_deref().unwrap_or(ENV_RESOURCE_PATH);
        match std::env::var(var) {
            Ok(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Err(MigrateError::Config(format!(
                "no base path configured for file resource loader (set {} or migration.resource_path)",
                var
            ))),
        }
    }
}

impl ResourceLoader for FileResourceLoader {
    fn bytes(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve_base()?.join(path);
        trace!("Loading file resource: {}", full.display());
        std::fs::read(&full).map_err(|source| MigrateError::Resource {
            path: full.display().to_string(),
            source,
        })
    }
}

/// Serves resources from memory, e.g. schema files embedded with `include_str!`.
#[derive(Debug, Clone, Default)]
pub struct MemoryResourceLoader {
    resources: HashMap<String, Vec<u8>>,
}

impl MemoryResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a resource.
    pub fn with(mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.resources.insert(path.into(), content.into());
    }
}

impl ResourceLoader for MemoryResourceLoader {
    fn bytes(&self, path: &str) -> Result<Vec<u8>> {
        self.resources
            .get(path)
            .cloned()
            .ok_or_else(|| MigrateError::Resource {
                path: path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "resource not found"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_loader_reads_relative_to_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("schema")).unwrap();
        std::fs::write(dir.path().join("schema/core.json"), "{\"tables\": []}").unwrap();

        let loader = FileResourceLoader::new(dir.path());
        let content = loader.string("schema/core.json").unwrap();
        assert!(content.contains("tables"));
    }

    #[test]
    fn test_file_loader_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let loader = FileResourceLoader::new(dir.path());
        let err = loader.bytes("missing.json").unwrap_err();
        assert!(matches!(err, MigrateError::Resource { .. }));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn test_file_loader_without_base_path_is_config_error() {
        let loader = FileResourceLoader::from_env().with_env_var("SCHEMATRON_TEST_UNSET_RESOURCE_PATH");
        assert!(matches!(
            loader.bytes("core.json"),
            Err(MigrateError::Config(_))
        ));
    }

    #[test]
    fn test_file_loader_uses_env_var() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.yaml"), "tables: []").unwrap();
        std::env::set_var("SCHEMATRON_TEST_RESOURCE_PATH", dir.path());

        let loader = FileResourceLoader::from_env().with_env_var("SCHEMATRON_TEST_RESOURCE_PATH");
        assert_eq!(loader.string("a.yaml").unwrap(), "tables: []");
    }

    #[test]
    fn test_memory_loader() {
        let loader = MemoryResourceLoader::new().with("core.json", "{}");
        assert_eq!(loader.string("core.json").unwrap(), "{}");
        assert!(loader.bytes("other.json").is_err());
    }

    #[test]
    fn test_invalid_utf8_is_resource_error() {
        let loader = MemoryResourceLoader::new().with("bad.json", vec![0xff, 0xfe]);
        assert!(matches!(
            loader.string("bad.json"),
            Err(MigrateError::Resource { .. })
        ));
    }
}
