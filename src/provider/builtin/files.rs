//! File system operations rooted at a base directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::fs;

use crate::error::ProviderError;
use crate::provider::{CapabilityProvider, optional_str, require_str};

/// Maximum file size for reading (1MB).
const MAX_READ_SIZE: u64 = 1024 * 1024;

/// File operations: read, write, list, exists.
///
/// Paths are resolved relative to the base directory; absolute paths and
/// parent-directory components are rejected so an operation cannot escape
/// its root.
pub struct FileOperationsProvider {
    base_dir: PathBuf,
}

impl FileOperationsProvider {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn resolve(&self, operation: &str, path_str: &str) -> Result<PathBuf, ProviderError> {
        let path = Path::new(path_str);
        if path.is_absolute()
            || path
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ProviderError::InvalidArguments {
                operation: operation.to_string(),
                reason: format!("path escapes the provider root: {path_str}"),
            });
        }
        Ok(self.base_dir.join(path))
    }

    async fn read(&self, path: &Path) -> Result<Value, ProviderError> {
        let meta = match fs::metadata(path).await {
            Ok(meta) => meta,
            Err(_) => {
                return Ok(json!({
                    "path": path.display().to_string(),
                    "error": format!("{} does not exist", path.display()),
                }));
            }
        };
        if meta.len() > MAX_READ_SIZE {
            return Ok(json!({
                "path": path.display().to_string(),
                "error": format!("file too large ({} bytes)", meta.len()),
            }));
        }
        let content = fs::read_to_string(path).await?;
        Ok(json!({
            "path": path.display().to_string(),
            "content": content,
        }))
    }

    async fn write(&self, path: &Path, content: &str) -> Result<Value, ProviderError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, content).await?;
        Ok(json!({
            "path": path.display().to_string(),
            "bytes_written": content.len(),
        }))
    }

    async fn list(&self, path: &Path) -> Result<Value, ProviderError> {
        if !path.is_dir() {
            return Ok(json!({
                "path": path.display().to_string(),
                "error": format!("{} is not a directory", path.display()),
            }));
        }
        let mut entries = Vec::new();
        let mut dir = fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            entries.push(entry.file_name().to_string_lossy().into_owned());
        }
        entries.sort();
        Ok(json!({
            "path": path.display().to_string(),
            "entries": entries,
        }))
    }
}

#[async_trait]
impl CapabilityProvider for FileOperationsProvider {
    async fn invoke(
        &self,
        operation: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ProviderError> {
        let op = require_str(arguments, operation, "operation")?;
        let path = self.resolve(operation, require_str(arguments, operation, "path")?)?;

        match op {
            "read" => self.read(&path).await,
            "write" => {
                let content = optional_str(arguments, "content", "");
                if !arguments.contains_key("content") {
                    return Ok(json!({
                        "path": path.display().to_string(),
                        "error": "content parameter required for write",
                    }));
                }
                self.write(&path, content).await
            }
            "list" => self.list(&path).await,
            "exists" => Ok(json!({
                "path": path.display().to_string(),
                "exists": fs::try_exists(&path).await.unwrap_or(false),
            })),
            other => Err(ProviderError::InvalidArguments {
                operation: operation.to_string(),
                reason: format!("invalid operation {other}; must be one of read, write, list, exists"),
            }),
        }
    }
}
