use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::debug;

pub const DEFAULT_SANDBOX_DIR: &str = "devstral_sandbox";

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("path is outside the allowed directory: {0}")]
    Escapes(String),
    #[error("invalid path {path}")]
    InvalidPath { path: String, source: io::Error },
    #[error("{0} is not a file or does not exist")]
    NotAFile(String),
    #[error("{0} is not a directory or does not exist")]
    NotADirectory(String),
    #[error("content is required for write operation")]
    MissingContent,
    #[error("permission denied for {0}")]
    PermissionDenied(String),
    #[error("could not access {path}")]
    Io { path: String, source: io::Error },
}

impl SandboxError {
    fn io(path: &str, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied(path.to_string())
        } else {
            Self::Io {
                path: path.to_string(),
                source,
            }
        }
    }
}

/// A directory that every file operation is confined to.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves `requested` to a canonical path inside the sandbox.
    ///
    /// Creates the sandbox root on first use. `..` may not climb above the root,
    /// absolute paths must already point into it, and symlinks are followed
    /// through the nearest existing ancestor before the containment check.
    pub async fn resolve(&self, requested: &str) -> Result<PathBuf, SandboxError> {
        let root = self.canonical_root().await?;
        let requested_path = Path::new(requested);

        let relative = if requested_path.is_absolute() {
            requested_path
                .strip_prefix(&root)
                .or_else(|_| requested_path.strip_prefix(&self.root))
                .map_err(|_| SandboxError::Escapes(requested.to_string()))?
        } else {
            requested_path
        };

        let mut normalized = PathBuf::new();
        for component in relative.components() {
            match component {
                Component::CurDir => {}
                Component::Normal(part) => normalized.push(part),
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(SandboxError::Escapes(requested.to_string()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(SandboxError::Escapes(requested.to_string()));
                }
            }
        }

        let full = root.join(&normalized);
        let mut existing = full.as_path();
        while fs::symlink_metadata(existing).await.is_err() {
            existing = existing
                .parent()
                .ok_or_else(|| SandboxError::Escapes(requested.to_string()))?;
        }
        let remainder = full
            .strip_prefix(existing)
            .map_err(|_| SandboxError::Escapes(requested.to_string()))?;
        let canonical = fs::canonicalize(existing)
            .await
            .map_err(|source| SandboxError::InvalidPath {
                path: requested.to_string(),
                source,
            })?
            .join(remainder);

        if !canonical.starts_with(&root) {
            debug!(requested, resolved = %canonical.display(), "rejected path outside sandbox");
            return Err(SandboxError::Escapes(requested.to_string()));
        }
        Ok(canonical)
    }

    pub async fn read(&self, path: &str) -> Result<String, SandboxError> {
        let target = self.resolve(path).await?;
        match fs::metadata(&target).await {
            Ok(metadata) if metadata.is_file() => {}
            _ => return Err(SandboxError::NotAFile(path.to_string())),
        }
        fs::read_to_string(&target)
            .await
            .map_err(|source| SandboxError::io(path, source))
    }

    pub async fn write(&self, path: &str, content: &str) -> Result<String, SandboxError> {
        let target = self.resolve(path).await?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| SandboxError::io(path, source))?;
        }
        fs::write(&target, content)
            .await
            .map_err(|source| SandboxError::io(path, source))?;
        Ok(format!("Successfully wrote to {path}"))
    }

    pub async fn list(&self, path: &str) -> Result<String, SandboxError> {
        let target = self.resolve(path).await?;
        match fs::metadata(&target).await {
            Ok(metadata) if metadata.is_dir() => {}
            _ => return Err(SandboxError::NotADirectory(path.to_string())),
        }

        let mut entries = fs::read_dir(&target)
            .await
            .map_err(|source| SandboxError::io(path, source))?;
        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| SandboxError::io(path, source))?
        {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }

        if names.is_empty() {
            return Ok("Directory is empty.".to_string());
        }
        names.sort();
        Ok(names.join("\n"))
    }

    async fn canonical_root(&self) -> Result<PathBuf, SandboxError> {
        let display = self.root.display().to_string();
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| SandboxError::io(&display, source))?;
        fs::canonicalize(&self.root)
            .await
            .map_err(|source| SandboxError::InvalidPath {
                path: display,
                source,
            })
    }
}
