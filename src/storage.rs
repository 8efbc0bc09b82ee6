use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};

/// The object-store bucket a path lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Originals,
    Thumbnails,
}

impl ObjectKind {
    pub fn bucket_name(&self) -> &'static str {
        match self {
            ObjectKind::Originals => "originals",
            ObjectKind::Thumbnails => "thumbnails",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.bucket_name())
    }
}

/// The external store holding file bytes.
///
/// Only removal is needed by this core: bytes are written by the upload
/// pipeline and never move when files change folders.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn remove_objects(&self, kind: ObjectKind, paths: &[String]) -> Result<()>;
}

/// Object store backed by a local directory, one subdirectory per kind.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolves `path` inside the kind's directory, refusing anything that
    /// could escape it.
    fn resolve(&self, kind: ObjectKind, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(AppError::Validation(format!("Invalid object path: {}", path)));
        }
        Ok(self.root.join(kind.bucket_name()).join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn remove_objects(&self, kind: ObjectKind, paths: &[String]) -> Result<()> {
        let mut first_error = None;
        let mut removed = 0usize;

        for path in paths {
            let target = match self.resolve(kind, path) {
                Ok(target) => target,
                Err(e) => {
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            match tokio::fs::remove_file(&target).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    first_error.get_or_insert(AppError::Io(e));
                }
            }
        }

        tracing::debug!("Removed {} of {} objects from {}", removed, paths.len(), kind);

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Object store that only records what it was asked to remove.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    removed: Arc<Mutex<Vec<(ObjectKind, String)>>>,
    failing: bool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every removal fails after being recorded.
    pub fn failing() -> Self {
        Self {
            removed: Arc::default(),
            failing: true,
        }
    }

    pub async fn removed(&self) -> Vec<(ObjectKind, String)> {
        self.removed.lock().await.clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn remove_objects(&self, kind: ObjectKind, paths: &[String]) -> Result<()> {
        let mut removed = self.removed.lock().await;
        removed.extend(paths.iter().map(|p| (kind, p.clone())));
        if self.failing {
            return Err(AppError::Internal(format!("object store rejected removal from {}", kind)));
        }
        Ok(())
    }
}
