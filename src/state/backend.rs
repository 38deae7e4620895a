use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Where the project-state document lives.
///
/// Implementations guarantee that a reader never observes a half-written
/// document. They do not provide mutual exclusion between writers.
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// Raw document, `None` if nothing has been written yet
    async fn read_document(&self) -> Result<Option<Value>, StorageError>;

    /// Replace the whole document
    async fn write_document(&self, document: &Value) -> Result<(), StorageError>;

    fn describe(&self) -> String;
}

/// JSON file replaced through write-temp-then-rename
pub struct FileStateBackend {
    path: PathBuf,
}

impl FileStateBackend {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "projects.json".to_string());
        self.path
            .with_file_name(format!(".{file_name}.{}.tmp", uuid::Uuid::new_v4().simple()))
    }
}

#[async_trait]
impl StateBackend for FileStateBackend {
    async fn read_document(&self) -> Result<Option<Value>, StorageError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&raw)?))
    }

    async fn write_document(&self, document: &Value) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(|e| self.io_error(e))?;
            }
        }

        let contents = serde_json::to_vec_pretty(document)?;
        let temp = self.temp_path();
        fs::write(&temp, &contents).await.map_err(|e| self.io_error(e))?;

        if let Err(e) = fs::rename(&temp, &self.path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(self.io_error(e));
        }

        debug!(path = %self.path.display(), bytes = contents.len(), "State document written");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Process-local backend for tests and dry runs
#[derive(Default)]
pub struct MemoryStateBackend {
    document: Mutex<Option<Value>>,
    writes: AtomicUsize,
}

impl MemoryStateBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: Value) -> Self {
        Self {
            document: Mutex::new(Some(document)),
            writes: AtomicUsize::new(0),
        }
    }

    pub async fn snapshot(&self) -> Option<Value> {
        self.document.lock().await.clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateBackend for MemoryStateBackend {
    async fn read_document(&self) -> Result<Option<Value>, StorageError> {
        Ok(self.document.lock().await.clone())
    }

    async fn write_document(&self, document: &Value) -> Result<(), StorageError> {
        *self.document.lock().await = Some(document.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let backend = FileStateBackend::new(dir.path().join("projects.json"));
        assert!(backend.read_document().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_replaces_file_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("projects.json");
        let backend = FileStateBackend::new(&path);

        backend.write_document(&json!({"projects": {"a": {}}})).await.unwrap();
        backend.write_document(&json!({"projects": {"b": {}}})).await.unwrap();

        let doc = backend.read_document().await.unwrap().unwrap();
        assert!(doc["projects"].get("a").is_none());
        assert!(doc["projects"].get("b").is_some());

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_is_a_serialization_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("projects.json");
        std::fs::write(&path, "{ not json").unwrap();

        let backend = FileStateBackend::new(&path);
        let err = backend.read_document().await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[tokio::test]
    async fn memory_backend_counts_writes() {
        let backend = MemoryStateBackend::new();
        backend.write_document(&json!({"projects": {}})).await.unwrap();
        assert_eq!(backend.write_count(), 1);
        assert_eq!(backend.snapshot().await, Some(json!({"projects": {}})));
    }
}
