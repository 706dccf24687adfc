//! Configuration sources for the model preset.
//!
//! # Responsibilities
//! - Read the current preset bytes
//! - Compute a fingerprint (modification time, length, content digest)
//!
//! # Design Decisions
//! - Read-only: the router never writes back to the source
//! - The digest is computed on every read so same-second edits are still seen
//! - Decoding is left to the caller, so undecodable content still has a
//!   fingerprint and is rejected once like any other bad document

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Identity of one observed version of the source content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub modified: Option<SystemTime>,
    pub len: u64,
    pub digest: [u8; 32],
}

impl Fingerprint {
    /// Fingerprint content with an optional modification time.
    pub fn of(bytes: &[u8], modified: Option<SystemTime>) -> Self {
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&Sha256::digest(bytes));
        Self {
            modified,
            len: bytes.len() as u64,
            digest,
        }
    }

    /// Short hex prefix of the digest, for logs.
    pub fn short(&self) -> String {
        self.digest[..4].iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Content read from a source.
#[derive(Debug, Clone)]
pub struct SourceContent {
    pub bytes: Vec<u8>,
    pub fingerprint: Fingerprint,
}

impl SourceContent {
    pub fn text(&self) -> Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.bytes)
    }
}

/// Failure to read a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read preset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A readable preset with a changeable fingerprint.
#[async_trait]
pub trait PresetSource: Send + Sync {
    /// Human readable identifier used in logs.
    fn describe(&self) -> String;

    /// Read the current content.
    async fn read(&self) -> Result<SourceContent, SourceError>;
}

/// Preset stored in a file on disk.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PresetSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn read(&self) -> Result<SourceContent, SourceError> {
        let io_err = |source| SourceError::Io {
            path: self.path.clone(),
            source,
        };
        let modified = tokio::fs::metadata(&self.path)
            .await
            .map_err(io_err)?
            .modified()
            .ok();
        let bytes = tokio::fs::read(&self.path).await.map_err(io_err)?;
        let fingerprint = Fingerprint::of(&bytes, modified);
        Ok(SourceContent { bytes, fingerprint })
    }
}

/// In-memory preset, for embedding and tests.
///
/// Every `set` counts as a modification even if the text is identical.
#[derive(Debug, Default)]
pub struct MemorySource {
    text: Mutex<String>,
    writes: AtomicU64,
}

impl MemorySource {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Mutex::new(text.into()),
            writes: AtomicU64::new(0),
        }
    }

    pub fn set(&self, text: impl Into<String>) {
        *self.text.lock() = text.into();
        self.writes.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl PresetSource for MemorySource {
    fn describe(&self) -> String {
        "<memory>".to_string()
    }

    async fn read(&self) -> Result<SourceContent, SourceError> {
        let text = self.text.lock().clone();
        let writes = self.writes.load(Ordering::Relaxed);
        let modified = SystemTime::UNIX_EPOCH.checked_add(std::time::Duration::from_nanos(writes));
        let bytes = text.into_bytes();
        let fingerprint = Fingerprint::of(&bytes, modified);
        Ok(SourceContent { bytes, fingerprint })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = Fingerprint::of(b"[a]\nmodel = x\n", None);
        let b = Fingerprint::of(b"[a]\nmodel = y\n", None);
        assert_ne!(a, b);
        assert_eq!(a, Fingerprint::of(b"[a]\nmodel = x\n", None));
        assert_eq!(a.short().len(), 8);
    }

    #[tokio::test]
    async fn test_file_source_reads_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.ini");
        std::fs::write(&path, "[a]\nmodel = x\n").unwrap();

        let source = FileSource::new(&path);
        let first = source.read().await.unwrap();
        assert!(first.text().unwrap().contains("[a]"));

        std::fs::write(&path, "[a]\nmodel = y\n").unwrap();
        let second = source.read().await.unwrap();
        assert_ne!(first.fingerprint, second.fingerprint);
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let source = FileSource::new("/nonexistent/models.ini");
        assert!(matches!(source.read().await, Err(SourceError::Io { .. })));
    }

    #[tokio::test]
    async fn test_memory_source_counts_writes() {
        let source = MemorySource::new("[a]\nmodel = x\n");
        let first = source.read().await.unwrap().fingerprint;
        source.set("[a]\nmodel = x\n");
        let second = source.read().await.unwrap().fingerprint;
        assert_ne!(first, second);
        assert_eq!(first.digest, second.digest);
    }
}
