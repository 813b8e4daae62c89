//! Host collaborator seams: the diagnostic sink and the file store.
//!
//! The engine never touches the display or the filesystem directly. It writes
//! plain text lines to a `DiagnosticSink` and reads file-backed submissions
//! through a `FileStore`. The front end supplies real implementations; the
//! defaults here cover the common case and the test suite.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

/// Receives diagnostic text lines from the engine.
pub trait DiagnosticSink: Send + Sync {
    /// Write one line of diagnostic text.
    fn write_line(&self, text: &str);
}

/// Default sink: standard error.
#[derive(Debug, Default)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn write_line(&self, text: &str) {
        let _ = writeln!(std::io::stderr(), "{}", text);
    }
}

/// Sink that captures lines in memory, for tests and embedders that render
/// diagnostics themselves.
#[derive(Debug, Default)]
pub struct BufferSink {
    lines: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl DiagnosticSink for BufferSink {
    fn write_line(&self, text: &str) {
        self.lines.lock().unwrap().push(text.to_string());
    }
}

/// File access for file-backed submissions (`execute_file`, `spawn_file`).
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Read a file's full contents as UTF-8 text.
    async fn read_to_string(&self, path: &Path) -> std::io::Result<String>;

    /// Write text to a file, replacing any existing contents.
    async fn write_string(&self, path: &Path, text: &str) -> std::io::Result<()>;
}

/// Default store: the local filesystem via tokio::fs.
#[derive(Debug, Default)]
pub struct LocalFiles;

#[async_trait]
impl FileStore for LocalFiles {
    async fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn write_string(&self, path: &Path, text: &str) -> std::io::Result<()> {
        tokio::fs::write(path, text).await
    }
}

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryFiles {
    files: Mutex<HashMap<PathBuf, String>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file before handing the store to the engine.
    pub fn insert(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        self.files.lock().unwrap().insert(path.into(), text.into());
    }
}

#[async_trait]
impl FileStore for MemoryFiles {
    async fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("file not found: {}", path.display()),
                )
            })
    }

    async fn write_string(&self, path: &Path, text: &str) -> std::io::Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), text.to_string());
        Ok(())
    }
}
