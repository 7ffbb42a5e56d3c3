//! Temp artifacts of optimizer runs.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::TempPath;
use tracing::warn;

use super::error::GlpkError;

/// Raw text of every file a run produced or consumed, keyed by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Artifacts(BTreeMap<String, String>);

impl Artifacts {
    pub fn insert(&mut self, path: &Path, content: impl Into<String>) {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        self.0.insert(name, content.into());
    }

    pub fn extend(&mut self, other: Artifacts) {
        self.0.extend(other.0);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Temp files of one optimizer run. Every file is deleted on [`cleanup`]
/// or, failing that, when the workspace is dropped.
///
/// [`cleanup`]: Workspace::cleanup
pub struct Workspace {
    dir: PathBuf,
    prefix: String,
    files: Vec<TempPath>,
}

impl Workspace {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self, GlpkError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            prefix: prefix.into(),
            files: Vec::new(),
        })
    }

    /// Create a uniquely named file holding `content`.
    pub fn write(&mut self, extension: &str, content: &str) -> Result<PathBuf, GlpkError> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}_", self.prefix))
            .suffix(&format!(".{}", extension))
            .tempfile_in(&self.dir)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;

        let path = file.into_temp_path();
        let buf = path.to_path_buf();
        self.files.push(path);
        Ok(buf)
    }

    /// Create an empty, uniquely named file for a process to fill in.
    pub fn reserve(&mut self, extension: &str) -> Result<PathBuf, GlpkError> {
        self.write(extension, "")
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Delete every file now.
    pub fn cleanup(self) {
        for file in self.files {
            let path = file.display().to_string();
            if let Err(e) = file.close() {
                warn!(path = %path, error = %e, "Failed to delete optimizer artifact");
            }
        }
    }
}
