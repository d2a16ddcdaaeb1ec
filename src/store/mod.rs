//! Project and document store
//!
//! The store is an opaque put/get collaborator: documents keyed by project
//! id plus full relative path (never basename alone, so downstream
//! `path:line` citations stay unambiguous), and one `ProjectRecord` per
//! project carrying the last ingested identifier.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::types::ProjectId;

/// Persistent per-project ingestion state.
///
/// Invariant: `last_ingested_identifier` is `None` only before the first
/// successful pass and advances only after a full pass attempt completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub project_id: ProjectId,
    pub last_ingested_identifier: Option<String>,
    pub root_reference: String,
    pub updated_at: DateTime<Utc>,
}

/// Opaque project/document store.
///
/// # Postconditions
/// - `put_document` overwrites any previous content under the same path
/// - `get_record` returns `None` for projects never ingested
/// - Writes to distinct paths are independent; callers may issue them in
///   any order
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn put_document(
        &self,
        project: &ProjectId,
        relative_path: &str,
        content: &str,
    ) -> Result<()>;

    async fn get_document(&self, project: &ProjectId, relative_path: &str)
        -> Result<Option<String>>;

    /// All document paths stored for a project, sorted.
    async fn list_documents(&self, project: &ProjectId) -> Result<Vec<String>>;

    async fn get_record(&self, project: &ProjectId) -> Result<Option<ProjectRecord>>;

    async fn put_record(&self, record: &ProjectRecord) -> Result<()>;
}

/// In-memory store for tests and embedding callers.
#[derive(Default)]
pub struct MemoryProjectStore {
    documents: DashMap<String, HashMap<String, String>>,
    records: DashMap<String, ProjectRecord>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn put_document(
        &self,
        project: &ProjectId,
        relative_path: &str,
        content: &str,
    ) -> Result<()> {
        self.documents
            .entry(project.as_str().to_string())
            .or_default()
            .insert(relative_path.to_string(), content.to_string());
        Ok(())
    }

    async fn get_document(
        &self,
        project: &ProjectId,
        relative_path: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .documents
            .get(project.as_str())
            .and_then(|docs| docs.get(relative_path).cloned()))
    }

    async fn list_documents(&self, project: &ProjectId) -> Result<Vec<String>> {
        let mut paths: Vec<String> = self
            .documents
            .get(project.as_str())
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default();
        paths.sort();
        Ok(paths)
    }

    async fn get_record(&self, project: &ProjectId) -> Result<Option<ProjectRecord>> {
        Ok(self.records.get(project.as_str()).map(|r| r.clone()))
    }

    async fn put_record(&self, record: &ProjectRecord) -> Result<()> {
        self.records
            .insert(record.project_id.as_str().to_string(), record.clone());
        Ok(())
    }
}

/// File-backed store: documents under `<root>/<project>/files/<relpath>`,
/// the record as `<root>/<project>/record.json`.
pub struct FileProjectStore {
    root: PathBuf,
}

impl FileProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn files_dir(&self, project: &ProjectId) -> PathBuf {
        self.root.join(project.as_str()).join("files")
    }

    fn record_path(&self, project: &ProjectId) -> PathBuf {
        self.root.join(project.as_str()).join("record.json")
    }

    async fn collect_files(dir: &Path, base: &Path, out: &mut Vec<String>) -> Result<()> {
        let mut pending = vec![dir.to_path_buf()];
        while let Some(current) = pending.pop() {
            let mut entries = fs::read_dir(&current)
                .await
                .with_context(|| format!("failed to read {}", current.display()))?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(base) {
                    out.push(relative.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for FileProjectStore {
    async fn put_document(
        &self,
        project: &ProjectId,
        relative_path: &str,
        content: &str,
    ) -> Result<()> {
        let path = self.files_dir(project).join(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&path, content)
            .await
            .with_context(|| format!("failed to write document {}", path.display()))
    }

    async fn get_document(
        &self,
        project: &ProjectId,
        relative_path: &str,
    ) -> Result<Option<String>> {
        let path = self.files_dir(project).join(relative_path);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read document {}", path.display()))
            }
        }
    }

    async fn list_documents(&self, project: &ProjectId) -> Result<Vec<String>> {
        let base = self.files_dir(project);
        if !base.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        Self::collect_files(&base, &base, &mut paths).await?;
        paths.sort();
        Ok(paths)
    }

    async fn get_record(&self, project: &ProjectId) -> Result<Option<ProjectRecord>> {
        let path = self.record_path(project);
        match fs::read_to_string(&path).await {
            Ok(raw) => {
                let record = serde_json::from_str(&raw)
                    .with_context(|| format!("corrupt project record at {}", path.display()))?;
                Ok(Some(record))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read record {}", path.display()))
            }
        }
    }

    async fn put_record(&self, record: &ProjectRecord) -> Result<()> {
        let path = self.record_path(&record.project_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(record)?;
        fs::write(&path, raw)
            .await
            .with_context(|| format!("failed to write record {}", path.display()))
    }
}
