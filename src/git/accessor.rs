//! Working-tree access: resolve, clone, fetch, and reset
//!
//! Each project owns one persistent working tree under the configured
//! workspaces root. The tree is mutated in place across calls and never
//! deleted between them; a per-project lock keeps concurrent ingestions from
//! interleaving git operations on it. Parsing and storing happen outside the
//! lock once a snapshot is captured.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use git2::build::RepoBuilder;
use git2::{FetchOptions, Repository};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task;
use tracing::{debug, info};
use url::Url;

use crate::errors::IngestError;
use crate::git::auth::{authenticated_clone_url, remote_callbacks};
use crate::types::{AuthCredential, ProjectId, RemoteHost, SourceKind, SourceReference};

/// A working tree resolved to a specific HEAD, with its tracked files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSnapshot {
    pub working_tree: PathBuf,
    pub head_identifier: String,
    /// Relative paths of every version-control-tracked file, ordered,
    /// already filtered by the subdirectory prefix when one is set.
    pub tracked_files: Vec<String>,
}

/// Clone and fetch tunables.
#[derive(Debug, Clone)]
pub struct GitAccessorConfig {
    /// Directory holding one persistent working tree per project.
    pub workspaces_root: PathBuf,
    /// Shallow history depth for clones and fetches. `None` disables shallow
    /// negotiation for transports that lack it.
    pub clone_depth: Option<i32>,
    /// Upper bound on any single network operation.
    pub network_timeout: Duration,
}

impl GitAccessorConfig {
    pub fn new(workspaces_root: impl Into<PathBuf>) -> Self {
        Self {
            workspaces_root: workspaces_root.into(),
            clone_depth: Some(1),
            network_timeout: Duration::from_secs(300),
        }
    }
}

/// Resolves source references to working trees and drives authenticated
/// clone/fetch/reset operations against them.
pub struct GitAccessor {
    config: GitAccessorConfig,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl GitAccessor {
    pub fn new(config: GitAccessorConfig) -> Self {
        Self {
            config,
            locks: DashMap::new(),
        }
    }

    fn project_lock(&self, project: &ProjectId) -> Arc<Mutex<()>> {
        self.locks
            .entry(project.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn workspace_path(&self, project: &ProjectId) -> PathBuf {
        self.config.workspaces_root.join(project.as_str())
    }

    /// Resolve a source into a working tree + HEAD snapshot. The first remote
    /// resolution performs the shallow clone; later calls reuse the tree.
    pub async fn resolve(
        &self,
        source: &SourceReference,
        credential: &AuthCredential,
        project: &ProjectId,
    ) -> Result<RepoSnapshot, IngestError> {
        let lock = self.project_lock(project);
        let _held = lock.lock().await;

        match source.kind {
            SourceKind::Local => Self::local_snapshot(source),
            SourceKind::Remote => {
                let workspace = self.workspace_path(project);
                if !workspace.join(".git").exists() {
                    self.clone_into(source, credential, &workspace).await?;
                }
                Self::snapshot_repo(&workspace, source.subdirectory_filter.as_deref())
            }
        }
    }

    /// Fetch the remote HEAD identifier without mutating the working tree.
    /// Clones first if the workspace does not exist yet.
    pub async fn probe_remote(
        &self,
        source: &SourceReference,
        credential: &AuthCredential,
        project: &ProjectId,
    ) -> Result<String, IngestError> {
        let lock = self.project_lock(project);
        let _held = lock.lock().await;

        let workspace = self.workspace_path(project);
        if !workspace.join(".git").exists() {
            self.clone_into(source, credential, &workspace).await?;
            let snapshot = Self::snapshot_repo(&workspace, None)?;
            return Ok(snapshot.head_identifier);
        }

        self.fetch_remote_head(source, credential, &workspace).await
    }

    /// Reset the working tree to the fetched remote HEAD and snapshot it.
    /// Performed only on explicit apply.
    pub async fn apply_remote(
        &self,
        source: &SourceReference,
        credential: &AuthCredential,
        project: &ProjectId,
    ) -> Result<RepoSnapshot, IngestError> {
        let lock = self.project_lock(project);
        let _held = lock.lock().await;

        let workspace = self.workspace_path(project);
        if !workspace.join(".git").exists() {
            self.clone_into(source, credential, &workspace).await?;
            return Self::snapshot_repo(&workspace, source.subdirectory_filter.as_deref());
        }

        let host_label = host_label(source);
        let depth = self.config.clone_depth;
        let callbacks_credential = credential.clone();
        let host = source.host;
        let workspace_clone = workspace.clone();
        let cancel = Arc::new(AtomicBool::new(false));
        let task_cancel = cancel.clone();

        let handle = task::spawn_blocking(move || -> Result<(), git2::Error> {
            let repo = Repository::open(&workspace_clone)?;
            let oid = fetch_head_oid(&repo, &callbacks_credential, host, depth, task_cancel)?;
            let object = repo.find_object(oid, None)?;
            repo.reset(&object, git2::ResetType::Hard, None)?;
            Ok(())
        });
        self.run_network("pull", host_label, cancel, handle).await?;

        info!(project = %project, "Working tree reset to remote HEAD");
        Self::snapshot_repo(&workspace, source.subdirectory_filter.as_deref())
    }

    async fn clone_into(
        &self,
        source: &SourceReference,
        credential: &AuthCredential,
        workspace: &Path,
    ) -> Result<(), IngestError> {
        // A directory without .git is a half-finished clone; start over.
        if workspace.exists() {
            std::fs::remove_dir_all(workspace)
                .map_err(|e| IngestError::repo(format!("failed to clear workspace: {e}")))?;
        }
        std::fs::create_dir_all(workspace)
            .map_err(|e| IngestError::repo(format!("failed to create workspace: {e}")))?;

        let clone_url = clone_url(source, credential);
        let host_label = host_label(source);
        let host = source.host;
        let depth = self.config.clone_depth;
        let callbacks_credential = credential.clone();
        let workspace = workspace.to_path_buf();
        let cancel = Arc::new(AtomicBool::new(false));
        let task_cancel = cancel.clone();

        // Log the project-facing location, never the authenticated URL.
        info!(
            source = %source.location,
            workspace = %workspace.display(),
            "Cloning repository"
        );

        let handle = task::spawn_blocking(move || -> Result<(), git2::Error> {
            let mut fetch = FetchOptions::new();
            fetch.remote_callbacks(remote_callbacks(&callbacks_credential, host, task_cancel));
            if let Some(depth) = depth {
                fetch.depth(depth);
            }
            let mut builder = RepoBuilder::new();
            builder.fetch_options(fetch);
            builder.clone(&clone_url, &workspace)?;
            Ok(())
        });
        self.run_network("clone", host_label, cancel, handle).await
    }

    async fn fetch_remote_head(
        &self,
        source: &SourceReference,
        credential: &AuthCredential,
        workspace: &Path,
    ) -> Result<String, IngestError> {
        let host_label = host_label(source);
        let host = source.host;
        let depth = self.config.clone_depth;
        let callbacks_credential = credential.clone();
        let workspace = workspace.to_path_buf();
        let cancel = Arc::new(AtomicBool::new(false));
        let task_cancel = cancel.clone();

        let handle = task::spawn_blocking(move || -> Result<String, git2::Error> {
            let repo = Repository::open(&workspace)?;
            let oid = fetch_head_oid(&repo, &callbacks_credential, host, depth, task_cancel)?;
            Ok(oid.to_string())
        });
        self.run_network("fetch", host_label, cancel, handle).await
    }

    /// Bound a blocking network task by the configured timeout. On timeout
    /// the cancel flag aborts the transfer at its next progress callback, and
    /// the task is awaited so the working tree is quiescent before the
    /// per-project lock is released.
    async fn run_network<T: Send + 'static>(
        &self,
        operation: &'static str,
        host: String,
        cancel: Arc<AtomicBool>,
        handle: task::JoinHandle<Result<T, git2::Error>>,
    ) -> Result<T, IngestError> {
        let mut handle = handle;
        match tokio::time::timeout(self.config.network_timeout, &mut handle).await {
            Err(_) => {
                cancel.store(true, std::sync::atomic::Ordering::Relaxed);
                let _ = handle.await;
                Err(IngestError::repo(format!(
                    "{} timed out after {}s",
                    operation,
                    self.config.network_timeout.as_secs()
                )))
            }
            Ok(Err(join_err)) => Err(IngestError::repo(format!(
                "{} worker failed: {}",
                operation, join_err
            ))),
            Ok(Ok(Err(err))) => Err(IngestError::from_git(&host, operation, err)),
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }

    fn local_snapshot(source: &SourceReference) -> Result<RepoSnapshot, IngestError> {
        let path = Path::new(&source.location).canonicalize().map_err(|e| {
            IngestError::InvalidSource {
                location: source.location.clone(),
                reason: e.to_string(),
            }
        })?;
        Self::snapshot_repo(&path, source.subdirectory_filter.as_deref())
    }

    fn snapshot_repo(path: &Path, subdirectory: Option<&str>) -> Result<RepoSnapshot, IngestError> {
        let repo = Repository::open(path)
            .map_err(|e| IngestError::from_git("local", "open", e))?;
        let head = repo
            .head()
            .map_err(|e| IngestError::from_git("local", "read HEAD", e))?;
        let head_identifier = head
            .target()
            .map(|oid| oid.to_string())
            .ok_or_else(|| IngestError::repo("HEAD is not a direct reference"))?;
        let tree = head
            .peel_to_tree()
            .map_err(|e| IngestError::from_git("local", "peel HEAD", e))?;

        let mut tracked_files = Vec::new();
        walk_tree(&repo, &tree, "", &mut tracked_files)
            .map_err(|e| IngestError::from_git("local", "walk tree", e))?;

        if let Some(prefix) = subdirectory {
            tracked_files.retain(|p| p == prefix || p.starts_with(&format!("{}/", prefix)));
        }
        tracked_files.sort();

        debug!(
            workspace = %path.display(),
            head = %head_identifier,
            files = tracked_files.len(),
            "Captured repository snapshot"
        );

        Ok(RepoSnapshot {
            working_tree: path.to_path_buf(),
            head_identifier,
            tracked_files,
        })
    }
}

/// Tracked files are the blobs of the HEAD tree, so enumeration stays
/// deterministic after clone/fetch/reset and excludes ignored paths.
fn walk_tree(
    repo: &Repository,
    tree: &git2::Tree<'_>,
    prefix: &str,
    out: &mut Vec<String>,
) -> Result<(), git2::Error> {
    for entry in tree.iter() {
        let Some(name) = entry.name() else { continue };
        let path = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        };

        match entry.kind() {
            Some(git2::ObjectType::Tree) => {
                let subtree = repo.find_tree(entry.id())?;
                walk_tree(repo, &subtree, &path, out)?;
            }
            Some(git2::ObjectType::Blob) => out.push(path),
            _ => {}
        }
    }
    Ok(())
}

/// Fetch the current branch from origin and return the FETCH_HEAD commit id.
fn fetch_head_oid(
    repo: &Repository,
    credential: &AuthCredential,
    host: Option<RemoteHost>,
    depth: Option<i32>,
    cancel: Arc<AtomicBool>,
) -> Result<git2::Oid, git2::Error> {
    let mut remote = repo.find_remote("origin")?;
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(remote_callbacks(credential, host, cancel));
    if let Some(depth) = depth {
        fetch.depth(depth);
    }

    let branch = repo
        .head()
        .ok()
        .and_then(|h| h.shorthand().map(String::from))
        .filter(|name| name != "HEAD");
    let refspecs: Vec<String> = branch.into_iter().collect();
    let refs: Vec<&str> = refspecs.iter().map(String::as_str).collect();

    remote.fetch(&refs, Some(&mut fetch), None)?;

    let fetch_head = repo.find_reference("FETCH_HEAD")?;
    let commit = fetch_head.peel_to_commit()?;
    Ok(commit.id())
}

fn host_label(source: &SourceReference) -> String {
    source
        .host
        .map(|h| h.to_string())
        .unwrap_or_else(|| "remote".to_string())
}

fn clone_url(source: &SourceReference, credential: &AuthCredential) -> String {
    match Url::parse(&source.location) {
        Ok(url) => {
            let host = source.host.unwrap_or(RemoteHost::Other);
            authenticated_clone_url(credential, &url, host).to_string()
        }
        // scp-like remote; the token flows through the transport callbacks.
        Err(_) => source.location.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CredentialSource;

    fn no_credential() -> AuthCredential {
        AuthCredential {
            token: None,
            source: CredentialSource::SystemGit,
        }
    }

    fn commit_file(repo: &Repository, relative: &str, contents: &[u8]) -> anyhow::Result<String> {
        let workdir = repo.workdir().expect("test repo has a workdir");
        let target = workdir.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, contents)?;

        let mut index = repo.index()?;
        index.add_path(Path::new(relative))?;
        index.write()?;
        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let signature = git2::Signature::now("Repolens Test", "test@repolens.dev")?;
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let oid = repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &format!("add {}", relative),
            &tree,
            &parents,
        )?;
        Ok(oid.to_string())
    }

    #[tokio::test]
    async fn test_resolve_local_repository() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let repo = Repository::init(temp.path())?;
        let sha = commit_file(&repo, "src/lib.rs", b"pub fn answer() -> u32 { 42 }\n")?;
        commit_file(&repo, "README.md", b"# demo\n")?;

        let accessor = GitAccessor::new(GitAccessorConfig::new(temp.path().join("unused")));
        let source = SourceReference::parse(temp.path().to_str().unwrap(), None)?;
        let project = ProjectId::new("demo");
        let snapshot = accessor.resolve(&source, &no_credential(), &project).await?;

        assert_ne!(snapshot.head_identifier, sha, "HEAD moved past first commit");
        assert_eq!(snapshot.tracked_files, vec!["README.md", "src/lib.rs"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_subdirectory_filter_limits_enumeration() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let repo = Repository::init(temp.path())?;
        commit_file(&repo, "src/app/main.rs", b"fn main() {}\n")?;
        commit_file(&repo, "src/app/util.rs", b"pub fn util() {}\n")?;
        commit_file(&repo, "docs/guide.md", b"# guide\n")?;

        let accessor = GitAccessor::new(GitAccessorConfig::new(temp.path().join("unused")));
        let source =
            SourceReference::parse(temp.path().to_str().unwrap(), Some("src/app".to_string()))?;
        let project = ProjectId::new("demo");
        let snapshot = accessor.resolve(&source, &no_credential(), &project).await?;

        assert_eq!(
            snapshot.tracked_files,
            vec!["src/app/main.rs", "src/app/util.rs"]
        );
        assert!(snapshot.tracked_files.iter().all(|p| p.starts_with("src/app/")));
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_rejects_non_repository() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let accessor = GitAccessor::new(GitAccessorConfig::new(temp.path().join("unused")));
        let source = SourceReference::parse(temp.path().to_str().unwrap(), None)?;
        let project = ProjectId::new("demo");

        let err = accessor
            .resolve(&source, &no_credential(), &project)
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::RepoIngest { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_timed_out_clone_is_awaited_and_workspace_recovers() -> anyhow::Result<()> {
        let origin = tempfile::TempDir::new()?;
        let repo = Repository::init(origin.path())?;
        commit_file(&repo, "src/lib.rs", b"pub fn x() {}\n")?;

        let url = Url::from_file_path(origin.path().canonicalize()?)
            .expect("absolute path converts to URL")
            .to_string();
        let source = SourceReference::parse(&url, None)?;
        let project = ProjectId::new("demo");
        let worktrees = tempfile::TempDir::new()?;

        // Zero timeout: the clone is cancelled and awaited, so by the time
        // the error surfaces nothing is still writing to the workspace.
        let impatient = GitAccessor::new(GitAccessorConfig {
            clone_depth: None,
            network_timeout: Duration::ZERO,
            ..GitAccessorConfig::new(worktrees.path())
        });
        let err = impatient
            .resolve(&source, &no_credential(), &project)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));

        // A later call over the same workspaces root recovers cleanly.
        let accessor = GitAccessor::new(GitAccessorConfig {
            clone_depth: None,
            ..GitAccessorConfig::new(worktrees.path())
        });
        let snapshot = accessor.resolve(&source, &no_credential(), &project).await?;
        assert_eq!(snapshot.tracked_files, vec!["src/lib.rs"]);
        Ok(())
    }
}
