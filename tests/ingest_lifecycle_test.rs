//! End-to-end ingestion lifecycle tests
//!
//! These run against real git repositories built on the fly instead of
//! mocks: a temp repository acts as the remote (through a file:// URL) so
//! the clone/fetch/reset path is exercised without any network.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use git2::{IndexAddOption, Repository, Signature};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use url::Url;

use repolens::{
    GitAccessor, GitAccessorConfig, MemoryProjectStore, ProjectId, ProjectIngestor,
    ProjectOptions, ProjectStatus, ProjectStore, SkipReason,
};

fn write_file(root: &Path, relative: &str, bytes: &[u8]) -> Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

fn commit_all(repo: &Repository, message: &str) -> Result<String> {
    let mut index = repo.index()?;
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.write()?;
    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;
    let signature = Signature::now("Repolens Test", "test@repolens.dev")?;
    let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    let oid = repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?;
    Ok(oid.to_string())
}

fn sample_repository() -> Result<(TempDir, Repository)> {
    let temp = TempDir::new()?;
    let repo = Repository::init(temp.path())?;
    write_file(temp.path(), "src/lib.rs", b"pub fn answer() -> u32 {\n    42\n}\n")?;
    write_file(temp.path(), "src/app/main.rs", b"fn main() {}\n")?;
    write_file(temp.path(), "README.md", b"# sample\n")?;
    commit_all(&repo, "initial import")?;
    Ok((temp, repo))
}

fn ingestor_with_store(worktrees: &Path) -> (ProjectIngestor, Arc<MemoryProjectStore>) {
    let store = Arc::new(MemoryProjectStore::new());
    // The local file transport does not negotiate shallow fetches, so the
    // tests run with depth disabled.
    let config = GitAccessorConfig {
        clone_depth: None,
        ..GitAccessorConfig::new(worktrees)
    };
    let accessor = Arc::new(GitAccessor::new(config));
    (ProjectIngestor::new(store.clone(), accessor), store)
}

#[tokio::test]
async fn test_remote_lifecycle_created_unchanged_updates_applied() -> Result<()> {
    let (origin_dir, origin) = sample_repository()?;
    let worktrees = TempDir::new()?;
    let (ingestor, store) = ingestor_with_store(worktrees.path());

    let remote_url = Url::from_file_path(origin_dir.path().canonicalize()?)
        .expect("absolute path converts to URL")
        .to_string();
    let options = || ProjectOptions {
        name: Some("lifecycle-demo".to_string()),
        ..ProjectOptions::default()
    };

    // Fresh project: full pass over the clone.
    let created = ingestor
        .create_project_from_repo(&remote_url, options())
        .await?;
    assert_eq!(created.status, ProjectStatus::Created);
    assert_eq!(created.files_ingested, 3);
    assert_eq!(created.files_skipped, 0);
    assert!(created.previous_identifier.is_none());
    let s1 = created.new_identifier.clone().expect("identifier set");

    // Stored documents are keyed by full relative path and carry the header.
    let project = ProjectId::new("lifecycle-demo");
    let doc = store
        .get_document(&project, "src/lib.rs")
        .await?
        .expect("document stored");
    assert!(doc.starts_with("src/lib.rs\n0001 pub fn answer"));

    // Immediate repeat: unchanged, zero parses and writes.
    let unchanged = ingestor
        .create_project_from_repo(&remote_url, options())
        .await?;
    assert_eq!(unchanged.status, ProjectStatus::Unchanged);
    assert_eq!(unchanged.previous_identifier.as_deref(), Some(s1.as_str()));
    assert_eq!(unchanged.new_identifier.as_deref(), Some(s1.as_str()));
    assert_eq!(unchanged.files_ingested + unchanged.files_skipped, 0);

    // Remote advances.
    write_file(origin_dir.path(), "src/extra.rs", b"pub fn extra() {}\n")?;
    let s2 = commit_all(&origin, "add extra module")?;

    // Probe: updates detected, nothing applied yet.
    let probe = ingestor
        .create_project_from_repo(
            &remote_url,
            ProjectOptions {
                probe_only: true,
                ..options()
            },
        )
        .await?;
    assert_eq!(probe.status, ProjectStatus::UpdatesAvailable);
    assert_eq!(probe.previous_identifier.as_deref(), Some(s1.as_str()));
    assert_eq!(probe.new_identifier.as_deref(), Some(s2.as_str()));
    let pending = probe.pending_update().expect("pending update bound").clone();
    assert_eq!(pending.new_identifier, s2);

    // Probing left the stored record alone.
    let record = store.get_record(&project).await?.expect("record exists");
    assert_eq!(record.last_ingested_identifier.as_deref(), Some(s1.as_str()));

    // Apply the bound continuation: pull + full pass.
    let applied = probe.apply_updates().await?;
    assert_eq!(applied.status, ProjectStatus::Applied);
    assert_eq!(applied.new_identifier.as_deref(), Some(s2.as_str()));
    assert_eq!(applied.files_ingested, 4);
    assert!(store
        .get_document(&project, "src/extra.rs")
        .await?
        .is_some());

    // Subsequent call: unchanged again.
    let settled = ingestor
        .create_project_from_repo(&remote_url, options())
        .await?;
    assert_eq!(settled.status, ProjectStatus::Unchanged);
    assert_eq!(settled.new_identifier.as_deref(), Some(s2.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_local_repository_lifecycle() -> Result<()> {
    let (origin_dir, origin) = sample_repository()?;
    let worktrees = TempDir::new()?;
    let (ingestor, _store) = ingestor_with_store(worktrees.path());

    let location = origin_dir.path().to_str().unwrap().to_string();
    let options = || ProjectOptions {
        name: Some("local-demo".to_string()),
        ..ProjectOptions::default()
    };

    let created = ingestor.create_project_from_repo(&location, options()).await?;
    assert_eq!(created.status, ProjectStatus::Created);
    assert_eq!(created.files_ingested, 3);

    let unchanged = ingestor.create_project_from_repo(&location, options()).await?;
    assert_eq!(unchanged.status, ProjectStatus::Unchanged);

    write_file(origin_dir.path(), "CHANGELOG.md", b"## v0.2\n")?;
    commit_all(&origin, "changelog")?;

    let applied = ingestor.create_project_from_repo(&location, options()).await?;
    assert_eq!(applied.status, ProjectStatus::Applied);
    assert_eq!(applied.files_ingested, 4);
    Ok(())
}

#[tokio::test]
async fn test_conservation_and_per_file_skips() -> Result<()> {
    let temp = TempDir::new()?;
    let repo = Repository::init(temp.path())?;
    write_file(temp.path(), "src/lib.rs", b"pub fn x() {}\n")?;
    write_file(temp.path(), "empty.rs", b"")?;
    write_file(temp.path(), "assets/logo.bin", b"\x00\x01\x02\x03binary")?;
    commit_all(&repo, "mixed content")?;

    let worktrees = TempDir::new()?;
    let (ingestor, store) = ingestor_with_store(worktrees.path());
    let result = ingestor
        .create_project_from_repo(
            temp.path().to_str().unwrap(),
            ProjectOptions {
                name: Some("mixed".to_string()),
                ..ProjectOptions::default()
            },
        )
        .await?;

    assert_eq!(result.status, ProjectStatus::Created);
    // Conservation: every tracked file is either ingested or skipped.
    assert_eq!(result.files_ingested + result.files_skipped, 3);
    assert_eq!(result.files_skipped, 1);
    assert_eq!(result.warnings.len(), 1);
    assert_eq!(result.warnings[0].path, "assets/logo.bin");
    assert_eq!(result.warnings[0].reason, SkipReason::Binary);

    let project = ProjectId::new("mixed");
    // The binary file never crossed into the store.
    assert!(store
        .get_document(&project, "assets/logo.bin")
        .await?
        .is_none());
    // The empty file is ingested as a header-only document.
    assert_eq!(
        store.get_document(&project, "empty.rs").await?,
        Some("empty.rs\n".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn test_subdirectory_filter_limits_stored_documents() -> Result<()> {
    let (origin_dir, _origin) = sample_repository()?;
    let worktrees = TempDir::new()?;
    let (ingestor, store) = ingestor_with_store(worktrees.path());

    let result = ingestor
        .create_project_from_repo(
            origin_dir.path().to_str().unwrap(),
            ProjectOptions {
                name: Some("filtered".to_string()),
                subdirectory: Some("src/app".to_string()),
                ..ProjectOptions::default()
            },
        )
        .await?;

    assert_eq!(result.status, ProjectStatus::Created);
    assert_eq!(result.files_ingested, 1);

    let project = ProjectId::new("filtered");
    let documents = store.list_documents(&project).await?;
    assert_eq!(documents, vec!["src/app/main.rs"]);
    assert!(documents.iter().all(|p| p.starts_with("src/app/")));
    Ok(())
}

#[tokio::test]
async fn test_invalid_source_aborts_with_typed_error() -> Result<()> {
    let worktrees = TempDir::new()?;
    let (ingestor, _store) = ingestor_with_store(worktrees.path());

    let err = ingestor
        .create_project_from_repo("::definitely-not-a-source::", ProjectOptions::default())
        .await
        .unwrap_err();
    let ingest_err = err
        .downcast_ref::<repolens::IngestError>()
        .expect("typed ingest error");
    assert!(matches!(
        ingest_err,
        repolens::IngestError::InvalidSource { .. }
    ));
    Ok(())
}
