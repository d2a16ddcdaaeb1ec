//! Streams raw file entries out of a resolved working tree
//!
//! Files are read one at a time so large repositories never sit wholesale in
//! memory; each read failure is a per-file outcome, not an abort.

use tracing::warn;

use crate::errors::{IngestError, SkipReason};
use crate::git::accessor::{GitAccessor, RepoSnapshot};
use crate::types::{AuthCredential, ProjectId, SourceReference};

/// One tracked file's raw bytes, ready for classification.
#[derive(Debug, Clone)]
pub struct RawFileEntry {
    pub relative_path: String,
    pub bytes: Vec<u8>,
}

/// Drives the accessor and yields raw file entries for the parse pass.
pub struct RepoIngester<'a> {
    accessor: &'a GitAccessor,
}

impl<'a> RepoIngester<'a> {
    pub fn new(accessor: &'a GitAccessor) -> Self {
        Self { accessor }
    }

    /// Resolve the source into a snapshot of tracked files.
    pub async fn resolve(
        &self,
        source: &SourceReference,
        credential: &AuthCredential,
        project: &ProjectId,
    ) -> Result<RepoSnapshot, IngestError> {
        self.accessor.resolve(source, credential, project).await
    }

    /// Read one tracked file out of the working tree.
    pub async fn read_entry(
        &self,
        snapshot: &RepoSnapshot,
        relative_path: &str,
    ) -> Result<RawFileEntry, SkipReason> {
        let path = snapshot.working_tree.join(relative_path);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(RawFileEntry {
                relative_path: relative_path.to_string(),
                bytes,
            }),
            Err(err) => {
                warn!(path = %relative_path, "Failed to read tracked file: {}", err);
                Err(SkipReason::ReadFailure(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::accessor::GitAccessorConfig;
    use crate::types::CredentialSource;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_resolve_yields_snapshot_of_tracked_files() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let repo = git2::Repository::init(temp.path())?;
        std::fs::create_dir_all(temp.path().join("src"))?;
        std::fs::write(temp.path().join("src/lib.rs"), b"pub fn x() {}\n")?;
        let mut index = repo.index()?;
        index.add_path(std::path::Path::new("src/lib.rs"))?;
        index.write()?;
        let tree = repo.find_tree(index.write_tree()?)?;
        let signature = git2::Signature::now("Repolens Test", "test@repolens.dev")?;
        repo.commit(Some("HEAD"), &signature, &signature, "init", &tree, &[])?;

        let accessor = GitAccessor::new(GitAccessorConfig::new(temp.path().join("unused")));
        let ingester = RepoIngester::new(&accessor);
        let source = SourceReference::parse(temp.path().to_str().unwrap(), None)?;
        let credential = AuthCredential {
            token: None,
            source: CredentialSource::SystemGit,
        };

        let snapshot = ingester
            .resolve(&source, &credential, &ProjectId::new("demo"))
            .await?;
        assert_eq!(snapshot.tracked_files, vec!["src/lib.rs"]);
        assert!(!snapshot.head_identifier.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_read_entry_missing_file_is_a_skip() {
        let temp = tempfile::TempDir::new().unwrap();
        let accessor = GitAccessor::new(GitAccessorConfig::new(temp.path()));
        let ingester = RepoIngester::new(&accessor);
        let snapshot = RepoSnapshot {
            working_tree: PathBuf::from(temp.path()),
            head_identifier: "0".repeat(40),
            tracked_files: vec!["gone.rs".to_string()],
        };

        let err = ingester.read_entry(&snapshot, "gone.rs").await.unwrap_err();
        assert!(matches!(err, SkipReason::ReadFailure(_)));
    }

    #[tokio::test]
    async fn test_read_entry_returns_bytes() {
        let temp = tempfile::TempDir::new().unwrap();
        std::fs::write(temp.path().join("hello.txt"), b"hello\n").unwrap();
        let accessor = GitAccessor::new(GitAccessorConfig::new(temp.path()));
        let ingester = RepoIngester::new(&accessor);
        let snapshot = RepoSnapshot {
            working_tree: PathBuf::from(temp.path()),
            head_identifier: "0".repeat(40),
            tracked_files: vec!["hello.txt".to_string()],
        };

        let entry = ingester.read_entry(&snapshot, "hello.txt").await.unwrap();
        assert_eq!(entry.relative_path, "hello.txt");
        assert_eq!(entry.bytes, b"hello\n");
    }
}
