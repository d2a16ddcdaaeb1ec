//! Project lifecycle orchestration
//!
//! `create_project_from_repo` compares stored and fresh repository
//! identifiers, drives the parse-and-store pass, and manages the
//! create/probe/apply update lifecycle. A single file's failure becomes a
//! warning and never aborts the pass; the stored identifier advances only
//! after every tracked file has been attempted.

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::errors::SkipReason;
use crate::git::{resolve_credential, GitAccessor, RepoIngester, RepoSnapshot};
use crate::parsing::{CodeParser, ParseOptions};
use crate::store::{ProjectRecord, ProjectStore};
use crate::types::{AuthCredential, ProjectId, SourceKind, SourceReference};

/// Terminal status of one orchestrator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectStatus {
    /// New project, first full pass completed.
    Created,
    /// Existing project, pending update pulled and re-ingested.
    Applied,
    /// Fresh identifier equals the stored one; nothing touched.
    Unchanged,
    /// A newer identifier exists; apply was deferred to the caller.
    UpdatesAvailable,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Applied => "applied",
            Self::Unchanged => "unchanged",
            Self::UpdatesAvailable => "updates available",
        };
        write!(f, "{}", name)
    }
}

/// One skipped or failed file, with the reason it did not make it in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestWarning {
    pub path: String,
    pub reason: SkipReason,
}

/// Everything needed to apply a pending update later. Plain serializable
/// data rather than captured closure state, so a caller on the other side
/// of a process boundary can reconstruct and apply it. Credentials are
/// deliberately not part of it; they are re-resolved at apply time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub project_id: ProjectId,
    pub previous_identifier: Option<String>,
    pub new_identifier: String,
    pub location: String,
    pub subdirectory_filter: Option<String>,
}

/// Caller-facing options for one orchestrator call.
#[derive(Debug, Clone, Default)]
pub struct ProjectOptions {
    /// Project name; inferred from the location when absent.
    pub name: Option<String>,
    /// Explicit token, taking precedence over environment and system git.
    pub token: Option<String>,
    /// Restrict ingestion to paths under this prefix.
    pub subdirectory: Option<String>,
    /// Report `UpdatesAvailable` instead of applying a detected update.
    pub probe_only: bool,
}

/// Immutable report of one orchestrator call, plus the bound continuation
/// for applying a pending update.
pub struct RepoProjectResult {
    pub status: ProjectStatus,
    pub files_ingested: usize,
    pub files_skipped: usize,
    pub warnings: Vec<IngestWarning>,
    pub previous_identifier: Option<String>,
    pub new_identifier: Option<String>,
    binding: Option<(ProjectIngestor, PendingUpdate, AuthCredential)>,
}

impl fmt::Debug for RepoProjectResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoProjectResult")
            .field("status", &self.status)
            .field("files_ingested", &self.files_ingested)
            .field("files_skipped", &self.files_skipped)
            .field("warnings", &self.warnings)
            .field("previous_identifier", &self.previous_identifier)
            .field("new_identifier", &self.new_identifier)
            .field("pending", &self.binding.as_ref().map(|(_, p, _)| p))
            .finish()
    }
}

impl RepoProjectResult {
    fn unchanged(identifier: String) -> Self {
        Self {
            status: ProjectStatus::Unchanged,
            files_ingested: 0,
            files_skipped: 0,
            warnings: Vec::new(),
            previous_identifier: Some(identifier.clone()),
            new_identifier: Some(identifier),
            binding: None,
        }
    }

    /// The pending update, when `status == UpdatesAvailable`.
    pub fn pending_update(&self) -> Option<&PendingUpdate> {
        self.binding.as_ref().map(|(_, pending, _)| pending)
    }

    /// Apply the pending update: pull the working tree to the new identifier
    /// and run the full pass. Consumes the result; yields a fresh one.
    pub async fn apply_updates(self) -> Result<RepoProjectResult> {
        let (ingestor, pending, credential) = self
            .binding
            .ok_or_else(|| anyhow!("no pending update to apply"))?;
        ingestor.apply_pending(&pending, &credential).await
    }
}

/// Per-file outcome of the parse-and-store pass.
enum FileOutcome {
    Stored,
    Skipped(SkipReason),
    Failed(SkipReason),
}

/// Orchestrates GitAccessor, CodeParser, and the project store.
#[derive(Clone)]
pub struct ProjectIngestor {
    store: Arc<dyn ProjectStore>,
    accessor: Arc<GitAccessor>,
    parser: Arc<CodeParser>,
}

impl ProjectIngestor {
    pub fn new(store: Arc<dyn ProjectStore>, accessor: Arc<GitAccessor>) -> Self {
        Self {
            store,
            accessor,
            parser: Arc::new(CodeParser::new(ParseOptions::ingestion())),
        }
    }

    /// Create a project from a repository, or detect/apply updates to an
    /// existing one. Exactly one terminal status per call.
    #[instrument(skip(self, options), fields(location = %location))]
    pub async fn create_project_from_repo(
        &self,
        location: &str,
        options: ProjectOptions,
    ) -> Result<RepoProjectResult> {
        let source = SourceReference::parse(location, options.subdirectory.clone())?;
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| source.inferred_name());
        let project_id = ProjectId::new(&name);
        let credential = resolve_credential(options.token.as_deref(), source.host);

        let existing = self.store.get_record(&project_id).await?;
        let Some(record) = existing else {
            info!(project = %project_id, "Creating project from repository");
            let snapshot = RepoIngester::new(&self.accessor)
                .resolve(&source, &credential, &project_id)
                .await?;
            return self
                .full_pass(&project_id, &source, &snapshot, None, ProjectStatus::Created)
                .await;
        };

        let fresh = self
            .fresh_identifier(&source, &credential, &project_id)
            .await?;
        let previous = record.last_ingested_identifier.clone();

        if previous.as_deref() == Some(fresh.as_str()) {
            info!(project = %project_id, identifier = %fresh, "Repository unchanged");
            return Ok(RepoProjectResult::unchanged(fresh));
        }

        let pending = PendingUpdate {
            project_id: project_id.clone(),
            previous_identifier: previous.clone(),
            new_identifier: fresh.clone(),
            location: source.location.clone(),
            subdirectory_filter: source.subdirectory_filter.clone(),
        };

        if options.probe_only {
            info!(
                project = %project_id,
                previous = previous.as_deref().unwrap_or("none"),
                new = %fresh,
                "Updates available"
            );
            return Ok(RepoProjectResult {
                status: ProjectStatus::UpdatesAvailable,
                files_ingested: 0,
                files_skipped: 0,
                warnings: Vec::new(),
                previous_identifier: previous,
                new_identifier: Some(fresh),
                binding: Some((self.clone(), pending, credential)),
            });
        }

        self.apply_pending(&pending, &credential).await
    }

    /// Apply a pending update reconstructed from plain data, resolving the
    /// credential from the environment or system git.
    pub async fn apply_updates(&self, pending: &PendingUpdate) -> Result<RepoProjectResult> {
        let source =
            SourceReference::parse(&pending.location, pending.subdirectory_filter.clone())?;
        let credential = resolve_credential(None, source.host);
        self.apply_pending(pending, &credential).await
    }

    async fn apply_pending(
        &self,
        pending: &PendingUpdate,
        credential: &AuthCredential,
    ) -> Result<RepoProjectResult> {
        let source =
            SourceReference::parse(&pending.location, pending.subdirectory_filter.clone())?;

        let snapshot = match source.kind {
            SourceKind::Local => {
                RepoIngester::new(&self.accessor)
                    .resolve(&source, credential, &pending.project_id)
                    .await?
            }
            SourceKind::Remote => {
                self.accessor
                    .apply_remote(&source, credential, &pending.project_id)
                    .await?
            }
        };

        self.full_pass(
            &pending.project_id,
            &source,
            &snapshot,
            pending.previous_identifier.clone(),
            ProjectStatus::Applied,
        )
        .await
    }

    /// The fresh identifier for change detection. Locals re-resolve in
    /// place; remotes fetch without mutating the working tree.
    async fn fresh_identifier(
        &self,
        source: &SourceReference,
        credential: &AuthCredential,
        project_id: &ProjectId,
    ) -> Result<String> {
        let identifier = match source.kind {
            SourceKind::Local => {
                RepoIngester::new(&self.accessor)
                    .resolve(source, credential, project_id)
                    .await?
                    .head_identifier
            }
            SourceKind::Remote => {
                self.accessor
                    .probe_remote(source, credential, project_id)
                    .await?
            }
        };
        Ok(identifier)
    }

    /// Parse and store every tracked file, then commit the new identifier.
    async fn full_pass(
        &self,
        project_id: &ProjectId,
        source: &SourceReference,
        snapshot: &RepoSnapshot,
        previous_identifier: Option<String>,
        status: ProjectStatus,
    ) -> Result<RepoProjectResult> {
        let ingester = RepoIngester::new(&self.accessor);
        let mut files_ingested = 0usize;
        let mut files_skipped = 0usize;
        let mut warnings = Vec::new();

        for relative_path in &snapshot.tracked_files {
            match self.ingest_one(&ingester, project_id, snapshot, relative_path).await {
                FileOutcome::Stored => files_ingested += 1,
                FileOutcome::Skipped(reason) | FileOutcome::Failed(reason) => {
                    warn!(project = %project_id, path = %relative_path, "Skipping file: {}", reason);
                    files_skipped += 1;
                    warnings.push(IngestWarning {
                        path: relative_path.clone(),
                        reason,
                    });
                }
            }
        }

        // Commit the identifier only after every tracked file was attempted,
        // so a crash mid-pass re-detects UpdatesAvailable on the next call.
        self.store
            .put_record(&ProjectRecord {
                project_id: project_id.clone(),
                last_ingested_identifier: Some(snapshot.head_identifier.clone()),
                root_reference: source.location.clone(),
                updated_at: Utc::now(),
            })
            .await?;

        info!(
            project = %project_id,
            status = %status,
            ingested = files_ingested,
            skipped = files_skipped,
            identifier = %snapshot.head_identifier,
            "Ingestion pass complete"
        );

        Ok(RepoProjectResult {
            status,
            files_ingested,
            files_skipped,
            warnings,
            previous_identifier,
            new_identifier: Some(snapshot.head_identifier.clone()),
            binding: None,
        })
    }

    async fn ingest_one(
        &self,
        ingester: &RepoIngester<'_>,
        project_id: &ProjectId,
        snapshot: &RepoSnapshot,
        relative_path: &str,
    ) -> FileOutcome {
        let entry = match ingester.read_entry(snapshot, relative_path).await {
            Ok(entry) => entry,
            Err(reason) => return FileOutcome::Skipped(reason),
        };

        let parsed = self.parser.parse(&entry.bytes, relative_path);
        if let Some(reason) = parsed.skipped {
            return FileOutcome::Skipped(reason);
        }

        match self
            .store
            .put_document(project_id, relative_path, &parsed.formatted_content)
            .await
        {
            Ok(()) => FileOutcome::Stored,
            Err(err) => FileOutcome::Failed(SkipReason::StoreFailure(err.to_string())),
        }
    }
}
