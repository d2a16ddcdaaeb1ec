// repolens - Repository ingestion for retrieval-augmented codebase querying
// Root library module

pub mod errors;
pub mod git;
pub mod observability;
pub mod parsing;
pub mod project;
pub mod store;
pub mod types;

// Re-export key types
pub use observability::{init_logging, init_logging_with_level};

pub use errors::{IngestError, SkipReason};

pub use types::{
    AuthCredential, CredentialSource, ProjectId, RemoteHost, SourceKind, SourceReference,
};

pub use git::{
    authenticated_clone_url, resolve_credential, GitAccessor, GitAccessorConfig, RawFileEntry,
    RepoIngester, RepoSnapshot,
};

pub use parsing::{CodeParser, ParseOptions, ParsedFile};

pub use store::{FileProjectStore, MemoryProjectStore, ProjectRecord, ProjectStore};

pub use project::{
    IngestWarning, PendingUpdate, ProjectIngestor, ProjectOptions, ProjectStatus,
    RepoProjectResult,
};
