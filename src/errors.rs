//! Error taxonomy for repository ingestion
//!
//! Three failure classes abort a whole call: the source string is
//! unrecognizable, the remote refuses our credentials, or the transport
//! itself breaks. Everything that can go wrong with a single file is a
//! [`SkipReason`] instead, recorded as a warning while the pass continues.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures that abort an ingestion call outright.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The location string is neither an existing local directory nor a
    /// parseable remote URL.
    #[error("invalid source '{location}': {reason}")]
    InvalidSource { location: String, reason: String },

    /// The remote requires credentials and none were resolved or accepted.
    #[error("authentication failed for {host}: no credential resolved or accepted")]
    Authentication { host: String },

    /// Any other transport or process failure while accessing the repository.
    #[error("repository access failed: {message}")]
    RepoIngest {
        message: String,
        #[source]
        source: Option<git2::Error>,
    },
}

impl IngestError {
    pub(crate) fn repo(message: impl Into<String>) -> Self {
        Self::RepoIngest {
            message: message.into(),
            source: None,
        }
    }

    /// Map a git2 failure, distinguishing the transport's permission-denied
    /// signal from everything else.
    pub(crate) fn from_git(host: &str, operation: &str, err: git2::Error) -> Self {
        let denied = err.code() == git2::ErrorCode::Auth
            || (err.class() == git2::ErrorClass::Http
                && (err.message().contains("401") || err.message().contains("403")));
        if denied {
            Self::Authentication {
                host: host.to_string(),
            }
        } else {
            Self::RepoIngest {
                message: format!("{} failed: {}", operation, err.message()),
                source: Some(err),
            }
        }
    }
}

/// Per-file skip reasons. Non-fatal: each becomes a warning entry and the
/// ingestion pass continues over the remaining files.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SkipReason {
    #[error("binary content")]
    Binary,
    #[error("undecodable content")]
    EncodingError,
    #[error("read failed: {0}")]
    ReadFailure(String),
    #[error("store failed: {0}")]
    StoreFailure(String),
}
