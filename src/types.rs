//! Source references, host classification, and credential types
//!
//! These types cannot be constructed with invalid data: a `SourceReference`
//! only exists for a location that resolved to a local directory or a
//! parseable remote, and a `ProjectId` is always a sanitized, non-empty
//! identifier safe for filesystem use.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::IngestError;

/// Whether a source points at a directory on disk or a remote to clone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    Local,
    Remote,
}

/// Recognized remote hosts. Unrecognized hosts fall back to `Other`, which
/// only authenticates through the system git credential machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteHost {
    GitHub,
    GitLab,
    Bitbucket,
    Other,
}

impl RemoteHost {
    pub fn classify(hostname: &str) -> Self {
        match hostname.to_ascii_lowercase().as_str() {
            "github.com" => Self::GitHub,
            "gitlab.com" => Self::GitLab,
            "bitbucket.org" => Self::Bitbucket,
            _ => Self::Other,
        }
    }

    /// Environment variable consulted when no explicit token is given.
    pub fn env_token_var(&self) -> Option<&'static str> {
        match self {
            Self::GitHub => Some("GITHUB_TOKEN"),
            Self::GitLab => Some("GITLAB_TOKEN"),
            Self::Bitbucket => Some("BITBUCKET_TOKEN"),
            Self::Other => None,
        }
    }

    /// Username each host expects alongside a token over HTTPS.
    pub fn token_username(&self) -> &'static str {
        match self {
            Self::GitHub => "x-access-token",
            Self::GitLab => "oauth2",
            Self::Bitbucket => "x-token-auth",
            Self::Other => "git",
        }
    }
}

impl fmt::Display for RemoteHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::GitHub => "github.com",
            Self::GitLab => "gitlab.com",
            Self::Bitbucket => "bitbucket.org",
            Self::Other => "remote",
        };
        write!(f, "{}", name)
    }
}

/// A resolved source location. Immutable, constructed per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    pub kind: SourceKind,
    pub location: String,
    pub host: Option<RemoteHost>,
    pub subdirectory_filter: Option<String>,
}

impl SourceReference {
    /// Resolve a location string. An existing local directory wins over URL
    /// interpretation; scp-like `git@host:path` remotes are accepted too.
    pub fn parse(
        location: &str,
        subdirectory_filter: Option<String>,
    ) -> Result<Self, IngestError> {
        let subdirectory_filter = subdirectory_filter
            .map(|s| s.replace('\\', "/").trim_matches('/').to_string())
            .filter(|s| !s.is_empty());

        if Path::new(location).is_dir() {
            return Ok(Self {
                kind: SourceKind::Local,
                location: location.to_string(),
                host: None,
                subdirectory_filter,
            });
        }

        if let Ok(url) = Url::parse(location) {
            if matches!(url.scheme(), "http" | "https" | "ssh" | "git" | "file") {
                let host = url
                    .host_str()
                    .map(RemoteHost::classify)
                    .unwrap_or(RemoteHost::Other);
                return Ok(Self {
                    kind: SourceKind::Remote,
                    location: location.to_string(),
                    host: Some(host),
                    subdirectory_filter,
                });
            }
        }

        if let Some(rest) = location.strip_prefix("git@") {
            if let Some((host, path)) = rest.split_once(':') {
                if !host.is_empty() && !path.is_empty() {
                    return Ok(Self {
                        kind: SourceKind::Remote,
                        location: location.to_string(),
                        host: Some(RemoteHost::classify(host)),
                        subdirectory_filter,
                    });
                }
            }
        }

        Err(IngestError::InvalidSource {
            location: location.to_string(),
            reason: "neither an existing local directory nor a parseable remote URL".to_string(),
        })
    }

    /// Repository name inferred from the location, used when the caller
    /// supplies no project name.
    pub fn inferred_name(&self) -> String {
        if self.kind == SourceKind::Local {
            return Path::new(&self.location)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("repository")
                .to_string();
        }

        if let Ok(parsed) = Url::parse(&self.location) {
            if let Some(segment) = parsed
                .path()
                .trim_matches('/')
                .split('/')
                .filter(|seg| !seg.is_empty())
                .next_back()
            {
                return segment.trim_end_matches(".git").to_string();
            }
        }

        if let Some(stripped) = self.location.strip_prefix("git@") {
            if let Some((_, path)) = stripped.split_once(':') {
                if let Some(segment) = path
                    .trim_matches('/')
                    .split('/')
                    .filter(|seg| !seg.is_empty())
                    .next_back()
                {
                    return segment.trim_end_matches(".git").to_string();
                }
            }
        }

        "repository".to_string()
    }
}

/// Sanitized identifier keying the persistent working tree and the stored
/// project record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    pub fn new(name: &str) -> Self {
        let sanitized = name
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '-'
                }
            })
            .collect::<String>()
            .trim_matches('-')
            .to_lowercase();

        // A dot-only name is a relative path component; as a directory name
        // under the workspaces root it would escape or alias the root itself.
        if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
            Self("repository".to_string())
        } else {
            Self(sanitized)
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a resolved credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Explicit,
    EnvByHost,
    SystemGit,
}

/// A lazily resolved credential. Never serialized; `Debug` redacts the token
/// so it cannot leak through logging.
#[derive(Clone)]
pub struct AuthCredential {
    pub token: Option<String>,
    pub source: CredentialSource,
}

impl fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCredential")
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("source", &self.source)
            .finish()
    }
}
