//! Git repository access for repolens
//!
//! This module resolves source locations to persistent working trees,
//! performs authenticated clone/fetch/reset operations, and streams tracked
//! files out for the parse pass.

pub mod accessor;
pub mod auth;
mod ingester;

pub use accessor::{GitAccessor, GitAccessorConfig, RepoSnapshot};
pub use auth::{authenticated_clone_url, resolve_credential};
pub use ingester::{RawFileEntry, RepoIngester};
