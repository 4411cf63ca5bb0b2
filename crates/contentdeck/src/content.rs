//! GitHub contents API access.
//!
//! [`ContentClient`] is the only code that knows the wire format of the
//! contents API. The item, article and media stores are built on it.

mod client;
mod error;
mod types;

pub use client::{ContentClient, delete_message, update_message};
pub use error::{ContentError, Result};
pub use types::{
    CommitResult, DEFAULT_BRANCH, DEFAULT_OWNER, DEFAULT_REPO, DirEntry, EntryKind, RepoConfig,
    RepoFile, Repository,
};
