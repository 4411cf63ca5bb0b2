use serde::{Deserialize, Serialize};

use super::error::ContentError;

/// Default repository owner.
pub const DEFAULT_OWNER: &str = "eventhorizon-mtg";

/// Default repository name.
pub const DEFAULT_REPO: &str = "eventhorizon-mtg.github.io";

/// Default branch content is committed to.
pub const DEFAULT_BRANCH: &str = "main";

/// The repository content lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub owner: String,
    pub name: String,
    pub branch: String,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            owner: DEFAULT_OWNER.to_string(),
            name: DEFAULT_REPO.to_string(),
            branch: DEFAULT_BRANCH.to_string(),
        }
    }
}

impl RepoConfig {
    pub fn new(
        owner: impl Into<String>,
        name: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            branch: branch.into(),
        }
    }

    /// `owner/name`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Repository metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub full_name: String,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub pushed_at: Option<String>,
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
    #[serde(other)]
    Other,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub path: String,
    pub sha: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Whether this is a file whose name ends with `.{ext}`.
    pub fn has_extension(&self, ext: &str) -> bool {
        self.is_file()
            && self
                .name
                .rsplit_once('.')
                .is_some_and(|(_, e)| e.eq_ignore_ascii_case(ext))
    }
}

/// A file read from the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoFile {
    pub path: String,
    pub sha: String,
    pub content: Vec<u8>,
}

impl RepoFile {
    /// The content as UTF-8.
    pub fn text(&self) -> Result<&str, ContentError> {
        std::str::from_utf8(&self.content).map_err(|e| ContentError::Decode {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}

/// Result of a create, update or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub path: String,
    /// Blob sha of the written file; `None` after a delete.
    pub sha: Option<String>,
    pub commit_sha: Option<String>,
}

// Wire shapes of the contents API.

#[derive(Debug, Deserialize)]
pub(crate) struct ContentsFile {
    pub path: String,
    pub sha: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WriteResponse {
    #[serde(default)]
    pub content: Option<WrittenContent>,
    #[serde(default)]
    pub commit: Option<WrittenCommit>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WrittenContent {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WrittenCommit {
    pub sha: String,
}
