use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;

use super::error::{ContentError, Result};
use super::types::{
    CommitResult, ContentsFile, DirEntry, EntryKind, RepoConfig, RepoFile, Repository,
    WriteResponse,
};
use crate::http::HttpMethod;
use crate::lock::{LockError, RemoteShaSource};
use crate::queue::{RequestOptions, RequestQueue, short_error_message};

/// Commit message for a create or update.
pub fn update_message(path: &str) -> String {
    format!("Update {path}")
}

/// Commit message for a delete.
pub fn delete_message(path: &str) -> String {
    format!("Delete {path}")
}

/// Typed access to the GitHub contents API of one repository.
///
/// All calls go through the shared [`RequestQueue`].
#[derive(Clone)]
pub struct ContentClient {
    queue: RequestQueue,
    repo: RepoConfig,
}

impl ContentClient {
    pub fn new(queue: RequestQueue, repo: RepoConfig) -> Self {
        Self { queue, repo }
    }

    pub fn repo(&self) -> &RepoConfig {
        &self.repo
    }

    pub fn queue(&self) -> &RequestQueue {
        &self.queue
    }

    /// Repository metadata.
    pub async fn repository(&self) -> Result<Repository> {
        let endpoint = format!("/repos/{}", self.repo.full_name());
        let response = self
            .queue
            .request(endpoint, RequestOptions::get())
            .await
            .map_err(|e| ContentError::from_api(e, &self.repo.full_name()))?;
        response
            .json()
            .map_err(|e| ContentError::decode(&self.repo.full_name(), e))
    }

    /// List a directory.
    pub async fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>> {
        let response = self
            .queue
            .request(self.read_endpoint(path), RequestOptions::get())
            .await
            .map_err(|e| ContentError::from_api(e, path))?;
        response.json().map_err(|e| ContentError::decode(path, e))
    }

    /// Read a file and decode its content.
    pub async fn get_file(&self, path: &str) -> Result<RepoFile> {
        let response = self
            .queue
            .request(self.read_endpoint(path), RequestOptions::get())
            .await
            .map_err(|e| ContentError::from_api(e, path))?;
        let file: ContentsFile = response
            .json()
            .map_err(|e| ContentError::decode(path, e))?;

        if file.kind != EntryKind::File {
            return Err(ContentError::decode(path, "not a file"));
        }
        if let Some(encoding) = file.encoding.as_deref()
            && encoding != "base64"
        {
            return Err(ContentError::decode(
                path,
                format!("unsupported encoding {encoding}"),
            ));
        }

        let content = decode_content(file.content.as_deref().unwrap_or_default())
            .map_err(|e| ContentError::decode(path, e))?;

        Ok(RepoFile {
            path: file.path,
            sha: file.sha,
            content,
        })
    }

    /// Create or update a file. `sha` must be the current blob sha when the
    /// file exists; a stale sha is rejected as a conflict.
    pub async fn put_file(
        &self,
        path: &str,
        content: &[u8],
        sha: Option<&str>,
        message: &str,
    ) -> Result<CommitResult> {
        let mut body = json!({
            "message": message,
            "content": STANDARD.encode(content),
            "branch": self.repo.branch,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }

        tracing::debug!(path, update = sha.is_some(), bytes = content.len(), "Writing file");
        let response = self
            .queue
            .request(
                self.write_endpoint(path),
                RequestOptions::json(HttpMethod::Put, &body),
            )
            .await
            .map_err(|e| ContentError::from_api(e, path))?;
        let written: WriteResponse = response
            .json()
            .map_err(|e| ContentError::decode(path, e))?;

        Ok(CommitResult {
            path: path.to_string(),
            sha: written.content.map(|c| c.sha),
            commit_sha: written.commit.map(|c| c.sha),
        })
    }

    /// Delete a file at its current `sha`.
    pub async fn delete_file(&self, path: &str, sha: &str, message: &str) -> Result<CommitResult> {
        let body = json!({
            "message": message,
            "sha": sha,
            "branch": self.repo.branch,
        });

        tracing::debug!(path, "Deleting file");
        let response = self
            .queue
            .request(
                self.write_endpoint(path),
                RequestOptions::json(HttpMethod::Delete, &body),
            )
            .await
            .map_err(|e| ContentError::from_api(e, path))?;
        let written: WriteResponse = response
            .json()
            .map_err(|e| ContentError::decode(path, e))?;

        Ok(CommitResult {
            path: path.to_string(),
            sha: None,
            commit_sha: written.commit.map(|c| c.sha),
        })
    }

    fn write_endpoint(&self, path: &str) -> String {
        format!(
            "/repos/{}/contents/{}",
            self.repo.full_name(),
            path.trim_start_matches('/')
        )
    }

    fn read_endpoint(&self, path: &str) -> String {
        format!("{}?ref={}", self.write_endpoint(path), self.repo.branch)
    }
}

/// Decode contents API base64, which is wrapped with embedded newlines.
fn decode_content(encoded: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD.decode(compact)
}

#[async_trait]
impl RemoteShaSource for ContentClient {
    async fn remote_sha(&self, resource_id: &str) -> std::result::Result<String, LockError> {
        self.get_file(resource_id)
            .await
            .map(|file| file.sha)
            .map_err(|e| LockError::Remote(short_error_message(&e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::auth::StaticToken;
    use crate::clock::SystemClock;
    use crate::http::{HttpResponse, MockTransport};
    use crate::queue::QueueConfig;

    const CONTENTS: &str = "https://api.github.com/repos/o/site/contents";

    fn client(transport: &MockTransport) -> ContentClient {
        let queue = RequestQueue::spawn(
            Arc::new(transport.clone()),
            Arc::new(StaticToken::new("ghp_test")),
            Arc::new(SystemClock),
            QueueConfig::default(),
        );
        ContentClient::new(queue, RepoConfig::new("o", "site", "main"))
    }

    #[tokio::test]
    async fn get_file_decodes_wrapped_base64() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            format!("{CONTENTS}/data/a.yml?ref=main"),
            200,
            json!({
                "type": "file",
                "path": "data/a.yml",
                "sha": "abc",
                "encoding": "base64",
                "content": "aWQ6IGEK\ndGl0bGU6\nIEEK\n"
            }),
        );

        let file = client(&transport).get_file("data/a.yml").await.expect("file");
        assert_eq!(file.sha, "abc");
        assert_eq!(file.text().unwrap(), "id: a\ntitle: A\n");
    }

    #[tokio::test]
    async fn get_file_rejects_directories() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            format!("{CONTENTS}/data?ref=main"),
            200,
            json!({"type": "dir", "path": "data", "sha": "d"}),
        );

        let err = client(&transport).get_file("data").await.expect_err("dir");
        assert!(matches!(err, ContentError::Decode { .. }));
    }

    #[tokio::test]
    async fn put_file_sends_base64_branch_and_sha() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Put,
            format!("{CONTENTS}/data/a.yml"),
            200,
            json!({"content": {"sha": "new"}, "commit": {"sha": "c1"}}),
        );

        let result = client(&transport)
            .put_file("data/a.yml", b"id: a\n", Some("old"), &update_message("data/a.yml"))
            .await
            .expect("written");
        assert_eq!(result.sha.as_deref(), Some("new"));
        assert_eq!(result.commit_sha.as_deref(), Some("c1"));

        let sent = &transport.requests()[0];
        let body: serde_json::Value = serde_json::from_slice(&sent.body).unwrap();
        assert_eq!(
            body,
            json!({
                "message": "Update data/a.yml",
                "content": "aWQ6IGEK",
                "branch": "main",
                "sha": "old"
            })
        );
    }

    #[tokio::test]
    async fn create_omits_sha() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Put,
            format!("{CONTENTS}/new.md"),
            201,
            json!({"content": {"sha": "s"}, "commit": {"sha": "c"}}),
        );

        client(&transport)
            .put_file("new.md", b"hi", None, "Update new.md")
            .await
            .expect("created");
        let body: serde_json::Value =
            serde_json::from_slice(&transport.requests()[0].body).unwrap();
        assert!(body.get("sha").is_none());
    }

    #[tokio::test]
    async fn stale_sha_is_a_conflict_and_missing_file_is_not_found() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Put,
            format!("{CONTENTS}/a.yml"),
            HttpResponse {
                status: 409,
                headers: Vec::new(),
                body: br#"{"message":"a.yml does not match abc"}"#.to_vec(),
            },
        );
        transport.push_json(
            HttpMethod::Delete,
            format!("{CONTENTS}/gone.yml"),
            404,
            json!({"message": "Not Found"}),
        );
        let client = client(&transport);

        let err = client
            .put_file("a.yml", b"x", Some("abc"), "Update a.yml")
            .await
            .expect_err("conflict");
        assert!(err.is_conflict());

        let err = client
            .delete_file("gone.yml", "s", &delete_message("gone.yml"))
            .await
            .expect_err("missing");
        assert!(err.is_not_found());
        let body: serde_json::Value =
            serde_json::from_slice(&transport.requests()[1].body).unwrap();
        assert_eq!(body["message"], "Delete gone.yml");
    }

    #[tokio::test]
    async fn remote_sha_reads_current_blob() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            format!("{CONTENTS}/a.yml?ref=main"),
            200,
            json!({"type": "file", "path": "a.yml", "sha": "cur", "encoding": "base64", "content": ""}),
        );
        transport.push_json(
            HttpMethod::Get,
            format!("{CONTENTS}/b.yml?ref=main"),
            404,
            json!({"message": "Not Found"}),
        );
        let client = client(&transport);

        assert_eq!(client.remote_sha("a.yml").await.unwrap(), "cur");
        assert!(matches!(
            client.remote_sha("b.yml").await,
            Err(LockError::Remote(_))
        ));
    }

    #[tokio::test]
    async fn list_directory_and_repository() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            format!("{CONTENTS}/content/article?ref=main"),
            200,
            json!([{"name": "a.md", "path": "content/article/a.md", "sha": "1", "size": 3, "type": "file"}]),
        );
        transport.push_json(
            HttpMethod::Get,
            "https://api.github.com/repos/o/site",
            200,
            json!({"full_name": "o/site", "default_branch": "main", "private": false}),
        );
        let client = client(&transport);

        let entries = client.list_directory("content/article").await.expect("list");
        assert_eq!(entries.len(), 1);
        assert!(entries[0].has_extension("md"));

        let repo = client.repository().await.expect("repo");
        assert_eq!(repo.full_name, "o/site");
        assert_eq!(repo.default_branch.as_deref(), Some("main"));
    }
}
