//! Markdown articles with YAML frontmatter.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

use regex::Regex;
use serde_yaml::{Mapping, Value};

use crate::content::{ContentClient, ContentError, Result, delete_message, update_message};
use crate::items::LoadReport;
use crate::lock::{EditLockCoordinator, LockMetadata};

/// Directory holding the articles.
pub const ARTICLES_DIR: &str = "content/article";

static FRONTMATTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^---\s*\n(.*?)\n---\s*\n(.*)$").unwrap());

/// A Markdown article.
#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    /// File name including `.md`.
    pub filename: String,
    pub path: String,
    pub sha: Option<String>,
    pub frontmatter: Mapping,
    pub body: String,
}

impl Article {
    pub fn title(&self) -> Option<&str> {
        self.frontmatter.get("title").and_then(Value::as_str)
    }

    /// Case-insensitive match over string frontmatter fields and the body.
    pub fn matches(&self, query: &str) -> bool {
        let needle = query.to_lowercase();
        self.frontmatter
            .values()
            .filter_map(Value::as_str)
            .any(|v| v.to_lowercase().contains(&needle))
            || self.body.to_lowercase().contains(&needle)
    }
}

/// Split a document into frontmatter and body.
///
/// A document without a frontmatter block, or whose frontmatter is not valid
/// YAML, yields an empty mapping and the whole text as body.
pub fn parse_frontmatter(text: &str) -> (Mapping, String) {
    let Some(captures) = FRONTMATTER.captures(text) else {
        return (Mapping::new(), text.to_string());
    };

    match serde_yaml::from_str::<Value>(&captures[1]) {
        Ok(Value::Mapping(map)) => (map, captures[2].to_string()),
        Ok(Value::Null) => (Mapping::new(), captures[2].to_string()),
        Ok(_) => {
            tracing::warn!("Frontmatter is not a mapping, ignoring it");
            (Mapping::new(), captures[2].to_string())
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse frontmatter");
            (Mapping::new(), text.to_string())
        }
    }
}

/// Render frontmatter and body back into a document.
pub fn render_document(
    frontmatter: &Mapping,
    body: &str,
) -> std::result::Result<String, serde_yaml::Error> {
    let yaml = serde_yaml::to_string(frontmatter)?;
    Ok(format!("---\n{yaml}---\n{body}"))
}

/// `name` with a `.md` suffix.
pub fn normalize_filename(name: &str) -> String {
    if name.ends_with(".md") {
        name.to_string()
    } else {
        format!("{name}.md")
    }
}

/// Cached view of the articles directory with locked, sha-checked writes.
pub struct ArticleStore {
    client: ContentClient,
    locks: Arc<EditLockCoordinator>,
    state: Mutex<Option<BTreeMap<String, Article>>>,
}

impl ArticleStore {
    pub fn new(client: ContentClient, locks: Arc<EditLockCoordinator>) -> Self {
        Self {
            client,
            locks,
            state: Mutex::new(None),
        }
    }

    /// Load every `.md` file in the articles directory, replacing the cache.
    pub async fn load(&self) -> Result<LoadReport> {
        let entries = match self.client.list_directory(ARTICLES_DIR).await {
            Ok(entries) => entries,
            Err(ContentError::NotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut articles = BTreeMap::new();
        let mut report = LoadReport::default();
        for entry in entries.iter().filter(|e| e.has_extension("md")) {
            let loaded = match self.client.get_file(&entry.path).await {
                Ok(file) => file.text().map(|text| {
                    let (frontmatter, body) = parse_frontmatter(text);
                    Article {
                        filename: entry.name.clone(),
                        path: file.path.clone(),
                        sha: Some(file.sha.clone()),
                        frontmatter,
                        body,
                    }
                }),
                Err(e) => Err(e),
            };
            match loaded {
                Ok(article) => {
                    articles.insert(article.filename.clone(), article);
                    report.loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(path = %entry.path, error = %e, "Failed to load article");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(loaded = report.loaded, failed = report.failed, "Articles loaded");
        *self.state() = Some(articles);
        Ok(report)
    }

    async fn ensure_loaded(&self) -> Result<()> {
        if self.state().is_none() {
            self.load().await?;
        }
        Ok(())
    }

    /// Create or update `content/article/{filename}`.
    pub async fn save(
        &self,
        filename: &str,
        frontmatter: Mapping,
        body: String,
        editor: LockMetadata,
    ) -> Result<Article> {
        self.ensure_loaded().await?;

        let filename = normalize_filename(filename);
        let path = format!("{ARTICLES_DIR}/{filename}");
        let document =
            render_document(&frontmatter, &body).map_err(|e| ContentError::decode(&path, e))?;
        let previous_sha = self.get(&filename).and_then(|a| a.sha);

        self.locks.start_edit(&path, editor)?;
        let written = async {
            if let Some(sha) = previous_sha.as_deref() {
                self.locks.validate_sha(&path, sha).await?;
            }
            self.client
                .put_file(
                    &path,
                    document.as_bytes(),
                    previous_sha.as_deref(),
                    &update_message(&path),
                )
                .await
        }
        .await;
        self.locks.complete_edit(&path);
        let written = written?;

        let article = Article {
            filename: filename.clone(),
            path,
            sha: written.sha,
            frontmatter,
            body,
        };
        self.state()
            .get_or_insert_with(BTreeMap::new)
            .insert(filename, article.clone());
        tracing::info!(filename = %article.filename, "Article saved");
        Ok(article)
    }

    pub async fn delete(&self, filename: &str, editor: LockMetadata) -> Result<()> {
        self.ensure_loaded().await?;

        let filename = normalize_filename(filename);
        let article = self.get(&filename).ok_or_else(|| ContentError::NotFound {
            path: format!("{ARTICLES_DIR}/{filename}"),
        })?;
        let sha = article.sha.clone().unwrap_or_default();

        self.locks.start_edit(&article.path, editor)?;
        let deleted = self
            .client
            .delete_file(&article.path, &sha, &delete_message(&article.path))
            .await;
        self.locks.complete_edit(&article.path);
        deleted?;

        if let Some(articles) = self.state().as_mut() {
            articles.remove(&filename);
        }
        tracing::info!(filename = %filename, "Article deleted");
        Ok(())
    }

    /// Cached article by file name; `.md` may be omitted.
    pub fn get(&self, filename: &str) -> Option<Article> {
        let filename = normalize_filename(filename);
        self.state().as_ref()?.get(&filename).cloned()
    }

    pub fn all(&self) -> Vec<Article> {
        self.state()
            .as_ref()
            .map(|a| a.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn search(&self, query: &str) -> Vec<Article> {
        self.all().into_iter().filter(|a| a.matches(query)).collect()
    }

    fn state(&self) -> MutexGuard<'_, Option<BTreeMap<String, Article>>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::json;

    use crate::auth::StaticToken;
    use crate::clock::SystemClock;
    use crate::content::RepoConfig;
    use crate::http::{HttpMethod, MockTransport};
    use crate::lock::EditLockConfig;
    use crate::queue::{QueueConfig, RequestQueue};
    use crate::storage::MemoryStorage;

    const CONTENTS: &str = "https://api.github.com/repos/o/site/contents";

    #[test]
    fn parses_frontmatter_and_body() {
        let (fm, body) =
            parse_frontmatter("---\ntitle: Hello\ntags: [a, b]\n---\n# Heading\n\nText\n");
        assert_eq!(fm.get("title").and_then(Value::as_str), Some("Hello"));
        assert_eq!(body, "# Heading\n\nText\n");
    }

    #[test]
    fn missing_or_broken_frontmatter_keeps_whole_text() {
        let plain = "just text\n";
        assert_eq!(parse_frontmatter(plain), (Mapping::new(), plain.to_string()));

        let broken = "---\ntitle: [unclosed\n---\nbody\n";
        assert_eq!(parse_frontmatter(broken), (Mapping::new(), broken.to_string()));

        let empty = "---\n\n---\nbody\n";
        assert_eq!(parse_frontmatter(empty), (Mapping::new(), "body\n".to_string()));
    }

    #[test]
    fn render_then_parse_preserves_fields() {
        let mut fm = Mapping::new();
        fm.insert("title".into(), "Round".into());
        fm.insert("draft".into(), true.into());

        let doc = render_document(&fm, "Body\n").expect("render");
        assert!(doc.starts_with("---\ntitle: Round\ndraft: true\n---\n"));
        assert_eq!(parse_frontmatter(&doc), (fm, "Body\n".to_string()));
    }

    #[test]
    fn filenames_get_md_suffix() {
        assert_eq!(normalize_filename("hello"), "hello.md");
        assert_eq!(normalize_filename("hello.md"), "hello.md");
    }

    fn store(transport: &MockTransport) -> ArticleStore {
        let queue = RequestQueue::spawn(
            Arc::new(transport.clone()),
            Arc::new(StaticToken::new("ghp_test")),
            Arc::new(SystemClock),
            QueueConfig::default(),
        );
        let client = ContentClient::new(queue, RepoConfig::new("o", "site", "main"));
        let locks = Arc::new(EditLockCoordinator::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(SystemClock),
            Arc::new(client.clone()),
            EditLockConfig::default(),
        ));
        ArticleStore::new(client, locks)
    }

    #[tokio::test]
    async fn missing_directory_loads_empty_then_creates() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            format!("{CONTENTS}/content/article?ref=main"),
            404,
            json!({"message": "Not Found"}),
        );
        transport.push_json(
            HttpMethod::Put,
            format!("{CONTENTS}/content/article/first.md"),
            201,
            json!({"content": {"sha": "a1"}, "commit": {"sha": "c1"}}),
        );
        let store = store(&transport);

        let mut fm = Mapping::new();
        fm.insert("title".into(), "First".into());
        let article = store
            .save("first", fm, "Hello\n".to_string(), LockMetadata::for_user("ada"))
            .await
            .expect("created");

        assert_eq!(article.path, "content/article/first.md");
        assert_eq!(store.get("first").unwrap().sha.as_deref(), Some("a1"));
        assert_eq!(store.search("hello").len(), 1);

        let put = transport.requests().pop().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&put.body).unwrap();
        assert!(body.get("sha").is_none());
        let content = STANDARD.decode(body["content"].as_str().unwrap()).unwrap();
        assert_eq!(String::from_utf8(content).unwrap(), "---\ntitle: First\n---\nHello\n");
    }

    #[tokio::test]
    async fn load_reads_markdown_files_only() {
        let transport = MockTransport::new();
        transport.push_json(
            HttpMethod::Get,
            format!("{CONTENTS}/content/article?ref=main"),
            200,
            json!([
                {"name": "a.md", "path": "content/article/a.md", "sha": "1", "type": "file"},
                {"name": "img", "path": "content/article/img", "sha": "2", "type": "dir"}
            ]),
        );
        transport.push_json(
            HttpMethod::Get,
            format!("{CONTENTS}/content/article/a.md?ref=main"),
            200,
            json!({"type": "file", "path": "content/article/a.md", "sha": "1", "encoding": "base64",
                   "content": STANDARD.encode("---\ntitle: A\n---\nbody")}),
        );
        let store = store(&transport);

        let report = store.load().await.expect("load");
        assert_eq!(report, LoadReport { loaded: 1, failed: 0 });
        assert_eq!(store.get("a.md").unwrap().title(), Some("A"));
        assert!(store.delete("zzz", LockMetadata::default()).await.unwrap_err().is_not_found());
    }
}
