//! Image uploads and the media index.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::content::{ContentClient, ContentError, Result, update_message};
use crate::queue::short_error_message;
use crate::storage::{self, SharedStorage};

/// Repository directory uploads are written to.
pub const UPLOADS_DIR: &str = "static/uploads";

/// Largest accepted upload.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Storage key of the cached media index.
pub const MEDIA_CACHE_KEY: &str = "media_cache";

/// Accepted upload content types.
pub const IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// A file to upload.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Original file name; its extension is kept.
    pub name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Upload {
    /// An upload whose content type is guessed from its name.
    pub fn from_name(name: impl Into<String>, data: Vec<u8>) -> Self {
        let name = name.into();
        Self {
            content_type: file_type(&name).to_string(),
            name,
            data,
        }
    }
}

/// An uploaded file as recorded in the media index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub path: String,
    /// Site-relative URL.
    pub url: String,
    pub sha: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Outcome of a batch upload.
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub uploaded: Vec<MediaFile>,
    /// `"{name}: {reason}"` for each file that failed.
    pub errors: Vec<String>,
}

/// Whether a file name has an image extension.
pub fn is_image(filename: &str) -> bool {
    extension(filename).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// Content type from a file name's extension.
pub fn file_type(filename: &str) -> &'static str {
    match extension(filename).map(str::to_lowercase).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Human-readable size: `512 B`, `1.5 KB`, `2.0 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    }
}

fn extension(filename: &str) -> Option<&str> {
    filename.rsplit_once('.').map(|(_, ext)| ext)
}

/// Check every upload; returns one message per rejected file.
pub fn validate_uploads(uploads: &[Upload]) -> Vec<String> {
    let mut errors = Vec::new();
    for upload in uploads {
        if !IMAGE_TYPES.contains(&upload.content_type.as_str()) {
            errors.push(format!("{}: unsupported file type", upload.name));
        } else if upload.data.len() > MAX_UPLOAD_BYTES {
            errors.push(format!("{}: file too large (max 5MB)", upload.name));
        }
    }
    errors
}

/// Uploads images and keeps an index of them in shared storage.
pub struct MediaLibrary {
    client: ContentClient,
    storage: Arc<dyn SharedStorage>,
    clock: Arc<dyn Clock>,
    cache: Mutex<BTreeMap<String, MediaFile>>,
}

impl MediaLibrary {
    /// Open the library, reading the cached index from storage.
    pub fn new(
        client: ContentClient,
        storage: Arc<dyn SharedStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cached: Vec<MediaFile> = match storage::read_json(storage.as_ref(), MEDIA_CACHE_KEY) {
            Ok(files) => files.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable media cache");
                Vec::new()
            }
        };
        let cache = cached.into_iter().map(|f| (f.path.clone(), f)).collect();

        Self {
            client,
            storage,
            clock,
            cache: Mutex::new(cache),
        }
    }

    /// Upload a batch of images.
    ///
    /// Every file is validated before anything is uploaded; any invalid file
    /// rejects the whole batch. Upload failures are per file and reported in
    /// [`UploadReport::errors`].
    pub async fn upload_files(&self, uploads: Vec<Upload>) -> Result<UploadReport> {
        let errors = validate_uploads(&uploads);
        if !errors.is_empty() {
            return Err(ContentError::Validation(errors));
        }

        let mut report = UploadReport::default();
        for upload in uploads {
            match self.upload_one(&upload).await {
                Ok(file) => report.uploaded.push(file),
                Err(e) => {
                    tracing::warn!(name = %upload.name, error = %e, "Upload failed");
                    report
                        .errors
                        .push(format!("{}: {}", upload.name, short_error_message(&e)));
                }
            }
        }

        self.save_cache();
        Ok(report)
    }

    async fn upload_one(&self, upload: &Upload) -> Result<MediaFile> {
        let path = self.upload_path(&upload.name);
        let written = self
            .client
            .put_file(&path, &upload.data, None, &update_message(&path))
            .await?;

        let file = MediaFile {
            url: format!("/{path}"),
            sha: written.sha.unwrap_or_default(),
            size: upload.data.len() as u64,
            content_type: upload.content_type.clone(),
            uploaded_at: self.clock.now(),
            path,
        };
        self.cache().insert(file.path.clone(), file.clone());
        tracing::info!(path = %file.path, size = file.size, "Uploaded media");
        Ok(file)
    }

    /// `static/uploads/{epoch_ms}-{9 random chars}.{ext}`
    fn upload_path(&self, name: &str) -> String {
        let suffix: String = uuid::Uuid::new_v4().simple().to_string().chars().take(9).collect();
        let ext = extension(name).unwrap_or(name);
        format!("{UPLOADS_DIR}/{}-{suffix}.{ext}", self.clock.now_ms())
    }

    /// Every known media file: the cached index merged with a fresh listing
    /// of the uploads directory.
    pub async fn list(&self) -> Result<Vec<MediaFile>> {
        let entries = match self.client.list_directory(UPLOADS_DIR).await {
            Ok(entries) => entries,
            Err(ContentError::NotFound { .. }) => Vec::new(),
            Err(e) => return Err(e),
        };

        {
            let now = self.clock.now();
            let mut cache = self.cache();
            for entry in entries.into_iter().filter(|e| e.is_file() && is_image(&e.name)) {
                cache.entry(entry.path.clone()).or_insert_with(|| MediaFile {
                    url: format!("/{}", entry.path),
                    sha: entry.sha,
                    size: entry.size,
                    content_type: file_type(&entry.name).to_string(),
                    uploaded_at: now,
                    path: entry.path,
                });
            }
        }

        self.save_cache();
        Ok(self.cached())
    }

    /// The cached index without contacting the remote.
    pub fn cached(&self) -> Vec<MediaFile> {
        self.cache().values().cloned().collect()
    }

    fn save_cache(&self) {
        let files = self.cached();
        if let Err(e) = storage::write_json(self.storage.as_ref(), MEDIA_CACHE_KEY, &files) {
            tracing::warn!(error = %e, "Failed to save media cache");
        }
    }

    fn cache(&self) -> MutexGuard<'_, BTreeMap<String, MediaFile>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}
