//! Uploaded file storage
//!
//! In-memory store for files attached from the frontend. Contents are
//! lost on restart, like every other piece of service state. Uploads
//! are capped at 50MB and restricted to a known set of content types.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Upper bound on a single uploaded file (50MB)
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Accepted content types, grouped by category
const ALLOWED_TYPES: &[(&str, &[&str])] = &[
    (
        "image",
        &["image/jpeg", "image/png", "image/gif", "image/webp", "image/svg+xml"],
    ),
    (
        "video",
        &["video/mp4", "video/avi", "video/mov", "video/wmv", "video/flv"],
    ),
    ("audio", &["audio/mp3", "audio/wav", "audio/aac", "audio/ogg"]),
    (
        "document",
        &[
            "application/pdf",
            "application/msword",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "text/plain",
            "application/json",
            "text/csv",
            "application/vnd.ms-excel",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ],
    ),
];

/// Category name for an accepted content type
pub fn category_of(content_type: &str) -> Option<&'static str> {
    ALLOWED_TYPES
        .iter()
        .find(|(_, types)| types.contains(&content_type))
        .map(|(category, _)| *category)
}

pub fn is_allowed_type(content_type: &str) -> bool {
    category_of(content_type).is_some()
}

/// One stored upload
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: String,
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub uploaded_at: DateTime<Utc>,
}

/// Metadata shape returned by upload and listing
#[derive(Debug, Clone, Serialize)]
pub struct FileMetadata {
    pub id: String,
    pub filename: String,
    pub url: String,
    pub size: usize,
    #[serde(rename = "type")]
    pub content_type: String,
    pub category: String,
    pub uploaded_at: DateTime<Utc>,
}

impl From<&StoredFile> for FileMetadata {
    fn from(file: &StoredFile) -> Self {
        Self {
            id: file.id.clone(),
            filename: file.filename.clone(),
            url: format!("/api/files/{}", file.id),
            size: file.data.len(),
            content_type: file.content_type.clone(),
            category: category_of(&file.content_type).unwrap_or("unknown").to_string(),
            uploaded_at: file.uploaded_at,
        }
    }
}

/// In-memory upload table
#[derive(Debug, Default)]
pub struct FileStore {
    files: Mutex<HashMap<String, StoredFile>>,
}

impl FileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an upload under a freshly generated id
    pub fn insert(
        &self,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Vec<u8>,
    ) -> FileMetadata {
        let file = StoredFile {
            id: Uuid::new_v4().to_string(),
            filename: filename.into(),
            content_type: content_type.into(),
            data,
            uploaded_at: Utc::now(),
        };

        let metadata = FileMetadata::from(&file);
        let mut files = self.files.lock().expect("file store poisoned");
        files.insert(file.id.clone(), file);
        metadata
    }

    pub fn get(&self, id: &str) -> Option<StoredFile> {
        let files = self.files.lock().expect("file store poisoned");
        files.get(id).cloned()
    }

    pub fn delete(&self, id: &str) -> bool {
        let mut files = self.files.lock().expect("file store poisoned");
        files.remove(id).is_some()
    }

    /// Metadata for every stored file, newest first
    pub fn list(&self) -> Vec<FileMetadata> {
        let files = self.files.lock().expect("file store poisoned");
        let mut listed: Vec<FileMetadata> = files.values().map(FileMetadata::from).collect();
        listed.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        listed
    }
}
