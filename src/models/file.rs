use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use uuid::Uuid;

/// Coarse media category derived from a MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "file_category")]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    #[postgres(name = "image")]
    Image,
    #[postgres(name = "video")]
    Video,
    #[postgres(name = "document")]
    Document,
    #[postgres(name = "other")]
    Other,
}

impl FileCategory {
    /// Classifies a MIME type.
    pub fn from_mime(mime_type: &str) -> Self {
        let mime = mime_type.to_ascii_lowercase();
        if mime.starts_with("image/") {
            FileCategory::Image
        } else if mime.starts_with("video/") {
            FileCategory::Video
        } else if mime.contains("pdf") || mime.contains("document") || mime.contains("text/") {
            FileCategory::Document
        } else {
            FileCategory::Other
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "upload_status")]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    #[postgres(name = "pending")]
    Pending,
    #[postgres(name = "completed")]
    Completed,
    #[postgres(name = "failed")]
    Failed,
}

/// One uploaded object.
///
/// `folder_id` is where the user sees the file; `storage_bucket_id` is where
/// its bytes live. The two never change together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub folder_id: Uuid,
    pub storage_bucket_id: Uuid,
    pub original_filename: String,
    pub display_filename: String,
    pub file_path: String,
    pub file_size: i64,
    pub mime_type: String,
    pub category: FileCategory,
    pub thumbnail_path: Option<String>,
    pub thumbnail_size: Option<i64>,
    pub upload_status: UploadStatus,
    pub is_starred: bool,
    pub media_created_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Row> for FileRecord {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            user_id: row.get("user_id"),
            folder_id: row.get("folder_id"),
            storage_bucket_id: row.get("storage_bucket_id"),
            original_filename: row.get("original_filename"),
            display_filename: row.get("display_filename"),
            file_path: row.get("file_path"),
            file_size: row.get("file_size"),
            mime_type: row.get("mime_type"),
            category: row.get("category"),
            thumbnail_path: row.get("thumbnail_path"),
            thumbnail_size: row.get("thumbnail_size"),
            upload_status: row.get("upload_status"),
            is_starred: row.get("is_starred"),
            media_created_at: row.get("media_created_at"),
            created_at: row.get("created_at"),
        }
    }
}

/// What the upload pipeline knows about a finished upload.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadDescriptor {
    pub filename: String,
    pub file_size: i64,
    pub mime_type: String,
    /// Where the original bytes were written in the object store.
    pub file_path: String,
    pub thumbnail_path: Option<String>,
    pub thumbnail_size: Option<i64>,
    pub media_created_at: Option<DateTime<Utc>>,
}

/// Filters and paging for listing a folder's files.
#[derive(Debug, Clone, Deserialize)]
pub struct FileListQuery {
    pub category: Option<FileCategory>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

/// Files returned per page when the caller does not say.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

impl Default for FileListQuery {
    fn default() -> Self {
        Self {
            category: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}
