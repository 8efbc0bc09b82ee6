use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use uuid::Uuid;

/// A fixed-capacity physical container for file bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBucket {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Assignment order; unique per user.
    pub bucket_index: i32,
    /// Object-store prefix derived from the owner and index.
    pub storage_path: String,
    pub file_count: i32,
    pub total_size: i64,
    pub max_file_count: i32,
    /// Always equal to `file_count < max_file_count`.
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&Row> for StorageBucket {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            user_id: row.get("user_id"),
            bucket_index: row.get("bucket_index"),
            storage_path: row.get("storage_path"),
            file_count: row.get("file_count"),
            total_size: row.get("total_size"),
            max_file_count: row.get("max_file_count"),
            is_active: row.get("is_active"),
            created_at: row.get("created_at"),
        }
    }
}

impl StorageBucket {
    /// Builds an empty bucket for `user_id` at `bucket_index`.
    pub fn new(user_id: Uuid, bucket_index: i32, max_file_count: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            bucket_index,
            storage_path: storage_path_for(user_id, bucket_index),
            file_count: 0,
            total_size: 0,
            max_file_count,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Applies a signed usage delta, flooring both counters at zero and
    /// recomputing the active flag.
    pub fn apply_delta(&mut self, file_delta: i32, byte_delta: i64) {
        self.file_count = self.file_count.saturating_add(file_delta).max(0);
        self.total_size = self.total_size.saturating_add(byte_delta).max(0);
        self.is_active = self.file_count < self.max_file_count;
    }

    /// Overwrites the usage counters, recomputing the active flag.
    pub fn set_usage(&mut self, file_count: i32, total_size: i64) {
        self.file_count = file_count.max(0);
        self.total_size = total_size.max(0);
        self.is_active = self.file_count < self.max_file_count;
    }
}

/// Derives the object-store prefix for a bucket, e.g. `<user>/folder_007`.
pub fn storage_path_for(user_id: Uuid, bucket_index: i32) -> String {
    format!("{}/{}", user_id, bucket_folder_name(bucket_index))
}

/// The `folder_NNN` name shared by a bucket's path and its mirror folder.
pub fn bucket_folder_name(bucket_index: i32) -> String {
    format!("folder_{:03}", bucket_index)
}

/// Actual usage of one bucket as recomputed from file rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketUsage {
    pub bucket_id: Uuid,
    pub file_count: i64,
    pub total_size: i64,
}
