use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::bucket::{BucketUsage, StorageBucket};
use crate::models::file::{FileListQuery, FileRecord, UploadStatus};
use crate::models::folder::Folder;
use crate::repositories::bucket::BucketRepository;
use crate::repositories::file::FileRepository;
use crate::repositories::folder::FolderRepository;

#[derive(Debug, Default)]
struct Tables {
    folders: BTreeMap<Uuid, Folder>,
    buckets: BTreeMap<Uuid, StorageBucket>,
    files: BTreeMap<Uuid, FileRecord>,
}

impl Tables {
    fn folder_name_taken(&self, folder: &Folder) -> bool {
        self.folders.values().any(|f| {
            f.id != folder.id
                && f.user_id == folder.user_id
                && f.parent_id == folder.parent_id
                && (f.name == folder.name || folder.parent_id.is_none())
        })
    }
}

/// In-memory store implementing every repository trait.
///
/// Enforces the same unique constraints as the SQL schema so that services
/// see identical failure signals. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn folder_count(&self) -> usize {
        self.tables.read().await.folders.len()
    }

    pub async fn file_count(&self) -> usize {
        self.tables.read().await.files.len()
    }

    pub async fn bucket_count(&self, user_id: Uuid) -> usize {
        self.tables
            .read()
            .await
            .buckets
            .values()
            .filter(|b| b.user_id == user_id)
            .count()
    }
}

#[async_trait]
impl FolderRepository for MemoryStore {
    async fn find_root(&self, user_id: Uuid) -> Result<Option<Folder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .folders
            .values()
            .find(|f| f.user_id == user_id && f.parent_id.is_none())
            .cloned())
    }

    async fn find_by_id(&self, user_id: Uuid, folder_id: Uuid) -> Result<Option<Folder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .folders
            .get(&folder_id)
            .filter(|f| f.user_id == user_id)
            .cloned())
    }

    async fn find_child(&self, user_id: Uuid, parent_id: Uuid, name: &str) -> Result<Option<Folder>> {
        let tables = self.tables.read().await;
        Ok(tables
            .folders
            .values()
            .find(|f| f.user_id == user_id && f.parent_id == Some(parent_id) && f.name == name)
            .cloned())
    }

    async fn list_children(&self, user_id: Uuid, parent_id: Uuid) -> Result<Vec<Folder>> {
        let tables = self.tables.read().await;
        let mut children: Vec<Folder> = tables
            .folders
            .values()
            .filter(|f| f.user_id == user_id && f.parent_id == Some(parent_id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn insert(&self, folder: &Folder) -> Result<Folder> {
        let mut tables = self.tables.write().await;
        if tables.folder_name_taken(folder) {
            return Err(AppError::UniqueViolation("folders_user_parent_name_key".to_string()));
        }
        tables.folders.insert(folder.id, folder.clone());
        Ok(folder.clone())
    }

    async fn update(&self, folder: &Folder) -> Result<Option<Folder>> {
        let mut tables = self.tables.write().await;
        if !tables
            .folders
            .get(&folder.id)
            .is_some_and(|f| f.user_id == folder.user_id)
        {
            return Ok(None);
        }
        if tables.folder_name_taken(folder) {
            return Err(AppError::UniqueViolation("folders_user_parent_name_key".to_string()));
        }
        let mut updated = folder.clone();
        updated.updated_at = chrono::Utc::now();
        tables.folders.insert(updated.id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete(&self, user_id: Uuid, folder_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .folders
            .get(&folder_id)
            .is_some_and(|f| f.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        if tables.folders.values().any(|f| f.parent_id == Some(folder_id))
            || tables.files.values().any(|f| f.folder_id == folder_id)
        {
            return Err(AppError::Internal(format!(
                "folder {} is still referenced",
                folder_id
            )));
        }
        Ok(tables.folders.remove(&folder_id).is_some())
    }
}

#[async_trait]
impl BucketRepository for MemoryStore {
    async fn find_active(&self, user_id: Uuid) -> Result<Option<StorageBucket>> {
        let tables = self.tables.read().await;
        Ok(tables
            .buckets
            .values()
            .filter(|b| b.user_id == user_id && b.is_active)
            .max_by_key(|b| b.bucket_index)
            .cloned())
    }

    async fn max_index(&self, user_id: Uuid) -> Result<Option<i32>> {
        let tables = self.tables.read().await;
        Ok(tables
            .buckets
            .values()
            .filter(|b| b.user_id == user_id)
            .map(|b| b.bucket_index)
            .max())
    }

    async fn insert(&self, bucket: &StorageBucket) -> Result<StorageBucket> {
        let mut tables = self.tables.write().await;
        if tables
            .buckets
            .values()
            .any(|b| b.user_id == bucket.user_id && b.bucket_index == bucket.bucket_index)
        {
            return Err(AppError::UniqueViolation("storage_buckets_user_index_key".to_string()));
        }
        tables.buckets.insert(bucket.id, bucket.clone());
        Ok(bucket.clone())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<StorageBucket>> {
        let tables = self.tables.read().await;
        let mut buckets: Vec<StorageBucket> = tables
            .buckets
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        buckets.sort_by_key(|b| b.bucket_index);
        Ok(buckets)
    }

    async fn list_owners(&self) -> Result<Vec<Uuid>> {
        let tables = self.tables.read().await;
        let owners: BTreeSet<Uuid> = tables.buckets.values().map(|b| b.user_id).collect();
        Ok(owners.into_iter().collect())
    }

    async fn apply_usage_delta(
        &self,
        bucket_id: Uuid,
        file_delta: i32,
        byte_delta: i64,
    ) -> Result<Option<StorageBucket>> {
        let mut tables = self.tables.write().await;
        Ok(tables.buckets.get_mut(&bucket_id).map(|bucket| {
            bucket.apply_delta(file_delta, byte_delta);
            bucket.clone()
        }))
    }

    async fn set_usage(
        &self,
        bucket_id: Uuid,
        file_count: i32,
        total_size: i64,
    ) -> Result<Option<StorageBucket>> {
        let mut tables = self.tables.write().await;
        Ok(tables.buckets.get_mut(&bucket_id).map(|bucket| {
            bucket.set_usage(file_count, total_size);
            bucket.clone()
        }))
    }
}

fn page_order(a: &FileRecord, b: &FileRecord) -> Ordering {
    let by_media = match (a.media_created_at, b.media_created_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_media
        .then_with(|| a.original_filename.cmp(&b.original_filename))
        .then_with(|| b.created_at.cmp(&a.created_at))
}

#[async_trait]
impl FileRepository for MemoryStore {
    async fn insert(&self, file: &FileRecord) -> Result<FileRecord> {
        let mut tables = self.tables.write().await;
        if !tables.folders.contains_key(&file.folder_id) {
            return Err(AppError::Internal(format!("folder {} does not exist", file.folder_id)));
        }
        if !tables.buckets.contains_key(&file.storage_bucket_id) {
            return Err(AppError::Internal(format!(
                "bucket {} does not exist",
                file.storage_bucket_id
            )));
        }
        tables.files.insert(file.id, file.clone());
        Ok(file.clone())
    }

    async fn find_by_id(&self, user_id: Uuid, file_id: Uuid) -> Result<Option<FileRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .files
            .get(&file_id)
            .filter(|f| f.user_id == user_id)
            .cloned())
    }

    async fn list_in_folder(&self, user_id: Uuid, folder_id: Uuid) -> Result<Vec<FileRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .files
            .values()
            .filter(|f| f.user_id == user_id && f.folder_id == folder_id)
            .cloned()
            .collect())
    }

    async fn list_page(
        &self,
        user_id: Uuid,
        folder_id: Uuid,
        query: &FileListQuery,
    ) -> Result<Vec<FileRecord>> {
        let tables = self.tables.read().await;
        let mut files: Vec<FileRecord> = tables
            .files
            .values()
            .filter(|f| {
                f.user_id == user_id
                    && f.folder_id == folder_id
                    && f.upload_status == UploadStatus::Completed
                    && query.category.is_none_or(|c| f.category == c)
            })
            .cloned()
            .collect();
        files.sort_by(page_order);
        Ok(files
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .collect())
    }

    async fn update_folder(&self, user_id: Uuid, file_id: Uuid, folder_id: Uuid) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.files.get_mut(&file_id) {
            Some(file) if file.user_id == user_id => {
                file.folder_id = folder_id;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_by_ids(&self, user_id: Uuid, file_ids: &[Uuid]) -> Result<Vec<FileRecord>> {
        let mut tables = self.tables.write().await;
        let mut removed = Vec::with_capacity(file_ids.len());
        for id in file_ids {
            if tables.files.get(id).is_some_and(|f| f.user_id == user_id) {
                if let Some(file) = tables.files.remove(id) {
                    removed.push(file);
                }
            }
        }
        Ok(removed)
    }

    async fn folder_totals(&self, user_id: Uuid, folder_id: Uuid) -> Result<(i64, i64)> {
        let tables = self.tables.read().await;
        Ok(tables
            .files
            .values()
            .filter(|f| f.user_id == user_id && f.folder_id == folder_id)
            .fold((0, 0), |(count, bytes), f| (count + 1, bytes + f.file_size)))
    }

    async fn usage_by_bucket(&self, user_id: Uuid) -> Result<Vec<BucketUsage>> {
        let tables = self.tables.read().await;
        let mut usage: HashMap<Uuid, (i64, i64)> = HashMap::new();
        for file in tables.files.values().filter(|f| f.user_id == user_id) {
            let entry = usage.entry(file.storage_bucket_id).or_default();
            entry.0 += 1;
            entry.1 += file.file_size;
        }
        Ok(usage
            .into_iter()
            .map(|(bucket_id, (file_count, total_size))| BucketUsage {
                bucket_id,
                file_count,
                total_size,
            })
            .collect())
    }
}
