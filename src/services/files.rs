use std::collections::BTreeMap;
use chrono::Utc;
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::file::{FileCategory, FileListQuery, FileRecord, UploadDescriptor, UploadStatus},
    services::{buckets as bucket_service, folders as folder_service},
    state::AppState,
    storage::ObjectKind,
};

/// Builds the record for a finished upload.
///
/// The record points at the user's active bucket and at `target_folder_id`,
/// or the root when `None`. Nothing is written: the caller persists the record
/// with [`persist_file_record`], which also accounts for it in the bucket.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `user_id` - The ID of the user who uploaded the file.
/// * `upload` - What the upload pipeline produced.
/// * `target_folder_id` - The logical folder to show the file in.
///
/// # Returns
///
/// A `Result` containing the unsaved `FileRecord`.
pub async fn create_file_record(
    state: &AppState,
    user_id: Uuid,
    upload: &UploadDescriptor,
    target_folder_id: Option<Uuid>,
) -> Result<FileRecord> {
    if upload.filename.trim().is_empty() {
        return Err(AppError::Validation("Filename cannot be empty".to_string()));
    }
    if upload.file_size < 0 {
        return Err(AppError::Validation("File size cannot be negative".to_string()));
    }

    let folder_id = match target_folder_id {
        Some(id) => state
            .folders
            .find_by_id(user_id, id)
            .await?
            .ok_or_else(|| AppError::NotFound("Target folder not found".to_string()))?
            .id,
        None => folder_service::get_or_create_root(state, user_id).await?.id,
    };

    let bucket = bucket_service::get_or_create_active_bucket(state, user_id).await?;

    Ok(FileRecord {
        id: Uuid::new_v4(),
        user_id,
        folder_id,
        storage_bucket_id: bucket.id,
        original_filename: upload.filename.clone(),
        display_filename: upload.filename.clone(),
        file_path: upload.file_path.clone(),
        file_size: upload.file_size,
        mime_type: upload.mime_type.clone(),
        category: FileCategory::from_mime(&upload.mime_type),
        thumbnail_path: upload.thumbnail_path.clone(),
        thumbnail_size: upload.thumbnail_size,
        upload_status: UploadStatus::Completed,
        is_starred: false,
        media_created_at: upload.media_created_at,
        created_at: Utc::now(),
    })
}

/// Stores a record built by [`create_file_record`], then counts it against
/// its bucket. Usage only moves once the row is durable.
pub async fn persist_file_record(state: &AppState, record: &FileRecord) -> Result<FileRecord> {
    let stored = state.files.insert(record).await?;
    bucket_service::increment_usage(state, stored.storage_bucket_id, stored.file_size).await?;
    tracing::info!(
        "Stored file {} ({} bytes) in folder {}",
        stored.id,
        stored.file_size,
        stored.folder_id
    );
    Ok(stored)
}

/// Shows a file in another folder. Its bytes and bucket stay where they are.
pub async fn move_file(
    state: &AppState,
    file_id: Uuid,
    target_folder_id: Uuid,
    user_id: Uuid,
) -> Result<FileRecord> {
    let mut file = state
        .files
        .find_by_id(user_id, file_id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;
    let target = state
        .folders
        .find_by_id(user_id, target_folder_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Target folder not found".to_string()))?;

    if file.folder_id == target.id {
        return Ok(file);
    }

    if !state.files.update_folder(user_id, file.id, target.id).await? {
        return Err(AppError::NotFound("File not found".to_string()));
    }

    file.folder_id = target.id;
    tracing::debug!("Moved file {} to folder {}", file.id, target.id);
    Ok(file)
}

/// Deletes every file directly inside `folder_id`.
///
/// Bucket usage is adjusted once per affected bucket. Physical removal is
/// best effort.
///
/// # Returns
///
/// The number of file records removed.
pub async fn delete_files_in_folder(state: &AppState, folder_id: Uuid, user_id: Uuid) -> Result<usize> {
    let files = state.files.list_in_folder(user_id, folder_id).await?;
    if files.is_empty() {
        return Ok(0);
    }

    let ids: Vec<Uuid> = files.iter().map(|f| f.id).collect();
    let removed = state.files.delete_by_ids(user_id, &ids).await?;

    release_bucket_usage(state, &removed).await?;
    remove_physical_objects(state, &removed).await;

    Ok(removed.len())
}

/// Deletes a single file.
pub async fn delete_file(state: &AppState, user_id: Uuid, file_id: Uuid) -> Result<()> {
    let file = state
        .files
        .find_by_id(user_id, file_id)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    let removed = state.files.delete_by_ids(user_id, &[file.id]).await?;
    release_bucket_usage(state, &removed).await?;
    remove_physical_objects(state, &removed).await;

    Ok(())
}

/// Lists a page of a folder's completed files.
pub async fn list_folder_files(
    state: &AppState,
    user_id: Uuid,
    folder_id: Uuid,
    query: &FileListQuery,
) -> Result<Vec<FileRecord>> {
    if query.limit <= 0 || query.offset < 0 {
        return Err(AppError::Validation(
            "Limit must be positive and offset non-negative".to_string(),
        ));
    }

    let folder = state
        .folders
        .find_by_id(user_id, folder_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Folder not found".to_string()))?;

    state.files.list_page(user_id, folder.id, query).await
}

async fn release_bucket_usage(state: &AppState, removed: &[FileRecord]) -> Result<()> {
    let mut deltas: BTreeMap<Uuid, (i32, i64)> = BTreeMap::new();
    for file in removed {
        let entry = deltas.entry(file.storage_bucket_id).or_default();
        entry.0 += 1;
        entry.1 += file.file_size;
    }

    for (bucket_id, (count, bytes)) in deltas {
        bucket_service::decrement_usage(state, bucket_id, count, bytes).await?;
    }
    Ok(())
}

/// Asks the object store to drop originals and thumbnails. Failures leave
/// orphaned objects behind and are only logged.
async fn remove_physical_objects(state: &AppState, removed: &[FileRecord]) {
    let originals: Vec<String> = removed.iter().map(|f| f.file_path.clone()).collect();
    let thumbnails: Vec<String> = removed
        .iter()
        .filter_map(|f| f.thumbnail_path.clone())
        .collect();

    let remove = |kind: ObjectKind, paths: Vec<String>| async move {
        if paths.is_empty() {
            return;
        }
        if let Err(e) = state.objects.remove_objects(kind, &paths).await {
            tracing::warn!("Failed to remove {} objects from {}: {}", paths.len(), kind, e);
        }
    };

    futures::future::join(
        remove(ObjectKind::Originals, originals),
        remove(ObjectKind::Thumbnails, thumbnails),
    )
    .await;
}
