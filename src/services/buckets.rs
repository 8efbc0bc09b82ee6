use std::collections::HashMap;
use uuid::Uuid;
use crate::{
    error::{AppError, Result},
    models::bucket::StorageBucket,
    state::AppState,
};

/// How many times the allocator re-reads the active bucket after losing an
/// insert race. A second lost race surfaces as an error instead of looping.
pub const ALLOCATOR_RACE_REREADS: usize = 1;

/// Returns the bucket new uploads should be placed in, allocating the next
/// one when every existing bucket is full.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `user_id` - The ID of the user.
///
/// # Returns
///
/// A `Result` containing the active `StorageBucket`.
pub async fn get_or_create_active_bucket(state: &AppState, user_id: Uuid) -> Result<StorageBucket> {
    if let Some(bucket) = state.buckets.find_active(user_id).await? {
        return Ok(bucket);
    }

    let next_index = match state.buckets.max_index(user_id).await? {
        Some(max) => max + 1,
        None => 0,
    };
    let candidate = StorageBucket::new(user_id, next_index, state.config.bucket_max_file_count);

    match state.buckets.insert(&candidate).await {
        Ok(bucket) => {
            tracing::info!(
                "Allocated storage bucket {} for user {} at {}",
                bucket.bucket_index,
                user_id,
                bucket.storage_path
            );
            Ok(bucket)
        }
        Err(AppError::UniqueViolation(constraint)) => {
            tracing::warn!(
                "Bucket index {} for user {} was allocated concurrently, re-reading",
                next_index,
                user_id
            );
            for _ in 0..ALLOCATOR_RACE_REREADS {
                if let Some(bucket) = state.buckets.find_active(user_id).await? {
                    return Ok(bucket);
                }
            }
            Err(AppError::StorageInconsistency(format!(
                "Bucket index {} for user {} collided on {} and no active bucket exists",
                next_index, user_id, constraint
            )))
        }
        Err(e) => Err(e),
    }
}

/// Records one more file of `byte_delta` bytes in the bucket.
pub async fn increment_usage(state: &AppState, bucket_id: Uuid, byte_delta: i64) -> Result<StorageBucket> {
    let bucket = state
        .buckets
        .apply_usage_delta(bucket_id, 1, byte_delta)
        .await?
        .ok_or_else(|| missing_bucket(bucket_id))?;

    if !bucket.is_active {
        tracing::info!(
            "Storage bucket {} reached capacity ({} files)",
            bucket.storage_path,
            bucket.file_count
        );
    }

    Ok(bucket)
}

/// Removes `file_count_delta` files and `byte_delta` bytes from the bucket,
/// flooring both at zero.
pub async fn decrement_usage(
    state: &AppState,
    bucket_id: Uuid,
    file_count_delta: i32,
    byte_delta: i64,
) -> Result<StorageBucket> {
    let bucket = state
        .buckets
        .apply_usage_delta(bucket_id, -file_count_delta, -byte_delta)
        .await?
        .ok_or_else(|| missing_bucket(bucket_id))?;

    tracing::debug!(
        "Storage bucket {} now holds {} files ({} bytes), active={}",
        bucket.storage_path,
        bucket.file_count,
        bucket.total_size,
        bucket.is_active
    );

    Ok(bucket)
}

/// Lists the user's buckets ordered by index.
pub async fn list_buckets(state: &AppState, user_id: Uuid) -> Result<Vec<StorageBucket>> {
    state.buckets.list_for_user(user_id).await
}

/// Recomputes every bucket's counters from the file rows and corrects drift.
///
/// # Returns
///
/// The number of buckets whose counters were rewritten.
pub async fn reconcile_usage(state: &AppState, user_id: Uuid) -> Result<usize> {
    let actual: HashMap<Uuid, (i64, i64)> = state
        .files
        .usage_by_bucket(user_id)
        .await?
        .into_iter()
        .map(|u| (u.bucket_id, (u.file_count, u.total_size)))
        .collect();

    let mut corrected = 0;
    for bucket in state.buckets.list_for_user(user_id).await? {
        let (count, size) = actual.get(&bucket.id).copied().unwrap_or((0, 0));
        if count == i64::from(bucket.file_count) && size == bucket.total_size {
            continue;
        }

        tracing::warn!(
            "Storage bucket {} drifted: recorded {} files/{} bytes, actual {} files/{} bytes",
            bucket.storage_path,
            bucket.file_count,
            bucket.total_size,
            count,
            size
        );

        let count = i32::try_from(count).map_err(|_| {
            AppError::StorageInconsistency(format!("Bucket {} file count overflows", bucket.id))
        })?;
        state
            .buckets
            .set_usage(bucket.id, count, size)
            .await?
            .ok_or_else(|| missing_bucket(bucket.id))?;
        corrected += 1;
    }

    Ok(corrected)
}

fn missing_bucket(bucket_id: Uuid) -> AppError {
    AppError::StorageInconsistency(format!("Storage bucket {} not found", bucket_id))
}
