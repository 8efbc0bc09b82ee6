mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use common::{place, upload, TestContext};
use mediabox::error::AppError;
use mediabox::models::bucket::StorageBucket;
use mediabox::repositories::bucket::BucketRepository;
use mediabox::repositories::memory::MemoryStore;
use mediabox::services::{buckets as bucket_service, files as file_service};
use mediabox::{AppState, ErrorKind};

/// Bucket store that answers the allocator's first look with stale reads,
/// as if a competing request committed bucket 0 right after them.
struct LostRace {
    inner: MemoryStore,
    stale_active: AtomicBool,
    stale_index: AtomicBool,
    always_stale: bool,
}

impl LostRace {
    fn once(inner: MemoryStore) -> Self {
        Self {
            inner,
            stale_active: AtomicBool::new(true),
            stale_index: AtomicBool::new(true),
            always_stale: false,
        }
    }

    fn forever(inner: MemoryStore) -> Self {
        Self {
            always_stale: true,
            ..Self::once(inner)
        }
    }
}

#[async_trait]
impl BucketRepository for LostRace {
    async fn find_active(&self, user_id: Uuid) -> mediabox::Result<Option<StorageBucket>> {
        if self.always_stale || self.stale_active.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        <MemoryStore as BucketRepository>::find_active(&self.inner, user_id).await
    }

    async fn max_index(&self, user_id: Uuid) -> mediabox::Result<Option<i32>> {
        if self.always_stale || self.stale_index.swap(false, Ordering::SeqCst) {
            return Ok(None);
        }
        <MemoryStore as BucketRepository>::max_index(&self.inner, user_id).await
    }

    async fn insert(&self, bucket: &StorageBucket) -> mediabox::Result<StorageBucket> {
        <MemoryStore as BucketRepository>::insert(&self.inner, bucket).await
    }

    async fn list_for_user(&self, user_id: Uuid) -> mediabox::Result<Vec<StorageBucket>> {
        self.inner.list_for_user(user_id).await
    }

    async fn list_owners(&self) -> mediabox::Result<Vec<Uuid>> {
        self.inner.list_owners().await
    }

    async fn apply_usage_delta(
        &self,
        bucket_id: Uuid,
        file_delta: i32,
        byte_delta: i64,
    ) -> mediabox::Result<Option<StorageBucket>> {
        self.inner.apply_usage_delta(bucket_id, file_delta, byte_delta).await
    }

    async fn set_usage(
        &self,
        bucket_id: Uuid,
        file_count: i32,
        total_size: i64,
    ) -> mediabox::Result<Option<StorageBucket>> {
        self.inner.set_usage(bucket_id, file_count, total_size).await
    }
}

async fn seed_competitor_bucket(ctx: &TestContext) -> StorageBucket {
    let bucket = StorageBucket::new(ctx.user_id, 0, ctx.state.config.bucket_max_file_count);
    <MemoryStore as BucketRepository>::insert(&ctx.store, &bucket)
        .await
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_bucket_is_index_zero() {
        let ctx = TestContext::new();

        let bucket = bucket_service::get_or_create_active_bucket(&ctx.state, ctx.user_id)
            .await
            .unwrap();

        assert_eq!(bucket.bucket_index, 0);
        assert_eq!(bucket.storage_path, format!("{}/folder_000", ctx.user_id));
        assert_eq!(bucket.file_count, 0);
        assert_eq!(bucket.total_size, 0);
        assert_eq!(bucket.max_file_count, 1000);
        assert!(bucket.is_active);

        let again = bucket_service::get_or_create_active_bucket(&ctx.state, ctx.user_id)
            .await
            .unwrap();
        assert_eq!(again.id, bucket.id);
        assert_eq!(ctx.store.bucket_count(ctx.user_id).await, 1);
    }

    #[tokio::test]
    async fn test_bucket_fills_at_capacity_and_reopens() {
        let ctx = TestContext::new();
        let bucket = bucket_service::get_or_create_active_bucket(&ctx.state, ctx.user_id)
            .await
            .unwrap();

        let mut current = bucket.clone();
        for _ in 0..999 {
            current = bucket_service::increment_usage(&ctx.state, bucket.id, 10).await.unwrap();
        }
        assert_eq!(current.file_count, 999);
        assert!(current.is_active);

        let full = bucket_service::increment_usage(&ctx.state, bucket.id, 10).await.unwrap();
        assert_eq!(full.file_count, 1000);
        assert_eq!(full.total_size, 10_000);
        assert!(!full.is_active);

        let reopened = bucket_service::decrement_usage(&ctx.state, bucket.id, 1, 10).await.unwrap();
        assert_eq!(reopened.file_count, 999);
        assert!(reopened.is_active);
    }

    #[tokio::test]
    async fn test_full_bucket_rolls_over_to_next_index() {
        let ctx = TestContext::with_bucket_capacity(2);

        let first = place(&ctx, &upload("a.jpg", 1, "image/jpeg"), None).await;
        let second = place(&ctx, &upload("b.jpg", 1, "image/jpeg"), None).await;
        assert_eq!(first.storage_bucket_id, second.storage_bucket_id);

        let next = bucket_service::get_or_create_active_bucket(&ctx.state, ctx.user_id)
            .await
            .unwrap();
        assert_eq!(next.bucket_index, 1);
        assert_eq!(next.storage_path, format!("{}/folder_001", ctx.user_id));
        assert_ne!(next.id, first.storage_bucket_id);

        let buckets = bucket_service::list_buckets(&ctx.state, ctx.user_id).await.unwrap();
        let indexes: Vec<i32> = buckets.iter().map(|b| b.bucket_index).collect();
        assert_eq!(indexes, [0, 1]);
        assert!(!buckets[0].is_active);
    }

    #[tokio::test]
    async fn test_reopened_bucket_waits_behind_higher_active_bucket() {
        let ctx = TestContext::with_bucket_capacity(2);

        let a = place(&ctx, &upload("a.jpg", 1, "image/jpeg"), None).await;
        place(&ctx, &upload("b.jpg", 1, "image/jpeg"), None).await;
        let c = place(&ctx, &upload("c.jpg", 1, "image/jpeg"), None).await;
        assert_ne!(a.storage_bucket_id, c.storage_bucket_id);

        // Frees a slot in bucket 0, which becomes active again.
        file_service::delete_file(&ctx.state, ctx.user_id, a.id).await.unwrap();
        let buckets = bucket_service::list_buckets(&ctx.state, ctx.user_id).await.unwrap();
        assert!(buckets[0].is_active);

        // Bucket 1 still has room and wins.
        let d = place(&ctx, &upload("d.jpg", 1, "image/jpeg"), None).await;
        assert_eq!(d.storage_bucket_id, c.storage_bucket_id);

        // Once bucket 1 is full, the reopened bucket 0 is used before allocating.
        let e = place(&ctx, &upload("e.jpg", 1, "image/jpeg"), None).await;
        assert_eq!(e.storage_bucket_id, buckets[0].id);
        assert_eq!(ctx.store.bucket_count(ctx.user_id).await, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_allocation_yields_one_bucket() {
        let ctx = TestContext::new();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let state = ctx.state.clone();
            let user_id = ctx.user_id;
            handles.push(tokio::spawn(async move {
                bucket_service::get_or_create_active_bucket(&state, user_id).await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().unwrap().id);
        }

        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(ctx.store.bucket_count(ctx.user_id).await, 1);
    }

    #[tokio::test]
    async fn test_lost_insert_race_rereads_winner() {
        let ctx = TestContext::new();
        let winner = seed_competitor_bucket(&ctx).await;
        let state = AppState {
            buckets: Arc::new(LostRace::once(ctx.store.clone())),
            ..ctx.state.clone()
        };

        let bucket = bucket_service::get_or_create_active_bucket(&state, ctx.user_id)
            .await
            .unwrap();
        assert_eq!(bucket.id, winner.id);
        assert_eq!(ctx.store.bucket_count(ctx.user_id).await, 1);
    }

    #[tokio::test]
    async fn test_repeated_lost_race_is_inconsistency() {
        let ctx = TestContext::new();
        seed_competitor_bucket(&ctx).await;
        let state = AppState {
            buckets: Arc::new(LostRace::forever(ctx.store.clone())),
            ..ctx.state.clone()
        };

        let err = bucket_service::get_or_create_active_bucket(&state, ctx.user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StorageInconsistency(_)), "got {:?}", err);
        assert_eq!(ctx.store.bucket_count(ctx.user_id).await, 1);
    }

    #[tokio::test]
    async fn test_usage_on_missing_bucket_is_inconsistency() {
        let ctx = TestContext::new();

        let err = bucket_service::increment_usage(&ctx.state, Uuid::new_v4(), 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageInconsistency);

        let err = bucket_service::decrement_usage(&ctx.state, Uuid::new_v4(), 1, 10)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageInconsistency);
    }

    #[tokio::test]
    async fn test_decrement_floors_at_zero() {
        let ctx = TestContext::new();
        let bucket = bucket_service::get_or_create_active_bucket(&ctx.state, ctx.user_id)
            .await
            .unwrap();
        bucket_service::increment_usage(&ctx.state, bucket.id, 50).await.unwrap();

        let drained = bucket_service::decrement_usage(&ctx.state, bucket.id, 5, 500)
            .await
            .unwrap();
        assert_eq!(drained.file_count, 0);
        assert_eq!(drained.total_size, 0);
        assert!(drained.is_active);
    }

    #[tokio::test]
    async fn test_reconcile_usage_corrects_drift() {
        let ctx = TestContext::new();
        let file = place(&ctx, &upload("a.jpg", 400, "image/jpeg"), None).await;
        place(&ctx, &upload("b.jpg", 600, "image/jpeg"), None).await;

        assert_eq!(bucket_service::reconcile_usage(&ctx.state, ctx.user_id).await.unwrap(), 0);

        // Counters drift when a usage update is lost.
        bucket_service::increment_usage(&ctx.state, file.storage_bucket_id, 123)
            .await
            .unwrap();

        let corrected = bucket_service::reconcile_usage(&ctx.state, ctx.user_id).await.unwrap();
        assert_eq!(corrected, 1);

        let buckets = bucket_service::list_buckets(&ctx.state, ctx.user_id).await.unwrap();
        assert_eq!(buckets[0].file_count, 2);
        assert_eq!(buckets[0].total_size, 1000);
    }
}
