use async_trait::async_trait;
use deadpool_postgres::Pool;
use uuid::Uuid;
use crate::{error::Result, models::bucket::StorageBucket};

/// Persistence for physical storage buckets.
///
/// Implementations must enforce uniqueness of `(user_id, bucket_index)`,
/// reporting violations as `AppError::UniqueViolation`.
#[async_trait]
pub trait BucketRepository: Send + Sync + 'static {
    /// The active bucket with the highest index for the user.
    async fn find_active(&self, user_id: Uuid) -> Result<Option<StorageBucket>>;

    /// The highest bucket index the user has, active or not.
    async fn max_index(&self, user_id: Uuid) -> Result<Option<i32>>;

    async fn insert(&self, bucket: &StorageBucket) -> Result<StorageBucket>;

    /// All of the user's buckets, ordered by index.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<StorageBucket>>;

    /// Every user that owns at least one bucket.
    async fn list_owners(&self) -> Result<Vec<Uuid>>;

    /// Adds signed deltas to the counters in one step, flooring at zero and
    /// recomputing `is_active`. `None` if the bucket does not exist.
    async fn apply_usage_delta(
        &self,
        bucket_id: Uuid,
        file_delta: i32,
        byte_delta: i64,
    ) -> Result<Option<StorageBucket>>;

    /// Overwrites the counters and recomputes `is_active`.
    async fn set_usage(
        &self,
        bucket_id: Uuid,
        file_count: i32,
        total_size: i64,
    ) -> Result<Option<StorageBucket>>;
}

const BUCKET_COLUMNS: &str = "id, user_id, bucket_index, storage_path, file_count, total_size, \
     max_file_count, is_active, created_at";

/// PostgreSQL-backed `BucketRepository`.
#[derive(Clone)]
pub struct PgBucketRepository {
    pool: Pool,
}

impl PgBucketRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BucketRepository for PgBucketRepository {
    async fn find_active(&self, user_id: Uuid) -> Result<Option<StorageBucket>> {
        let client = self.pool.get().await?;
        let sql = format!(
            r#"
            SELECT {} FROM storage_buckets
            WHERE user_id = $1 AND is_active = true
            ORDER BY bucket_index DESC
            LIMIT 1
            "#,
            BUCKET_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let row = client.query_opt(&stmt, &[&user_id]).await?;
        Ok(row.as_ref().map(StorageBucket::from))
    }

    async fn max_index(&self, user_id: Uuid) -> Result<Option<i32>> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                "SELECT MAX(bucket_index) AS max_index FROM storage_buckets WHERE user_id = $1",
                &[&user_id],
            )
            .await?;
        Ok(row.get("max_index"))
    }

    async fn insert(&self, bucket: &StorageBucket) -> Result<StorageBucket> {
        let client = self.pool.get().await?;
        let sql = format!(
            r#"
            INSERT INTO storage_buckets
                (id, user_id, bucket_index, storage_path, file_count, total_size,
                 max_file_count, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            BUCKET_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let row = client
            .query_one(
                &stmt,
                &[
                    &bucket.id,
                    &bucket.user_id,
                    &bucket.bucket_index,
                    &bucket.storage_path,
                    &bucket.file_count,
                    &bucket.total_size,
                    &bucket.max_file_count,
                    &bucket.is_active,
                    &bucket.created_at,
                ],
            )
            .await?;
        Ok(StorageBucket::from(&row))
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<StorageBucket>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {} FROM storage_buckets WHERE user_id = $1 ORDER BY bucket_index ASC",
            BUCKET_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let rows = client.query(&stmt, &[&user_id]).await?;
        Ok(rows.iter().map(StorageBucket::from).collect())
    }

    async fn list_owners(&self) -> Result<Vec<Uuid>> {
        let client = self.pool.get().await?;
        let rows = client
            .query("SELECT DISTINCT user_id FROM storage_buckets", &[])
            .await?;
        Ok(rows.iter().map(|r| r.get("user_id")).collect())
    }

    async fn apply_usage_delta(
        &self,
        bucket_id: Uuid,
        file_delta: i32,
        byte_delta: i64,
    ) -> Result<Option<StorageBucket>> {
        let client = self.pool.get().await?;
        let sql = format!(
            r#"
            UPDATE storage_buckets
            SET file_count = GREATEST(file_count + $2, 0),
                total_size = GREATEST(total_size + $3, 0),
                is_active = GREATEST(file_count + $2, 0) < max_file_count
            WHERE id = $1
            RETURNING {}
            "#,
            BUCKET_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let row = client
            .query_opt(&stmt, &[&bucket_id, &file_delta, &byte_delta])
            .await?;
        Ok(row.as_ref().map(StorageBucket::from))
    }

    async fn set_usage(
        &self,
        bucket_id: Uuid,
        file_count: i32,
        total_size: i64,
    ) -> Result<Option<StorageBucket>> {
        let client = self.pool.get().await?;
        let sql = format!(
            r#"
            UPDATE storage_buckets
            SET file_count = GREATEST($2::INTEGER, 0),
                total_size = GREATEST($3::BIGINT, 0),
                is_active = GREATEST($2::INTEGER, 0) < max_file_count
            WHERE id = $1
            RETURNING {}
            "#,
            BUCKET_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let row = client
            .query_opt(&stmt, &[&bucket_id, &file_count, &total_size])
            .await?;
        Ok(row.as_ref().map(StorageBucket::from))
    }
}
