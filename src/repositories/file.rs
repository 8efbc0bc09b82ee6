use async_trait::async_trait;
use deadpool_postgres::Pool;
use uuid::Uuid;
use crate::error::Result;
use crate::models::bucket::BucketUsage;
use crate::models::file::{FileListQuery, FileRecord, UploadStatus};

/// Persistence for file records.
#[async_trait]
pub trait FileRepository: Send + Sync + 'static {
    async fn insert(&self, file: &FileRecord) -> Result<FileRecord>;

    /// Finds a file owned by `user_id`.
    async fn find_by_id(&self, user_id: Uuid, file_id: Uuid) -> Result<Option<FileRecord>>;

    /// Every file the user keeps in `folder_id`, regardless of status.
    async fn list_in_folder(&self, user_id: Uuid, folder_id: Uuid) -> Result<Vec<FileRecord>>;

    /// A page of completed files in `folder_id`, newest capture first.
    async fn list_page(
        &self,
        user_id: Uuid,
        folder_id: Uuid,
        query: &FileListQuery,
    ) -> Result<Vec<FileRecord>>;

    /// Points the file at another logical folder. Returns whether a row changed.
    async fn update_folder(&self, user_id: Uuid, file_id: Uuid, folder_id: Uuid) -> Result<bool>;

    /// Deletes the given files and returns the rows actually removed.
    async fn delete_by_ids(&self, user_id: Uuid, file_ids: &[Uuid]) -> Result<Vec<FileRecord>>;

    /// `(file_count, total_bytes)` of the files in `folder_id`.
    async fn folder_totals(&self, user_id: Uuid, folder_id: Uuid) -> Result<(i64, i64)>;

    /// Per-bucket usage recomputed from the user's file rows.
    async fn usage_by_bucket(&self, user_id: Uuid) -> Result<Vec<BucketUsage>>;
}

const FILE_COLUMNS: &str = "id, user_id, folder_id, storage_bucket_id, original_filename, \
     display_filename, file_path, file_size, mime_type, category, thumbnail_path, thumbnail_size, \
     upload_status, is_starred, media_created_at, created_at";

/// PostgreSQL-backed `FileRepository`.
#[derive(Clone)]
pub struct PgFileRepository {
    pool: Pool,
}

impl PgFileRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    async fn insert(&self, file: &FileRecord) -> Result<FileRecord> {
        let client = self.pool.get().await?;
        let sql = format!(
            r#"
            INSERT INTO files (
                id, user_id, folder_id, storage_bucket_id, original_filename,
                display_filename, file_path, file_size, mime_type, category,
                thumbnail_path, thumbnail_size, upload_status, is_starred,
                media_created_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {}
            "#,
            FILE_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let row = client
            .query_one(
                &stmt,
                &[
                    &file.id,
                    &file.user_id,
                    &file.folder_id,
                    &file.storage_bucket_id,
                    &file.original_filename,
                    &file.display_filename,
                    &file.file_path,
                    &file.file_size,
                    &file.mime_type,
                    &file.category,
                    &file.thumbnail_path,
                    &file.thumbnail_size,
                    &file.upload_status,
                    &file.is_starred,
                    &file.media_created_at,
                    &file.created_at,
                ],
            )
            .await?;
        Ok(FileRecord::from(&row))
    }

    async fn find_by_id(&self, user_id: Uuid, file_id: Uuid) -> Result<Option<FileRecord>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {} FROM files WHERE id = $1 AND user_id = $2",
            FILE_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let row = client.query_opt(&stmt, &[&file_id, &user_id]).await?;
        Ok(row.as_ref().map(FileRecord::from))
    }

    async fn list_in_folder(&self, user_id: Uuid, folder_id: Uuid) -> Result<Vec<FileRecord>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {} FROM files WHERE user_id = $1 AND folder_id = $2",
            FILE_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let rows = client.query(&stmt, &[&user_id, &folder_id]).await?;
        Ok(rows.iter().map(FileRecord::from).collect())
    }

    async fn list_page(
        &self,
        user_id: Uuid,
        folder_id: Uuid,
        query: &FileListQuery,
    ) -> Result<Vec<FileRecord>> {
        let client = self.pool.get().await?;
        let sql = format!(
            r#"
            SELECT {} FROM files
            WHERE user_id = $1 AND folder_id = $2 AND upload_status = $3
              AND ($4::file_category IS NULL OR category = $4)
            ORDER BY media_created_at DESC NULLS LAST, original_filename ASC, created_at DESC
            LIMIT $5 OFFSET $6
            "#,
            FILE_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let rows = client
            .query(
                &stmt,
                &[
                    &user_id,
                    &folder_id,
                    &UploadStatus::Completed,
                    &query.category,
                    &query.limit,
                    &query.offset,
                ],
            )
            .await?;
        Ok(rows.iter().map(FileRecord::from).collect())
    }

    async fn update_folder(&self, user_id: Uuid, file_id: Uuid, folder_id: Uuid) -> Result<bool> {
        let client = self.pool.get().await?;
        let affected = client
            .execute(
                "UPDATE files SET folder_id = $3 WHERE id = $1 AND user_id = $2",
                &[&file_id, &user_id, &folder_id],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn delete_by_ids(&self, user_id: Uuid, file_ids: &[Uuid]) -> Result<Vec<FileRecord>> {
        if file_ids.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.pool.get().await?;
        let sql = format!(
            "DELETE FROM files WHERE user_id = $1 AND id = ANY($2) RETURNING {}",
            FILE_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let rows = client.query(&stmt, &[&user_id, &file_ids]).await?;
        Ok(rows.iter().map(FileRecord::from).collect())
    }

    async fn folder_totals(&self, user_id: Uuid, folder_id: Uuid) -> Result<(i64, i64)> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                SELECT COUNT(*)::BIGINT AS file_count,
                       COALESCE(SUM(file_size), 0)::BIGINT AS total_size
                FROM files
                WHERE user_id = $1 AND folder_id = $2
                "#,
                &[&user_id, &folder_id],
            )
            .await?;
        Ok((row.get("file_count"), row.get("total_size")))
    }

    async fn usage_by_bucket(&self, user_id: Uuid) -> Result<Vec<BucketUsage>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT storage_bucket_id,
                       COUNT(*)::BIGINT AS file_count,
                       COALESCE(SUM(file_size), 0)::BIGINT AS total_size
                FROM files
                WHERE user_id = $1
                GROUP BY storage_bucket_id
                "#,
                &[&user_id],
            )
            .await?;
        Ok(rows
            .iter()
            .map(|r| BucketUsage {
                bucket_id: r.get("storage_bucket_id"),
                file_count: r.get("file_count"),
                total_size: r.get("total_size"),
            })
            .collect())
    }
}
