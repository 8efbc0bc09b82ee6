use async_trait::async_trait;
use deadpool_postgres::Pool;
use uuid::Uuid;
use crate::{error::Result, models::folder::Folder};

/// Persistence for logical folders.
///
/// Implementations must enforce uniqueness of `(user_id, parent_id, name)` and
/// of the root per user, reporting violations as `AppError::UniqueViolation`.
#[async_trait]
pub trait FolderRepository: Send + Sync + 'static {
    /// Finds the user's root folder.
    async fn find_root(&self, user_id: Uuid) -> Result<Option<Folder>>;

    /// Finds a folder owned by `user_id`.
    async fn find_by_id(&self, user_id: Uuid, folder_id: Uuid) -> Result<Option<Folder>>;

    /// Finds the child of `parent_id` named exactly `name`.
    async fn find_child(&self, user_id: Uuid, parent_id: Uuid, name: &str) -> Result<Option<Folder>>;

    /// Lists the direct children of `parent_id`, ordered by name.
    async fn list_children(&self, user_id: Uuid, parent_id: Uuid) -> Result<Vec<Folder>>;

    /// Inserts a new folder.
    async fn insert(&self, folder: &Folder) -> Result<Folder>;

    /// Writes back name, parent, color and description.
    async fn update(&self, folder: &Folder) -> Result<Option<Folder>>;

    /// Deletes a folder row. Returns whether a row was removed.
    async fn delete(&self, user_id: Uuid, folder_id: Uuid) -> Result<bool>;
}

const FOLDER_COLUMNS: &str =
    "id, user_id, parent_id, name, depth, is_protected, color, description, created_at, updated_at";

/// PostgreSQL-backed `FolderRepository`.
#[derive(Clone)]
pub struct PgFolderRepository {
    pool: Pool,
}

impl PgFolderRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FolderRepository for PgFolderRepository {
    async fn find_root(&self, user_id: Uuid) -> Result<Option<Folder>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {} FROM folders WHERE user_id = $1 AND parent_id IS NULL",
            FOLDER_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let row = client.query_opt(&stmt, &[&user_id]).await?;
        Ok(row.as_ref().map(Folder::from))
    }

    async fn find_by_id(&self, user_id: Uuid, folder_id: Uuid) -> Result<Option<Folder>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {} FROM folders WHERE id = $1 AND user_id = $2",
            FOLDER_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let row = client.query_opt(&stmt, &[&folder_id, &user_id]).await?;
        Ok(row.as_ref().map(Folder::from))
    }

    async fn find_child(&self, user_id: Uuid, parent_id: Uuid, name: &str) -> Result<Option<Folder>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {} FROM folders WHERE user_id = $1 AND parent_id = $2 AND name = $3",
            FOLDER_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let row = client.query_opt(&stmt, &[&user_id, &parent_id, &name]).await?;
        Ok(row.as_ref().map(Folder::from))
    }

    async fn list_children(&self, user_id: Uuid, parent_id: Uuid) -> Result<Vec<Folder>> {
        let client = self.pool.get().await?;
        let sql = format!(
            "SELECT {} FROM folders WHERE user_id = $1 AND parent_id = $2 ORDER BY name ASC",
            FOLDER_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let rows = client.query(&stmt, &[&user_id, &parent_id]).await?;
        Ok(rows.iter().map(Folder::from).collect())
    }

    async fn insert(&self, folder: &Folder) -> Result<Folder> {
        let client = self.pool.get().await?;
        let sql = format!(
            r#"
            INSERT INTO folders
                (id, user_id, parent_id, name, depth, is_protected, color, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            FOLDER_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let row = client
            .query_one(
                &stmt,
                &[
                    &folder.id,
                    &folder.user_id,
                    &folder.parent_id,
                    &folder.name,
                    &folder.depth,
                    &folder.is_protected,
                    &folder.color,
                    &folder.description,
                    &folder.created_at,
                    &folder.updated_at,
                ],
            )
            .await?;
        Ok(Folder::from(&row))
    }

    async fn update(&self, folder: &Folder) -> Result<Option<Folder>> {
        let client = self.pool.get().await?;
        let sql = format!(
            r#"
            UPDATE folders
            SET name = $3, parent_id = $4, color = $5, description = $6, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            FOLDER_COLUMNS
        );
        let stmt = client.prepare_cached(&sql).await?;
        let row = client
            .query_opt(
                &stmt,
                &[
                    &folder.id,
                    &folder.user_id,
                    &folder.name,
                    &folder.parent_id,
                    &folder.color,
                    &folder.description,
                ],
            )
            .await?;
        Ok(row.as_ref().map(Folder::from))
    }

    async fn delete(&self, user_id: Uuid, folder_id: Uuid) -> Result<bool> {
        let client = self.pool.get().await?;
        let affected = client
            .execute(
                "DELETE FROM folders WHERE id = $1 AND user_id = $2",
                &[&folder_id, &user_id],
            )
            .await?;
        Ok(affected > 0)
    }
}
