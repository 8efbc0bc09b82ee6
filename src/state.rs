use std::sync::Arc;
use crate::config::Config;
use crate::error::Result;
use crate::repositories::bucket::{BucketRepository, PgBucketRepository};
use crate::repositories::file::{FileRepository, PgFileRepository};
use crate::repositories::folder::{FolderRepository, PgFolderRepository};
use crate::repositories::memory::MemoryStore;
use crate::storage::{LocalObjectStore, MemoryObjectStore, ObjectStore};

/// The handles every operation runs against.
///
/// Passed explicitly into each service call; nothing in the crate reaches
/// for a global client.
#[derive(Clone)]
pub struct AppState {
    /// Logical folder rows.
    pub folders: Arc<dyn FolderRepository>,
    /// Physical storage bucket rows.
    pub buckets: Arc<dyn BucketRepository>,
    /// File rows.
    pub files: Arc<dyn FileRepository>,
    /// Where file bytes live.
    pub objects: Arc<dyn ObjectStore>,
    /// The application's configuration.
    pub config: Config,
}

impl AppState {
    /// Creates a new `AppState` backed by PostgreSQL and the local object store.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = crate::db::create_pool(&config.database_url, config.db_pool_max_size)?;
        crate::db::ensure_schema(&db).await?;
        tracing::info!("PostgreSQL pool initialized (max {} connections)", config.db_pool_max_size);

        let objects = LocalObjectStore::new(config.storage_root.clone());
        tracing::info!("Object store rooted at {}", config.storage_root.display());

        Ok(AppState {
            folders: Arc::new(PgFolderRepository::new(db.clone())),
            buckets: Arc::new(PgBucketRepository::new(db.clone())),
            files: Arc::new(PgFileRepository::new(db)),
            objects: Arc::new(objects),
            config: config.clone(),
        })
    }

    /// Creates an `AppState` whose repositories all share one `MemoryStore`.
    pub fn in_memory(config: Config, store: MemoryStore, objects: MemoryObjectStore) -> Self {
        AppState {
            folders: Arc::new(store.clone()),
            buckets: Arc::new(store.clone()),
            files: Arc::new(store),
            objects: Arc::new(objects),
            config,
        }
    }
}
