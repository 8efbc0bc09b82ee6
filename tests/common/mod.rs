#![allow(dead_code)]

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use uuid::Uuid;

use mediabox::models::file::{FileRecord, UploadDescriptor};
use mediabox::repositories::memory::MemoryStore;
use mediabox::services::files as file_service;
use mediabox::storage::MemoryObjectStore;
use mediabox::{AppState, Config};

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".into()),
        ))
        .with_test_writer()
        .try_init();
});

// Shared test context
pub struct TestContext {
    pub state: AppState,
    pub store: MemoryStore,
    pub objects: MemoryObjectStore,
    pub user_id: Uuid,
}

impl TestContext {
    pub fn new() -> Self {
        Self::build(Config::new("memory://"), MemoryObjectStore::new())
    }

    pub fn with_bucket_capacity(max_file_count: i32) -> Self {
        let mut config = Config::new("memory://");
        config.bucket_max_file_count = max_file_count;
        Self::build(config, MemoryObjectStore::new())
    }

    pub fn with_objects(objects: MemoryObjectStore) -> Self {
        Self::build(Config::new("memory://"), objects)
    }

    fn build(config: Config, objects: MemoryObjectStore) -> Self {
        Lazy::force(&TRACING);
        let store = MemoryStore::new();
        let state = AppState::in_memory(config, store.clone(), objects.clone());
        Self {
            state,
            store,
            objects,
            user_id: Uuid::new_v4(),
        }
    }
}

pub fn upload(filename: &str, file_size: i64, mime_type: &str) -> UploadDescriptor {
    UploadDescriptor {
        filename: filename.to_string(),
        file_size,
        mime_type: mime_type.to_string(),
        file_path: format!("originals/{}/{}", Uuid::new_v4(), filename),
        thumbnail_path: None,
        thumbnail_size: None,
        media_created_at: None,
    }
}

pub fn upload_taken_at(filename: &str, taken_at: Option<DateTime<Utc>>) -> UploadDescriptor {
    let mut descriptor = upload(filename, 100, "image/jpeg");
    descriptor.media_created_at = taken_at;
    descriptor
}

/// Runs the full upload placement: build the record, persist it, count it.
pub async fn place(
    ctx: &TestContext,
    descriptor: &UploadDescriptor,
    folder_id: Option<Uuid>,
) -> FileRecord {
    let record = file_service::create_file_record(&ctx.state, ctx.user_id, descriptor, folder_id)
        .await
        .unwrap();
    file_service::persist_file_record(&ctx.state, &record).await.unwrap()
}
