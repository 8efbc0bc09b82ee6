use std::env;
use std::path::PathBuf;
use anyhow::{Context, Result};

/// Capacity given to new storage buckets when none is configured.
pub const DEFAULT_BUCKET_MAX_FILE_COUNT: i32 = 1000;

/// The application's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The directory the local object store writes under.
    pub storage_root: PathBuf,
    /// The maximum number of files a newly allocated storage bucket holds.
    pub bucket_max_file_count: i32,
    /// The maximum size of the database connection pool.
    pub db_pool_max_size: usize,
    /// How often bucket accounting is reconciled, in seconds.
    pub reconcile_interval_secs: u64,
}

impl Config {
    /// Creates a `Config` with defaults for everything but the database URL.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            storage_root: PathBuf::from("uploads"),
            bucket_max_file_count: DEFAULT_BUCKET_MAX_FILE_COUNT,
            db_pool_max_size: 16,
            reconcile_interval_secs: 3600,
        }
    }

    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let bucket_max_file_count: i32 = env::var("BUCKET_MAX_FILE_COUNT")
            .unwrap_or_else(|_| DEFAULT_BUCKET_MAX_FILE_COUNT.to_string())
            .parse()
            .context("Invalid BUCKET_MAX_FILE_COUNT")?;

        if bucket_max_file_count < 1 {
            anyhow::bail!("BUCKET_MAX_FILE_COUNT must be at least 1");
        }

        let reconcile_interval_secs: u64 = env::var("RECONCILE_INTERVAL_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .context("Invalid RECONCILE_INTERVAL_SECS")?;

        if reconcile_interval_secs == 0 {
            anyhow::bail!("RECONCILE_INTERVAL_SECS must be at least 1");
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            storage_root: env::var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            bucket_max_file_count,
            db_pool_max_size: env::var("DB_POOL_MAX_SIZE")
                .unwrap_or_else(|_| "16".to_string())
                .parse()
                .context("Invalid DB_POOL_MAX_SIZE")?,
            reconcile_interval_secs,
        })
    }
}
