//! Core of a personal media backup service.
//!
//! Users navigate a logical folder tree while uploaded bytes are spread over
//! capacity-bounded storage buckets. The services here keep the two in step
//! through create, rename, move and cascading delete.

pub mod config;
pub mod error;
pub mod state;
pub mod db;
pub mod storage;

pub mod models {
    pub mod bucket;
    pub mod file;
    pub mod folder;
}

pub mod repositories {
    pub mod bucket;
    pub mod file;
    pub mod folder;
    pub mod memory;
}

pub mod services {
    pub mod buckets;
    pub mod files;
    pub mod folders;
}

pub mod validation {
    pub mod folder;
}

pub use config::Config;
pub use error::{AppError, ErrorKind, Result};
pub use state::AppState;
