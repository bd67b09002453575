//! # crewchat-store
//!
//! Local storage for the CrewChat client. Chats and per-chat message lists
//! are JSON files in a single data area, written atomically. The crate also
//! owns first-run seeding of the default chat and the image attachment
//! store.

pub mod images;
pub mod models;
pub mod seed;
pub mod storage;

mod error;

pub use error::{Result, StoreError};
pub use images::{ImageStore, SavedImage};
pub use models::*;
pub use seed::{SeedLoader, SeedSource, SeedStatusStore};
pub use storage::{FileStore, StorageBackend};
