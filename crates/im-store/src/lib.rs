//! im-store: the embedded local database (§4.7).
//!
//! A single `rusqlite` connection behind a single-writer discipline (§5),
//! with dedup-merge persistence for messages, history pagination, substring
//! search, unread accounting, and seq bookkeeping for the Sync Engine.

pub mod config;
pub mod error;
pub mod model;
pub mod store;

pub use config::StoreConfig;
pub use error::StoreError;
pub use store::Store;
