//! # localshare-store
//!
//! Local SQLite storage for peers, messages, per-chunk download checkpoints
//! and small settings.
//!
//! [`Database`] is the synchronous `rusqlite` wrapper with hand-written row
//! mappings for each table. [`Store`] is the async handle the rest of the
//! application uses: every call is funnelled through a [`PersistenceQueue`]
//! so that only one transaction is ever active, while calls made from inside
//! a running queue job execute inline.

pub mod database;
pub mod devices;
pub mod file_parts;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod queue;
pub mod store;
pub mod sys_info;

mod error;

pub use database::Database;
pub use error::{QueueError, Result, StoreError};
pub use models::*;
pub use queue::PersistenceQueue;
pub use store::Store;
