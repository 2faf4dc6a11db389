//! Types and helpers shared by every localshare crate: the JSON bodies two
//! peers exchange over HTTP, protocol constants, whole-file content hashing,
//! and the in-process notification [`Hub`](events::Hub).

pub mod constants;
pub mod error;
pub mod events;
pub mod hash;
pub mod types;

pub use error::SharedError;
pub use events::{Hub, Subscription};
