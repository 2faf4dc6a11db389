//! # localshare-node
//!
//! A localshare peer: the embedded HTTP server with the `/exchange`,
//! `/message`, `/download` and `/downloadInfo` endpoints, environment
//! configuration, and the [`Node`] that wires storage, discovery and
//! transfers together.

pub mod api;
pub mod config;
pub mod error;
pub mod node;

pub use config::NodeConfig;
pub use error::ServerError;
pub use node::Node;
