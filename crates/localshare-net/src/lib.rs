//! LAN networking for localshare: mDNS announce/browse, the `/exchange`
//! handshake, outbound messages and the chunked download engine.
//!
//! Components are plain structs owned by the application root and handed
//! the [`Store`](localshare_store::Store) and [`Notifications`] they need.

pub mod client;
pub mod discovery;
pub mod error;
pub mod handshake;
pub mod messaging;
pub mod notifications;
pub mod transfer;

pub use discovery::{detect_local_ip, spawn_discovery, DiscoveryHandle, PeerPhase, PeerTable};
pub use error::{NetError, TransferError};
pub use handshake::Handshaker;
pub use messaging::Messenger;
pub use notifications::{Notifications, TransferEvent};
pub use transfer::{TransferEngine, TransferOutcome};
