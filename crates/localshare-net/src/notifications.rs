use std::path::PathBuf;

use localshare_shared::Hub;
use localshare_store::{Device, DeviceMessage};

/// Download lifecycle events, keyed by local message id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    Progress {
        message_id: i64,
        handled: u64,
        total: u64,
    },
    Completed {
        message_id: i64,
        save_path: PathBuf,
    },
    Failed {
        message_id: i64,
        reason: String,
    },
}

impl TransferEvent {
    pub fn message_id(&self) -> i64 {
        match self {
            TransferEvent::Progress { message_id, .. }
            | TransferEvent::Completed { message_id, .. }
            | TransferEvent::Failed { message_id, .. } => *message_id,
        }
    }
}

/// The hubs observers subscribe to. Cloning shares the same hubs.
#[derive(Clone)]
pub struct Notifications {
    /// A device row was created or refreshed.
    pub peers: Hub<Device>,
    /// A message was stored or its transfer state changed.
    pub messages: Hub<DeviceMessage>,
    pub progress: Hub<TransferEvent>,
}

impl Notifications {
    pub fn new() -> Self {
        Self {
            peers: Hub::new("peers"),
            messages: Hub::new("messages"),
            progress: Hub::new("progress"),
        }
    }
}

impl Default for Notifications {
    fn default() -> Self {
        Self::new()
    }
}
