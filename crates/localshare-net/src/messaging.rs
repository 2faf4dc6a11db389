//! Outbound and inbound `/message` handling.

use std::path::Path;

use tracing::{debug, info};

use localshare_shared::constants::ROUTE_MESSAGE;
use localshare_shared::types::{MessageKind, MessageParams};
use localshare_store::{Device, DeviceMessage, Store};

use crate::error::NetError;
use crate::notifications::Notifications;

#[derive(Clone)]
pub struct Messenger {
    client: reqwest::Client,
    store: Store,
    notifications: Notifications,
    client_code: String,
}

impl Messenger {
    pub fn new(
        client: reqwest::Client,
        store: Store,
        notifications: Notifications,
        client_code: impl Into<String>,
    ) -> Self {
        Self {
            client,
            store,
            notifications,
            client_code: client_code.into(),
        }
    }

    /// Store a `send` message and notify `device` of it. The peer pulls any
    /// file later through `/downloadInfo` and `/download` with the returned
    /// message's id.
    pub async fn send(
        &self,
        device: &Device,
        content: Option<String>,
        file: Option<&Path>,
    ) -> Result<DeviceMessage, NetError> {
        if content.is_none() && file.is_none() {
            return Err(NetError::EmptyMessage);
        }
        let base = device
            .base_url()
            .ok_or_else(|| NetError::NoAddress(device.client_code.clone()))?;

        let mut message = DeviceMessage::new(MessageKind::Send, device.id);
        message.content = content;
        if let Some(path) = file {
            let meta = tokio::fs::metadata(path).await?;
            message.filename = path.file_name().map(|n| n.to_string_lossy().into_owned());
            message.filepath = Some(path.to_string_lossy().into_owned());
            message.size = Some(meta.len());
        }

        let message = self.store.save_message(message).await?;
        self.notifications.messages.publish(&message);

        let params = MessageParams {
            send_id: message.id.unwrap_or_default(),
            client_code: self.client_code.clone(),
            content: message.content.clone(),
            filename: message.filename.clone(),
            size: message.size,
        };
        self.client
            .post(format!("{base}{ROUTE_MESSAGE}"))
            .json(&params)
            .send()
            .await?
            .error_for_status()?;

        info!(
            peer = %device.client_code,
            message_id = ?message.id,
            file = ?message.filename,
            "Message sent"
        );
        Ok(message)
    }

    /// Store a message announced by a peer. The sender must have completed a
    /// handshake first.
    pub async fn receive(&self, params: MessageParams) -> Result<DeviceMessage, NetError> {
        let device = self
            .store
            .find_device_by_client_code(&params.client_code)
            .await?
            .ok_or_else(|| NetError::UnknownPeer(params.client_code.clone()))?;

        let mut message = DeviceMessage::new(MessageKind::Receive, device.id);
        message.opposite_id = Some(params.send_id);
        message.content = params.content;
        message.filename = params.filename;
        message.size = params.size;

        let message = self.store.save_message(message).await?;
        debug!(
            peer = %device.client_code,
            message_id = ?message.id,
            remote_id = params.send_id,
            "Message received"
        );
        self.notifications.messages.publish(&message);
        Ok(message)
    }
}
