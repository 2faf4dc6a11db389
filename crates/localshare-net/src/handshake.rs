//! The `/exchange` handshake.
//!
//! Both directions end the same way: the other side's descriptor is upserted
//! by client code and the peers hub fires. The initiator learns the peer
//! from the response body, the responder from the request body, so one round
//! trip registers both devices with each other.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info};

use localshare_shared::constants::ROUTE_EXCHANGE;
use localshare_shared::types::DeviceDescriptor;
use localshare_store::{Device, Store};

use crate::error::NetError;
use crate::notifications::Notifications;

#[derive(Clone)]
pub struct Handshaker {
    client: reqwest::Client,
    store: Store,
    notifications: Notifications,
    local: Arc<DeviceDescriptor>,
}

impl Handshaker {
    pub fn new(
        client: reqwest::Client,
        store: Store,
        notifications: Notifications,
        local: DeviceDescriptor,
    ) -> Self {
        Self {
            client,
            store,
            notifications,
            local: Arc::new(local),
        }
    }

    /// This device's descriptor, as sent in every handshake.
    pub fn local_descriptor(&self) -> &DeviceDescriptor {
        &self.local
    }

    /// Send our descriptor to the peer at `addr` and record the one it
    /// answers with.
    pub async fn exchange(&self, addr: SocketAddr) -> Result<Device, NetError> {
        let url = format!("http://{addr}{ROUTE_EXCHANGE}");
        debug!(url = %url, "Sending handshake");

        let response = self
            .client
            .post(&url)
            .json(self.local.as_ref())
            .send()
            .await?
            .error_for_status()?;
        let mut remote: DeviceDescriptor = response.json().await?;

        // The address we actually reached wins over a blank self-report.
        if remote.ip.as_deref().map_or(true, str::is_empty) {
            remote.ip = Some(addr.ip().to_string());
        }
        if remote.port.is_none() {
            remote.port = Some(addr.port());
        }

        let device = self.record(remote).await?;
        info!(peer = %device.client_code, addr = %addr, "Handshake complete");
        Ok(device)
    }

    /// Inbound side: record `remote` and return our own descriptor for the
    /// response body. `source` fills in a missing ip.
    pub async fn accept(
        &self,
        mut remote: DeviceDescriptor,
        source: Option<SocketAddr>,
    ) -> Result<DeviceDescriptor, NetError> {
        if let Some(source) = source {
            if remote.ip.as_deref().map_or(true, str::is_empty) {
                remote.ip = Some(source.ip().to_string());
            }
        }

        let device = self.record(remote).await?;
        info!(peer = %device.client_code, ip = ?device.ip, "Accepted handshake");
        Ok(self.local.as_ref().clone())
    }

    async fn record(&self, remote: DeviceDescriptor) -> Result<Device, NetError> {
        remote.validate()?;
        let device = self.store.upsert_device(remote).await?;
        self.notifications.peers.publish(&device);
        Ok(device)
    }
}
