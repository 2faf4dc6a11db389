//! Application root: owns the store, the notification hubs and every
//! network component, and wires them to the HTTP server and discovery.

use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use localshare_net::client::{handshake_client, transfer_client};
use localshare_net::{
    detect_local_ip, spawn_discovery, DiscoveryHandle, Handshaker, Messenger, Notifications,
    TransferEngine,
};
use localshare_shared::constants::CHANNEL_TYPE_DESKTOP;
use localshare_shared::types::DeviceDescriptor;
use localshare_store::{Database, DeviceMessage, Store};

use crate::api::{build_router, AppState};
use crate::config::NodeConfig;

pub struct Node {
    pub store: Store,
    pub notifications: Notifications,
    pub handshaker: Handshaker,
    pub messenger: Messenger,
    pub transfers: TransferEngine,
    local_addr: SocketAddr,
    server: JoinHandle<()>,
    discovery: Option<DiscoveryHandle>,
}

impl Node {
    /// Open the store, bind the HTTP server and, if enabled, start mDNS.
    pub async fn start(config: &NodeConfig) -> anyhow::Result<Self> {
        let store = match &config.db_path {
            Some(path) => Store::open(path)?,
            None => Store::new(Database::new()?),
        };
        let client_code = store.client_code().await?;

        let listener = TcpListener::bind(config.http_addr)
            .await
            .with_context(|| format!("binding {}", config.http_addr))?;
        let local_addr = listener.local_addr()?;

        let ip = config.advertise_ip.unwrap_or_else(detect_local_ip);
        let local = DeviceDescriptor {
            client_code: client_code.clone(),
            name: Some(config.device_name.clone()),
            ip: Some(ip.to_string()),
            port: Some(local_addr.port()),
            channel_type: Some(CHANNEL_TYPE_DESKTOP.to_string()),
            os_name: Some(std::env::consts::OS.to_string()),
            ..Default::default()
        };

        let notifications = Notifications::new();
        let handshaker = Handshaker::new(
            handshake_client()?,
            store.clone(),
            notifications.clone(),
            local,
        );
        let messenger = Messenger::new(
            handshake_client()?,
            store.clone(),
            notifications.clone(),
            client_code.clone(),
        );
        let transfers = TransferEngine::new(
            store.clone(),
            transfer_client()?,
            notifications.clone(),
            config.download_dir.clone(),
        );

        let app = build_router(AppState {
            store: store.clone(),
            handshaker: handshaker.clone(),
            messenger: messenger.clone(),
            transfers: transfers.clone(),
        });
        let server = tokio::spawn(async move {
            let service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, service).await {
                error!(error = %e, "HTTP server failed");
            }
        });
        info!(addr = %local_addr, client_code = %client_code, "HTTP server listening");

        let discovery = if config.discovery {
            match spawn_discovery(&client_code, ip, local_addr.port(), handshaker.clone()) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    warn!(error = %e, "mDNS unavailable, continuing without discovery");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            store,
            notifications,
            handshaker,
            messenger,
            transfers,
            local_addr,
            server,
            discovery,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn descriptor(&self) -> &DeviceDescriptor {
        self.handshaker.local_descriptor()
    }

    /// Send text and/or a file to the known device `device_id`.
    pub async fn send(
        &self,
        device_id: i64,
        content: Option<String>,
        file: Option<&Path>,
    ) -> anyhow::Result<DeviceMessage> {
        let device = self.store.device(device_id).await?;
        Ok(self.messenger.send(&device, content, file).await?)
    }

    pub async fn shutdown(self) {
        if let Some(discovery) = self.discovery {
            discovery.shutdown();
        }
        self.server.abort();
        let _ = self.server.await;
        self.store.close();
        info!("Node stopped");
    }
}
