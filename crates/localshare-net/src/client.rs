//! Preconfigured HTTP clients.
//!
//! Handshakes are LAN round trips and get short timeouts. Transfer clients
//! bound only the connect phase so large chunk bodies can take their time.

use std::time::Duration;

use localshare_shared::constants::{
    APP_NAME, HANDSHAKE_CONNECT_TIMEOUT_SECS, HANDSHAKE_REQUEST_TIMEOUT_SECS,
    TRANSFER_CONNECT_TIMEOUT_SECS,
};

fn user_agent() -> String {
    format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION"))
}

pub fn handshake_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent())
        .connect_timeout(Duration::from_secs(HANDSHAKE_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(HANDSHAKE_REQUEST_TIMEOUT_SECS))
        .build()
}

pub fn transfer_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(user_agent())
        .connect_timeout(Duration::from_secs(TRANSFER_CONNECT_TIMEOUT_SECS))
        .build()
}
