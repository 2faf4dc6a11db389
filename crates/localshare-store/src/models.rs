//! Domain model structs persisted in the local SQLite database.
//!
//! `id: None` means "not stored yet"; saving such a value inserts a row and
//! returns the value with its new id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use localshare_shared::types::{DeviceDescriptor, MessageKind};

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// A known peer. Identity is the client code, never the address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Device {
    pub id: Option<i64>,
    /// Stable per-install identifier; unique across rows.
    pub client_code: String,
    pub name: Option<String>,
    pub ip: Option<String>,
    pub port: Option<u16>,
    pub channel_type: Option<String>,
    pub os_name: Option<String>,
    pub network_type: Option<String>,
    pub wifi_name: Option<String>,
}

impl Device {
    /// Unsaved device built from a handshake descriptor.
    pub fn from_descriptor(desc: &DeviceDescriptor) -> Self {
        let mut device = Self {
            id: None,
            client_code: desc.client_code.clone(),
            name: None,
            ip: None,
            port: None,
            channel_type: None,
            os_name: None,
            network_type: None,
            wifi_name: None,
        };
        device.apply_descriptor(desc);
        device
    }

    /// Overwrite every descriptor-provided field, keeping `id`.
    pub fn apply_descriptor(&mut self, desc: &DeviceDescriptor) {
        self.client_code = desc.client_code.clone();
        self.name = desc.name.clone();
        self.ip = desc.ip.clone();
        self.port = desc.port;
        self.channel_type = desc.channel_type.clone();
        self.os_name = desc.os_name.clone();
        self.network_type = desc.network_type.clone();
        self.wifi_name = desc.wifi_name.clone();
    }

    pub fn to_descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            client_code: self.client_code.clone(),
            name: self.name.clone(),
            ip: self.ip.clone(),
            port: self.port,
            channel_type: self.channel_type.clone(),
            os_name: self.os_name.clone(),
            network_type: self.network_type.clone(),
            wifi_name: self.wifi_name.clone(),
        }
    }

    /// `http://ip:port` if both are known.
    pub fn base_url(&self) -> Option<String> {
        match (&self.ip, self.port) {
            (Some(ip), Some(port)) if !ip.is_empty() => Some(format!("http://{ip}:{port}")),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceMessage
// ---------------------------------------------------------------------------

/// Text and/or a file exchanged with a peer, plus the transfer status of
/// that file on the receiving side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceMessage {
    pub id: Option<i64>,
    pub created_time: DateTime<Utc>,
    pub device_id: Option<i64>,
    /// Id of the same message in the peer's database. For received messages
    /// this is the `messageId` used against the peer's download endpoints.
    pub opposite_id: Option<i64>,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub filename: Option<String>,
    /// Local source file of a sent message.
    pub filepath: Option<String>,
    /// Total file size in bytes.
    pub size: Option<u64>,
    /// Content hash of the remote file seen by the last transfer attempt.
    pub file_hash: Option<String>,
    pub download_success: bool,
    pub download_size: u64,
    pub save_path: Option<String>,
}

impl DeviceMessage {
    /// Unsaved message with no transfer state.
    pub fn new(kind: MessageKind, device_id: Option<i64>) -> Self {
        Self {
            id: None,
            created_time: Utc::now(),
            device_id,
            opposite_id: None,
            kind,
            content: None,
            filename: None,
            filepath: None,
            size: None,
            file_hash: None,
            download_success: false,
            download_size: 0,
            save_path: None,
        }
    }

    pub fn has_file(&self) -> bool {
        self.filename.is_some()
    }
}

// ---------------------------------------------------------------------------
// FilePart
// ---------------------------------------------------------------------------

/// One durably written byte range `[start, end]` (inclusive) of the file
/// behind `device_message_id`, valid only while the remote hash equals
/// `file_hash`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilePart {
    pub id: Option<i64>,
    pub device_message_id: i64,
    pub file_hash: String,
    pub start: u64,
    pub end: u64,
}

impl FilePart {
    pub fn new(device_message_id: i64, file_hash: impl Into<String>, start: u64, end: u64) -> Self {
        Self {
            id: None,
            device_message_id,
            file_hash: file_hash.into(),
            start,
            end,
        }
    }

    pub fn byte_len(&self) -> u64 {
        self.end - self.start + 1
    }
}

// ---------------------------------------------------------------------------
// SysInfo
// ---------------------------------------------------------------------------

/// A name/value setting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SysInfo {
    pub id: Option<i64>,
    pub name: String,
    pub value: Option<String>,
}

// ---------------------------------------------------------------------------
// TransferSettings
// ---------------------------------------------------------------------------

/// Tunables read from `sys_info` at the start of every transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    pub chunk_size: u64,
    pub concurrency: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            chunk_size: localshare_shared::constants::DEFAULT_CHUNK_SIZE,
            concurrency: localshare_shared::constants::DEFAULT_DOWNLOAD_CONCURRENCY,
        }
    }
}
