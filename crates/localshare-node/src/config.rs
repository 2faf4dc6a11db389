//! Node configuration loaded from environment variables.
//!
//! Every setting has a default, so a node starts with zero configuration.
//! Transfer tunables are not here: they live in `sys_info`.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use directories::UserDirs;

use localshare_shared::constants::{APP_NAME, DEFAULT_HTTP_PORT};

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address of the embedded HTTP server. Port 0 picks a free port.
    /// Env: `LOCALSHARE_HTTP_ADDR`
    /// Default: `0.0.0.0:20000`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `LOCALSHARE_DB_PATH`
    /// Default: platform data directory
    pub db_path: Option<PathBuf>,

    /// Where received files are written.
    /// Env: `LOCALSHARE_DOWNLOAD_DIR`
    /// Default: the user's Downloads directory
    pub download_dir: PathBuf,

    /// Display name sent in handshakes.
    /// Env: `LOCALSHARE_DEVICE_NAME`
    pub device_name: String,

    /// IP placed in our own descriptor and mDNS record.
    /// Env: `LOCALSHARE_ADVERTISE_IP`
    /// Default: detected outbound IPv4
    pub advertise_ip: Option<IpAddr>,

    /// Announce and browse over mDNS.
    /// Env: `LOCALSHARE_DISCOVERY` (true/false)
    pub discovery: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            db_path: None,
            download_dir: default_download_dir(),
            device_name: default_device_name(),
            advertise_ip: None,
            discovery: true,
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("LOCALSHARE_HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid LOCALSHARE_HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = var("LOCALSHARE_DB_PATH").filter(|p| !p.is_empty()) {
            config.db_path = Some(PathBuf::from(path));
        }

        if let Some(dir) = var("LOCALSHARE_DOWNLOAD_DIR").filter(|d| !d.is_empty()) {
            config.download_dir = PathBuf::from(dir);
        }

        if let Some(name) = var("LOCALSHARE_DEVICE_NAME").filter(|n| !n.trim().is_empty()) {
            config.device_name = name;
        }

        if let Some(ip) = var("LOCALSHARE_ADVERTISE_IP") {
            match ip.parse::<IpAddr>() {
                Ok(parsed) => config.advertise_ip = Some(parsed),
                Err(_) => tracing::warn!(value = %ip, "Invalid LOCALSHARE_ADVERTISE_IP, detecting instead"),
            }
        }

        if let Some(val) = var("LOCALSHARE_DISCOVERY") {
            config.discovery = val != "false" && val != "0";
        }

        config
    }
}

fn default_download_dir() -> PathBuf {
    UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("./downloads"))
}

fn default_device_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .ok()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| APP_NAME.to_string())
}
