/// Application name
pub const APP_NAME: &str = "localshare";

/// mDNS service type every peer registers and browses
pub const SERVICE_TYPE: &str = "_share._tcp.local.";

/// Value of `channelType` in our own descriptor
pub const CHANNEL_TYPE_DESKTOP: &str = "desktop";

/// Default HTTP port of the embedded server
pub const DEFAULT_HTTP_PORT: u16 = 20000;

/// Default chunk size for ranged downloads (10 MiB)
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Default number of concurrent chunk workers per transfer
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 10;

/// Minimum spacing between two progress notifications for one message (ms)
pub const PROGRESS_INTERVAL_MS: u64 = 200;

/// Handshake timeouts (LAN, so short)
pub const HANDSHAKE_CONNECT_TIMEOUT_SECS: u64 = 3;
pub const HANDSHAKE_REQUEST_TIMEOUT_SECS: u64 = 5;

/// Connect timeout for metadata and chunk requests. Chunk bodies have no
/// overall request timeout.
pub const TRANSFER_CONNECT_TIMEOUT_SECS: u64 = 5;

/// `sys_info` keys
pub const SYS_CLIENT_ID: &str = "client_id";
pub const SYS_CHUNK_SIZE: &str = "chunk_size";
pub const SYS_DOWNLOAD_CONCURRENCY: &str = "download_concurrency";

/// HTTP routes served by every peer
pub const ROUTE_EXCHANGE: &str = "/exchange";
pub const ROUTE_MESSAGE: &str = "/message";
pub const ROUTE_DOWNLOAD: &str = "/download";
pub const ROUTE_DOWNLOAD_INFO: &str = "/downloadInfo";
