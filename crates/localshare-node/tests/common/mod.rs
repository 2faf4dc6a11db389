#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use localshare_node::{Node, NodeConfig};
use localshare_shared::types::{DeviceDescriptor, DownloadInfo, MessageParams};

pub async fn start_node(dir: &Path, name: &str) -> Node {
    let config = NodeConfig {
        http_addr: "127.0.0.1:0".parse().unwrap(),
        db_path: Some(dir.join(format!("{name}.db"))),
        download_dir: dir.join(format!("{name}-downloads")),
        device_name: name.to_string(),
        advertise_ip: Some("127.0.0.1".parse().unwrap()),
        discovery: false,
    };
    Node::start(&config).await.expect("node should start")
}

pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| ((i as u64 * 31 + seed as u64) % 251) as u8)
        .collect()
}

pub fn blake3_hex(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

pub async fn wait_until<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Behaviour knobs of a [`FakePeer`].
#[derive(Default)]
pub struct FakeState {
    pub data: Vec<u8>,
    /// Hash reported by `/downloadInfo` instead of the real one.
    pub advertised_hash: Option<String>,
    /// Answer `/downloadInfo` with this status.
    pub info_status: Option<StatusCode>,
    /// Fail ranges starting at or after this offset with 500.
    pub fail_from: Option<u64>,
    /// Send only half of every requested range.
    pub truncate: bool,
    pub delay: Option<Duration>,
    /// Every range requested from `/download`, in arrival order.
    pub ranges: Vec<(u64, u64)>,
}

/// A sender that serves one file under any message id, with configurable
/// misbehaviour.
pub struct FakePeer {
    pub addr: SocketAddr,
    pub state: Arc<Mutex<FakeState>>,
}

impl FakePeer {
    pub async fn spawn(data: Vec<u8>) -> Self {
        let state = Arc::new(Mutex::new(FakeState {
            data,
            ..Default::default()
        }));
        let app = Router::new()
            .route("/downloadInfo", get(fake_info))
            .route("/download", get(fake_download))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn with(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn take_ranges(&self) -> Vec<(u64, u64)> {
        let mut ranges = std::mem::take(&mut self.state.lock().unwrap().ranges);
        ranges.sort();
        ranges
    }

    pub fn hash(&self) -> String {
        blake3_hex(&self.state.lock().unwrap().data)
    }

    /// Register this peer on `node` and store a received message announcing
    /// `filename`. Returns the local message id.
    pub async fn announce_to(&self, node: &Node, filename: &str) -> i64 {
        node.store
            .upsert_device(DeviceDescriptor {
                client_code: "fake-peer".into(),
                ip: Some(self.addr.ip().to_string()),
                port: Some(self.addr.port()),
                ..Default::default()
            })
            .await
            .unwrap();
        let size = self.state.lock().unwrap().data.len() as u64;
        node.messenger
            .receive(MessageParams {
                send_id: 1,
                client_code: "fake-peer".into(),
                content: None,
                filename: Some(filename.into()),
                size: Some(size),
            })
            .await
            .unwrap()
            .id
            .unwrap()
    }
}

async fn fake_info(State(state): State<Arc<Mutex<FakeState>>>) -> Response {
    let state = state.lock().unwrap();
    if let Some(status) = state.info_status {
        return status.into_response();
    }
    let hash = state
        .advertised_hash
        .clone()
        .unwrap_or_else(|| blake3_hex(&state.data));
    Json(DownloadInfo {
        size: state.data.len() as u64,
        hash,
    })
    .into_response()
}

fn parse_range(headers: &HeaderMap) -> Option<(u64, u64)> {
    let raw = headers.get(header::RANGE)?.to_str().ok()?;
    let (start, end) = raw.strip_prefix("bytes=")?.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

async fn fake_download(State(state): State<Arc<Mutex<FakeState>>>, headers: HeaderMap) -> Response {
    let (delay, reply) = {
        let mut state = state.lock().unwrap();
        let total = state.data.len() as u64;
        let (start, end) = parse_range(&headers).unwrap_or((0, total.saturating_sub(1)));
        state.ranges.push((start, end));

        let reply = if state.fail_from.map_or(false, |from| start >= from) {
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        } else {
            let mut body = state.data[start as usize..=end as usize].to_vec();
            if state.truncate {
                body.truncate(body.len() / 2);
            }
            Ok((format!("bytes {start}-{end}/{total}"), body))
        };
        (state.delay, reply)
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    match reply {
        Ok((content_range, body)) => (
            StatusCode::PARTIAL_CONTENT,
            [(header::CONTENT_RANGE, content_range)],
            body,
        )
            .into_response(),
        Err(status) => status.into_response(),
    }
}

pub fn read(path: impl AsRef<Path>) -> Vec<u8> {
    std::fs::read(path).unwrap()
}

pub fn as_path(s: &Option<String>) -> PathBuf {
    PathBuf::from(s.as_deref().expect("save path set"))
}
